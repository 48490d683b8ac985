//! Carry-over (continuation) accounting over one member's day of records.

use crate::ledger::ChallengeRecord;

/// Counts derived from a member's records for a single game day.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DayTally {
    /// Attempts that are over: a non-kill hit, or a continuation.
    ///
    /// A fresh kill shot is not finished yet; its carry-over is still owed.
    pub finished: usize,
    /// Fresh (non-continuation) attempts of any kind.
    pub fresh: usize,
    /// Fresh kill shots; each one earns a carry-over.
    pub earned: usize,
    /// Continuation records; each one spends a carry-over.
    pub spent: usize,
}

impl DayTally {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ChallengeRecord>) -> Self {
        let mut t = DayTally::default();
        for r in records {
            if !r.is_kill() || r.continuation {
                t.finished += 1;
            }
            if r.continuation {
                t.spent += 1;
            } else {
                t.fresh += 1;
                if r.is_kill() {
                    t.earned += 1;
                }
            }
        }
        t
    }

    pub fn cap_reached(&self, daily_attempts: usize) -> bool {
        self.finished >= daily_attempts
    }

    /// All fresh attempts are gone; anything further must be a continuation.
    pub fn fresh_exhausted(&self, daily_attempts: usize) -> bool {
        self.fresh >= daily_attempts
    }

    pub fn can_continue(&self) -> bool {
        self.earned > self.spent
    }

    /// Ordinal of the next attempt, as shown to members ("3rd hit today").
    pub fn next_ordinal(&self) -> usize {
        self.finished + self.earned.saturating_sub(self.spent) + 1
    }
}

/// How a new record's continuation number was settled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeqPlan {
    pub continuation_seq: u32,
    /// Earlier kill shot whose carry-over this record consumes.
    pub consumes: Option<u64>,
}

/// Settle the continuation number for a new attempt.
///
/// * fresh attempt: the next ordinal among the day's fresh attempts;
/// * continuation with `requested > 0`: that exact unspent kill shot, or
///   `None` when no such carry-over exists;
/// * continuation with `requested == 0`: the oldest unspent numbered kill
///   shot, or an unnumbered continuation when there is none.
pub fn plan_seq(day: &[&ChallengeRecord], continuation: bool, requested: u32) -> Option<SeqPlan> {
    if !continuation {
        let fresh = day.iter().filter(|r| !r.continuation).count();
        return Some(SeqPlan {
            continuation_seq: u32::try_from(fresh).unwrap_or(u32::MAX).saturating_add(1),
            consumes: None,
        });
    }

    if requested > 0 {
        let src = day
            .iter()
            .find(|r| r.has_unused_carry_over() && r.continuation_seq == requested)?;
        return Some(SeqPlan {
            continuation_seq: requested,
            consumes: Some(src.seq),
        });
    }

    let oldest = day
        .iter()
        .find(|r| r.has_unused_carry_over() && r.continuation_seq > 0);
    Some(match oldest {
        Some(src) => SeqPlan {
            continuation_seq: src.continuation_seq,
            consumes: Some(src.seq),
        },
        None => SeqPlan {
            continuation_seq: 0,
            consumes: None,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::CarryOver;
    use crate::ledger::tests::rec;

    fn numbered(seq: u64, remaining: i64, continuation: bool, n: u32) -> ChallengeRecord {
        let mut r = rec(seq, 10, 1, remaining);
        r.continuation = continuation;
        r.continuation_seq = n;
        r
    }

    #[test]
    fn tally_counts() {
        let day = [
            numbered(1, 500, false, 1),
            numbered(2, 0, false, 2),
            numbered(3, 0, true, 2),
        ];
        let t = DayTally::from_records(day.iter());
        assert_eq!(t.finished, 2);
        assert_eq!(t.fresh, 2);
        assert_eq!(t.earned, 1);
        assert_eq!(t.spent, 1);
        assert!(!t.can_continue());
        assert!(!t.cap_reached(3));
        assert_eq!(t.next_ordinal(), 3);
    }

    #[test]
    fn fresh_kill_is_not_finished() {
        let day = [numbered(1, 0, false, 1)];
        let t = DayTally::from_records(day.iter());
        assert_eq!(t.finished, 0);
        assert!(t.can_continue());
        assert_eq!(t.next_ordinal(), 2);
    }

    #[test]
    fn three_hits_reach_cap() {
        let day = [
            numbered(1, 5, false, 1),
            numbered(2, 5, false, 2),
            numbered(3, 5, false, 3),
        ];
        let t = DayTally::from_records(day.iter());
        assert!(t.cap_reached(3));
        assert!(t.fresh_exhausted(3));
    }

    #[test]
    fn fresh_attempt_takes_next_ordinal() {
        let a = numbered(1, 5, false, 1);
        let b = numbered(2, 0, true, 0);
        let plan = plan_seq(&[&a, &b], false, 0).unwrap();
        assert_eq!(plan.continuation_seq, 2);
        assert_eq!(plan.consumes, None);
    }

    #[test]
    fn explicit_number_must_match_unspent_kill() {
        let a = numbered(1, 0, false, 1);
        let mut b = numbered(2, 0, false, 2);
        b.carry_over = CarryOver::Used;
        let day = [&a, &b];

        let plan = plan_seq(&day, true, 1).unwrap();
        assert_eq!(plan.consumes, Some(1));
        assert!(plan_seq(&day, true, 2).is_none());
        assert!(plan_seq(&day, true, 7).is_none());
    }

    #[test]
    fn zero_picks_oldest_numbered_or_untracked() {
        let a = numbered(1, 0, false, 0);
        let b = numbered(2, 0, false, 2);
        let c = numbered(3, 0, false, 3);
        let plan = plan_seq(&[&a, &b, &c], true, 0).unwrap();
        assert_eq!(plan.continuation_seq, 2);
        assert_eq!(plan.consumes, Some(2));

        let plan = plan_seq(&[&a], true, 0).unwrap();
        assert_eq!(plan.continuation_seq, 0);
        assert_eq!(plan.consumes, None);
    }
}
