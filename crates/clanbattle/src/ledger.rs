//! Append-only record of attacks for one clan.
//!
//! Records are only ever appended, and only the newest one of a slot may be
//! removed (undo). The one field that changes after creation is the
//! carry-over state of a kill shot, which flips to `Used` when a later
//! continuation consumes it and back to `Unused` when that continuation is
//! undone.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::state::BossNum;
use crate::{DayKey, GroupId, Health, MemberId, SlotId, TimeKey};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarryOver {
    #[default]
    Unused,
    Used,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeRecord {
    pub seq: u64,
    pub group_id: GroupId,
    pub slot_id: SlotId,
    pub attacker: MemberId,
    pub day: DayKey,
    pub time: TimeKey,
    pub cycle: u32,
    pub boss: BossNum,
    /// Boss health left after this hit; zero for a kill shot.
    pub remaining: Health,
    pub damage: Health,
    pub continuation: bool,
    /// 0 = not numbered. Otherwise the ordinal of the attempt whose kill shot
    /// earned (or, on a continuation, supplied) the carry-over.
    pub continuation_seq: u32,
    #[serde(default)]
    pub carry_over: CarryOver,
    pub second_circuit: bool,
    #[serde(default)]
    pub message: Option<String>,
    /// Member who entered the record on the attacker's behalf.
    #[serde(default)]
    pub recorded_by: Option<MemberId>,
}

impl ChallengeRecord {
    pub fn is_kill(&self) -> bool {
        self.remaining == 0
    }

    pub fn is_used(&self) -> bool {
        self.carry_over == CarryOver::Used
    }

    /// Kill shot that earned a carry-over nobody has spent yet.
    pub fn has_unused_carry_over(&self) -> bool {
        self.is_kill() && !self.continuation && !self.is_used()
    }
}

/// Which slot(s) a query covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotFilter {
    One(SlotId),
    All,
}

impl SlotFilter {
    fn matches(self, slot: SlotId) -> bool {
        match self {
            SlotFilter::One(s) => s == slot,
            SlotFilter::All => true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    records: Vec<ChallengeRecord>, // ascending seq
    next_seq: u64,
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            next_seq: 1,
        }
    }

    /// Id the next appended record will get. Never handed out twice, even
    /// after the newest record is removed.
    pub fn next_seq(&self) -> u64 {
        self.next_seq.max(1)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn append(&mut self, rec: ChallengeRecord) {
        self.next_seq = self.next_seq().max(rec.seq.saturating_add(1));
        match self.records.last() {
            Some(last) if last.seq > rec.seq => {
                let at = self.records.partition_point(|r| r.seq < rec.seq);
                self.records.insert(at, rec);
            }
            _ => self.records.push(rec),
        }
    }

    pub fn get(&self, seq: u64) -> Option<&ChallengeRecord> {
        self.records
            .binary_search_by_key(&seq, |r| r.seq)
            .ok()
            .map(|i| &self.records[i])
    }

    pub fn remove(&mut self, seq: u64) -> Option<ChallengeRecord> {
        let i = self.records.binary_search_by_key(&seq, |r| r.seq).ok()?;
        Some(self.records.remove(i))
    }

    pub fn set_carry_over(&mut self, seq: u64, state: CarryOver) -> bool {
        match self.records.binary_search_by_key(&seq, |r| r.seq) {
            Ok(i) => {
                self.records[i].carry_over = state;
                true
            }
            Err(_) => false,
        }
    }

    /// Newest record of a slot.
    pub fn last(&self, slot: SlotId) -> Option<&ChallengeRecord> {
        self.records.iter().rev().find(|r| r.slot_id == slot)
    }

    pub fn last_for_boss(&self, slot: SlotId, boss: BossNum) -> Option<&ChallengeRecord> {
        self.records
            .iter()
            .rev()
            .find(|r| r.slot_id == slot && r.boss == boss)
    }

    /// One member's records for one game day, oldest first.
    pub fn day_slice(&self, slot: SlotId, member: MemberId, day: DayKey) -> Vec<&ChallengeRecord> {
        self.records
            .iter()
            .filter(|r| r.slot_id == slot && r.attacker == member && r.day == day)
            .collect()
    }

    pub fn has_day(&self, slot: SlotId, day: DayKey) -> bool {
        self.records
            .iter()
            .any(|r| r.slot_id == slot && r.day == day)
    }

    pub fn query(
        &self,
        slot: SlotFilter,
        member: Option<MemberId>,
        day: Option<DayKey>,
    ) -> impl Iterator<Item = &ChallengeRecord> + '_ {
        self.records.iter().filter(move |r| {
            slot.matches(r.slot_id)
                && member.is_none_or(|m| r.attacker == m)
                && day.is_none_or(|d| r.day == d)
        })
    }

    pub fn slot_counts(&self) -> BTreeMap<SlotId, usize> {
        let mut out = BTreeMap::new();
        for r in &self.records {
            *out.entry(r.slot_id).or_insert(0) += 1;
        }
        out
    }

    pub fn clear_slot(&mut self, slot: SlotId) -> usize {
        let before = self.records.len();
        self.records.retain(|r| r.slot_id != slot);
        before - self.records.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn rec(seq: u64, attacker: MemberId, boss: u8, remaining: Health) -> ChallengeRecord {
        ChallengeRecord {
            seq,
            group_id: 1,
            slot_id: 0,
            attacker,
            day: 100,
            time: 0,
            cycle: 1,
            boss: BossNum::new(boss).unwrap(),
            remaining,
            damage: 1000,
            continuation: false,
            continuation_seq: 0,
            carry_over: CarryOver::Unused,
            second_circuit: false,
            message: None,
            recorded_by: None,
        }
    }

    #[test]
    fn seq_never_reused_after_remove() {
        let mut l = Ledger::new();
        assert_eq!(l.next_seq(), 1);
        l.append(rec(1, 10, 1, 500));
        l.append(rec(2, 10, 2, 0));
        assert_eq!(l.next_seq(), 3);

        let gone = l.remove(2).unwrap();
        assert_eq!(gone.seq, 2);
        assert_eq!(l.len(), 1);
        assert_eq!(l.next_seq(), 3);
    }

    #[test]
    fn last_and_per_boss_lookup() {
        let mut l = Ledger::new();
        l.append(rec(1, 10, 1, 500));
        l.append(rec(2, 11, 2, 0));
        let mut other_slot = rec(3, 12, 1, 100);
        other_slot.slot_id = 1;
        l.append(other_slot);

        assert_eq!(l.last(0).map(|r| r.seq), Some(2));
        assert_eq!(l.last(1).map(|r| r.seq), Some(3));
        assert_eq!(
            l.last_for_boss(0, BossNum::new(1).unwrap()).map(|r| r.seq),
            Some(1)
        );
        assert!(l.last_for_boss(0, BossNum::new(5).unwrap()).is_none());
        assert_eq!(l.slot_counts().get(&0), Some(&2));
        assert_eq!(l.clear_slot(0), 2);
        assert_eq!(l.len(), 1);
    }

    #[test]
    fn day_slice_filters_member_and_day() {
        let mut l = Ledger::new();
        l.append(rec(1, 10, 1, 500));
        let mut yesterday = rec(2, 10, 1, 400);
        yesterday.day = 99;
        l.append(yesterday);
        l.append(rec(3, 11, 1, 300));

        let slice = l.day_slice(0, 10, 100);
        assert_eq!(slice.len(), 1);
        assert_eq!(slice[0].seq, 1);
        assert!(l.has_day(0, 99));
        assert!(!l.has_day(0, 98));
        assert_eq!(l.query(SlotFilter::All, Some(10), None).count(), 2);
    }

    #[test]
    fn carry_over_toggles() {
        let mut l = Ledger::new();
        l.append(rec(1, 10, 1, 0));
        assert!(l.get(1).unwrap().has_unused_carry_over());
        assert!(l.set_carry_over(1, CarryOver::Used));
        assert!(!l.get(1).unwrap().has_unused_carry_over());
        assert!(l.set_carry_over(1, CarryOver::Unused));
        assert!(l.get(1).unwrap().has_unused_carry_over());
        assert!(!l.set_carry_over(9, CarryOver::Used));
    }
}
