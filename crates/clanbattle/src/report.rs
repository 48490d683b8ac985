//! Read models and the short-lived report cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::ledger::{CarryOver, ChallengeRecord, SlotFilter};
use crate::{DayKey, GroupId, Health, MemberId, SlotId, TimeKey};

/// Slot selector as callers phrase it; resolved to a [`SlotFilter`] against
/// the clan's active slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSlot {
    Current,
    Id(SlotId),
    All,
}

impl ReportSlot {
    pub fn resolve(self, active: SlotId) -> SlotFilter {
        match self {
            ReportSlot::Current => SlotFilter::One(active),
            ReportSlot::Id(s) => SlotFilter::One(s),
            ReportSlot::All => SlotFilter::All,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    pub seq: u64,
    pub slot_id: SlotId,
    pub attacker: MemberId,
    pub nickname: String,
    pub day: DayKey,
    pub time: TimeKey,
    /// Wall-clock time of the record.
    pub unix: i64,
    pub cycle: u32,
    pub boss: u8,
    pub remaining: Health,
    pub damage: Health,
    pub continuation: bool,
    pub continuation_seq: u32,
    pub carry_over: CarryOver,
    pub second_circuit: bool,
    pub message: Option<String>,
    pub recorded_by: Option<MemberId>,
}

impl ReportRow {
    pub fn new(r: &ChallengeRecord, nickname: String, unix: i64) -> Self {
        Self {
            seq: r.seq,
            slot_id: r.slot_id,
            attacker: r.attacker,
            nickname,
            day: r.day,
            time: r.time,
            unix,
            cycle: r.cycle,
            boss: r.boss.get(),
            remaining: r.remaining,
            damage: r.damage,
            continuation: r.continuation,
            continuation_seq: r.continuation_seq,
            carry_over: r.carry_over,
            second_circuit: r.second_circuit,
            message: r.message.clone(),
            recorded_by: r.recorded_by,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRow {
    pub member_id: MemberId,
    pub nickname: String,
}

/// Whole-clan tally for one day.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCounts {
    /// Fresh hits that did not kill.
    pub full: usize,
    /// Fresh kill shots.
    pub tail: usize,
    /// Continuations that did not kill.
    pub continued: usize,
    /// Continuations that killed.
    pub continued_tail: usize,
}

impl DailyCounts {
    pub fn add(&mut self, r: &ChallengeRecord) {
        match (r.continuation, r.is_kill()) {
            (false, false) => self.full += 1,
            (false, true) => self.tail += 1,
            (true, false) => self.continued += 1,
            (true, true) => self.continued_tail += 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ReportKey {
    pub group_id: GroupId,
    pub slot: SlotFilter,
    pub member: Option<MemberId>,
    pub day: Option<DayKey>,
}

/// Bounded TTL cache of ledger reports.
#[derive(Debug)]
pub struct ReportCache {
    ttl: Duration,
    max: usize,
    entries: HashMap<ReportKey, (Instant, Arc<Vec<ReportRow>>)>,
}

impl ReportCache {
    pub fn new(ttl: Duration, max: usize) -> Self {
        Self {
            ttl,
            max,
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, key: &ReportKey) -> Option<Arc<Vec<ReportRow>>> {
        let (at, rows) = self.entries.get(key)?;
        if at.elapsed() > self.ttl {
            return None;
        }
        Some(rows.clone())
    }

    pub fn put(&mut self, key: ReportKey, rows: Arc<Vec<ReportRow>>) {
        if self.max == 0 {
            return;
        }
        let ttl = self.ttl;
        self.entries.retain(|_, (at, _)| at.elapsed() <= ttl);
        while self.entries.len() >= self.max {
            let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, (at, _))| *at)
                .map(|(k, _)| *k)
            else {
                break;
            };
            self.entries.remove(&oldest);
        }
        self.entries.insert(key, (Instant::now(), rows));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn invalidate_group(&mut self, group_id: GroupId) {
        self.entries.retain(|k, _| k.group_id != group_id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(group_id: GroupId) -> ReportKey {
        ReportKey {
            group_id,
            slot: SlotFilter::All,
            member: None,
            day: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire() {
        let mut c = ReportCache::new(Duration::from_secs(10), 8);
        c.put(key(1), Arc::new(Vec::new()));
        assert!(c.get(&key(1)).is_some());
        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(c.get(&key(1)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_and_invalidated() {
        let mut c = ReportCache::new(Duration::from_secs(10), 2);
        c.put(key(1), Arc::new(Vec::new()));
        tokio::time::advance(Duration::from_millis(1)).await;
        c.put(key(2), Arc::new(Vec::new()));
        tokio::time::advance(Duration::from_millis(1)).await;
        c.put(key(3), Arc::new(Vec::new()));
        assert_eq!(c.len(), 2);
        assert!(c.get(&key(1)).is_none());

        c.invalidate_group(2);
        assert!(c.get(&key(2)).is_none());
        assert!(c.get(&key(3)).is_some());
    }

    #[test]
    fn slot_resolution() {
        assert_eq!(ReportSlot::Current.resolve(4), SlotFilter::One(4));
        assert_eq!(ReportSlot::Id(2).resolve(4), SlotFilter::One(2));
        assert_eq!(ReportSlot::All.resolve(4), SlotFilter::All);
    }
}
