//! The three per-clan watch lists: tree-hang, lap reservation and
//! in-progress markers.

use serde::{Deserialize, Serialize};

use crate::state::{BossNum, GroupState};
use crate::MemberId;

/// "Tell me the next time this boss (or any boss) dies."
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeHang {
    pub sid: u64,
    pub member_id: MemberId,
    /// `None` watches every boss.
    pub boss: Option<BossNum>,
    #[serde(default)]
    pub message: Option<String>,
    pub created_at: i64,
}

/// "Tell me when this boss reaches lap N."
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LapReservation {
    pub sid: u64,
    pub member_id: MemberId,
    pub boss: BossNum,
    pub target_cycle: u32,
    #[serde(default)]
    pub message: Option<String>,
    pub created_at: i64,
}

/// "I am hitting this boss right now."
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InProgress {
    pub sid: u64,
    pub member_id: MemberId,
    pub boss: Option<BossNum>,
    #[serde(default)]
    pub message: Option<String>,
    pub created_at: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubKind {
    TreeHang,
    Lap,
    InProgress,
}

impl SubKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SubKind::TreeHang => "tree_hang",
            SubKind::Lap => "lap_reservation",
            SubKind::InProgress => "in_progress",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Subscription {
    TreeHang(TreeHang),
    Lap(LapReservation),
    InProgress(InProgress),
}

impl Subscription {
    pub fn sid(&self) -> u64 {
        match self {
            Subscription::TreeHang(s) => s.sid,
            Subscription::Lap(s) => s.sid,
            Subscription::InProgress(s) => s.sid,
        }
    }

    pub fn kind(&self) -> SubKind {
        match self {
            Subscription::TreeHang(_) => SubKind::TreeHang,
            Subscription::Lap(_) => SubKind::Lap,
            Subscription::InProgress(_) => SubKind::InProgress,
        }
    }
}

fn boss_matches(watch: Option<BossNum>, killed: BossNum) -> bool {
    watch.is_none_or(|b| b == killed)
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriptions {
    next_sid: u64,
    tree_hangs: Vec<TreeHang>,
    laps: Vec<LapReservation>,
    in_progress: Vec<InProgress>,
}

impl Subscriptions {
    pub fn next_sid(&self) -> u64 {
        self.next_sid.max(1)
    }

    pub fn insert(&mut self, sub: Subscription) {
        self.next_sid = self.next_sid().max(sub.sid().saturating_add(1));
        match sub {
            Subscription::TreeHang(s) => self.tree_hangs.push(s),
            Subscription::Lap(s) => self.laps.push(s),
            Subscription::InProgress(s) => self.in_progress.push(s),
        }
    }

    pub fn remove(&mut self, kind: SubKind, sid: u64) -> bool {
        let before = self.len();
        match kind {
            SubKind::TreeHang => self.tree_hangs.retain(|s| s.sid != sid),
            SubKind::Lap => self.laps.retain(|s| s.sid != sid),
            SubKind::InProgress => self.in_progress.retain(|s| s.sid != sid),
        }
        self.len() != before
    }

    pub fn set_lap_target(&mut self, sid: u64, target_cycle: u32) {
        if let Some(s) = self.laps.iter_mut().find(|s| s.sid == sid) {
            s.target_cycle = target_cycle;
        }
    }

    pub fn len(&self) -> usize {
        self.tree_hangs.len() + self.laps.len() + self.in_progress.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tree_hangs(&self) -> &[TreeHang] {
        &self.tree_hangs
    }

    pub fn laps(&self) -> &[LapReservation] {
        &self.laps
    }

    pub fn in_progress(&self) -> &[InProgress] {
        &self.in_progress
    }

    pub fn tree_hang_of(&self, member: MemberId) -> Option<&TreeHang> {
        self.tree_hangs.iter().find(|s| s.member_id == member)
    }

    pub fn lap_of(&self, member: MemberId, boss: BossNum) -> Option<&LapReservation> {
        self.laps
            .iter()
            .find(|s| s.member_id == member && s.boss == boss)
    }

    pub fn in_progress_of(&self, member: MemberId) -> Option<&InProgress> {
        self.in_progress.iter().find(|s| s.member_id == member)
    }

    /// Tree-hang and in-progress entries of one member, optionally only those
    /// on a given boss.
    pub fn transient_of(&self, member: MemberId, boss: Option<BossNum>) -> Vec<(SubKind, u64)> {
        let on_boss = |b: Option<BossNum>| boss.is_none() || b == boss;
        let mut out = Vec::new();
        for s in &self.tree_hangs {
            if s.member_id == member && on_boss(s.boss) {
                out.push((SubKind::TreeHang, s.sid));
            }
        }
        for s in &self.in_progress {
            if s.member_id == member && on_boss(s.boss) {
                out.push((SubKind::InProgress, s.sid));
            }
        }
        out
    }

    /// Every tree-hang and in-progress entry.
    pub fn all_transient(&self) -> Vec<(SubKind, u64)> {
        self.tree_hangs
            .iter()
            .map(|s| (SubKind::TreeHang, s.sid))
            .chain(self.in_progress.iter().map(|s| (SubKind::InProgress, s.sid)))
            .collect()
    }

    /// Entries that fire when `killed` dies, in creation order.
    pub fn kill_matches(&self, killed: BossNum) -> (Vec<&TreeHang>, Vec<&InProgress>) {
        let th = self
            .tree_hangs
            .iter()
            .filter(|s| boss_matches(s.boss, killed))
            .collect();
        let ip = self
            .in_progress
            .iter()
            .filter(|s| boss_matches(s.boss, killed))
            .collect();
        (th, ip)
    }

    /// Reservations whose boss has reached the target lap. A boss in its
    /// second circuit counts as already being on the next lap.
    pub fn lap_matches(&self, st: &GroupState) -> Vec<&LapReservation> {
        self.laps
            .iter()
            .filter(|s| {
                let at = st.cycle.saturating_add(u32::from(st.boss(s.boss).second_circuit));
                s.target_cycle == at
            })
            .collect()
    }

    pub fn head_counts(&self, boss: BossNum) -> (usize, usize) {
        let ip = self
            .in_progress
            .iter()
            .filter(|s| s.boss == Some(boss))
            .count();
        let th = self
            .tree_hangs
            .iter()
            .filter(|s| s.boss == Some(boss))
            .count();
        (ip, th)
    }
}
