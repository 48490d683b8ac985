use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tier::{GameServer, TierTable};
use crate::{BOSS_COUNT, GroupId, Health, MemberId, SlotId};

/// Boss position within a lap, 1..=5.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct BossNum(u8);

impl BossNum {
    pub fn new(n: u8) -> Option<Self> {
        if (1..=BOSS_COUNT as u8).contains(&n) {
            Some(Self(n))
        } else {
            None
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn index(self) -> usize {
        usize::from(self.0 - 1)
    }

    pub fn all() -> impl Iterator<Item = BossNum> {
        (1..=BOSS_COUNT as u8).map(BossNum)
    }
}

impl TryFrom<u8> for BossNum {
    type Error = String;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        BossNum::new(n).ok_or_else(|| format!("boss number {n} out of range"))
    }
}

impl From<BossNum> for u8 {
    fn from(b: BossNum) -> u8 {
        b.0
    }
}

impl fmt::Display for BossNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BossSlot {
    pub health: Health,
    /// Boss is in its make-up sub-lap.
    pub second_circuit: bool,
    #[serde(default)]
    pub commit: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockKind {
    /// "I am hitting the boss right now."
    Attacking,
    /// Boss held for some other reason; always carries a comment.
    Locked,
}

impl LockKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LockKind::Attacking => "attacking",
            LockKind::Locked => "locked",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub member_id: MemberId,
    pub kind: LockKind,
    pub started_at: i64,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupState {
    pub group_id: GroupId,
    #[serde(default)]
    pub name: Option<String>,
    pub server: GameServer,
    pub cycle: u32,
    pub bosses: [BossSlot; BOSS_COUNT],
    #[serde(default)]
    pub claim: Option<Claim>,
    #[serde(default)]
    pub slot_id: SlotId,
}

impl GroupState {
    /// Fresh lap-1 state at the first phase's health.
    pub fn new(group_id: GroupId, server: GameServer, name: Option<String>, tiers: &TierTable) -> Self {
        let mut st = Self {
            group_id,
            name,
            server,
            cycle: 1,
            bosses: Default::default(),
            claim: None,
            slot_id: 0,
        };
        st.reset_bosses(tiers);
        st
    }

    /// Back to lap 1, first-phase health, no flags, no commits, no claim.
    pub fn reset_bosses(&mut self, tiers: &TierTable) {
        let row = tiers.row(self.server, 0);
        self.cycle = 1;
        for (slot, h) in self.bosses.iter_mut().zip(row) {
            *slot = BossSlot {
                health: h,
                second_circuit: false,
                commit: None,
            };
        }
        self.claim = None;
    }

    pub fn boss(&self, b: BossNum) -> &BossSlot {
        &self.bosses[b.index()]
    }

    pub fn boss_mut(&mut self, b: BossNum) -> &mut BossSlot {
        &mut self.bosses[b.index()]
    }

    pub fn all_dead(&self) -> bool {
        self.bosses.iter().all(|b| b.health == 0)
    }

    pub fn all_second(&self) -> bool {
        self.bosses.iter().all(|b| b.second_circuit)
    }

    pub fn healths(&self) -> [Health; BOSS_COUNT] {
        std::array::from_fn(|i| self.bosses[i].health)
    }

    pub fn flags(&self) -> [bool; BOSS_COUNT] {
        std::array::from_fn(|i| self.bosses[i].second_circuit)
    }

    pub fn claimed_by(&self, member_id: MemberId) -> bool {
        self.claim.as_ref().is_some_and(|c| c.member_id == member_id)
    }

    pub fn snapshot(&self, tiers: &TierTable) -> BossSnapshot {
        let phase = tiers.phase_of(self.server, self.cycle);
        let full = tiers.row(self.server, phase);
        BossSnapshot {
            group_id: self.group_id,
            cycle: self.cycle,
            phase,
            slot_id: self.slot_id,
            bosses: std::array::from_fn(|i| BossView {
                health: self.bosses[i].health,
                full_health: full[i],
                second_circuit: self.bosses[i].second_circuit,
            }),
            claim: self.claim.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BossView {
    pub health: Health,
    pub full_health: Health,
    pub second_circuit: bool,
}

/// Read-only picture of a group's bosses handed to callers and observers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BossSnapshot {
    pub group_id: GroupId,
    pub cycle: u32,
    pub phase: usize,
    pub slot_id: SlotId,
    pub bosses: [BossView; BOSS_COUNT],
    pub claim: Option<Claim>,
}

/// Outcome of a state-changing operation: the new snapshot plus a one-line
/// description of what happened.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BossStatus {
    pub snapshot: BossSnapshot,
    pub info: String,
}

impl fmt::Display for BossStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.info.is_empty() {
            writeln!(f, "{}", self.info)?;
        }
        writeln!(f, "lap {}", self.snapshot.cycle)?;
        for (i, b) in self.snapshot.bosses.iter().enumerate() {
            write!(f, "boss {} health {}", i + 1, thousands(b.health))?;
            if b.second_circuit {
                write!(f, " (second circuit)")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// `12345678` -> `12,345,678`.
pub fn thousands(v: Health) -> String {
    let digits = v.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if v < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boss_num_bounds() {
        assert!(BossNum::new(0).is_none());
        assert!(BossNum::new(6).is_none());
        assert_eq!(BossNum::new(5).map(|b| b.index()), Some(4));
        assert_eq!(BossNum::all().count(), BOSS_COUNT);

        let b: Result<BossNum, _> = serde_json::from_str("9");
        assert!(b.is_err());
        let b: BossNum = serde_json::from_str("3").unwrap();
        assert_eq!(b.get(), 3);
    }

    #[test]
    fn new_group_uses_first_phase() {
        let tiers = TierTable::default();
        let st = GroupState::new(7, GameServer::Cn, None, &tiers);
        assert_eq!(st.cycle, 1);
        assert_eq!(st.healths(), tiers.row(GameServer::Cn, 0));
        assert_eq!(st.flags(), [false; BOSS_COUNT]);
        assert!(!st.all_dead());
    }

    #[test]
    fn thousands_grouping() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(1000), "1,000");
        assert_eq!(thousands(6_000_000), "6,000,000");
        assert_eq!(thousands(-12345), "-12,345");
    }

    #[test]
    fn status_display_marks_second_circuit() {
        let tiers = TierTable::default();
        let mut st = GroupState::new(1, GameServer::Jp, None, &tiers);
        st.bosses[1].second_circuit = true;
        let status = BossStatus {
            snapshot: st.snapshot(&tiers),
            info: "hello".to_string(),
        };
        let text = status.to_string();
        assert!(text.starts_with("hello\nlap 1\n"));
        assert!(text.contains("boss 2 health 8,000,000 (second circuit)"));
        assert!(text.contains("boss 1 health 6,000,000\n"));
    }
}
