use std::collections::BTreeMap;

use tracing::info;

use super::{ClanBattle, GroupEvent, Plan};
use crate::error::{BattleError, BattleResult};
use crate::ledger::Ledger;
use crate::roster::RosterEvent;
use crate::state::{BossNum, BossStatus, GroupState};
use crate::tier::TierTable;
use crate::{GroupId, MemberId, SlotId};

/// Save-slot ("SL") reload bookkeeping; each member gets one per game day.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveSlotOp {
    Check,
    Set,
    Unset,
}

/// Boss state implied by the newest records of `slot`.
fn rebuild_from_ledger(st: &mut GroupState, ledger: &Ledger, tiers: &TierTable, slot: SlotId) {
    let Some(last) = ledger.last(slot) else {
        let row = tiers.row(st.server, 0);
        st.cycle = 1;
        for (b, h) in st.bosses.iter_mut().zip(row) {
            b.health = h;
            b.second_circuit = false;
        }
        return;
    };

    st.cycle = last.cycle;
    let row = tiers.row_for_cycle(st.server, st.cycle);
    for (n, h) in BossNum::all().zip(row) {
        let seen = ledger
            .last_for_boss(slot, n)
            .map(|r| (r.remaining, r.second_circuit));
        let b = st.boss_mut(n);
        match seen {
            Some((remaining, second)) if remaining > 0 || second => {
                b.health = remaining;
                b.second_circuit = second;
            }
            _ => {
                b.health = h;
                b.second_circuit = false;
            }
        }
    }
    if st.all_dead() {
        st.cycle = st.cycle.saturating_add(1);
        let row = tiers.row_for_cycle(st.server, st.cycle);
        for (b, h) in st.bosses.iter_mut().zip(row) {
            b.health = h;
            b.second_circuit = false;
        }
    }
}

impl ClanBattle {
    /// Record counts per data slot.
    pub async fn slot_record_counts(&self, group_id: GroupId) -> BattleResult<BTreeMap<SlotId, usize>> {
        let book = self.book(group_id).await?;
        let data = book.data.lock().await;
        let mut counts = data.ledger.slot_counts();
        counts.entry(data.state.slot_id).or_insert(0);
        Ok(counts)
    }

    /// Make `slot` the active data slot and rebuild the bosses from its
    /// records. Drops the claim and every tree-hang and in-progress entry.
    pub async fn switch_slot(
        &self,
        group_id: GroupId,
        caller: MemberId,
        slot: SlotId,
    ) -> BattleResult<BossStatus> {
        let book = self.book(group_id).await?;
        let mut data = book.data.lock().await;
        {
            let roster = self.roster.lock().await;
            Self::require_elevated(&roster, group_id, caller, "switch data slots")?;
        }

        let mut plan = Plan::new(&data);
        let mut st = plan.state().clone();
        st.slot_id = slot;
        st.claim = None;
        rebuild_from_ledger(&mut st, &data.ledger, &self.cfg.tiers, slot);
        plan.set_state(st);
        let transient = plan.next.subs.all_transient();
        plan.remove_subs(transient);

        let status = self
            .finish(&book, &mut data, plan, format!("switched to data slot {slot}"))
            .await?;
        info!(group_id, slot, "data slot switched");
        Ok(status)
    }

    /// Delete the records of `slot` (default: the active one) and start the
    /// bosses over from lap 1.
    pub async fn clear_slot(
        &self,
        group_id: GroupId,
        caller: MemberId,
        slot: Option<SlotId>,
    ) -> BattleResult<BossStatus> {
        let book = self.book(group_id).await?;
        let mut data = book.data.lock().await;
        {
            let roster = self.roster.lock().await;
            Self::require_elevated(&roster, group_id, caller, "clear data slots")?;
        }
        let slot = slot.unwrap_or(data.state.slot_id);

        let mut plan = Plan::new(&data);
        let mut st = plan.state().clone();
        st.reset_bosses(&self.cfg.tiers);
        plan.set_state(st);
        plan.push(GroupEvent::SlotCleared { slot_id: slot });
        let transient = plan.next.subs.all_transient();
        plan.remove_subs(transient);

        let status = self
            .finish(&book, &mut data, plan, format!("data slot {slot} cleared"))
            .await?;
        info!(group_id, slot, "data slot cleared");
        Ok(status)
    }

    /// Check, record or withdraw today's save-slot reload. Returns whether a
    /// reload is recorded for today afterwards.
    pub async fn save_slot_toggle(
        &self,
        group_id: GroupId,
        member_id: MemberId,
        op: SaveSlotOp,
    ) -> BattleResult<bool> {
        let book = self.book(group_id).await?;
        let mut data = book.data.lock().await;
        let today = self.clock.today(data.state.server).0;
        let used_today = {
            let roster = self.roster.lock().await;
            let m = roster
                .membership(group_id, member_id)
                .ok_or(BattleError::UserNotInGroup)?;
            m.last_save_slot == Some(today)
        };

        let mut plan = Plan::new(&data);
        let now = match op {
            SaveSlotOp::Check => return Ok(used_today),
            SaveSlotOp::Set => {
                if used_today {
                    return Err(BattleError::user("you already used your save-slot reload today"));
                }
                plan.roster(RosterEvent::SaveSlotSet {
                    group_id,
                    member_id,
                    day: Some(today),
                });
                if plan.state().claimed_by(member_id) {
                    let mut st = plan.state().clone();
                    st.claim = None;
                    plan.set_state(st);
                }
                let stale = plan.next.subs.transient_of(member_id, None);
                plan.remove_subs(stale);
                true
            }
            SaveSlotOp::Unset => {
                if !used_today {
                    return Err(BattleError::user("no save-slot reload recorded today"));
                }
                plan.roster(RosterEvent::SaveSlotSet {
                    group_id,
                    member_id,
                    day: None,
                });
                false
            }
        };

        self.finish(&book, &mut data, plan, String::new()).await?;
        info!(group_id, member_id, save_slot = now, "save slot toggled");
        Ok(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::tests::rec;
    use crate::tier::GameServer;

    #[test]
    fn rebuild_uses_newest_records() {
        let tiers = TierTable::default();
        let mut st = GroupState::new(1, GameServer::Cn, None, &tiers);
        let mut ledger = Ledger::new();
        let mut a = rec(1, 10, 1, 1_000);
        a.cycle = 2;
        ledger.append(a);
        let mut b = rec(2, 10, 2, 0);
        b.cycle = 2;
        ledger.append(b);
        let mut c = rec(3, 10, 3, 0);
        c.cycle = 2;
        c.second_circuit = true;
        ledger.append(c);

        rebuild_from_ledger(&mut st, &ledger, &tiers, 0);
        assert_eq!(st.cycle, 2);
        assert_eq!(st.bosses[0].health, 1_000);
        // Killed on its first pass: back at full health.
        assert_eq!(st.bosses[1].health, 8_000_000);
        // Killed in the second circuit: stays down.
        assert_eq!(st.bosses[2].health, 0);
        assert!(st.bosses[2].second_circuit);
        assert_eq!(st.bosses[4].health, 15_000_000);
    }

    #[test]
    fn rebuild_empty_slot_starts_over() {
        let tiers = TierTable::default();
        let mut st = GroupState::new(1, GameServer::Jp, None, &tiers);
        st.cycle = 9;
        st.bosses[0].health = 5;
        rebuild_from_ledger(&mut st, &Ledger::new(), &tiers, 3);
        assert_eq!(st.cycle, 1);
        assert_eq!(st.healths(), tiers.row(GameServer::Jp, 0));
    }
}
