//! Boss/lap progression after a kill, and its reverse for undo.

use crate::state::{BossNum, GroupState};
use crate::tier::TierTable;

/// Advance the group after a kill shot has zeroed a boss.
///
/// On the last lap of a phase nothing respawns; the lap only rolls once all
/// five bosses are down, and then every boss comes back at the next phase's
/// health. Within a phase a dead boss respawns into its second circuit at the
/// same health, and the lap rolls once every boss is in its second circuit.
pub fn on_kill(st: &mut GroupState, tiers: &TierTable) {
    let server = st.server;
    let now_phase = tiers.phase_of(server, st.cycle);

    if tiers.is_phase_changing(server, st.cycle) {
        if st.all_dead() {
            st.cycle = st.cycle.saturating_add(1);
            let row = tiers.row(server, tiers.phase_of(server, st.cycle));
            for (b, h) in st.bosses.iter_mut().zip(row) {
                b.health = h;
            }
        }
        for b in st.bosses.iter_mut() {
            b.second_circuit = false;
        }
        return;
    }

    let row = tiers.row(server, now_phase);
    for (b, h) in st.bosses.iter_mut().zip(row) {
        if b.health == 0 && !b.second_circuit {
            b.health = h;
            b.second_circuit = true;
        }
    }

    if !st.all_second() {
        return;
    }

    st.cycle = st.cycle.saturating_add(1);
    // A boss still down here waits for the phase boundary unless the new lap
    // can give it health.
    let refill = !tiers.is_phase_changing(server, st.cycle);
    for (b, h) in st.bosses.iter_mut().zip(row) {
        b.second_circuit = false;
        if b.health == 0 {
            if refill {
                b.health = h;
            }
            b.second_circuit = true;
        }
    }
}

/// Put every boss back one progression step so that `st.cycle` can return to
/// `to_cycle`, the lap an undone record was made on.
pub fn roll_back(st: &mut GroupState, tiers: &TierTable, to_cycle: u32) {
    if st.cycle == to_cycle {
        return;
    }
    let server = st.server;
    let before = tiers.phase_of(server, to_cycle);
    if tiers.phase_of(server, st.cycle) != before {
        for b in st.bosses.iter_mut() {
            b.health = 0;
        }
    } else {
        let row = tiers.row(server, before);
        for (b, h) in st.bosses.iter_mut().zip(row) {
            if b.second_circuit {
                b.health = 0;
            } else {
                b.health = h;
            }
            b.second_circuit = true;
        }
    }
    st.cycle = to_cycle;
}

/// Restore one boss to what it was just before a hit.
pub fn restore_boss(st: &mut GroupState, boss: BossNum, health: i64, second_circuit: bool) {
    let b = st.boss_mut(boss);
    b.health = health;
    b.second_circuit = second_circuit;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::GameServer;

    fn kill(st: &mut GroupState, tiers: &TierTable, n: u8) {
        st.boss_mut(BossNum::new(n).unwrap()).health = 0;
        on_kill(st, tiers);
    }

    #[test]
    fn killed_boss_enters_second_circuit() {
        let tiers = TierTable::default();
        let mut st = GroupState::new(1, GameServer::Cn, None, &tiers);
        kill(&mut st, &tiers, 1);
        assert_eq!(st.cycle, 1);
        assert_eq!(st.bosses[0].health, 6_000_000);
        assert!(st.bosses[0].second_circuit);
        assert!(!st.bosses[1].second_circuit);
    }

    #[test]
    fn all_second_rolls_lap() {
        let tiers = TierTable::default();
        let mut st = GroupState::new(1, GameServer::Cn, None, &tiers);
        for n in 1..=5 {
            kill(&mut st, &tiers, n);
        }
        assert_eq!(st.cycle, 2);
        assert_eq!(st.flags(), [false; 5]);
        assert_eq!(st.healths(), tiers.row(GameServer::Cn, 0));
    }

    #[test]
    fn phase_change_waits_for_all_dead() {
        let tiers = TierTable::default();
        let mut st = GroupState::new(1, GameServer::Jp, None, &tiers);
        st.cycle = 3;
        st.bosses[2].second_circuit = true;

        kill(&mut st, &tiers, 1);
        assert_eq!(st.cycle, 3);
        assert_eq!(st.bosses[0].health, 0);
        assert_eq!(st.flags(), [false; 5]);

        for n in 2..=5 {
            kill(&mut st, &tiers, n);
        }
        assert_eq!(st.cycle, 4);
        assert_eq!(st.healths(), tiers.row(GameServer::Jp, 1));
    }

    #[test]
    fn boss_stays_down_when_next_lap_changes_phase() {
        let tiers = TierTable::default();
        let mut st = GroupState::new(1, GameServer::Jp, None, &tiers);
        st.cycle = 2;
        for b in st.bosses.iter_mut() {
            b.second_circuit = true;
        }
        st.bosses[0].second_circuit = false;
        st.bosses[4].health = 0;

        kill(&mut st, &tiers, 1);
        // Lap 3 is the last of phase 0; boss 5 waits at zero health.
        assert_eq!(st.cycle, 3);
        assert_eq!(st.bosses[4].health, 0);
        assert!(st.bosses[4].second_circuit);
        assert_eq!(st.bosses[0].health, 6_000_000);
        assert!(!st.bosses[0].second_circuit);
    }

    #[test]
    fn roll_back_within_phase() {
        let tiers = TierTable::default();
        let mut st = GroupState::new(1, GameServer::Cn, None, &tiers);
        st.cycle = 2;
        st.bosses[1].second_circuit = true;
        st.bosses[1].health = 123;

        roll_back(&mut st, &tiers, 1);
        assert_eq!(st.cycle, 1);
        assert_eq!(st.bosses[1].health, 0);
        assert_eq!(st.bosses[0].health, 6_000_000);
        assert_eq!(st.flags(), [true; 5]);
    }

    #[test]
    fn roll_back_across_phase_zeroes_all() {
        let tiers = TierTable::default();
        let mut st = GroupState::new(1, GameServer::Jp, None, &tiers);
        st.cycle = 4;
        roll_back(&mut st, &tiers, 3);
        assert_eq!(st.cycle, 3);
        assert!(st.all_dead());
    }

    #[test]
    fn lap_counter_stops_at_its_ceiling() {
        let tiers = TierTable::default();
        let mut st = GroupState::new(1, GameServer::Cn, None, &tiers);
        st.cycle = u32::MAX;
        for b in st.bosses.iter_mut().take(4) {
            b.second_circuit = true;
        }
        kill(&mut st, &tiers, 5);
        assert_eq!(st.cycle, u32::MAX);
        assert_eq!(st.flags(), [false; 5]);
    }
}
