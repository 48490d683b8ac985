use tracing::{debug, info, warn};

use super::{ClanBattle, GroupEvent, Plan};
use crate::carry::{DayTally, plan_seq};
use crate::error::{BattleError, BattleResult};
use crate::ledger::{CarryOver, ChallengeRecord, SlotFilter};
use crate::notify::Outbound;
use crate::progress;
use crate::roster::{NotifyPreference, Roster};
use crate::state::{BossNum, BossStatus, thousands};
use crate::subscribe::SubKind;
use crate::tier::MAX_CYCLE;
use crate::{BOSS_COUNT, GroupId, Health, MemberId};

/// A reported hit on a boss.
#[derive(Clone, Debug, Default)]
pub struct ChallengeRequest {
    pub group_id: GroupId,
    /// Member sending the report.
    pub recorder: MemberId,
    /// Member who actually attacked, when reporting for someone else.
    pub on_behalf_of: Option<MemberId>,
    pub boss: Option<u8>,
    pub defeat: bool,
    /// Required unless `defeat`.
    pub damage: Option<Health>,
    pub continuation: bool,
    /// 0 lets the engine pick the carry-over to spend.
    pub continuation_seq: u32,
    pub message: Option<String>,
    /// Post the hit to the previous game day.
    pub previous_day: bool,
}

/// Manual override of a clan's boss state.
#[derive(Clone, Debug)]
pub struct ModifyRequest {
    pub group_id: GroupId,
    pub caller: MemberId,
    pub cycle: Option<u32>,
    pub healths: [Health; BOSS_COUNT],
    pub second_circuit: [bool; BOSS_COUNT],
}

fn parse_boss(n: Option<u8>) -> BattleResult<BossNum> {
    let n = n.ok_or_else(|| BattleError::input("boss number is required"))?;
    BossNum::new(n).ok_or_else(|| BattleError::input(format!("there is no boss {n}")))
}

/// Chat messages for a kill: one batch for tree-hang and in-progress entries
/// on the boss, one for lap reservations whose lap has come.
fn plan_kill_notices(plan: &mut Plan, roster: &Roster, boss: BossNum) {
    let group_id = plan.state().group_id;

    let (th, ip) = plan.next.subs.kill_matches(boss);
    let mut fired: Vec<(SubKind, u64, MemberId, Option<String>)> = th
        .iter()
        .map(|s| (SubKind::TreeHang, s.sid, s.member_id, s.message.clone()))
        .chain(
            ip.iter()
                .map(|s| (SubKind::InProgress, s.sid, s.member_id, s.message.clone())),
        )
        .collect();
    fired.sort_by_key(|f| f.1);

    if !fired.is_empty() {
        let mut text = format!("boss {boss} is down");
        if let Some(c) = plan.state().boss(boss).commit.as_deref() {
            text.push('\n');
            text.push_str(c);
        }
        for (_, _, member, msg) in &fired {
            text.push_str(&format!("\n@{}", roster.nickname(*member)));
            if let Some(m) = msg {
                text.push(' ');
                text.push_str(m);
            }
        }
        plan.remove_subs(fired.iter().map(|f| (f.0, f.1)));
        plan.notify(Outbound::Group { group_id, text });
    }

    let laps: Vec<(u64, MemberId, u32, Option<String>)> = plan
        .next
        .subs
        .lap_matches(plan.state())
        .iter()
        .map(|s| (s.sid, s.member_id, s.target_cycle, s.message.clone()))
        .collect();
    if laps.is_empty() {
        return;
    }
    let mut text = String::from("your boss is up, come hit it");
    for (sid, member, target, msg) in laps {
        text.push_str(&format!("\n@{}", roster.nickname(member)));
        if let Some(m) = msg {
            text.push(' ');
            text.push_str(&m);
        }
        match roster.notify_preference(member) {
            Some(NotifyPreference::Once) => plan.push(GroupEvent::SubRemoved {
                kind: SubKind::Lap,
                sid,
            }),
            Some(NotifyPreference::Repeat) => plan.push(GroupEvent::LapTargetSet {
                sid,
                target_cycle: target.saturating_add(1),
            }),
            None => warn!(group_id, member_id = member, "lap reservation holder has no user record"),
        }
    }
    plan.notify(Outbound::Group { group_id, text });
}

impl ClanBattle {
    pub async fn record_challenge(&self, req: ChallengeRequest) -> BattleResult<BossStatus> {
        if !req.defeat {
            match req.damage {
                None => return Err(BattleError::input("damage is required unless the boss was defeated")),
                Some(d) if d < 0 => return Err(BattleError::input("damage cannot be negative")),
                _ => {}
            }
        }
        let boss = parse_boss(req.boss)?;

        let book = self.book(req.group_id).await?;
        let mut data = book.data.lock().await;
        let group_id = req.group_id;
        let server = data.state.server;
        let slot = data.state.slot_id;

        let health = data.state.boss(boss).health;
        let damage = req.damage.unwrap_or(health);
        if health == 0 || damage < 0 {
            return Err(BattleError::input(format!("boss {boss} is already dead")));
        }
        if !req.defeat && damage >= health {
            return Err(BattleError::input(
                "damage exceeds the remaining health; report it as a kill",
            ));
        }

        let attacker = req.on_behalf_of.unwrap_or(req.recorder);
        let recorded_by = req.on_behalf_of.map(|_| req.recorder);
        let roster = self.roster.lock().await;
        if !roster.is_member(group_id, attacker) {
            return Err(BattleError::UserNotInGroup);
        }

        let (mut day, mut time) = self.clock.today(server);
        if req.previous_day {
            if data.ledger.has_day(slot, day) {
                return Err(BattleError::group(
                    "today already has records; cannot post to yesterday",
                ));
            }
            day -= 1;
            time += 86_400;
        }

        let cap = self.cfg.daily_attempts;
        let slice = data.ledger.day_slice(slot, attacker, day);
        let tally = DayTally::from_records(slice.iter().copied());
        if tally.cap_reached(cap) {
            return Err(BattleError::input(if req.previous_day {
                format!("yesterday's reports already reached {cap}")
            } else {
                format!("today's reports already reached {cap}")
            }));
        }
        let continuation = req.continuation || tally.fresh_exhausted(cap);
        if continuation && !tally.can_continue() {
            return Err(BattleError::input("no carry-over left to use"));
        }
        let seq_plan = plan_seq(&slice, continuation, req.continuation_seq).ok_or_else(|| {
            BattleError::input("carry-over already used or no carry-over with that number")
        })?;

        let (remaining, recorded_damage) = if req.defeat {
            (0, health)
        } else {
            (health - damage, damage)
        };

        let mut plan = Plan::new(&data);
        let mut stale = plan.next.subs.transient_of(attacker, None);
        if let Some(lap) = plan.next.subs.lap_of(attacker, boss) {
            stale.push((SubKind::Lap, lap.sid));
        }
        plan.remove_subs(stale);

        if let Some(src) = seq_plan.consumes {
            plan.push(GroupEvent::CarryOverSet {
                seq: src,
                state: CarryOver::Used,
            });
        }

        let record = ChallengeRecord {
            seq: plan.next.ledger.next_seq(),
            group_id,
            slot_id: slot,
            attacker,
            day,
            time,
            cycle: data.state.cycle,
            boss,
            remaining,
            damage: recorded_damage,
            continuation,
            continuation_seq: seq_plan.continuation_seq,
            carry_over: CarryOver::Unused,
            second_circuit: data.state.boss(boss).second_circuit,
            message: req.message.clone(),
            recorded_by,
        };
        let seq = record.seq;
        plan.push(GroupEvent::RecordAdded { record });

        let mut st = plan.state().clone();
        st.boss_mut(boss).health = remaining;
        if req.defeat {
            progress::on_kill(&mut st, &self.cfg.tiers);
        }
        if st.claimed_by(attacker) {
            st.claim = None;
        }
        plan.set_state(st);

        if req.defeat {
            plan_kill_notices(&mut plan, &roster, boss);
        }

        let nick = roster.nickname(attacker);
        drop(roster);

        let mut info = if req.defeat {
            format!("{nick} dealt {} damage and defeated the boss", thousands(damage))
        } else {
            format!("{nick} dealt {} damage", thousands(damage))
        };
        let label = match (continuation, req.defeat) {
            (true, _) => "carry-over",
            (false, true) => "kill shot",
            (false, false) => "full hit",
        };
        info.push_str(&format!("\n(hit {} today, {label}", tally.next_ordinal()));
        if seq_plan.continuation_seq > 0 {
            info.push_str(&format!(" #{}", seq_plan.continuation_seq));
        }
        info.push(')');

        let status = self.finish(&book, &mut data, plan, info).await?;
        info!(
            group_id,
            member_id = attacker,
            boss = boss.get(),
            seq,
            damage = recorded_damage,
            continuation,
            "challenge recorded"
        );
        Ok(status)
    }

    /// Remove the newest record of the active slot and put the bosses back.
    pub async fn undo_last(&self, group_id: GroupId, caller: MemberId) -> BattleResult<BossStatus> {
        let book = self.book(group_id).await?;
        let mut data = book.data.lock().await;
        let slot = data.state.slot_id;

        let last = data
            .ledger
            .last(slot)
            .cloned()
            .ok_or_else(|| BattleError::group("this clan has no records to undo"))?;

        let nick = {
            let roster = self.roster.lock().await;
            if last.attacker != caller && !roster.is_elevated(group_id, caller) {
                return Err(BattleError::user(
                    "only the attacker or a clan admin can undo this record",
                ));
            }
            roster.nickname(last.attacker)
        };

        let mut plan = Plan::new(&data);
        plan.push(GroupEvent::RecordRemoved { seq: last.seq });

        if last.continuation && last.continuation_seq > 0 {
            let source = data
                .ledger
                .query(SlotFilter::One(slot), Some(last.attacker), Some(last.day))
                .find(|r| {
                    !r.continuation
                        && r.is_kill()
                        && r.is_used()
                        && r.continuation_seq == last.continuation_seq
                })
                .map(|r| r.seq);
            if let Some(seq) = source {
                plan.push(GroupEvent::CarryOverSet {
                    seq,
                    state: CarryOver::Unused,
                });
            }
        }

        let mut st = plan.state().clone();
        progress::roll_back(&mut st, &self.cfg.tiers, last.cycle);
        progress::restore_boss(
            &mut st,
            last.boss,
            last.remaining + last.damage,
            last.second_circuit,
        );
        plan.set_state(st);

        let status = self
            .finish(&book, &mut data, plan, format!("{nick}'s record was undone"))
            .await?;
        info!(group_id, seq = last.seq, member_id = last.attacker, "record undone");
        Ok(status)
    }

    pub async fn modify_state(&self, req: ModifyRequest) -> BattleResult<BossStatus> {
        match req.cycle {
            Some(0) => return Err(BattleError::input("lap must be at least 1")),
            Some(c) if c > MAX_CYCLE => {
                return Err(BattleError::input(format!("lap cannot be above {MAX_CYCLE}")));
            }
            _ => {}
        }
        if req.healths.iter().any(|h| *h < 0) {
            return Err(BattleError::input("boss health cannot be negative"));
        }
        if req.healths.iter().all(|h| *h == 0) {
            return Err(BattleError::input("boss health cannot all be zero"));
        }

        let book = self.book(req.group_id).await?;
        let mut data = book.data.lock().await;
        {
            let roster = self.roster.lock().await;
            Self::require_elevated(&roster, req.group_id, req.caller, "modify the boss state")?;
        }

        let mut plan = Plan::new(&data);
        let mut st = plan.state().clone();
        if let Some(c) = req.cycle {
            st.cycle = c;
        }
        for (i, b) in st.bosses.iter_mut().enumerate() {
            b.health = req.healths[i];
            b.second_circuit = req.second_circuit[i];
        }
        plan.set_state(st);

        let status = self
            .finish(&book, &mut data, plan, "boss state modified".to_string())
            .await?;
        info!(group_id = req.group_id, cycle = status.snapshot.cycle, "boss state modified");
        Ok(status)
    }

    /// Leave (or clear, with `None`) a note on a boss, shown when it dies.
    pub async fn commit_message(
        &self,
        group_id: GroupId,
        caller: MemberId,
        boss: u8,
        text: Option<String>,
    ) -> BattleResult<BossStatus> {
        let boss = parse_boss(Some(boss))?;
        let book = self.book(group_id).await?;
        let mut data = book.data.lock().await;
        let nick = {
            let roster = self.roster.lock().await;
            Self::require_elevated(&roster, group_id, caller, "leave boss notes")?;
            roster.nickname(caller)
        };

        let mut plan = Plan::new(&data);
        let mut st = plan.state().clone();
        st.boss_mut(boss).commit = text.map(|t| format!("{t} (left by {nick})"));
        plan.set_state(st);

        debug!(group_id, boss = boss.get(), "boss note set");
        self.finish(&book, &mut data, plan, format!("note left on boss {boss}"))
            .await
    }
}
