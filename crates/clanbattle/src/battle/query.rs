use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ClanBattle;
use crate::error::BattleResult;
use crate::ledger::SlotFilter;
use crate::notify::Outbound;
use crate::report::{DailyCounts, MemberRow, ReportKey, ReportRow, ReportSlot};
use crate::roster::Role;
use crate::state::BossNum;
use crate::{DayKey, GroupId, Health, MemberId, SlotId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub member_id: MemberId,
    pub nickname: String,
    pub role: Role,
    pub save_slot_today: bool,
}

/// A kill shot from today whose carry-over is still unspent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCarryOver {
    pub member_id: MemberId,
    pub nickname: String,
    pub cycle: u32,
    pub boss: u8,
    pub damage: Health,
    pub continuation_seq: u32,
    pub message: Option<String>,
}

impl ClanBattle {
    /// Ledger rows, served from the report cache when possible.
    pub async fn ledger_report(
        &self,
        group_id: GroupId,
        slot: ReportSlot,
        member: Option<MemberId>,
        day: Option<DayKey>,
    ) -> BattleResult<Arc<Vec<ReportRow>>> {
        let book = self.book(group_id).await?;
        let data = book.data.lock().await;
        let key = ReportKey {
            group_id,
            slot: slot.resolve(data.state.slot_id),
            member,
            day,
        };
        if let Some(rows) = self.reports.lock().await.get(&key) {
            debug!(group_id, "report cache hit");
            return Ok(rows);
        }

        let server = data.state.server;
        let rows: Vec<ReportRow> = {
            let roster = self.roster.lock().await;
            data.ledger
                .query(key.slot, member, day)
                .map(|r| {
                    ReportRow::new(
                        r,
                        roster.nickname(r.attacker),
                        self.clock.to_unix(server, r.day, r.time),
                    )
                })
                .collect()
        };
        drop(data);

        let rows = Arc::new(rows);
        self.reports.lock().await.put(key, rows.clone());
        Ok(rows)
    }

    /// Distinct attackers found in a slot, by member id.
    pub async fn battle_members(&self, group_id: GroupId, slot: ReportSlot) -> BattleResult<Vec<MemberRow>> {
        let book = self.book(group_id).await?;
        let data = book.data.lock().await;
        let filter = slot.resolve(data.state.slot_id);
        let roster = self.roster.lock().await;
        let mut seen = BTreeMap::new();
        for r in data.ledger.query(filter, None, None) {
            seen.entry(r.attacker)
                .or_insert_with(|| roster.nickname(r.attacker));
        }
        Ok(seen
            .into_iter()
            .map(|(member_id, nickname)| MemberRow { member_id, nickname })
            .collect())
    }

    pub async fn member_list(&self, group_id: GroupId) -> BattleResult<Vec<MemberInfo>> {
        let book = self.book(group_id).await?;
        let server = book.data.lock().await.state.server;
        let today = self.clock.today(server).0;
        let roster = self.roster.lock().await;
        Ok(roster
            .members(group_id)
            .map(|m| MemberInfo {
                member_id: m.member_id,
                nickname: roster.nickname(m.member_id),
                role: roster.role_of(group_id, m.member_id).unwrap_or(m.role),
                save_slot_today: m.last_save_slot == Some(today),
            })
            .collect())
    }

    /// Whole-clan hit counts for a day (default today) in a slot (default
    /// the active one).
    pub async fn daily_counts(
        &self,
        group_id: GroupId,
        day: Option<DayKey>,
        slot: Option<SlotId>,
    ) -> BattleResult<DailyCounts> {
        let book = self.book(group_id).await?;
        let data = book.data.lock().await;
        let day = day.unwrap_or_else(|| self.clock.today(data.state.server).0);
        let slot = SlotFilter::One(slot.unwrap_or(data.state.slot_id));
        let mut counts = DailyCounts::default();
        for r in data.ledger.query(slot, None, Some(day)) {
            counts.add(r);
        }
        Ok(counts)
    }

    pub async fn pending_carry_overs(&self, group_id: GroupId) -> BattleResult<Vec<PendingCarryOver>> {
        let book = self.book(group_id).await?;
        let data = book.data.lock().await;
        let today = self.clock.today(data.state.server).0;
        let roster = self.roster.lock().await;
        Ok(data
            .ledger
            .query(SlotFilter::One(data.state.slot_id), None, Some(today))
            .filter(|r| r.has_unused_carry_over())
            .map(|r| PendingCarryOver {
                member_id: r.attacker,
                nickname: roster.nickname(r.attacker),
                cycle: r.cycle,
                boss: r.boss.get(),
                damage: r.damage,
                continuation_seq: r.continuation_seq,
                message: r.message.clone(),
            })
            .collect())
    }

    /// Lap line plus one block per living boss.
    pub async fn status_summary(&self, group_id: GroupId) -> BattleResult<String> {
        let book = self.book(group_id).await?;
        let data = book.data.lock().await;
        let st = &data.state;
        let full = self.cfg.tiers.row_for_cycle(st.server, st.cycle);

        let mut out = format!("lap {}\n", st.cycle);
        for (n, max) in BossNum::all().zip(full) {
            let b = st.boss(n);
            if b.health <= 0 {
                continue;
            }
            let _ = write!(out, "----------------------------\nboss {n} [{}/{}]", b.health, max);
            if b.second_circuit {
                out.push_str(" (second circuit)");
            }
            out.push('\n');
            let (attacking, hanging) = data.subs.head_counts(n);
            if attacking > 0 {
                let _ = writeln!(out, "attacking: {attacking}");
            }
            if hanging > 0 {
                let _ = writeln!(out, "on the tree: {hanging}");
            }
        }
        Ok(out)
    }

    /// Nudge members to finish today's hits, in the clan chat or one private
    /// message each.
    pub async fn send_remind(
        &self,
        group_id: GroupId,
        members: &[MemberId],
        sender: MemberId,
        private: bool,
    ) -> BattleResult<()> {
        self.book(group_id).await?;
        let sender_name = self.nickname(sender).await;
        let text = format!("{sender_name} reminds you to finish today's hits");
        if private {
            for m in members {
                self.notifier.send(Outbound::Private {
                    member_id: *m,
                    group_id,
                    text: text.clone(),
                });
            }
        } else {
            let roster = self.roster.lock().await;
            let mentions: Vec<String> = members
                .iter()
                .map(|m| format!("@{}", roster.nickname(*m)))
                .collect();
            drop(roster);
            self.notifier.group(group_id, format!("{}\n=======\n{text}", mentions.join(" ")));
        }
        debug!(group_id, sender, count = members.len(), private, "reminder queued");
        Ok(())
    }
}
