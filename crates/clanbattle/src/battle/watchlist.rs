use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ClanBattle, GroupEvent, Plan};
use crate::error::{BattleError, BattleResult};
use crate::roster::Roster;
use crate::state::BossNum;
use crate::subscribe::{InProgress, LapReservation, SubKind, Subscription, Subscriptions, TreeHang};
use crate::tier::MAX_CYCLE;
use crate::{GroupId, MemberId};

/// One watch-list entry as shown to members.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubView {
    pub sid: u64,
    pub kind: SubKind,
    pub member_id: MemberId,
    pub nickname: String,
    /// 0 = any boss.
    pub boss: u8,
    pub target_cycle: Option<u32>,
    pub message: Option<String>,
    pub elapsed_s: i64,
}

/// 0 means "any boss".
fn parse_watch_boss(n: u8) -> BattleResult<Option<BossNum>> {
    if n == 0 {
        return Ok(None);
    }
    BossNum::new(n)
        .map(Some)
        .ok_or_else(|| BattleError::input(format!("there is no boss {n}")))
}

fn require_member(roster: &Roster, group_id: GroupId, member_id: MemberId) -> BattleResult<()> {
    if roster.is_member(group_id, member_id) {
        Ok(())
    } else {
        Err(BattleError::group("join the clan first"))
    }
}

impl ClanBattle {
    /// Hang on the tree waiting for `boss` (0 = any) to die. Returns the entry id.
    pub async fn subscribe_tree_hang(
        &self,
        group_id: GroupId,
        member_id: MemberId,
        boss: u8,
        message: Option<String>,
    ) -> BattleResult<u64> {
        let boss = parse_watch_boss(boss)?;
        let book = self.book(group_id).await?;
        let mut data = book.data.lock().await;
        {
            let roster = self.roster.lock().await;
            require_member(&roster, group_id, member_id)?;
        }
        if data.subs.tree_hang_of(member_id).is_some() {
            return Err(BattleError::user("you are already hanging on the tree"));
        }

        let mut plan = Plan::new(&data);
        if plan.state().claimed_by(member_id) {
            let mut st = plan.state().clone();
            st.claim = None;
            plan.set_state(st);
            let stale: Vec<_> = plan
                .next
                .subs
                .in_progress()
                .iter()
                .filter(|s| s.member_id == member_id && s.boss == boss)
                .map(|s| (SubKind::InProgress, s.sid))
                .collect();
            plan.remove_subs(stale);
        }
        let sid = plan.next.subs.next_sid();
        plan.push(GroupEvent::SubAdded {
            sub: Subscription::TreeHang(TreeHang {
                sid,
                member_id,
                boss,
                message,
                created_at: self.clock.now_unix(),
            }),
        });

        self.finish(&book, &mut data, plan, "hanging on the tree".to_string())
            .await?;
        info!(group_id, member_id, sid, "tree hang added");
        Ok(sid)
    }

    /// Ask to be told when `boss` reaches lap `target_cycle`.
    pub async fn subscribe_lap_reservation(
        &self,
        group_id: GroupId,
        member_id: MemberId,
        boss: u8,
        target_cycle: u32,
        message: Option<String>,
    ) -> BattleResult<u64> {
        let boss = BossNum::new(boss)
            .ok_or_else(|| BattleError::input(format!("there is no boss {boss}")))?;
        if target_cycle == 0 {
            return Err(BattleError::input("lap must be at least 1"));
        }
        if target_cycle > MAX_CYCLE {
            return Err(BattleError::input(format!("lap cannot be above {MAX_CYCLE}")));
        }
        let book = self.book(group_id).await?;
        let mut data = book.data.lock().await;
        {
            let roster = self.roster.lock().await;
            require_member(&roster, group_id, member_id)?;
        }
        if data.subs.lap_of(member_id, boss).is_some() {
            return Err(BattleError::user(format!(
                "you already have a reservation on boss {boss}"
            )));
        }

        let mut plan = Plan::new(&data);
        let sid = plan.next.subs.next_sid();
        plan.push(GroupEvent::SubAdded {
            sub: Subscription::Lap(LapReservation {
                sid,
                member_id,
                boss,
                target_cycle,
                message,
                created_at: self.clock.now_unix(),
            }),
        });
        self.finish(&book, &mut data, plan, "lap reserved".to_string())
            .await?;
        info!(group_id, member_id, sid, target_cycle, "lap reservation added");
        Ok(sid)
    }

    /// Mark "I am attacking `boss` now". An existing marker is replaced when
    /// a new message (usually the current damage) comes with it.
    pub async fn subscribe_in_progress(
        &self,
        group_id: GroupId,
        member_id: MemberId,
        boss: u8,
        message: Option<String>,
    ) -> BattleResult<u64> {
        let boss = parse_watch_boss(boss)?;
        let book = self.book(group_id).await?;
        let mut data = book.data.lock().await;
        {
            let roster = self.roster.lock().await;
            require_member(&roster, group_id, member_id)?;
        }

        let mut plan = Plan::new(&data);
        let old = plan.next.subs.in_progress_of(member_id).map(|s| s.sid);
        if let Some(sid) = old {
            if message.is_none() {
                return Err(BattleError::user(
                    "you are already attacking; report your current damage to update it",
                ));
            }
            plan.push(GroupEvent::SubRemoved {
                kind: SubKind::InProgress,
                sid,
            });
        }
        if plan.state().claimed_by(member_id) {
            let mut st = plan.state().clone();
            st.claim = None;
            plan.set_state(st);
        }
        let sid = plan.next.subs.next_sid();
        plan.push(GroupEvent::SubAdded {
            sub: Subscription::InProgress(InProgress {
                sid,
                member_id,
                boss,
                message,
                created_at: self.clock.now_unix(),
            }),
        });
        self.finish(&book, &mut data, plan, "attack in progress".to_string())
            .await?;
        info!(group_id, member_id, sid, "in-progress marker set");
        Ok(sid)
    }

    async fn cancel_subs(
        &self,
        group_id: GroupId,
        pick: impl FnOnce(&Subscriptions) -> Vec<(SubKind, u64)>,
    ) -> BattleResult<usize> {
        let book = self.book(group_id).await?;
        let mut data = book.data.lock().await;
        let gone = pick(&data.subs);
        let n = gone.len();
        let mut plan = Plan::new(&data);
        plan.remove_subs(gone);
        self.finish(&book, &mut data, plan, String::new()).await?;
        Ok(n)
    }

    pub async fn cancel_tree_hang(&self, group_id: GroupId, member_id: MemberId) -> BattleResult<usize> {
        self.cancel_subs(group_id, |subs| {
            subs.tree_hangs()
                .iter()
                .filter(|s| s.member_id == member_id)
                .map(|s| (SubKind::TreeHang, s.sid))
                .collect()
        })
        .await
    }

    pub async fn cancel_lap_reservation(
        &self,
        group_id: GroupId,
        member_id: MemberId,
        boss: u8,
    ) -> BattleResult<usize> {
        self.cancel_subs(group_id, |subs| {
            subs.laps()
                .iter()
                .filter(|s| s.member_id == member_id && s.boss.get() == boss)
                .map(|s| (SubKind::Lap, s.sid))
                .collect()
        })
        .await
    }

    pub async fn cancel_in_progress(&self, group_id: GroupId, member_id: MemberId) -> BattleResult<usize> {
        self.cancel_subs(group_id, |subs| {
            subs.in_progress()
                .iter()
                .filter(|s| s.member_id == member_id)
                .map(|s| (SubKind::InProgress, s.sid))
                .collect()
        })
        .await
    }

    async fn sub_views(
        &self,
        group_id: GroupId,
        kind: SubKind,
        boss: Option<u8>,
    ) -> BattleResult<Vec<SubView>> {
        let book = self.book(group_id).await?;
        let data = book.data.lock().await;
        let roster = self.roster.lock().await;
        let now = self.clock.now_unix();

        let view = |sid: u64,
                    member_id: MemberId,
                    b: Option<BossNum>,
                    target_cycle: Option<u32>,
                    message: &Option<String>,
                    created_at: i64| SubView {
            sid,
            kind,
            member_id,
            nickname: roster.nickname(member_id),
            boss: b.map(BossNum::get).unwrap_or(0),
            target_cycle,
            message: message.clone(),
            elapsed_s: (now - created_at).max(0),
        };

        let mut out: Vec<SubView> = match kind {
            SubKind::TreeHang => data
                .subs
                .tree_hangs()
                .iter()
                .map(|s| view(s.sid, s.member_id, s.boss, None, &s.message, s.created_at))
                .collect(),
            SubKind::Lap => data
                .subs
                .laps()
                .iter()
                .map(|s| {
                    view(
                        s.sid,
                        s.member_id,
                        Some(s.boss),
                        Some(s.target_cycle),
                        &s.message,
                        s.created_at,
                    )
                })
                .collect(),
            SubKind::InProgress => data
                .subs
                .in_progress()
                .iter()
                .map(|s| view(s.sid, s.member_id, s.boss, None, &s.message, s.created_at))
                .collect(),
        };
        if let Some(b) = boss {
            out.retain(|v| v.boss == b);
        }
        out.sort_by_key(|v| (v.boss, v.sid));
        Ok(out)
    }

    pub async fn tree_hang_list(&self, group_id: GroupId, boss: Option<u8>) -> BattleResult<Vec<SubView>> {
        self.sub_views(group_id, SubKind::TreeHang, boss).await
    }

    pub async fn lap_reservation_list(
        &self,
        group_id: GroupId,
        boss: Option<u8>,
    ) -> BattleResult<Vec<SubView>> {
        self.sub_views(group_id, SubKind::Lap, boss).await
    }

    pub async fn in_progress_list(&self, group_id: GroupId, boss: Option<u8>) -> BattleResult<Vec<SubView>> {
        self.sub_views(group_id, SubKind::InProgress, boss).await
    }
}
