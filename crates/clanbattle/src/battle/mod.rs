//! The clan battle engine.
//!
//! Every mutating operation follows the same path: validate and plan against
//! a copy of the clan's data, journal the resulting [`BattleTxn`], apply its
//! events to memory, then resolve the clan's update slot and hand any chat
//! messages to the notifier. An error anywhere before the journal append
//! leaves nothing changed.

mod challenge;
mod claim;
mod query;
mod slot;
mod watchlist;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::broadcast::{UpdateSlot, UpdateWatch, WaitOutcome};
use crate::clock::GameClock;
use crate::config::BattleConfig;
use crate::error::{BattleError, BattleResult};
use crate::journal::Journal;
use crate::ledger::{CarryOver, ChallengeRecord, Ledger};
use crate::notify::{Notifier, Outbound};
use crate::report::ReportCache;
use crate::roster::{NotifyPreference, Role, Roster, RosterEvent};
use crate::state::{BossStatus, GroupState};
use crate::subscribe::{SubKind, Subscription, Subscriptions};
use crate::tier::{GameServer, TierTable};
use crate::{GroupId, MemberId, SlotId};

pub use challenge::{ChallengeRequest, ModifyRequest};
pub use claim::ClaimRequest;
pub use query::{MemberInfo, PendingCarryOver};
pub use slot::SaveSlotOp;
pub use watchlist::SubView;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum GroupEvent {
    Created { state: GroupState },
    StateSet { state: GroupState },
    RecordAdded { record: ChallengeRecord },
    RecordRemoved { seq: u64 },
    CarryOverSet { seq: u64, state: CarryOver },
    SlotCleared { slot_id: SlotId },
    SubAdded { sub: Subscription },
    SubRemoved { kind: SubKind, sid: u64 },
    LapTargetSet { sid: u64, target_cycle: u32 },
}

/// One committed operation; the unit written to the journal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleTxn {
    #[serde(default)]
    pub group_id: Option<GroupId>,
    #[serde(default)]
    pub group: Vec<GroupEvent>,
    #[serde(default)]
    pub roster: Vec<RosterEvent>,
}

#[derive(Clone, Debug)]
pub(crate) struct GroupData {
    pub(crate) state: GroupState,
    pub(crate) ledger: Ledger,
    pub(crate) subs: Subscriptions,
}

impl GroupData {
    fn new(state: GroupState) -> Self {
        Self {
            state,
            ledger: Ledger::new(),
            subs: Subscriptions::default(),
        }
    }

    fn apply(&mut self, e: &GroupEvent) {
        match e {
            // Handled by whoever owns the map of clans.
            GroupEvent::Created { .. } => {}
            GroupEvent::StateSet { state } => self.state = state.clone(),
            GroupEvent::RecordAdded { record } => self.ledger.append(record.clone()),
            GroupEvent::RecordRemoved { seq } => {
                self.ledger.remove(*seq);
            }
            GroupEvent::CarryOverSet { seq, state } => {
                self.ledger.set_carry_over(*seq, *state);
            }
            GroupEvent::SlotCleared { slot_id } => {
                self.ledger.clear_slot(*slot_id);
            }
            GroupEvent::SubAdded { sub } => self.subs.insert(sub.clone()),
            GroupEvent::SubRemoved { kind, sid } => {
                self.subs.remove(*kind, *sid);
            }
            GroupEvent::LapTargetSet { sid, target_cycle } => {
                self.subs.set_lap_target(*sid, *target_cycle)
            }
        }
    }
}

/// Pending changes to one clan, applied to a private copy as they are added
/// so later planning steps see earlier ones.
pub(crate) struct Plan {
    next: GroupData,
    events: Vec<GroupEvent>,
    roster: Vec<RosterEvent>,
    outbound: Vec<Outbound>,
    state_changed: bool,
}

impl Plan {
    fn new(data: &GroupData) -> Self {
        Self {
            next: data.clone(),
            events: Vec::new(),
            roster: Vec::new(),
            outbound: Vec::new(),
            state_changed: false,
        }
    }

    fn push(&mut self, e: GroupEvent) {
        self.next.apply(&e);
        self.events.push(e);
    }

    fn state(&self) -> &GroupState {
        &self.next.state
    }

    fn set_state(&mut self, state: GroupState) {
        self.push(GroupEvent::StateSet { state });
        self.state_changed = true;
    }

    fn remove_subs(&mut self, subs: impl IntoIterator<Item = (SubKind, u64)>) {
        for (kind, sid) in subs {
            self.push(GroupEvent::SubRemoved { kind, sid });
        }
    }

    fn roster(&mut self, e: RosterEvent) {
        self.roster.push(e);
    }

    fn notify(&mut self, msg: Outbound) {
        self.outbound.push(msg);
    }
}

pub(crate) struct GroupBook {
    data: Mutex<GroupData>,
    updates: UpdateSlot,
}

impl GroupBook {
    fn new(data: GroupData) -> Self {
        Self {
            data: Mutex::new(data),
            updates: UpdateSlot::new(),
        }
    }
}

pub struct ClanBattle {
    cfg: BattleConfig,
    clock: Arc<dyn GameClock>,
    notifier: Notifier,
    // Lock order: books map (briefly), a clan's data, roster, journal.
    books: Mutex<HashMap<GroupId, Arc<GroupBook>>>,
    roster: Mutex<Roster>,
    journal: Mutex<Option<Journal<BattleTxn>>>,
    reports: Mutex<ReportCache>,
}

fn replay_txn(groups: &mut HashMap<GroupId, GroupData>, roster: &mut Roster, txn: &BattleTxn) {
    for e in &txn.group {
        if let GroupEvent::Created { state } = e {
            groups.insert(state.group_id, GroupData::new(state.clone()));
            continue;
        }
        let Some(gid) = txn.group_id else {
            continue;
        };
        match groups.get_mut(&gid) {
            Some(g) => g.apply(e),
            None => warn!(group_id = gid, "journal event for unknown clan"),
        }
    }
    for e in &txn.roster {
        roster.apply(e);
    }
}

impl ClanBattle {
    /// Engine without a journal, regardless of `cfg.journal_path`.
    pub fn in_memory(cfg: BattleConfig, clock: Arc<dyn GameClock>, notifier: Notifier) -> Self {
        Self::assemble(cfg, clock, notifier, HashMap::new(), None, None)
    }

    /// Open the configured journal (if any) and rebuild every clan from it.
    pub fn open(
        cfg: BattleConfig,
        clock: Arc<dyn GameClock>,
        notifier: Notifier,
    ) -> anyhow::Result<Self> {
        let Some(path) = cfg.journal_path.clone() else {
            return Ok(Self::in_memory(cfg, clock, notifier));
        };

        let (journal, replay) = Journal::<BattleTxn>::open(path)?;
        let mut groups = HashMap::new();
        let mut roster = Roster::new(cfg.super_admins.iter().copied());
        for env in &replay {
            replay_txn(&mut groups, &mut roster, &env.entry);
        }
        info!(
            path = %journal.path().display(),
            entries = replay.len(),
            clans = groups.len(),
            "journal replayed"
        );
        Ok(Self::assemble(
            cfg,
            clock,
            notifier,
            groups,
            Some(roster),
            Some(journal),
        ))
    }

    fn assemble(
        cfg: BattleConfig,
        clock: Arc<dyn GameClock>,
        notifier: Notifier,
        groups: HashMap<GroupId, GroupData>,
        roster: Option<Roster>,
        journal: Option<Journal<BattleTxn>>,
    ) -> Self {
        let roster = roster.unwrap_or_else(|| Roster::new(cfg.super_admins.iter().copied()));
        let books = groups
            .into_iter()
            .map(|(id, d)| (id, Arc::new(GroupBook::new(d))))
            .collect();
        let reports = ReportCache::new(cfg.report_cache_ttl, cfg.report_cache_max);
        Self {
            cfg,
            clock,
            notifier,
            books: Mutex::new(books),
            roster: Mutex::new(roster),
            journal: Mutex::new(journal),
            reports: Mutex::new(reports),
        }
    }

    pub fn config(&self) -> &BattleConfig {
        &self.cfg
    }

    pub fn tiers(&self) -> &TierTable {
        &self.cfg.tiers
    }

    pub fn clock(&self) -> &dyn GameClock {
        self.clock.as_ref()
    }

    async fn book(&self, group_id: GroupId) -> BattleResult<Arc<GroupBook>> {
        self.books
            .lock()
            .await
            .get(&group_id)
            .cloned()
            .ok_or(BattleError::GroupNotExist)
    }

    pub async fn group_ids(&self) -> Vec<GroupId> {
        let mut ids: Vec<GroupId> = self.books.lock().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    async fn append(&self, txn: &BattleTxn) -> BattleResult<()> {
        let mut journal = self.journal.lock().await;
        let Some(j) = journal.as_mut() else {
            return Ok(());
        };
        let ms = u64::try_from(self.clock.now_unix().saturating_mul(1000)).unwrap_or(0);
        j.append(ms, txn).map_err(|e| {
            warn!(err = %e, group_id = ?txn.group_id, "journal append failed");
            BattleError::Internal(e)
        })?;
        Ok(())
    }

    async fn commit(
        &self,
        group_id: GroupId,
        data: &mut GroupData,
        events: Vec<GroupEvent>,
        roster_events: Vec<RosterEvent>,
    ) -> BattleResult<()> {
        if events.is_empty() && roster_events.is_empty() {
            return Ok(());
        }
        let txn = BattleTxn {
            group_id: Some(group_id),
            group: events,
            roster: roster_events,
        };

        let mut roster = if txn.roster.is_empty() {
            None
        } else {
            Some(self.roster.lock().await)
        };
        self.append(&txn).await?;
        for e in &txn.group {
            data.apply(e);
        }
        if let Some(r) = roster.as_mut() {
            for e in &txn.roster {
                r.apply(e);
            }
        }
        drop(roster);

        self.reports.lock().await.invalidate_group(group_id);
        Ok(())
    }

    async fn commit_roster(&self, group_id: Option<GroupId>, events: Vec<RosterEvent>) -> BattleResult<()> {
        if events.is_empty() {
            return Ok(());
        }
        let txn = BattleTxn {
            group_id,
            group: Vec::new(),
            roster: events,
        };
        let mut roster = self.roster.lock().await;
        self.append(&txn).await?;
        for e in &txn.roster {
            roster.apply(e);
        }
        drop(roster);
        if let Some(gid) = group_id {
            self.reports.lock().await.invalidate_group(gid);
        }
        Ok(())
    }

    /// Commit a plan, wake observers if the boss state moved, and queue its
    /// chat messages.
    async fn finish(
        &self,
        book: &GroupBook,
        data: &mut GroupData,
        plan: Plan,
        info: String,
    ) -> BattleResult<BossStatus> {
        let Plan {
            events,
            roster,
            outbound,
            state_changed,
            ..
        } = plan;
        let group_id = data.state.group_id;
        self.commit(group_id, data, events, roster).await?;

        let status = BossStatus {
            snapshot: data.state.snapshot(&self.cfg.tiers),
            info,
        };
        if state_changed {
            book.updates.resolve(Arc::new(status.clone())).await;
        }
        for m in outbound {
            self.notifier.send(m);
        }
        Ok(status)
    }

    fn require_elevated(roster: &Roster, group_id: GroupId, member: MemberId, what: &str) -> BattleResult<()> {
        if roster.is_elevated(group_id, member) {
            Ok(())
        } else {
            Err(BattleError::user(format!("only clan admins can {what}")))
        }
    }

    pub async fn create_group(
        &self,
        group_id: GroupId,
        server: GameServer,
        name: Option<String>,
    ) -> BattleResult<BossStatus> {
        let mut books = self.books.lock().await;
        if books.contains_key(&group_id) {
            return Err(BattleError::group("clan already exists"));
        }
        let state = GroupState::new(group_id, server, name, &self.cfg.tiers);
        let txn = BattleTxn {
            group_id: Some(group_id),
            group: vec![GroupEvent::Created {
                state: state.clone(),
            }],
            roster: Vec::new(),
        };
        self.append(&txn).await?;
        let snapshot = state.snapshot(&self.cfg.tiers);
        books.insert(group_id, Arc::new(GroupBook::new(GroupData::new(state))));
        info!(group_id, server = server.as_str(), "clan created");
        Ok(BossStatus {
            snapshot,
            info: "clan created".to_string(),
        })
    }

    pub async fn boss_status(&self, group_id: GroupId) -> BattleResult<BossStatus> {
        let book = self.book(group_id).await?;
        let data = book.data.lock().await;
        Ok(BossStatus {
            snapshot: data.state.snapshot(&self.cfg.tiers),
            info: String::new(),
        })
    }

    /// Switch the clan to another server's tiers. Boss health is left alone;
    /// it picks up the new tiers as bosses respawn.
    pub async fn change_game_server(
        &self,
        group_id: GroupId,
        caller: MemberId,
        server: GameServer,
    ) -> BattleResult<BossStatus> {
        let book = self.book(group_id).await?;
        let mut data = book.data.lock().await;
        {
            let roster = self.roster.lock().await;
            Self::require_elevated(&roster, group_id, caller, "change the game server")?;
        }
        let mut plan = Plan::new(&data);
        let mut st = plan.state().clone();
        st.server = server;
        plan.set_state(st);
        let status = self
            .finish(&book, &mut data, plan, format!("game server set to {}", server.as_str()))
            .await?;
        info!(group_id, server = server.as_str(), "game server changed");
        Ok(status)
    }

    /// Add a member (or refresh their nickname). An existing membership keeps
    /// its role.
    pub async fn bind_member(
        &self,
        group_id: GroupId,
        member_id: MemberId,
        nickname: Option<String>,
        role: Role,
    ) -> BattleResult<()> {
        self.book(group_id).await?;
        let existing = {
            let roster = self.roster.lock().await;
            roster.membership(group_id, member_id).map(|m| m.role)
        };
        let mut events = Vec::new();
        if nickname.is_some() {
            events.push(RosterEvent::UserNickname {
                member_id,
                nickname,
            });
        }
        if existing.is_none() {
            events.push(RosterEvent::MemberSet {
                group_id,
                member_id,
                role: Some(role),
            });
        }
        self.commit_roster(Some(group_id), events).await?;
        info!(group_id, member_id, "member bound");
        Ok(())
    }

    pub async fn set_role(
        &self,
        group_id: GroupId,
        caller: MemberId,
        member_id: MemberId,
        role: Role,
    ) -> BattleResult<()> {
        self.book(group_id).await?;
        {
            let roster = self.roster.lock().await;
            Self::require_elevated(&roster, group_id, caller, "change roles")?;
            if !roster.is_member(group_id, member_id) {
                return Err(BattleError::UserNotInGroup);
            }
        }
        self.commit_roster(
            Some(group_id),
            vec![RosterEvent::MemberSet {
                group_id,
                member_id,
                role: Some(role),
            }],
        )
        .await
    }

    /// Remove members from the clan; returns how many were actually members.
    pub async fn drop_members(&self, group_id: GroupId, members: &[MemberId]) -> BattleResult<usize> {
        self.book(group_id).await?;
        let events: Vec<RosterEvent> = {
            let roster = self.roster.lock().await;
            members
                .iter()
                .filter(|m| roster.is_member(group_id, **m))
                .map(|m| RosterEvent::MemberSet {
                    group_id,
                    member_id: *m,
                    role: None,
                })
                .collect()
        };
        let n = events.len();
        self.commit_roster(Some(group_id), events).await?;
        info!(group_id, dropped = n, "members dropped");
        Ok(n)
    }

    pub async fn set_nickname(&self, member_id: MemberId, nickname: Option<String>) -> BattleResult<()> {
        self.commit_roster(
            None,
            vec![RosterEvent::UserNickname {
                member_id,
                nickname,
            }],
        )
        .await?;
        self.reports.lock().await.clear();
        Ok(())
    }

    pub async fn set_notify_preference(&self, member_id: MemberId, notify: NotifyPreference) -> BattleResult<()> {
        self.commit_roster(None, vec![RosterEvent::UserNotify { member_id, notify }])
            .await
    }

    pub async fn nickname(&self, member_id: MemberId) -> String {
        self.roster.lock().await.nickname(member_id)
    }

    /// Register on the clan's current update slot.
    pub async fn watch_updates(&self, group_id: GroupId) -> BattleResult<UpdateWatch> {
        let book = self.book(group_id).await?;
        Ok(book.updates.watch().await)
    }

    /// Wait for the next state change, up to `timeout` (default from config).
    pub async fn wait_for_update(
        &self,
        group_id: GroupId,
        timeout: Option<Duration>,
    ) -> BattleResult<WaitOutcome> {
        let watch = self.watch_updates(group_id).await?;
        Ok(watch.wait(timeout.unwrap_or(self.cfg.update_wait)).await)
    }
}
