use tracing::info;

use super::{ClanBattle, Plan};
use crate::error::{BattleError, BattleResult};
use crate::state::{BossStatus, Claim, LockKind};
use crate::{GroupId, MemberId};

#[derive(Clone, Debug)]
pub struct ClaimRequest {
    pub group_id: GroupId,
    pub member_id: MemberId,
    pub kind: LockKind,
    /// Required for [`LockKind::Locked`].
    pub comment: Option<String>,
}

impl ClanBattle {
    pub async fn apply_claim(&self, req: ClaimRequest) -> BattleResult<BossStatus> {
        let comment = req
            .comment
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        if req.kind == LockKind::Locked && comment.is_none() {
            return Err(BattleError::input("locking the boss needs a comment"));
        }

        let book = self.book(req.group_id).await?;
        let mut data = book.data.lock().await;
        let (nick, holder) = {
            let roster = self.roster.lock().await;
            if !roster.is_member(req.group_id, req.member_id) {
                return Err(BattleError::UserNotInGroup);
            }
            let holder = data
                .state
                .claim
                .as_ref()
                .map(|c| (roster.nickname(c.member_id), c.clone()));
            (roster.nickname(req.member_id), holder)
        };

        if let Some((holder_nick, c)) = holder {
            let msg = match c.kind {
                LockKind::Attacking => format!("claim failed, {holder_nick} is attacking the boss"),
                LockKind::Locked => format!(
                    "claim failed, {holder_nick} locked the boss\ncomment: {}",
                    c.comment.as_deref().unwrap_or("")
                ),
            };
            return Err(BattleError::group(msg));
        }

        let info = match (req.kind, comment.as_deref()) {
            (LockKind::Attacking, _) => format!("{nick} started attacking the boss"),
            (LockKind::Locked, c) => {
                format!("{nick} locked the boss\ncomment: {}", c.unwrap_or(""))
            }
        };

        let mut plan = Plan::new(&data);
        let mut st = plan.state().clone();
        st.claim = Some(Claim {
            member_id: req.member_id,
            kind: req.kind,
            started_at: self.clock.now_unix(),
            comment,
        });
        plan.set_state(st);

        let status = self.finish(&book, &mut data, plan, info).await?;
        info!(
            group_id = req.group_id,
            member_id = req.member_id,
            kind = req.kind.as_str(),
            "boss claimed"
        );
        Ok(status)
    }

    /// Release the claim. The holder and clan admins can always do this;
    /// anyone else only once an attack claim has outlived the grace period.
    pub async fn cancel_claim(&self, group_id: GroupId, caller: MemberId) -> BattleResult<BossStatus> {
        let book = self.book(group_id).await?;
        let mut data = book.data.lock().await;
        let claim = data
            .state
            .claim
            .clone()
            .ok_or_else(|| BattleError::group("the boss is not claimed"))?;

        if claim.member_id != caller {
            let roster = self.roster.lock().await;
            if !roster.is_elevated(group_id, caller) {
                let held = self.clock.now_unix() - claim.started_at;
                let grace = i64::try_from(self.cfg.claim_grace.as_secs()).unwrap_or(i64::MAX);
                let attacking = claim.kind == LockKind::Attacking;
                if !attacking || held < grace {
                    let who = roster.nickname(claim.member_id);
                    let msg = if attacking {
                        format!("cancel failed, {who} started attacking the boss {held}s ago")
                    } else {
                        format!(
                            "cancel failed, {who} locked the boss {held}s ago\ncomment: {}",
                            claim.comment.as_deref().unwrap_or("")
                        )
                    };
                    return Err(BattleError::group(msg));
                }
            }
        }

        let mut plan = Plan::new(&data);
        let mut st = plan.state().clone();
        st.claim = None;
        plan.set_state(st);

        let status = self
            .finish(&book, &mut data, plan, "the boss can be claimed again".to_string())
            .await?;
        info!(group_id, member_id = caller, holder = claim.member_id, "claim cancelled");
        Ok(status)
    }
}
