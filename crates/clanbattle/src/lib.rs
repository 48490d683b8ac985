//! Clan battle tracker.
//!
//! Keeps the boss/lap state machine of each clan, the ledger of attacks with
//! carry-over accounting and undo, the three subscription lists and the
//! per-clan update slot that long-polling observers wait on. Chat parsing,
//! HTTP and rendering live outside this crate and call into [`ClanBattle`].

pub mod battle;
pub mod broadcast;
pub mod carry;
pub mod clock;
pub mod config;
pub mod error;
pub mod journal;
pub mod ledger;
pub mod notify;
pub mod progress;
pub mod report;
pub mod roster;
pub mod state;
pub mod subscribe;
pub mod tier;

pub type GroupId = u64;
pub type MemberId = u64;
pub type Health = i64;
/// Game day number; rolls over at 05:00 server time.
pub type DayKey = i64;
/// Seconds since the start of the game day.
pub type TimeKey = i64;
pub type SlotId = u32;

pub const BOSS_COUNT: usize = 5;

pub use battle::{
    BattleTxn, ChallengeRequest, ClanBattle, ClaimRequest, GroupEvent, ModifyRequest, SaveSlotOp,
};
pub use broadcast::{UpdateWatch, WaitOutcome};
pub use clock::{FixedClock, GameClock, ServerClock};
pub use config::BattleConfig;
pub use error::{BattleError, BattleResult};
pub use ledger::{CarryOver, ChallengeRecord, Ledger, SlotFilter};
pub use notify::{Notifier, Outbound, OutboundSink};
pub use roster::{NotifyPreference, Role};
pub use state::{BossNum, BossSnapshot, BossStatus, Claim, GroupState, LockKind};
pub use tier::{GameServer, TierTable};
