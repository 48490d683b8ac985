//! Single-slot update signal per clan.
//!
//! The slot holds one pending one-shot. Observers clone a shared handle to it
//! and wait; a write resolves it once and swaps in a fresh one under the same
//! lock, so an observer sees each write at most once and never misses the
//! write that follows its registration.

use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::Shared;
use tokio::sync::{Mutex, oneshot};

use crate::state::BossStatus;

type Pending = Shared<oneshot::Receiver<Arc<BossStatus>>>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    Changed(Arc<BossStatus>),
    NotChanged,
}

impl WaitOutcome {
    pub fn changed(&self) -> Option<&BossStatus> {
        match self {
            WaitOutcome::Changed(s) => Some(s),
            WaitOutcome::NotChanged => None,
        }
    }
}

/// Handle to the slot as it was when the observer registered.
#[derive(Clone)]
pub struct UpdateWatch {
    pending: Pending,
}

impl UpdateWatch {
    /// Wait for the next write or give up after `timeout`. Dropping the
    /// future early leaves the slot untouched.
    pub async fn wait(self, timeout: Duration) -> WaitOutcome {
        match tokio::time::timeout(timeout, self.pending).await {
            Ok(Ok(status)) => WaitOutcome::Changed(status),
            // Sender dropped (slot torn down) or timed out.
            Ok(Err(_)) | Err(_) => WaitOutcome::NotChanged,
        }
    }
}

struct SlotInner {
    tx: Option<oneshot::Sender<Arc<BossStatus>>>,
    pending: Pending,
}

impl SlotInner {
    fn fresh() -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            tx: Some(tx),
            pending: rx.shared(),
        }
    }
}

pub struct UpdateSlot {
    inner: Mutex<SlotInner>,
}

impl Default for UpdateSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateSlot {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SlotInner::fresh()),
        }
    }

    pub async fn watch(&self) -> UpdateWatch {
        let inner = self.inner.lock().await;
        UpdateWatch {
            pending: inner.pending.clone(),
        }
    }

    /// Hand `status` to everyone currently waiting and arm a new slot.
    pub async fn resolve(&self, status: Arc<BossStatus>) {
        let mut inner = self.inner.lock().await;
        let old = std::mem::replace(&mut *inner, SlotInner::fresh());
        if let Some(tx) = old.tx {
            // No receivers left is fine; nobody was waiting.
            let _ = tx.send(status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::GroupState;
    use crate::tier::{GameServer, TierTable};

    fn status(info: &str) -> Arc<BossStatus> {
        let tiers = TierTable::default();
        let st = GroupState::new(1, GameServer::Cn, None, &tiers);
        Arc::new(BossStatus {
            snapshot: st.snapshot(&tiers),
            info: info.to_string(),
        })
    }

    #[tokio::test]
    async fn two_watchers_see_one_resolution() {
        let slot = Arc::new(UpdateSlot::new());
        let a = slot.watch().await;
        let b = slot.watch().await;

        let ta = tokio::spawn(a.wait(Duration::from_secs(5)));
        let tb = tokio::spawn(b.wait(Duration::from_secs(5)));
        slot.resolve(status("first")).await;

        let ra = ta.await.unwrap();
        let rb = tb.await.unwrap();
        assert_eq!(ra.changed().map(|s| s.info.as_str()), Some("first"));
        assert_eq!(ra, rb);

        // Next watcher waits on the new slot, not the resolved one.
        slot.resolve(status("second")).await;
        let c = slot.watch().await;
        slot.resolve(status("third")).await;
        let rc = c.wait(Duration::from_secs(5)).await;
        assert_eq!(rc.changed().map(|s| s.info.as_str()), Some("third"));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_without_change() {
        let slot = UpdateSlot::new();
        let w = slot.watch().await;
        assert_eq!(w.wait(Duration::from_secs(30)).await, WaitOutcome::NotChanged);
    }

    #[tokio::test]
    async fn cancelled_wait_does_not_break_slot() {
        let slot = UpdateSlot::new();
        let w = slot.watch().await;
        drop(w.clone().wait(Duration::from_secs(5)));
        slot.resolve(status("after")).await;
        let r = w.wait(Duration::from_millis(10)).await;
        assert_eq!(r.changed().map(|s| s.info.as_str()), Some("after"));
    }
}
