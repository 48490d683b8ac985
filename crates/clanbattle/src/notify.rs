//! Fire-and-forget outbound messages to the chat layer.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{GroupId, MemberId};

#[derive(Clone, Debug)]
pub struct NotifyConfig {
    pub enabled: bool,
    pub channel_capacity: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel_capacity: 1024,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "to", rename_all = "snake_case")]
pub enum Outbound {
    Group {
        group_id: GroupId,
        text: String,
    },
    Private {
        member_id: MemberId,
        group_id: GroupId,
        text: String,
    },
}

/// Whatever actually puts text into the chat.
pub trait OutboundSink: Send + 'static {
    fn deliver(&mut self, msg: Outbound) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

#[derive(Clone, Debug)]
pub struct Notifier {
    tx: Option<mpsc::Sender<Outbound>>,
}

impl Notifier {
    /// Notifier plus the receiving end for [`delivery_task`]. A disabled
    /// notifier drops everything and returns no receiver.
    pub fn new(cfg: &NotifyConfig) -> (Self, Option<mpsc::Receiver<Outbound>>) {
        if !cfg.enabled {
            return (Self { tx: None }, None);
        }
        let (tx, rx) = mpsc::channel(cfg.channel_capacity.max(16));
        (Self { tx: Some(tx) }, Some(rx))
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Never blocks; a full or closed channel drops the message.
    pub fn send(&self, msg: Outbound) {
        let Some(tx) = self.tx.as_ref() else {
            return;
        };
        if let Err(e) = tx.try_send(msg) {
            warn!(err = %e, "outbound message dropped");
        }
    }

    pub fn group(&self, group_id: GroupId, text: impl Into<String>) {
        self.send(Outbound::Group {
            group_id,
            text: text.into(),
        });
    }

    pub fn private(&self, group_id: GroupId, member_id: MemberId, text: impl Into<String>) {
        self.send(Outbound::Private {
            member_id,
            group_id,
            text: text.into(),
        });
    }
}

/// Drain the channel into `sink` until every sender is gone.
pub async fn delivery_task<S: OutboundSink>(mut rx: mpsc::Receiver<Outbound>, mut sink: S) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = sink.deliver(msg).await {
            warn!(err = %e, "outbound delivery failed");
        }
    }
    debug!("outbound channel closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Collect(Arc<Mutex<Vec<Outbound>>>);

    impl OutboundSink for Collect {
        async fn deliver(&mut self, msg: Outbound) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(msg);
            Ok(())
        }
    }

    #[tokio::test]
    async fn delivers_in_order() {
        let (n, rx) = Notifier::new(&NotifyConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let task = tokio::spawn(delivery_task(rx.unwrap(), Collect(seen.clone())));

        n.group(1, "a");
        n.private(1, 7, "b");
        drop(n);
        task.await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(
            seen[1],
            Outbound::Private {
                member_id: 7,
                group_id: 1,
                text: "b".to_string()
            }
        );
    }

    #[test]
    fn full_channel_drops_without_blocking() {
        let cfg = NotifyConfig {
            enabled: true,
            channel_capacity: 1,
        };
        let (n, rx) = Notifier::new(&cfg);
        let mut rx = rx.unwrap();
        for i in 0..40 {
            n.group(1, format!("m{i}"));
        }
        let mut got = 0;
        while rx.try_recv().is_ok() {
            got += 1;
        }
        assert_eq!(got, 16);
    }

    #[test]
    fn disabled_has_no_receiver() {
        let cfg = NotifyConfig {
            enabled: false,
            ..NotifyConfig::default()
        };
        let (n, rx) = Notifier::new(&cfg);
        assert!(rx.is_none());
        n.group(1, "ignored");
    }
}
