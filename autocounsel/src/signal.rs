//! Transient UI signals (JavaScript dialogs) and scoped subscriptions to them.
//!
//! A driver owns one [`SignalHub`] and publishes every signal it observes into
//! it. Interested code takes a [`SignalSubscription`] before triggering the
//! action that may raise a signal and drops it afterwards; dropping the
//! subscription unregisters it, so nothing leaks past one save attempt.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    /// alert / confirm / prompt / beforeunload
    Dialog,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiSignal {
    pub kind: SignalKind,
    pub message: String,
    /// Whether the driver accepted (rather than dismissed) the signal.
    pub accepted: bool,
}

impl UiSignal {
    pub fn dialog(message: impl Into<String>, accepted: bool) -> Self {
        Self {
            kind: SignalKind::Dialog,
            message: message.into(),
            accepted,
        }
    }
}

struct Subscriber {
    id: u64,
    kind: SignalKind,
    sender: mpsc::UnboundedSender<UiSignal>,
}

#[derive(Default)]
struct HubInner {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

fn lock(inner: &Mutex<HubInner>) -> MutexGuard<'_, HubInner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone, Default)]
pub struct SignalHub {
    inner: Arc<Mutex<HubInner>>,
}

impl SignalHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, kind: SignalKind) -> SignalSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut inner = lock(&self.inner);
        inner.next_id += 1;
        let id = inner.next_id;
        inner.subscribers.push(Subscriber { id, kind, sender });
        debug!(id, ?kind, "signal subscription opened");
        SignalSubscription {
            id,
            kind,
            receiver,
            hub: Arc::downgrade(&self.inner),
        }
    }

    pub fn has_subscribers(&self, kind: SignalKind) -> bool {
        lock(&self.inner)
            .subscribers
            .iter()
            .any(|s| s.kind == kind && !s.sender.is_closed())
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner).subscribers.len()
    }

    /// Deliver a signal to every live subscriber of its kind. Returns how many
    /// subscribers received it.
    pub fn publish(&self, signal: UiSignal) -> usize {
        let mut inner = lock(&self.inner);
        inner.subscribers.retain(|s| !s.sender.is_closed());
        let mut delivered = 0;
        for subscriber in inner.subscribers.iter().filter(|s| s.kind == signal.kind) {
            if subscriber.sender.send(signal.clone()).is_ok() {
                delivered += 1;
            }
        }
        debug!(kind = ?signal.kind, delivered, "signal published");
        delivered
    }
}

/// A registration with a [`SignalHub`], released when dropped.
pub struct SignalSubscription {
    id: u64,
    kind: SignalKind,
    receiver: mpsc::UnboundedReceiver<UiSignal>,
    hub: Weak<Mutex<HubInner>>,
}

impl SignalSubscription {
    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    /// Next signal if one is already queued.
    pub fn try_next(&mut self) -> Option<UiSignal> {
        self.receiver.try_recv().ok()
    }

    /// Every signal queued so far, oldest first.
    pub fn drain(&mut self) -> Vec<UiSignal> {
        let mut signals = Vec::new();
        while let Some(signal) = self.try_next() {
            signals.push(signal);
        }
        signals
    }

    pub async fn recv(&mut self) -> Option<UiSignal> {
        self.receiver.recv().await
    }
}

impl Drop for SignalSubscription {
    fn drop(&mut self) {
        self.receiver.close();
        if let Some(hub) = self.hub.upgrade() {
            lock(&hub).subscribers.retain(|s| s.id != self.id);
            debug!(id = self.id, "signal subscription released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_receives_published_signals() {
        let hub = SignalHub::new();
        let mut sub = hub.subscribe(SignalKind::Dialog);
        assert!(hub.has_subscribers(SignalKind::Dialog));

        assert_eq!(hub.publish(UiSignal::dialog("저장되었습니다.", true)), 1);
        let signals = sub.drain();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].message, "저장되었습니다.");
        assert!(sub.try_next().is_none());
    }

    #[test]
    fn test_drop_releases_subscription() {
        let hub = SignalHub::new();
        {
            let _sub = hub.subscribe(SignalKind::Dialog);
            assert_eq!(hub.subscriber_count(), 1);
        }
        assert_eq!(hub.subscriber_count(), 0);
        assert!(!hub.has_subscribers(SignalKind::Dialog));
        assert_eq!(hub.publish(UiSignal::dialog("nobody listens", false)), 0);
    }

    #[test]
    fn test_signals_before_subscribing_are_not_replayed() {
        let hub = SignalHub::new();
        hub.publish(UiSignal::dialog("early", true));
        let mut sub = hub.subscribe(SignalKind::Dialog);
        assert!(sub.drain().is_empty());
    }

    #[test]
    fn test_subscription_outliving_hub_drops_cleanly() {
        let hub = SignalHub::new();
        let sub = hub.subscribe(SignalKind::Dialog);
        drop(hub);
        drop(sub);
    }
}
