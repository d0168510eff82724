//! The event bus and per-connection coalescing buffer.
//!
//! A characteristic write fans out `{aid, iid, value}` to every connection
//! subscribed to that `(aid, iid)` pair, except the connection that caused
//! the write (so a controller never sees an echo of its own write). Each
//! connection accumulates pending events locally and flushes them as one
//! batched `EVENT/1.0` frame, either immediately or after a short
//! coalescing delay.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::time::Duration;

use serde_json::Value as Json;
use tokio::sync::mpsc;

use crate::SyncMutex;

/// How long a non-immediate event waits for siblings before it is flushed
/// on its own.
pub const COALESCE_DELAY: Duration = Duration::from_millis(500);

/// A `(aid, iid)` pair identifying one characteristic's event topic.
pub type Topic = (u64, u64);

/// A single `{aid, iid, value}` update delivered to a subscribed
/// connection.
#[derive(Clone, Debug)]
pub struct Update {
    pub aid: u64,
    pub iid: u64,
    pub value: Json,
}

/// Process-wide subscription registry and fan-out point. The driver owns
/// one instance and every connection registers a channel with it on
/// startup.
#[derive(Debug, Default)]
pub struct EventBus {
    subscriptions: SyncMutex<HashMap<Topic, HashSet<SocketAddr>>>,
    senders: SyncMutex<HashMap<SocketAddr, mpsc::UnboundedSender<Update>>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection's delivery channel. Call once per connection
    /// before it can subscribe to any topic.
    pub fn register(&self, peer: SocketAddr, sender: mpsc::UnboundedSender<Update>) {
        self.senders.lock().insert(peer, sender);
    }

    /// Drops a connection's channel and every subscription it held.
    pub fn unregister(&self, peer: SocketAddr) {
        self.senders.lock().remove(&peer);
        let mut subs = self.subscriptions.lock();
        subs.retain(|_, peers| {
            peers.remove(&peer);
            !peers.is_empty()
        });
    }

    pub fn subscribe(&self, peer: SocketAddr, topic: Topic) {
        self.subscriptions.lock().entry(topic).or_default().insert(peer);
    }

    pub fn unsubscribe(&self, peer: SocketAddr, topic: Topic) {
        if let Some(peers) = self.subscriptions.lock().get_mut(&topic) {
            peers.remove(&peer);
        }
    }

    /// Delivers `value` to every peer subscribed to `topic`, except
    /// `sender` (the connection whose write caused the update, if any).
    pub fn publish(&self, topic: Topic, value: Json, sender: Option<SocketAddr>) {
        let targets: Vec<SocketAddr> = match self.subscriptions.lock().get(&topic) {
            Some(peers) => peers
                .iter()
                .copied()
                .filter(|peer| Some(*peer) != sender)
                .collect(),
            None => return,
        };
        if targets.is_empty() {
            return;
        }
        let senders = self.senders.lock();
        let update = Update {
            aid: topic.0,
            iid: topic.1,
            value,
        };
        for peer in targets {
            if let Some(tx) = senders.get(&peer) {
                // A closed receiver just means the connection is tearing
                // down; unregister() will clean up its subscriptions.
                let _ = tx.send(update.clone());
            }
        }
    }
}

/// Per-connection accumulator for events awaiting a batched flush. The
/// latest value for a topic wins if multiple updates arrive before the
/// flush.
#[derive(Debug, Default)]
pub struct PendingEvents {
    pending: HashMap<Topic, Json>,
    flush_due: bool,
}

impl PendingEvents {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an update. Returns `true` if the caller should flush on the
    /// next scheduler tick rather than wait out the coalescing timer.
    pub fn push(&mut self, topic: Topic, value: Json, immediate: bool) -> bool {
        self.pending.insert(topic, value);
        if immediate {
            self.flush_due = true;
        }
        immediate
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    #[must_use]
    pub fn should_flush_immediately(&self) -> bool {
        self.flush_due
    }

    /// Drains every pending update, building the `characteristics` array
    /// body for one `EVENT/1.0` frame.
    pub fn drain(&mut self) -> Vec<Update> {
        self.flush_due = false;
        self.pending
            .drain()
            .map(|((aid, iid), value)| Update { aid, iid, value })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    #[tokio::test]
    async fn delivers_to_subscribed_peers_only() {
        let bus = EventBus::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        bus.register(peer(1), tx_a);
        bus.register(peer(2), tx_b);
        bus.subscribe(peer(1), (1, 10));

        bus.publish((1, 10), Json::Bool(true), None);

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn excludes_the_originating_sender() {
        let bus = EventBus::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        bus.register(peer(1), tx_a);
        bus.subscribe(peer(1), (1, 10));

        bus.publish((1, 10), Json::Bool(true), Some(peer(1)));

        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregister_drops_subscriptions() {
        let bus = EventBus::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        bus.register(peer(1), tx_a);
        bus.subscribe(peer(1), (1, 10));
        bus.unregister(peer(1));

        bus.publish((1, 10), Json::Bool(true), None);
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn latest_value_wins_before_flush() {
        let mut pending = PendingEvents::new();
        pending.push((1, 10), Json::Bool(false), false);
        pending.push((1, 10), Json::Bool(true), false);
        let drained = pending.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].value, Json::Bool(true));
    }

    #[test]
    fn immediate_push_requests_flush() {
        let mut pending = PendingEvents::new();
        assert!(!pending.should_flush_immediately());
        pending.push((1, 10), Json::Bool(true), true);
        assert!(pending.should_flush_immediately());
    }
}
