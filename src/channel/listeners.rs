//! Listener registries and the events they receive.

use std::{
    fmt,
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use bytes::Bytes;

use crate::{consumer::CallbackResult, error::ShutdownSignal, panic::lock, protocol::BasicProperties};

/// Identifies a registered listener for later removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "ListenerId({})", self.0) }
}

/// A message the broker could not route, sent back with `basic.return`.
#[derive(Clone, Debug)]
pub struct ReturnedMessage {
    /// Why the message was returned.
    pub reply_code: u16,
    /// Broker explanation.
    pub reply_text: String,
    /// Exchange the message was published to.
    pub exchange: String,
    /// Routing key the message was published with.
    pub routing_key: String,
    /// Content properties.
    pub properties: BasicProperties,
    /// Message body.
    pub body: Bytes,
}

/// A publisher confirm received from the broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfirmEvent {
    /// The broker took responsibility for the message(s).
    Ack {
        /// Sequence number of the publish.
        delivery_tag: u64,
        /// Whether every publish up to `delivery_tag` is covered.
        multiple: bool,
    },
    /// The broker could not take responsibility for the message(s).
    Nack {
        /// Sequence number of the publish.
        delivery_tag: u64,
        /// Whether every publish up to `delivery_tag` is covered.
        multiple: bool,
    },
}

/// The broker blocked or unblocked publishing on the connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockedEvent {
    /// Publishing is blocked, typically by a resource alarm.
    Blocked {
        /// Broker explanation.
        reason: String,
    },
    /// Publishing may resume.
    Unblocked,
}

/// Callback for [`ReturnedMessage`]s.
pub type ReturnListener = dyn Fn(&ReturnedMessage) -> CallbackResult + Send + Sync;
/// Callback for [`ConfirmEvent`]s.
pub type ConfirmListener = dyn Fn(ConfirmEvent) -> CallbackResult + Send + Sync;
/// Callback for `channel.flow` changes; receives the new active state.
pub type FlowListener = dyn Fn(bool) -> CallbackResult + Send + Sync;
/// Callback for [`BlockedEvent`]s.
pub type BlockedListener = dyn Fn(&BlockedEvent) -> CallbackResult + Send + Sync;
/// Callback fired once when a channel or connection shuts down.
pub type ShutdownListener = dyn Fn(&ShutdownSignal) -> CallbackResult + Send + Sync;

/// Ordered set of listeners of one kind.
pub(crate) struct ListenerSet<F: ?Sized> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(ListenerId, Arc<F>)>>,
}

impl<F: ?Sized> Default for ListenerSet<F> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<F: ?Sized> ListenerSet<F> {
    pub(crate) fn add(&self, listener: Arc<F>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.entries).push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    /// Listeners in registration order.
    pub(crate) fn snapshot(&self) -> Vec<Arc<F>> {
        lock(&self.entries)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect()
    }

    pub(crate) fn is_empty(&self) -> bool { lock(&self.entries).is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_listener_is_not_snapshotted() {
        let set: ListenerSet<FlowListener> = ListenerSet::default();
        let first = set.add(Arc::new(|_: bool| -> CallbackResult { Ok(()) }));
        let _second = set.add(Arc::new(|_: bool| -> CallbackResult { Ok(()) }));
        assert!(set.remove(first));
        assert!(!set.remove(first));
        assert_eq!(set.snapshot().len(), 1);
    }
}
