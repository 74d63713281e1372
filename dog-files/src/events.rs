use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::{FileError, OperationId, OperationKind, ProgressSample};

/// Lifecycle notifications of manager operations
#[derive(Debug, Clone)]
pub enum TransferEvent {
    /// Operation began; fired before any store call
    Started {
        operation: OperationId,
        kind: OperationKind,
        at: DateTime<Utc>,
    },

    /// Data transfer advanced
    Progress {
        operation: OperationId,
        kind: OperationKind,
        sample: ProgressSample,
        at: DateTime<Utc>,
    },

    /// Operation finished successfully
    Completed {
        operation: OperationId,
        kind: OperationKind,
        at: DateTime<Utc>,
    },

    /// Operation stopped because its cancellation scope fired
    Cancelled {
        operation: OperationId,
        kind: OperationKind,
        at: DateTime<Utc>,
    },

    /// Operation failed
    Crashed {
        operation: OperationId,
        kind: OperationKind,
        error: Arc<FileError>,
        at: DateTime<Utc>,
    },
}

impl TransferEvent {
    /// Get event type name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Progress { .. } => "progress",
            Self::Completed { .. } => "completed",
            Self::Cancelled { .. } => "cancelled",
            Self::Crashed { .. } => "crashed",
        }
    }

    pub fn operation(&self) -> OperationId {
        match self {
            Self::Started { operation, .. }
            | Self::Progress { operation, .. }
            | Self::Completed { operation, .. }
            | Self::Cancelled { operation, .. }
            | Self::Crashed { operation, .. } => *operation,
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Started { kind, .. }
            | Self::Progress { kind, .. }
            | Self::Completed { kind, .. }
            | Self::Cancelled { kind, .. }
            | Self::Crashed { kind, .. } => *kind,
        }
    }

    /// Get the timestamp from any event
    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::Started { at, .. }
            | Self::Progress { at, .. }
            | Self::Completed { at, .. }
            | Self::Cancelled { at, .. }
            | Self::Crashed { at, .. } => at,
        }
    }

    /// Whether this event settles its operation
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Cancelled { .. } | Self::Crashed { .. }
        )
    }
}

/// Receives manager events synchronously, in emission order
pub trait TransferListener: Send + Sync {
    fn on_event(&self, event: &TransferEvent);
}

impl<F> TransferListener for F
where
    F: Fn(&TransferEvent) + Send + Sync,
{
    fn on_event(&self, event: &TransferEvent) {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

static LISTENER_ID: AtomicU64 = AtomicU64::new(1);

fn next_listener_id() -> ListenerId {
    ListenerId(LISTENER_ID.fetch_add(1, Ordering::Relaxed))
}

/// Fan-out of events to registered listeners and broadcast subscribers.
///
/// Listeners are snapshotted before delivery, so a listener may register or
/// remove listeners without deadlocking.
pub struct EventBus {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn TransferListener>)>>,
    sender: broadcast::Sender<TransferEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            listeners: RwLock::new(Vec::new()),
            sender,
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn TransferListener>) -> ListenerId {
        let id = next_listener_id();
        self.listeners.write().push((id, listener));
        id
    }

    /// Returns true if the listener was registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransferEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: TransferEvent) {
        let snapshot: Vec<Arc<dyn TransferListener>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in snapshot {
            listener.on_event(&event);
        }

        // No receivers is fine.
        let _ = self.sender.send(event);
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.read().len())
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn started() -> TransferEvent {
        TransferEvent::Started {
            operation: OperationId::next(),
            kind: OperationKind::Upload,
            at: Utc::now(),
        }
    }

    #[test]
    fn listeners_receive_events_until_removed() {
        let bus = EventBus::new(8);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let id = bus.add_listener(Arc::new(move |e: &TransferEvent| {
            sink.lock().push(e.event_name());
        }));

        bus.emit(started());
        assert!(bus.remove_listener(id));
        assert!(!bus.remove_listener(id));
        bus.emit(started());

        assert_eq!(*seen.lock(), vec!["started"]);
    }

    #[tokio::test]
    async fn subscribers_receive_broadcast() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        let event = started();
        let operation = event.operation();
        bus.emit(event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.operation(), operation);
        assert!(!received.is_terminal());
    }
}
