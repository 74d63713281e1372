//! Per-operation lifecycle: cancellation scope, active stream, events and outcome.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::events::{EventBus, TransferEvent};
use crate::progress::{ProgressSample, ProgressSampler};
use crate::stream::{PositionProbe, StreamGate};
use crate::{FileError, OperationId, OperationKind};

/// How an operation settled
#[derive(Debug, Clone)]
pub enum TransferOutcome {
    Completed,
    Cancelled,
    Crashed(Arc<FileError>),
}

impl TransferOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn error(&self) -> Option<&FileError> {
        match self {
            Self::Crashed(error) => Some(error),
            _ => None,
        }
    }
}

/// Why an operation stopped before producing its value
#[derive(Debug)]
pub(crate) enum Interrupt {
    Cancelled,
    Failed(FileError),
}

impl From<FileError> for Interrupt {
    fn from(err: FileError) -> Self {
        Self::Failed(err)
    }
}

impl From<StoreError> for Interrupt {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Cancelled => Self::Cancelled,
            other => Self::Failed(other.into()),
        }
    }
}

impl From<std::io::Error> for Interrupt {
    fn from(err: std::io::Error) -> Self {
        Self::Failed(err.into())
    }
}

struct SessionEntry {
    scope: CancellationToken,
    gate: Option<StreamGate>,
}

/// Live sessions of one manager, so they can be cancelled from outside
#[derive(Default)]
pub(crate) struct SessionRegistry {
    entries: Mutex<HashMap<OperationId, SessionEntry>>,
}

impl SessionRegistry {
    fn register(&self, id: OperationId, scope: CancellationToken) {
        self.entries
            .lock()
            .insert(id, SessionEntry { scope, gate: None });
    }

    fn attach_gate(&self, id: OperationId, gate: StreamGate) {
        if let Some(entry) = self.entries.lock().get_mut(&id) {
            entry.gate = Some(gate);
        }
    }

    fn remove(&self, id: OperationId) {
        self.entries.lock().remove(&id);
    }

    /// Cancel one session and close its stream; false if it is not running
    pub(crate) fn cancel(&self, id: OperationId) -> bool {
        let entries = self.entries.lock();
        match entries.get(&id) {
            Some(entry) => {
                entry.scope.cancel();
                if let Some(gate) = &entry.gate {
                    gate.close();
                }
                true
            }
            None => false,
        }
    }

    /// Close every active stream; returns how many were closed
    pub(crate) fn close_all_streams(&self) -> usize {
        let entries = self.entries.lock();
        let mut closed = 0;
        for entry in entries.values() {
            if let Some(gate) = &entry.gate {
                gate.close();
                closed += 1;
            }
        }
        closed
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Owns the lifecycle of one manager operation.
///
/// A session emits `Started` when opened and exactly one terminal event:
/// [`finish`](Self::finish) consumes it, and a session dropped unsettled
/// reports itself as cancelled.
pub(crate) struct TransferSession<'m> {
    id: OperationId,
    kind: OperationKind,
    scope: CancellationToken,
    events: &'m EventBus,
    registry: &'m SessionRegistry,
    total_length: Option<u64>,
    link: Option<JoinHandle<()>>,
    settled: bool,
}

impl<'m> TransferSession<'m> {
    /// Open a session under `parent`, optionally linked to an external signal
    pub(crate) fn open(
        kind: OperationKind,
        parent: &CancellationToken,
        external: Option<&CancellationToken>,
        events: &'m EventBus,
        registry: &'m SessionRegistry,
    ) -> Self {
        let id = OperationId::next();
        let scope = parent.child_token();

        let link = external.and_then(|external| {
            if external.is_cancelled() {
                scope.cancel();
                return None;
            }
            let external = external.clone();
            let scope = scope.clone();
            Some(tokio::spawn(async move {
                tokio::select! {
                    _ = external.cancelled() => scope.cancel(),
                    _ = scope.cancelled() => {}
                }
            }))
        });

        registry.register(id, scope.clone());

        let session = Self {
            id,
            kind,
            scope,
            events,
            registry,
            total_length: None,
            link,
            settled: false,
        };

        debug!(operation = %id, kind = %kind, "operation started");
        session.events.emit(TransferEvent::Started {
            operation: id,
            kind,
            at: Utc::now(),
        });

        session
    }

    pub(crate) fn id(&self) -> OperationId {
        self.id
    }

    pub(crate) fn scope(&self) -> &CancellationToken {
        &self.scope
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.scope.is_cancelled()
    }

    /// Register the stream this session moves data through
    pub(crate) fn attach(&mut self, gate: StreamGate) {
        self.registry.attach_gate(self.id, gate);
    }

    pub(crate) fn set_total_length(&mut self, length: u64) {
        self.total_length = Some(length);
    }

    /// Run `transfer` while sampling `probe` for progress, joining both
    pub(crate) async fn drive<F, T>(&self, probe: PositionProbe, interval: Duration, transfer: F) -> T
    where
        F: Future<Output = T>,
    {
        let total = self.total_length.unwrap_or(0);
        let sampler = ProgressSampler::new(probe, total, interval);
        let finished = CancellationToken::new();

        let sampling = sampler.run(self.scope.clone(), finished.clone(), |sample| {
            self.emit_progress(sample)
        });
        let transferring = async {
            let result = transfer.await;
            finished.cancel();
            result
        };

        let ((), result) = tokio::join!(sampling, transferring);
        result
    }

    fn emit_progress(&self, sample: ProgressSample) {
        self.events.emit(TransferEvent::Progress {
            operation: self.id,
            kind: self.kind,
            sample,
            at: Utc::now(),
        });
    }

    /// Resolve a result into its outcome and emit the terminal event.
    ///
    /// Failures observed after the scope fired count as cancellation. For
    /// operations that do not move data a success observed after the scope
    /// fired is reported as cancelled too, and its value is dropped.
    pub(crate) fn settle<T>(self, result: Result<T, Interrupt>) -> (TransferOutcome, Option<T>) {
        match result {
            Ok(value) if self.kind.moves_data() || !self.is_cancelled() => {
                (self.finish(TransferOutcome::Completed), Some(value))
            }
            Ok(_) | Err(Interrupt::Cancelled) => (self.finish(TransferOutcome::Cancelled), None),
            Err(Interrupt::Failed(_)) if self.is_cancelled() => {
                (self.finish(TransferOutcome::Cancelled), None)
            }
            Err(Interrupt::Failed(error)) => {
                (self.finish(TransferOutcome::Crashed(Arc::new(error))), None)
            }
        }
    }

    /// Emit the terminal event for `outcome`
    pub(crate) fn finish(mut self, outcome: TransferOutcome) -> TransferOutcome {
        self.settled = true;
        let at = Utc::now();
        let event = match &outcome {
            TransferOutcome::Completed => {
                debug!(operation = %self.id, kind = %self.kind, "operation completed");
                TransferEvent::Completed {
                    operation: self.id,
                    kind: self.kind,
                    at,
                }
            }
            TransferOutcome::Cancelled => {
                info!(operation = %self.id, kind = %self.kind, "operation cancelled");
                TransferEvent::Cancelled {
                    operation: self.id,
                    kind: self.kind,
                    at,
                }
            }
            TransferOutcome::Crashed(error) => {
                warn!(operation = %self.id, kind = %self.kind, error = %error, "operation crashed");
                TransferEvent::Crashed {
                    operation: self.id,
                    kind: self.kind,
                    error: error.clone(),
                    at,
                }
            }
        };
        self.events.emit(event);
        outcome
    }
}

impl Drop for TransferSession<'_> {
    fn drop(&mut self) {
        if let Some(link) = self.link.take() {
            link.abort();
        }
        self.registry.remove(self.id);

        if !self.settled {
            self.settled = true;
            debug!(operation = %self.id, kind = %self.kind, "operation dropped before settling");
            self.events.emit(TransferEvent::Cancelled {
                operation: self.id,
                kind: self.kind,
                at: Utc::now(),
            });
        }
    }
}
