//! Request/response correlation over a single stream.
//!
//! Each correlated request parks a oneshot sender keyed by its
//! [`RequestId`]. A per-request timer rejects and removes the entry if no
//! reply lands within the window; a matching reply resolves it and aborts
//! the timer. Teardown rejects everything left. Each entry completes
//! exactly once, and a reply for an unknown id is a no-op.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

use tether_core::{ClientError, RequestId};

/// Reply channel for one correlated request.
pub type ReplySender = oneshot::Sender<Result<Value, ClientError>>;

struct PendingRequest {
    tx: ReplySender,
    timer: JoinHandle<()>,
}

/// Table of in-flight correlated requests.
#[derive(Clone)]
pub struct Correlator {
    pending: Arc<Mutex<HashMap<RequestId, PendingRequest>>>,
    timeout: Duration,
}

impl Correlator {
    /// Create a correlator with the given per-request timeout.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    /// Park `tx` under `id` and start its timeout clock.
    ///
    /// When the window elapses without a reply the entry is removed and the
    /// caller receives [`ClientError::Timeout`].
    #[allow(clippy::cast_possible_truncation)]
    pub fn insert(&self, id: RequestId, tx: ReplySender) {
        let pending = Arc::clone(&self.pending);
        let timeout = self.timeout;
        let timer_id = id.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let expired = pending.lock().remove(&timer_id);
            if let Some(entry) = expired {
                debug!(id = %timer_id, after_ms = timeout.as_millis() as u64, "request timed out");
                let _ = entry.tx.send(Err(ClientError::Timeout {
                    id: timer_id,
                    after_ms: timeout.as_millis() as u64,
                }));
            }
        });
        let previous = self.pending.lock().insert(id, PendingRequest { tx, timer });
        debug_assert!(previous.is_none(), "correlation id reused while live");
        if let Some(stale) = previous {
            stale.timer.abort();
        }
    }

    /// Resolve the entry for `id` with a reply payload.
    ///
    /// Returns `false` when no entry exists (late or unmatched reply).
    pub fn resolve(&self, id: &RequestId, payload: Value) -> bool {
        match self.take(id) {
            Some(entry) => {
                let _ = entry.tx.send(Ok(payload));
                true
            }
            None => false,
        }
    }

    /// Reject the entry for `id` with `err`.
    pub fn fail(&self, id: &RequestId, err: ClientError) -> bool {
        match self.take(id) {
            Some(entry) => {
                let _ = entry.tx.send(Err(err));
                true
            }
            None => false,
        }
    }

    /// Reject every outstanding entry with errors from `make_err`.
    ///
    /// Used at connection teardown; all timers are aborted so nothing leaks.
    pub fn reject_all(&self, make_err: impl Fn() -> ClientError) {
        let drained: Vec<(RequestId, PendingRequest)> =
            self.pending.lock().drain().collect();
        for (id, entry) in drained {
            debug!(id = %id, "rejecting pending request at teardown");
            entry.timer.abort();
            let _ = entry.tx.send(Err(make_err()));
        }
    }

    /// Number of in-flight requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether no requests are in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Whether `id` is still pending.
    #[must_use]
    pub fn contains(&self, id: &RequestId) -> bool {
        self.pending.lock().contains_key(id)
    }

    fn take(&self, id: &RequestId) -> Option<PendingRequest> {
        let entry = self.pending.lock().remove(id)?;
        entry.timer.abort();
        Some(entry)
    }
}
