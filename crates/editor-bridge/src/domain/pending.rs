//! Pending request table.
//!
//! Maps correlation IDs to callers waiting on an editor reply. Each entry
//! ends in exactly one of three ways:
//! 1. `resolve()` with the editor's response (or a local write failure)
//! 2. its armed timer firing, which completes it with `TIMEOUT`
//! 3. `sweep()` on disconnect/shutdown
//!
//! Removal from the map is the only way to obtain an entry's sender, so
//! whichever path removes it first is the one that fires the sink.

use crate::domain::correlation::CorrelationId;
use crate::domain::error::ErrorBody;
use crate::domain::messages::ResponseEnvelope;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

/// Receiving half handed to the caller on registration.
pub type PendingReceiver = oneshot::Receiver<ResponseEnvelope>;

/// Registration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PendingError {
    /// Identifier already in flight. Never expected with generated IDs.
    #[error("correlation id {0} is already pending")]
    DuplicateCorrelationId(CorrelationId),
}

/// A request waiting for its reply
struct PendingRequest {
    /// Completion sink
    sender: oneshot::Sender<ResponseEnvelope>,
    /// When the request was registered
    created_at: Instant,
    /// Request type (for logging and synthetic failures)
    kind: String,
    /// Armed timeout
    timeout: Duration,
    /// Timer task for the timeout
    timer: AbortHandle,
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Reply,
    Timeout,
    Swept,
}

/// Counters for the pending table
#[derive(Debug, Default)]
pub struct PendingStats {
    pub total_registered: AtomicU64,
    pub total_completed: AtomicU64,
    pub total_timeouts: AtomicU64,
    pub total_swept: AtomicU64,
    /// Replies whose correlation ID was not pending (late, duplicate, stray)
    pub total_unknown_replies: AtomicU64,
    /// Entries resolved after the caller stopped waiting
    pub total_receivers_dropped: AtomicU64,
}

/// Point-in-time copy of [`PendingStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PendingStatsSnapshot {
    pub registered: u64,
    pub completed: u64,
    pub timeouts: u64,
    pub swept: u64,
    pub unknown_replies: u64,
    pub receivers_dropped: u64,
}

impl PendingStats {
    pub fn snapshot(&self) -> PendingStatsSnapshot {
        PendingStatsSnapshot {
            registered: self.total_registered.load(Ordering::Relaxed),
            completed: self.total_completed.load(Ordering::Relaxed),
            timeouts: self.total_timeouts.load(Ordering::Relaxed),
            swept: self.total_swept.load(Ordering::Relaxed),
            unknown_replies: self.total_unknown_replies.load(Ordering::Relaxed),
            receivers_dropped: self.total_receivers_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Pending request table.
///
/// Flow:
/// 1. Connection manager calls `register()` and keeps the receiver
/// 2. The request frame goes out over the socket
/// 3. Dispatcher calls `resolve()` when the reply arrives
/// 4. The caller's receiver completes with the response
pub struct PendingRequestTable {
    pending: DashMap<CorrelationId, PendingRequest>,
    stats: PendingStats,
}

impl PendingRequestTable {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            stats: PendingStats::default(),
        }
    }

    /// Register a pending request and arm its timeout.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn register(
        self: &Arc<Self>,
        correlation_id: CorrelationId,
        kind: &str,
        timeout: Duration,
    ) -> Result<PendingReceiver, PendingError> {
        match self.pending.entry(correlation_id.clone()) {
            Entry::Occupied(_) => {
                warn!(
                    correlation_id = %correlation_id,
                    kind = kind,
                    "Refusing duplicate correlation ID"
                );
                Err(PendingError::DuplicateCorrelationId(correlation_id))
            }
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();

                // Spawned while the shard is locked: a timer that fires
                // immediately still waits for the insert below.
                let table = Arc::downgrade(self);
                let timer_id = correlation_id.clone();
                let timer = tokio::spawn(async move {
                    tokio::time::sleep(timeout).await;
                    expire(table, &timer_id);
                })
                .abort_handle();

                slot.insert(PendingRequest {
                    sender: tx,
                    created_at: Instant::now(),
                    kind: kind.to_string(),
                    timeout,
                    timer,
                });
                self.stats.total_registered.fetch_add(1, Ordering::Relaxed);

                debug!(
                    correlation_id = %correlation_id,
                    kind = kind,
                    timeout_ms = timeout.as_millis() as u64,
                    "Registered pending request"
                );

                Ok(rx)
            }
        }
    }

    /// Complete a pending request with a response.
    ///
    /// Returns false if the ID is unknown (already timed out, swept, or a
    /// duplicate reply).
    pub fn resolve(&self, correlation_id: &CorrelationId, response: ResponseEnvelope) -> bool {
        match self.pending.remove(correlation_id) {
            Some((_, request)) => {
                request.timer.abort();
                self.finish(correlation_id, request, response, Outcome::Reply);
                true
            }
            None => {
                self.stats
                    .total_unknown_replies
                    .fetch_add(1, Ordering::Relaxed);
                warn!(
                    correlation_id = %correlation_id,
                    "Response for unknown or expired correlation ID"
                );
                false
            }
        }
    }

    /// Complete a pending request with a failure built from its own kind.
    ///
    /// Used when the editor answered but the answer is unusable. Counts as a
    /// reply, not a timeout.
    pub fn fail(&self, correlation_id: &CorrelationId, error: ErrorBody) -> bool {
        let Some((_, request)) = self.pending.remove(correlation_id) else {
            return false;
        };
        request.timer.abort();
        let response =
            ResponseEnvelope::failure(request.kind.clone(), Some(correlation_id.clone()), error);
        self.finish(correlation_id, request, response, Outcome::Reply);
        true
    }

    /// Resolve every remaining entry with the same terminal error.
    ///
    /// Returns the number of entries resolved.
    pub fn sweep(&self, error: ErrorBody) -> usize {
        let ids: Vec<CorrelationId> = self.pending.iter().map(|e| e.key().clone()).collect();
        let mut swept = 0;

        for id in ids {
            if let Some((_, request)) = self.pending.remove(&id) {
                request.timer.abort();
                let response =
                    ResponseEnvelope::failure(request.kind.clone(), Some(id.clone()), error.clone());
                self.finish(&id, request, response, Outcome::Swept);
                swept += 1;
            }
        }

        if swept > 0 {
            warn!(swept = swept, code = %error.code, "Swept pending requests");
        }
        swept
    }

    /// Number of requests currently in flight
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Check if a correlation ID is in flight
    pub fn is_pending(&self, correlation_id: &CorrelationId) -> bool {
        self.pending.contains_key(correlation_id)
    }

    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }

    fn expire_entry(&self, correlation_id: &CorrelationId) {
        let Some((_, request)) = self.pending.remove(correlation_id) else {
            return;
        };
        warn!(
            correlation_id = %correlation_id,
            kind = %request.kind,
            timeout_ms = request.timeout.as_millis() as u64,
            "Pending request timed out"
        );
        let response = ResponseEnvelope::failure(
            request.kind.clone(),
            Some(correlation_id.clone()),
            ErrorBody::timeout(request.timeout),
        );
        self.finish(correlation_id, request, response, Outcome::Timeout);
    }

    fn finish(
        &self,
        correlation_id: &CorrelationId,
        request: PendingRequest,
        response: ResponseEnvelope,
        outcome: Outcome,
    ) {
        let counter = match outcome {
            Outcome::Reply => &self.stats.total_completed,
            Outcome::Timeout => &self.stats.total_timeouts,
            Outcome::Swept => &self.stats.total_swept,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let elapsed = request.created_at.elapsed();
        if request.sender.send(response).is_err() {
            self.stats
                .total_receivers_dropped
                .fetch_add(1, Ordering::Relaxed);
            debug!(
                correlation_id = %correlation_id,
                kind = %request.kind,
                "Caller stopped waiting before resolution"
            );
            return;
        }

        debug!(
            correlation_id = %correlation_id,
            kind = %request.kind,
            outcome = ?outcome,
            elapsed_ms = elapsed.as_millis() as u64,
            "Resolved pending request"
        );
    }
}

impl Default for PendingRequestTable {
    fn default() -> Self {
        Self::new()
    }
}

fn expire(table: Weak<PendingRequestTable>, correlation_id: &CorrelationId) {
    if let Some(table) = table.upgrade() {
        table.expire_entry(correlation_id);
    }
}
