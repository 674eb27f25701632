//! Correlation table for out-of-band approval requests.
//!
//! Each registered request resolves exactly once: by an explicit
//! [`PendingRequestTable::resolve`], by its cancellation token, or by
//! timeout. Whichever comes first removes the entry; later triggers find
//! nothing and do nothing.

use std::collections::HashMap;
use std::future::{pending, Future};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::types::{Behavior, PermissionResult};

/// How long a request may stay pending.
pub const DEFAULT_PERMISSION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Denial message for requests that outlived the timeout.
pub const TIMEOUT_MESSAGE: &str = "Permission request timed out";

/// Denial message for requests whose cancellation token fired.
pub const ABORTED_MESSAGE: &str = "Request aborted";

/// Denial message when a request is registered again under the same id.
pub const REPLACED_MESSAGE: &str = "Permission request replaced";

const TABLE_DROPPED_MESSAGE: &str = "Permission table dropped";

struct PendingEntry {
    seq: u64,
    created_at: Instant,
    responder: oneshot::Sender<PermissionResult>,
    tool_input: Value,
    settled: CancellationToken,
}

impl PendingEntry {
    fn complete(self, result: PermissionResult) {
        self.settled.cancel();
        // The waiter may have been dropped; nothing to do then.
        let _ = self.responder.send(result);
    }
}

struct TableInner {
    entries: Mutex<HashMap<String, PendingEntry>>,
    next_seq: AtomicU64,
    timeout: Duration,
}

impl TableInner {
    fn entries(&self) -> MutexGuard<'_, HashMap<String, PendingEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove `id` only if it is still the registration numbered `seq`.
    fn settle(&self, id: &str, seq: u64, result: PermissionResult) -> bool {
        let entry = {
            let mut entries = self.entries();
            match entries.get(id) {
                Some(entry) if entry.seq == seq => entries.remove(id),
                _ => None,
            }
        };
        match entry {
            Some(entry) => {
                entry.complete(result);
                true
            }
            None => false,
        }
    }
}

/// Pending approval requests keyed by correlation id.
///
/// Cloning is cheap and shares the same table.
#[derive(Clone)]
pub struct PendingRequestTable {
    inner: Arc<TableInner>,
}

impl std::fmt::Debug for PendingRequestTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequestTable")
            .field("pending", &self.len())
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

impl Default for PendingRequestTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingRequestTable {
    /// Create a table with the default five-minute timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_PERMISSION_TIMEOUT)
    }

    /// Create a table with a custom timeout.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(TableInner {
                entries: Mutex::new(HashMap::new()),
                next_seq: AtomicU64::new(0),
                timeout,
            }),
        }
    }

    /// The configured timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Register a pending request and return a future for its outcome.
    ///
    /// Expired entries are denied first. If `cancel` fires before the
    /// request is resolved, it is denied with [`ABORTED_MESSAGE`].
    /// Registering an id that is already pending denies the older request.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn register(
        &self,
        id: impl Into<String>,
        tool_input: Value,
        cancel: Option<CancellationToken>,
    ) -> PendingPermission {
        self.sweep_expired();

        let id = id.into();
        let (responder, receiver) = oneshot::channel();
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        let created_at = Instant::now();
        let settled = CancellationToken::new();

        let replaced = self.inner.entries().insert(
            id.clone(),
            PendingEntry {
                seq,
                created_at,
                responder,
                tool_input,
                settled: settled.clone(),
            },
        );
        if let Some(old) = replaced {
            tracing::warn!(id = %id, "Replacing pending permission request");
            old.complete(PermissionResult::deny(REPLACED_MESSAGE));
        }

        tracing::debug!(id = %id, "Registered permission request");

        let inner = Arc::clone(&self.inner);
        let deadline = created_at + inner.timeout;
        tokio::spawn(async move {
            let cancelled = async {
                match &cancel {
                    Some(token) => token.cancelled().await,
                    None => pending().await,
                }
            };

            tokio::select! {
                () = settled.cancelled() => {}
                () = tokio::time::sleep_until(deadline) => {
                    if inner.settle(&id, seq, PermissionResult::deny(TIMEOUT_MESSAGE)) {
                        tracing::info!(id = %id, "Permission request timed out");
                    }
                }
                () = cancelled => {
                    if inner.settle(&id, seq, PermissionResult::deny(ABORTED_MESSAGE)) {
                        tracing::info!(id = %id, "Permission request aborted");
                    }
                }
            }
        });

        PendingPermission { receiver }
    }

    /// Complete a pending request.
    ///
    /// An `allow` without `updated_input` gets the registered tool input.
    /// Returns false if nothing is pending under `id`.
    pub fn resolve(&self, id: &str, mut result: PermissionResult) -> bool {
        let Some(entry) = self.inner.entries().remove(id) else {
            tracing::debug!(id = %id, "No pending permission request to resolve");
            return false;
        };

        if result.behavior == Behavior::Allow && result.updated_input.is_none() {
            result.updated_input = Some(entry.tool_input.clone());
        }

        tracing::info!(id = %id, behavior = ?result.behavior, "Resolved permission request");
        entry.complete(result);
        true
    }

    /// Deny every entry older than the timeout. Returns how many expired.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let timeout = self.inner.timeout;

        let expired: Vec<(String, PendingEntry)> = {
            let mut entries = self.inner.entries();
            let ids: Vec<String> = entries
                .iter()
                .filter(|(_, entry)| now.duration_since(entry.created_at) >= timeout)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| entries.remove(&id).map(|entry| (id, entry)))
                .collect()
        };

        let count = expired.len();
        for (id, entry) in expired {
            tracing::info!(id = %id, "Permission request expired");
            entry.complete(PermissionResult::deny(TIMEOUT_MESSAGE));
        }
        count
    }

    /// Check whether `id` is pending.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.inner.entries().contains_key(id)
    }

    /// Number of pending requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries().len()
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Future returned by [`PendingRequestTable::register`].
#[derive(Debug)]
#[must_use = "the outcome is only observable by awaiting this future"]
pub struct PendingPermission {
    receiver: oneshot::Receiver<PermissionResult>,
}

impl Future for PendingPermission {
    type Output = PermissionResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.unwrap_or_else(|_| PermissionResult::deny(TABLE_DROPPED_MESSAGE)))
    }
}
