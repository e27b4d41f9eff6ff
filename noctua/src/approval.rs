//! Pending approval requests awaiting a verdict from the originating
//! channel.
//!
//! The agent loop enqueues a request and awaits the returned ticket; the
//! gateway dispatcher resolves it when an APPROVAL_RESPONSE arrives. The
//! oneshot may be resolved before the loop reaches its await point, in
//! which case the await returns immediately. A timeout task arms per entry
//! and resolves it as `TimedOut` (treated as a denial) after the configured
//! window; `resolve` on an unknown or already-resolved id is a no-op.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;

pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Approved,
    Denied,
    TimedOut,
}

impl ApprovalOutcome {
    pub fn approved(self) -> bool {
        self == ApprovalOutcome::Approved
    }
}

/// A gated tool call surfaced to the originating channel. The id equals the
/// APPROVAL_REQUEST gateway message id the adapter must echo back.
#[derive(Clone, Debug)]
pub struct ApprovalRequest {
    pub id: String,
    pub tool_name: String,
    pub description: String,
    pub params: Value,
    pub session_id: String,
    pub channel: String,
    pub created_at: DateTime<Utc>,
}

struct PendingEntry {
    request: ApprovalRequest,
    tx: oneshot::Sender<ApprovalOutcome>,
}

/// Await end of one pending approval.
pub struct ApprovalTicket {
    rx: oneshot::Receiver<ApprovalOutcome>,
}

impl ApprovalTicket {
    /// Resolves to `Denied` if the queue is dropped while waiting.
    pub async fn wait(self) -> ApprovalOutcome {
        self.rx.await.unwrap_or(ApprovalOutcome::Denied)
    }
}

/// Keyed store of outstanding approvals. Producers (agent loops, the mind)
/// enqueue concurrently; resolution is single-producer from the gateway
/// dispatcher. A resolved id is never re-used.
pub struct ApprovalQueue {
    pending: Arc<DashMap<String, PendingEntry>>,
    timeout: Duration,
}

impl ApprovalQueue {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            timeout,
        }
    }

    /// Store the request, arm its timeout, and hand back the ticket the
    /// caller awaits.
    pub fn enqueue(&self, request: ApprovalRequest) -> ApprovalTicket {
        let (tx, rx) = oneshot::channel();
        let id = request.id.clone();
        self.pending.insert(id.clone(), PendingEntry { request, tx });

        let pending = Arc::clone(&self.pending);
        let timeout = self.timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some((_, entry)) = pending.remove(&id) {
                tracing::warn!(request_id = %id, "approval timed out, treating as denied");
                let _ = entry.tx.send(ApprovalOutcome::TimedOut);
            }
        });

        ApprovalTicket { rx }
    }

    /// Complete the pending entry with the adapter's verdict. Returns false
    /// when the id is unknown or already resolved.
    pub fn resolve(&self, id: &str, approved: bool) -> bool {
        match self.pending.remove(id) {
            Some((_, entry)) => {
                let outcome = if approved {
                    ApprovalOutcome::Approved
                } else {
                    ApprovalOutcome::Denied
                };
                let _ = entry.tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Snapshot of pending requests for inspection, oldest first.
    pub fn pending(&self, limit: usize) -> Vec<ApprovalRequest> {
        let mut out: Vec<ApprovalRequest> = self
            .pending
            .iter()
            .map(|entry| entry.value().request.clone())
            .collect();
        out.sort_by_key(|r| r.created_at);
        out.truncate(limit);
        out
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for ApprovalQueue {
    fn default() -> Self {
        Self::new(DEFAULT_APPROVAL_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(id: &str) -> ApprovalRequest {
        ApprovalRequest {
            id: id.to_string(),
            tool_name: "file_write".to_string(),
            description: "write a file".to_string(),
            params: json!({"path": "/tmp/x"}),
            session_id: "s1".to_string(),
            channel: "cli".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn resolve_then_wait_returns_immediately() {
        let queue = ApprovalQueue::default();
        let ticket = queue.enqueue(request("r1"));
        // Resolution lands before the await begins; the await must still
        // observe it.
        assert!(queue.resolve("r1", true));
        assert_eq!(ticket.wait().await, ApprovalOutcome::Approved);
    }

    #[tokio::test]
    async fn denial_propagates() {
        let queue = ApprovalQueue::default();
        let ticket = queue.enqueue(request("r2"));
        queue.resolve("r2", false);
        assert_eq!(ticket.wait().await, ApprovalOutcome::Denied);
    }

    #[tokio::test]
    async fn unknown_or_double_resolve_is_noop() {
        let queue = ApprovalQueue::default();
        let ticket = queue.enqueue(request("r3"));
        assert!(!queue.resolve("nope", true));
        assert!(queue.resolve("r3", true));
        assert!(!queue.resolve("r3", false));
        assert_eq!(ticket.wait().await, ApprovalOutcome::Approved);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_resolves_as_timed_out() {
        let queue = ApprovalQueue::new(Duration::from_secs(300));
        let ticket = queue.enqueue(request("r4"));
        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(ticket.wait().await, ApprovalOutcome::TimedOut);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn pending_snapshot_ordered_and_limited() {
        let queue = ApprovalQueue::default();
        let _t1 = queue.enqueue(request("a"));
        let _t2 = queue.enqueue(request("b"));
        let _t3 = queue.enqueue(request("c"));
        assert_eq!(queue.len(), 3);
        let snapshot = queue.pending(2);
        assert_eq!(snapshot.len(), 2);
    }
}
