//! Session manager: sole owner of conversation state.
//!
//! Each session sits behind its own fair async lock. The gateway dispatcher
//! acquires the lock before handing a chat to the agent loop, which gives
//! the per-session ordering guarantee: message N+1 cannot start while the
//! loop for N still holds the lock. Tokio's mutex is FIFO, so waiters run
//! in arrival order. Across sessions nothing is serialized.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::message::Message;
use crate::permission::PermissionMode;
use crate::store::Store;

/// A conversation thread with a stable id, owning user, origin channel, and
/// bounded history.
///
/// `mode_override` is a session-scoped override of the global permission
/// mode; when set, the permission engine consults it instead of the
/// configured default.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub channel: String,
    pub mode_override: Option<PermissionMode>,
    pub history: Vec<Message>,
    pub last_active: DateTime<Utc>,
}

impl Session {
    pub fn touch(&mut self) {
        self.last_active = Utc::now();
    }
}

pub struct SessionManager {
    sessions: DashMap<String, Arc<Mutex<Session>>>,
    store: Option<Store>,
    max_sessions: usize,
    idle_timeout: Duration,
}

impl SessionManager {
    pub fn new(store: Option<Store>, max_sessions: usize, idle_timeout_hours: i64) -> Self {
        Self {
            sessions: DashMap::new(),
            store,
            max_sessions,
            idle_timeout: Duration::hours(idle_timeout_hours),
        }
    }

    /// Look up or allocate the session for an inbound chat. An empty id
    /// allocates a fresh session; a non-empty unknown id (an adapter
    /// re-adopting after a restart) is recreated and its history reloaded
    /// from the store.
    pub async fn get_or_create(
        &self,
        session_id: &str,
        user_id: &str,
        channel: &str,
    ) -> (String, Arc<Mutex<Session>>) {
        if !session_id.is_empty() {
            if let Some(existing) = self.sessions.get(session_id) {
                return (session_id.to_string(), Arc::clone(existing.value()));
            }
        }

        if self.sessions.len() >= self.max_sessions {
            self.evict_lru();
        }

        let id = if session_id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            session_id.to_string()
        };

        let history = match (&self.store, session_id.is_empty()) {
            (Some(store), false) => store.load_turns(&id, 100).await.unwrap_or_default(),
            _ => Vec::new(),
        };

        let session = Arc::new(Mutex::new(Session {
            id: id.clone(),
            user_id: user_id.to_string(),
            channel: channel.to_string(),
            mode_override: None,
            history,
            last_active: Utc::now(),
        }));

        if let Some(store) = &self.store {
            if let Err(e) = store.upsert_session(&id, user_id, channel, None).await {
                tracing::warn!(session = %id, "session upsert failed: {}", e);
            }
        }

        self.sessions.insert(id.clone(), Arc::clone(&session));
        (id, session)
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.get(session_id).map(|e| Arc::clone(e.value()))
    }

    /// Append a turn to the durable history. The in-memory push is done by
    /// the loop while it holds the session lock; this records the copy that
    /// survives restarts.
    pub async fn persist_turn(&self, session_id: &str, message: &Message) -> Result<(), StoreError> {
        match &self.store {
            Some(store) => store.append_turn(session_id, message).await,
            None => Ok(()),
        }
    }

    /// Discard a session's conversation history (the `clear` command).
    pub async fn clear(&self, session_id: &str) -> bool {
        let Some(session) = self.get(session_id) else {
            return false;
        };
        session.lock().await.history.clear();
        if let Some(store) = &self.store {
            let _ = store.clear_turns(session_id).await;
        }
        true
    }

    /// Evict the least-recently-used session that has no loop in flight.
    /// Sessions whose lock is held are skipped: in-flight work is never
    /// evicted.
    fn evict_lru(&self) {
        let mut candidate: Option<(String, DateTime<Utc>)> = None;
        for entry in self.sessions.iter() {
            if let Ok(session) = entry.value().try_lock() {
                let stamp = session.last_active;
                if candidate.as_ref().map(|(_, t)| stamp < *t).unwrap_or(true) {
                    candidate = Some((entry.key().clone(), stamp));
                }
            }
        }
        if let Some((id, _)) = candidate {
            tracing::debug!(session = %id, "evicting least-recently-used session");
            self.sessions.remove(&id);
        }
    }

    /// Drop sessions idle past the configured timeout. Runs on the same
    /// cadence as the mind timer.
    pub fn sweep_idle(&self) -> usize {
        let cutoff = Utc::now() - self.idle_timeout;
        let mut expired = Vec::new();
        for entry in self.sessions.iter() {
            if let Ok(session) = entry.value().try_lock() {
                if session.last_active < cutoff {
                    expired.push(entry.key().clone());
                }
            }
        }
        for id in &expired {
            self.sessions.remove(id);
        }
        expired.len()
    }

    /// Channel tag a session was created from, used to route approvals and
    /// events back to the right adapters.
    pub async fn channel_of(&self, session_id: &str) -> Option<String> {
        let session = self.get(session_id)?;
        let guard = session.lock().await;
        Some(guard.channel.clone())
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Drop every in-memory session (the `restart` command). Durable turns
    /// stay in the store and reload on demand.
    pub fn reset(&self) {
        self.sessions.clear();
    }
}
