//! Session and queue state behind an injectable trait.
//!
//! All broker state lives here: the session map plus, per session, a
//! pair of single-consumer queues (`to_client` / `to_technician`).
//! Queuing by destination side replaces the original sender-filter
//! trick and makes exactly-once delivery a plain drain. One mutex
//! serializes all access; broker operations are short read-modify-
//! writes against a single session, so per-session sharding is not
//! needed at this scale.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Mutex;

use crate::error::RelayError;
use crate::models::{AuthorizationState, Session};
use crate::protocol::{RegisterRequest, RelayedMessage, SessionSummary, Side};

/// Store abstraction the broker handlers are written against. In-
/// memory today; the seam exists so it can be unit-tested and, if ever
/// needed, swapped for a distributed backend.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session. Always succeeds; repeated registrations from
    /// the same client each create an independent session.
    async fn register(&self, req: RegisterRequest) -> Session;

    async fn get(&self, session_id: &str) -> Result<Session, RelayError>;

    /// Sessions a console can connect to: agent present, no technician.
    async fn list_available(&self) -> Vec<SessionSummary>;

    /// Record a technician's connection request. At most one request
    /// may be pending per session; a denied or ended pairing may be
    /// re-requested.
    async fn request_connection(
        &self,
        session_id: &str,
        technician_name: &str,
    ) -> Result<(), RelayError>;

    /// The requesting technician's name, if a request is awaiting the
    /// client's decision.
    async fn pending_request(&self, session_id: &str) -> Result<Option<String>, RelayError>;

    /// Apply the client's decision. Idempotent once decided: a second
    /// call returns the recorded state unchanged.
    async fn authorize(
        &self,
        session_id: &str,
        approved: bool,
    ) -> Result<AuthorizationState, RelayError>;

    async fn authorization_state(
        &self,
        session_id: &str,
    ) -> Result<Option<AuthorizationState>, RelayError>;

    /// Queue a payload for the side opposite the sender.
    async fn push_message(
        &self,
        session_id: &str,
        sender: Side,
        message: serde_json::Value,
    ) -> Result<(), RelayError>;

    /// Return and remove everything queued for `receiver`, plus
    /// whether both sides are still connected.
    async fn drain_messages(
        &self,
        session_id: &str,
        receiver: Side,
    ) -> Result<(Vec<RelayedMessage>, bool), RelayError>;

    /// Clear one side's connected flag. Returns `true` when the
    /// session was deleted because both sides are now gone.
    async fn disconnect(&self, session_id: &str, who: Side) -> Result<bool, RelayError>;

    /// Delete sessions older than `ttl`, regardless of connection
    /// flags. Returns how many were removed.
    async fn sweep_expired(&self, ttl: Duration) -> usize;

    async fn session_count(&self) -> usize;
}

struct SessionEntry {
    session: Session,
    to_client: VecDeque<RelayedMessage>,
    to_technician: VecDeque<RelayedMessage>,
}

impl SessionEntry {
    fn new(session: Session) -> Self {
        Self {
            session,
            to_client: VecDeque::new(),
            to_technician: VecDeque::new(),
        }
    }

    fn queue_for(&mut self, receiver: Side) -> &mut VecDeque<RelayedMessage> {
        match receiver {
            Side::Client => &mut self.to_client,
            Side::Technician => &mut self.to_technician,
        }
    }
}

/// Concurrency-safe in-memory implementation.
pub struct MemoryStore {
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn register(&self, req: RegisterRequest) -> Session {
        let session = Session::new(req.client_id, req.client_name, req.os, req.access_code);
        let mut sessions = self.sessions.lock().await;
        sessions.insert(session.session_id.clone(), SessionEntry::new(session.clone()));
        session
    }

    async fn get(&self, session_id: &str) -> Result<Session, RelayError> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(session_id)
            .map(|e| e.session.clone())
            .ok_or(RelayError::NotFound)
    }

    async fn list_available(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.lock().await;
        let mut out: Vec<SessionSummary> = sessions
            .values()
            .filter(|e| e.session.available())
            .map(|e| e.session.summary())
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        out
    }

    async fn request_connection(
        &self,
        session_id: &str,
        technician_name: &str,
    ) -> Result<(), RelayError> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions.get_mut(session_id).ok_or(RelayError::NotFound)?;

        if entry.session.authorization == Some(AuthorizationState::AwaitingClient) {
            return Err(RelayError::RequestPending);
        }
        if entry.session.technician_connected {
            return Err(RelayError::AlreadyPaired);
        }

        entry.session.authorization = Some(AuthorizationState::AwaitingClient);
        entry.session.technician_name = Some(technician_name.to_string());
        Ok(())
    }

    async fn pending_request(&self, session_id: &str) -> Result<Option<String>, RelayError> {
        let sessions = self.sessions.lock().await;
        let entry = sessions.get(session_id).ok_or(RelayError::NotFound)?;
        if entry.session.authorization == Some(AuthorizationState::AwaitingClient) {
            Ok(entry.session.technician_name.clone())
        } else {
            Ok(None)
        }
    }

    async fn authorize(
        &self,
        session_id: &str,
        approved: bool,
    ) -> Result<AuthorizationState, RelayError> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions.get_mut(session_id).ok_or(RelayError::NotFound)?;

        match entry.session.authorization {
            Some(AuthorizationState::AwaitingClient) => {
                let state = if approved {
                    entry.session.technician_connected = true;
                    AuthorizationState::Authorized
                } else {
                    AuthorizationState::Denied
                };
                entry.session.authorization = Some(state);
                Ok(state)
            }
            // Already decided: no-op, return the recorded state.
            Some(decided) => Ok(decided),
            None => Err(RelayError::Protocol(
                "no pending connection request".to_string(),
            )),
        }
    }

    async fn authorization_state(
        &self,
        session_id: &str,
    ) -> Result<Option<AuthorizationState>, RelayError> {
        let sessions = self.sessions.lock().await;
        let entry = sessions.get(session_id).ok_or(RelayError::NotFound)?;
        Ok(entry.session.authorization)
    }

    async fn push_message(
        &self,
        session_id: &str,
        sender: Side,
        message: serde_json::Value,
    ) -> Result<(), RelayError> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions.get_mut(session_id).ok_or(RelayError::NotFound)?;
        entry.queue_for(sender.opposite()).push_back(RelayedMessage {
            sender,
            message,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn drain_messages(
        &self,
        session_id: &str,
        receiver: Side,
    ) -> Result<(Vec<RelayedMessage>, bool), RelayError> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions.get_mut(session_id).ok_or(RelayError::NotFound)?;
        let messages: Vec<RelayedMessage> = entry.queue_for(receiver).drain(..).collect();
        let active = entry.session.client_connected && entry.session.technician_connected;
        Ok((messages, active))
    }

    async fn disconnect(&self, session_id: &str, who: Side) -> Result<bool, RelayError> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions.get_mut(session_id).ok_or(RelayError::NotFound)?;
        match who {
            Side::Client => entry.session.client_connected = false,
            Side::Technician => entry.session.technician_connected = false,
        }
        if !entry.session.client_connected && !entry.session.technician_connected {
            sessions.remove(session_id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn sweep_expired(&self, ttl: Duration) -> usize {
        let cutoff = Utc::now() - ttl;
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, e| e.session.created_at > cutoff);
        before - sessions.len()
    }

    async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
