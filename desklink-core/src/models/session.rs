use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::SessionSummary;

/// Authorization handshake state. Only meaningful once a console has
/// requested a connection; transitions only forward
/// (awaiting → authorized, awaiting → denied). A denied session may
/// accept a *new* request later, which restarts at awaiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationState {
    AwaitingClient,
    Authorized,
    Denied,
}

/// The pairing record between one agent and at most one console.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub client_id: String,
    pub client_name: String,
    pub os: String,
    /// Legacy shared-secret path; carried but not enforced by the
    /// request/authorize handshake.
    pub access_code: Option<String>,
    pub client_connected: bool,
    pub technician_connected: bool,
    pub authorization: Option<AuthorizationState>,
    pub technician_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        client_id: String,
        client_name: String,
        os: String,
        access_code: Option<String>,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            session_id: derive_session_id(&client_id, created_at),
            client_id,
            client_name,
            os,
            access_code,
            client_connected: true,
            technician_connected: false,
            authorization: None,
            technician_name: None,
            created_at,
        }
    }

    /// Discoverable by a console: the agent is there and no technician
    /// is paired yet.
    pub fn available(&self) -> bool {
        self.client_connected && !self.technician_connected
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            client_id: self.client_id.clone(),
            client_name: self.client_name.clone(),
            os: self.os.clone(),
            created_at: self.created_at,
        }
    }
}

/// Session ids are derived from client identity + creation time, with
/// a short random suffix since repeated registrations from the same
/// client each create an independent session.
pub fn derive_session_id(client_id: &str, created_at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        client_id,
        created_at.timestamp_millis(),
        &suffix[..8]
    )
}
