//! Wire types for the broker's HTTP surface.
//!
//! Every endpoint speaks JSON with a `success: bool` envelope plus
//! operation-specific fields. Relayed payloads are opaque
//! `serde_json::Value` to the broker; the typed shapes below
//! (`FramePayload`, `InputCommand`) are what the agent and console
//! read and write into that opaque slot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical input coordinate space: the console's capture viewport.
/// Input coordinates travel normalized to this space and the agent
/// scales them to its actual screen resolution.
pub const CANONICAL_WIDTH: u32 = 800;
pub const CANONICAL_HEIGHT: u32 = 600;

/// Which side of a session a message or call originates from. A
/// message is never addressed — `sender` identifies the origin and the
/// broker queues it for the opposite side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Client,
    Technician,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Client => Side::Technician,
            Side::Technician => Side::Client,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Client => write!(f, "client"),
            Side::Technician => write!(f, "technician"),
        }
    }
}

/// One relayed payload, as queued by the broker and returned from
/// `/receive_messages`. The timestamp is informational only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayedMessage {
    pub sender: Side,
    pub message: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Endpoint request / response DTOs
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub client_id: String,
    #[serde(default)]
    pub access_code: Option<String>,
    pub client_name: String,
    pub os: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub session_id: String,
}

/// Discovery entry returned from `/list_sessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub client_id: String,
    pub client_name: String,
    pub os: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListSessionsResponse {
    pub success: bool,
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectionRequest {
    pub session_id: String,
    pub technician_name: String,
}

/// Generic `{success, error?}` envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Query string for the GET endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionQuery {
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectionRequestStatus {
    pub connection_request: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technician_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthorizeRequest {
    pub session_id: String,
    pub authorized: bool,
}

/// Broker-side answer to `/check_authorization`. The broker answers
/// immediately with current state; the *timeout* outcome is produced
/// by the console's own deadline, since the broker cannot distinguish
/// "still pending" from "will never answer".
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthorizationStatus {
    pub success: bool,
    pub authorized: bool,
    pub pending: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub session_id: String,
    pub sender: Side,
    pub message: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReceiveMessagesRequest {
    pub session_id: String,
    pub receiver: Side,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReceiveMessagesResponse {
    pub success: bool,
    pub messages: Vec<RelayedMessage>,
    /// `client_connected AND technician_connected`. A caller observing
    /// `false` must treat it as end-of-session and stop polling.
    pub session_active: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DisconnectRequest {
    pub session_id: String,
    pub who: Side,
}

// ============================================================================
// Recognized payload shapes (opaque to the broker)
// ============================================================================

/// Screen frame: `{ "type": "screen", "data": "<base64 jpeg>" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FramePayload {
    Screen { data: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
}

/// Input command: `{ "action": "...", ... }`. Coordinates are in the
/// canonical 800×600 space. `CommandResult` travels back from the
/// client after an `ExecuteCommand`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum InputCommand {
    MouseMove {
        x: f64,
        y: f64,
    },
    MouseClick {
        x: f64,
        y: f64,
        #[serde(default)]
        button: MouseButton,
    },
    KeyboardInput {
        text: String,
    },
    ExecuteCommand {
        command: String,
    },
    CommandResult {
        stdout: String,
        stderr: String,
        exit_code: i32,
    },
}

/// Any payload either side understands. Unrecognized shapes stay raw
/// so a newer peer cannot break an older one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Frame(FramePayload),
    Input(InputCommand),
}

impl Payload {
    /// Parse an opaque relayed value; `None` for unrecognized shapes.
    pub fn from_value(value: &serde_json::Value) -> Option<Payload> {
        serde_json::from_value(value.clone()).ok()
    }

    pub fn screen(data: String) -> serde_json::Value {
        serde_json::json!({ "type": "screen", "data": data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_side_serializes_lowercase_and_opposes() {
        assert_eq!(serde_json::to_value(Side::Client).unwrap(), json!("client"));
        assert_eq!(
            serde_json::to_value(Side::Technician).unwrap(),
            json!("technician")
        );
        assert_eq!(Side::Client.opposite(), Side::Technician);
        assert_eq!(Side::Technician.opposite(), Side::Client);
    }

    #[test]
    fn test_screen_payload_wire_shape() {
        let v = Payload::screen("AAA".to_string());
        assert_eq!(v, json!({"type": "screen", "data": "AAA"}));
    }

    #[test]
    fn test_input_command_wire_shapes() {
        let click = serde_json::to_value(InputCommand::MouseClick {
            x: 400.0,
            y: 300.0,
            button: MouseButton::Left,
        })
        .unwrap();
        assert_eq!(click["action"], "mouse_click");
        assert_eq!(click["button"], "left");

        let parsed: InputCommand =
            serde_json::from_value(json!({"action": "mouse_move", "x": 10.0, "y": 20.0})).unwrap();
        assert_eq!(parsed, InputCommand::MouseMove { x: 10.0, y: 20.0 });
    }

    #[test]
    fn test_mouse_click_defaults_to_left_button() {
        let parsed: InputCommand =
            serde_json::from_value(json!({"action": "mouse_click", "x": 1.0, "y": 2.0})).unwrap();
        match parsed {
            InputCommand::MouseClick { button, .. } => assert_eq!(button, MouseButton::Left),
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_payload_from_value_dispatches() {
        let frame = Payload::from_value(&json!({"type": "screen", "data": "Zg=="}));
        assert!(matches!(frame, Some(Payload::Frame(_))));

        let input = Payload::from_value(&json!({"action": "keyboard_input", "text": "hi"}));
        assert!(matches!(input, Some(Payload::Input(_))));

        assert!(Payload::from_value(&json!({"kind": "unknown"})).is_none());
    }

    #[test]
    fn test_ack_skips_absent_error() {
        let ack = Ack {
            success: true,
            error: None,
        };
        let v = serde_json::to_value(&ack).unwrap();
        assert!(v.get("error").is_none());
    }
}
