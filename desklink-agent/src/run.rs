//! Agent state machine: register → idle → prompt → active session.
//!
//! The agent never gives up on the broker. Registration retries
//! forever; transport hiccups during polling are logged and retried on
//! the next tick; only an explicit 404 (the broker forgot the session)
//! drops back to re-registration.

use std::time::Duration;

use desklink_core::config::AgentConfig;
use desklink_core::protocol::{Payload, RegisterRequest, Side};
use desklink_core::{BrokerClient, RelayError};

use crate::capture::{encode_frame, FrameSource};
use crate::input::{apply_command, InputBackend};
use crate::prompt::AuthorizationPrompt;

/// Why an active session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The technician left; the session still exists at the broker and
    /// the agent returns to idle polling.
    PeerLeft,
    /// The broker no longer knows the session. Re-register.
    SessionGone,
}

pub struct Agent {
    client: BrokerClient,
    config: AgentConfig,
    register: RegisterRequest,
    source: Box<dyn FrameSource>,
    backend: Box<dyn InputBackend>,
    prompt: Box<dyn AuthorizationPrompt>,
}

impl Agent {
    pub fn new(
        config: AgentConfig,
        register: RegisterRequest,
        source: Box<dyn FrameSource>,
        backend: Box<dyn InputBackend>,
        prompt: Box<dyn AuthorizationPrompt>,
    ) -> Result<Self, RelayError> {
        let client = BrokerClient::new(
            &config.broker_url,
            Duration::from_secs(config.http_timeout_secs),
        )?;
        Ok(Self {
            client,
            config,
            register,
            source,
            backend,
            prompt,
        })
    }

    /// Outer loop: register, serve sessions until the broker forgets
    /// us, register again. Runs until the process is killed.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            let session_id = self
                .client
                .register_with_retry(
                    &self.register,
                    Duration::from_secs(self.config.register_retry_secs),
                )
                .await?;
            tracing::info!(
                "registered with {} as session {}",
                self.client.base_url(),
                session_id
            );
            self.serve(&session_id).await;
            tracing::info!("session {} gone at broker, re-registering", session_id);
        }
    }

    /// Idle/active cycle for one registered session. Returns when the
    /// broker no longer knows the session id.
    async fn serve(&mut self, session_id: &str) {
        let poll = Duration::from_secs(self.config.request_poll_secs);
        loop {
            let technician = match self.client.check_connection_request(session_id).await {
                Ok(Some(name)) => name,
                Ok(None) => {
                    tokio::time::sleep(poll).await;
                    continue;
                }
                Err(RelayError::NotFound) => return,
                Err(e) => {
                    tracing::warn!("request poll failed: {}", e);
                    tokio::time::sleep(poll).await;
                    continue;
                }
            };

            let approved = self.prompt.decide(&technician).await;
            match self.client.authorize(session_id, approved).await {
                Ok(()) => {}
                Err(RelayError::NotFound) => return,
                Err(e) => {
                    tracing::warn!("authorize failed: {}", e);
                    continue;
                }
            }
            if !approved {
                tracing::info!("denied connection from {}", technician);
                continue;
            }

            tracing::info!("session with {} started", technician);
            match self.active(session_id).await {
                EndReason::PeerLeft => {
                    tracing::info!("technician left, waiting for a new request");
                }
                EndReason::SessionGone => return,
            }
        }
    }

    /// Active remote-assistance session: frame pushes and command
    /// polling run concurrently until either observes the end.
    async fn active(&mut self, session_id: &str) -> EndReason {
        tokio::select! {
            reason = run_capture_loop(&self.client, session_id, self.source.as_mut(), &self.config) => reason,
            reason = run_command_loop(&self.client, session_id, self.backend.as_mut(), &self.config) => reason,
        }
    }
}

/// Push frames at the configured cadence until the session disappears.
pub async fn run_capture_loop(
    client: &BrokerClient,
    session_id: &str,
    source: &mut dyn FrameSource,
    config: &AgentConfig,
) -> EndReason {
    let mut ticker = tokio::time::interval(Duration::from_millis(config.frame_interval_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let frame = match source.grab().await {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!("capture failed: {}", e);
                continue;
            }
        };
        let data = match encode_frame(
            &frame,
            config.frame_max_width,
            config.frame_max_height,
            config.jpeg_quality,
        ) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!("frame encode failed: {}", e);
                continue;
            }
        };

        match client
            .send_message(session_id, Side::Client, Payload::screen(data))
            .await
        {
            Ok(()) => {}
            Err(RelayError::NotFound) => return EndReason::SessionGone,
            Err(e) => tracing::warn!("frame send failed: {}", e),
        }
    }
}

/// Poll for input commands, apply them, and send back command results.
pub async fn run_command_loop(
    client: &BrokerClient,
    session_id: &str,
    backend: &mut dyn InputBackend,
    config: &AgentConfig,
) -> EndReason {
    let mut ticker = tokio::time::interval(Duration::from_millis(config.command_poll_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let (messages, active) = match client.receive_messages(session_id, Side::Client).await {
            Ok(v) => v,
            Err(RelayError::NotFound) => return EndReason::SessionGone,
            Err(e) => {
                tracing::warn!("command poll failed: {}", e);
                continue;
            }
        };

        for msg in messages {
            let command = match Payload::from_value(&msg.message) {
                Some(Payload::Input(cmd)) => cmd,
                Some(Payload::Frame(_)) | None => {
                    tracing::debug!("ignoring non-command payload from {}", msg.sender);
                    continue;
                }
            };

            match apply_command(backend, command).await {
                Ok(Some(reply)) => {
                    let value = match serde_json::to_value(&reply) {
                        Ok(v) => v,
                        Err(e) => {
                            tracing::warn!("result serialize failed: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = client.send_message(session_id, Side::Client, value).await {
                        tracing::warn!("result send failed: {}", e);
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("input injection failed: {}", e),
            }
        }

        // drain first, then honor the end-of-session flag
        if !active {
            return EndReason::PeerLeft;
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SyntheticSource;
    use crate::input::NullInput;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(broker_url: String) -> AgentConfig {
        AgentConfig {
            broker_url,
            frame_interval_ms: 10,
            command_poll_ms: 10,
            http_timeout_secs: 2,
            ..AgentConfig::default()
        }
    }

    // ========================================================================
    // TEST 1: command loop applies a relayed command, then observes the
    //         end-of-session flag
    // ========================================================================
    #[tokio::test]
    async fn test_command_loop_applies_then_ends() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/receive_messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "messages": [
                    {
                        "sender": "technician",
                        "message": {"action": "mouse_move", "x": 400.0, "y": 300.0},
                        "timestamp": "2026-08-31T10:00:00Z"
                    }
                ],
                "session_active": false
            })))
            .mount(&server)
            .await;

        let config = test_config(server.uri());
        let client = BrokerClient::new(&config.broker_url, Duration::from_secs(2)).unwrap();
        let mut backend = NullInput::new(800, 600);

        let reason = run_command_loop(&client, "s1", &mut backend, &config).await;
        assert_eq!(reason, EndReason::PeerLeft);
        assert_eq!(backend.last_event.as_deref(), Some("move:400,300"));
    }

    // ========================================================================
    // TEST 2: command loop treats 404 as session-gone
    // ========================================================================
    #[tokio::test]
    async fn test_command_loop_session_gone() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/receive_messages"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "success": false,
                "error": "session not found"
            })))
            .mount(&server)
            .await;

        let config = test_config(server.uri());
        let client = BrokerClient::new(&config.broker_url, Duration::from_secs(2)).unwrap();
        let mut backend = NullInput::default();

        let reason = run_command_loop(&client, "gone", &mut backend, &config).await;
        assert_eq!(reason, EndReason::SessionGone);
    }

    // ========================================================================
    // TEST 3: capture loop pushes screen payloads until 404
    // ========================================================================
    #[tokio::test]
    async fn test_capture_loop_sends_frames_until_gone() {
        let server = MockServer::start().await;
        // accept two frames, then pretend the session vanished
        Mock::given(method("POST"))
            .and(path("/send_message"))
            .and(body_partial_json(json!({"sender": "client"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/send_message"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "success": false,
                "error": "session not found"
            })))
            .mount(&server)
            .await;

        let config = test_config(server.uri());
        let client = BrokerClient::new(&config.broker_url, Duration::from_secs(2)).unwrap();
        let mut source = SyntheticSource::new(64, 48);

        let reason = run_capture_loop(&client, "s1", &mut source, &config).await;
        assert_eq!(reason, EndReason::SessionGone);

        let sent = server.received_requests().await.unwrap();
        assert!(sent.len() >= 3);
        let first: serde_json::Value = serde_json::from_slice(&sent[0].body).unwrap();
        assert_eq!(first["message"]["type"], "screen");
        assert!(first["message"]["data"].is_string());
    }

    // ========================================================================
    // TEST 4: command loop ignores unrecognized payload shapes
    // ========================================================================
    #[tokio::test]
    async fn test_command_loop_ignores_unknown_payloads() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/receive_messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "messages": [
                    {
                        "sender": "technician",
                        "message": {"kind": "from-the-future"},
                        "timestamp": "2026-08-31T10:00:00Z"
                    }
                ],
                "session_active": false
            })))
            .mount(&server)
            .await;

        let config = test_config(server.uri());
        let client = BrokerClient::new(&config.broker_url, Duration::from_secs(2)).unwrap();
        let mut backend = NullInput::default();

        let reason = run_command_loop(&client, "s1", &mut backend, &config).await;
        assert_eq!(reason, EndReason::PeerLeft);
        assert!(backend.last_event.is_none());
    }
}
