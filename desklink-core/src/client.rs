//! HTTP client for the broker's relay endpoints.
//!
//! Shared by the agent and console binaries. All calls are short,
//! bounded-timeout requests; a timeout or connection failure surfaces
//! as `RelayError::Transport` and is never fatal to the caller's
//! process. 404 maps to `RelayError::NotFound`, 409 to
//! `RelayError::RequestPending`.

use std::time::Duration;

use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;

use crate::error::RelayError;
use crate::protocol::{
    Ack, AuthorizationStatus, AuthorizeRequest, ConnectionRequest, ConnectionRequestStatus,
    DisconnectRequest, ListSessionsResponse, ReceiveMessagesRequest, ReceiveMessagesResponse,
    RegisterRequest, RegisterResponse, RelayedMessage, SendMessageRequest, SessionSummary, Side,
};

/// Final outcome of the console's authorization wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    Authorized,
    Denied,
    /// The client-side deadline expired while the request was still
    /// pending: "agent did not respond", distinct from a refusal.
    Timeout,
}

#[derive(Clone)]
pub struct BrokerClient {
    http: reqwest::Client,
    base: String,
}

impl BrokerClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base, endpoint)
    }

    /// Single registration attempt.
    pub async fn register(&self, req: &RegisterRequest) -> Result<String, RelayError> {
        let resp = self
            .http
            .post(self.url("/register_client"))
            .json(req)
            .send()
            .await?;
        let body: RegisterResponse = expect_ok(resp).await?.json().await?;
        Ok(body.session_id)
    }

    /// Register, retrying at a fixed interval until the broker answers.
    /// The agent must never give up trying to reach the broker.
    pub async fn register_with_retry(
        &self,
        req: &RegisterRequest,
        interval: Duration,
    ) -> Result<String, RelayError> {
        Retry::spawn(FixedInterval::new(interval), || async {
            match self.register(req).await {
                Ok(id) => Ok(id),
                Err(e) => {
                    tracing::warn!("registration failed, will retry: {}", e);
                    Err(e)
                }
            }
        })
        .await
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, RelayError> {
        let resp = self.http.get(self.url("/list_sessions")).send().await?;
        let body: ListSessionsResponse = expect_ok(resp).await?.json().await?;
        Ok(body.sessions)
    }

    pub async fn request_connection(
        &self,
        session_id: &str,
        technician_name: &str,
    ) -> Result<(), RelayError> {
        let resp = self
            .http
            .post(self.url("/request_connection"))
            .json(&ConnectionRequest {
                session_id: session_id.to_string(),
                technician_name: technician_name.to_string(),
            })
            .send()
            .await?;
        let _: Ack = expect_ok(resp).await?.json().await?;
        Ok(())
    }

    /// The requesting technician's name, if a request is pending.
    pub async fn check_connection_request(
        &self,
        session_id: &str,
    ) -> Result<Option<String>, RelayError> {
        let resp = self
            .http
            .get(self.url("/check_connection_request"))
            .query(&[("session_id", session_id)])
            .send()
            .await?;
        let body: ConnectionRequestStatus = expect_ok(resp).await?.json().await?;
        if body.connection_request {
            Ok(Some(body.technician_name.unwrap_or_default()))
        } else {
            Ok(None)
        }
    }

    pub async fn authorize(&self, session_id: &str, authorized: bool) -> Result<(), RelayError> {
        let resp = self
            .http
            .post(self.url("/authorize_connection"))
            .json(&AuthorizeRequest {
                session_id: session_id.to_string(),
                authorized,
            })
            .send()
            .await?;
        let _: Ack = expect_ok(resp).await?.json().await?;
        Ok(())
    }

    pub async fn check_authorization(
        &self,
        session_id: &str,
    ) -> Result<AuthorizationStatus, RelayError> {
        let resp = self
            .http
            .get(self.url("/check_authorization"))
            .query(&[("session_id", session_id)])
            .send()
            .await?;
        Ok(expect_ok(resp).await?.json().await?)
    }

    /// Poll `/check_authorization` until decided or the client-side
    /// deadline expires.
    pub async fn wait_for_authorization(
        &self,
        session_id: &str,
        poll: Duration,
        deadline: Duration,
    ) -> Result<AuthorizationOutcome, RelayError> {
        let started = tokio::time::Instant::now();
        loop {
            let status = self.check_authorization(session_id).await?;
            if status.authorized {
                return Ok(AuthorizationOutcome::Authorized);
            }
            if !status.pending {
                return Ok(AuthorizationOutcome::Denied);
            }
            if started.elapsed() >= deadline {
                return Ok(AuthorizationOutcome::Timeout);
            }
            tokio::time::sleep(poll).await;
        }
    }

    pub async fn send_message(
        &self,
        session_id: &str,
        sender: Side,
        message: serde_json::Value,
    ) -> Result<(), RelayError> {
        let resp = self
            .http
            .post(self.url("/send_message"))
            .json(&SendMessageRequest {
                session_id: session_id.to_string(),
                sender,
                message,
            })
            .send()
            .await?;
        let _: Ack = expect_ok(resp).await?.json().await?;
        Ok(())
    }

    /// Returns the queued messages for `receiver` and whether the
    /// session is still active.
    pub async fn receive_messages(
        &self,
        session_id: &str,
        receiver: Side,
    ) -> Result<(Vec<RelayedMessage>, bool), RelayError> {
        let resp = self
            .http
            .post(self.url("/receive_messages"))
            .json(&ReceiveMessagesRequest {
                session_id: session_id.to_string(),
                receiver,
            })
            .send()
            .await?;
        let body: ReceiveMessagesResponse = expect_ok(resp).await?.json().await?;
        Ok((body.messages, body.session_active))
    }

    pub async fn disconnect(&self, session_id: &str, who: Side) -> Result<(), RelayError> {
        let resp = self
            .http
            .post(self.url("/disconnect"))
            .json(&DisconnectRequest {
                session_id: session_id.to_string(),
                who,
            })
            .send()
            .await?;
        let _: Ack = expect_ok(resp).await?.json().await?;
        Ok(())
    }
}

/// Map broker status codes onto the shared error taxonomy.
async fn expect_ok(resp: reqwest::Response) -> Result<reqwest::Response, RelayError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else if status == reqwest::StatusCode::NOT_FOUND {
        Err(RelayError::NotFound)
    } else if status == reqwest::StatusCode::CONFLICT {
        Err(RelayError::RequestPending)
    } else {
        let body = resp.text().await.unwrap_or_default();
        Err(RelayError::Protocol(format!(
            "broker returned {}: {}",
            status, body
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn register_req() -> RegisterRequest {
        RegisterRequest {
            client_id: "c1".to_string(),
            access_code: None,
            client_name: "Office PC".to_string(),
            os: "linux".to_string(),
        }
    }

    async fn client(server: &MockServer) -> BrokerClient {
        BrokerClient::new(&server.uri(), Duration::from_secs(2)).unwrap()
    }

    // ========================================================================
    // TEST 1: register returns the broker-assigned session id
    // ========================================================================
    #[tokio::test]
    async fn test_register_returns_session_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/register_client"))
            .and(body_partial_json(json!({"client_id": "c1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "session_id": "c1-123-abcd"
            })))
            .mount(&server)
            .await;

        let id = client(&server).await.register(&register_req()).await.unwrap();
        assert_eq!(id, "c1-123-abcd");
    }

    // ========================================================================
    // TEST 2: register_with_retry survives transient broker failures
    // ========================================================================
    #[tokio::test]
    async fn test_register_with_retry_recovers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/register_client"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/register_client"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "session_id": "c1-9-zzzz"
            })))
            .mount(&server)
            .await;

        let id = client(&server)
            .await
            .register_with_retry(&register_req(), Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(id, "c1-9-zzzz");
    }

    // ========================================================================
    // TEST 3: unknown session maps 404 → RelayError::NotFound
    // ========================================================================
    #[tokio::test]
    async fn test_request_connection_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/request_connection"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "success": false,
                "error": "session not found"
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .request_connection("gone", "Tech-A")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::NotFound));
    }

    // ========================================================================
    // TEST 4: pending request carries the technician's name
    // ========================================================================
    #[tokio::test]
    async fn test_check_connection_request_pending() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/check_connection_request"))
            .and(query_param("session_id", "s1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "connection_request": true,
                "technician_name": "Tech-A"
            })))
            .mount(&server)
            .await;

        let pending = client(&server)
            .await
            .check_connection_request("s1")
            .await
            .unwrap();
        assert_eq!(pending.as_deref(), Some("Tech-A"));
    }

    // ========================================================================
    // TEST 5: receive_messages parses queue + liveness flag
    // ========================================================================
    #[tokio::test]
    async fn test_receive_messages_parses_payloads() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/receive_messages"))
            .and(body_partial_json(json!({"receiver": "technician"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "messages": [
                    {
                        "sender": "client",
                        "message": {"type": "screen", "data": "AAA"},
                        "timestamp": "2026-08-31T10:00:00Z"
                    }
                ],
                "session_active": false
            })))
            .mount(&server)
            .await;

        let (messages, active) = client(&server)
            .await
            .receive_messages("s1", Side::Technician)
            .await
            .unwrap();
        assert!(!active);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender, Side::Client);
        assert_eq!(messages[0].message["data"], "AAA");
    }

    // ========================================================================
    // TEST 6: wait_for_authorization — immediate approval
    // ========================================================================
    #[tokio::test]
    async fn test_wait_for_authorization_authorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/check_authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "authorized": true,
                "pending": false
            })))
            .mount(&server)
            .await;

        let outcome = client(&server)
            .await
            .wait_for_authorization("s1", Duration::from_millis(10), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(outcome, AuthorizationOutcome::Authorized);
    }

    // ========================================================================
    // TEST 7: wait_for_authorization — denial is not a timeout
    // ========================================================================
    #[tokio::test]
    async fn test_wait_for_authorization_denied() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/check_authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "authorized": false,
                "pending": false
            })))
            .mount(&server)
            .await;

        let outcome = client(&server)
            .await
            .wait_for_authorization("s1", Duration::from_millis(10), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(outcome, AuthorizationOutcome::Denied);
    }

    // ========================================================================
    // TEST 8: wait_for_authorization — deadline expiry is a timeout
    // ========================================================================
    #[tokio::test]
    async fn test_wait_for_authorization_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/check_authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "authorized": false,
                "pending": true
            })))
            .mount(&server)
            .await;

        let outcome = client(&server)
            .await
            .wait_for_authorization("s1", Duration::from_millis(10), Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(outcome, AuthorizationOutcome::Timeout);
    }

    // ========================================================================
    // TEST 9: unreachable broker surfaces as Transport, not a panic
    // ========================================================================
    #[tokio::test]
    async fn test_unreachable_broker_is_transport_error() {
        // nothing listens on this port
        let c = BrokerClient::new("http://127.0.0.1:1", Duration::from_millis(200)).unwrap();
        let err = c.list_sessions().await.unwrap_err();
        assert!(matches!(err, RelayError::Transport(_)));
    }
}
