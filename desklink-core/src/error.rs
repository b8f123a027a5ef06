use thiserror::Error;

/// Error taxonomy shared by the broker, agent, and console.
///
/// `NotFound` is an expected, recoverable condition for both peers — a
/// session may have expired or been reaped between polls. The agent
/// recovers by re-registering, the console by re-listing.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("session not found")]
    NotFound,

    #[error("connection denied by the client")]
    Denied,

    #[error("authorization timed out: agent did not respond")]
    AuthorizationTimeout,

    #[error("a connection request is already pending")]
    RequestPending,

    #[error("session already has a connected technician")]
    AlreadyPaired,

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl RelayError {
    /// Whether the caller can recover by re-registering / re-listing
    /// instead of treating the error as fatal.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RelayError::NotFound
                | RelayError::Denied
                | RelayError::AuthorizationTimeout
                | RelayError::RequestPending
                | RelayError::AlreadyPaired
                | RelayError::Transport(_)
        )
    }
}
