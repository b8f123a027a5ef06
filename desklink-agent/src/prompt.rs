//! The consent prompt shown when a technician requests access.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Asks the person at the machine whether to allow the connection.
#[async_trait]
pub trait AuthorizationPrompt: Send {
    async fn decide(&mut self, technician_name: &str) -> bool;
}

/// Interactive y/n prompt on the terminal. Anything but an explicit
/// yes is a denial.
pub struct StdinPrompt;

#[async_trait]
impl AuthorizationPrompt for StdinPrompt {
    async fn decide(&mut self, technician_name: &str) -> bool {
        println!(
            "\n{} is requesting remote access to this machine.",
            technician_name
        );
        println!("Allow? [y/N] ");

        let mut line = String::new();
        let mut reader = BufReader::new(tokio::io::stdin());
        if reader.read_line(&mut line).await.is_err() {
            return false;
        }
        matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

/// Approves every request. For unattended machines (opt-in via flag).
pub struct AutoApprove;

#[async_trait]
impl AuthorizationPrompt for AutoApprove {
    async fn decide(&mut self, technician_name: &str) -> bool {
        tracing::info!("auto-approving connection from {}", technician_name);
        true
    }
}

/// Denies every request. Test fixture.
pub struct AutoDeny;

#[async_trait]
impl AuthorizationPrompt for AutoDeny {
    async fn decide(&mut self, _technician_name: &str) -> bool {
        false
    }
}
