pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod protocol;
pub mod store;

pub use client::{AuthorizationOutcome, BrokerClient};
pub use config::DeskLinkConfig;
pub use error::RelayError;
pub use store::{MemoryStore, SessionStore};
