use config::{Config, ConfigError, File};
use serde::Deserialize;

/// Top-level configuration. Every section has full defaults so the
/// binaries run from flags alone; `desklink.toml` overrides them.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct DeskLinkConfig {
    pub broker: BrokerConfig,
    pub agent: AgentConfig,
    pub console: ConsoleConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    /// Sessions older than this are reaped regardless of connection
    /// flags — models power-loss cleanup for clients that never call
    /// disconnect.
    pub session_ttl_hours: u64,
    pub sweep_interval_minutes: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8700,
            session_ttl_hours: 24,
            sweep_interval_minutes: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    pub broker_url: String,
    pub client_name: String,
    /// Registration retry interval. The agent never gives up trying to
    /// reach the broker.
    pub register_retry_secs: u64,
    pub request_poll_secs: u64,
    /// Capture cadence (~2 fps bounds bandwidth).
    pub frame_interval_ms: u64,
    pub command_poll_ms: u64,
    pub frame_max_width: u32,
    pub frame_max_height: u32,
    pub jpeg_quality: u8,
    pub http_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            broker_url: "http://127.0.0.1:8700".to_string(),
            client_name: "unnamed-client".to_string(),
            register_retry_secs: 10,
            request_poll_secs: 2,
            frame_interval_ms: 500,
            command_poll_ms: 1000,
            frame_max_width: 1280,
            frame_max_height: 720,
            jpeg_quality: 60,
            http_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ConsoleConfig {
    pub broker_url: String,
    pub technician_name: String,
    pub list_refresh_secs: u64,
    /// Client-side deadline on the authorization wait. Expiry is
    /// surfaced as "agent did not respond", never as a denial.
    pub authorization_timeout_secs: u64,
    pub authorization_poll_ms: u64,
    pub render_poll_ms: u64,
    /// Directory the newest received frame is written to.
    pub frame_dir: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub http_timeout_secs: u64,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            broker_url: "http://127.0.0.1:8700".to_string(),
            technician_name: "Technician".to_string(),
            list_refresh_secs: 5,
            authorization_timeout_secs: 35,
            authorization_poll_ms: 1000,
            render_poll_ms: 1000,
            frame_dir: "frames".to_string(),
            viewport_width: 800,
            viewport_height: 600,
            http_timeout_secs: 10,
        }
    }
}

impl DeskLinkConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .build()?;
        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol_contract() {
        let cfg = DeskLinkConfig::default();
        assert_eq!(cfg.broker.session_ttl_hours, 24);
        assert_eq!(cfg.agent.register_retry_secs, 10);
        assert_eq!(cfg.console.authorization_timeout_secs, 35);
        assert_eq!(cfg.console.viewport_width, 800);
        assert_eq!(cfg.console.viewport_height, 600);
    }

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let cfg = DeskLinkConfig::load("/nonexistent/desklink.toml").expect("defaults");
        assert_eq!(cfg.broker.port, 8700);
        assert_eq!(cfg.agent.frame_interval_ms, 500);
    }
}
