use std::net::SocketAddr;

use clap::Parser;

use crate::error::RelayError;

/// telerelay: source status frames in, live text feed out
#[derive(Parser, Debug, Clone)]
#[command(name = "telerelay")]
#[command(about = "Relay binary source status frames to line-oriented listeners")]
pub struct Config {
    /// Host both endpoints bind to
    #[arg(long, env = "RELAY_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port sources push frames to
    #[arg(long, env = "RELAY_SOURCE_PORT", default_value = "8888")]
    pub source_port: u16,

    /// Port listeners connect to for the text feed
    #[arg(long, env = "RELAY_LISTENER_PORT", default_value = "8889")]
    pub listener_port: u16,

    /// Health/metrics listen address (disabled when unset)
    #[arg(long, env = "RELAY_HEALTH_ADDR")]
    pub health_addr: Option<SocketAddr>,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,
}

impl Config {
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.host.trim().is_empty() {
            return Err(RelayError::Config("host must not be empty".into()));
        }
        Ok(())
    }

    pub fn source_bind(&self) -> String {
        format!("{}:{}", self.host, self.source_port)
    }

    pub fn listener_bind(&self) -> String {
        format!("{}:{}", self.host, self.listener_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["telerelay"]).unwrap();
        assert_eq!(config.source_bind(), "127.0.0.1:8888");
        assert_eq!(config.listener_bind(), "127.0.0.1:8889");
        assert!(config.health_addr.is_none());
        assert!(!config.log_json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_flags_override() {
        let config = Config::try_parse_from([
            "telerelay",
            "--host",
            "0.0.0.0",
            "--source-port",
            "9000",
            "--listener-port",
            "9001",
            "--health-addr",
            "127.0.0.1:9090",
            "--log-json",
        ])
        .unwrap();
        assert_eq!(config.source_bind(), "0.0.0.0:9000");
        assert_eq!(config.listener_bind(), "0.0.0.0:9001");
        assert_eq!(config.health_addr, Some("127.0.0.1:9090".parse().unwrap()));
        assert!(config.log_json);
    }

    #[test]
    fn test_empty_host_rejected() {
        let config = Config::try_parse_from(["telerelay", "--host", " "]).unwrap();
        assert!(matches!(config.validate(), Err(RelayError::Config(_))));
    }
}
