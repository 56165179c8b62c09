//! Indexer configuration.
//!
//! Values are layered: defaults, then an optional JSON file, then `TXWATCH_*`
//! environment variables. The server binary applies command-line flags last.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use crate::chain::RpcClientConfig;
use crate::error::{Error, Result};

/// Default head lookback, in blocks, for startup and backfill
pub const DEFAULT_LOOKBACK_BLOCKS: u64 = 20;

/// Default polling interval in seconds
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;

/// Log filter used when `RUST_LOG` is unset or unparsable
pub const DEFAULT_LOG_FILTER: &str = "info";

// ═══════════════════════════════════════════════════════════════════════════════
// INDEXER CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Indexer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// JSON-RPC endpoint of the chain node
    pub rpc_url: String,
    /// HTTP listen address
    pub bind_addr: String,
    /// Seconds between polling ticks
    pub poll_interval_secs: u64,
    /// Blocks behind the head scanned at startup and on subscribe
    pub lookback_blocks: u64,
    /// Upper bound on concurrently running backfills
    pub max_concurrent_backfills: usize,
    /// Attempts for a skipped block before it is abandoned
    pub max_block_retries: u32,
    /// Maximum number of skipped blocks awaiting retry
    pub retry_queue_capacity: usize,
    /// RPC request timeout in seconds
    pub rpc_timeout_secs: u64,
    /// Grace period for draining requests and backfills on shutdown
    pub shutdown_grace_secs: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://cloudflare-eth.com".into(),
            bind_addr: "0.0.0.0:8080".into(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            lookback_blocks: DEFAULT_LOOKBACK_BLOCKS,
            max_concurrent_backfills: 4,
            max_block_retries: 3,
            retry_queue_capacity: 1024,
            rpc_timeout_secs: 30,
            shutdown_grace_secs: 5,
        }
    }
}

impl IndexerConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::InvalidConfig {
            field: "config_file".into(),
            reason: format!("{}: {}", path.display(), e),
        })?;

        serde_json::from_str(&content).map_err(|e| Error::InvalidConfig {
            field: "config_file".into(),
            reason: e.to_string(),
        })
    }

    /// Overlay `TXWATCH_*` environment variables onto `self`
    pub fn with_env(mut self) -> Self {
        if let Ok(url) = std::env::var("TXWATCH_RPC_URL") {
            self.rpc_url = url;
        }

        if let Ok(addr) = std::env::var("TXWATCH_BIND") {
            self.bind_addr = addr;
        }

        if let Some(secs) = env_number("TXWATCH_POLL_INTERVAL") {
            self.poll_interval_secs = secs;
        }

        if let Some(blocks) = env_number("TXWATCH_LOOKBACK") {
            self.lookback_blocks = blocks;
        }

        if let Some(n) = env_number("TXWATCH_MAX_BACKFILLS") {
            self.max_concurrent_backfills = n;
        }

        if let Some(secs) = env_number("TXWATCH_RPC_TIMEOUT") {
            self.rpc_timeout_secs = secs;
        }

        if let Some(n) = env_number("TXWATCH_MAX_RETRIES") {
            self.max_block_retries = n;
        }

        if let Some(n) = env_number("TXWATCH_RETRY_CAPACITY") {
            self.retry_queue_capacity = n;
        }

        if let Some(secs) = env_number("TXWATCH_SHUTDOWN_GRACE") {
            self.shutdown_grace_secs = secs;
        }

        self
    }

    /// Load from environment variables over defaults
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.is_empty() {
            return Err(invalid("rpc_url", "cannot be empty"));
        }

        if !self.rpc_url.starts_with("http://") && !self.rpc_url.starts_with("https://") {
            return Err(invalid("rpc_url", "must be an http(s) URL"));
        }

        self.socket_addr()?;

        if self.poll_interval_secs == 0 {
            return Err(invalid("poll_interval_secs", "must be greater than 0"));
        }

        if self.max_concurrent_backfills == 0 {
            return Err(invalid("max_concurrent_backfills", "must be greater than 0"));
        }

        if self.rpc_timeout_secs == 0 {
            return Err(invalid("rpc_timeout_secs", "must be greater than 0"));
        }

        Ok(())
    }

    /// Parsed listen address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind_addr
            .parse()
            .map_err(|e| invalid("bind_addr", &format!("{}", e)))
    }

    /// Polling interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Shutdown grace period
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Settings for the JSON-RPC reader
    pub fn rpc_client(&self) -> RpcClientConfig {
        RpcClientConfig {
            url: self.rpc_url.clone(),
            timeout_secs: self.rpc_timeout_secs,
            ..Default::default()
        }
    }
}

/// Build the log filter from `RUST_LOG`-style directives.
///
/// Unset, empty or unparsable directives fall back to [`DEFAULT_LOG_FILTER`].
pub fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn invalid(field: &str, reason: &str) -> Error {
    Error::InvalidConfig {
        field: field.into(),
        reason: reason.into(),
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = IndexerConfig::default();
        assert_eq!(config.lookback_blocks, 20);
        assert_eq!(config.poll_interval(), Duration::from_secs(15));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = IndexerConfig::default();
        config.rpc_url = String::new();
        assert!(config.validate().is_err());

        let mut config = IndexerConfig::default();
        config.rpc_url = "ws://node".into();
        assert!(config.validate().is_err());

        let mut config = IndexerConfig::default();
        config.bind_addr = "not-an-address".into();
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfig { ref field, .. }) if field == "bind_addr"
        ));

        let mut config = IndexerConfig::default();
        config.poll_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "rpc_url": "http://localhost:8545", "lookback_blocks": 5 }}"#).unwrap();

        let config = IndexerConfig::load(file.path()).unwrap();
        assert_eq!(config.rpc_url, "http://localhost:8545");
        assert_eq!(config.lookback_blocks, 5);
        assert_eq!(config.poll_interval_secs, DEFAULT_POLL_INTERVAL_SECS);
    }

    #[test]
    fn test_load_missing_file() {
        let err = IndexerConfig::load(Path::new("/nonexistent/txwatch.json")).unwrap_err();
        assert_eq!(err.code(), 3001);
    }

    #[test]
    fn test_env_overlay_covers_retry_and_shutdown() {
        std::env::set_var("TXWATCH_MAX_RETRIES", "7");
        std::env::set_var("TXWATCH_RETRY_CAPACITY", "64");
        std::env::set_var("TXWATCH_SHUTDOWN_GRACE", "11");
        let config = IndexerConfig::default().with_env();
        std::env::remove_var("TXWATCH_MAX_RETRIES");
        std::env::remove_var("TXWATCH_RETRY_CAPACITY");
        std::env::remove_var("TXWATCH_SHUTDOWN_GRACE");

        assert_eq!(config.max_block_retries, 7);
        assert_eq!(config.retry_queue_capacity, 64);
        assert_eq!(config.shutdown_grace(), Duration::from_secs(11));
    }

    #[test]
    fn test_log_filter_honors_bare_level() {
        use tracing_subscriber::filter::LevelFilter;

        assert_eq!(log_filter(Some("debug")).max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(log_filter(Some("warn")).max_level_hint(), Some(LevelFilter::WARN));
        assert_eq!(log_filter(None).max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(log_filter(Some("")).max_level_hint(), Some(LevelFilter::INFO));
    }

    #[test]
    fn test_rpc_client_settings() {
        let mut config = IndexerConfig::default();
        config.rpc_timeout_secs = 7;
        let rpc = config.rpc_client();
        assert_eq!(rpc.url, config.rpc_url);
        assert_eq!(rpc.timeout_secs, 7);
    }
}
