//! Configuration Module
//!
//! Handles loading the mirror's configuration from environment variables and
//! turning it into the transport descriptor and library-level options.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{MirrorError, Result};
use crate::sync::BackoffConfig;

/// Process configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Network type of the backing store: `tcp` or `unix`
    pub redis_network: String,
    /// `host:port` for tcp, socket path for unix
    pub redis_addr: String,
    /// Database index, selects both the keyspace and the notification namespace
    pub db_index: i64,
    /// Number of keys fetched per MGET during a bootstrap scan
    pub scan_batch_size: usize,
    /// COUNT hint passed with each SCAN page
    pub scan_count: usize,
    /// Receive timeout of the event loop in milliseconds
    pub receive_timeout_ms: u64,
    /// Full resync interval in seconds (0 disables periodic resync)
    pub resync_interval: u64,
    /// Flags pushed with `CONFIG SET notify-keyspace-events` on startup
    pub notify_keyspace_events: Option<String>,
    /// HTTP server port
    pub server_port: u16,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `REDIS_NETWORK` - `tcp` or `unix` (default: tcp)
    /// - `REDIS_ADDR` - Address or socket path (default: 127.0.0.1:6379)
    /// - `REDIS_DB` - Database index (default: 0)
    /// - `SCAN_BATCH_SIZE` - Keys per MGET (default: 10)
    /// - `SCAN_COUNT` - SCAN page size hint (default: 100)
    /// - `RECEIVE_TIMEOUT_MS` - Event receive timeout (default: 1000)
    /// - `RESYNC_INTERVAL` - Seconds between full resyncs, 0 = off (default: 0)
    /// - `NOTIFY_KEYSPACE_EVENTS` - Notification flags to enable (default: unset)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_network: env::var("REDIS_NETWORK").unwrap_or(defaults.redis_network),
            redis_addr: env::var("REDIS_ADDR").unwrap_or(defaults.redis_addr),
            db_index: parse_env("REDIS_DB").unwrap_or(defaults.db_index),
            scan_batch_size: parse_env("SCAN_BATCH_SIZE").unwrap_or(defaults.scan_batch_size),
            scan_count: parse_env("SCAN_COUNT").unwrap_or(defaults.scan_count),
            receive_timeout_ms: parse_env("RECEIVE_TIMEOUT_MS")
                .unwrap_or(defaults.receive_timeout_ms),
            resync_interval: parse_env("RESYNC_INTERVAL").unwrap_or(defaults.resync_interval),
            notify_keyspace_events: env::var("NOTIFY_KEYSPACE_EVENTS")
                .ok()
                .filter(|flags| !flags.is_empty()),
            server_port: parse_env("SERVER_PORT").unwrap_or(defaults.server_port),
        }
    }

    /// Builds the transport descriptor from the network type and address.
    pub fn transport(&self) -> Result<Transport> {
        Transport::new(&self.redis_network, &self.redis_addr, self.db_index)
    }

    /// Derives the library options used to build a [`crate::Mirror`].
    pub fn mirror_options(&self) -> MirrorOptions {
        MirrorOptions {
            db_index: self.db_index,
            batch_size: self.scan_batch_size.max(1),
            scan_count: self.scan_count.max(1),
            receive_timeout: Duration::from_millis(self.receive_timeout_ms.max(1)),
            backoff: BackoffConfig::default(),
        }
    }

    /// Periodic resync interval, if enabled.
    pub fn resync_interval(&self) -> Option<Duration> {
        (self.resync_interval > 0).then(|| Duration::from_secs(self.resync_interval))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_network: "tcp".to_string(),
            redis_addr: "127.0.0.1:6379".to_string(),
            db_index: 0,
            scan_batch_size: 10,
            scan_count: 100,
            receive_timeout_ms: 1000,
            resync_interval: 0,
            notify_keyspace_events: None,
            server_port: 3000,
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

// == Transport ==
/// Where the backing store lives and which database to mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Tcp { addr: String, db: i64 },
    Unix { path: PathBuf, db: i64 },
}

impl Transport {
    /// Parses a network type (`tcp` / `unix`) and address.
    pub fn new(network: &str, addr: &str, db: i64) -> Result<Self> {
        if addr.is_empty() {
            return Err(MirrorError::Config("address must not be empty".to_string()));
        }
        if db < 0 {
            return Err(MirrorError::Config(format!(
                "database index must be non-negative, got {}",
                db
            )));
        }
        match network.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Transport::Tcp {
                addr: addr.to_string(),
                db,
            }),
            "unix" => Ok(Transport::Unix {
                path: PathBuf::from(addr),
                db,
            }),
            other => Err(MirrorError::Config(format!(
                "unsupported network type '{}'",
                other
            ))),
        }
    }

    /// Database index carried by this transport.
    pub fn db(&self) -> i64 {
        match self {
            Transport::Tcp { db, .. } | Transport::Unix { db, .. } => *db,
        }
    }

    /// Connection URL understood by the redis client.
    pub fn connection_url(&self) -> String {
        match self {
            Transport::Tcp { addr, db } => format!("redis://{}/{}", addr, db),
            Transport::Unix { path, db } => format!("redis+unix://{}?db={}", path.display(), db),
        }
    }
}

// == Mirror Options ==
/// Library-level tuning of a mirror.
#[derive(Debug, Clone)]
pub struct MirrorOptions {
    /// Database index whose notification namespace is subscribed
    pub db_index: i64,
    /// Keys fetched per MGET while bootstrapping
    pub batch_size: usize,
    /// SCAN COUNT hint
    pub scan_count: usize,
    /// Upper bound on one blocking receive of the event loop
    pub receive_timeout: Duration,
    /// Reconnect pacing of the event loop
    pub backoff: BackoffConfig,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        Config::default().mirror_options()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.redis_network, "tcp");
        assert_eq!(config.redis_addr, "127.0.0.1:6379");
        assert_eq!(config.db_index, 0);
        assert_eq!(config.scan_batch_size, 10);
        assert_eq!(config.receive_timeout_ms, 1000);
        assert_eq!(config.server_port, 3000);
        assert!(config.resync_interval().is_none());
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("SCAN_BATCH_SIZE");
        env::remove_var("RECEIVE_TIMEOUT_MS");
        env::remove_var("NOTIFY_KEYSPACE_EVENTS");

        let config = Config::from_env();
        assert_eq!(config.scan_batch_size, 10);
        assert_eq!(config.receive_timeout_ms, 1000);
        assert!(config.notify_keyspace_events.is_none());
    }

    #[test]
    fn test_mirror_options_clamp_zero_sizes() {
        let config = Config {
            scan_batch_size: 0,
            scan_count: 0,
            db_index: 3,
            ..Config::default()
        };
        let options = config.mirror_options();
        assert_eq!(options.batch_size, 1);
        assert_eq!(options.scan_count, 1);
        assert_eq!(options.db_index, 3);
    }

    #[test]
    fn test_transport_tcp_url_carries_db() {
        let transport = Transport::new("tcp", "10.0.0.5:6380", 2).unwrap();
        assert_eq!(transport.connection_url(), "redis://10.0.0.5:6380/2");
        assert_eq!(transport.db(), 2);
    }

    #[test]
    fn test_transport_unix_url() {
        let transport = Transport::new("unix", "/run/redis.sock", 0).unwrap();
        assert_eq!(
            transport.connection_url(),
            "redis+unix:///run/redis.sock?db=0"
        );
    }

    #[test]
    fn test_transport_rejects_bad_input() {
        assert!(matches!(
            Transport::new("udp", "localhost:1", 0),
            Err(MirrorError::Config(_))
        ));
        assert!(Transport::new("tcp", "", 0).is_err());
        assert!(Transport::new("tcp", "localhost:6379", -1).is_err());
    }
}
