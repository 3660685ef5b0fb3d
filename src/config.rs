//! Server configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// Default port for the HTTP API.
pub const DEFAULT_PORT: u16 = 3000;

/// Default seconds between periodic completion passes.
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `127.0.0.1`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// SQLite file. `None` uses the platform data directory.
    pub db_path: Option<PathBuf>,
    /// Seconds between periodic completion passes. `0` disables the loop.
    pub reconcile_interval_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default     |
    /// |----------------------------------|-------------|
    /// | `COHORT_HOST`                    | `127.0.0.1` |
    /// | `COHORT_PORT`                    | `3000`      |
    /// | `COHORT_DB_PATH`                 | data dir    |
    /// | `COHORT_RECONCILE_INTERVAL_SECS` | `30`        |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = lookup("COHORT_HOST").unwrap_or_else(|| "127.0.0.1".into());

        let port = match lookup("COHORT_PORT") {
            Some(v) => v
                .parse()
                .with_context(|| format!("COHORT_PORT must be a valid port, got '{}'", v))?,
            None => DEFAULT_PORT,
        };

        let db_path = lookup("COHORT_DB_PATH")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let reconcile_interval_secs = match lookup("COHORT_RECONCILE_INTERVAL_SECS") {
            Some(v) => v.parse().with_context(|| {
                format!("COHORT_RECONCILE_INTERVAL_SECS must be a number, got '{}'", v)
            })?,
            None => DEFAULT_RECONCILE_INTERVAL_SECS,
        };

        Ok(Self {
            host,
            port,
            db_path,
            reconcile_interval_secs,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn reconcile_interval(&self) -> Option<Duration> {
        (self.reconcile_interval_secs > 0).then(|| Duration::from_secs(self.reconcile_interval_secs))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            db_path: None,
            reconcile_interval_secs: DEFAULT_RECONCILE_INTERVAL_SECS,
        }
    }
}
