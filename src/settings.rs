//! Server settings, layered from defaults, a TOML file, and environment.

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::relay::{DEFAULT_HISTORY_LIMIT, RetryPolicy};

/// Environment variable prefix, e.g. `ROOMCAST_PORT=9000`.
const ENV_PREFIX: &str = "ROOMCAST";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Path of the SQLite database file.
    pub database_path: PathBuf,
    /// Shared secret for validating connection tokens (HS256).
    pub jwt_secret: String,
    /// Size of the durable history window replayed on connect.
    pub history_limit: u32,
    /// Most-recent-K bound of the per-room hot cache.
    pub cache_capacity: usize,
    /// Upper bound for the whole admission check, in milliseconds.
    pub admit_timeout_ms: u64,
    /// Attempts before a durable log outage is surfaced to the sender.
    pub retry_max_attempts: u32,
    /// First retry delay in milliseconds; doubles per attempt.
    pub retry_base_delay_ms: u64,
}

impl Settings {
    /// Load settings, optionally merging a TOML config file and
    /// `ROOMCAST_*` environment overrides on top of the defaults.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", 8080)?
            .set_default("database_path", "roomcast.db")?
            .set_default("jwt_secret", "")?
            .set_default("history_limit", DEFAULT_HISTORY_LIMIT as i64)?
            .set_default("cache_capacity", DEFAULT_CACHE_CAPACITY as i64)?
            .set_default("admit_timeout_ms", 5_000)?
            .set_default("retry_max_attempts", 3)?
            .set_default("retry_base_delay_ms", 100)?;

        if let Some(path) = config_path {
            builder = builder.add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(true),
            );
        }

        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX));

        builder
            .build()
            .context("building configuration")?
            .try_deserialize()
            .context("deserializing configuration")
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn admit_timeout(&self) -> Duration {
        Duration::from_millis(self.admit_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.history_limit, 50);
        assert_eq!(settings.cache_capacity, 20);
        assert_eq!(settings.retry_policy().max_attempts, 3);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(file, "port = 9999\ncache_capacity = 5").unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.port, 9999);
        assert_eq!(settings.cache_capacity, 5);
        // Untouched keys keep their defaults.
        assert_eq!(settings.history_limit, 50);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(Settings::load(Some(Path::new("/nonexistent/roomcast.toml"))).is_err());
    }
}
