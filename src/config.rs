// Configuration - layered settings using figment
//
// Sources, highest priority first:
// 1. Environment variables (`PERMITQ_*`, `__` separates sections)
// 2. The TOML file passed with `--config`, or `./permit-queue.toml`
// 3. Built-in defaults
//
// `PERMITQ_STORE__TIMEOUT_SECS=5` maps to `store.timeout_secs`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "permit-queue.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "PERMITQ_";

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Figment extraction or merge error.
    #[error("Configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    /// A configuration field has an invalid value.
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        ConfigError::Figment(Box::new(e))
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PermitQueueConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// SQLite database file.
    pub path: PathBuf,
    /// Upper bound on any single store call.
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("permit-queue.db"),
            timeout_secs: 10,
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueSettings {
    /// How many fresh numbers `enqueue` requests after a duplicate before
    /// giving up.
    pub max_reissue_attempts: u32,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_reissue_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Default `EnvFilter` directive when `PERMITQ_LOG` is unset.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl PermitQueueConfig {
    /// Load from defaults, the TOML file and the environment.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(config_file).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Build the provider chain. A missing TOML file is skipped.
    pub fn figment(config_file: Option<&Path>) -> Figment {
        let path = config_file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            // PERMITQ_LOG is the tracing filter, not the [log] section
            .merge(Env::prefixed(ENV_PREFIX).ignore(&["log"]).split("__"))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.store.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "store.timeout_secs".to_string(),
                reason: "must be at least 1 second".to_string(),
            });
        }
        if self.store.path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "store.path".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_are_correct() {
        Jail::expect_with(|_jail| {
            let config = PermitQueueConfig::load(None).expect("config loads");
            assert_eq!(config.store.path, PathBuf::from("permit-queue.db"));
            assert_eq!(config.store.timeout(), Duration::from_secs(10));
            assert_eq!(config.queue.max_reissue_attempts, 3);
            assert_eq!(config.server.bind, "0.0.0.0:3000");
            assert_eq!(config.log.level, "info");
            Ok(())
        });
    }

    #[test]
    fn toml_file_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"
                [store]
                path = "/var/lib/kiosk/queue.db"
                timeout_secs = 4

                [queue]
                max_reissue_attempts = 1
                "#,
            )?;

            let config = PermitQueueConfig::load(None).expect("config loads");
            assert_eq!(config.store.path, PathBuf::from("/var/lib/kiosk/queue.db"));
            assert_eq!(config.store.timeout_secs, 4);
            assert_eq!(config.queue.max_reissue_attempts, 1);
            assert_eq!(config.server.bind, "0.0.0.0:3000");
            Ok(())
        });
    }

    #[test]
    fn env_beats_toml() {
        Jail::expect_with(|jail| {
            jail.create_file("kiosk.toml", "[server]\nbind = \"127.0.0.1:8080\"\n")?;
            jail.set_env("PERMITQ_SERVER__BIND", "127.0.0.1:9090");

            let config = PermitQueueConfig::load(Some(Path::new("kiosk.toml"))).expect("config loads");
            assert_eq!(config.server.bind, "127.0.0.1:9090");
            Ok(())
        });
    }

    #[test]
    fn log_filter_variable_does_not_clash_with_log_section() {
        Jail::expect_with(|jail| {
            jail.set_env("PERMITQ_LOG", "debug");
            jail.set_env("PERMITQ_LOG__LEVEL", "warn");

            let config = PermitQueueConfig::load(None).expect("config loads");
            assert_eq!(config.log.level, "warn");
            Ok(())
        });
    }

    #[test]
    fn zero_timeout_is_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("PERMITQ_STORE__TIMEOUT_SECS", "0");
            let err = PermitQueueConfig::load(None).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { .. }));
            Ok(())
        });
    }
}
