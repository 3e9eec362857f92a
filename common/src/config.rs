// common/src/config.rs
use config::{Config as ConfigFile, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Central configuration for the client core
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the REST API
    pub api_base_url: String,

    pub session: SessionConfig,
    pub messaging: MessagingConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds between periodic credential validity checks
    pub check_interval_secs: u64,
    /// Seconds a deferred comment stays eligible for replay
    pub deferred_freshness_secs: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Websocket endpoint of the message broker
    pub broker_url: String,
    /// Base delay for exponential reconnect backoff, in milliseconds
    pub reconnect_base_delay_ms: u64,
    /// Reconnect attempts before the client gives up
    pub max_reconnect_attempts: u32,
    /// Keepalive ping interval, in seconds
    pub heartbeat_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8080/api".to_string(),
            session: SessionConfig {
                check_interval_secs: 300,
                deferred_freshness_secs: 300,
            },
            messaging: MessagingConfig {
                broker_url: "ws://127.0.0.1:8080/ws".to_string(),
                reconnect_base_delay_ms: 1000,
                max_reconnect_attempts: 5,
                heartbeat_interval_secs: 10,
            },
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        // Get the run mode, defaulting to "development"
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        // Locate the config directory
        let config_dir = env::var("CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                // Check if we're in the project root or a subcrate
                let mut path = PathBuf::from("./config");
                if !path.exists() {
                    path = PathBuf::from("../config");
                }
                path
            });

        tracing::info!("Loading configuration from {}", config_dir.display());
        tracing::info!("Using run mode: {}", run_mode);

        let config = ConfigFile::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", run_mode))).required(false))
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Load from environment variables directly, falling back to defaults
    pub fn from_env() -> Self {
        match Self::load() {
            Ok(config) => {
                tracing::info!("Configuration loaded from files and environment");
                config
            }
            Err(e) => {
                tracing::warn!("Failed to load configuration from files: {}", e);
                tracing::info!("Falling back to environment variables only");

                let defaults = Config::default();

                let api_base_url = env::var("API_BASE_URL")
                    .unwrap_or(defaults.api_base_url);

                let broker_url = env::var("BROKER_URL")
                    .unwrap_or(defaults.messaging.broker_url);

                let check_interval_secs = env::var("SESSION_CHECK_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(defaults.session.check_interval_secs);

                let deferred_freshness_secs = env::var("DEFERRED_FRESHNESS_SECS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(defaults.session.deferred_freshness_secs);

                let reconnect_base_delay_ms = env::var("RECONNECT_BASE_DELAY_MS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(defaults.messaging.reconnect_base_delay_ms);

                let max_reconnect_attempts = env::var("MAX_RECONNECT_ATTEMPTS")
                    .ok()
                    .and_then(|v| v.parse::<u32>().ok())
                    .unwrap_or(defaults.messaging.max_reconnect_attempts);

                let heartbeat_interval_secs = env::var("HEARTBEAT_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(defaults.messaging.heartbeat_interval_secs);

                Self {
                    api_base_url,
                    session: SessionConfig {
                        check_interval_secs,
                        deferred_freshness_secs,
                    },
                    messaging: MessagingConfig {
                        broker_url,
                        reconnect_base_delay_ms,
                        max_reconnect_attempts,
                        heartbeat_interval_secs,
                    },
                }
            }
        }
    }
}
