//! Main application configuration
//!
//! Settings merge lowest-to-highest: built-in defaults, an optional
//! `config.ini` file (`key = value` lines), environment variables
//! (`MATCH_ARENA_*`), then CLI flags applied by `main`.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub matchmaking: MatchmakingSettings,
    pub logging: LogSettings,
}

/// TCP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Bind address
    pub address: String,
    /// Bind port
    pub port: u16,
}

/// Matchmaking engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchmakingSettings {
    /// Group size the matching loop selects
    pub players_per_room: usize,
    /// Threshold of the default rating-based strategy
    pub max_rating_diff: i32,
    /// Enable the greedy time-fairness fallback
    pub force_match_on_timeout: bool,
    /// Head-waiter deadline for the fallback, in milliseconds
    pub match_timeout_ms: u64,
}

/// Diagnostics settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    /// Log file path; empty means stdout
    pub log_file: String,
    /// Log level: trace/debug/info/warn/error, or the numeric 0-4 scale
    pub log_level: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for MatchmakingSettings {
    fn default() -> Self {
        Self {
            players_per_room: 2,
            max_rating_diff: 300,
            force_match_on_timeout: true,
            match_timeout_ms: 5000,
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            log_file: String::new(),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a `key = value` file on top of defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            anyhow!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            )
        })?;

        let mut config = Self::default();
        for (line_no, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(anyhow!(
                    "Malformed config line {}: '{}'",
                    line_no + 1,
                    line
                ));
            };
            config.apply(key.trim(), value.trim())?;
        }

        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from environment variables on top of defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.merge_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Apply `MATCH_ARENA_*` overrides onto this configuration
    pub fn merge_env(&mut self) -> Result<()> {
        for key in [
            "address",
            "port",
            "players_per_room",
            "max_rating_diff",
            "force_match_on_timeout",
            "match_timeout_ms",
            "log_file",
            "log_level",
        ] {
            let var = format!("MATCH_ARENA_{}", key.to_uppercase());
            if let Ok(value) = env::var(&var) {
                self.apply(key, &value)
                    .map_err(|e| anyhow!("Invalid {} value: {}", var, e))?;
            }
        }
        Ok(())
    }

    /// Set one configuration key from its textual form
    pub fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "address" => self.server.address = value.to_string(),
            "port" => {
                self.server.port = value
                    .parse()
                    .map_err(|_| anyhow!("Invalid port value: {}", value))?;
            }
            "players_per_room" => {
                self.matchmaking.players_per_room = value
                    .parse()
                    .map_err(|_| anyhow!("Invalid players_per_room value: {}", value))?;
            }
            "max_rating_diff" => {
                self.matchmaking.max_rating_diff = value
                    .parse()
                    .map_err(|_| anyhow!("Invalid max_rating_diff value: {}", value))?;
            }
            "force_match_on_timeout" => {
                self.matchmaking.force_match_on_timeout = value
                    .parse()
                    .map_err(|_| anyhow!("Invalid force_match_on_timeout value: {}", value))?;
            }
            "match_timeout_ms" => {
                self.matchmaking.match_timeout_ms = value
                    .parse()
                    .map_err(|_| anyhow!("Invalid match_timeout_ms value: {}", value))?;
            }
            "log_file" => self.logging.log_file = value.to_string(),
            "log_level" => self.logging.log_level = value.to_string(),
            _ => return Err(anyhow!("Unknown configuration key: {}", key)),
        }
        Ok(())
    }

    /// Normalized tracing level name, accepting the numeric 0-4 scale
    pub fn log_level_name(&self) -> Result<&'static str> {
        normalize_log_level(&self.logging.log_level)
    }
}

/// Map a configured level onto a tracing level name
pub fn normalize_log_level(level: &str) -> Result<&'static str> {
    match level.to_lowercase().as_str() {
        "trace" => Ok("trace"),
        "0" | "debug" => Ok("debug"),
        "1" | "info" => Ok("info"),
        "2" | "warn" | "warning" => Ok("warn"),
        "3" | "4" | "error" | "fatal" => Ok("error"),
        other => Err(anyhow!("Invalid log level: {}", other)),
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.server.address.is_empty() {
        return Err(anyhow!("Bind address cannot be empty"));
    }
    if config.matchmaking.players_per_room == 0 {
        return Err(anyhow!("players_per_room must be greater than 0"));
    }
    if config.matchmaking.max_rating_diff <= 0 {
        return Err(anyhow!("max_rating_diff must be positive"));
    }
    normalize_log_level(&config.logging.log_level)?;
    Ok(())
}
