//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use super::defaults::*;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Relay configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// IRC connection and identity.
    pub irc: IrcConfig,
    /// Game API access.
    pub remote: RemoteConfig,
    /// Poll timing.
    #[serde(default)]
    pub poll: PollConfig,
    /// Relay line formatting.
    #[serde(default)]
    pub relay: RelayConfig,
    /// Registration store.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Metrics/status HTTP endpoint.
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Factions to relay, with their channels.
    #[serde(default)]
    pub factions: Vec<FactionConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// The faction a channel belongs to, if any.
    pub fn faction_for_channel(&self, channel: &str) -> Option<&FactionConfig> {
        self.factions.iter().find(|f| {
            f.channels
                .iter()
                .any(|c| c.eq_ignore_ascii_case(channel))
        })
    }
}

/// IRC connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IrcConfig {
    /// Server address (e.g., "irc.example.net:6667").
    pub server: String,
    /// Bot nickname. Also the name players address in `<nick> confirm ...`.
    pub nick: String,
    #[serde(default = "default_irc_user")]
    pub user: String,
    #[serde(default = "default_irc_realname")]
    pub realname: String,
    /// Optional server password (PASS).
    pub password: Option<String>,
    /// Prefix for channel commands (default: "!").
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    /// Seconds to wait before reconnecting after a drop (default: 30).
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
}

/// Game API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the API host (e.g., "https://kg.tyrantonline.com").
    pub base_url: String,
    /// Per-request timeout in seconds (default: 10).
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
    /// How long a faction member list is reused (default: 300).
    #[serde(default = "default_member_cache")]
    pub member_cache_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn member_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.member_cache_secs)
    }
}

/// Poll timing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    /// Seconds between poll cycles (default: 60).
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval(),
        }
    }
}

/// Relay line formatting.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Tag shown in front of relayed lines (default: "FEED").
    #[serde(default = "default_relay_tag")]
    pub tag: String,
    /// Join up to this many items into one line. Unset: one line per item.
    #[serde(default)]
    pub max_items_per_display_line: Option<usize>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            tag: default_relay_tag(),
            max_items_per_display_line: None,
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// Metrics HTTP endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Port for `/metrics` and `/status` (default: 9090, 0 disables).
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

/// One faction to relay.
#[derive(Debug, Clone, Deserialize)]
pub struct FactionConfig {
    /// Faction id on the game service.
    pub id: u64,
    /// Display name used in logs and command replies.
    pub name: String,
    /// Game account inside this faction that the bot polls as.
    pub user_id: u64,
    /// API token for that account.
    pub auth_token: String,
    /// Channels that may carry this faction's chat.
    #[serde(default)]
    pub channels: Vec<String>,
    /// Start relaying at startup (default: true). `!chat on` enables it later.
    #[serde(default = "default_true")]
    pub chat: bool,
}
