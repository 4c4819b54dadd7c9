//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

/// Returns `true` (for serde defaults).
pub fn default_true() -> bool {
    true
}

// =============================================================================
// IRC Defaults
// =============================================================================

pub fn default_irc_user() -> String {
    "relay".to_string()
}

pub fn default_irc_realname() -> String {
    "Faction chat relay".to_string()
}

pub fn default_command_prefix() -> String {
    "!".to_string()
}

pub fn default_reconnect_delay() -> u64 {
    30
}

// =============================================================================
// Remote API Defaults
// =============================================================================

pub fn default_request_timeout() -> u64 {
    10
}

pub fn default_member_cache() -> u64 {
    300
}

pub fn default_user_agent() -> String {
    concat!("factionrelay/", env!("CARGO_PKG_VERSION")).to_string()
}

// =============================================================================
// Poll / Relay Defaults
// =============================================================================

pub fn default_poll_interval() -> u64 {
    60
}

pub fn default_relay_tag() -> String {
    "FEED".to_string()
}

// =============================================================================
// Storage / Metrics Defaults
// =============================================================================

pub fn default_database_path() -> String {
    "factionrelay.db".to_string()
}

pub fn default_metrics_port() -> u16 {
    9090
}
