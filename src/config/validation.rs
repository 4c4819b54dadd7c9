//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("irc.server is required")]
    MissingServer,
    #[error("irc.nick is required")]
    MissingNick,
    #[error("irc.nick contains invalid characters: '{0}'")]
    InvalidNick(String),
    #[error("remote.base_url must start with http:// or https://, got '{0}'")]
    InvalidBaseUrl(String),
    #[error("poll.interval_secs must be at least 1")]
    ZeroInterval,
    #[error("remote.timeout_secs must be at least 1")]
    ZeroTimeout,
    #[error("relay.max_items_per_display_line must be at least 1")]
    ZeroItemsPerLine,
    #[error("faction {0} is listed more than once")]
    DuplicateFaction(u64),
    #[error("channel '{0}' must start with '#' or '&'")]
    InvalidChannel(String),
    #[error("channel '{0}' is assigned to more than one faction")]
    SharedChannel(String),
    #[error("database.path parent directory does not exist: {0}")]
    DatabasePathInvalid(String),
}

fn is_nick_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-_[]\\^{}|`".contains(c)
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.irc.server.is_empty() {
        errors.push(ValidationError::MissingServer);
    }
    if config.irc.nick.is_empty() {
        errors.push(ValidationError::MissingNick);
    } else if !config.irc.nick.chars().all(is_nick_char) {
        errors.push(ValidationError::InvalidNick(config.irc.nick.clone()));
    }

    let base = &config.remote.base_url;
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        errors.push(ValidationError::InvalidBaseUrl(base.clone()));
    }

    if config.poll.interval_secs == 0 {
        errors.push(ValidationError::ZeroInterval);
    }
    if config.remote.timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }
    if config.relay.max_items_per_display_line == Some(0) {
        errors.push(ValidationError::ZeroItemsPerLine);
    }

    // Each faction once, each channel to a single faction
    let mut factions = HashSet::new();
    let mut channels = HashSet::new();
    for faction in &config.factions {
        if !factions.insert(faction.id) {
            errors.push(ValidationError::DuplicateFaction(faction.id));
        }
        for channel in &faction.channels {
            if !(channel.starts_with('#') || channel.starts_with('&')) {
                errors.push(ValidationError::InvalidChannel(channel.clone()));
            }
            if !channels.insert(channel.to_ascii_lowercase()) {
                errors.push(ValidationError::SharedChannel(channel.clone()));
            }
        }
    }

    let db_path = Path::new(&config.database.path);
    if config.database.path != ":memory:"
        && let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        errors.push(ValidationError::DatabasePathInvalid(
            config.database.path.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(extra: &str) -> Config {
        let base = r##"
            [irc]
            server = "irc.example.net:6667"
            nick = "RelayBot"

            [remote]
            base_url = "https://kg.example.com"
        "##;
        toml::from_str(&format!("{}\n{}", base, extra)).unwrap()
    }

    #[test]
    fn valid_config_passes() {
        let c = config(
            r##"
            [[factions]]
            id = 1
            name = "One"
            user_id = 1
            auth_token = "t"
            channels = ["#one"]
            "##,
        );
        assert!(validate(&c).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut c = config(
            r##"
            [poll]
            interval_secs = 0

            [relay]
            max_items_per_display_line = 0

            [[factions]]
            id = 1
            name = "One"
            user_id = 1
            auth_token = "t"
            channels = ["#one", "two"]

            [[factions]]
            id = 1
            name = "Again"
            user_id = 2
            auth_token = "t"
            channels = ["#ONE"]
            "##,
        );
        c.irc.nick = "bad nick".to_string();
        c.remote.base_url = "kg.example.com".to_string();

        let errors = validate(&c).unwrap_err();
        assert!(errors.contains(&ValidationError::InvalidNick("bad nick".into())));
        assert!(errors.contains(&ValidationError::InvalidBaseUrl("kg.example.com".into())));
        assert!(errors.contains(&ValidationError::ZeroInterval));
        assert!(errors.contains(&ValidationError::ZeroItemsPerLine));
        assert!(errors.contains(&ValidationError::DuplicateFaction(1)));
        assert!(errors.contains(&ValidationError::InvalidChannel("two".into())));
        assert!(errors.contains(&ValidationError::SharedChannel("#ONE".into())));
    }

    #[test]
    fn missing_database_parent_is_reported() {
        let c = config(
            r##"
            [database]
            path = "/nonexistent/dir/relay.db"
            "##,
        );
        assert_eq!(
            validate(&c).unwrap_err(),
            vec![ValidationError::DatabasePathInvalid(
                "/nonexistent/dir/relay.db".into()
            )]
        );
    }
}
