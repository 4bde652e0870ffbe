//! Manager configuration
//!
//! Layered: defaults, then an optional TOML file, then `SWARM_*` environment
//! variables.

use crate::error::{SwarmError, SwarmResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Swarm manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Allow `cleanup_branches` on a swarm that has not landed.
    /// Off by default: cleanup before landing deletes unintegrated work.
    pub allow_unlanded_cleanup: bool,

    /// Prefix for merge commit messages
    pub merge_message_prefix: String,

    /// Retry attempts for transient git failures (lock contention)
    pub git_max_retries: u32,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            allow_unlanded_cleanup: false,
            merge_message_prefix: "swarm:".to_string(),
            git_max_retries: 3,
        }
    }
}

impl ManagerConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Load a TOML file; missing keys keep their defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> SwarmResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SwarmError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
            .map_err(|e| SwarmError::config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml_str(text: &str) -> SwarmResult<Self> {
        toml::from_str(text).map_err(|e| SwarmError::config(e.to_string()))
    }

    /// Override fields from `SWARM_*` environment variables.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_env(&mut self) {
        if let Ok(value) = std::env::var("SWARM_ALLOW_UNLANDED_CLEANUP") {
            match parse_bool(&value) {
                Some(allow) => self.allow_unlanded_cleanup = allow,
                None => tracing::warn!(value = %value, "Ignoring SWARM_ALLOW_UNLANDED_CLEANUP"),
            }
        }
        if let Ok(prefix) = std::env::var("SWARM_MERGE_PREFIX") {
            self.merge_message_prefix = prefix;
        }
        if let Ok(value) = std::env::var("SWARM_GIT_MAX_RETRIES") {
            match value.parse() {
                Ok(n) => self.git_max_retries = n,
                Err(_) => tracing::warn!(value = %value, "Ignoring SWARM_GIT_MAX_RETRIES"),
            }
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ENV_VARS: [&str; 3] = [
        "SWARM_ALLOW_UNLANDED_CLEANUP",
        "SWARM_MERGE_PREFIX",
        "SWARM_GIT_MAX_RETRIES",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_defaults() {
        let config = ManagerConfig::default();
        assert!(!config.allow_unlanded_cleanup);
        assert_eq!(config.merge_message_prefix, "swarm:");
        assert_eq!(config.git_max_retries, 3);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ManagerConfig::from_toml_str("allow_unlanded_cleanup = true\n").unwrap();
        assert!(config.allow_unlanded_cleanup);
        assert_eq!(config.merge_message_prefix, "swarm:");
    }

    #[test]
    fn test_invalid_toml() {
        let err = ManagerConfig::from_toml_str("git_max_retries = \"many\"").unwrap_err();
        assert!(matches!(err, SwarmError::Config { .. }));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swarm.toml");
        std::fs::write(&path, "merge_message_prefix = \"[gt]\"\ngit_max_retries = 0\n").unwrap();

        let config = ManagerConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.merge_message_prefix, "[gt]");
        assert_eq!(config.git_max_retries, 0);

        assert!(ManagerConfig::from_toml_file(dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        std::env::set_var("SWARM_MERGE_PREFIX", "[gt]");
        std::env::set_var("SWARM_GIT_MAX_RETRIES", "7");
        std::env::set_var("SWARM_ALLOW_UNLANDED_CLEANUP", "yes");

        let config = ManagerConfig::from_env();
        clear_env();

        assert_eq!(config.merge_message_prefix, "[gt]");
        assert_eq!(config.git_max_retries, 7);
        assert!(config.allow_unlanded_cleanup);
    }

    #[test]
    #[serial]
    fn test_env_applies_over_file_and_skips_bad_values() {
        clear_env();
        std::env::set_var("SWARM_GIT_MAX_RETRIES", "lots");
        std::env::set_var("SWARM_ALLOW_UNLANDED_CLEANUP", "maybe");
        std::env::set_var("SWARM_MERGE_PREFIX", "env:");

        let mut config = ManagerConfig::from_toml_str(
            "git_max_retries = 5\nmerge_message_prefix = \"file:\"\n",
        )
        .unwrap();
        config.apply_env();
        clear_env();

        assert_eq!(config.git_max_retries, 5);
        assert!(!config.allow_unlanded_cleanup);
        assert_eq!(config.merge_message_prefix, "env:");
    }

    #[test]
    #[serial]
    fn test_no_env_keeps_defaults() {
        clear_env();
        assert_eq!(ManagerConfig::from_env(), ManagerConfig::default());
    }
}
