//! Runner configuration.
//!
//! Values come from, lowest precedence first: built-in defaults, the JSON
//! config file, `RELAY_*` environment variables, then command-line flags
//! (applied by the binary).

use relay_api::TagNames;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value for {name}: {value}")]
    Env { name: &'static str, value: String },

    #[error("Invalid {which} tag name {name:?}: must be non-empty without whitespace, '<', '>' or '/'")]
    TagName { which: &'static str, name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Directory actions run in and write files under.
    pub workdir: PathBuf,
    /// Characters delivered per replay step; 0 replays in one step.
    pub chunk_size: usize,
    /// Pause between replay steps.
    pub delay_ms: u64,
    pub tags: TagNames,
    pub shell: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from("relay-workdir"),
            chunk_size: 16,
            delay_ms: 0,
            tags: TagNames::default(),
            shell: "sh".to_string(),
        }
    }
}

impl RunnerConfig {
    /// `<config dir>/relay/config.json`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("relay").join("config.json"))
    }

    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one, the default path is used
    /// when present and built-in defaults otherwise. Environment overrides
    /// are applied on top either way.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(default) if default.is_file() => Self::from_file(&default)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Reject tag names that would make the parser match stray markup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (which, name) in [("element", &self.tags.element), ("operation", &self.tags.operation)] {
            let valid = !name.is_empty()
                && !name
                    .chars()
                    .any(|c| c.is_whitespace() || matches!(c, '<' | '>' | '/'));
            if !valid {
                return Err(ConfigError::TagName {
                    which,
                    name: name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(workdir) = var("RELAY_WORKDIR") {
            self.workdir = PathBuf::from(workdir);
        }
        if let Some(shell) = var("RELAY_SHELL") {
            self.shell = shell;
        }
        if let Some(value) = var("RELAY_CHUNK_SIZE") {
            self.chunk_size = value.parse().map_err(|_| ConfigError::Env {
                name: "RELAY_CHUNK_SIZE",
                value,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"chunk_size": 4, "tags": {"element": "boltArtifact"}}"#).unwrap();

        let config = RunnerConfig::from_file(&path).unwrap();
        assert_eq!(config.chunk_size, 4);
        assert_eq!(config.tags.element, "boltArtifact");
        assert_eq!(config.tags.operation, relay_api::DEFAULT_OPERATION_TAG);
        assert_eq!(config.shell, "sh");
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = RunnerConfig::load(Some(&dir.path().join("nope.json"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(RunnerConfig::from_file(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_load_rejects_empty_tag_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"tags": {"element": ""}}"#).unwrap();

        let err = RunnerConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::TagName { which: "element", .. }));
    }

    #[test]
    fn test_validate_rejects_markup_in_tag_names() {
        for bad in ["relay Action", "<relayAction", "relayAction>", "a/b", "\t"] {
            let mut config = RunnerConfig::default();
            config.tags.operation = bad.to_string();
            assert!(
                matches!(config.validate(), Err(ConfigError::TagName { which: "operation", .. })),
                "{bad:?} should be rejected"
            );
        }
        assert!(RunnerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [("RELAY_WORKDIR", "/tmp/w"), ("RELAY_CHUNK_SIZE", "7")].into();
        let mut config = RunnerConfig::default();
        config.apply_env(|name| env.get(name).map(|v| v.to_string())).unwrap();

        assert_eq!(config.workdir, PathBuf::from("/tmp/w"));
        assert_eq!(config.chunk_size, 7);
        assert_eq!(config.shell, "sh");
    }

    #[test]
    fn test_env_rejects_bad_number() {
        let mut config = RunnerConfig::default();
        let err = config
            .apply_env(|name| (name == "RELAY_CHUNK_SIZE").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { name: "RELAY_CHUNK_SIZE", .. }));
    }
}
