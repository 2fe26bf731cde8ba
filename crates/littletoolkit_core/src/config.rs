//! Host configuration for the extension engine.
//!
//! # Responsibility
//! - Describe which descriptor files are accepted and which runtime
//!   capabilities the host is willing to grant.
//! - Size the action dispatcher.
//!
//! # Invariants
//! - Every field has a default; an empty JSON object is a valid config.
//! - Defaults grant no runtime capabilities.

use crate::extension::capability::{parse_runtime_capability, CapabilitySet, RuntimeCapabilityError};
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Descriptor file suffix dispatched into the install pipeline.
pub const DEFAULT_DESCRIPTOR_SUFFIX: &str = ".ltc";
/// Worker threads used for extension actions.
pub const DEFAULT_WORKER_THREADS: usize = 2;
/// Host navigation entries present before any extension is installed.
pub const DEFAULT_BUILTIN_CONTROLS: &[&str] = &["Home", "Tools", "Code Editor", "Plugin Store"];

/// Extension host configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// Only paths ending with this suffix are installed.
    pub descriptor_suffix: String,
    /// Capability strings (`file|env`) extensions may request.
    pub granted_capabilities: Vec<String>,
    /// Per-invocation deadline for dispatched actions.
    pub invocation_timeout_ms: Option<u64>,
    /// Worker threads for the action dispatcher.
    pub worker_threads: usize,
    /// Host controls placed on the surface before extension controls.
    pub builtin_controls: Vec<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            descriptor_suffix: DEFAULT_DESCRIPTOR_SUFFIX.to_string(),
            granted_capabilities: Vec::new(),
            invocation_timeout_ms: None,
            worker_threads: DEFAULT_WORKER_THREADS,
            builtin_controls: DEFAULT_BUILTIN_CONTROLS
                .iter()
                .map(|label| label.to_string())
                .collect(),
        }
    }
}

impl HostConfig {
    /// Parses and validates a JSON config document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Checks value-level constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.descriptor_suffix.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "descriptor_suffix must not be empty".to_string(),
            ));
        }
        if self.worker_threads == 0 {
            return Err(ConfigError::Invalid(
                "worker_threads must be at least 1".to_string(),
            ));
        }
        self.granted_capability_set()?;
        Ok(())
    }

    /// Granted capabilities as a typed set.
    pub fn granted_capability_set(&self) -> Result<CapabilitySet, ConfigError> {
        self.granted_capabilities
            .iter()
            .map(|value| parse_runtime_capability(value).map_err(ConfigError::Capability))
            .collect()
    }

    pub fn invocation_timeout(&self) -> Option<Duration> {
        self.invocation_timeout_ms.map(Duration::from_millis)
    }

    /// Whether `path` carries the recognized descriptor suffix.
    pub fn accepts_path(&self, path: &Path) -> bool {
        path.to_string_lossy().ends_with(self.descriptor_suffix.as_str())
    }
}

/// Config loading errors.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    Capability(RuntimeCapabilityError),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config JSON: {err}"),
            Self::Capability(err) => write!(f, "invalid granted capability: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Capability(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, HostConfig, DEFAULT_DESCRIPTOR_SUFFIX};
    use crate::extension::capability::RuntimeCapability;
    use std::path::Path;
    use std::time::Duration;

    #[test]
    fn empty_document_uses_defaults() {
        let config = HostConfig::from_json_str("{}").expect("empty config");
        assert_eq!(config, HostConfig::default());
        assert_eq!(config.descriptor_suffix, DEFAULT_DESCRIPTOR_SUFFIX);
        assert!(config.granted_capability_set().expect("set").is_empty());
        assert_eq!(config.invocation_timeout(), None);
        assert_eq!(config.builtin_controls.len(), 4);
    }

    #[test]
    fn parses_overrides() {
        let config = HostConfig::from_json_str(
            r#"{"granted_capabilities": ["file"], "invocation_timeout_ms": 250, "worker_threads": 4}"#,
        )
        .expect("config");
        assert!(config
            .granted_capability_set()
            .expect("set")
            .contains(&RuntimeCapability::File));
        assert_eq!(config.invocation_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.worker_threads, 4);
    }

    #[test]
    fn rejects_invalid_values() {
        let err = HostConfig::from_json_str(r#"{"worker_threads": 0}"#).expect_err("zero workers");
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err =
            HostConfig::from_json_str(r#"{"descriptor_suffix": " "}"#).expect_err("blank suffix");
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = HostConfig::from_json_str(r#"{"granted_capabilities": ["network"]}"#)
            .expect_err("unknown capability");
        assert!(matches!(err, ConfigError::Capability(_)));

        let err = HostConfig::from_json_str(r#"{"unknown": 1}"#).expect_err("unknown field");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn reports_missing_file() {
        let err = HostConfig::from_json_file("/definitely/not/here.json").expect_err("missing");
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn matches_descriptor_suffix() {
        let config = HostConfig::default();
        assert!(config.accepts_path(Path::new("plugins/echo.ltc")));
        assert!(!config.accepts_path(Path::new("plugins/echo.py")));
        assert!(!config.accepts_path(Path::new("plugins/echo.LTC")));
    }
}
