//! Runtime capability declarations for extension security gates.
//!
//! Extensions run with no host access unless their descriptor declares a
//! capability in the `capabilities` metadata key and the host grants it.

use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Metadata key listing requested runtime capabilities (comma-separated).
pub const CAPABILITIES_FIELD: &str = "capabilities";

/// Runtime capability unlocking a group of host builtins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RuntimeCapability {
    File,
    Env,
}

/// Effective capability set for one extension.
pub type CapabilitySet = BTreeSet<RuntimeCapability>;

impl RuntimeCapability {
    /// Stable string id used in descriptor declarations.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => RUNTIME_CAPABILITY_FILE,
            Self::Env => RUNTIME_CAPABILITY_ENV,
        }
    }

    /// User-facing short description.
    pub fn description(self) -> &'static str {
        match self {
            Self::File => "Allow reading local files (read_text, path_exists).",
            Self::Env => "Allow reading host environment variables (env_var).",
        }
    }
}

impl Display for RuntimeCapability {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptor string value for file capability.
pub const RUNTIME_CAPABILITY_FILE: &str = "file";
/// Descriptor string value for environment capability.
pub const RUNTIME_CAPABILITY_ENV: &str = "env";

const SUPPORTED_RUNTIME_CAPABILITY_STRINGS: &[&str] =
    &[RUNTIME_CAPABILITY_FILE, RUNTIME_CAPABILITY_ENV];

/// Returns supported runtime capability declaration strings.
pub fn supported_runtime_capability_strings() -> &'static [&'static str] {
    SUPPORTED_RUNTIME_CAPABILITY_STRINGS
}

/// Parses one runtime capability from a declaration string.
pub fn parse_runtime_capability(value: &str) -> Result<RuntimeCapability, RuntimeCapabilityError> {
    let normalized = value.trim();
    if normalized.is_empty() {
        return Err(RuntimeCapabilityError::EmptyCapability);
    }

    match normalized {
        RUNTIME_CAPABILITY_FILE => Ok(RuntimeCapability::File),
        RUNTIME_CAPABILITY_ENV => Ok(RuntimeCapability::Env),
        other => Err(RuntimeCapabilityError::UnsupportedCapability(
            other.to_string(),
        )),
    }
}

/// Parses a comma-separated capability declaration.
///
/// A blank declaration means "no capabilities". Duplicates collapse.
pub fn parse_capability_list(value: &str) -> Result<CapabilitySet, RuntimeCapabilityError> {
    if value.trim().is_empty() {
        return Ok(CapabilitySet::new());
    }
    value.split(',').map(parse_runtime_capability).collect()
}

/// Returns the first requested capability the host did not grant.
pub fn first_denied(
    requested: &CapabilitySet,
    granted: &CapabilitySet,
) -> Option<RuntimeCapability> {
    requested.difference(granted).next().copied()
}

/// Runtime capability parse errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCapabilityError {
    EmptyCapability,
    UnsupportedCapability(String),
}

impl Display for RuntimeCapabilityError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyCapability => write!(f, "runtime capability value must not be empty"),
            Self::UnsupportedCapability(value) => {
                write!(f, "runtime capability is unsupported: {value}")
            }
        }
    }
}

impl Error for RuntimeCapabilityError {}
