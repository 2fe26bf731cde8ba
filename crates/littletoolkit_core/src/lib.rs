//! Core extension engine for LittleToolkit.
//! This crate is the single source of truth for extension install invariants.

pub mod config;
pub mod extension;
pub mod logging;

pub use config::{ConfigError, HostConfig};
pub use extension::binder::HostAction;
pub use extension::capability::{
    parse_capability_list, parse_runtime_capability, CapabilitySet, RuntimeCapability,
    RuntimeCapabilityError,
};
pub use extension::catalog::{CatalogEntry, CatalogError, PluginCatalog};
pub use extension::descriptor::{parse, validate, ExtensionDescriptor, MissingFieldError};
pub use extension::dispatch::{InvocationReport, InvocationTicket};
pub use extension::loader::{
    EntryPoint, ExecutionLoader, InvocationError, InvocationOutput, LoadError,
};
pub use extension::manager::{
    ExtensionManager, HostError, InstallError, InstallOutcome, InstallStage, TriggerError,
};
pub use extension::registry::{
    ExtensionId, ExtensionRegistry, RegisterOutcome, RegistryEntry, SkipReason,
};
pub use extension::surface::{ActionSurface, Control, ControlTarget, SurfaceItem};
pub use logging::{default_log_level, init_logging, init_stderr_logging, logging_status, LogTarget};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
