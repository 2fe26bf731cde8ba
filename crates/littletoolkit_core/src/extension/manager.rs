//! Extension manager: install pipeline and action triggering.
//!
//! # Responsibility
//! - Run one install attempt through parse, validate, capability check,
//!   duplicate check, load and bind.
//! - Own the registry, the host action surface and the dispatcher.
//!
//! # Invariants
//! - A failed attempt leaves registry and surface untouched.
//! - A duplicate name is reported as [`InstallOutcome::Skipped`], never as
//!   an error.
//! - Every abort is logged with the stage it stopped after.
//!
//! # See also
//! - `extension::dispatch` for the threading model of triggered actions.

use crate::config::{ConfigError, HostConfig};
use crate::extension::binder::{attach, bind};
use crate::extension::capability::{
    first_denied, parse_capability_list, CapabilitySet, RuntimeCapability,
    RuntimeCapabilityError, CAPABILITIES_FIELD,
};
use crate::extension::catalog::{CatalogError, PluginCatalog};
use crate::extension::descriptor::{ExtensionDescriptor, MissingFieldError};
use crate::extension::dispatch::{ActionDispatcher, InvocationReport, InvocationTicket};
use crate::extension::loader::{ExecutionLoader, InvocationError, InvocationOutput, LoadError};
use crate::extension::registry::{
    ExtensionId, ExtensionRegistry, RegisterOutcome, RegistryEntry, SkipReason,
};
use crate::extension::surface::{ActionSurface, ControlTarget};
use log::{debug, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Pipeline stages of one install attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InstallStage {
    Unparsed,
    Parsed,
    Validated,
    Unique,
    Loaded,
    Bound,
}

impl InstallStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unparsed => "unparsed",
            Self::Parsed => "parsed",
            Self::Validated => "validated",
            Self::Unique => "unique",
            Self::Loaded => "loaded",
            Self::Bound => "bound",
        }
    }
}

/// Non-error result of one install attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed { id: ExtensionId, name: String },
    Skipped { name: String, reason: SkipReason },
}

impl InstallOutcome {
    pub fn name(&self) -> &str {
        match self {
            Self::Installed { name, .. } | Self::Skipped { name, .. } => name,
        }
    }

    pub fn is_installed(&self) -> bool {
        matches!(self, Self::Installed { .. })
    }
}

/// Install pipeline aborts.
#[derive(Debug)]
pub enum InstallError {
    UnsupportedFileKind {
        path: PathBuf,
    },
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    MissingRequiredField(MissingFieldError),
    InvalidCapability(RuntimeCapabilityError),
    CapabilityDenied {
        name: String,
        capability: RuntimeCapability,
    },
    Load {
        name: String,
        source: LoadError,
    },
    Catalog(CatalogError),
}

impl InstallError {
    /// Last stage the attempt completed before aborting.
    pub fn stage(&self) -> InstallStage {
        match self {
            Self::UnsupportedFileKind { .. } | Self::Io { .. } | Self::Catalog(_) => {
                InstallStage::Unparsed
            }
            Self::MissingRequiredField(_) => InstallStage::Parsed,
            Self::InvalidCapability(_) | Self::CapabilityDenied { .. } => InstallStage::Validated,
            Self::Load { .. } => InstallStage::Unique,
        }
    }

    /// Whether the code defines no `main` binding.
    pub fn is_entry_point_missing(&self) -> bool {
        matches!(
            self,
            Self::Load {
                source: LoadError::EntryPointMissing,
                ..
            }
        )
    }
}

impl Display for InstallError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedFileKind { path } => {
                write!(f, "unsupported extension file: {}", path.display())
            }
            Self::Io { path, source } => {
                write!(f, "failed to read extension `{}`: {source}", path.display())
            }
            Self::MissingRequiredField(err) => write!(f, "{err}"),
            Self::InvalidCapability(err) => write!(f, "invalid capability declaration: {err}"),
            Self::CapabilityDenied { name, capability } => write!(
                f,
                "extension `{name}` requests capability `{capability}` which the host does not grant"
            ),
            Self::Load { name, source } => write!(f, "failed to load extension `{name}`: {source}"),
            Self::Catalog(err) => write!(f, "{err}"),
        }
    }
}

impl Error for InstallError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::MissingRequiredField(err) => Some(err),
            Self::InvalidCapability(err) => Some(err),
            Self::Load { source, .. } => Some(source),
            Self::Catalog(err) => Some(err),
            Self::UnsupportedFileKind { .. } | Self::CapabilityDenied { .. } => None,
        }
    }
}

impl From<MissingFieldError> for InstallError {
    fn from(value: MissingFieldError) -> Self {
        Self::MissingRequiredField(value)
    }
}

impl From<RuntimeCapabilityError> for InstallError {
    fn from(value: RuntimeCapabilityError) -> Self {
        Self::InvalidCapability(value)
    }
}

impl From<CatalogError> for InstallError {
    fn from(value: CatalogError) -> Self {
        Self::Catalog(value)
    }
}

/// Errors triggering a surface control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
    UnknownControl(String),
    /// Builtin controls belong to the host, not to an extension.
    BuiltinControl(String),
    Invocation(InvocationError),
}

impl Display for TriggerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownControl(label) => write!(f, "no control labelled `{label}`"),
            Self::BuiltinControl(label) => {
                write!(f, "control `{label}` is a host control, not an extension")
            }
            Self::Invocation(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TriggerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Invocation(err) => Some(err),
            Self::UnknownControl(_) | Self::BuiltinControl(_) => None,
        }
    }
}

/// Manager construction errors.
#[derive(Debug)]
pub enum HostError {
    Config(ConfigError),
    Runtime(std::io::Error),
}

impl Display for HostError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Runtime(err) => write!(f, "failed to start extension workers: {err}"),
        }
    }
}

impl Error for HostError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Runtime(err) => Some(err),
        }
    }
}

impl From<ConfigError> for HostError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

/// Owns every installed extension and the host action surface.
pub struct ExtensionManager {
    config: HostConfig,
    granted: CapabilitySet,
    loader: ExecutionLoader,
    registry: ExtensionRegistry,
    surface: ActionSurface,
    dispatcher: ActionDispatcher,
}

impl ExtensionManager {
    /// Validates `config` and starts the action dispatcher.
    pub fn new(config: HostConfig) -> Result<Self, HostError> {
        config.validate()?;
        let granted = config.granted_capability_set()?;
        let dispatcher =
            ActionDispatcher::new(config.worker_threads, config.invocation_timeout())
                .map_err(HostError::Runtime)?;
        let surface = ActionSurface::with_builtin_controls(config.builtin_controls.iter().cloned());

        info!(
            "event=extension_host_init module=extension status=ok suffix={} granted={:?} workers={}",
            config.descriptor_suffix, granted, config.worker_threads
        );

        Ok(Self {
            config,
            granted,
            loader: ExecutionLoader::new(),
            registry: ExtensionRegistry::new(),
            surface,
            dispatcher,
        })
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    pub fn surface(&self) -> &ActionSurface {
        &self.surface
    }

    /// Installs one descriptor file.
    ///
    /// Paths without the configured suffix are rejected before any I/O.
    pub fn install_path(&mut self, path: impl AsRef<Path>) -> Result<InstallOutcome, InstallError> {
        let path = path.as_ref();
        if !self.config.accepts_path(path) {
            let err = InstallError::UnsupportedFileKind {
                path: path.to_path_buf(),
            };
            log_abort(&path.display().to_string(), &err);
            return Err(err);
        }

        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(source) => {
                let err = InstallError::Io {
                    path: path.to_path_buf(),
                    source,
                };
                log_abort(&path.display().to_string(), &err);
                return Err(err);
            }
        };

        self.install_source(&path.display().to_string(), &raw)
    }

    /// Installs descriptor text. `source_name` labels logs and errors.
    pub fn install_source(
        &mut self,
        source_name: &str,
        raw: &str,
    ) -> Result<InstallOutcome, InstallError> {
        debug!(
            "event=extension_install module=extension status=start source={}",
            source_name
        );
        let result = self.run_pipeline(source_name, ExtensionDescriptor::parse(raw));
        match &result {
            Ok(InstallOutcome::Installed { id, name }) => info!(
                "event=extension_install module=extension status=ok source={} name={} id={}",
                source_name, name, id
            ),
            Ok(InstallOutcome::Skipped { name, reason }) => info!(
                "event=extension_install module=extension status=skipped source={} name={} reason={}",
                source_name, name, reason
            ),
            Err(err) => log_abort(source_name, err),
        }
        result
    }

    /// Installs every descriptor in `dir`, in path order.
    ///
    /// Files without the configured suffix are skipped silently.
    pub fn install_dir(
        &mut self,
        dir: impl AsRef<Path>,
    ) -> Result<Vec<(PathBuf, Result<InstallOutcome, InstallError>)>, InstallError> {
        let dir = dir.as_ref();
        let read_dir = std::fs::read_dir(dir).map_err(|source| InstallError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut paths = Vec::new();
        for item in read_dir {
            let item = item.map_err(|source| InstallError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = item.path();
            if !path.is_file() {
                continue;
            }
            if !self.config.accepts_path(&path) {
                debug!(
                    "event=extension_scan module=extension status=skipped path={}",
                    path.display()
                );
                continue;
            }
            paths.push(path);
        }
        paths.sort();

        Ok(paths
            .into_iter()
            .map(|path| {
                let result = self.install_path(&path);
                (path, result)
            })
            .collect())
    }

    /// Installs the catalog entry named `name`.
    pub fn install_from_catalog(
        &mut self,
        catalog: &PluginCatalog,
        name: &str,
    ) -> Result<InstallOutcome, InstallError> {
        let Some(entry) = catalog.get(name) else {
            let err = InstallError::Catalog(CatalogError::UnknownEntry(name.to_string()));
            log_abort(name, &err);
            return Err(err);
        };
        self.install_path(&entry.file)
    }

    /// Removes an installed extension and its control.
    pub fn uninstall(&mut self, name: &str) -> bool {
        let Some(id) = self.registry.get_by_name(name).map(|entry| entry.id) else {
            return false;
        };
        self.registry.remove(id);
        self.surface.remove_extension(id);
        self.dispatcher.close_lane(id);
        info!(
            "event=extension_uninstall module=extension status=ok name={} id={}",
            name, id
        );
        true
    }

    /// Dispatches the action behind the control labelled `label`.
    pub fn trigger(&mut self, label: &str) -> Result<InvocationTicket, TriggerError> {
        let id = self.resolve_control(label)?;
        let action = self
            .registry
            .get(id)
            .map(|entry| entry.action.clone())
            .ok_or_else(|| TriggerError::UnknownControl(label.to_string()))?;
        Ok(self.dispatcher.dispatch(action))
    }

    /// Runs the action behind `label` on the calling thread.
    pub fn invoke_now(&self, label: &str) -> Result<InvocationOutput, TriggerError> {
        let id = self.resolve_control(label)?;
        let entry = self
            .registry
            .get(id)
            .ok_or_else(|| TriggerError::UnknownControl(label.to_string()))?;
        debug!(
            "event=extension_invoke module=extension status=start mode=sync label={}",
            label
        );
        let outcome = entry.action.invoke();
        match &outcome {
            Ok(_) => debug!(
                "event=extension_invoke module=extension status=ok mode=sync label={}",
                label
            ),
            Err(err) => warn!(
                "event=extension_invoke module=extension status=error mode=sync label={} error={}",
                label, err
            ),
        }
        outcome.map_err(TriggerError::Invocation)
    }

    /// Waits up to `timeout` for the next dispatched result.
    pub fn next_report(&mut self, timeout: Duration) -> Option<InvocationReport> {
        self.dispatcher.next_report(timeout)
    }

    /// Returns a dispatched result if one is ready.
    pub fn try_next_report(&mut self) -> Option<InvocationReport> {
        self.dispatcher.try_next_report()
    }

    fn resolve_control(&self, label: &str) -> Result<ExtensionId, TriggerError> {
        let control = self
            .surface
            .find_by_label(label)
            .ok_or_else(|| TriggerError::UnknownControl(label.to_string()))?;
        match control.target {
            ControlTarget::Extension(id) => Ok(id),
            ControlTarget::Builtin => Err(TriggerError::BuiltinControl(label.to_string())),
        }
    }

    fn is_name_taken(&self, name: &str) -> bool {
        self.surface.contains_label(name) || self.registry.contains_name(name)
    }

    fn run_pipeline(
        &mut self,
        source_name: &str,
        descriptor: ExtensionDescriptor,
    ) -> Result<InstallOutcome, InstallError> {
        descriptor.validate()?;
        let name = descriptor.name().unwrap_or_default().to_string();

        let requested =
            parse_capability_list(descriptor.field(CAPABILITIES_FIELD).unwrap_or_default())?;
        if let Some(capability) = first_denied(&requested, &self.granted) {
            return Err(InstallError::CapabilityDenied { name, capability });
        }

        if self.is_name_taken(&name) {
            return Ok(InstallOutcome::Skipped {
                name,
                reason: SkipReason::DuplicateName,
            });
        }

        let entry_point = self
            .loader
            .load(source_name, &descriptor.code, &requested)
            .map_err(|source| InstallError::Load {
                name: name.clone(),
                source,
            })?;

        let id = Uuid::new_v4();
        let action = bind(id, name.clone(), entry_point);
        let outcome = self.registry.register(RegistryEntry {
            id,
            name: name.clone(),
            descriptor,
            capabilities: requested,
            action: action.clone(),
        });

        match outcome {
            RegisterOutcome::Installed(id) => {
                attach(&mut self.surface, &action);
                Ok(InstallOutcome::Installed { id, name })
            }
            RegisterOutcome::Skipped { name, reason } => Ok(InstallOutcome::Skipped { name, reason }),
        }
    }
}

fn log_abort(source_name: &str, err: &InstallError) {
    warn!(
        "event=extension_install module=extension status=error stage={} source={} error={}",
        err.stage().as_str(),
        source_name,
        err
    );
}

#[cfg(test)]
mod tests {
    use super::{ExtensionManager, InstallError, InstallOutcome, InstallStage, TriggerError};
    use crate::config::HostConfig;
    use crate::extension::registry::SkipReason;
    use crate::extension::surface::SurfaceItem;

    fn descriptor(name: &str, code: &str) -> String {
        format!(
            "[metadata]\nname = {name}\nversion = 1.0\ndescription = test\ncategory = util\n[code]\n{code}"
        )
    }

    fn manager() -> ExtensionManager {
        ExtensionManager::new(HostConfig::default()).expect("manager")
    }

    #[test]
    fn installs_and_binds_before_placeholder() {
        let mut manager = manager();
        let before = manager.surface().len();

        let outcome = manager
            .install_source("echo.ltc", &descriptor("Echo", "def main():\n    return 1\n"))
            .expect("install");
        assert!(outcome.is_installed());
        assert_eq!(manager.surface().len(), before + 1);

        let items = manager.surface().items();
        assert_eq!(items.last(), Some(&SurfaceItem::Stretch));
        match &items[items.len() - 2] {
            SurfaceItem::Control(control) => assert_eq!(control.label, "Echo"),
            SurfaceItem::Stretch => panic!("placeholder must stay last"),
        }
    }

    #[test]
    fn duplicate_builtin_label_is_skipped() {
        let mut manager = manager();
        let outcome = manager
            .install_source("home.ltc", &descriptor("Home", "def main():\n    pass\n"))
            .expect("skip is not an error");
        assert_eq!(
            outcome,
            InstallOutcome::Skipped {
                name: "Home".to_string(),
                reason: SkipReason::DuplicateName,
            }
        );
        assert!(manager.registry().is_empty());
    }

    #[test]
    fn duplicate_check_runs_before_loading() {
        let mut manager = manager();
        manager
            .install_source("a.ltc", &descriptor("Same", "def main():\n    pass\n"))
            .expect("first install");
        let outcome = manager
            .install_source("b.ltc", &descriptor("Same", "this is not starlark"))
            .expect("duplicate short-circuits before evaluation");
        assert!(!outcome.is_installed());
    }

    #[test]
    fn errors_report_their_stage() {
        let mut manager = manager();
        let err = manager
            .install_source("x.ltc", "[metadata]\nname = X\n")
            .expect_err("missing fields");
        assert_eq!(err.stage(), InstallStage::Parsed);

        let err = manager
            .install_source("y.ltc", &descriptor("Y", "x = 1\n"))
            .expect_err("missing main");
        assert!(err.is_entry_point_missing());
        assert_eq!(err.stage(), InstallStage::Unique);
    }

    #[test]
    fn capability_requests_must_be_granted() {
        let mut manager = manager();
        let raw = "[metadata]\nname = Reader\nversion = 1\ndescription = d\ncategory = c\ncapabilities = file\n[code]\ndef main():\n    return path_exists(\"/\")\n";
        let err = manager
            .install_source("reader.ltc", raw)
            .expect_err("file capability not granted");
        assert!(matches!(err, InstallError::CapabilityDenied { .. }));
        assert!(manager.registry().is_empty());

        let mut config = HostConfig::default();
        config.granted_capabilities = vec!["file".to_string()];
        let mut manager = ExtensionManager::new(config).expect("manager");
        manager.install_source("reader.ltc", raw).expect("granted");
        assert_eq!(manager.invoke_now("Reader").expect("invoke").value, "True");
    }

    #[test]
    fn trigger_rejects_unknown_and_builtin_controls() {
        let mut manager = manager();
        assert_eq!(
            manager.trigger("Nope"),
            Err(TriggerError::UnknownControl("Nope".to_string()))
        );
        assert_eq!(
            manager.trigger("Home"),
            Err(TriggerError::BuiltinControl("Home".to_string()))
        );
    }

    #[test]
    fn invoke_now_returns_action_failures() {
        let mut manager = manager();
        manager
            .install_source("fail.ltc", &descriptor("Failing", "def main():\n    fail(\"nope\")\n"))
            .expect("install");
        let err = manager.invoke_now("Failing").expect_err("main fails");
        assert!(matches!(err, TriggerError::Invocation(_)));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn uninstall_frees_name_and_control() {
        let mut manager = manager();
        let raw = descriptor("Temp", "def main():\n    pass\n");
        manager.install_source("t.ltc", &raw).expect("install");

        assert!(manager.uninstall("Temp"));
        assert!(!manager.uninstall("Temp"));
        assert!(!manager.surface().contains_label("Temp"));

        let outcome = manager.install_source("t.ltc", &raw).expect("reinstall");
        assert!(outcome.is_installed());
    }
}
