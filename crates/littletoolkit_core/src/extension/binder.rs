//! Action binder: entry point to host-invocable action.

use crate::extension::loader::{EntryPoint, InvocationError, InvocationOutput};
use crate::extension::registry::ExtensionId;
use crate::extension::surface::{ActionSurface, Control};
use std::sync::Arc;

/// Zero-argument invocable bound to one extension's `main`.
///
/// Cloning is cheap; every clone shares the same entry point.
#[derive(Debug, Clone)]
pub struct HostAction {
    id: ExtensionId,
    label: String,
    entry: Arc<EntryPoint>,
}

impl HostAction {
    pub fn id(&self) -> ExtensionId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn entry_point(&self) -> &EntryPoint {
        &self.entry
    }

    /// Runs the entry point on the calling thread.
    ///
    /// Failures are returned to the caller, never swallowed here.
    pub fn invoke(&self) -> Result<InvocationOutput, InvocationError> {
        self.entry.call()
    }
}

/// Wraps `entry` as an action labelled `label`.
pub fn bind(id: ExtensionId, label: impl Into<String>, entry: EntryPoint) -> HostAction {
    HostAction {
        id,
        label: label.into(),
        entry: Arc::new(entry),
    }
}

/// Places a control for `action` right before the surface placeholder.
pub fn attach(surface: &mut ActionSurface, action: &HostAction) {
    surface.insert_before_trailing(Control::extension(action.label(), action.id()));
}
