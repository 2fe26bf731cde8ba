//! Host action surface model.
//!
//! # Invariants
//! - Exactly one [`SurfaceItem::Stretch`] placeholder exists and it is always
//!   the last item.
//! - New controls are inserted immediately before the placeholder; relative
//!   order of existing controls never changes.

use crate::extension::registry::ExtensionId;

/// What triggering a control does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlTarget {
    /// One of the host's own entries (navigation page, tool).
    Builtin,
    /// An installed extension's bound action.
    Extension(ExtensionId),
}

/// One clickable control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub label: String,
    pub target: ControlTarget,
}

impl Control {
    pub fn builtin(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            target: ControlTarget::Builtin,
        }
    }

    pub fn extension(label: impl Into<String>, id: ExtensionId) -> Self {
        Self {
            label: label.into(),
            target: ControlTarget::Extension(id),
        }
    }

    pub fn extension_id(&self) -> Option<ExtensionId> {
        match self.target {
            ControlTarget::Extension(id) => Some(id),
            ControlTarget::Builtin => None,
        }
    }
}

/// One surface slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceItem {
    Control(Control),
    /// Layout stretch placeholder that keeps controls packed at the top.
    Stretch,
}

/// Ordered list of host controls ending with a stretch placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSurface {
    items: Vec<SurfaceItem>,
}

impl Default for ActionSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionSurface {
    /// Creates a surface holding only the trailing placeholder.
    pub fn new() -> Self {
        Self {
            items: vec![SurfaceItem::Stretch],
        }
    }

    /// Creates a surface with builtin controls in the given order.
    pub fn with_builtin_controls<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut surface = Self::new();
        for label in labels {
            surface.insert_before_trailing(Control::builtin(label));
        }
        surface
    }

    /// Inserts `control` right before the trailing placeholder.
    pub fn insert_before_trailing(&mut self, control: Control) {
        let index = self.items.len() - 1;
        self.items.insert(index, SurfaceItem::Control(control));
    }

    /// Removes the control bound to `id`. Returns whether one was removed.
    pub fn remove_extension(&mut self, id: ExtensionId) -> bool {
        let before = self.items.len();
        self.items.retain(|item| match item {
            SurfaceItem::Control(control) => control.extension_id() != Some(id),
            SurfaceItem::Stretch => true,
        });
        self.items.len() != before
    }

    /// All slots including the trailing placeholder.
    pub fn items(&self) -> &[SurfaceItem] {
        &self.items
    }

    /// Controls in display order.
    pub fn controls(&self) -> impl Iterator<Item = &Control> {
        self.items.iter().filter_map(|item| match item {
            SurfaceItem::Control(control) => Some(control),
            SurfaceItem::Stretch => None,
        })
    }

    /// Control labels in display order.
    pub fn labels(&self) -> Vec<&str> {
        self.controls().map(|control| control.label.as_str()).collect()
    }

    /// Exact-match label scan.
    pub fn contains_label(&self, label: &str) -> bool {
        self.controls().any(|control| control.label == label)
    }

    /// First control with exactly this label.
    pub fn find_by_label(&self, label: &str) -> Option<&Control> {
        self.controls().find(|control| control.label == label)
    }

    /// Number of slots, placeholder included.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the surface holds no controls (the placeholder always remains).
    pub fn is_empty(&self) -> bool {
        self.items.len() == 1
    }
}
