//! Installed-extension registry.
//!
//! # Responsibility
//! - Own every installed extension (descriptor, capabilities, bound action).
//! - Enforce display-name uniqueness.
//!
//! # Invariants
//! - Entries live in an arena keyed by stable [`ExtensionId`]; names are a
//!   secondary index and never reused while an entry holds them.
//! - Name lookup is exact string equality, no normalization.
//! - Entries are never mutated after insertion.

use crate::extension::binder::HostAction;
use crate::extension::capability::CapabilitySet;
use crate::extension::descriptor::ExtensionDescriptor;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identity of one installed extension.
pub type ExtensionId = Uuid;

/// One installed extension.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub id: ExtensionId,
    pub name: String,
    pub descriptor: ExtensionDescriptor,
    pub capabilities: CapabilitySet,
    pub action: HostAction,
}

/// Why an install attempt was skipped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A control or extension with the same display name already exists.
    DuplicateName,
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateName => write!(f, "duplicate name"),
        }
    }
}

/// Registry insertion result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    Installed(ExtensionId),
    Skipped { name: String, reason: SkipReason },
}

/// In-process registry of installed extensions.
#[derive(Debug, Default)]
pub struct ExtensionRegistry {
    entries: BTreeMap<ExtensionId, RegistryEntry>,
    name_index: BTreeMap<String, ExtensionId>,
    install_order: Vec<ExtensionId>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `entry` unless its name is taken.
    ///
    /// A taken name is not an error: the entry is dropped and
    /// [`RegisterOutcome::Skipped`] is returned.
    pub fn register(&mut self, entry: RegistryEntry) -> RegisterOutcome {
        if self.name_index.contains_key(entry.name.as_str()) {
            return RegisterOutcome::Skipped {
                name: entry.name,
                reason: SkipReason::DuplicateName,
            };
        }

        let id = entry.id;
        self.name_index.insert(entry.name.clone(), id);
        self.install_order.push(id);
        self.entries.insert(id, entry);
        RegisterOutcome::Installed(id)
    }

    /// Removes one entry. Dropping it releases the extension's module once
    /// no in-flight invocation still holds the action.
    pub fn remove(&mut self, id: ExtensionId) -> Option<RegistryEntry> {
        let entry = self.entries.remove(&id)?;
        self.name_index.remove(entry.name.as_str());
        self.install_order.retain(|existing| *existing != id);
        Some(entry)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.name_index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: ExtensionId) -> Option<&RegistryEntry> {
        self.entries.get(&id)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&RegistryEntry> {
        let id = self.name_index.get(name)?;
        self.entries.get(id)
    }

    /// Entries in install order.
    pub fn entries(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.install_order
            .iter()
            .filter_map(|id| self.entries.get(id))
    }

    /// Display names in install order.
    pub fn names(&self) -> Vec<&str> {
        self.entries().map(|entry| entry.name.as_str()).collect()
    }
}
