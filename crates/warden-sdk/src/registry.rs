//! Named registries for capabilities and protections.
//!
//! Registries are plain values created at startup and handed to whatever
//! needs them; nothing here is global.

use crate::error::{Result, SdkError};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Something that can be looked up by name and listed.
pub trait Describe {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
}

/// Listing entry produced by [`Registry::describe_all`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Description {
    pub name: String,
    pub description: String,
}

/// A provider of one external effect interface.
pub trait CapabilityProvider: Describe + Send + Sync {
    /// Interface the provider implements, e.g. `"ServerACLConsequences"`.
    fn interface(&self) -> &str;
}

/// A running protection. Disposing stops it reacting to new revisions.
pub trait Protection: Describe + Send + Sync {
    fn dispose(&self);
    fn is_disposed(&self) -> bool;
}

pub struct Registry<D: ?Sized> {
    entries: RwLock<BTreeMap<String, Arc<D>>>,
}

pub type CapabilityRegistry = Registry<dyn CapabilityProvider>;
pub type ProtectionRegistry = Registry<dyn Protection>;

impl<D: ?Sized + Describe> Registry<D> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Add an entry. Names are unique within one registry.
    pub fn register(&self, entry: Arc<D>) -> Result<()> {
        let mut entries = self.entries.write();
        let name = entry.name().to_string();
        if entries.contains_key(&name) {
            return Err(SdkError::DuplicateName(name));
        }
        entries.insert(name, entry);
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<Arc<D>> {
        self.entries.read().get(name).cloned()
    }

    /// Every entry, sorted by name.
    pub fn describe_all(&self) -> Vec<Description> {
        self.entries
            .read()
            .values()
            .map(|entry| Description {
                name: entry.name().to_string(),
                description: entry.description().to_string(),
            })
            .collect()
    }

    pub fn entries(&self) -> Vec<Arc<D>> {
        self.entries.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<D: ?Sized + Describe> Default for Registry<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry<dyn CapabilityProvider> {
    /// Providers implementing `interface`.
    pub fn providers_of(&self, interface: &str) -> Vec<Arc<dyn CapabilityProvider>> {
        self.entries
            .read()
            .values()
            .filter(|provider| provider.interface() == interface)
            .cloned()
            .collect()
    }
}

impl Registry<dyn Protection> {
    pub fn dispose_all(&self) {
        for protection in self.entries() {
            protection.dispose();
        }
    }
}
