//! Capability registry

use std::collections::HashMap;
use std::sync::Arc;

use crate::capability::{Capability, CapabilityMeta};

/// Capability registry for looking up capabilities by name
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            capabilities: HashMap::new(),
        }
    }

    /// Register a capability; an existing entry with the same name is replaced and returned
    pub fn register(&mut self, capability: Arc<dyn Capability>) -> Option<Arc<dyn Capability>> {
        let name = capability.name().to_string();
        let previous = self.capabilities.insert(name.clone(), capability);
        if previous.is_some() {
            tracing::warn!(capability = %name, "capability registration replaced an existing entry");
        }
        previous
    }

    pub fn with(mut self, capability: Arc<dyn Capability>) -> Self {
        self.register(capability);
        self
    }

    /// Get a capability by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    /// All capability names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.capabilities.keys().cloned().collect();
        names.sort();
        names
    }

    /// Metadata of every capability, ordered by category then name
    pub fn catalog(&self) -> Vec<CapabilityMeta> {
        let mut catalog: Vec<CapabilityMeta> =
            self.capabilities.values().map(|c| c.metadata()).collect();
        catalog.sort_by(|a, b| (&a.category, &a.name).cmp(&(&b.category, &b.name)));
        catalog
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
