//! Default instance builder backed by definition suppliers.
//!
//! The orchestrator and callers only see the `InstanceBuilder` boundary; this
//! implementation resolves the merged descriptor, runs the supplier closure
//! with itself as the dependency resolver, and routes the fresh instance
//! through the active lifecycle chain.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::contracts::InstanceBuilder;
use crate::definition::{ComponentHandle, Scope};
use crate::errors::ContainerError;
use crate::extensions::ExtensionRegistry;
use crate::store::DefinitionStore;

pub struct SupplierInstanceBuilder {
    store: Arc<DefinitionStore>,
    extensions: Arc<ExtensionRegistry>,
    singletons: DashMap<String, ComponentHandle>,
    in_flight: Mutex<HashSet<String>>,
}

impl SupplierInstanceBuilder {
    pub fn new(store: Arc<DefinitionStore>, extensions: Arc<ExtensionRegistry>) -> Self {
        Self {
            store,
            extensions,
            singletons: DashMap::new(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn contains_singleton(&self, name: &str) -> bool {
        self.singletons.contains_key(name)
    }

    fn produce(&self, name: &str) -> Result<ComponentHandle, ContainerError> {
        let definition = self
            .store
            .merged_lookup(name)
            .ok_or_else(|| ContainerError::NoSuchDefinition(name.to_string()))?;
        let supplier = definition
            .supplier
            .clone()
            .ok_or_else(|| ContainerError::MissingSupplier(name.to_string()))?;

        if !self.in_flight.lock().insert(name.to_string()) {
            return Err(ContainerError::CircularDependency(name.to_string()));
        }
        let produced = supplier(self);
        self.in_flight.lock().remove(name);

        produced.map_err(|source| ContainerError::Build {
            name: name.to_string(),
            source,
        })
    }

    fn apply_lifecycle_chain(
        &self,
        name: &str,
        mut instance: ComponentHandle,
    ) -> Result<ComponentHandle, ContainerError> {
        for extension in self.extensions.chain() {
            instance = extension.before_ready(name, instance).map_err(|source| {
                ContainerError::ExtensionInvocation {
                    extension: extension.name().to_string(),
                    source,
                }
            })?;
        }
        for extension in self.extensions.chain() {
            instance = extension.after_ready(name, instance).map_err(|source| {
                ContainerError::ExtensionInvocation {
                    extension: extension.name().to_string(),
                    source,
                }
            })?;
        }
        Ok(instance)
    }
}

impl InstanceBuilder for SupplierInstanceBuilder {
    fn build(&self, name: &str) -> Result<ComponentHandle, ContainerError> {
        let definition = self
            .store
            .merged_lookup(name)
            .ok_or_else(|| ContainerError::NoSuchDefinition(name.to_string()))?;
        let singleton = definition.scope == Scope::Singleton;

        if singleton {
            if let Some(existing) = self.singletons.get(name) {
                return Ok(existing.clone());
            }
        }

        let instance = self.produce(name)?;
        let instance = self.apply_lifecycle_chain(name, instance)?;

        if singleton {
            self.singletons
                .insert(name.to_string(), instance.clone());
        }
        Ok(instance)
    }
}

impl std::fmt::Debug for SupplierInstanceBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupplierInstanceBuilder")
            .field("singletons", &self.singletons.len())
            .finish()
    }
}
