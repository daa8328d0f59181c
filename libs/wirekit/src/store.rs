//! Definition store — owns every registration descriptor.
//!
//! Enumerations are live, never snapshots: every query reflects all
//! mutations performed so far in the same run, which the orchestrator's
//! fixpoint loop depends on. A generation counter is bumped on every
//! mutation so callers can detect that new names have appeared.

use std::any::TypeId;
use std::collections::HashMap;

use parking_lot::RwLock;

use crate::definition::{Capability, ComponentDefinition};
use crate::errors::ContainerError;

/// What to do when a name is registered twice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Replace the existing descriptor silently.
    #[default]
    Overwrite,
    /// Replace, but log a warning.
    Warn,
    /// Fail with `DuplicateName`.
    Reject,
}

#[derive(Default)]
struct StoreInner {
    definitions: HashMap<String, ComponentDefinition>,
    insertion: Vec<String>,
    merged: HashMap<String, ComponentDefinition>,
    generation: u64,
}

pub struct DefinitionStore {
    inner: RwLock<StoreInner>,
    policy: DuplicatePolicy,
}

impl DefinitionStore {
    pub fn new() -> Self {
        Self::with_policy(DuplicatePolicy::default())
    }

    pub fn with_policy(policy: DuplicatePolicy) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            policy,
        }
    }

    /// Register a definition under `name`. Re-registration replaces the whole
    /// descriptor according to the duplicate policy; it never merges.
    pub fn register(
        &self,
        name: impl Into<String>,
        definition: ComponentDefinition,
    ) -> Result<(), ContainerError> {
        let name = name.into();
        let mut inner = self.inner.write();
        if inner.definitions.contains_key(&name) {
            match self.policy {
                DuplicatePolicy::Overwrite => {}
                DuplicatePolicy::Warn => {
                    tracing::warn!(definition = %name, "Overwriting existing definition");
                }
                DuplicatePolicy::Reject => return Err(ContainerError::DuplicateName(name)),
            }
        } else {
            inner.insertion.push(name.clone());
        }
        let mut definition = definition;
        definition.name = name.clone();
        inner.merged.remove(&name);
        inner.definitions.insert(name, definition);
        inner.generation += 1;
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<ComponentDefinition> {
        self.inner.read().definitions.get(name).cloned()
    }

    /// Cached merged view of a descriptor, used by the instance builder.
    /// Re-registration invalidates the touched name; extensions that rewrite
    /// metadata in bulk are covered by `clear_metadata_cache`.
    pub fn merged_lookup(&self, name: &str) -> Option<ComponentDefinition> {
        if let Some(definition) = self.inner.read().merged.get(name) {
            return Some(definition.clone());
        }
        let mut inner = self.inner.write();
        let definition = inner.definitions.get(name)?.clone();
        inner.merged.insert(name.to_string(), definition.clone());
        Some(definition)
    }

    /// Drop every cached merged descriptor. Called by the orchestrator after
    /// each phase, since extensions may have rewritten descriptor metadata.
    pub fn clear_metadata_cache(&self) {
        self.inner.write().merged.clear();
    }

    /// Remove a definition. Extensions must never unregister names that are
    /// in flight; this exists for pre-orchestration housekeeping and for
    /// exercising the disappearing-name failure mode.
    pub fn remove(&self, name: &str) -> Option<ComponentDefinition> {
        let mut inner = self.inner.write();
        let removed = inner.definitions.remove(name)?;
        inner.insertion.retain(|n| n != name);
        inner.merged.remove(name);
        inner.generation += 1;
        Some(removed)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().definitions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.inner.read().definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().definitions.is_empty()
    }

    /// All registered names, in insertion order.
    pub fn names(&self) -> Vec<String> {
        let inner = self.inner.read();
        inner
            .insertion
            .iter()
            .filter(|n| inner.definitions.contains_key(*n))
            .cloned()
            .collect()
    }

    /// Names whose definitions target the given type, in insertion order.
    /// Includes definitions with no built instance.
    pub fn names_of_type(&self, type_id: TypeId) -> Vec<String> {
        self.filtered_names(|d| d.type_id == type_id)
    }

    /// Names whose definitions declare the given capability, in insertion
    /// order. Live query: freshly registered names show up on every call.
    pub fn names_with_capability(&self, capability: Capability) -> Vec<String> {
        self.filtered_names(|d| d.capabilities.has(capability))
    }

    /// Mutation counter. Each register/remove bumps it.
    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    fn filtered_names(&self, keep: impl Fn(&ComponentDefinition) -> bool) -> Vec<String> {
        let inner = self.inner.read();
        inner
            .insertion
            .iter()
            .filter(|n| inner.definitions.get(*n).is_some_and(&keep))
            .cloned()
            .collect()
    }
}

impl Default for DefinitionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DefinitionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("DefinitionStore")
            .field("definitions", &inner.insertion)
            .field("generation", &inner.generation)
            .field("policy", &self.policy)
            .finish()
    }
}
