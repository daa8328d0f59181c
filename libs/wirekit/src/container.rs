//! Container — the explicit handle that owns all bootstrap state.
//!
//! There is no ambient global container: everything a caller or extension
//! needs flows through this handle (or the narrower views handed to
//! extensions). Lifecycle is explicit: construct, register, orchestrate,
//! then resolve.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::builder::SupplierInstanceBuilder;
use crate::contracts::{
    Component, ConditionGate, ContainerExtension, InstanceBuilder, InstanceBuilderExt,
    LifecycleExtension, NameGenerator, ScopeResolver,
};
use crate::definition::{ComponentDefinition, ComponentHandle, Qualifier};
use crate::errors::ContainerError;
use crate::extensions::{ExtensionRegistry, ObserverRegistry};
use crate::orchestrator::{OrchestrationReport, Orchestrator};
use crate::reader::{AnnotatedClass, DefinitionCustomizer, DefinitionReader, ReadOutcome};
use crate::store::{DefinitionStore, DuplicatePolicy};

pub struct Container {
    store: Arc<DefinitionStore>,
    reader: DefinitionReader,
    extensions: Arc<ExtensionRegistry>,
    builder: Arc<SupplierInstanceBuilder>,
    observers: Arc<ObserverRegistry>,
    running: AtomicBool,
}

impl Container {
    pub fn new() -> Self {
        Self::with_duplicate_policy(DuplicatePolicy::default())
    }

    pub fn with_duplicate_policy(policy: DuplicatePolicy) -> Self {
        let store = Arc::new(DefinitionStore::with_policy(policy));
        let extensions = Arc::new(ExtensionRegistry::default());
        let builder = Arc::new(SupplierInstanceBuilder::new(
            store.clone(),
            extensions.clone(),
        ));
        Self {
            reader: DefinitionReader::new(store.clone()),
            store,
            extensions,
            builder,
            observers: Arc::new(ObserverRegistry::default()),
            running: AtomicBool::new(false),
        }
    }

    pub fn with_condition_gate(mut self, gate: Arc<dyn ConditionGate>) -> Self {
        self.reader = self.reader.with_condition_gate(gate);
        self
    }

    pub fn with_name_generator(mut self, names: Arc<dyn NameGenerator>) -> Self {
        self.reader = self.reader.with_name_generator(names);
        self
    }

    pub fn with_scope_resolver(mut self, scopes: Arc<dyn ScopeResolver>) -> Self {
        self.reader = self.reader.with_scope_resolver(scopes);
        self
    }

    /// Register one or more annotated classes. Idempotent for identical
    /// classes with generated names.
    pub fn register_classes(
        &self,
        classes: impl IntoIterator<Item = AnnotatedClass>,
    ) -> Result<(), ContainerError> {
        for class in classes {
            self.reader.read(class)?;
        }
        Ok(())
    }

    /// Full-control registration with explicit name, qualifier markers and
    /// late customizers.
    pub fn register_class_with(
        &self,
        class: AnnotatedClass,
        explicit_name: Option<&str>,
        qualifiers: &[Qualifier],
        customizers: &[DefinitionCustomizer],
    ) -> Result<ReadOutcome, ContainerError> {
        self.reader
            .read_with(class, explicit_name, qualifiers, customizers)
    }

    /// Supply a container extension before orchestration. Supplied extensions
    /// run before any store-discovered extension of the same kind.
    pub fn register_extension(&self, extension: Arc<dyn ContainerExtension>) {
        self.extensions.register_extension(extension);
    }

    /// Add a lifecycle extension directly to the active chain.
    pub fn register_lifecycle_extension(&self, extension: Arc<dyn LifecycleExtension>) {
        self.extensions.register_lifecycle(extension);
    }

    /// Run the two-phase bootstrap pipeline once. Non-reentrant: a nested or
    /// concurrent run over the same container fails with `AlreadyRunning`.
    pub fn run_orchestration(&self) -> Result<OrchestrationReport, ContainerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ContainerError::AlreadyRunning);
        }
        let orchestrator = Orchestrator::new(
            self.store.clone(),
            self.extensions.clone(),
            self.builder.clone() as Arc<dyn InstanceBuilder>,
            self.observers.clone(),
        );
        let result = orchestrator.run();
        self.running.store(false, Ordering::SeqCst);
        result
    }

    pub fn lookup(&self, name: &str) -> Option<ComponentDefinition> {
        self.store.lookup(name)
    }

    pub fn resolve(&self, name: &str) -> Result<ComponentHandle, ContainerError> {
        self.builder.build(name)
    }

    pub fn resolve_typed<T: Component>(&self, name: &str) -> Result<Arc<T>, ContainerError> {
        self.builder.build_typed::<T>(name)
    }

    pub fn store(&self) -> Arc<DefinitionStore> {
        self.store.clone()
    }

    /// Names in the active lifecycle chain, in invocation order.
    pub fn lifecycle_chain(&self) -> Vec<String> {
        self.extensions.chain_names()
    }

    /// Names of detected container observers, in detection order.
    pub fn observers(&self) -> Vec<String> {
        self.observers.names()
    }

    /// Invoke every detected observer. Callers trigger this once their own
    /// wiring after orchestration is complete.
    pub fn notify_ready(&self) {
        self.observers.notify_ready();
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("definitions", &self.store.len())
            .field("lifecycle_chain", &self.extensions.chain_names())
            .finish()
    }
}
