//! Core contracts implemented by components, bootstrap extensions and the
//! external collaborators the pipeline consumes.

use std::any::Any;
use std::sync::Arc;

use crate::definition::{ComponentDefinition, ComponentHandle, Scope};
use crate::errors::ContainerError;
use crate::ordering::Order;
use crate::reader::AnnotatedClass;
use crate::store::DefinitionStore;

/// Any instance the container can hold.
///
/// The `into_*` hooks replace reflective type matching: a component that
/// carries an extension capability overrides the matching hook to return
/// itself. The default implementations return `None`.
pub trait Component: Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;

    /// Owned `Any` view used for typed resolution. Implementations return
    /// `self`.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    fn into_container_extension(self: Arc<Self>) -> Option<Arc<dyn ContainerExtension>> {
        None
    }

    fn into_registry_extension(self: Arc<Self>) -> Option<Arc<dyn RegistryExtension>> {
        None
    }

    fn into_lifecycle_extension(self: Arc<Self>) -> Option<Arc<dyn LifecycleExtension>> {
        None
    }

    fn into_observer(self: Arc<Self>) -> Option<Arc<dyn ContainerObserver>> {
        None
    }
}

impl std::fmt::Debug for dyn Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Component")
    }
}

/// Bootstrap extension applied to the fully assembled definition store.
///
/// The finalize step (`apply`) runs after every registry-capable extension
/// has finished mutating the store, so it may assume the definition set is
/// complete.
pub trait ContainerExtension: Send + Sync + 'static {
    /// Identity used in diagnostics and error reports.
    fn name(&self) -> &str;

    fn order(&self) -> Order {
        Order::Unordered
    }

    fn apply(&self, store: &DefinitionStore) -> anyhow::Result<()>;

    /// Return self as a registry extension if this extension also mutates
    /// the definition set. Default is a plain extension.
    fn into_registry(self: Arc<Self>) -> Option<Arc<dyn RegistryExtension>> {
        None
    }
}

/// Registry-capable extension: may register further definitions — including
/// definitions of more extensions — while the registry phase is running.
///
/// Two-step contract: `mutate` must not assume any other extension has
/// finished mutating; `apply` (inherited) may.
pub trait RegistryExtension: ContainerExtension {
    fn mutate(&self, store: &DefinitionStore) -> anyhow::Result<()>;
}

/// Observes component instances as they become usable. Hooks may substitute
/// the instance by returning a different handle.
pub trait LifecycleExtension: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn order(&self) -> Order {
        Order::Unordered
    }

    /// Internal bookkeeping extensions are re-registered at the very end of
    /// the lifecycle phase so they always run after externally added ones.
    fn is_internal(&self) -> bool {
        false
    }

    fn before_ready(&self, name: &str, instance: ComponentHandle) -> anyhow::Result<ComponentHandle> {
        let _ = name;
        Ok(instance)
    }

    fn after_ready(&self, name: &str, instance: ComponentHandle) -> anyhow::Result<ComponentHandle> {
        let _ = name;
        Ok(instance)
    }
}

/// Components that want a callback once the container is fully wired opt in
/// via `Component::into_observer`; the detector extension collects them.
pub trait ContainerObserver: Send + Sync + 'static {
    fn container_ready(&self);
}

/// External predicate deciding whether a candidate registration should be
/// skipped entirely. Evaluated once per class descriptor at read time.
pub trait ConditionGate: Send + Sync {
    fn should_skip(&self, class: &AnnotatedClass) -> bool;
}

/// Pluggable name generation for definitions registered without an explicit
/// name. Must be deterministic for identical descriptor and store contents.
pub trait NameGenerator: Send + Sync {
    fn generate(&self, definition: &ComponentDefinition, store: &DefinitionStore) -> String;
}

/// Scope/proxy resolution boundary. Called once per definition at
/// registration time; the returned descriptor is treated opaquely.
pub trait ScopeResolver: Send + Sync {
    fn resolve(&self, scope: &Scope, definition: ComponentDefinition) -> ComponentDefinition;
}

/// Instance construction boundary. The orchestrator calls `build` but never
/// inspects how instances are produced.
pub trait InstanceBuilder: Send + Sync {
    fn build(&self, name: &str) -> Result<ComponentHandle, ContainerError>;
}

/// Typed access on top of any instance builder.
pub trait InstanceBuilderExt: InstanceBuilder {
    fn build_typed<T: Component>(&self, name: &str) -> Result<Arc<T>, ContainerError> {
        let handle = self.build(name)?;
        handle
            .into_any()
            .downcast::<T>()
            .map_err(|_| ContainerError::TypeMismatch {
                name: name.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }
}

impl<B: InstanceBuilder + ?Sized> InstanceBuilderExt for B {}
