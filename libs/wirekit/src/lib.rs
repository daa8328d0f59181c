//! # Wirekit - Declarative Component Container Bootstrap
//!
//! The bootstrap core of an object-graph container: definitions are
//! registered from declaratively described class metadata, then a two-phase,
//! ordering-sensitive pipeline of registry and lifecycle extensions runs to a
//! fixpoint before any ordinary component is built.
//!
//! ## Features
//!
//! - **Declarative**: components are described by `AnnotatedClass` metadata
//! - **Capability-tagged**: extensions declare what they can do at
//!   registration time; no reflective type matching
//! - **Tiered ordering**: Priority → Ordered(key) → Unordered, stable within
//!   tiers
//! - **Fixpoint discovery**: extensions may register further extensions to
//!   arbitrary depth within a single orchestration run
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wirekit::{AnnotatedClass, Container};
//!
//! let container = Container::new();
//! container.register_classes([
//!     AnnotatedClass::of::<UserService>()
//!         .with_supplier(|_| Ok(Arc::new(UserService::default()))),
//! ])?;
//! let report = container.run_orchestration()?;
//! let service = container.resolve_typed::<UserService>("userService")?;
//! ```

pub use anyhow::Result;

pub mod builder;
pub mod container;
pub mod contracts;
pub mod definition;
pub mod errors;
pub mod extensions;
pub mod orchestrator;
pub mod ordering;
pub mod reader;
pub mod store;

pub use builder::SupplierInstanceBuilder;
pub use container::Container;
pub use contracts::{
    Component, ConditionGate, ContainerExtension, ContainerObserver, InstanceBuilder,
    InstanceBuilderExt, LifecycleExtension, NameGenerator, RegistryExtension, ScopeResolver,
};
pub use definition::{
    Capabilities, Capability, ComponentDefinition, ComponentHandle, ComponentSupplier, Qualifier,
    Role, Scope,
};
pub use errors::ContainerError;
pub use extensions::{ExtensionRegistry, ObserverRegistry};
pub use orchestrator::{OrchestrationReport, Orchestrator, TierCounts};
pub use ordering::{Order, OrderingTier, DEFAULT_PRECEDENCE};
pub use reader::{
    AnnotatedClass, DefaultNameGenerator, DefinitionCustomizer, DefinitionReader, ReadOutcome,
};
pub use store::{DefinitionStore, DuplicatePolicy};

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
mod tests;
