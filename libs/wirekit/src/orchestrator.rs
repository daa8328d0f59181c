//! Orchestrator — drives the two-phase extension pipeline to a fixpoint.
//!
//! Phase A routes every registry-capable extension through its mutate step,
//! re-querying the store live between rounds so extensions registered by
//! other extensions are picked up at arbitrary depth, then runs the finalize
//! step for everything involved. Phase B resolves lifecycle-capable
//! extensions into the active chain, tier by tier, with internal bookkeeping
//! extensions re-registered at the end and the observer detector appended as
//! the absolute last entry.
//!
//! Runs once per bootstrap, strictly single-threaded, before any ordinary
//! component is expected to exist. No retries, no rollback: the first fatal
//! error aborts the run with partial store mutations left intact.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::contracts::{
    ContainerExtension, InstanceBuilder, LifecycleExtension, RegistryExtension,
};
use crate::definition::{Capability, ComponentHandle, Role};
use crate::errors::ContainerError;
use crate::extensions::{ExtensionRegistry, ObserverRegistry};
use crate::ordering::{sort_by_declared_key, Order, OrderingTier};
use crate::store::DefinitionStore;

/// Invocation counts per ordering tier.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct TierCounts {
    pub priority: usize,
    pub ordered: usize,
    pub unordered: usize,
}

impl TierCounts {
    fn bump(&mut self, tier: OrderingTier) {
        match tier {
            OrderingTier::Priority => self.priority += 1,
            OrderingTier::Ordered => self.ordered += 1,
            OrderingTier::Unordered => self.unordered += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.priority + self.ordered + self.unordered
    }
}

/// Diagnostic summary of one orchestration run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct OrchestrationReport {
    pub definitions_registered: usize,
    /// Mutate-step invocations of registry-capable extensions, per tier.
    pub registry_extensions: TierCounts,
    /// Finalize-step invocations across all container extensions.
    pub container_extensions_applied: usize,
    /// Lifecycle extensions registered into the chain, per tier.
    pub lifecycle_extensions: TierCounts,
    /// Components flagged as built before the full lifecycle chain existed.
    pub early_build_warnings: Vec<String>,
}

/// A store-discovered extension together with its classification, carried
/// from collection to invocation so the tier is assigned exactly once.
struct Classified<E> {
    order: Order,
    name: String,
    extension: E,
}

pub struct Orchestrator {
    store: Arc<DefinitionStore>,
    extensions: Arc<ExtensionRegistry>,
    builder: Arc<dyn InstanceBuilder>,
    observers: Arc<ObserverRegistry>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<DefinitionStore>,
        extensions: Arc<ExtensionRegistry>,
        builder: Arc<dyn InstanceBuilder>,
        observers: Arc<ObserverRegistry>,
    ) -> Self {
        Self {
            store,
            extensions,
            builder,
            observers,
        }
    }

    pub fn run(&self) -> Result<OrchestrationReport, ContainerError> {
        let mut report = OrchestrationReport::default();
        self.run_registry_phase(&mut report)?;
        self.run_lifecycle_phase(&mut report)?;
        report.definitions_registered = self.store.len();
        report.early_build_warnings = self.extensions.warnings();
        Ok(report)
    }

    /// Phase A: registry-capable extensions, then the finalize step for every
    /// container extension involved.
    fn run_registry_phase(&self, report: &mut OrchestrationReport) -> Result<(), ContainerError> {
        tracing::info!("Phase: registry extensions");
        let mut processed: HashSet<String> = HashSet::new();

        // Externally supplied extensions were provided before the store
        // existed. Registry-capable ones mutate immediately; the rest wait
        // for their finalize step.
        let mut regular: Vec<Arc<dyn ContainerExtension>> = Vec::new();
        let mut registry_processors: Vec<Classified<Arc<dyn RegistryExtension>>> = Vec::new();
        for extension in self.extensions.supplied() {
            match extension.clone().into_registry() {
                Some(registry_ext) => {
                    tracing::debug!(
                        extension = registry_ext.name(),
                        "Mutate step (supplied registry extension)"
                    );
                    let name = registry_ext.name().to_string();
                    registry_ext.mutate(&self.store).map_err(|source| {
                        ContainerError::ExtensionInvocation {
                            extension: name.clone(),
                            source,
                        }
                    })?;
                    report.registry_extensions.bump(registry_ext.order().tier());
                    registry_processors.push(Classified {
                        order: registry_ext.order(),
                        name,
                        extension: registry_ext,
                    });
                }
                None => regular.push(extension),
            }
        }

        // Round 1: Priority tier. Live re-query — invoking one extension may
        // register the extensions discovered in the next round.
        let batch = self.collect_registry_round(&mut processed, Some(OrderingTier::Priority))?;
        self.invoke_mutate_batch(&batch, report)?;
        registry_processors.extend(batch);

        // Round 2: Ordered tier, excluding already-processed names.
        let batch = self.collect_registry_round(&mut processed, Some(OrderingTier::Ordered))?;
        self.invoke_mutate_batch(&batch, report)?;
        registry_processors.extend(batch);

        // Round 3: repeat until a round finds no unprocessed names and the
        // store generation did not move, i.e. the definition set reached a
        // fixpoint. Terminates because every round shrinks the unprocessed
        // set within a finite universe of registrable definitions.
        loop {
            let generation = self.store.generation();
            let batch = self.collect_registry_round(&mut processed, None)?;
            if batch.is_empty() && self.store.generation() == generation {
                break;
            }
            self.invoke_mutate_batch(&batch, report)?;
            registry_processors.extend(batch);
        }

        // Finalize step for every registry-capable extension, in the order
        // they were applied: supplied ones first, then round batches.
        for entry in &registry_processors {
            tracing::debug!(extension = %entry.name, "Finalize step (registry extension)");
            entry.extension.apply(&self.store).map_err(|source| {
                ContainerError::ExtensionInvocation {
                    extension: entry.name.clone(),
                    source,
                }
            })?;
            report.container_extensions_applied += 1;
        }

        // Purely plain supplied extensions run after all registry-capable
        // ones.
        for extension in &regular {
            tracing::debug!(extension = extension.name(), "Finalize step (supplied extension)");
            extension.apply(&self.store).map_err(|source| {
                ContainerError::ExtensionInvocation {
                    extension: extension.name().to_string(),
                    source,
                }
            })?;
            report.container_extensions_applied += 1;
        }

        self.apply_store_container_extensions(&processed, report)?;

        self.store.clear_metadata_cache();
        Ok(())
    }

    /// One query+build round over registry-capable names. Returns the batch
    /// sorted by declared key; the caller invokes the mutate steps.
    fn collect_registry_round(
        &self,
        processed: &mut HashSet<String>,
        tier: Option<OrderingTier>,
    ) -> Result<Vec<Classified<Arc<dyn RegistryExtension>>>, ContainerError> {
        let mut batch = Vec::new();
        for name in self.store.names_with_capability(Capability::Registry) {
            if processed.contains(&name) {
                continue;
            }
            // A name that disappeared between query and lookup means an
            // extension unregistered it in flight. Fatal, not skipped.
            let definition = self
                .store
                .lookup(&name)
                .ok_or_else(|| ContainerError::NoSuchDefinition(name.clone()))?;
            if tier.is_some_and(|t| definition.order.tier() != t) {
                continue;
            }
            let extension = self.resolve_registry_extension(&name)?;
            processed.insert(name.clone());
            batch.push(Classified {
                order: definition.order,
                name,
                extension,
            });
        }
        sort_by_declared_key(&mut batch, |entry| entry.order);
        Ok(batch)
    }

    fn invoke_mutate_batch(
        &self,
        batch: &[Classified<Arc<dyn RegistryExtension>>],
        report: &mut OrchestrationReport,
    ) -> Result<(), ContainerError> {
        for entry in batch {
            tracing::debug!(
                extension = %entry.name,
                tier = ?entry.order.tier(),
                "Mutate step (registry extension)"
            );
            entry.extension.mutate(&self.store).map_err(|source| {
                ContainerError::ExtensionInvocation {
                    extension: entry.name.clone(),
                    source,
                }
            })?;
            report.registry_extensions.bump(entry.order.tier());
        }
        Ok(())
    }

    /// Store-discovered plain container extensions (container-capable but not
    /// registry-capable), applied Priority → Ordered → Unordered.
    fn apply_store_container_extensions(
        &self,
        processed: &HashSet<String>,
        report: &mut OrchestrationReport,
    ) -> Result<(), ContainerError> {
        let mut priority: Vec<Classified<Arc<dyn ContainerExtension>>> = Vec::new();
        let mut ordered_names: Vec<(Order, String)> = Vec::new();
        let mut unordered_names: Vec<String> = Vec::new();

        for name in self.store.names_with_capability(Capability::Container) {
            if processed.contains(&name) {
                continue;
            }
            let definition = self
                .store
                .lookup(&name)
                .ok_or_else(|| ContainerError::NoSuchDefinition(name.clone()))?;
            if definition.capabilities.registry {
                continue;
            }
            match definition.order.tier() {
                OrderingTier::Priority => priority.push(Classified {
                    order: definition.order,
                    name: name.clone(),
                    extension: self.resolve_container_extension(&name)?,
                }),
                OrderingTier::Ordered => ordered_names.push((definition.order, name)),
                OrderingTier::Unordered => unordered_names.push(name),
            }
        }

        sort_by_declared_key(&mut priority, |entry| entry.order);
        self.apply_batch(&priority, report)?;

        let mut ordered: Vec<Classified<Arc<dyn ContainerExtension>>> = Vec::new();
        for (order, name) in ordered_names {
            ordered.push(Classified {
                order,
                extension: self.resolve_container_extension(&name)?,
                name,
            });
        }
        sort_by_declared_key(&mut ordered, |entry| entry.order);
        self.apply_batch(&ordered, report)?;

        let mut unordered: Vec<Classified<Arc<dyn ContainerExtension>>> = Vec::new();
        for name in unordered_names {
            unordered.push(Classified {
                order: Order::Unordered,
                extension: self.resolve_container_extension(&name)?,
                name,
            });
        }
        self.apply_batch(&unordered, report)?;

        Ok(())
    }

    fn apply_batch(
        &self,
        batch: &[Classified<Arc<dyn ContainerExtension>>],
        report: &mut OrchestrationReport,
    ) -> Result<(), ContainerError> {
        for entry in batch {
            tracing::debug!(extension = %entry.name, "Finalize step (store extension)");
            entry.extension.apply(&self.store).map_err(|source| {
                ContainerError::ExtensionInvocation {
                    extension: entry.name.clone(),
                    source,
                }
            })?;
            report.container_extensions_applied += 1;
        }
        Ok(())
    }

    /// Phase B: resolve lifecycle-capable extensions into the active chain.
    fn run_lifecycle_phase(&self, report: &mut OrchestrationReport) -> Result<(), ContainerError> {
        tracing::info!("Phase: lifecycle extensions");

        let names = self.store.names_with_capability(Capability::Lifecycle);

        // The checker goes in first so every build from here on is counted
        // against the expected chain size. Diagnostic only, never fatal.
        let expected = self.extensions.chain_len() + 1 + names.len();
        self.extensions.set_expected(expected);
        self.extensions.register_lifecycle(Arc::new(EarlyBuildChecker {
            store: self.store.clone(),
            extensions: self.extensions.clone(),
        }));

        let mut priority: Vec<Classified<Arc<dyn LifecycleExtension>>> = Vec::new();
        let mut ordered_names: Vec<(Order, String)> = Vec::new();
        let mut unordered_names: Vec<String> = Vec::new();
        let mut internal: Vec<(Order, Arc<dyn LifecycleExtension>)> = Vec::new();

        for name in names {
            let definition = self
                .store
                .lookup(&name)
                .ok_or_else(|| ContainerError::NoSuchDefinition(name.clone()))?;
            match definition.order.tier() {
                OrderingTier::Priority => {
                    let extension = self.resolve_lifecycle_extension(&name)?;
                    if extension.is_internal() {
                        internal.push((definition.order, extension.clone()));
                    }
                    priority.push(Classified {
                        order: definition.order,
                        name,
                        extension,
                    });
                }
                OrderingTier::Ordered => ordered_names.push((definition.order, name)),
                OrderingTier::Unordered => unordered_names.push(name),
            }
        }

        sort_by_declared_key(&mut priority, |entry| entry.order);
        for entry in &priority {
            self.register_lifecycle(entry, report);
        }

        // Ordered cohort: resolve all, then register all, so no extension
        // observes a partially-populated cohort during resolution.
        let mut ordered: Vec<Classified<Arc<dyn LifecycleExtension>>> = Vec::new();
        for (order, name) in ordered_names {
            let extension = self.resolve_lifecycle_extension(&name)?;
            if extension.is_internal() {
                internal.push((order, extension.clone()));
            }
            ordered.push(Classified {
                order,
                name,
                extension,
            });
        }
        sort_by_declared_key(&mut ordered, |entry| entry.order);
        for entry in &ordered {
            self.register_lifecycle(entry, report);
        }

        let mut unordered: Vec<Classified<Arc<dyn LifecycleExtension>>> = Vec::new();
        for name in unordered_names {
            let extension = self.resolve_lifecycle_extension(&name)?;
            if extension.is_internal() {
                internal.push((Order::Unordered, extension.clone()));
            }
            unordered.push(Classified {
                order: Order::Unordered,
                name,
                extension,
            });
        }
        for entry in &unordered {
            self.register_lifecycle(entry, report);
        }

        // Internal bookkeeping extensions move to the end of the chain, after
        // everything externally added.
        sort_by_declared_key(&mut internal, |(order, _)| *order);
        for (_, extension) in internal {
            tracing::debug!(extension = extension.name(), "Re-registering internal lifecycle extension");
            self.extensions.register_lifecycle(extension);
        }

        // The observer detector is the absolute last entry, regardless of
        // tier.
        self.extensions.register_lifecycle(Arc::new(ObserverDetector {
            observers: self.observers.clone(),
        }));

        self.store.clear_metadata_cache();
        Ok(())
    }

    fn register_lifecycle(
        &self,
        entry: &Classified<Arc<dyn LifecycleExtension>>,
        report: &mut OrchestrationReport,
    ) {
        tracing::debug!(
            extension = %entry.name,
            tier = ?entry.order.tier(),
            "Registering lifecycle extension"
        );
        self.extensions.register_lifecycle(entry.extension.clone());
        report.lifecycle_extensions.bump(entry.order.tier());
    }

    fn resolve_registry_extension(
        &self,
        name: &str,
    ) -> Result<Arc<dyn RegistryExtension>, ContainerError> {
        let handle = self.builder.build(name)?;
        handle
            .into_registry_extension()
            .ok_or_else(|| ContainerError::TypeMismatch {
                name: name.to_string(),
                expected: "RegistryExtension",
            })
    }

    fn resolve_container_extension(
        &self,
        name: &str,
    ) -> Result<Arc<dyn ContainerExtension>, ContainerError> {
        let handle = self.builder.build(name)?;
        handle
            .into_container_extension()
            .ok_or_else(|| ContainerError::TypeMismatch {
                name: name.to_string(),
                expected: "ContainerExtension",
            })
    }

    fn resolve_lifecycle_extension(
        &self,
        name: &str,
    ) -> Result<Arc<dyn LifecycleExtension>, ContainerError> {
        let handle = self.builder.build(name)?;
        handle
            .into_lifecycle_extension()
            .ok_or_else(|| ContainerError::TypeMismatch {
                name: name.to_string(),
                expected: "LifecycleExtension",
            })
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("store", &self.store)
            .field("extensions", &self.extensions)
            .finish()
    }
}

/// Flags components built before the full lifecycle chain was registered,
/// i.e. components not eligible for processing by every extension.
struct EarlyBuildChecker {
    store: Arc<DefinitionStore>,
    extensions: Arc<ExtensionRegistry>,
}

impl EarlyBuildChecker {
    fn is_infrastructure(&self, name: &str) -> bool {
        self.store
            .lookup(name)
            .map(|d| d.role == Role::Infrastructure)
            .unwrap_or(false)
    }
}

impl LifecycleExtension for EarlyBuildChecker {
    fn name(&self) -> &str {
        "early_build_checker"
    }

    fn after_ready(&self, name: &str, instance: ComponentHandle) -> anyhow::Result<ComponentHandle> {
        let is_lifecycle_extension = instance.clone().into_lifecycle_extension().is_some();
        if !is_lifecycle_extension
            && !self.is_infrastructure(name)
            && self.extensions.chain_len() < self.extensions.expected()
        {
            tracing::info!(
                component = name,
                chain = self.extensions.chain_len(),
                expected = self.extensions.expected(),
                "Component built before the full lifecycle chain was registered"
            );
            self.extensions.record_warning(format!(
                "component '{name}' was built before every lifecycle extension was registered"
            ));
        }
        Ok(instance)
    }
}

/// Records components that expose the observer capability as they are built.
struct ObserverDetector {
    observers: Arc<ObserverRegistry>,
}

impl LifecycleExtension for ObserverDetector {
    fn name(&self) -> &str {
        "observer_detector"
    }

    fn after_ready(&self, name: &str, instance: ComponentHandle) -> anyhow::Result<ComponentHandle> {
        if let Some(observer) = instance.clone().into_observer() {
            tracing::debug!(component = name, "Detected container observer");
            self.observers.record(name, observer);
        }
        Ok(instance)
    }
}
