use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::contracts::{
    Component, ContainerExtension, LifecycleExtension, RegistryExtension,
};
use crate::definition::{Capabilities, ComponentDefinition, ComponentHandle, Role};
use crate::errors::ContainerError;
use crate::ordering::Order;
use crate::reader::AnnotatedClass;
use crate::store::DefinitionStore;
use crate::testing::Plain;
use crate::Container;

type Log = Arc<Mutex<Vec<String>>>;
type MutateFn = Arc<dyn Fn(&DefinitionStore) -> anyhow::Result<()> + Send + Sync>;

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().clone()
}

/* --------------------------- Test extensions ------------------------- */

/// Registry extension that records its mutate/apply steps and optionally
/// performs scripted store mutations.
struct ScriptedRegistryExt {
    name: String,
    order: Order,
    log: Log,
    on_mutate: Option<MutateFn>,
}

impl ContainerExtension for ScriptedRegistryExt {
    fn name(&self) -> &str {
        &self.name
    }

    fn order(&self) -> Order {
        self.order
    }

    fn apply(&self, _store: &DefinitionStore) -> anyhow::Result<()> {
        self.log.lock().push(format!("apply:{}", self.name));
        Ok(())
    }

    fn into_registry(self: Arc<Self>) -> Option<Arc<dyn RegistryExtension>> {
        Some(self)
    }
}

impl RegistryExtension for ScriptedRegistryExt {
    fn mutate(&self, store: &DefinitionStore) -> anyhow::Result<()> {
        self.log.lock().push(format!("mutate:{}", self.name));
        if let Some(script) = &self.on_mutate {
            script(store)?;
        }
        Ok(())
    }
}

impl Component for ScriptedRegistryExt {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn into_registry_extension(self: Arc<Self>) -> Option<Arc<dyn RegistryExtension>> {
        Some(self)
    }
}

/// Definition for a scripted registry extension, ready to drop in a store.
fn registry_ext_def(
    name: impl Into<String>,
    order: Order,
    log: &Log,
    on_mutate: Option<MutateFn>,
) -> ComponentDefinition {
    let name = name.into();
    let log = log.clone();
    ComponentDefinition::of::<ScriptedRegistryExt>()
        .with_capabilities(Capabilities::registry())
        .with_order(order)
        .with_supplier(move |_| {
            Ok(Arc::new(ScriptedRegistryExt {
                name: name.clone(),
                order,
                log: log.clone(),
                on_mutate: on_mutate.clone(),
            }) as ComponentHandle)
        })
}

/// Lifecycle extension that records every component it post-processes.
struct ScriptedLifecycleExt {
    name: String,
    order: Order,
    internal: bool,
    log: Log,
}

impl LifecycleExtension for ScriptedLifecycleExt {
    fn name(&self) -> &str {
        &self.name
    }

    fn order(&self) -> Order {
        self.order
    }

    fn is_internal(&self) -> bool {
        self.internal
    }

    fn after_ready(&self, name: &str, instance: ComponentHandle) -> anyhow::Result<ComponentHandle> {
        self.log.lock().push(format!("post:{}:{name}", self.name));
        Ok(instance)
    }
}

impl Component for ScriptedLifecycleExt {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn into_lifecycle_extension(self: Arc<Self>) -> Option<Arc<dyn LifecycleExtension>> {
        Some(self)
    }
}

fn lifecycle_ext_def(
    name: impl Into<String>,
    order: Order,
    internal: bool,
    log: &Log,
) -> ComponentDefinition {
    let name = name.into();
    let log = log.clone();
    ComponentDefinition::of::<ScriptedLifecycleExt>()
        .with_capabilities(Capabilities::lifecycle())
        .with_order(order)
        .with_supplier(move |_| {
            Ok(Arc::new(ScriptedLifecycleExt {
                name: name.clone(),
                order,
                internal,
                log: log.clone(),
            }) as ComponentHandle)
        })
}

/// Plain supplied extension with no registry capability.
struct PlainSuppliedExt {
    name: String,
    log: Log,
}

impl ContainerExtension for PlainSuppliedExt {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, _store: &DefinitionStore) -> anyhow::Result<()> {
        self.log.lock().push(format!("apply:{}", self.name));
        Ok(())
    }
}

fn plain_def() -> ComponentDefinition {
    ComponentDefinition::of::<Plain>().with_supplier(|_| Ok(Arc::new(Plain) as ComponentHandle))
}

/* ------------------------------- Tests ---------------------------- */

#[test]
fn tiers_run_priority_then_ordered_then_unordered() {
    let log = log();
    let container = Container::new();
    let store = container.store();

    // Registered deliberately out of tier order.
    store
        .register("u", registry_ext_def("u", Order::Unordered, &log, None))
        .unwrap();
    store
        .register("o10", registry_ext_def("o10", Order::Ordered(10), &log, None))
        .unwrap();
    store
        .register("o5", registry_ext_def("o5", Order::Ordered(5), &log, None))
        .unwrap();
    store
        .register("p", registry_ext_def("p", Order::Priority, &log, None))
        .unwrap();

    container.run_orchestration().unwrap();

    let mutates: Vec<String> = entries(&log)
        .into_iter()
        .filter(|e| e.starts_with("mutate:"))
        .collect();
    assert_eq!(mutates, vec!["mutate:p", "mutate:o5", "mutate:o10", "mutate:u"]);
}

#[test]
fn ordered_ties_keep_discovery_order() {
    let log = log();
    let container = Container::new();
    let store = container.store();

    store
        .register("first", registry_ext_def("first", Order::Ordered(3), &log, None))
        .unwrap();
    store
        .register("second", registry_ext_def("second", Order::Ordered(3), &log, None))
        .unwrap();
    store
        .register("third", registry_ext_def("third", Order::Ordered(3), &log, None))
        .unwrap();

    container.run_orchestration().unwrap();

    let mutates: Vec<String> = entries(&log)
        .into_iter()
        .filter(|e| e.starts_with("mutate:"))
        .collect();
    assert_eq!(mutates, vec!["mutate:first", "mutate:second", "mutate:third"]);
}

#[test]
fn fixpoint_converges_across_transitive_registrations() {
    let log = log();
    let container = Container::new();
    let store = container.store();

    // a (Priority) registers b (Ordered) registers c (Unordered).
    let log_c = log.clone();
    let register_c: MutateFn = Arc::new(move |store: &DefinitionStore| {
        store.register("c", registry_ext_def("c", Order::Unordered, &log_c, None))?;
        Ok(())
    });
    let log_b = log.clone();
    let register_b: MutateFn = Arc::new(move |store: &DefinitionStore| {
        store.register(
            "b",
            registry_ext_def("b", Order::Ordered(1), &log_b, Some(register_c.clone())),
        )?;
        Ok(())
    });
    store
        .register("a", registry_ext_def("a", Order::Priority, &log, Some(register_b)))
        .unwrap();

    let report = container.run_orchestration().unwrap();

    let mutates: Vec<String> = entries(&log)
        .into_iter()
        .filter(|e| e.starts_with("mutate:"))
        .collect();
    // Single run, every extension invoked exactly once, in tier order.
    assert_eq!(mutates, vec!["mutate:a", "mutate:b", "mutate:c"]);
    assert_eq!(report.registry_extensions.priority, 1);
    assert_eq!(report.registry_extensions.ordered, 1);
    assert_eq!(report.registry_extensions.unordered, 1);
}

#[test]
fn deeply_nested_registrations_are_drained() {
    // Each extension registers the next one; well beyond the two fixed
    // rounds, so the fixpoint loop has to keep re-querying.
    fn chain(depth: usize, log: &Log) -> MutateFn {
        let log = log.clone();
        Arc::new(move |store: &DefinitionStore| {
            if depth > 0 {
                let name = format!("chain{depth}");
                store.register(
                    name.clone(),
                    registry_ext_def(name, Order::Unordered, &log, Some(chain(depth - 1, &log))),
                )?;
            }
            Ok(())
        })
    }

    let log = log();
    let container = Container::new();
    container
        .store()
        .register("root", registry_ext_def("root", Order::Unordered, &log, Some(chain(5, &log))))
        .unwrap();

    let report = container.run_orchestration().unwrap();
    let mutates = entries(&log)
        .iter()
        .filter(|e| e.starts_with("mutate:"))
        .count();
    assert_eq!(mutates, 6);
    assert_eq!(report.registry_extensions.total(), 6);
}

#[test]
fn mutate_steps_finish_before_any_finalize_step() {
    let log = log();
    let container = Container::new();
    let store = container.store();

    let log_b = log.clone();
    let register_b: MutateFn = Arc::new(move |store: &DefinitionStore| {
        store.register("b", registry_ext_def("b", Order::Unordered, &log_b, None))?;
        Ok(())
    });
    store
        .register("a", registry_ext_def("a", Order::Priority, &log, Some(register_b)))
        .unwrap();

    container.run_orchestration().unwrap();

    let events = entries(&log);
    let last_mutate = events.iter().rposition(|e| e.starts_with("mutate:")).unwrap();
    let first_apply = events.iter().position(|e| e.starts_with("apply:")).unwrap();
    assert!(last_mutate < first_apply, "finalize ran before mutate finished: {events:?}");
}

#[test]
fn supplied_registry_extensions_mutate_first_and_plain_supplied_finalize_last() {
    let log = log();
    let container = Container::new();
    let store = container.store();

    store
        .register("stored", registry_ext_def("stored", Order::Priority, &log, None))
        .unwrap();
    container.register_extension(Arc::new(ScriptedRegistryExt {
        name: "supplied".into(),
        order: Order::Unordered,
        log: log.clone(),
        on_mutate: None,
    }));
    container.register_extension(Arc::new(PlainSuppliedExt {
        name: "plain".into(),
        log: log.clone(),
    }));

    container.run_orchestration().unwrap();

    let events = entries(&log);
    // Supplied registry extensions mutate before any store-discovered one,
    // regardless of tier.
    assert_eq!(events[0], "mutate:supplied");
    assert_eq!(events[1], "mutate:stored");
    // Finalize order: registry-capable in processing order, plain last.
    let applies: Vec<&String> = events.iter().filter(|e| e.starts_with("apply:")).collect();
    assert_eq!(applies, vec!["apply:supplied", "apply:stored", "apply:plain"]);
}

#[test]
fn lifecycle_chain_orders_tiers_and_pins_the_detector_last() {
    let log = log();
    let container = Container::new();
    let store = container.store();

    store
        .register("lc_u", lifecycle_ext_def("lc_u", Order::Unordered, false, &log))
        .unwrap();
    store
        .register("lc_o2", lifecycle_ext_def("lc_o2", Order::Ordered(2), false, &log))
        .unwrap();
    store
        .register("lc_o1", lifecycle_ext_def("lc_o1", Order::Ordered(1), false, &log))
        .unwrap();
    store
        .register("lc_p", lifecycle_ext_def("lc_p", Order::Priority, false, &log))
        .unwrap();
    store
        .register(
            "lc_internal",
            lifecycle_ext_def("lc_internal", Order::Priority, true, &log),
        )
        .unwrap();

    let report = container.run_orchestration().unwrap();

    let chain = container.lifecycle_chain();
    assert_eq!(
        chain,
        vec![
            "early_build_checker",
            "lc_p",
            "lc_o1",
            "lc_o2",
            "lc_u",
            "lc_internal",
            "observer_detector",
        ]
    );
    assert_eq!(chain.last().map(String::as_str), Some("observer_detector"));
    assert_eq!(report.lifecycle_extensions.priority, 2);
    assert_eq!(report.lifecycle_extensions.ordered, 2);
    assert_eq!(report.lifecycle_extensions.unordered, 1);
}

#[test]
fn detector_stays_last_for_any_extension_mix() {
    let log = log();
    let container = Container::new();
    let store = container.store();
    for (name, order) in [
        ("m1", Order::Unordered),
        ("m2", Order::Priority),
        ("m3", Order::Ordered(-4)),
        ("m4", Order::Ordered(12)),
    ] {
        store
            .register(name, lifecycle_ext_def(name, order, false, &log))
            .unwrap();
    }
    container.register_lifecycle_extension(Arc::new(ScriptedLifecycleExt {
        name: "pre_added".into(),
        order: Order::Unordered,
        internal: false,
        log: log.clone(),
    }));

    container.run_orchestration().unwrap();
    assert_eq!(
        container.lifecycle_chain().last().map(String::as_str),
        Some("observer_detector")
    );
}

#[test]
fn ordered_cohort_is_never_partially_visible() {
    let log = log();
    let container = Container::new();
    let store = container.store();

    let ordered = ["cohort_a", "cohort_b", "cohort_c"];
    for (i, name) in ordered.iter().copied().enumerate() {
        store
            .register(
                name,
                lifecycle_ext_def(name, Order::Ordered(i as i32), false, &log),
            )
            .unwrap();
    }

    container.run_orchestration().unwrap();

    // Resolve-all-then-register-all: while the ordered cohort is being
    // built, none of its members may already be in the chain, so no member
    // post-processes another member.
    let in_cohort = |s: &str| ordered.iter().any(|n| *n == s);
    for event in entries(&log) {
        if let Some(rest) = event.strip_prefix("post:") {
            let (by, component) = rest.split_once(':').unwrap();
            assert!(
                !(in_cohort(by) && in_cohort(component)),
                "ordered extension '{by}' observed cohort member '{component}'"
            );
        }
    }
}

#[test]
fn dual_capability_extension_is_counted_in_both_phases() {
    struct DualExt {
        log: Log,
    }

    impl ContainerExtension for DualExt {
        fn name(&self) -> &str {
            "dual"
        }

        fn order(&self) -> Order {
            Order::Priority
        }

        fn apply(&self, _store: &DefinitionStore) -> anyhow::Result<()> {
            self.log.lock().push("apply:dual".into());
            Ok(())
        }

        fn into_registry(self: Arc<Self>) -> Option<Arc<dyn RegistryExtension>> {
            Some(self)
        }
    }

    impl RegistryExtension for DualExt {
        fn mutate(&self, _store: &DefinitionStore) -> anyhow::Result<()> {
            self.log.lock().push("mutate:dual".into());
            Ok(())
        }
    }

    impl LifecycleExtension for DualExt {
        fn name(&self) -> &str {
            "dual"
        }

        fn order(&self) -> Order {
            Order::Priority
        }
    }

    impl Component for DualExt {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }

        fn into_registry_extension(self: Arc<Self>) -> Option<Arc<dyn RegistryExtension>> {
            Some(self)
        }

        fn into_lifecycle_extension(self: Arc<Self>) -> Option<Arc<dyn LifecycleExtension>> {
            Some(self)
        }
    }

    let log = log();
    let container = Container::new();
    let inner = log.clone();
    container
        .store()
        .register(
            "dual",
            ComponentDefinition::of::<DualExt>()
                .with_capabilities(Capabilities::registry().and_lifecycle())
                .with_order(Order::Priority)
                .with_supplier(move |_| Ok(Arc::new(DualExt { log: inner.clone() }) as ComponentHandle)),
        )
        .unwrap();

    let report = container.run_orchestration().unwrap();

    let mutates = entries(&log)
        .iter()
        .filter(|e| *e == "mutate:dual")
        .count();
    assert_eq!(mutates, 1, "mutate step must run exactly once");
    assert_eq!(report.registry_extensions.priority, 1);
    assert_eq!(report.lifecycle_extensions.priority, 1);
    assert!(container.lifecycle_chain().contains(&"dual".to_string()));
}

#[test]
fn early_builds_are_flagged_but_not_fatal() {
    let log = log();
    let container = Container::new();
    let store = container.store();

    store.register("dep", plain_def()).unwrap();
    store
        .register("infra_dep", plain_def().with_role(Role::Infrastructure))
        .unwrap();

    // A lifecycle extension whose supplier resolves other components while
    // the chain is still being assembled.
    let inner = log.clone();
    store
        .register(
            "eager",
            ComponentDefinition::of::<ScriptedLifecycleExt>()
                .with_capabilities(Capabilities::lifecycle())
                .with_order(Order::Ordered(1))
                .with_supplier(move |resolver| {
                    resolver.build("dep")?;
                    resolver.build("infra_dep")?;
                    Ok(Arc::new(ScriptedLifecycleExt {
                        name: "eager".into(),
                        order: Order::Ordered(1),
                        internal: false,
                        log: inner.clone(),
                    }) as ComponentHandle)
                }),
        )
        .unwrap();

    let report = container.run_orchestration().unwrap();

    assert_eq!(report.early_build_warnings.len(), 1);
    assert!(report.early_build_warnings[0].contains("dep"));
    // Infrastructure components are exempt from the diagnostic.
    assert!(!report.early_build_warnings[0].contains("infra_dep"));
}

#[test]
fn name_disappearing_between_query_and_build_is_fatal() {
    let log = log();
    let container = Container::new();
    let store = container.store();

    // Both are queried in the Priority round; p1's supplier misbehaves and
    // unregisters p2 before p2 is built.
    let removal_store = container.store();
    store
        .register(
            "p1",
            ComponentDefinition::of::<ScriptedRegistryExt>()
                .with_capabilities(Capabilities::registry())
                .with_order(Order::Priority)
                .with_supplier({
                    let log = log.clone();
                    move |_| {
                        removal_store.remove("p2");
                        Ok(Arc::new(ScriptedRegistryExt {
                            name: "p1".into(),
                            order: Order::Priority,
                            log: log.clone(),
                            on_mutate: None,
                        }) as ComponentHandle)
                    }
                }),
        )
        .unwrap();
    store
        .register("p2", registry_ext_def("p2", Order::Priority, &log, None))
        .unwrap();

    let err = container.run_orchestration().unwrap_err();
    assert!(matches!(err, ContainerError::NoSuchDefinition(n) if n == "p2"));
}

#[test]
fn capability_lie_is_a_type_mismatch() {
    let container = Container::new();
    container
        .store()
        .register(
            "liar",
            ComponentDefinition::of::<Plain>()
                .with_capabilities(Capabilities::registry())
                .with_supplier(|_| Ok(Arc::new(Plain) as ComponentHandle)),
        )
        .unwrap();

    let err = container.run_orchestration().unwrap_err();
    assert!(matches!(
        err,
        ContainerError::TypeMismatch { name, .. } if name == "liar"
    ));
}

#[test]
fn failing_extension_aborts_the_run_with_identity() {
    let log = log();
    let container = Container::new();
    let store = container.store();

    let boom: MutateFn = Arc::new(|_| anyhow::bail!("boom"));
    store
        .register("bad", registry_ext_def("bad", Order::Priority, &log, Some(boom)))
        .unwrap();
    store
        .register("after", registry_ext_def("after", Order::Unordered, &log, None))
        .unwrap();

    let err = container.run_orchestration().unwrap_err();
    let ContainerError::ExtensionInvocation { extension, source } = err else {
        panic!("expected ExtensionInvocation");
    };
    assert_eq!(extension, "bad");
    assert_eq!(source.to_string(), "boom");
    // No retry, no rollback: the later extension never ran, mutations stay.
    assert!(!entries(&log).contains(&"mutate:after".to_string()));
    assert!(container.lookup("bad").is_some());
}

#[test]
fn report_counts_definitions_and_invocations() {
    let log = log();
    let container = Container::new();
    let store = container.store();

    store.register("svc", plain_def()).unwrap();
    store
        .register("ext", registry_ext_def("ext", Order::Ordered(0), &log, None))
        .unwrap();
    store
        .register("lc", lifecycle_ext_def("lc", Order::Unordered, false, &log))
        .unwrap();

    let report = container.run_orchestration().unwrap();
    assert_eq!(report.definitions_registered, 3);
    assert_eq!(report.registry_extensions.total(), 1);
    assert_eq!(report.container_extensions_applied, 1);
    assert_eq!(report.lifecycle_extensions.total(), 1);
    assert!(report.early_build_warnings.is_empty());

    // The report is serializable for diagnostics sinks.
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["definitions_registered"], 3);
    assert_eq!(json["registry_extensions"]["ordered"], 1);
}

#[test]
fn register_classes_routes_through_the_reader() {
    let container = Container::new();
    container
        .register_classes([AnnotatedClass::of::<Plain>()
            .with_supplier(|_| Ok(Arc::new(Plain) as ComponentHandle))])
        .unwrap();
    assert!(container.lookup("plain").is_some());
}
