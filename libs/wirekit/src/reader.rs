//! Definition reader — turns annotated class descriptors into registered
//! definitions, consulting the condition gate, scope resolver and name
//! generator along the way.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::contracts::{
    Component, ConditionGate, InstanceBuilder, NameGenerator, ScopeResolver,
};
use crate::definition::{
    Capabilities, ComponentDefinition, ComponentHandle, ComponentSupplier, Qualifier, Role, Scope,
};
use crate::errors::ContainerError;
use crate::ordering::Order;
use crate::store::DefinitionStore;

/// External descriptor of one annotated/decorated class: the raw metadata the
/// reader resolves into a `ComponentDefinition`.
pub struct AnnotatedClass {
    pub type_name: &'static str,
    pub type_id: TypeId,
    /// Declared scope; `None` falls back to singleton.
    pub scope: Option<Scope>,
    pub primary: bool,
    pub lazy: bool,
    pub role: Role,
    pub qualifiers: Vec<String>,
    /// Free-form metadata evaluated by the condition gate.
    pub attributes: HashMap<String, String>,
    pub capabilities: Capabilities,
    pub order: Order,
    pub supplier: Option<ComponentSupplier>,
}

impl AnnotatedClass {
    pub fn of<T: Component>() -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
            scope: None,
            primary: false,
            lazy: false,
            role: Role::default(),
            qualifiers: Vec::new(),
            attributes: HashMap::new(),
            capabilities: Capabilities::default(),
            order: Order::default(),
            supplier: None,
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_primary(mut self, primary: bool) -> Self {
        self.primary = primary;
        self
    }

    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifiers.push(qualifier.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn with_supplier(
        mut self,
        supplier: impl Fn(&dyn InstanceBuilder) -> anyhow::Result<ComponentHandle>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.supplier = Some(Arc::new(supplier));
        self
    }
}

impl std::fmt::Debug for AnnotatedClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotatedClass")
            .field("type_name", &self.type_name)
            .field("scope", &self.scope)
            .field("role", &self.role)
            .field("qualifiers", &self.qualifiers)
            .field("capabilities", &self.capabilities)
            .field("order", &self.order)
            .field("has_supplier", &self.supplier.is_some())
            .finish()
    }
}

/// Late hook that can adjust the draft definition before registration.
pub type DefinitionCustomizer = Box<dyn Fn(&mut ComponentDefinition) + Send + Sync>;

#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    Registered(String),
    /// The condition gate vetoed the registration; nothing was stored.
    Skipped,
}

pub struct DefinitionReader {
    store: Arc<DefinitionStore>,
    gate: Arc<dyn ConditionGate>,
    names: Arc<dyn NameGenerator>,
    scopes: Arc<dyn ScopeResolver>,
}

impl DefinitionReader {
    pub fn new(store: Arc<DefinitionStore>) -> Self {
        Self {
            store,
            gate: Arc::new(AlwaysAdmit),
            names: Arc::new(DefaultNameGenerator),
            scopes: Arc::new(PassthroughScopeResolver),
        }
    }

    pub fn with_condition_gate(mut self, gate: Arc<dyn ConditionGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_name_generator(mut self, names: Arc<dyn NameGenerator>) -> Self {
        self.names = names;
        self
    }

    pub fn with_scope_resolver(mut self, scopes: Arc<dyn ScopeResolver>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn read(&self, class: AnnotatedClass) -> Result<ReadOutcome, ContainerError> {
        self.read_with(class, None, &[], &[])
    }

    /// Resolve a class descriptor into a definition and register it.
    ///
    /// Idempotent for identical input: the generated name is deterministic,
    /// so a second read overwrites instead of duplicating.
    pub fn read_with(
        &self,
        class: AnnotatedClass,
        explicit_name: Option<&str>,
        qualifiers: &[Qualifier],
        customizers: &[DefinitionCustomizer],
    ) -> Result<ReadOutcome, ContainerError> {
        if self.gate.should_skip(&class) {
            tracing::debug!(class = class.type_name, "Skipping registration (condition gate)");
            return Ok(ReadOutcome::Skipped);
        }

        let mut definition = ComponentDefinition {
            name: String::new(),
            type_name: class.type_name,
            type_id: class.type_id,
            scope: class.scope.unwrap_or_default(),
            primary: class.primary,
            lazy: class.lazy,
            role: class.role,
            qualifiers: class.qualifiers.into_iter().collect(),
            capabilities: class.capabilities,
            order: class.order,
            supplier: class.supplier,
        };

        let name = match explicit_name {
            Some(name) => name.to_string(),
            None => self.names.generate(&definition, &self.store),
        };

        for qualifier in qualifiers {
            match qualifier {
                Qualifier::Primary => definition.primary = true,
                Qualifier::Lazy => definition.lazy = true,
                Qualifier::Marker(marker) => {
                    definition.qualifiers.insert(marker.clone());
                }
            }
        }

        for customizer in customizers {
            customizer(&mut definition);
        }

        let scope = definition.scope.clone();
        let definition = self.scopes.resolve(&scope, definition);

        tracing::debug!(definition = %name, class = class.type_name, "Registering definition");
        self.store.register(name.clone(), definition)?;
        Ok(ReadOutcome::Registered(name))
    }
}

/// Default gate: nothing is skipped.
pub struct AlwaysAdmit;

impl ConditionGate for AlwaysAdmit {
    fn should_skip(&self, _class: &AnnotatedClass) -> bool {
        false
    }
}

/// Default name generator: short type name with the first character
/// lowercased. Deterministic for identical descriptor content.
pub struct DefaultNameGenerator;

impl NameGenerator for DefaultNameGenerator {
    fn generate(&self, definition: &ComponentDefinition, _store: &DefinitionStore) -> String {
        decapitalize(short_type_name(definition.type_name))
    }
}

/// Default scope resolution: no proxying, descriptor passes through.
pub struct PassthroughScopeResolver;

impl ScopeResolver for PassthroughScopeResolver {
    fn resolve(&self, _scope: &Scope, definition: ComponentDefinition) -> ComponentDefinition {
        definition
    }
}

fn short_type_name(path: &str) -> &str {
    let base = path.split('<').next().unwrap_or(path);
    base.rsplit("::").next().unwrap_or(base)
}

fn decapitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
