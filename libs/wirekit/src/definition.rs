//! Registration descriptors and the capability metadata recorded on them.

use std::any::TypeId;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::contracts::{Component, InstanceBuilder};
use crate::ordering::Order;

/// Shared handle to a built component instance.
pub type ComponentHandle = Arc<dyn Component>;

/// Closure that produces an instance for a definition. It receives the
/// instance builder so it can resolve its own dependencies by name.
pub type ComponentSupplier =
    Arc<dyn Fn(&dyn InstanceBuilder) -> anyhow::Result<ComponentHandle> + Send + Sync>;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Scope {
    #[default]
    Singleton,
    Prototype,
    Custom(String),
}

/// Infrastructure entries are excluded from the built-too-early diagnostic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Role {
    #[default]
    Application,
    Infrastructure,
}

/// Qualifier markers handed to the definition reader. `Primary` and `Lazy`
/// flip the corresponding flags; any other marker is recorded on the
/// definition for disambiguation, never dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Qualifier {
    Primary,
    Lazy,
    Marker(String),
}

/// A single capability a definition can be queried by.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    /// Plain finalize-only bootstrap extension.
    Container,
    /// May register further definitions during the registry phase.
    Registry,
    /// Observes instances as they become usable.
    Lifecycle,
}

/// Capability set assigned to a definition at registration time.
///
/// Registry capability implies container capability: every registry-capable
/// extension is also applied once as a plain container extension.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub container: bool,
    pub registry: bool,
    pub lifecycle: bool,
}

impl Capabilities {
    pub fn container() -> Self {
        Self {
            container: true,
            ..Self::default()
        }
    }

    pub fn registry() -> Self {
        Self {
            container: true,
            registry: true,
            lifecycle: false,
        }
    }

    pub fn lifecycle() -> Self {
        Self {
            lifecycle: true,
            ..Self::default()
        }
    }

    pub fn and_lifecycle(mut self) -> Self {
        self.lifecycle = true;
        self
    }

    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::Container => self.container || self.registry,
            Capability::Registry => self.registry,
            Capability::Lifecycle => self.lifecycle,
        }
    }
}

/// Metadata describing one component to be built.
///
/// The name is immutable once registered; re-registering under the same name
/// replaces the whole descriptor (last-write-wins), never merges.
#[derive(Clone)]
pub struct ComponentDefinition {
    pub name: String,
    pub type_name: &'static str,
    pub type_id: TypeId,
    pub scope: Scope,
    pub primary: bool,
    pub lazy: bool,
    pub role: Role,
    pub qualifiers: BTreeSet<String>,
    pub capabilities: Capabilities,
    pub order: Order,
    pub supplier: Option<ComponentSupplier>,
}

impl ComponentDefinition {
    /// Draft descriptor for a concrete component type. The name is assigned
    /// by the store when the definition is registered.
    pub fn of<T: Component>() -> Self {
        Self {
            name: String::new(),
            type_name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
            scope: Scope::default(),
            primary: false,
            lazy: false,
            role: Role::default(),
            qualifiers: BTreeSet::new(),
            capabilities: Capabilities::default(),
            order: Order::default(),
            supplier: None,
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
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

    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifiers.insert(qualifier.into());
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

impl std::fmt::Debug for ComponentDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentDefinition")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("scope", &self.scope)
            .field("primary", &self.primary)
            .field("lazy", &self.lazy)
            .field("role", &self.role)
            .field("qualifiers", &self.qualifiers)
            .field("capabilities", &self.capabilities)
            .field("order", &self.order)
            .field("has_supplier", &self.supplier.is_some())
            .finish()
    }
}
