//! Extension registry — the externally supplied bootstrap extensions and the
//! active lifecycle chain instances are routed through during builds.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::contracts::{ContainerExtension, ContainerObserver, LifecycleExtension};

#[derive(Default)]
pub struct ExtensionRegistry {
    supplied: RwLock<Vec<Arc<dyn ContainerExtension>>>,
    chain: RwLock<Vec<Arc<dyn LifecycleExtension>>>,
    /// How many lifecycle extensions the current orchestration run expects to
    /// end up in the chain. Diagnostic input for the early-build checker.
    expected: AtomicUsize,
    warnings: Mutex<Vec<String>>,
}

impl ExtensionRegistry {
    /// Queue an externally supplied extension. These run before any
    /// store-discovered extension in the registry phase.
    pub fn register_extension(&self, extension: Arc<dyn ContainerExtension>) {
        self.supplied.write().push(extension);
    }

    pub fn supplied(&self) -> Vec<Arc<dyn ContainerExtension>> {
        self.supplied.read().clone()
    }

    /// Append a lifecycle extension to the active chain. Re-registering an
    /// extension with the same name moves it to the end of the chain.
    pub fn register_lifecycle(&self, extension: Arc<dyn LifecycleExtension>) {
        let mut chain = self.chain.write();
        chain.retain(|existing| existing.name() != extension.name());
        chain.push(extension);
    }

    /// Snapshot of the active chain, in invocation order.
    pub fn chain(&self) -> Vec<Arc<dyn LifecycleExtension>> {
        self.chain.read().clone()
    }

    pub fn chain_names(&self) -> Vec<String> {
        self.chain
            .read()
            .iter()
            .map(|e| e.name().to_string())
            .collect()
    }

    pub fn chain_len(&self) -> usize {
        self.chain.read().len()
    }

    pub fn set_expected(&self, expected: usize) {
        self.expected.store(expected, Ordering::Relaxed);
    }

    pub fn expected(&self) -> usize {
        self.expected.load(Ordering::Relaxed)
    }

    pub fn record_warning(&self, warning: String) {
        self.warnings.lock().push(warning);
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().clone()
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("supplied_count", &self.supplied.read().len())
            .field("chain", &self.chain_names())
            .field("expected", &self.expected())
            .finish()
    }
}

/// Components detected as observers during the lifecycle phase. The container
/// notifies them once the caller declares wiring complete.
#[derive(Default)]
pub struct ObserverRegistry {
    inner: RwLock<Vec<(String, Arc<dyn ContainerObserver>)>>,
}

impl ObserverRegistry {
    pub fn record(&self, name: impl Into<String>, observer: Arc<dyn ContainerObserver>) {
        let name = name.into();
        let mut inner = self.inner.write();
        inner.retain(|(existing, _)| *existing != name);
        inner.push((name, observer));
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.read().iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn notify_ready(&self) {
        for (name, observer) in self.inner.read().iter() {
            tracing::debug!(observer = %name, "Notifying container observer");
            observer.container_ready();
        }
    }
}
