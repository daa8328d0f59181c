//! Shared helpers for in-crate tests.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::contracts::{Component, InstanceBuilder};
use crate::definition::ComponentHandle;

/// Minimal component with no capabilities.
pub struct Plain;

impl Component for Plain {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Supplier producing a fresh `Plain` per call, plus its invocation counter.
pub fn counter() -> (
    Arc<AtomicUsize>,
    impl Fn(&dyn InstanceBuilder) -> anyhow::Result<ComponentHandle> + Send + Sync + 'static,
) {
    let count = Arc::new(AtomicUsize::new(0));
    let inner = count.clone();
    let supplier = move |_: &dyn InstanceBuilder| {
        inner.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(Plain) as ComponentHandle)
    };
    (count, supplier)
}
