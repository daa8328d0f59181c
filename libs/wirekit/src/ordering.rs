//! Ordering tiers and the within-tier comparator for bootstrap extensions.
//!
//! Every extension is classified into exactly one tier at registration time:
//! Priority members run before any Ordered member, Ordered before any
//! Unordered member. The integer sort key only matters inside the Ordered
//! tier; everything else keeps its discovery order.

/// Sort key assigned to extensions that declare no explicit key.
///
/// Keeps them after every keyed extension while the stable sort preserves
/// their discovery order among each other.
pub const DEFAULT_PRECEDENCE: i32 = i32::MAX;

/// Ordering declared by an extension (or recorded on its definition).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Order {
    /// Runs before every Ordered and Unordered extension.
    Priority,
    /// Runs after Priority, sorted ascending by the carried key.
    Ordered(i32),
    /// Runs last, in discovery order.
    #[default]
    Unordered,
}

/// The tier an extension was classified into. Assigned once, never mutated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OrderingTier {
    Priority,
    Ordered,
    Unordered,
}

impl Order {
    /// Classify this declaration into its tier. Pure function.
    pub fn tier(self) -> OrderingTier {
        match self {
            Order::Priority => OrderingTier::Priority,
            Order::Ordered(_) => OrderingTier::Ordered,
            Order::Unordered => OrderingTier::Unordered,
        }
    }

    /// The key used by the within-tier comparator.
    pub fn sort_key(self) -> i32 {
        match self {
            Order::Ordered(key) => key,
            Order::Priority | Order::Unordered => DEFAULT_PRECEDENCE,
        }
    }
}

/// Sort a batch of classified extensions by their declared key, ascending.
///
/// The sort is stable: ties keep their discovery order, so re-sorting the
/// same input never reorders ties differently across runs.
pub fn sort_by_declared_key<T>(items: &mut [T], order_of: impl Fn(&T) -> Order) {
    items.sort_by_key(|item| order_of(item).sort_key());
}
