//! Flight Module
//!
//! Per-key deduplication of concurrent producer executions.

mod call;
mod coordinator;

pub use coordinator::Coordinator;

// == Outcome ==
/// Successful result of a deduplicated call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome<V> {
    /// The produced (or cached) value
    pub value: V,
    /// Whether the value was handed to more than one caller
    pub shared: bool,
}
