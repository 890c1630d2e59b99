//! Contract every constraint filter follows.

use crate::core::app::App;
use crate::core::common::Level;
use crate::core::node::NodeId;
use crate::core::snapshot::PlacementState;

/// A single-purpose candidate-list reducer.
///
/// `filter_candidates` must return a subset of its input. A filter whose
/// precondition does not hold leaves the list untouched; one that reports a
/// status signals an unrecoverable condition for the node being placed.
pub trait Filter {
    fn name(&self) -> &'static str;

    /// Clears per-node state before a new solve.
    fn init_condition(&mut self);

    /// Decides whether this filter applies to the node at this level, and
    /// caches whatever the candidate checks need.
    fn check_pre_condition(
        &mut self,
        level: Level,
        node: NodeId,
        app: &App,
        state: &PlacementState,
    ) -> bool;

    /// Narrows the candidate list. Only the dynamic-aggregate filter
    /// actually mutates the snapshot; the rest read it.
    fn filter_candidates(
        &mut self,
        level: Level,
        node: NodeId,
        app: &App,
        state: &mut PlacementState,
        candidates: &[String],
    ) -> Vec<String>;

    /// Unrecoverable condition reported by the last run, if any.
    fn status(&self) -> Option<&str>;
}
