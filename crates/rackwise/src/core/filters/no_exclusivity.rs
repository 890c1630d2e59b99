//! Keeps nodes without an exclusivity id off exclusively reserved hosts.

use crate::core::app::App;
use crate::core::common::{GroupType, Level};
use crate::core::filter::Filter;
use crate::core::node::NodeId;
use crate::core::snapshot::{HostResource, PlacementState};

pub struct NoExclusivityFilter {
    status: Option<String>,
}

impl NoExclusivityFilter {
    pub fn new() -> Self {
        Self { status: None }
    }

    fn check_candidate(
        &self,
        level: Level,
        candidate: &HostResource,
        state: &PlacementState,
    ) -> bool {
        for (gk, gt) in candidate.memberships(level) {
            if *gt == GroupType::Exclusivity
                && state.groups.get(gk).map(|g| g.level) == Some(level)
            {
                return false;
            }
        }
        true
    }
}

impl Default for NoExclusivityFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for NoExclusivityFilter {
    fn name(&self) -> &'static str {
        "no-exclusivity"
    }

    fn init_condition(&mut self) {
        self.status = None;
    }

    fn check_pre_condition(
        &mut self,
        level: Level,
        node: NodeId,
        app: &App,
        _state: &PlacementState,
    ) -> bool {
        app.exclusivities_at(node, level).is_empty()
    }

    fn filter_candidates(
        &mut self,
        level: Level,
        _node: NodeId,
        _app: &App,
        state: &mut PlacementState,
        candidates: &[String],
    ) -> Vec<String> {
        candidates
            .iter()
            .filter(|c| self.check_candidate(level, &state.hosts[*c], state))
            .cloned()
            .collect()
    }

    fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}
