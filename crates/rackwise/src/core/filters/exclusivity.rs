//! Exclusivity constraint: a host or rack serves a single exclusivity id.

use crate::core::app::App;
use crate::core::common::{GroupType, Level};
use crate::core::filter::Filter;
use crate::core::node::NodeId;
use crate::core::snapshot::{HostResource, PlacementState};

pub struct ExclusivityFilter {
    exclusivity_id: Option<String>,
    status: Option<String>,
}

impl ExclusivityFilter {
    pub fn new() -> Self {
        Self {
            exclusivity_id: None,
            status: None,
        }
    }

    fn check_exclusive_candidate(&self, level: Level, candidate: &HostResource) -> bool {
        let id = self.exclusivity_id.as_deref();
        candidate
            .memberships(level)
            .iter()
            .any(|(gk, gt)| *gt == GroupType::Exclusivity && Some(gk.as_str()) == id)
    }

    fn check_empty(&self, level: Level, candidate: &HostResource) -> bool {
        candidate.num_of_placed_servers(level) == 0
    }
}

impl Default for ExclusivityFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for ExclusivityFilter {
    fn name(&self) -> &'static str {
        "exclusivity"
    }

    fn init_condition(&mut self) {
        self.exclusivity_id = None;
        self.status = None;
    }

    fn check_pre_condition(
        &mut self,
        level: Level,
        node: NodeId,
        app: &App,
        _state: &PlacementState,
    ) -> bool {
        let exclusivities = app.exclusivities_at(node, level);

        if exclusivities.len() > 1 {
            self.status = Some(format!(
                "multiple exclusivities for node = {}",
                app.nodes[node].vid()
            ));
            return false;
        }

        if let Some((id, rule_level)) = exclusivities.into_iter().next() {
            if rule_level == level {
                self.exclusivity_id = Some(id);
            }
        }

        self.exclusivity_id.is_some()
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
            .filter(|c| {
                let host = &state.hosts[*c];
                self.check_exclusive_candidate(level, host) || self.check_empty(level, host)
            })
            .cloned()
            .collect()
    }

    fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}
