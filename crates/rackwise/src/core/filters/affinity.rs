//! Affinity constraint: members of one affinity group share a host or rack.

use crate::core::app::App;
use crate::core::common::{GroupType, Level};
use crate::core::filter::Filter;
use crate::core::node::NodeId;
use crate::core::snapshot::{HostResource, PlacementState};

pub struct AffinityFilter {
    affinity_id: Option<String>,
    is_first: bool,
    status: Option<String>,
}

impl AffinityFilter {
    pub fn new() -> Self {
        Self {
            affinity_id: None,
            is_first: true,
            status: None,
        }
    }

    fn check_candidate(&self, level: Level, candidate: &HostResource) -> bool {
        let id = self.affinity_id.as_deref();
        candidate
            .all_memberships(level)
            .iter()
            .any(|(gk, gt)| *gt == GroupType::Affinity && Some(gk.as_str()) == id)
    }
}

impl Default for AffinityFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for AffinityFilter {
    fn name(&self) -> &'static str {
        "affinity"
    }

    fn init_condition(&mut self) {
        self.affinity_id = None;
        self.is_first = true;
        self.status = None;
    }

    fn check_pre_condition(
        &mut self,
        _level: Level,
        node: NodeId,
        app: &App,
        state: &PlacementState,
    ) -> bool {
        if let Some(g) = app.nodes[node].as_group() {
            self.affinity_id = Some(g.vid.clone());
            if state.groups.contains_key(&g.vid) {
                self.is_first = false;
            }
        }
        self.affinity_id.is_some()
    }

    fn filter_candidates(
        &mut self,
        level: Level,
        _node: NodeId,
        _app: &App,
        state: &mut PlacementState,
        candidates: &[String],
    ) -> Vec<String> {
        // The first member of the group is unconstrained.
        if self.is_first {
            return candidates.to_vec();
        }

        candidates
            .iter()
            .filter(|c| self.check_candidate(level, &state.hosts[*c]))
            .cloned()
            .collect()
    }

    fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}
