//! Diversity (anti-affinity) constraint.

use crate::core::app::App;
use crate::core::common::{GroupType, Level};
use crate::core::filter::Filter;
use crate::core::node::NodeId;
use crate::core::snapshot::{HostResource, PlacementState};

pub struct DiversityFilter {
    diversity_rule_list: Vec<String>,
    status: Option<String>,
}

impl DiversityFilter {
    pub fn new() -> Self {
        Self {
            diversity_rule_list: Vec::new(),
            status: None,
        }
    }

    /// Rejects a candidate already hosting another member of one of the
    /// node's diversity rules at this level.
    fn check_candidate(&self, level: Level, candidate: &HostResource) -> bool {
        let memberships = candidate.memberships(level);
        for rule_id in &self.diversity_rule_list {
            for (gk, gt) in memberships {
                if *gt == GroupType::Diversity && gk == rule_id {
                    return false;
                }
            }
        }
        true
    }
}

impl Default for DiversityFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for DiversityFilter {
    fn name(&self) -> &'static str {
        "diversity"
    }

    fn init_condition(&mut self) {
        self.diversity_rule_list.clear();
        self.status = None;
    }

    fn check_pre_condition(
        &mut self,
        level: Level,
        node: NodeId,
        app: &App,
        _state: &PlacementState,
    ) -> bool {
        for rk in app.nodes[node].diversity_groups() {
            if app.rules.get(rk).map(|r| r.level) == Some(level) {
                self.diversity_rule_list.push(rk.clone());
            }
        }
        !self.diversity_rule_list.is_empty()
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
            .filter(|c| self.check_candidate(level, &state.hosts[*c]))
            .cloned()
            .collect()
    }

    fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}
