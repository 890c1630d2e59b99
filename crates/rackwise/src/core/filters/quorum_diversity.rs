//! Quorum-diversity constraint: strict diversity while possible, bounded
//! majority per host or rack otherwise.

use crate::core::app::App;
use crate::core::common::{GroupType, Level};
use crate::core::filter::Filter;
use crate::core::node::NodeId;
use crate::core::snapshot::{HostResource, PlacementState};

pub struct QuorumDiversityFilter {
    quorum_rule_list: Vec<String>,
    status: Option<String>,
}

impl QuorumDiversityFilter {
    pub fn new() -> Self {
        Self {
            quorum_rule_list: Vec::new(),
            status: None,
        }
    }

    fn check_diversity_candidate(&self, level: Level, candidate: &HostResource) -> bool {
        let memberships = candidate.memberships(level);
        for rule_id in &self.quorum_rule_list {
            for (gk, gt) in memberships {
                if *gt == GroupType::QuorumDiversity && gk == rule_id {
                    return false;
                }
            }
        }
        true
    }

    fn check_quorum_candidate(
        &self,
        level: Level,
        candidate: &HostResource,
        app: &App,
        state: &PlacementState,
    ) -> bool {
        let memberships = candidate.memberships(level);
        let hk = candidate.resource_name(level);

        for rule_id in &self.quorum_rule_list {
            // Members requested under this rule.
            let mut total_num_of_servers = app
                .rules
                .get(rule_id)
                .map(|r| r.members.len() as i64)
                .unwrap_or(0);

            let mut placed_in_candidate: i64 = -1;

            for (gk, gt) in memberships {
                if *gt == GroupType::QuorumDiversity && gk == rule_id {
                    if let Some(gr) = state.groups.get(gk) {
                        total_num_of_servers += gr.original_num_of_placed_servers as i64;
                        if let Some(count) = gr.num_of_placed_servers_of_host.get(hk) {
                            placed_in_candidate = *count as i64;
                        }
                    }
                    break;
                }
            }

            let quorum = (total_num_of_servers as f64 / 2.0 - 1.0).ceil().max(1.0);

            if placed_in_candidate as f64 >= quorum {
                return false;
            }
        }
        true
    }
}

impl Default for QuorumDiversityFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for QuorumDiversityFilter {
    fn name(&self) -> &'static str {
        "quorum-diversity"
    }

    fn init_condition(&mut self) {
        self.quorum_rule_list.clear();
        self.status = None;
    }

    fn check_pre_condition(
        &mut self,
        level: Level,
        node: NodeId,
        app: &App,
        _state: &PlacementState,
    ) -> bool {
        for rk in app.nodes[node].quorum_diversity_groups() {
            if app.rules.get(rk).map(|r| r.level) == Some(level) {
                self.quorum_rule_list.push(rk.clone());
            }
        }
        !self.quorum_rule_list.is_empty()
    }

    fn filter_candidates(
        &mut self,
        level: Level,
        _node: NodeId,
        app: &App,
        state: &mut PlacementState,
        candidates: &[String],
    ) -> Vec<String> {
        // First, try the strict diversity rule.
        let diverse: Vec<String> = candidates
            .iter()
            .filter(|c| self.check_diversity_candidate(level, &state.hosts[*c]))
            .cloned()
            .collect();
        if !diverse.is_empty() {
            return diverse;
        }

        // No strictly diverse hosts left; fall back to the quorum bound.
        candidates
            .iter()
            .filter(|c| self.check_quorum_candidate(level, &state.hosts[*c], app, state))
            .cloned()
            .collect()
    }

    fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}
