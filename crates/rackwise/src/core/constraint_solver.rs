//! Ordered filter chain shrinking "every candidate at this level" to
//! "candidates satisfying every applicable constraint for this node".

use log::{debug, error, warn};

use crate::core::app::App;
use crate::core::avail_resources::AvailResources;
use crate::core::filter::Filter;
use crate::core::filters::affinity::AffinityFilter;
use crate::core::filters::aggregate::AggregateInstanceExtraSpecsFilter;
use crate::core::filters::az::AvailabilityZoneFilter;
use crate::core::filters::cpu::CpuFilter;
use crate::core::filters::disk::DiskFilter;
use crate::core::filters::diversity::DiversityFilter;
use crate::core::filters::dynamic_aggregate::DynamicAggregateFilter;
use crate::core::filters::exclusivity::ExclusivityFilter;
use crate::core::filters::mem::MemFilter;
use crate::core::filters::no_exclusivity::NoExclusivityFilter;
use crate::core::filters::numa::NumaFilter;
use crate::core::filters::quorum_diversity::QuorumDiversityFilter;
use crate::core::node::NodeId;
use crate::core::snapshot::PlacementState;

pub struct ConstraintSolver {
    filters: Vec<Box<dyn Filter>>,

    pub status: String,
}

impl ConstraintSolver {
    /// Composes the filter order: platform filters first, grouping filters
    /// next, and the lazy host-type resolution last.
    pub fn new() -> Self {
        let filters: Vec<Box<dyn Filter>> = vec![
            Box::new(AvailabilityZoneFilter::new()),
            Box::new(AggregateInstanceExtraSpecsFilter::new()),
            Box::new(CpuFilter::new()),
            Box::new(MemFilter::new()),
            Box::new(DiskFilter::new()),
            Box::new(NumaFilter::new()),
            Box::new(DiversityFilter::new()),
            Box::new(QuorumDiversityFilter::new()),
            Box::new(ExclusivityFilter::new()),
            Box::new(NoExclusivityFilter::new()),
            Box::new(AffinityFilter::new()),
            Box::new(DynamicAggregateFilter::new()),
        ];

        Self {
            filters,
            status: "ok".to_string(),
        }
    }

    /// Runs the chain over the scope's candidates. Returns the surviving
    /// candidates, or an empty list with `status` describing the failure.
    pub fn get_candidate_list(
        &mut self,
        node: NodeId,
        avail_resources: &AvailResources,
        app: &App,
        state: &mut PlacementState,
    ) -> Vec<String> {
        let level = avail_resources.level;
        let vid = app.nodes[node].vid().to_string();

        let mut candidate_list = avail_resources.candidates.clone();

        // The placeholder representing an intentionally unresolved rack.
        let ghost_candidate = candidate_list
            .iter()
            .find(|c| state.hosts[*c].resource_name(level) == "any")
            .cloned();

        if candidate_list.is_empty() {
            self.status = format!("no candidate for node = {}", vid);
            warn!("{}", self.status);
            return Vec::new();
        }

        for i in 0..self.filters.len() {
            let f = &mut self.filters[i];
            f.init_condition();

            if !f.check_pre_condition(level, node, app, state) {
                if let Some(s) = f.status() {
                    self.status = s.to_string();
                    error!("{}", self.status);
                    return Vec::new();
                }
                debug!("skip {} constraint for node = {}", f.name(), vid);
                continue;
            }

            candidate_list = f.filter_candidates(level, node, app, state, &candidate_list);

            // The placeholder survives every filter pass.
            if let Some(ghost) = &ghost_candidate {
                if !candidate_list.contains(ghost) {
                    candidate_list.push(ghost.clone());
                }
            }

            if candidate_list.is_empty() {
                self.status = format!("violate {} {} constraint for node = {}", level, f.name(), vid);
                if let Some(s) = f.status() {
                    self.status += &format!(" detail: {}", s);
                }
                debug!("{}", self.status);
                return Vec::new();
            }

            debug!(
                "pass {} constraint for node = {} with {}",
                f.name(),
                vid,
                candidate_list.len()
            );
        }

        candidate_list
    }
}

impl Default for ConstraintSolver {
    fn default() -> Self {
        Self::new()
    }
}
