//! Availability-zone constraint.

use crate::core::app::App;
use crate::core::common::Level;
use crate::core::filter::Filter;
use crate::core::filters::utils;
use crate::core::node::{NodeId, PlacementNode};
use crate::core::snapshot::{HostResource, PlacementState};

pub struct AvailabilityZoneFilter {
    az_request_list: Vec<String>,
    status: Option<String>,
}

impl AvailabilityZoneFilter {
    pub fn new() -> Self {
        Self {
            az_request_list: Vec::new(),
            status: None,
        }
    }

    fn check_candidate(
        &self,
        level: Level,
        candidate: &HostResource,
        state: &PlacementState,
    ) -> bool {
        // An undetermined host type carries no zone memberships yet;
        // resolved later by the dynamic-aggregate filter.
        if host_type_undetermined(level, candidate, state) {
            return true;
        }

        let zones = utils::availability_zones_by_host(level, candidate);

        for azr in &self.az_request_list {
            let az_name = azr.split(':').next().unwrap_or(azr);
            if !zones.iter().any(|z| z == az_name) {
                return false;
            }
        }
        true
    }
}

impl Default for AvailabilityZoneFilter {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn host_type_undetermined(
    level: Level,
    candidate: &HostResource,
    state: &PlacementState,
) -> bool {
    if level == Level::Host {
        !candidate.candidate_host_types.is_empty()
    } else {
        state
            .hosts
            .values()
            .any(|rh| rh.rack_name == candidate.rack_name && !rh.candidate_host_types.is_empty())
    }
}

impl Filter for AvailabilityZoneFilter {
    fn name(&self) -> &'static str {
        "az"
    }

    fn init_condition(&mut self) {
        self.az_request_list.clear();
        self.status = None;
    }

    fn check_pre_condition(
        &mut self,
        _level: Level,
        node: NodeId,
        app: &App,
        _state: &PlacementState,
    ) -> bool {
        match &app.nodes[node] {
            PlacementNode::Server(s) => {
                if let Some(az) = &s.availability_zone {
                    self.az_request_list.push(az.clone());
                }
            }
            PlacementNode::Group(g) => {
                self.az_request_list.extend(g.availability_zone_list.iter().cloned());
            }
        }
        !self.az_request_list.is_empty()
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
