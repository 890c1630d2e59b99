//! NUMA alignment constraint.

use crate::core::app::App;
use crate::core::common::Level;
use crate::core::filter::Filter;
use crate::core::node::NodeId;
use crate::core::snapshot::{HostResource, PlacementState};

pub struct NumaFilter {
    status: Option<String>,
}

impl NumaFilter {
    pub fn new() -> Self {
        Self { status: None }
    }
}

impl Default for NumaFilter {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn check_candidate(vcpus: i64, mem: i64, candidate: &HostResource) -> bool {
    candidate.numa.has_enough_resources(vcpus, mem)
}

impl Filter for NumaFilter {
    fn name(&self) -> &'static str {
        "numa"
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
        level == Level::Host
            && app.nodes[node].is_server()
            && app.nodes[node].need_numa_alignment()
    }

    fn filter_candidates(
        &mut self,
        _level: Level,
        node: NodeId,
        app: &App,
        state: &mut PlacementState,
        candidates: &[String],
    ) -> Vec<String> {
        let n = &app.nodes[node];
        let (vcpus, mem) = (n.vcpus(), n.mem());
        candidates
            .iter()
            .filter(|c| check_candidate(vcpus, mem, &state.hosts[*c]))
            .cloned()
            .collect()
    }

    fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}
