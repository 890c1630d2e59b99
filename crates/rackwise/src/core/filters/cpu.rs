use crate::core::app::App;
use crate::core::common::Level;
use crate::core::filter::Filter;
use crate::core::node::NodeId;
use crate::core::snapshot::{HostResource, PlacementState};

pub struct CpuFilter {
    status: Option<String>,
}

impl CpuFilter {
    pub fn new() -> Self {
        Self { status: None }
    }
}

impl Default for CpuFilter {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn check_candidate(level: Level, demand: i64, candidate: &HostResource) -> bool {
    candidate.vcpus(level) >= demand
}

impl Filter for CpuFilter {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn init_condition(&mut self) {
        self.status = None;
    }

    fn check_pre_condition(
        &mut self,
        _level: Level,
        _node: NodeId,
        _app: &App,
        _state: &PlacementState,
    ) -> bool {
        true
    }

    fn filter_candidates(
        &mut self,
        level: Level,
        node: NodeId,
        app: &App,
        state: &mut PlacementState,
        candidates: &[String],
    ) -> Vec<String> {
        let demand = app.nodes[node].vcpus();
        candidates
            .iter()
            .filter(|c| check_candidate(level, demand, &state.hosts[*c]))
            .cloned()
            .collect()
    }

    fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}
