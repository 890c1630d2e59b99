//! Host-aggregate extra-specs constraint.

use indexmap::IndexMap;

use crate::core::app::App;
use crate::core::common::Level;
use crate::core::filter::Filter;
use crate::core::filters::az::host_type_undetermined;
use crate::core::filters::utils;
use crate::core::node::NodeId;
use crate::core::snapshot::{HostResource, PlacementState};

const SCOPE: &str = "aggregate_instance_extra_specs";

pub struct AggregateInstanceExtraSpecsFilter {
    status: Option<String>,
}

impl AggregateInstanceExtraSpecsFilter {
    pub fn new() -> Self {
        Self { status: None }
    }
}

impl Default for AggregateInstanceExtraSpecsFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// True if every extra-specs map of the node is satisfied by some
/// aggregate the candidate belongs to at this level.
pub(crate) fn check_candidate(
    level: Level,
    node: NodeId,
    app: &App,
    candidate: &HostResource,
    state: &PlacementState,
) -> bool {
    // Candidates whose host type is undetermined are resolved later by the
    // dynamic-aggregate filter.
    if host_type_undetermined(level, candidate, state) {
        return true;
    }

    let metadatas = utils::aggregate_metadata_by_host(level, candidate, state);

    for extra_specs in app.nodes[node].extra_specs_list() {
        if !metadatas
            .values()
            .any(|metadata| match_metadata(extra_specs, metadata))
        {
            return false;
        }
    }
    true
}

fn match_metadata(
    extra_specs: &IndexMap<String, String>,
    metadata: &IndexMap<String, indexmap::IndexSet<String>>,
) -> bool {
    for (key, req) in extra_specs {
        // Keys scoped to another namespace are not aggregate requirements.
        let key = match key.split_once(':') {
            Some((scope, rest)) => {
                if scope != SCOPE {
                    continue;
                }
                rest
            }
            None => key.as_str(),
        };

        let Some(aggregate_vals) = metadata.get(key) else {
            return false;
        };
        if !aggregate_vals
            .iter()
            .any(|v| utils::match_extra_spec(v, req))
        {
            return false;
        }
    }
    true
}

impl Filter for AggregateInstanceExtraSpecsFilter {
    fn name(&self) -> &'static str {
        "aggregate-instance-extra-specs"
    }

    fn init_condition(&mut self) {
        self.status = None;
    }

    fn check_pre_condition(
        &mut self,
        _level: Level,
        node: NodeId,
        app: &App,
        _state: &PlacementState,
    ) -> bool {
        !app.nodes[node].extra_specs_list().is_empty()
    }

    fn filter_candidates(
        &mut self,
        level: Level,
        node: NodeId,
        app: &App,
        state: &mut PlacementState,
        candidates: &[String],
    ) -> Vec<String> {
        candidates
            .iter()
            .filter(|c| check_candidate(level, node, app, &state.hosts[*c], state))
            .cloned()
            .collect()
    }

    fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}
