//! Lazy host-type resolution.
//!
//! Some hosts enter the inventory before their hardware profile is known;
//! they carry a set of candidate host types instead of real capacity. This
//! filter prefers already-typed candidates, and otherwise speculatively
//! resolves exactly one undetermined candidate to the default profile of the
//! server's flavor family, re-validates the platform constraints against the
//! resolved capacity, and fully undoes the resolution if any re-check fails.

use log::debug;

use crate::core::app::App;
use crate::core::common::Level;
use crate::core::filter::Filter;
use crate::core::filters::{aggregate, cpu, disk, mem, numa};
use crate::core::node::NodeId;
use crate::core::snapshot::PlacementState;

pub struct DynamicAggregateFilter {
    status: Option<String>,
}

impl DynamicAggregateFilter {
    pub fn new() -> Self {
        Self { status: None }
    }
}

impl Default for DynamicAggregateFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for DynamicAggregateFilter {
    fn name(&self) -> &'static str {
        "dynamic-aggregate"
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
        level == Level::Host && app.nodes[node].is_server()
    }

    fn filter_candidates(
        &mut self,
        level: Level,
        node: NodeId,
        app: &App,
        state: &mut PlacementState,
        candidates: &[String],
    ) -> Vec<String> {
        let mut specified = Vec::new();
        let mut unspecified = Vec::new();
        for c in candidates {
            if state.hosts[c].candidate_host_types.is_empty() {
                specified.push(c.clone());
            } else {
                unspecified.push(c.clone());
            }
        }

        // Prefer hosts whose type is already determined.
        if !specified.is_empty() {
            return specified;
        }

        // Resolve just one undetermined candidate.
        let candidate_key = unspecified[0].clone();

        let flavor_types = app.nodes[node].flavor_types();
        if flavor_types.len() > 1 {
            self.status = Some("have more than one flavor type".to_string());
            return Vec::new();
        }
        let family = match flavor_types.into_iter().next() {
            Some(f) => f,
            None => {
                self.status = Some("no flavor type".to_string());
                return Vec::new();
            }
        };
        if !state.groups.contains_key(&family) {
            self.status = Some(format!("unknown host aggregate ({})", family));
            return Vec::new();
        }

        debug!(
            "resolve host ({}) to flavor family ({})",
            candidate_key, family
        );

        // Swap the candidate's placeholder capacity for the family's
        // default profile, then propagate the rack change to its siblings.
        let (rack_name, rack_cpus, rack_mem, rack_disk) = {
            let host = &mut state.hosts[&candidate_key];
            if !host.adjust_avail_resources(&family) {
                self.status = Some(format!("no host type for aggregate ({})", family));
                return Vec::new();
            }
            (
                host.rack_name.clone(),
                host.rack_avail_vcpus,
                host.rack_avail_mem,
                host.rack_avail_local_disk,
            )
        };
        for (hk, hr) in state.hosts.iter_mut() {
            if hk != &candidate_key && hr.rack_name == rack_name {
                hr.adjust_avail_rack_resources(&family, rack_cpus, rack_mem, rack_disk);
            }
        }
        {
            let host = &mut state.hosts[&candidate_key];
            host.old_candidate_host_types = std::mem::take(&mut host.candidate_host_types);
        }

        // Re-validate the platform constraints against the resolved type.
        {
            let n = &app.nodes[node];
            let host = &state.hosts[&candidate_key];

            if !n.extra_specs_list().is_empty()
                && !aggregate::check_candidate(level, node, app, host, state)
            {
                self.status = Some("host-aggregate violation".to_string());
            }
            if !cpu::check_candidate(level, n.vcpus(), host) {
                self.status = Some("cpu violation".to_string());
            }
            if !mem::check_candidate(level, n.mem(), host) {
                self.status = Some("mem violation".to_string());
            }
            if !disk::check_candidate(level, n.local_volume_size(), host) {
                self.status = Some("disk violation".to_string());
            }
            if n.need_numa_alignment() && !numa::check_candidate(n.vcpus(), n.mem(), host) {
                self.status = Some("numa violation".to_string());
            }
        }

        if self.status.is_none() {
            return vec![candidate_key];
        }

        // A re-check failed; undo the speculative resolution entirely.
        let (rack_cpus, rack_mem, rack_disk) = {
            let host = &mut state.hosts[&candidate_key];
            host.rollback_avail_resources(&family);
            host.candidate_host_types = std::mem::take(&mut host.old_candidate_host_types);
            (
                host.rack_avail_vcpus,
                host.rack_avail_mem,
                host.rack_avail_local_disk,
            )
        };
        for (hk, hr) in state.hosts.iter_mut() {
            if hk != &candidate_key && hr.rack_name == rack_name {
                hr.rollback_avail_rack_resources(&family, rack_cpus, rack_mem, rack_disk);
            }
        }

        Vec::new()
    }

    fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}
