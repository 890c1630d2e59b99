//! Per-request working copy of the inventory.
//!
//! A [`PlacementState`] is built fresh from the live [`Resource`] at the
//! start of every placement attempt and discarded afterward. The search
//! mutates only this copy; trial placements become visible to the caller
//! only when the whole request succeeds.

use indexmap::IndexMap;
use log::{debug, warn};

use crate::core::common::{GroupFactory, GroupType, Level};
use crate::core::inventory::{HostType, Resource};
use crate::core::numa::Numa;

/// Search-local view of one resource group, decoupled from the inventory so
/// trial placements never touch committed counts.
#[derive(Clone, Debug)]
pub struct GroupResource {
    pub name: String,
    pub group_type: GroupType,
    pub factory: GroupFactory,
    pub level: Level,

    pub metadata: IndexMap<String, String>,

    /// Placed-server count before this request.
    pub original_num_of_placed_servers: u32,
    /// Running total, including trial placements.
    pub num_of_placed_servers: u32,
    /// Per host or rack name, the count of placed servers.
    pub num_of_placed_servers_of_host: IndexMap<String, u32>,
}

impl GroupResource {
    pub fn new(name: &str, group_type: GroupType, factory: GroupFactory, level: Level) -> Self {
        Self {
            name: name.to_string(),
            group_type,
            factory,
            level,
            metadata: IndexMap::new(),
            original_num_of_placed_servers: 0,
            num_of_placed_servers: 0,
            num_of_placed_servers_of_host: IndexMap::new(),
        }
    }
}

/// Search-local view of one compute host together with its rack aggregates.
#[derive(Clone, Debug)]
pub struct HostResource {
    pub host_name: String,

    /// Group name to group type, for every group mapped to the host.
    pub host_memberships: IndexMap<String, GroupType>,

    pub host_avail_vcpus: i64,
    pub host_avail_mem: i64,
    pub host_avail_local_disk: i64,

    pub numa: Numa,

    pub host_num_of_placed_servers: u32,

    /// Possible hardware profiles while the host's type is undetermined,
    /// keyed by flavor family plus the "mockup" placeholder profile.
    pub candidate_host_types: IndexMap<String, Vec<HostType>>,
    /// Saved profiles for undoing a speculative type resolution.
    pub old_candidate_host_types: IndexMap<String, Vec<HostType>>,

    /// Aggregates added to this host during the search, for exact undo.
    pub new_host_aggregate_list: Vec<String>,

    /// Rack of this host; "any" when the host is rackless.
    pub rack_name: String,

    pub rack_memberships: IndexMap<String, GroupType>,

    pub rack_avail_vcpus: i64,
    pub rack_avail_mem: i64,
    pub rack_avail_local_disk: i64,

    pub rack_num_of_placed_servers: u32,

    pub new_rack_aggregate_list: Vec<String>,

    pub sort_base: f64,
}

impl HostResource {
    pub fn new(host_name: &str) -> Self {
        Self {
            host_name: host_name.to_string(),
            host_memberships: IndexMap::new(),
            host_avail_vcpus: 0,
            host_avail_mem: 0,
            host_avail_local_disk: 0,
            numa: Numa::new(),
            host_num_of_placed_servers: 0,
            candidate_host_types: IndexMap::new(),
            old_candidate_host_types: IndexMap::new(),
            new_host_aggregate_list: Vec::new(),
            rack_name: "any".to_string(),
            rack_memberships: IndexMap::new(),
            rack_avail_vcpus: 0,
            rack_avail_mem: 0,
            rack_avail_local_disk: 0,
            rack_num_of_placed_servers: 0,
            new_rack_aggregate_list: Vec::new(),
            sort_base: 0.0,
        }
    }

    pub fn resource_name(&self, level: Level) -> &str {
        match level {
            Level::Rack => &self.rack_name,
            Level::Host => &self.host_name,
            Level::Cluster => "unknown",
        }
    }

    pub fn vcpus(&self, level: Level) -> i64 {
        match level {
            Level::Rack => self.rack_avail_vcpus,
            Level::Host => self.host_avail_vcpus,
            Level::Cluster => 0,
        }
    }

    pub fn mem(&self, level: Level) -> i64 {
        match level {
            Level::Rack => self.rack_avail_mem,
            Level::Host => self.host_avail_mem,
            Level::Cluster => 0,
        }
    }

    pub fn local_disk(&self, level: Level) -> i64 {
        match level {
            Level::Rack => self.rack_avail_local_disk,
            Level::Host => self.host_avail_local_disk,
            Level::Cluster => 0,
        }
    }

    pub fn memberships(&self, level: Level) -> &IndexMap<String, GroupType> {
        match level {
            Level::Rack => &self.rack_memberships,
            _ => &self.host_memberships,
        }
    }

    /// At rack level, rack memberships with host memberships layered on top;
    /// at host level, host memberships only.
    pub fn all_memberships(&self, level: Level) -> IndexMap<String, GroupType> {
        let mut memberships = IndexMap::new();
        if level == Level::Rack {
            for (k, t) in &self.rack_memberships {
                memberships.insert(k.clone(), *t);
            }
        }
        for (k, t) in &self.host_memberships {
            memberships.insert(k.clone(), *t);
        }
        memberships
    }

    pub fn num_of_placed_servers(&self, level: Level) -> u32 {
        match level {
            Level::Rack => self.rack_num_of_placed_servers,
            Level::Host => self.host_num_of_placed_servers,
            Level::Cluster => 0,
        }
    }

    /// Default hardware profile the given host-aggregate resolves to.
    pub fn host_type_of(
        host_types: &IndexMap<String, Vec<HostType>>,
        ha_name: &str,
    ) -> Option<HostType> {
        host_types
            .get(ha_name)?
            .iter()
            .find(|ht| ht.is_default)
            .cloned()
    }

    /// Resolves this host to the given host-aggregate's default profile:
    /// adds the aggregate to host and rack memberships, swaps the host
    /// capacity from the "mockup" placeholder to the profile, and adjusts
    /// the enclosing rack totals accordingly.
    pub fn adjust_avail_resources(&mut self, ha_name: &str) -> bool {
        let host_type = match Self::host_type_of(&self.candidate_host_types, ha_name) {
            Some(ht) => ht,
            None => return false,
        };

        if !self.host_memberships.contains_key(ha_name) {
            self.host_memberships
                .insert(ha_name.to_string(), GroupType::Aggregate);
            self.new_host_aggregate_list.push(ha_name.to_string());
        }
        if !self.rack_memberships.contains_key(ha_name) {
            self.rack_memberships
                .insert(ha_name.to_string(), GroupType::Aggregate);
            self.new_rack_aggregate_list.push(ha_name.to_string());
        }

        self.host_avail_vcpus = host_type.avail_vcpus;
        self.host_avail_mem = host_type.avail_mem;
        self.host_avail_local_disk = host_type.avail_local_disk;
        self.numa = host_type.numa.clone();

        if let Some(mockup) = self.candidate_host_types.get("mockup").and_then(|l| l.first()) {
            self.rack_avail_vcpus -= mockup.avail_vcpus;
            self.rack_avail_mem -= mockup.avail_mem;
            self.rack_avail_local_disk -= mockup.avail_local_disk;

            self.rack_avail_vcpus += self.host_avail_vcpus;
            self.rack_avail_mem += self.host_avail_mem;
            self.rack_avail_local_disk += self.host_avail_local_disk;
        }

        true
    }

    /// Propagates a sibling host's speculative type resolution to this
    /// host's view of the shared rack.
    pub fn adjust_avail_rack_resources(&mut self, ha_name: &str, cpus: i64, mem: i64, disk: i64) {
        if !self.rack_memberships.contains_key(ha_name) {
            self.rack_memberships
                .insert(ha_name.to_string(), GroupType::Aggregate);
            self.new_rack_aggregate_list.push(ha_name.to_string());
        }

        self.rack_avail_vcpus = cpus;
        self.rack_avail_mem = mem;
        self.rack_avail_local_disk = disk;
    }

    /// Undoes `adjust_avail_resources`, restoring the "mockup" placeholder
    /// capacity from the saved profiles.
    pub fn rollback_avail_resources(&mut self, ha_name: &str) {
        if let Some(pos) = self.new_host_aggregate_list.iter().position(|n| n == ha_name) {
            self.host_memberships.shift_remove(ha_name);
            self.new_host_aggregate_list.remove(pos);
        }
        if let Some(pos) = self.new_rack_aggregate_list.iter().position(|n| n == ha_name) {
            self.rack_memberships.shift_remove(ha_name);
            self.new_rack_aggregate_list.remove(pos);
        }

        let host_type = Self::host_type_of(&self.old_candidate_host_types, ha_name);

        if let Some(mockup) = self
            .old_candidate_host_types
            .get("mockup")
            .and_then(|l| l.first())
            .cloned()
        {
            self.host_avail_vcpus = mockup.avail_vcpus;
            self.host_avail_mem = mockup.avail_mem;
            self.host_avail_local_disk = mockup.avail_local_disk;
            self.numa = mockup.numa.clone();

            if let Some(ht) = host_type {
                self.rack_avail_vcpus -= ht.avail_vcpus;
                self.rack_avail_mem -= ht.avail_mem;
                self.rack_avail_local_disk -= ht.avail_local_disk;
            }

            self.rack_avail_vcpus += self.host_avail_vcpus;
            self.rack_avail_mem += self.host_avail_mem;
            self.rack_avail_local_disk += self.host_avail_local_disk;
        }
    }

    /// Undoes `adjust_avail_rack_resources`.
    pub fn rollback_avail_rack_resources(&mut self, ha_name: &str, cpus: i64, mem: i64, disk: i64) {
        if let Some(pos) = self.new_rack_aggregate_list.iter().position(|n| n == ha_name) {
            self.rack_memberships.shift_remove(ha_name);
            self.new_rack_aggregate_list.remove(pos);
        }

        self.rack_avail_vcpus = cpus;
        self.rack_avail_mem = mem;
        self.rack_avail_local_disk = disk;
    }
}

/// One committed placement decision.
#[derive(Clone, Debug, PartialEq)]
pub struct Placement {
    pub host_name: String,
    pub rack_name: String,
    pub level: Level,
}

impl Placement {
    pub fn of(host: &HostResource, level: Level) -> Self {
        Self {
            host_name: host.host_name.clone(),
            rack_name: host.rack_name.clone(),
            level,
        }
    }

    pub fn resource_name(&self, level: Level) -> &str {
        match level {
            Level::Rack => &self.rack_name,
            Level::Host => &self.host_name,
            Level::Cluster => "unknown",
        }
    }
}

/// The full snapshot one search run mutates and rolls back against.
#[derive(Clone, Debug, Default)]
pub struct PlacementState {
    pub hosts: IndexMap<String, HostResource>,
    pub groups: IndexMap<String, GroupResource>,
    /// Hosts currently holding at least one placed server.
    pub num_of_hosts: u32,
}

impl PlacementState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies the live inventory into a fresh snapshot. Disabled groups and
    /// unavailable hosts or racks are left out.
    pub fn from_inventory(resource: &Resource) -> Self {
        let mut state = PlacementState::new();

        for (gk, g) in &resource.groups {
            if g.status != "enabled" {
                debug!("group ({}) disabled", g.name);
                continue;
            }

            let mut gr = GroupResource::new(
                gk,
                g.group_type,
                g.factory,
                g.level.unwrap_or(Level::Host),
            );
            gr.metadata = g.metadata.clone();
            gr.original_num_of_placed_servers = g.server_list.len() as u32;
            gr.num_of_placed_servers = g.server_list.len() as u32;
            for (hk, members) in &g.member_hosts {
                gr.num_of_placed_servers_of_host
                    .insert(hk.clone(), members.len() as u32);
            }

            state.groups.insert(gk.clone(), gr);
        }

        for (hk, host) in &resource.hosts {
            if !host.available {
                warn!("host ({}) not available at this time", host.name);
                continue;
            }

            let mut hr = HostResource::new(hk);

            for mk in &host.memberships {
                if let Some(g) = state.groups.get(mk) {
                    hr.host_memberships.insert(mk.clone(), g.group_type);
                }
            }

            hr.candidate_host_types = host.candidate_host_types.clone();

            hr.host_avail_vcpus = host.avail_vcpus;
            hr.host_avail_mem = host.avail_mem;
            hr.host_avail_local_disk = host.avail_local_disk;
            hr.numa = host.numa.clone();
            hr.host_num_of_placed_servers = host.server_list.len() as u32;

            if let Some(rack_name) = &host.rack {
                let rack = &resource.host_groups[rack_name];
                if !rack.available {
                    warn!("rack ({}) not available at this time", rack.name);
                    continue;
                }

                hr.rack_name = rack.name.clone();

                for mk in &rack.memberships {
                    if let Some(g) = state.groups.get(mk) {
                        hr.rack_memberships.insert(mk.clone(), g.group_type);
                    }
                }

                hr.rack_avail_vcpus = rack.avail_vcpus;
                hr.rack_avail_mem = rack.avail_mem;
                hr.rack_avail_local_disk = rack.avail_local_disk;
                hr.rack_num_of_placed_servers = rack.server_list.len() as u32;
            }

            if hr.host_num_of_placed_servers > 0 {
                state.num_of_hosts += 1;
            }

            state.hosts.insert(hk.clone(), hr);
        }

        state
    }
}
