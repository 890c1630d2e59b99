//! Read-only datacenter inventory loaded from a YAML description.
//!
//! The inventory lists compute hosts (optionally grouped into racks),
//! resource groups known to the cloud platform, and per-host candidate host
//! types for hosts whose hardware profile is not yet determined.

use std::fs::read_to_string;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::core::common::{GroupFactory, GroupType, Level, ServerInfo};
use crate::core::numa::{CellId, Numa};

/// A possible hardware profile of a host whose type is not yet determined.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HostType {
    pub id: String,
    #[serde(default)]
    pub is_default: bool,
    pub avail_vcpus: i64,
    pub avail_mem: i64,
    pub avail_local_disk: i64,
    #[serde(default)]
    pub numa: Numa,
}

/// A compute host as reported by the cloud platform.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Host {
    pub name: String,
    /// Rack containing this host, if known.
    #[serde(default)]
    pub rack: Option<String>,
    #[serde(default = "default_true")]
    pub available: bool,
    pub avail_vcpus: i64,
    pub avail_mem: i64,
    pub avail_local_disk: i64,
    #[serde(default)]
    pub numa: Numa,
    /// Names of resource groups this host belongs to.
    #[serde(default)]
    pub memberships: IndexSet<String>,
    /// Servers already running on this host.
    #[serde(default)]
    pub server_list: Vec<ServerInfo>,
    /// Candidate hardware profiles, keyed by flavor family, for hosts whose
    /// type is determined lazily. Empty for ordinary hosts.
    #[serde(default)]
    pub candidate_host_types: IndexMap<String, Vec<HostType>>,
}

fn default_true() -> bool {
    true
}

/// A rack aggregating the capacity of its member hosts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HostGroup {
    pub name: String,
    #[serde(default = "default_true")]
    pub available: bool,
    #[serde(default)]
    pub avail_vcpus: i64,
    #[serde(default)]
    pub avail_mem: i64,
    #[serde(default)]
    pub avail_local_disk: i64,
    #[serde(default)]
    pub memberships: IndexSet<String>,
    #[serde(default)]
    pub server_list: Vec<ServerInfo>,
}

impl HostGroup {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            available: true,
            avail_vcpus: 0,
            avail_mem: 0,
            avail_local_disk: 0,
            memberships: IndexSet::new(),
            server_list: Vec::new(),
        }
    }
}

/// A resource group known to the cloud platform (availability zone, host
/// aggregate, or a valet grouping rule with placed servers).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceGroup {
    pub name: String,
    pub group_type: GroupType,
    #[serde(default)]
    pub factory: GroupFactory,
    #[serde(default)]
    pub level: Option<Level>,
    #[serde(default = "default_status")]
    pub status: String,
    /// Free-form properties, e.g. host-aggregate extra specs.
    #[serde(default)]
    pub metadata: IndexMap<String, String>,
    /// Servers already placed under this group.
    #[serde(default)]
    pub server_list: Vec<ServerInfo>,
    /// Per-host names of servers of this group, keyed by host name.
    #[serde(default)]
    pub member_hosts: IndexMap<String, Vec<String>>,
}

fn default_status() -> String {
    "enabled".to_string()
}

/// The full datacenter inventory for one placement turn.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Resource {
    #[serde(default)]
    pub hosts: IndexMap<String, Host>,
    #[serde(default)]
    pub host_groups: IndexMap<String, HostGroup>,
    #[serde(default)]
    pub groups: IndexMap<String, ResourceGroup>,
    /// Datacenter-wide remaining capacity, accumulated over hosts.
    #[serde(default)]
    pub cpu_avail: i64,
    #[serde(default)]
    pub mem_avail: i64,
    #[serde(default)]
    pub local_disk_avail: i64,
}

impl Resource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an inventory from YAML and recomputes rack and datacenter
    /// aggregates from the listed hosts.
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        let mut resource: Resource = serde_yaml::from_str(content)?;
        resource.update_aggregates();
        Ok(resource)
    }

    /// Reads an inventory from a YAML file.
    pub fn from_file(file_name: &str) -> Result<Self, serde_yaml::Error> {
        Self::from_yaml(
            &read_to_string(file_name)
                .unwrap_or_else(|_| panic!("inventory file {} not found", file_name)),
        )
    }

    /// Registers a host, accumulating its capacity into its rack and into
    /// the datacenter totals. Creates the rack on first use. Servers already
    /// running on the host are charged against its NUMA cells.
    pub fn add_host(&mut self, mut host: Host) {
        // Each listed server occupies a cell exactly once.
        for s in host.server_list.clone() {
            if host.numa.cell_of_server(&s).is_none() {
                let cell_id = if host.numa.cell_0.cpus >= host.numa.cell_1.cpus {
                    CellId::Cell0
                } else {
                    CellId::Cell1
                };
                host.numa.add_server(cell_id, &s);
            }
        }

        if host.available {
            self.cpu_avail += host.avail_vcpus;
            self.mem_avail += host.avail_mem;
            self.local_disk_avail += host.avail_local_disk;
            if let Some(rack_name) = &host.rack {
                let rack = self
                    .host_groups
                    .entry(rack_name.clone())
                    .or_insert_with(|| HostGroup::new(rack_name));
                rack.avail_vcpus += host.avail_vcpus;
                rack.avail_mem += host.avail_mem;
                rack.avail_local_disk += host.avail_local_disk;
                for m in host.memberships.iter() {
                    rack.memberships.insert(m.clone());
                }
                rack.server_list.extend(host.server_list.iter().cloned());
            }
        }
        self.hosts.insert(host.name.clone(), host);
    }

    fn update_aggregates(&mut self) {
        self.cpu_avail = 0;
        self.mem_avail = 0;
        self.local_disk_avail = 0;
        let hosts = std::mem::take(&mut self.hosts);
        self.host_groups.retain(|_, g| {
            g.avail_vcpus = 0;
            g.avail_mem = 0;
            g.avail_local_disk = 0;
            g.memberships.clear();
            g.server_list.clear();
            true
        });
        for (_, host) in hosts {
            self.add_host(host);
        }
    }
}
