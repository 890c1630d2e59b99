//! Placement nodes: the units the search assigns to hosts.
//!
//! Nodes live in an arena owned by [`App`](crate::core::app::App) and refer
//! to each other by index, so affinity containment trees carry no owned
//! back-pointers.

use indexmap::{IndexMap, IndexSet};

use crate::core::common::{GroupFactory, GroupType, Level};

/// Index of a node in the application's arena.
pub type NodeId = usize;

/// Flavor families recognized as lazily-resolved host aggregates.
pub const FLAVOR_FAMILIES: [&str; 5] = ["gv", "nv", "nd", "ns", "ss"];

const EXTRA_SPECS_SCOPE: &str = "aggregate_instance_extra_specs";

/// A requested virtual machine.
#[derive(Clone, Debug)]
pub struct Server {
    pub vid: String,
    pub name: String,
    pub flavor: String,
    pub image: Option<String>,

    pub vcpus: i64,
    pub mem: i64,
    pub local_volume_size: i64,
    pub extra_specs_list: Vec<IndexMap<String, String>>,

    pub availability_zone: Option<String>,

    /// Enclosing affinity group, if any.
    pub surgroup: Option<NodeId>,

    /// Rule ids this server belongs to, by rule family.
    pub diversity_groups: IndexSet<String>,
    pub quorum_diversity_groups: IndexSet<String>,
    pub exclusivity_groups: IndexSet<String>,

    pub vcpu_weight: f64,
    pub mem_weight: f64,
    pub local_volume_weight: f64,
    pub sort_base: f64,
}

impl Server {
    pub fn new(vid: &str, name: &str, flavor: &str, vcpus: i64, mem: i64, local_volume_size: i64) -> Self {
        Self {
            vid: vid.to_string(),
            name: name.to_string(),
            flavor: flavor.to_string(),
            image: None,
            vcpus,
            mem,
            local_volume_size,
            extra_specs_list: Vec::new(),
            availability_zone: None,
            surgroup: None,
            diversity_groups: IndexSet::new(),
            quorum_diversity_groups: IndexSet::new(),
            exclusivity_groups: IndexSet::new(),
            vcpu_weight: -1.0,
            mem_weight: -1.0,
            local_volume_weight: -1.0,
            sort_base: -1.0,
        }
    }

    /// True if the flavor requests single NUMA cell alignment.
    pub fn need_numa_alignment(&self) -> bool {
        for es in &self.extra_specs_list {
            for (key, req) in es {
                if key == "hw:numa_nodes" && req.trim().parse::<i64>() == Ok(1) {
                    return true;
                }
            }
        }
        false
    }
}

/// An affinity group node: an ordered container of servers and nested
/// affinity groups that must land under one host or rack.
#[derive(Clone, Debug)]
pub struct Group {
    pub vid: String,
    pub group_type: GroupType,
    pub factory: GroupFactory,
    pub level: Level,

    pub surgroup: Option<NodeId>,
    pub subgroups: Vec<NodeId>,

    pub diversity_groups: IndexSet<String>,
    pub quorum_diversity_groups: IndexSet<String>,
    pub exclusivity_groups: IndexSet<String>,

    pub availability_zone_list: Vec<String>,
    pub extra_specs_list: Vec<IndexMap<String, String>>,

    // Aggregated demand, summed over children.
    pub vcpus: i64,
    pub mem: i64,
    pub local_volume_size: i64,

    pub vcpu_weight: f64,
    pub mem_weight: f64,
    pub local_volume_weight: f64,
    pub sort_base: f64,
}

impl Group {
    pub fn new(vid: &str, level: Level) -> Self {
        Self {
            vid: vid.to_string(),
            group_type: GroupType::Affinity,
            factory: GroupFactory::Engine,
            level,
            surgroup: None,
            subgroups: Vec::new(),
            diversity_groups: IndexSet::new(),
            quorum_diversity_groups: IndexSet::new(),
            exclusivity_groups: IndexSet::new(),
            availability_zone_list: Vec::new(),
            extra_specs_list: Vec::new(),
            vcpus: 0,
            mem: 0,
            local_volume_size: 0,
            vcpu_weight: -1.0,
            mem_weight: -1.0,
            local_volume_weight: -1.0,
            sort_base: -1.0,
        }
    }
}

/// The unit the search places.
#[derive(Clone, Debug)]
pub enum PlacementNode {
    Server(Server),
    Group(Group),
}

impl PlacementNode {
    pub fn vid(&self) -> &str {
        match self {
            PlacementNode::Server(s) => &s.vid,
            PlacementNode::Group(g) => &g.vid,
        }
    }

    pub fn is_server(&self) -> bool {
        matches!(self, PlacementNode::Server(_))
    }

    pub fn as_server(&self) -> Option<&Server> {
        match self {
            PlacementNode::Server(s) => Some(s),
            PlacementNode::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&Group> {
        match self {
            PlacementNode::Server(_) => None,
            PlacementNode::Group(g) => Some(g),
        }
    }

    pub fn vcpus(&self) -> i64 {
        match self {
            PlacementNode::Server(s) => s.vcpus,
            PlacementNode::Group(g) => g.vcpus,
        }
    }

    pub fn mem(&self) -> i64 {
        match self {
            PlacementNode::Server(s) => s.mem,
            PlacementNode::Group(g) => g.mem,
        }
    }

    pub fn local_volume_size(&self) -> i64 {
        match self {
            PlacementNode::Server(s) => s.local_volume_size,
            PlacementNode::Group(g) => g.local_volume_size,
        }
    }

    pub fn sort_base(&self) -> f64 {
        match self {
            PlacementNode::Server(s) => s.sort_base,
            PlacementNode::Group(g) => g.sort_base,
        }
    }

    pub fn surgroup(&self) -> Option<NodeId> {
        match self {
            PlacementNode::Server(s) => s.surgroup,
            PlacementNode::Group(g) => g.surgroup,
        }
    }

    pub fn extra_specs_list(&self) -> &[IndexMap<String, String>] {
        match self {
            PlacementNode::Server(s) => &s.extra_specs_list,
            PlacementNode::Group(g) => &g.extra_specs_list,
        }
    }

    pub fn diversity_groups(&self) -> &IndexSet<String> {
        match self {
            PlacementNode::Server(s) => &s.diversity_groups,
            PlacementNode::Group(g) => &g.diversity_groups,
        }
    }

    pub fn quorum_diversity_groups(&self) -> &IndexSet<String> {
        match self {
            PlacementNode::Server(s) => &s.quorum_diversity_groups,
            PlacementNode::Group(g) => &g.quorum_diversity_groups,
        }
    }

    pub fn exclusivity_groups(&self) -> &IndexSet<String> {
        match self {
            PlacementNode::Server(s) => &s.exclusivity_groups,
            PlacementNode::Group(g) => &g.exclusivity_groups,
        }
    }

    /// NUMA alignment is a flavor property, so only servers can request it.
    pub fn need_numa_alignment(&self) -> bool {
        match self {
            PlacementNode::Server(s) => s.need_numa_alignment(),
            PlacementNode::Group(_) => false,
        }
    }

    /// Flavor families this node's extra specs declare, in declaration order.
    pub fn flavor_types(&self) -> Vec<String> {
        let mut flavor_types = Vec::new();
        for es in self.extra_specs_list() {
            for (k, v) in es {
                if let Some((scope, family)) = k.split_once(':') {
                    if scope == EXTRA_SPECS_SCOPE
                        && FLAVOR_FAMILIES.contains(&family.to_lowercase().as_str())
                        && v == "true"
                    {
                        flavor_types.push(family.to_string());
                    }
                }
            }
        }
        flavor_types
    }
}
