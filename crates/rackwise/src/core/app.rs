//! One placement request: the servers and affinity groups to place,
//! the grouping rules binding them, and the per-request weights that
//! drive the search order.
//!
//! Parsing and validating incoming stack definitions happens outside this
//! engine; an [`App`] arrives with demands and rule memberships already
//! resolved.

use indexmap::IndexMap;

use crate::core::common::{GroupFactory, GroupType, Level};
use crate::core::inventory::Resource;
use crate::core::node::{Group, NodeId, PlacementNode, Server};

/// Resource dimensions the optimization priority ranks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    Cpu,
    Mem,
    LocalDisk,
}

/// A grouping rule servers of this request are bound by.
///
/// Affinity rules additionally materialize as [`Group`] nodes; diversity,
/// quorum-diversity, and exclusivity rules exist only as memberships on the
/// nodes they constrain.
#[derive(Clone, Debug)]
pub struct AppRule {
    pub id: String,
    pub rule_type: GroupType,
    pub level: Level,
    pub factory: GroupFactory,
    /// Server ids of this request placed under the rule.
    pub members: Vec<String>,
}

impl AppRule {
    pub fn new(id: &str, rule_type: GroupType, level: Level) -> Self {
        Self {
            id: id.to_string(),
            rule_type,
            level,
            factory: GroupFactory::Engine,
            members: Vec::new(),
        }
    }
}

/// A placement request for one application.
pub struct App {
    pub app_name: String,
    pub app_id: Option<String>,

    /// "ok" or a human-readable failure description.
    pub status: String,

    /// Node arena; ids are indices into this vector.
    pub nodes: Vec<PlacementNode>,

    /// Top-level servers and groups (not contained in any affinity group),
    /// keyed by node id string.
    pub servers: IndexMap<String, NodeId>,
    pub groups: IndexMap<String, NodeId>,

    pub rules: IndexMap<String, AppRule>,

    // Aggregate demand, for the optimization priority.
    pub total_cpu: i64,
    pub total_mem: i64,
    pub total_local_vol: i64,

    /// Resource kinds with app-level weights, sorted by descending weight.
    pub optimization_priority: Vec<(ResourceKind, f64)>,
}

impl App {
    pub fn new(app_name: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
            app_id: None,
            status: "ok".to_string(),
            nodes: Vec::new(),
            servers: IndexMap::new(),
            groups: IndexMap::new(),
            rules: IndexMap::new(),
            total_cpu: 0,
            total_mem: 0,
            total_local_vol: 0,
            optimization_priority: Vec::new(),
        }
    }

    /// Adds a top-level server.
    pub fn add_server(&mut self, server: Server) -> NodeId {
        let id = self.nodes.len();
        self.servers.insert(server.vid.clone(), id);
        self.nodes.push(PlacementNode::Server(server));
        id
    }

    /// Adds a top-level affinity group.
    pub fn add_group(&mut self, group: Group) -> NodeId {
        let id = self.nodes.len();
        self.groups.insert(group.vid.clone(), id);
        self.nodes.push(PlacementNode::Group(group));
        id
    }

    /// Moves a top-level node into an affinity group. The group inherits the
    /// member's rule memberships at its own level or above, its extra specs,
    /// and its availability zones.
    pub fn add_to_group(&mut self, group_id: NodeId, member_id: NodeId) {
        let member_vid = self.nodes[member_id].vid().to_string();
        self.servers.shift_remove(&member_vid);
        self.groups.shift_remove(&member_vid);

        let (div, qdiv, excl, specs, azs) = {
            let member = &self.nodes[member_id];
            let azs: Vec<String> = match member {
                PlacementNode::Server(s) => s.availability_zone.iter().cloned().collect(),
                PlacementNode::Group(g) => g.availability_zone_list.clone(),
            };
            (
                member.diversity_groups().clone(),
                member.quorum_diversity_groups().clone(),
                member.exclusivity_groups().clone(),
                member.extra_specs_list().to_vec(),
                azs,
            )
        };

        match &mut self.nodes[member_id] {
            PlacementNode::Server(s) => s.surgroup = Some(group_id),
            PlacementNode::Group(g) => g.surgroup = Some(group_id),
        }

        let group_level = self.nodes[group_id].as_group().map(|g| g.level);
        let rule_levels: IndexMap<String, Level> = self
            .rules
            .iter()
            .map(|(k, r)| (k.clone(), r.level))
            .collect();

        if let PlacementNode::Group(group) = &mut self.nodes[group_id] {
            group.subgroups.push(member_id);

            let group_level = group_level.unwrap_or(group.level);
            for rk in div {
                if rule_levels.get(&rk).is_some_and(|l| *l >= group_level) {
                    group.diversity_groups.insert(rk);
                }
            }
            for rk in qdiv {
                if rule_levels.get(&rk).is_some_and(|l| *l >= group_level) {
                    group.quorum_diversity_groups.insert(rk);
                }
            }
            for rk in excl {
                if rule_levels.get(&rk).is_some_and(|l| *l >= group_level) {
                    group.exclusivity_groups.insert(rk);
                }
            }
            group.extra_specs_list.extend(specs);
            for az in azs {
                if !group.availability_zone_list.contains(&az) {
                    group.availability_zone_list.push(az);
                }
            }
        }
    }

    pub fn add_rule(&mut self, rule: AppRule) {
        self.rules.insert(rule.id.clone(), rule);
    }

    /// Binds a node to a rule: records the membership on the node and the
    /// node as a member of the rule.
    pub fn assign_rule(&mut self, rule_id: &str, node_id: NodeId) {
        let rule_type = self.rules[rule_id].rule_type;
        let vid = self.nodes[node_id].vid().to_string();
        if let Some(rule) = self.rules.get_mut(rule_id) {
            rule.members.push(vid);
        }

        let node = &mut self.nodes[node_id];
        let memberships = match (rule_type, node) {
            (GroupType::Diversity, PlacementNode::Server(s)) => &mut s.diversity_groups,
            (GroupType::Diversity, PlacementNode::Group(g)) => &mut g.diversity_groups,
            (GroupType::QuorumDiversity, PlacementNode::Server(s)) => &mut s.quorum_diversity_groups,
            (GroupType::QuorumDiversity, PlacementNode::Group(g)) => &mut g.quorum_diversity_groups,
            (GroupType::Exclusivity, PlacementNode::Server(s)) => &mut s.exclusivity_groups,
            (GroupType::Exclusivity, PlacementNode::Group(g)) => &mut g.exclusivity_groups,
            _ => return,
        };
        memberships.insert(rule_id.to_string());
    }

    /// Exclusivity rules of this node declared at exactly the given level.
    pub fn exclusivities_at(&self, node_id: NodeId, level: Level) -> Vec<(String, Level)> {
        self.nodes[node_id]
            .exclusivity_groups()
            .iter()
            .filter_map(|rk| {
                let rule = self.rules.get(rk)?;
                (rule.level == level).then(|| (rk.clone(), rule.level))
            })
            .collect()
    }

    /// Computes the per-node resource weights relative to what the
    /// datacenter has available. Group demand is the recursive sum of its
    /// children's demand.
    pub fn set_weight(&mut self, resource: &Resource) {
        let server_ids: Vec<NodeId> = self.servers.values().cloned().collect();
        for id in server_ids {
            self.set_server_weight(id, resource);
        }

        let group_ids: Vec<NodeId> = self.groups.values().cloned().collect();
        for id in &group_ids {
            self.set_server_weight(*id, resource);
        }
        for id in &group_ids {
            self.set_group_resource(*id);
        }
        for id in &group_ids {
            self.set_group_weight(*id, resource);
        }
    }

    fn set_server_weight(&mut self, node_id: NodeId, resource: &Resource) {
        let children: Vec<NodeId> = match &self.nodes[node_id] {
            PlacementNode::Group(g) => g.subgroups.clone(),
            PlacementNode::Server(_) => Vec::new(),
        };

        if let PlacementNode::Server(s) = &mut self.nodes[node_id] {
            s.vcpu_weight = if resource.cpu_avail > 0 {
                s.vcpus as f64 / resource.cpu_avail as f64
            } else {
                1.0
            };
            self.total_cpu += s.vcpus;

            s.mem_weight = if resource.mem_avail > 0 {
                s.mem as f64 / resource.mem_avail as f64
            } else {
                1.0
            };
            self.total_mem += s.mem;

            s.local_volume_weight = if resource.local_disk_avail > 0 {
                s.local_volume_size as f64 / resource.local_disk_avail as f64
            } else if s.local_volume_size > 0 {
                1.0
            } else {
                0.0
            };
            self.total_local_vol += s.local_volume_size;
        } else {
            for child in children {
                self.set_server_weight(child, resource);
            }
        }
    }

    fn set_group_resource(&mut self, node_id: NodeId) {
        let children: Vec<NodeId> = match &self.nodes[node_id] {
            PlacementNode::Group(g) => g.subgroups.clone(),
            PlacementNode::Server(_) => return,
        };

        let mut vcpus = 0;
        let mut mem = 0;
        let mut local_volume_size = 0;
        for child in children {
            self.set_group_resource(child);
            let c = &self.nodes[child];
            vcpus += c.vcpus();
            mem += c.mem();
            local_volume_size += c.local_volume_size();
        }

        if let PlacementNode::Group(g) = &mut self.nodes[node_id] {
            g.vcpus += vcpus;
            g.mem += mem;
            g.local_volume_size += local_volume_size;
        }
    }

    fn set_group_weight(&mut self, node_id: NodeId, resource: &Resource) {
        let children: Vec<NodeId> = match &self.nodes[node_id] {
            PlacementNode::Group(g) => g.subgroups.clone(),
            PlacementNode::Server(_) => return,
        };

        if let PlacementNode::Group(g) = &mut self.nodes[node_id] {
            g.vcpu_weight = relative_weight(g.vcpus, resource.cpu_avail);
            g.mem_weight = relative_weight(g.mem, resource.mem_avail);
            g.local_volume_weight = relative_weight(g.local_volume_size, resource.local_disk_avail);
        }

        for child in children {
            if self.nodes[child].as_group().is_some() {
                self.set_group_weight(child, resource);
            }
        }
    }

    /// Ranks CPU, memory, and disk by how much of the datacenter's remaining
    /// capacity this request would consume.
    pub fn set_optimization_priority(&mut self, resource: &Resource) {
        if self.groups.is_empty() && self.servers.is_empty() {
            return;
        }

        let mut opt = vec![
            (ResourceKind::Cpu, relative_weight(self.total_cpu, resource.cpu_avail)),
            (ResourceKind::Mem, relative_weight(self.total_mem, resource.mem_avail)),
            (
                ResourceKind::LocalDisk,
                relative_weight(self.total_local_vol, resource.local_disk_avail),
            ),
        ];
        opt.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        self.optimization_priority = opt;
    }
}

fn relative_weight(demand: i64, avail: i64) -> f64 {
    if avail > 0 {
        demand as f64 / avail as f64
    } else if demand > 0 {
        1.0
    } else {
        0.0
    }
}
