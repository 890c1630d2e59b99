//! Greedy bin-packing search with backtracking over the hierarchical
//! datacenter layout.
//!
//! Nodes are placed heaviest first. Composite nodes are split into their
//! next-level children and solved recursively beneath each candidate in
//! turn; a failed trial is rolled back exactly before the next candidate is
//! tried, so capacity counters and group accounting never drift.

use std::collections::VecDeque;

use indexmap::IndexMap;
use log::{debug, error, info, warn};

use crate::core::app::{App, ResourceKind};
use crate::core::avail_resources::AvailResources;
use crate::core::common::{GroupFactory, GroupType, Level, ServerInfo};
use crate::core::constraint_solver::ConstraintSolver;
use crate::core::inventory::Resource;
use crate::core::node::{NodeId, PlacementNode};
use crate::core::snapshot::{GroupResource, Placement, PlacementState};

pub struct Search {
    /// Snapshot of current resource status.
    pub state: PlacementState,

    /// Search results.
    pub node_placements: IndexMap<NodeId, Placement>,

    // Optimization criteria.
    cpu_weight: f64,
    mem_weight: f64,
    local_disk_weight: f64,

    // Datacenter-wide availability, for candidate scoring.
    total_cpu_avail: i64,
    total_mem_avail: i64,
    total_local_disk_avail: i64,

    pub constraint_solver: ConstraintSolver,
}

impl Search {
    pub fn new() -> Self {
        Self {
            state: PlacementState::new(),
            node_placements: IndexMap::new(),
            cpu_weight: -1.0,
            mem_weight: -1.0,
            local_disk_weight: -1.0,
            total_cpu_avail: 0,
            total_mem_avail: 0,
            total_local_disk_avail: 0,
            constraint_solver: ConstraintSolver::new(),
        }
    }

    fn init_search(&mut self, app: &App, resource: &Resource) {
        self.state = PlacementState::from_inventory(resource);
        self.node_placements.clear();
        self.constraint_solver = ConstraintSolver::new();

        self.total_cpu_avail = resource.cpu_avail;
        self.total_mem_avail = resource.mem_avail;
        self.total_local_disk_avail = resource.local_disk_avail;

        self.set_resource_weights(app);
    }

    /// Normalizes the application's optimization priority into shares
    /// summing to one.
    fn set_resource_weights(&mut self, app: &App) {
        let denominator: f64 = app.optimization_priority.iter().map(|(_, w)| w).sum();

        self.cpu_weight = 0.0;
        self.mem_weight = 0.0;
        self.local_disk_weight = 0.0;

        if denominator > 0.0 {
            for (kind, w) in &app.optimization_priority {
                let share = w / denominator;
                match kind {
                    ResourceKind::Cpu => self.cpu_weight = share,
                    ResourceKind::Mem => self.mem_weight = share,
                    ResourceKind::LocalDisk => self.local_disk_weight = share,
                }
            }
        }
    }

    /// Determines placements for a new app creation. Returns false with the
    /// failure recorded in `app.status` when the request cannot be placed.
    pub fn place(&mut self, app: &mut App, resource: &Resource) -> bool {
        self.init_search(app, resource);

        info!("search......");

        let top_level: Vec<NodeId> = app
            .servers
            .values()
            .chain(app.groups.values())
            .cloned()
            .collect();
        let open_node_list = self.open_list(app, &top_level);

        let mut avail_resources = AvailResources::new(Level::Cluster);
        avail_resources.avail_hosts = self.state.hosts.keys().cloned().collect();
        // The cluster level is not searched directly.
        avail_resources.set_next_level();

        self.run_greedy(open_node_list, &mut avail_resources, app)
    }

    /// Computes each node's weight and returns the nodes as an open list.
    fn open_list(&self, app: &mut App, node_ids: &[NodeId]) -> Vec<NodeId> {
        for id in node_ids {
            self.set_node_weight(app, *id);
        }
        node_ids.to_vec()
    }

    fn set_node_weight(&self, app: &mut App, node_id: NodeId) {
        let (cpu_w, mem_w, disk_w) = match &app.nodes[node_id] {
            PlacementNode::Server(s) => (s.vcpu_weight, s.mem_weight, s.local_volume_weight),
            PlacementNode::Group(g) => (g.vcpu_weight, g.mem_weight, g.local_volume_weight),
        };
        let sort_base = self.cpu_weight * cpu_w
            + self.mem_weight * mem_w
            + self.local_disk_weight * disk_w;

        match &mut app.nodes[node_id] {
            PlacementNode::Server(s) => s.sort_base = sort_base,
            PlacementNode::Group(g) => g.sort_base = sort_base,
        }
    }

    fn run_greedy(
        &mut self,
        mut open_node_list: Vec<NodeId>,
        avail_resources: &mut AvailResources,
        app: &mut App,
    ) -> bool {
        open_node_list.sort_by(|a, b| {
            app.nodes[*b]
                .sort_base()
                .partial_cmp(&app.nodes[*a].sort_base())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        for n in &open_node_list {
            let node = &app.nodes[*n];
            debug!(
                "open node = {} cpus = {} sort = {}",
                node.vid(),
                node.vcpus(),
                node.sort_base()
            );
        }

        let mut open_node_list: VecDeque<NodeId> = open_node_list.into();

        while let Some(n) = open_node_list.pop_front() {
            let best_resource = self.get_best_resource(n, avail_resources, app);

            match best_resource {
                None => {
                    error!("{}", app.status);
                    return false;
                }
                Some(best) => {
                    self.deduct_resources(avail_resources.level, &best, n, app);
                    self.close_node_placement(avail_resources.level, &best, n, app);
                }
            }
        }

        true
    }

    /// Determines the best placement for the given server or affinity group.
    fn get_best_resource(
        &mut self,
        n: NodeId,
        avail_resources: &mut AvailResources,
        app: &mut App,
    ) -> Option<Placement> {
        avail_resources.set_candidates(&self.state);

        let candidate_list =
            self.constraint_solver
                .get_candidate_list(n, avail_resources, app, &mut self.state);

        if candidate_list.is_empty() {
            if app.status == "ok" {
                if self.constraint_solver.status != "ok" {
                    app.status = self.constraint_solver.status.clone();
                } else {
                    app.status = "fail while getting candidate hosts".to_string();
                }
            }
            return None;
        }

        let mut candidate_list = candidate_list;
        if candidate_list.len() > 1 {
            self.set_compute_sort_base(avail_resources.level, &candidate_list);
            candidate_list.sort_by(|a, b| {
                self.state.hosts[a]
                    .sort_base
                    .partial_cmp(&self.state.hosts[b].sort_base)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        for c in &candidate_list {
            let host = &self.state.hosts[c];
            debug!(
                "candidate = {} cpus = {} sort = {}",
                host.resource_name(avail_resources.level),
                host.vcpus(avail_resources.level),
                host.sort_base
            );
        }

        let mut best_resource = None;

        if avail_resources.level == Level::Host && app.nodes[n].is_server() {
            best_resource = Some(Placement::of(&self.state.hosts[&candidate_list[0]], Level::Host));
        } else {
            let mut candidate_list: VecDeque<String> = candidate_list.into();

            while let Some(cr) = candidate_list.pop_front() {
                let (servers, groups) = get_next_placements(app, n, avail_resources.level);
                let children: Vec<NodeId> = servers.into_iter().chain(groups).collect();
                let open_node_list = self.open_list(app, &children);

                let resource_name = self.state.hosts[&cr]
                    .resource_name(avail_resources.level)
                    .to_string();

                let mut next_avail = AvailResources::new(avail_resources.level);
                next_avail.set_next_avail_hosts(
                    &self.state,
                    &avail_resources.avail_hosts,
                    &resource_name,
                );
                next_avail.set_next_level();

                if self.run_greedy(open_node_list, &mut next_avail, app) {
                    best_resource =
                        Some(Placement::of(&self.state.hosts[&cr], avail_resources.level));
                    break;
                } else {
                    warn!("rollback candidate = {}", resource_name);

                    self.rollback_resources(n, app);
                    self.rollback_node_placement(n, app);

                    if !candidate_list.is_empty() && app.status != "ok" {
                        app.status = "ok".to_string();
                    }
                }
            }

            if best_resource.is_none() && candidate_list.is_empty() {
                if app.status == "ok" {
                    app.status = "no available hosts".to_string();
                }
                warn!("{}", app.status);
            }
        }

        best_resource
    }

    /// Scores candidates by weighted remaining-capacity ratio; the search
    /// prefers the most-loaded still-qualifying candidate, concentrating
    /// free capacity.
    fn set_compute_sort_base(&mut self, level: Level, candidate_list: &[String]) {
        for c in candidate_list {
            let host = &self.state.hosts[c];

            let cpu_ratio = ratio(host.vcpus(level), self.total_cpu_avail);
            let mem_ratio = ratio(host.mem(level), self.total_mem_avail);
            let local_disk_ratio = ratio(host.local_disk(level), self.total_local_disk_avail);

            let sort_base = (1.0 - self.cpu_weight) * cpu_ratio
                + (1.0 - self.mem_weight) * mem_ratio
                + (1.0 - self.local_disk_weight) * local_disk_ratio;

            self.state.hosts[c].sort_base = sort_base;
        }
    }

    /// Applies a placement to the hosting resources and the groups the node
    /// belongs to.
    fn deduct_resources(&mut self, level: Level, best: &Placement, n: NodeId, app: &App) {
        // The placement may already be applied at this level by a finished
        // recursive descent.
        if let Some(p) = self.node_placements.get(&n) {
            if best.level == p.level {
                return;
            }
        }

        let exclusivities = app.exclusivities_at(n, level);
        if exclusivities.len() == 1 {
            let (rule_id, rule_level) = &exclusivities[0];
            self.add_exclusivity(best, rule_id, *rule_level);
        }

        if let Some(g) = app.nodes[n].as_group() {
            self.add_group(level, best, &g.vid, g.group_type, g.factory, g.level);
        }

        for rule_id in app.nodes[n].diversity_groups() {
            if let Some(rule) = app.rules.get(rule_id) {
                self.add_group(level, best, &rule.id, rule.rule_type, rule.factory, rule.level);
            }
        }
        for rule_id in app.nodes[n].quorum_diversity_groups() {
            if let Some(rule) = app.rules.get(rule_id) {
                self.add_group(level, best, &rule.id, rule.rule_type, rule.factory, rule.level);
            }
        }

        if app.nodes[n].is_server() && level == Level::Host {
            self.deduct_server_resources(best, n, app);
        }
    }

    fn add_exclusivity(&mut self, best: &Placement, rule_id: &str, rule_level: Level) {
        if !self.state.groups.contains_key(rule_id) {
            let gr = GroupResource::new(
                rule_id,
                GroupType::Exclusivity,
                GroupFactory::Engine,
                rule_level,
            );
            self.state.groups.insert(rule_id.to_string(), gr);

            info!("find exclusivity ({})", rule_id);
        }

        let gr = &mut self.state.groups[rule_id];
        gr.num_of_placed_servers += 1;

        let host_name = best.resource_name(rule_level).to_string();
        *gr.num_of_placed_servers_of_host
            .entry(host_name)
            .or_insert(0) += 1;

        self.propagate_membership(best, rule_id, GroupType::Exclusivity, rule_level);
    }

    fn add_group(
        &mut self,
        level: Level,
        best: &Placement,
        group_id: &str,
        group_type: GroupType,
        factory: GroupFactory,
        group_level: Level,
    ) {
        if !self.state.groups.contains_key(group_id) {
            let gr = GroupResource::new(group_id, group_type, factory, group_level);
            self.state.groups.insert(group_id.to_string(), gr);

            info!("find {} ({})", group_type, group_id);
        }

        if group_level != level {
            return;
        }

        let gr = &mut self.state.groups[group_id];
        gr.num_of_placed_servers += 1;

        let host_name = best.resource_name(level).to_string();
        *gr.num_of_placed_servers_of_host
            .entry(host_name)
            .or_insert(0) += 1;

        self.propagate_membership(best, group_id, group_type, level);
    }

    /// Maps the group onto the chosen host and, through the enclosing rack,
    /// onto every sibling host's rack view.
    fn propagate_membership(
        &mut self,
        best: &Placement,
        group_id: &str,
        group_type: GroupType,
        group_level: Level,
    ) {
        let rack_name = self.state.hosts[&best.host_name].rack_name.clone();

        if group_level == Level::Host {
            let chosen_host = &mut self.state.hosts[&best.host_name];
            if !chosen_host.host_memberships.contains_key(group_id) {
                chosen_host
                    .host_memberships
                    .insert(group_id.to_string(), group_type);
            }
        }

        if rack_name != "any" {
            for hr in self.state.hosts.values_mut() {
                if hr.rack_name == rack_name && !hr.rack_memberships.contains_key(group_id) {
                    hr.rack_memberships.insert(group_id.to_string(), group_type);
                }
            }
        }
    }

    /// Applies the reduced amount of resources to the chosen host.
    fn deduct_server_resources(&mut self, best: &Placement, n: NodeId, app: &App) {
        let server = app.nodes[n].as_server().expect("server node");

        let chosen_host = &mut self.state.hosts[&best.host_name];

        chosen_host.host_avail_vcpus -= server.vcpus;
        chosen_host.host_avail_mem -= server.mem;
        chosen_host.host_avail_local_disk -= server.local_volume_size;

        if server.need_numa_alignment() {
            let s_info = server_info(app, server);
            chosen_host.numa.deduct_server_resources(&s_info);
        }

        if chosen_host.host_num_of_placed_servers == 0 {
            self.state.num_of_hosts += 1;
        }
        chosen_host.host_num_of_placed_servers += 1;

        let rack_name = chosen_host.rack_name.clone();
        if rack_name != "any" {
            for hr in self.state.hosts.values_mut() {
                if hr.rack_name == rack_name {
                    hr.rack_avail_vcpus -= server.vcpus;
                    hr.rack_avail_mem -= server.mem;
                    hr.rack_avail_local_disk -= server.local_volume_size;

                    hr.rack_num_of_placed_servers += 1;
                }
            }
        }
    }

    /// Records the final placement decision.
    fn close_node_placement(&mut self, level: Level, best: &Placement, n: NodeId, app: &App) {
        if !self.node_placements.contains_key(&n)
            && (level == Level::Host || !app.nodes[n].is_server())
        {
            self.node_placements.insert(n, best.clone());
        }
    }

    /// Rolls back everything the node's trial deducted, recursing through
    /// affinity group children first.
    fn rollback_resources(&mut self, n: NodeId, app: &App) {
        match &app.nodes[n] {
            PlacementNode::Server(_) => self.rollback_server_resources(n, app),
            PlacementNode::Group(g) => {
                for sg in g.subgroups.clone() {
                    self.rollback_resources(sg, app);
                }
            }
        }

        if let Some(placement) = self.node_placements.get(&n).cloned() {
            let level = placement.level;

            if let Some(g) = app.nodes[n].as_group() {
                self.remove_group(&placement, &g.vid, g.level, level);
            }

            let exclusivities = app.exclusivities_at(n, level);
            if exclusivities.len() == 1 {
                let (rule_id, rule_level) = &exclusivities[0];
                self.remove_exclusivity(&placement, rule_id, *rule_level);
            }

            for rule_id in app.nodes[n].diversity_groups() {
                if let Some(rule) = app.rules.get(rule_id) {
                    self.remove_group(&placement, &rule.id, rule.level, level);
                }
            }
            for rule_id in app.nodes[n].quorum_diversity_groups() {
                if let Some(rule) = app.rules.get(rule_id) {
                    self.remove_group(&placement, &rule.id, rule.level, level);
                }
            }
        }
    }

    fn remove_exclusivity(&mut self, placement: &Placement, rule_id: &str, rule_level: Level) {
        let host_name = placement.resource_name(rule_level).to_string();

        if let Some(gr) = self.state.groups.get_mut(rule_id) {
            gr.num_of_placed_servers -= 1;

            if let Some(count) = gr.num_of_placed_servers_of_host.get_mut(&host_name) {
                *count -= 1;
                if *count == 0 {
                    gr.num_of_placed_servers_of_host.shift_remove(&host_name);
                }
            }

            if gr.num_of_placed_servers == 0 {
                self.state.groups.shift_remove(rule_id);
            }
        }

        let chosen_host = &self.state.hosts[&placement.host_name];
        let rack_name = chosen_host.rack_name.clone();

        if rule_level == Level::Host {
            if chosen_host.host_num_of_placed_servers == 0
                && chosen_host.host_memberships.contains_key(rule_id)
            {
                self.state.hosts[&placement.host_name]
                    .host_memberships
                    .shift_remove(rule_id);

                self.remove_rack_memberships(&rack_name, rule_id);
            }
        } else if chosen_host.rack_num_of_placed_servers == 0 {
            self.remove_rack_memberships(&rack_name, rule_id);
        }
    }

    fn remove_group(
        &mut self,
        placement: &Placement,
        group_id: &str,
        group_level: Level,
        level: Level,
    ) {
        if group_level != level {
            return;
        }

        let host_name = placement.resource_name(level).to_string();

        if let Some(gr) = self.state.groups.get_mut(group_id) {
            gr.num_of_placed_servers -= 1;

            if let Some(count) = gr.num_of_placed_servers_of_host.get_mut(&host_name) {
                *count -= 1;
                if *count == 0 {
                    gr.num_of_placed_servers_of_host.shift_remove(&host_name);
                }
            }

            if gr.num_of_placed_servers == 0 {
                self.state.groups.shift_remove(group_id);
            }
        }

        let exist_group = self
            .state
            .groups
            .get(group_id)
            .map(|gr| gr.num_of_placed_servers_of_host.contains_key(&host_name))
            .unwrap_or(false);

        let chosen_host = &self.state.hosts[&placement.host_name];
        let rack_name = chosen_host.rack_name.clone();

        if level == Level::Host {
            if !exist_group && chosen_host.host_memberships.contains_key(group_id) {
                self.state.hosts[&placement.host_name]
                    .host_memberships
                    .shift_remove(group_id);

                self.remove_rack_memberships(&rack_name, group_id);
            }
        } else if !exist_group {
            self.remove_rack_memberships(&rack_name, group_id);
        }
    }

    fn remove_rack_memberships(&mut self, rack_name: &str, group_id: &str) {
        if rack_name == "any" {
            return;
        }
        for hr in self.state.hosts.values_mut() {
            if hr.rack_name == rack_name {
                hr.rack_memberships.shift_remove(group_id);
            }
        }
    }

    /// Returns the server's resources to the host it was placed on.
    fn rollback_server_resources(&mut self, n: NodeId, app: &App) {
        let Some(placement) = self.node_placements.get(&n).cloned() else {
            return;
        };
        let server = app.nodes[n].as_server().expect("server node");

        let chosen_host = &mut self.state.hosts[&placement.host_name];

        chosen_host.host_avail_vcpus += server.vcpus;
        chosen_host.host_avail_mem += server.mem;
        chosen_host.host_avail_local_disk += server.local_volume_size;

        if server.need_numa_alignment() {
            let s_info = server_info(app, server);
            chosen_host.numa.rollback_server_resources(&s_info);
        }

        chosen_host.host_num_of_placed_servers -= 1;
        if chosen_host.host_num_of_placed_servers == 0 {
            self.state.num_of_hosts -= 1;
        }

        let rack_name = chosen_host.rack_name.clone();
        if rack_name != "any" {
            for hr in self.state.hosts.values_mut() {
                if hr.rack_name == rack_name {
                    hr.rack_avail_vcpus += server.vcpus;
                    hr.rack_avail_mem += server.mem;
                    hr.rack_avail_local_disk += server.local_volume_size;

                    hr.rack_num_of_placed_servers -= 1;
                }
            }
        }

        // If the host was speculatively typed for this trial and now holds
        // nothing, restore its undetermined state.
        let chosen_host = &self.state.hosts[&placement.host_name];
        if chosen_host.host_num_of_placed_servers == 0
            && !chosen_host.old_candidate_host_types.is_empty()
        {
            let flavor_types = app.nodes[n].flavor_types();
            if let Some(family) = flavor_types.first() {
                let (rack_cpus, rack_mem, rack_disk) = {
                    let host = &mut self.state.hosts[&placement.host_name];
                    host.rollback_avail_resources(family);
                    host.candidate_host_types = std::mem::take(&mut host.old_candidate_host_types);
                    (
                        host.rack_avail_vcpus,
                        host.rack_avail_mem,
                        host.rack_avail_local_disk,
                    )
                };
                for (hk, hr) in self.state.hosts.iter_mut() {
                    if hk != &placement.host_name && hr.rack_name == rack_name {
                        hr.rollback_avail_rack_resources(family, rack_cpus, rack_mem, rack_disk);
                    }
                }
            }
        }
    }

    /// Removes placement decisions of the node and its children.
    fn rollback_node_placement(&mut self, n: NodeId, app: &App) {
        self.node_placements.shift_remove(&n);

        if let Some(g) = app.nodes[n].as_group() {
            for sg in g.subgroups.clone() {
                self.rollback_node_placement(sg, app);
            }
        }
    }
}

impl Default for Search {
    fn default() -> Self {
        Self::new()
    }
}

fn ratio(avail: i64, total: i64) -> f64 {
    if total > 0 {
        avail as f64 / total as f64
    } else {
        0.0
    }
}

fn server_info(app: &App, server: &crate::core::node::Server) -> ServerInfo {
    ServerInfo {
        uuid: None,
        stack_id: None,
        stack_name: Some(app.app_name.clone()),
        name: server.name.clone(),
        vcpus: server.vcpus,
        mem: server.mem,
    }
}

/// Splits a node into the servers and groups handled at the next level of
/// search. A group whose declared level is finer than the current level
/// stays intact.
pub fn get_next_placements(app: &App, n: NodeId, level: Level) -> (Vec<NodeId>, Vec<NodeId>) {
    let mut servers = Vec::new();
    let mut groups = Vec::new();

    match &app.nodes[n] {
        PlacementNode::Group(g) => {
            if g.level < level {
                groups.push(n);
            } else {
                for sg in &g.subgroups {
                    match &app.nodes[*sg] {
                        PlacementNode::Group(_) => groups.push(*sg),
                        PlacementNode::Server(_) => servers.push(*sg),
                    }
                }
            }
        }
        PlacementNode::Server(_) => servers.push(n),
    }

    (servers, groups)
}
