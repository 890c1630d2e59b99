//! Entry point turning a parsed application into final server placements.

use log::{info, warn};
use serde::Serialize;

use crate::core::app::App;
use crate::core::common::ServerInfo;
use crate::core::inventory::Resource;
use crate::core::node::PlacementNode;
use crate::core::numa::CellId;
use crate::core::search::Search;

/// Deadline for one placement turn. The engine checks it before and after
/// the search, not inside it.
pub trait TurnLease {
    fn is_expired(&self) -> bool;
}

/// Lease that never expires.
pub struct NoLease;

impl TurnLease for NoLease {
    fn is_expired(&self) -> bool {
        false
    }
}

/// Final placement of one server.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ServerPlacement {
    pub vid: String,
    pub host: String,
    /// Enclosing rack, when the host belongs to one.
    pub host_group: Option<String>,
    /// NUMA cell the server was aligned to, when alignment was requested.
    pub numa: Option<CellId>,
}

pub struct Optimizer {
    pub search: Search,
}

impl Optimizer {
    pub fn new() -> Self {
        Self {
            search: Search::new(),
        }
    }

    /// Places the app over the given resource status. Returns the server
    /// placements, or None with the failure recorded in `app.status`.
    pub fn place(
        &mut self,
        app: &mut App,
        resource: &Resource,
        lease: &dyn TurnLease,
    ) -> Option<Vec<ServerPlacement>> {
        app.set_weight(resource);
        app.set_optimization_priority(resource);

        if lease.is_expired() {
            app.status = "timeout".to_string();
            warn!("timed out before search");
            return None;
        }

        if !self.search.place(app, resource) {
            if app.status == "ok" {
                app.status = "failed".to_string();
            }
            return None;
        }

        if lease.is_expired() {
            app.status = "timeout".to_string();
            warn!("timed out after search");
            return None;
        }

        let placements = self.collect_placements(app);
        info!("successfully placed app = {}", app.app_name);

        Some(placements)
    }

    fn collect_placements(&mut self, app: &App) -> Vec<ServerPlacement> {
        let mut placements = Vec::new();

        for (n, p) in &self.search.node_placements {
            let server = match &app.nodes[*n] {
                PlacementNode::Server(s) => s,
                PlacementNode::Group(_) => continue,
            };

            let host_group = if p.rack_name != "any" {
                Some(p.rack_name.clone())
            } else {
                None
            };

            let numa = if server.need_numa_alignment() {
                let s_info = ServerInfo {
                    uuid: None,
                    stack_id: None,
                    stack_name: Some(app.app_name.clone()),
                    name: server.name.clone(),
                    vcpus: server.vcpus,
                    mem: server.mem,
                };
                self.search.state.hosts[&p.host_name]
                    .numa
                    .pop_cell_of_server(&s_info)
            } else {
                None
            };

            placements.push(ServerPlacement {
                vid: server.vid.clone(),
                host: p.host_name.clone(),
                host_group,
                numa,
            });
        }

        placements
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}
