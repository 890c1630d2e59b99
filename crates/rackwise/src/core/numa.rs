//! Tracking of per-host NUMA cell occupancy.
//!
//! Each host is modeled with two NUMA cells. Hosts report only aggregate
//! capacity, so the per-cell split and the set of servers pinned to each cell
//! are maintained here and adjusted as placements are made and undone.

use serde::{Deserialize, Serialize};

use crate::core::common::ServerInfo;

/// Identifies one of the two NUMA cells of a host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellId {
    Cell0,
    Cell1,
}

/// A single NUMA cell: remaining capacity plus the servers placed in it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NumaCell {
    pub cpus: i64,
    pub mem: i64,
    pub server_list: Vec<ServerInfo>,
}

impl NumaCell {
    pub fn new() -> Self {
        Self {
            cpus: 0,
            mem: 0,
            server_list: Vec::new(),
        }
    }
}

impl Default for NumaCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Two-cell NUMA model of a host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Numa {
    pub cell_0: NumaCell,
    pub cell_1: NumaCell,
}

impl Numa {
    pub fn new() -> Self {
        Self {
            cell_0: NumaCell::new(),
            cell_1: NumaCell::new(),
        }
    }

    /// Splits the host CPU capacity across the two cells. Cell 0 gets the
    /// floor half, cell 1 the floor half plus the remainder.
    pub fn init_cpus(&mut self, cpus: i64) {
        let half = cpus / 2;
        self.cell_0.cpus = half;
        self.cell_1.cpus = half + cpus % 2;
    }

    /// Splits the host memory capacity across the two cells, same scheme
    /// as `init_cpus`.
    pub fn init_mem(&mut self, mem: i64) {
        let half = mem / 2;
        self.cell_0.mem = half;
        self.cell_1.mem = half + mem % 2;
    }

    fn cell(&self, id: CellId) -> &NumaCell {
        match id {
            CellId::Cell0 => &self.cell_0,
            CellId::Cell1 => &self.cell_1,
        }
    }

    fn cell_mut(&mut self, id: CellId) -> &mut NumaCell {
        match id {
            CellId::Cell0 => &mut self.cell_0,
            CellId::Cell1 => &mut self.cell_1,
        }
    }

    /// Returns true if either cell can fit the requested cpus and memory.
    pub fn has_enough_resources(&self, vcpus: i64, mem: i64) -> bool {
        (self.cell_0.cpus >= vcpus && self.cell_0.mem >= mem)
            || (self.cell_1.cpus >= vcpus && self.cell_1.mem >= mem)
    }

    /// Records an already-running server into the given cell, charging its
    /// demand against that cell.
    pub fn add_server(&mut self, cell_id: CellId, server: &ServerInfo) {
        let cell = self.cell_mut(cell_id);
        cell.cpus -= server.vcpus;
        cell.mem -= server.mem;
        cell.server_list.push(server.clone());
    }

    /// Places a server into the cell with more remaining CPU capacity,
    /// preferring cell 0 on ties. Any stale record of the same server is
    /// removed first so a re-placement does not double-count.
    pub fn deduct_server_resources(&mut self, server: &ServerInfo) -> CellId {
        self.pop_cell_of_server(server);
        let cell_id = if self.cell_0.cpus >= self.cell_1.cpus {
            CellId::Cell0
        } else {
            CellId::Cell1
        };
        let cell = self.cell_mut(cell_id);
        cell.cpus -= server.vcpus;
        cell.mem -= server.mem;
        cell.server_list.push(server.clone());
        cell_id
    }

    /// Returns the server's resources to the cell it occupies and removes it.
    pub fn rollback_server_resources(&mut self, server: &ServerInfo) {
        if let Some(cell_id) = self.pop_cell_of_server(server) {
            let cell = self.cell_mut(cell_id);
            cell.cpus += server.vcpus;
            cell.mem += server.mem;
        }
    }

    /// Finds the cell holding the given server, without removing it.
    pub fn cell_of_server(&self, server: &ServerInfo) -> Option<CellId> {
        for id in [CellId::Cell0, CellId::Cell1] {
            if self.cell(id).server_list.iter().any(|s| s.matches(server)) {
                return Some(id);
            }
        }
        None
    }

    /// Removes the given server from whichever cell holds it and returns
    /// that cell, or None if the server is not recorded.
    pub fn pop_cell_of_server(&mut self, server: &ServerInfo) -> Option<CellId> {
        for id in [CellId::Cell0, CellId::Cell1] {
            let cell = self.cell_mut(id);
            if let Some(pos) = cell.server_list.iter().position(|s| s.matches(server)) {
                cell.server_list.remove(pos);
                return Some(id);
            }
        }
        None
    }

    /// Charges CPU usage not attributable to any known server, splitting it
    /// evenly with the remainder going to cell 1.
    pub fn apply_unknown_cpus(&mut self, cpus: i64) {
        if cpus > 0 {
            let half = cpus / 2;
            self.cell_0.cpus -= half;
            self.cell_1.cpus -= half + cpus % 2;
        } else if cpus < 0 {
            let cpus = -cpus;
            let half = cpus / 2;
            self.cell_0.cpus += half;
            self.cell_1.cpus += half + cpus % 2;
        }
    }

    /// Charges memory usage not attributable to any known server, same
    /// scheme as `apply_unknown_cpus`.
    pub fn apply_unknown_mem(&mut self, mem: i64) {
        if mem > 0 {
            let half = mem / 2;
            self.cell_0.mem -= half;
            self.cell_1.mem -= half + mem % 2;
        } else if mem < 0 {
            let mem = -mem;
            let half = mem / 2;
            self.cell_0.mem += half;
            self.cell_1.mem += half + mem % 2;
        }
    }

    /// Re-bases the per-cell CPU split on a new host capacity while keeping
    /// the amounts currently used by each cell.
    pub fn adjust_cpus(&mut self, old_cpus: i64, new_cpus: i64) {
        let old_half = old_cpus / 2;
        let used_0 = old_half - self.cell_0.cpus;
        let used_1 = (old_half + old_cpus % 2) - self.cell_1.cpus;
        let new_half = new_cpus / 2;
        self.cell_0.cpus = new_half - used_0;
        self.cell_1.cpus = (new_half + new_cpus % 2) - used_1;
    }

    /// Re-bases the per-cell memory split on a new host capacity while
    /// keeping the amounts currently used by each cell.
    pub fn adjust_mem(&mut self, old_mem: i64, new_mem: i64) {
        let old_half = old_mem / 2;
        let used_0 = old_half - self.cell_0.mem;
        let used_1 = (old_half + old_mem % 2) - self.cell_1.mem;
        let new_half = new_mem / 2;
        self.cell_0.mem = new_half - used_0;
        self.cell_1.mem = (new_half + new_mem % 2) - used_1;
    }
}

impl Default for Numa {
    fn default() -> Self {
        Self::new()
    }
}
