//! A level-scoped view of the snapshot: the hosts reachable beneath one
//! chosen ancestor, and the candidate entries the filters narrow.

use indexmap::{IndexMap, IndexSet};

use crate::core::common::Level;
use crate::core::snapshot::{Placement, PlacementState};

pub struct AvailResources {
    pub level: Level,
    /// Host keys in scope at this step.
    pub avail_hosts: IndexSet<String>,
    /// One host key per candidate resource at the current level.
    pub candidates: Vec<String>,
}

impl AvailResources {
    pub fn new(level: Level) -> Self {
        Self {
            level,
            avail_hosts: IndexSet::new(),
            candidates: Vec::new(),
        }
    }

    pub fn set_next_level(&mut self) {
        self.level = self.level.next_down();
    }

    /// Restricts the scope to hosts under the named ancestor: the rack with
    /// that name when descending into a rack, the single host otherwise.
    pub fn set_next_avail_hosts(
        &mut self,
        state: &PlacementState,
        parent_hosts: &IndexSet<String>,
        resource_of_level: &str,
    ) {
        for hk in parent_hosts {
            let h = &state.hosts[hk];
            let matched = match self.level {
                Level::Rack => h.rack_name == resource_of_level,
                Level::Host => h.host_name == resource_of_level,
                Level::Cluster => false,
            };
            if matched {
                self.avail_hosts.insert(hk.clone());
            }
        }
    }

    /// Collapses the scope to one candidate per resource at this level:
    /// one representative host per distinct rack, or every host 1:1.
    pub fn set_candidates(&mut self, state: &PlacementState) {
        match self.level {
            Level::Rack => {
                let mut per_rack: IndexMap<String, String> = IndexMap::new();
                for hk in &self.avail_hosts {
                    per_rack.insert(state.hosts[hk].rack_name.clone(), hk.clone());
                }
                self.candidates = per_rack.into_values().collect();
            }
            _ => {
                self.candidates = self.avail_hosts.iter().cloned().collect();
            }
        }
    }

    /// Looks up the in-scope entry matching a previously pinned placement.
    /// Reserved for re-placement flows.
    pub fn get_candidate(&self, state: &PlacementState, pinned: &Placement) -> Option<String> {
        match self.level {
            Level::Rack => {
                let mut candidate = None;
                for hk in &self.avail_hosts {
                    if state.hosts[hk].rack_name == pinned.rack_name {
                        candidate = Some(hk.clone());
                    }
                }
                candidate
            }
            Level::Host => self.avail_hosts.get(&pinned.host_name).cloned(),
            Level::Cluster => None,
        }
    }
}
