//! Common types shared across the placement engine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Hierarchy levels of the datacenter topology, ordered from the finest
/// (host) to the coarsest (cluster).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Host,
    Rack,
    Cluster,
}

impl Level {
    /// Returns the next level to search, one step down; clamps at host.
    pub fn next_down(&self) -> Level {
        match self {
            Level::Cluster => Level::Rack,
            Level::Rack => Level::Host,
            Level::Host => Level::Host,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Level::Host => write!(f, "host"),
            Level::Rack => write!(f, "rack"),
            Level::Cluster => write!(f, "cluster"),
        }
    }
}

/// Type of a resource group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupType {
    Affinity,
    Diversity,
    QuorumDiversity,
    Exclusivity,
    Az,
    Aggregate,
    ServerGroup,
}

impl fmt::Display for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GroupType::Affinity => write!(f, "affinity"),
            GroupType::Diversity => write!(f, "diversity"),
            GroupType::QuorumDiversity => write!(f, "quorum-diversity"),
            GroupType::Exclusivity => write!(f, "exclusivity"),
            GroupType::Az => write!(f, "az"),
            GroupType::Aggregate => write!(f, "aggr"),
            GroupType::ServerGroup => write!(f, "server-group"),
        }
    }
}

/// Origin of a resource group: authored in a placement request or discovered
/// from the cloud platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupFactory {
    Engine,
    Cloud,
}

impl Default for GroupFactory {
    fn default() -> Self {
        GroupFactory::Cloud
    }
}

/// Identity and demand of a server occupying a NUMA cell.
///
/// Servers are matched by identity with the following precedence:
/// uuid, then stack id + name, then stack name + name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub stack_id: Option<String>,
    #[serde(default)]
    pub stack_name: Option<String>,
    pub name: String,
    pub vcpus: i64,
    pub mem: i64,
}

impl ServerInfo {
    pub fn matches(&self, other: &ServerInfo) -> bool {
        if let (Some(a), Some(b)) = (&self.uuid, &other.uuid) {
            if a == b {
                return true;
            }
        }
        if let (Some(a), Some(b)) = (&self.stack_id, &other.stack_id) {
            if a == b && self.name == other.name {
                return true;
            }
        }
        if let (Some(a), Some(b)) = (&self.stack_name, &other.stack_name) {
            if a == b && self.name == other.name {
                return true;
            }
        }
        false
    }
}
