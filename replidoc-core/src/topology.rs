//! Static description of the replica set: node addresses and roles.
//!
//! A [`Topology`] is the ordered, deduplicated seed list of candidate hosts.
//! Which node currently holds which role is discovered by the transport
//! collaborator and delivered as a [`RoleMap`]; this crate only consumes it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{ClientError, ClientResult};

/// Address of one candidate node in the replica set. Immutable once
/// constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeAddress {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for NodeAddress {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() => Ok(NodeAddress {
                host: host.to_string(),
                port: port
                    .parse()
                    .map_err(|_| ClientError::Configuration(format!("invalid port in host entry '{s}'")))?,
            }),
            _ => Err(ClientError::Configuration(format!("invalid host entry '{s}', expected host:port"))),
        }
    }
}

/// Current role of a reachable node. Nodes absent from a [`RoleMap`] are
/// treated as unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// Accepts writes.
    Primary,
    /// Read-only copy.
    Secondary,
}

/// Map from node address to its currently known role, produced by the
/// transport's role discovery.
pub type RoleMap = HashMap<NodeAddress, NodeRole>;

/// Ordered sequence of candidate node addresses. Order is irrelevant for
/// correctness but makes `nearest` selection deterministic; entries are
/// deduplicated by host:port, first occurrence wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    nodes: Vec<NodeAddress>,
}

impl Topology {
    /// Creates a topology from a list of addresses, deduplicating by
    /// host:port while preserving first-seen order.
    pub fn new(nodes: impl IntoIterator<Item = NodeAddress>) -> Self {
        let mut deduped: Vec<NodeAddress> = Vec::new();
        for node in nodes {
            if !deduped.contains(&node) {
                deduped.push(node);
            }
        }
        Self { nodes: deduped }
    }

    /// Parses a comma-delimited `hosts` entry. Entries without an explicit
    /// port use `default_port`.
    ///
    /// ```ignore
    /// let topology = Topology::from_hosts("db1:27017,db2,db1:27017", 27017)?;
    /// assert_eq!(topology.len(), 2);
    /// ```
    pub fn from_hosts(hosts: &str, default_port: u16) -> ClientResult<Self> {
        let mut nodes = Vec::new();
        for entry in hosts.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            nodes.push(if entry.contains(':') {
                entry.parse()?
            } else {
                NodeAddress::new(entry, default_port)
            });
        }
        if nodes.is_empty() {
            return Err(ClientError::Configuration("hosts list is empty".into()));
        }
        Ok(Self::new(nodes))
    }

    pub fn nodes(&self) -> &[NodeAddress] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeAddress> {
        self.nodes.iter()
    }
}

impl<'a> IntoIterator for &'a Topology {
    type Item = &'a NodeAddress;
    type IntoIter = std::slice::Iter<'a, NodeAddress>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}
