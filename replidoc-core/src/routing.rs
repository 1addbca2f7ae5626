//! Read-preference routing over a known topology.

use crate::config::ReadPreference;
use crate::error::{ClientError, ClientResult};
use crate::topology::{NodeAddress, NodeRole, RoleMap, Topology};

/// Picks the node a read should run against.
///
/// Selection is deterministic: whenever more than one node qualifies, the
/// first qualifying node in topology order wins. Nodes absent from `roles`
/// are treated as unreachable.
pub fn select_node<'t>(
    topology: &'t Topology,
    preference: ReadPreference,
    roles: &RoleMap,
) -> ClientResult<&'t NodeAddress> {
    let role_of = |node: &NodeAddress| roles.get(node).copied();
    let primary = topology
        .iter()
        .find(|node| role_of(node) == Some(NodeRole::Primary));
    let secondary = topology
        .iter()
        .find(|node| role_of(node) == Some(NodeRole::Secondary));

    match preference {
        ReadPreference::Primary => primary.ok_or(ClientError::NoPrimaryAvailable),
        ReadPreference::PrimaryPreferred => primary
            .or(secondary)
            .ok_or_else(|| ClientError::NoReachableNode("no primary or secondary".into())),
        ReadPreference::Secondary => secondary
            .ok_or_else(|| ClientError::NoReachableNode("no secondary available".into())),
        ReadPreference::SecondaryPreferred => secondary
            .or(primary)
            .ok_or_else(|| ClientError::NoReachableNode("no secondary or primary".into())),
        ReadPreference::Nearest => topology
            .iter()
            .find(|node| role_of(node).is_some())
            .ok_or_else(|| ClientError::NoReachableNode("no reachable node".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn addr(port: u16) -> NodeAddress {
        NodeAddress { host: "db".into(), port }
    }

    fn topology() -> Topology {
        Topology::new(vec![addr(1), addr(2), addr(3)])
    }

    fn roles(entries: &[(u16, NodeRole)]) -> RoleMap {
        entries.iter().map(|(port, role)| (addr(*port), *role)).collect()
    }

    #[test]
    fn primary_routes_to_the_primary() {
        let roles = roles(&[(1, NodeRole::Secondary), (2, NodeRole::Primary)]);
        let topology = topology();
        let node = select_node(&topology, ReadPreference::Primary, &roles).unwrap();
        assert_eq!(node, &addr(2));
    }

    #[test]
    fn primary_fails_without_a_primary() {
        let roles = roles(&[(1, NodeRole::Secondary)]);
        let err = select_node(&topology(), ReadPreference::Primary, &roles).unwrap_err();
        assert!(matches!(err, ClientError::NoPrimaryAvailable));
    }

    #[test]
    fn primary_preferred_falls_back_to_a_secondary() {
        let roles = roles(&[(3, NodeRole::Secondary)]);
        let topology = topology();
        let node = select_node(&topology, ReadPreference::PrimaryPreferred, &roles).unwrap();
        assert_eq!(node, &addr(3));
    }

    #[test]
    fn secondary_picks_the_first_secondary_in_topology_order() {
        let roles = roles(&[
            (1, NodeRole::Primary),
            (2, NodeRole::Secondary),
            (3, NodeRole::Secondary),
        ]);
        let topology = topology();
        let node = select_node(&topology, ReadPreference::Secondary, &roles).unwrap();
        assert_eq!(node, &addr(2));
    }

    #[test]
    fn secondary_fails_when_only_a_primary_exists() {
        let roles = roles(&[(1, NodeRole::Primary)]);
        let err = select_node(&topology(), ReadPreference::Secondary, &roles).unwrap_err();
        assert!(matches!(err, ClientError::NoReachableNode(_)));
    }

    #[test]
    fn secondary_preferred_falls_back_to_the_primary() {
        let roles = roles(&[(2, NodeRole::Primary)]);
        let topology = topology();
        let node = select_node(&topology, ReadPreference::SecondaryPreferred, &roles).unwrap();
        assert_eq!(node, &addr(2));
    }

    #[test]
    fn nearest_picks_the_first_reachable_node() {
        let roles = roles(&[(2, NodeRole::Secondary), (3, NodeRole::Primary)]);
        let topology = topology();
        let node = select_node(&topology, ReadPreference::Nearest, &roles).unwrap();
        assert_eq!(node, &addr(2));
    }

    #[test]
    fn nearest_fails_on_an_empty_role_map() {
        let err = select_node(&topology(), ReadPreference::Nearest, &HashMap::new()).unwrap_err();
        assert!(matches!(err, ClientError::NoReachableNode(_)));
    }
}
