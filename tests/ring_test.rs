//! Ring placement properties

use ringkv::common::{ring_position, vnode_label, ConsistentHashRing, NodeSpec};
use ringkv::coordinator::PlacementManager;
use std::collections::HashSet;

fn ring(nodes: &[(&str, usize)], replicas: usize) -> ConsistentHashRing {
    let mut ring = ConsistentHashRing::new(replicas);
    for (node, weight) in nodes {
        ring.add_node(node, *weight);
    }
    ring
}

#[test]
fn test_virtual_node_count_is_replicas_times_weight() {
    let ring = ring(&[("A", 1), ("B", 2), ("C", 3)], 4);
    assert_eq!(ring.virtual_node_count(), 4 * (1 + 2 + 3));
    assert_eq!(ring.positions().len(), ring.virtual_node_count());
}

#[test]
fn test_positions_sorted_and_unique() {
    let ring = ring(&[("A", 1), ("B", 1), ("C", 1), ("D", 5)], 10);
    assert!(ring.positions().windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_abc_ring_places_foo_on_all_three() {
    let ring = ring(&[("A", 1), ("B", 1), ("C", 1)], 3);
    assert_eq!(ring.virtual_node_count(), 9);

    let list = ring.preference_list("foo", 3);
    assert_eq!(list.len(), 3);
    let owners: HashSet<_> = list.iter().map(String::as_str).collect();
    assert_eq!(owners, HashSet::from(["A", "B", "C"]));
    assert_eq!(list[0], ring.coordinator("foo").unwrap().owner);
}

#[test]
fn test_placement_is_deterministic_across_instances() {
    let nodes = [("127.0.0.1:6001", 1), ("127.0.0.1:6002", 2), ("127.0.0.1:6003", 1)];
    let a = ring(&nodes, 5);
    let b = ring(&nodes, 5);
    assert_eq!(a.positions(), b.positions());
    for i in 0..100 {
        let key = format!("user:{}", i);
        assert_eq!(a.preference_list(&key, 3), b.preference_list(&key, 3));
    }
}

#[test]
fn test_preference_list_never_exceeds_distinct_nodes() {
    let ring = ring(&[("A", 3), ("B", 1)], 8);
    for i in 0..50 {
        let list = ring.preference_list(&format!("k{}", i), 5);
        assert_eq!(list.len(), 2);
        assert_ne!(list[0], list[1]);
    }
}

#[test]
fn test_coordinator_is_first_position_at_or_after_key() {
    let ring = ring(&[("A", 1), ("B", 1), ("C", 1)], 3);
    for i in 0..50 {
        let key = format!("key-{}", i);
        let h = ring_position(&key);
        let expected = ring
            .positions()
            .iter()
            .copied()
            .find(|&p| p >= h)
            .unwrap_or(ring.positions()[0]);
        assert_eq!(ring.coordinator(&key).unwrap().position, expected);
    }
}

#[test]
fn test_virtual_node_labels_follow_owner() {
    let ring = ring(&[("A", 2)], 3);
    let labels: HashSet<String> = (0..6).map(|i| vnode_label("A", i)).collect();
    for key in ["x", "y", "z", "foo"] {
        let vnode = ring.coordinator(key).unwrap();
        assert_eq!(vnode.owner, "A");
        assert!(labels.contains(&vnode.label));
    }
}

#[test]
fn test_placement_manager_growth_keeps_lists_distinct() {
    let manager = PlacementManager::with_nodes(
        3,
        3,
        &[NodeSpec::new("A", 1), NodeSpec::new("B", 1)],
    );
    assert_eq!(manager.preference_list("foo").unwrap().len(), 2);

    manager.add_node("C", 1);
    manager.add_node("D", 2);
    let list = manager.preference_list("foo").unwrap();
    assert_eq!(list.len(), 3);
    let distinct: HashSet<_> = list.iter().collect();
    assert_eq!(distinct.len(), 3);
}
