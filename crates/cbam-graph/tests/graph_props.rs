use cbam_graph::{
    BoundaryKind, ConnectionError, ConnectionValidator, EdgeDraft, GraphStore, GroupAggregator,
    Node, NodeId, StreamKind,
};
use proptest::prelude::*;

fn build_store(node_count: usize, pairs: &[(usize, usize)]) -> GraphStore {
    let mut store = GraphStore::new();
    for i in 0..node_count {
        store
            .add_node(Node::process(format!("n{i}"), format!("P{i}")))
            .unwrap();
    }
    let validator = ConnectionValidator::default();
    for (from, to) in pairs {
        if *from < node_count && *to < node_count {
            // Rejections (self-loops, duplicates) are expected and ignored.
            let _ = store.connect(
                &EdgeDraft::new(format!("n{from}"), format!("n{to}")),
                &validator,
            );
        }
    }
    store
}

proptest! {
    #[test]
    fn prop_no_dangling_edges_after_removal(
        node_count in 1..15usize,
        pairs in proptest::collection::vec((0..15usize, 0..15usize), 0..40),
        removals in proptest::collection::vec(0..15usize, 0..10),
    ) {
        let mut store = build_store(node_count, &pairs);
        for idx in removals {
            let id = NodeId::new(format!("n{idx}"));
            let _ = store.remove_node(&id);
            // Invariant: nothing references a removed node.
            prop_assert!(store.edges().all(|e| !e.touches(&id)));
            prop_assert!(store.integrity_issues().is_empty());
        }
    }

    #[test]
    fn prop_self_loop_always_rejected(
        node_count in 1..10usize,
        pairs in proptest::collection::vec((0..10usize, 0..10usize), 0..20),
        pick in 0..10usize,
    ) {
        let store = build_store(node_count, &pairs);
        let snapshot = store.clone();
        let id = format!("n{}", pick % node_count);
        let result = ConnectionValidator::default().validate(&EdgeDraft::new(id.clone(), id), &store);
        prop_assert_eq!(result, Err(ConnectionError::SelfLoop));
        prop_assert_eq!(store, snapshot);
    }

    #[test]
    fn prop_reverse_of_existing_edge_is_duplicate(
        node_count in 2..10usize,
        pairs in proptest::collection::vec((0..10usize, 0..10usize), 1..20),
        kind in prop_oneof![
            Just(StreamKind::Material),
            Just(StreamKind::Energy),
            Just(StreamKind::Carbon),
            Just(StreamKind::Waste),
        ],
    ) {
        let store = build_store(node_count, &pairs);
        let validator = ConnectionValidator::default();
        for edge in store.edges() {
            let reverse = EdgeDraft::new(edge.target.clone(), edge.source.clone())
                .stream(kind, 1.0, "t");
            let is_duplicate = matches!(
                validator.validate(&reverse, &store),
                Err(ConnectionError::DuplicateEdge { .. })
            );
            prop_assert!(is_duplicate);
        }
    }

    #[test]
    fn prop_add_member_idempotent(
        node_count in 2..10usize,
        member in 0..10usize,
        repeats in 1..4usize,
    ) {
        let mut once = build_store(node_count, &[]);
        let agg = GroupAggregator::new();
        let group = agg
            .create_group(&mut once, [NodeId::new("n0")], BoundaryKind::Internal, "G")
            .unwrap();
        let mut many = once.clone();
        let target = NodeId::new(format!("n{}", member % node_count));

        agg.add_member(&mut once, &group, &target).unwrap();
        for _ in 0..repeats {
            agg.add_member(&mut many, &group, &target).unwrap();
        }
        prop_assert_eq!(
            &once.group(&group).unwrap().members,
            &many.group(&group).unwrap().members
        );
    }
}
