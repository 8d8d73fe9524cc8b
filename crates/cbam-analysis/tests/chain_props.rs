use cbam_analysis::{ChainDetectionEngine, DetectionConfig, LayoutEngine};
use cbam_graph::{BoundaryKind, GraphStore, GroupAggregator, NodeId};
use cbam_test_utils::{
    abc_chain, add_process, edge_records, link_material, linear_chain, metered_processes,
    node_records,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

#[test]
fn abc_chain_detected_with_total() {
    let chains = ChainDetectionEngine::default().detect(&abc_chain());
    assert_eq!(chains.len(), 1);
    assert_eq!(chains[0].chain_length, 3);
    assert_eq!(chains[0].total_emission, Some(30.0));
    assert_eq!(
        chains[0].process_ids,
        vec![NodeId::new("a"), NodeId::new("b"), NodeId::new("c")]
    );
}

#[test]
fn chain_ids_stable_across_runs() {
    let store = abc_chain();
    let engine = ChainDetectionEngine::default();
    let first: Vec<_> = engine.detect(&store).into_iter().map(|c| c.id).collect();
    let second: Vec<_> = engine.detect(&store).into_iter().map(|c| c.id).collect();
    assert_eq!(first, second);
}

#[test]
fn detected_chain_groups_into_integrated_process() {
    let mut store = abc_chain();
    let chain = ChainDetectionEngine::default().detect(&store).remove(0);
    let agg = GroupAggregator::new();
    let group = agg
        .group_chain(&mut store, &chain, BoundaryKind::Internal)
        .unwrap();
    assert_eq!(store.group(&group).unwrap().member_count(), 3);
}

#[test]
fn independent_chains_listed_in_store_order() {
    let mut store = linear_chain(&["x1", "x2"], 1.0, 1.0);
    for id in ["y1", "y2", "y3"] {
        add_process(&mut store, id);
    }
    link_material(&mut store, "y1", "y2", 2.0, Some(1.0));
    link_material(&mut store, "y2", "y3", 2.0, Some(1.0));

    let chains = ChainDetectionEngine::new(DetectionConfig::default()).detect(&store);
    let starts: Vec<&str> = chains.iter().map(|c| c.start_process_id.as_str()).collect();
    assert_eq!(starts, vec!["x1", "y1"]);
    assert_eq!(chains[1].total_emission, Some(4.0));
}

#[test]
fn unconnected_nodes_share_one_layer() {
    let store = metered_processes();
    let result = LayoutEngine::default()
        .layout_store(&store, &Default::default())
        .unwrap();
    assert_eq!(result.layer_count, 1);
    assert_eq!(result.positions.len(), 4);
    let xs: std::collections::BTreeSet<u64> =
        result.positions.values().map(|p| p.x.to_bits()).collect();
    assert_eq!(xs.len(), 1);
}

#[test]
fn reverse_stream_on_load_does_not_hide_chain() {
    let (store, report) = GraphStore::hydrate(
        node_records(serde_json::json!([
            {"id": "a", "type": "process", "data": {"name": "A"}},
            {"id": "b", "type": "process", "data": {"name": "B"}}
        ])),
        edge_records(serde_json::json!([
            {"id": "ab", "source": "a", "target": "b", "sourceHandle": "a-right", "targetHandle": "b-left",
             "data": {"streamKind": "material", "flowRate": 5, "carbonIntensity": 2}},
            {"id": "ba", "source": "b", "target": "a", "sourceHandle": "b-right", "targetHandle": "a-left",
             "data": {"streamKind": "material", "flowRate": 5}}
        ])),
    );
    assert_eq!(report.issues.len(), 1);
    let detected = ChainDetectionEngine::default().detect_with_report(&store);
    assert!(detected.cycles.is_empty());
    assert_eq!(detected.chains.len(), 1);
    assert_eq!(detected.chains[0].total_emission, Some(10.0));
}

#[test]
fn no_material_streams_no_chains() {
    assert!(ChainDetectionEngine::default().detect(&metered_processes()).is_empty());
}

proptest! {
    #[test]
    fn prop_linear_chain_emission(
        len in 2..12usize,
        rate in 0.0..1_000.0f64,
        ci in 0.0..10.0f64,
    ) {
        let names: Vec<String> = (0..len).map(|i| format!("p{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let store = linear_chain(&refs, rate, ci);
        let chains = ChainDetectionEngine::default().detect(&store);
        prop_assert_eq!(chains.len(), 1);
        prop_assert_eq!(chains[0].chain_length, len);
        let expected = rate * ci * (len - 1) as f64;
        let total = chains[0].total_emission.unwrap();
        prop_assert!((total - expected).abs() <= 1e-6 * expected.max(1.0));
    }

    #[test]
    fn prop_layout_is_deterministic_and_total(
        node_count in 1..12usize,
        pairs in proptest::collection::vec((0..12usize, 0..12usize), 0..30),
    ) {
        let nodes: Vec<NodeId> = (0..node_count).map(|i| NodeId::new(format!("n{i}"))).collect();
        let edges: Vec<(NodeId, NodeId)> = pairs
            .into_iter()
            .filter(|(a, b)| *a < node_count && *b < node_count)
            .map(|(a, b)| (nodes[a].clone(), nodes[b].clone()))
            .collect();
        let engine = LayoutEngine::default();
        let first = engine.layout(&nodes, &edges).unwrap();
        let second = engine.layout(&nodes, &edges).unwrap();
        prop_assert_eq!(first.positions.len(), node_count);
        prop_assert_eq!(first, second);
    }
}
