//! Testing utilities for the CBAM flow workspace
//!
//! Shared graph fixtures and wire-record builders.

#![allow(missing_docs)]

use cbam_graph::{
    CbamMetrics, ConnectionValidator, EdgeDraft, EdgeId, EdgeRecord, GraphStore, Node, NodeRecord,
    StreamKind,
};

/// Add a process node named after its id in upper case
pub fn add_process(store: &mut GraphStore, id: &str) {
    store
        .add_node(Node::process(id, id.to_uppercase()))
        .unwrap();
}

/// Connect `source` to `target` with a material stream
pub fn link_material(
    store: &mut GraphStore,
    source: &str,
    target: &str,
    flow_rate: f64,
    carbon_intensity: Option<f64>,
) -> EdgeId {
    let mut draft = EdgeDraft::new(source, target).stream(StreamKind::Material, flow_rate, "t");
    draft.stream.carbon_intensity = carbon_intensity;
    store
        .connect(&draft, &ConnectionValidator::default())
        .unwrap()
}

/// Processes `ids` linked in order, every stream at `flow_rate` and
/// `carbon_intensity`
pub fn linear_chain(ids: &[&str], flow_rate: f64, carbon_intensity: f64) -> GraphStore {
    let mut store = GraphStore::new();
    for id in ids {
        add_process(&mut store, id);
    }
    for pair in ids.windows(2) {
        link_material(&mut store, pair[0], pair[1], flow_rate, Some(carbon_intensity));
    }
    store
}

/// `A -> B -> C` with intensities 1 and 2 at flow 10; total emission 30
pub fn abc_chain() -> GraphStore {
    let mut store = GraphStore::new();
    for id in ["a", "b", "c"] {
        add_process(&mut store, id);
    }
    link_material(&mut store, "a", "b", 10.0, Some(1.0));
    link_material(&mut store, "b", "c", 10.0, Some(2.0));
    store
}

/// Three processes carrying metrics plus a product, no streams
pub fn metered_processes() -> GraphStore {
    let mut store = GraphStore::new();
    store
        .add_node(Node::process("p1", "Sintering").with_metrics(CbamMetrics::new(1.5, 100.0, 20.0)))
        .unwrap();
    store
        .add_node(Node::process("p2", "Blast furnace").with_metrics(CbamMetrics::new(2.5, 80.0, 40.0)))
        .unwrap();
    store
        .add_node(
            Node::process("p3", "Rolling")
                .with_metrics(CbamMetrics {
                    carbon_intensity: Some(0.5),
                    material_flow: None,
                    energy_consumption: Some(10.0),
                }),
        )
        .unwrap();
    store.add_node(Node::product("steel", "Hot-rolled coil")).unwrap();
    store
}

/// Parse node records from JSON
pub fn node_records(value: serde_json::Value) -> Vec<NodeRecord> {
    serde_json::from_value(value).unwrap()
}

/// Parse edge records from JSON
pub fn edge_records(value: serde_json::Value) -> Vec<EdgeRecord> {
    serde_json::from_value(value).unwrap()
}
