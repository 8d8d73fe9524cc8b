use cbam_graph::{
    EdgeId, EdgeRecord, GraphIntegrityError, GraphStore, NodeId, NodeKind, NodeRecord,
    ValidatorConfig,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn nodes(value: serde_json::Value) -> Vec<NodeRecord> {
    serde_json::from_value(value).unwrap()
}

fn edges(value: serde_json::Value) -> Vec<EdgeRecord> {
    serde_json::from_value(value).unwrap()
}

#[test]
fn dangling_edge_dropped_rest_kept() {
    let (store, report) = GraphStore::hydrate(
        nodes(json!([
            {"id": "a", "type": "process", "position": {"x": 0, "y": 0}, "data": {"name": "A"}},
            {"id": "b", "type": "process", "position": {"x": 200, "y": 0}, "data": {"name": "B"}}
        ])),
        edges(json!([
            {"id": "ab", "source": "a", "target": "b", "sourceHandle": "a-right", "targetHandle": "b-left",
             "type": "default", "data": {"streamKind": "material", "flowRate": 10, "unit": "t"}},
            {"id": "ax", "source": "a", "target": "ghost", "sourceHandle": "a-right", "targetHandle": "ghost-left",
             "type": "default", "data": {"streamKind": "material", "flowRate": 1, "unit": "t"}}
        ])),
    );
    assert_eq!(store.node_count(), 2);
    assert_eq!(store.edge_count(), 1);
    assert_eq!(
        report.issues,
        vec![GraphIntegrityError::DanglingEdge {
            edge: "ax".into(),
            missing: NodeId::new("ghost"),
        }]
    );
    assert_eq!(report.edges_loaded, 1);
}

#[test]
fn group_members_repaired_on_load() {
    let (store, report) = GraphStore::hydrate(
        nodes(json!([
            {"id": "p", "type": "process", "data": {"name": "P"}},
            {"id": "g2", "type": "group", "data": {"label": "Other", "members": []}},
            {"id": "g", "type": "group", "data": {"label": "G", "members": ["p", "g", "g2", "missing"]}}
        ])),
        vec![],
    );
    let group = store.group(&NodeId::new("g")).unwrap();
    assert_eq!(group.members.iter().map(NodeId::as_str).collect::<Vec<_>>(), vec!["p"]);
    assert_eq!(report.issues.len(), 3);
    assert!(store.integrity_issues().is_empty());
}

#[test]
fn malformed_and_duplicate_records_dropped() {
    let (store, report) = GraphStore::hydrate(
        nodes(json!([
            {"id": "a", "type": "process", "data": {"name": "A"}},
            {"id": "a", "type": "product", "data": {"name": "dup"}},
            {"id": "b", "type": "process", "data": {"name": 42}}
        ])),
        edges(json!([
            {"id": "loop", "source": "a", "target": "a", "sourceHandle": "a-right", "targetHandle": "a-left"},
            {"id": "bad", "source": "a", "target": "a", "sourceHandle": "a-middle", "targetHandle": "a-left"}
        ])),
    );
    assert_eq!(store.node_count(), 1);
    assert_eq!(store.node(&NodeId::new("a")).unwrap().kind(), NodeKind::Process);
    assert_eq!(store.edge_count(), 0);
    assert!(matches!(report.issues[0], GraphIntegrityError::DuplicateNode(_)));
    assert!(matches!(report.issues[1], GraphIntegrityError::MalformedNode { .. }));
    assert!(matches!(report.issues[2], GraphIntegrityError::SelfLoopOnLoad(_)));
    assert!(matches!(report.issues[3], GraphIntegrityError::MalformedEdge { .. }));
}

#[test]
fn hydrate_preserves_record_order() {
    let (store, _) = GraphStore::hydrate(
        nodes(json!([
            {"id": "z", "type": "process", "data": {"name": "Z"}},
            {"id": "a", "type": "annotation", "data": {"text": "hello"}},
            {"id": "m", "type": "product", "data": {"name": "Clinker", "cnCode": "2523 10 00"}}
        ])),
        vec![],
    );
    let order: Vec<&str> = store.nodes().map(|n| n.id.as_str()).collect();
    assert_eq!(order, vec!["z", "a", "m"]);
}

#[test]
fn unknown_node_type_dropped_rest_kept() {
    let (store, report) = GraphStore::hydrate(
        nodes(json!([
            {"id": "a", "type": "process", "data": {"name": "A"}},
            {"id": "b", "type": "custom", "data": {"name": "B"}}
        ])),
        edges(json!([
            {"id": "ab", "source": "a", "target": "b", "sourceHandle": "a-right", "targetHandle": "b-left"}
        ])),
    );
    assert_eq!(store.node_count(), 1);
    assert!(matches!(
        &report.issues[0],
        GraphIntegrityError::MalformedNode { id, .. } if id == "b"
    ));
    assert!(matches!(report.issues[1], GraphIntegrityError::DanglingEdge { .. }));
}

#[test]
fn unknown_stream_kind_dropped_rest_kept() {
    let (store, report) = GraphStore::hydrate(
        nodes(json!([
            {"id": "a", "type": "process", "data": {"name": "A"}},
            {"id": "b", "type": "process", "data": {"name": "B"}},
            {"id": "c", "type": "process", "data": {"name": "C"}}
        ])),
        edges(json!([
            {"id": "ab", "source": "a", "target": "b", "sourceHandle": "a-right", "targetHandle": "b-left",
             "data": {"streamKind": "steam", "flowRate": 3}},
            {"id": "bc", "source": "b", "target": "c", "sourceHandle": "b-right", "targetHandle": "c-left",
             "data": {"streamKind": "energy", "flowRate": 3}}
        ])),
    );
    assert_eq!(store.edge_count(), 1);
    assert!(store.edge(&EdgeId::new("bc")).is_some());
    assert!(matches!(
        &report.issues[..],
        [GraphIntegrityError::MalformedEdge { id, .. }] if id == "ab"
    ));
}

#[test]
fn nameless_processes_load() {
    let (store, report) = GraphStore::hydrate(
        nodes(json!([
            {"id": "p", "type": "process", "data": {}},
            {"id": "q", "type": "process", "data": {"label": "Kiln"}},
            {"id": "r", "type": "product"}
        ])),
        vec![],
    );
    assert!(report.is_clean());
    assert_eq!(store.node_count(), 3);
    assert_eq!(store.node(&NodeId::new("p")).unwrap().data.label(), "");
}

#[test]
fn reverse_duplicate_pair_dropped() {
    let records = edges(json!([
        {"id": "ab", "source": "a", "target": "b", "sourceHandle": "a-right", "targetHandle": "b-left",
         "data": {"streamKind": "material", "flowRate": 1}},
        {"id": "ba", "source": "b", "target": "a", "sourceHandle": "b-right", "targetHandle": "a-left",
         "data": {"streamKind": "material", "flowRate": 1}},
        {"id": "ba-waste", "source": "b", "target": "a", "sourceHandle": "b-bottom", "targetHandle": "a-bottom",
         "data": {"streamKind": "waste", "flowRate": 1}}
    ]));
    let pair = || {
        nodes(json!([
            {"id": "a", "type": "process", "data": {"name": "A"}},
            {"id": "b", "type": "process", "data": {"name": "B"}}
        ]))
    };

    let (store, report) = GraphStore::hydrate(pair(), records.clone());
    assert_eq!(store.edge_count(), 1);
    assert_eq!(
        report.issues,
        vec![
            GraphIntegrityError::DuplicateEdge(EdgeId::new("ba")),
            GraphIntegrityError::DuplicateEdge(EdgeId::new("ba-waste")),
        ]
    );

    let (store, report) = GraphStore::hydrate_with(
        pair(),
        records,
        ValidatorConfig::new().with_stream_kind_in_key(true),
    );
    assert_eq!(store.edge_count(), 2);
    assert_eq!(report.issues, vec![GraphIntegrityError::DuplicateEdge(EdgeId::new("ba"))]);
    assert!(store.integrity_issues().is_empty());
}

#[test]
fn shared_member_kept_by_first_group() {
    let (store, report) = GraphStore::hydrate(
        nodes(json!([
            {"id": "p", "type": "process", "data": {"name": "P"}},
            {"id": "g1", "type": "group", "data": {"label": "G1", "members": ["p"]}},
            {"id": "g2", "type": "group", "data": {"label": "G2", "members": ["p"]}}
        ])),
        vec![],
    );
    assert!(store.group(&NodeId::new("g1")).unwrap().members.contains(&NodeId::new("p")));
    assert_eq!(store.group(&NodeId::new("g2")).unwrap().member_count(), 0);
    assert_eq!(
        report.issues,
        vec![GraphIntegrityError::SharedMember {
            group: NodeId::new("g2"),
            member: NodeId::new("p"),
            owner: NodeId::new("g1"),
        }]
    );
    assert!(store.integrity_issues().is_empty());
}
