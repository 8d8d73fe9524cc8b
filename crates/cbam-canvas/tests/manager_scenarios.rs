use cbam_canvas::{
    CanvasCommand, CanvasConfig, CanvasStateManager, DetectionMode, FlowConfig, FlowSnapshot,
    InMemoryGateway, InstallId, LoadOutcome, SaveOutcome, Viewport,
};
use cbam_graph::{EdgeDraft, Node, NodeId, StreamKind};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn manager_with(gateway: &Arc<InMemoryGateway>) -> Arc<CanvasStateManager> {
    Arc::new(CanvasStateManager::new(gateway.clone()))
}

fn build_abc(manager: &CanvasStateManager, install: InstallId) {
    manager.activate(install);
    for (id, x) in [("a", 0.0), ("b", 250.0), ("c", 500.0)] {
        manager
            .apply(install, CanvasCommand::AddNode(Node::process(id, id.to_uppercase()).at(x, 40.0)))
            .unwrap();
    }
    for (s, t, ci) in [("a", "b", 1.0), ("b", "c", 2.0)] {
        let draft = EdgeDraft::new(s, t)
            .stream(StreamKind::Material, 10.0, "t")
            .carbon_intensity(ci);
        manager.apply(install, CanvasCommand::Connect(draft)).unwrap();
    }
}

fn snapshot_with(node: &str) -> FlowSnapshot {
    let mut store = cbam_graph::GraphStore::new();
    store.add_node(Node::process(node, node)).unwrap();
    let (nodes, edges) = store.to_records().unwrap();
    FlowSnapshot {
        nodes,
        edges,
        ..FlowSnapshot::default()
    }
}

fn node_ids(manager: &CanvasStateManager, install: InstallId) -> Vec<String> {
    manager
        .with_canvas(install, |c| c.store().nodes().map(|n| n.id.to_string()).collect())
        .unwrap()
}

#[test]
fn canvas_cache_survives_install_switches() {
    let gateway = Arc::new(InMemoryGateway::new());
    let manager = manager_with(&gateway);

    assert!(manager.activate(InstallId(7)));
    let seven = manager.current().unwrap();
    assert!(seven.store().is_empty());
    assert_eq!(seven.store().edge_count(), 0);

    manager
        .apply_active(CanvasCommand::AddNode(Node::process("kiln", "Kiln")))
        .unwrap();
    assert!(manager.activate(InstallId(3)));
    assert!(manager.current().unwrap().store().is_empty());

    assert!(!manager.activate(InstallId(7)));
    let nodes = manager
        .with_canvas(InstallId(7), |c| c.store().node_count())
        .unwrap();
    assert_eq!(nodes, 1);
    assert_eq!(manager.current().unwrap().install(), InstallId(7));
    assert_eq!(manager.installs(), vec![InstallId(3), InstallId(7)]);
    assert_eq!(gateway.call_count("load_flow"), 0);
}

#[tokio::test]
async fn save_then_load_round_trips_and_discards_local_edits() {
    let gateway = Arc::new(InMemoryGateway::new());
    let manager = manager_with(&gateway);
    let install = InstallId(1);
    build_abc(&manager, install);
    manager
        .with_canvas(install, |c| assert!(c.is_dirty()))
        .unwrap();

    let saved = manager.save(install).await.unwrap();
    assert_eq!(saved, SaveOutcome::Saved { revision: 5 });
    let saved_store = manager.with_canvas(install, |c| c.store().clone()).unwrap();

    manager
        .apply(install, CanvasCommand::RemoveNode(NodeId::new("b")))
        .unwrap();
    let outcome = manager.load(install).await.unwrap();
    assert!(matches!(outcome, LoadOutcome::Applied(ref report) if report.is_clean()));

    let loaded = manager.current().unwrap();
    assert_eq!(loaded.store(), &saved_store);
    assert_eq!(loaded.store().node_count(), 3);
    assert_eq!(loaded.store().edge_count(), 2);
    assert!(!loaded.is_dirty());
}

#[tokio::test]
async fn clean_canvas_is_not_sent() {
    let gateway = Arc::new(InMemoryGateway::new());
    let manager = manager_with(&gateway);
    manager.activate(InstallId(2));
    assert_eq!(manager.save(InstallId(2)).await.unwrap(), SaveOutcome::Clean);
    assert_eq!(gateway.call_count("create_flow"), 0);
}

#[tokio::test]
async fn first_save_creates_flow_once() {
    let gateway = Arc::new(InMemoryGateway::new());
    let manager = manager_with(&gateway);
    let install = InstallId(4);
    build_abc(&manager, install);
    manager.save(install).await.unwrap();
    manager
        .apply(install, CanvasCommand::MoveNode {
            id: NodeId::new("a"),
            position: cbam_graph::Position::new(1.0, 1.0),
        })
        .unwrap();
    manager.save(install).await.unwrap();
    assert_eq!(gateway.call_count("create_flow"), 1);
    assert_eq!(gateway.call_count("save_flow"), 2);
}

#[tokio::test]
async fn install_without_flow_loads_empty() {
    let gateway = Arc::new(InMemoryGateway::new());
    let manager = manager_with(&gateway);
    let install = InstallId(9);
    manager.activate(install);
    manager
        .apply(install, CanvasCommand::AddNode(Node::process("draft", "Draft")))
        .unwrap();
    manager.load(install).await.unwrap();
    assert!(manager.current().unwrap().store().is_empty());
}

#[tokio::test(start_paused = true)]
async fn newer_load_wins_over_stale_response() {
    let gateway = Arc::new(InMemoryGateway::new());
    let install = InstallId(1);
    gateway.put_flow(install, snapshot_with("first"));
    gateway.set_latency(Duration::from_millis(100));
    let manager = manager_with(&gateway);
    manager.activate(install);

    let m = manager.clone();
    let older = tokio::spawn(async move { m.load(install).await });
    tokio::task::yield_now().await;

    gateway.put_flow(install, snapshot_with("second"));
    let m = manager.clone();
    let newer = tokio::spawn(async move { m.load(install).await });

    let older = older.await.unwrap().unwrap();
    let newer = newer.await.unwrap().unwrap();
    assert_eq!(older, LoadOutcome::Superseded);
    assert!(matches!(newer, LoadOutcome::Applied(_)));
    assert_eq!(node_ids(&manager, install), vec!["second".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn save_queued_behind_load_sees_loaded_canvas() {
    let gateway = Arc::new(InMemoryGateway::new());
    let install = InstallId(5);
    gateway.put_flow(install, snapshot_with("remote"));
    gateway.set_latency(Duration::from_millis(50));
    let manager = manager_with(&gateway);
    manager.activate(install);

    let m = manager.clone();
    let load = tokio::spawn(async move { m.load(install).await });
    tokio::task::yield_now().await;

    manager
        .apply(install, CanvasCommand::AddNode(Node::process("local", "Local")))
        .unwrap();
    let m = manager.clone();
    let save = tokio::spawn(async move { m.save(install).await });

    assert!(matches!(load.await.unwrap().unwrap(), LoadOutcome::Applied(_)));
    assert_eq!(save.await.unwrap().unwrap(), SaveOutcome::Clean);
    assert_eq!(node_ids(&manager, install), vec!["remote".to_string()]);
    assert_eq!(gateway.call_count("save_flow"), 0);
}

#[tokio::test(start_paused = true)]
async fn autosave_debounces_to_last_request() {
    let gateway = Arc::new(InMemoryGateway::new());
    let config = FlowConfig::new()
        .with_canvas(CanvasConfig::new().with_autosave_debounce(Duration::from_millis(500)));
    let manager = Arc::new(CanvasStateManager::with_config(gateway.clone(), &config));
    let install = InstallId(6);
    build_abc(&manager, install);

    let first = manager.schedule_save(install);
    tokio::time::advance(Duration::from_millis(200)).await;
    let second = manager.schedule_save(install);
    let third = manager.schedule_save(install);
    for handle in [first, second, third] {
        handle.await.unwrap();
    }

    assert_eq!(gateway.call_count("save_flow"), 1);
    assert!(!manager.with_canvas(install, |c| c.is_dirty()).unwrap());
}

#[tokio::test]
async fn local_detection_replaces_chains_and_persists() {
    let gateway = Arc::new(InMemoryGateway::new());
    let manager = manager_with(&gateway);
    let install = InstallId(8);
    build_abc(&manager, install);

    let chains = manager.detect_chains(install, DetectionMode::Local).await.unwrap();
    assert_eq!(chains.len(), 1);
    assert_eq!(chains[0].chain_length, 3);
    assert_eq!(chains[0].start_process_id, NodeId::new("a"));
    assert_eq!(chains[0].end_process_id, NodeId::new("c"));
    assert_eq!(chains[0].total_emission, Some(30.0));

    let listed = manager.list_chains(install).await.unwrap();
    assert_eq!(listed, chains);

    manager
        .apply(install, CanvasCommand::RemoveNode(NodeId::new("b")))
        .unwrap();
    let chains = manager.detect_chains(install, DetectionMode::Local).await.unwrap();
    assert!(chains.is_empty());
    assert!(manager.with_canvas(install, |c| c.chains().is_empty()).unwrap());
}

#[tokio::test]
async fn remote_detection_runs_on_stored_flow() {
    let gateway = Arc::new(InMemoryGateway::new());
    let manager = manager_with(&gateway);
    let install = InstallId(10);
    build_abc(&manager, install);
    manager.save(install).await.unwrap();

    let chains = manager.detect_chains(install, DetectionMode::Remote).await.unwrap();
    assert_eq!(chains.len(), 1);
    assert_eq!(chains[0].total_emission, Some(30.0));
    assert_eq!(gateway.call_count("detect_chains"), 1);
}

#[tokio::test]
async fn viewport_persists() {
    let gateway = Arc::new(InMemoryGateway::new());
    let manager = manager_with(&gateway);
    let install = InstallId(11);
    build_abc(&manager, install);
    let _ = manager.auto_layout(install).unwrap();
    manager.save(install).await.unwrap();
    let flow = manager
        .with_canvas(install, |c| c.flow_id().cloned())
        .unwrap()
        .unwrap();
    let stored = gateway.stored(&flow).unwrap();
    assert_eq!(stored.viewport, Viewport::default());
    assert_eq!(stored.metadata.install_id, Some(install));
    assert_eq!(stored.metadata.node_count, 3);
}

#[test]
fn unknown_install_is_reported() {
    let manager = manager_with(&Arc::new(InMemoryGateway::new()));
    let err = manager
        .apply(InstallId(99), CanvasCommand::RemoveNode(NodeId::new("x")))
        .unwrap_err();
    assert!(matches!(err, cbam_canvas::CanvasError::UnknownInstall(InstallId(99))));
    let err = manager
        .apply_active(CanvasCommand::RemoveNode(NodeId::new("x")))
        .unwrap_err();
    assert!(matches!(err, cbam_canvas::CanvasError::NoActiveCanvas));
}
