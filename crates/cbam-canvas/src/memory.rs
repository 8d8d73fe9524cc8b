//! In-process flow storage
//!
//! Behaves like the remote service, including server-side chain detection.
//! Failures and response latency can be injected for tests.

use crate::error::PersistenceError;
use crate::gateway::{
    FlowId, FlowSnapshot, HealthStatus, InstallId, NodeDraft, PersistenceGateway, SaveAck,
};
use cbam_analysis::{ChainDetectionEngine, DetectionConfig};
use cbam_graph::{GraphStore, NodeId, NodeRecord, ProcessChain};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
struct StoredFlow {
    install: InstallId,
    snapshot: FlowSnapshot,
}

/// Flow storage held in memory
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    flows: DashMap<FlowId, StoredFlow>,
    chains: DashMap<InstallId, Vec<ProcessChain>>,
    next_flow: AtomicU64,
    latency_ms: AtomicU64,
    failures: Mutex<VecDeque<PersistenceError>>,
    calls: DashMap<&'static str, usize>,
    detection: DetectionConfig,
}

impl InMemoryGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_detection(mut self, detection: DetectionConfig) -> Self {
        self.detection = detection;
        self
    }

    /// Delay every response by `latency`
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    /// Make the next call fail with `error`; queued failures fire in order
    pub fn fail_next(&self, error: PersistenceError) {
        self.failures.lock().push_back(error);
    }

    /// Store `snapshot` as the flow of `install`, replacing any previous one
    pub fn put_flow(&self, install: InstallId, snapshot: FlowSnapshot) -> FlowId {
        let id = self
            .flow_of(install)
            .unwrap_or_else(|| self.allocate_flow_id());
        self.flows.insert(id.clone(), StoredFlow { install, snapshot });
        id
    }

    /// Stored content of `flow`, bypassing latency and failures
    #[must_use]
    pub fn stored(&self, flow: &FlowId) -> Option<FlowSnapshot> {
        self.flows.get(flow).map(|f| f.snapshot.clone())
    }

    /// Number of calls made to `operation`, e.g. `"save_flow"`
    #[must_use]
    pub fn call_count(&self, operation: &str) -> usize {
        self.calls.get(operation).map_or(0, |c| *c)
    }

    fn flow_of(&self, install: InstallId) -> Option<FlowId> {
        let mut owned: Vec<FlowId> = self
            .flows
            .iter()
            .filter(|entry| entry.value().install == install)
            .map(|entry| entry.key().clone())
            .collect();
        owned.sort();
        owned.into_iter().next()
    }

    fn allocate_flow_id(&self) -> FlowId {
        let n = self.next_flow.fetch_add(1, Ordering::SeqCst) + 1;
        FlowId::new(format!("flow-{n}"))
    }

    fn enter(&self, operation: &'static str) -> Result<(), PersistenceError> {
        *self.calls.entry(operation).or_insert(0) += 1;
        match self.failures.lock().pop_front() {
            Some(error) => {
                tracing::debug!(operation, %error, "injected failure");
                Err(error)
            }
            None => Ok(()),
        }
    }

    async fn respond(&self) {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

#[async_trait::async_trait]
impl PersistenceGateway for InMemoryGateway {
    async fn create_flow(&self, install: InstallId, name: &str) -> Result<FlowId, PersistenceError> {
        self.enter("create_flow")?;
        let id = self.allocate_flow_id();
        let mut snapshot = FlowSnapshot::default();
        snapshot.metadata.install_id = Some(install);
        snapshot.metadata.name = name.to_string();
        snapshot.metadata.created_at = Some(Utc::now());
        self.flows.insert(id.clone(), StoredFlow { install, snapshot });
        self.respond().await;
        Ok(id)
    }

    async fn save_flow(
        &self,
        flow: &FlowId,
        snapshot: &FlowSnapshot,
    ) -> Result<SaveAck, PersistenceError> {
        self.enter("save_flow")?;
        let updated_at = Utc::now();
        {
            let mut stored = self
                .flows
                .get_mut(flow)
                .ok_or_else(|| PersistenceError::FlowNotFound(flow.to_string()))?;
            let created_at = stored.snapshot.metadata.created_at;
            stored.snapshot = snapshot.clone();
            stored.snapshot.metadata.created_at = created_at.or(snapshot.metadata.created_at);
            stored.snapshot.metadata.updated_at = Some(updated_at);
        }
        self.respond().await;
        Ok(SaveAck {
            flow_id: flow.clone(),
            updated_at,
        })
    }

    async fn load_flow(&self, flow: &FlowId) -> Result<FlowSnapshot, PersistenceError> {
        self.enter("load_flow")?;
        // Content is read at request time; latency only delays the answer.
        let snapshot = self
            .stored(flow)
            .ok_or_else(|| PersistenceError::FlowNotFound(flow.to_string()))?;
        self.respond().await;
        Ok(snapshot)
    }

    async fn find_flow(&self, install: InstallId) -> Result<Option<FlowId>, PersistenceError> {
        self.enter("find_flow")?;
        let found = self.flow_of(install);
        self.respond().await;
        Ok(found)
    }

    async fn create_node(
        &self,
        flow: &FlowId,
        draft: &NodeDraft,
    ) -> Result<NodeRecord, PersistenceError> {
        self.enter("create_node")?;
        let record = NodeRecord {
            id: NodeId::generate().0,
            kind: draft.kind.as_str().to_string(),
            position: draft.position,
            data: draft.data.clone(),
            draggable: true,
            selectable: true,
            deletable: true,
        };
        {
            let mut stored = self
                .flows
                .get_mut(flow)
                .ok_or_else(|| PersistenceError::FlowNotFound(flow.to_string()))?;
            stored.snapshot.nodes.push(record.clone());
            stored.snapshot.metadata.node_count = stored.snapshot.nodes.len();
        }
        self.respond().await;
        Ok(record)
    }

    async fn health_check(&self) -> Result<HealthStatus, PersistenceError> {
        self.enter("health_check")?;
        self.respond().await;
        Ok(HealthStatus::Ok)
    }

    async fn list_chains(&self, install: InstallId) -> Result<Vec<ProcessChain>, PersistenceError> {
        self.enter("list_chains")?;
        let chains = self.chains.get(&install).map(|c| c.value().clone()).unwrap_or_default();
        self.respond().await;
        Ok(chains)
    }

    async fn detect_chains(
        &self,
        install: InstallId,
    ) -> Result<Vec<ProcessChain>, PersistenceError> {
        self.enter("detect_chains")?;
        let snapshot = self
            .flow_of(install)
            .and_then(|flow| self.stored(&flow))
            .unwrap_or_default();
        let (store, _) = GraphStore::hydrate(snapshot.nodes, snapshot.edges);
        let chains = ChainDetectionEngine::new(self.detection).detect(&store);
        self.chains.insert(install, chains.clone());
        self.respond().await;
        Ok(chains)
    }

    async fn save_chains(
        &self,
        install: InstallId,
        chains: &[ProcessChain],
    ) -> Result<(), PersistenceError> {
        self.enter("save_chains")?;
        self.chains.insert(install, chains.to_vec());
        self.respond().await;
        Ok(())
    }
}
