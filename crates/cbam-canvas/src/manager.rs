//! Per-install canvas cache
//!
//! [`CanvasStateManager`] keeps one [`Canvas`] per install alive for the whole
//! session and synchronises it with a [`PersistenceGateway`].
//!
//! # Ordering
//!
//! Persistence calls for one install are serialised through a FIFO queue, so a
//! save issued after a load never overtakes it. Each load also takes a ticket
//! before queueing; when it finally resolves, its response is applied only if
//! no newer load was issued in the meantime. Local edits never wait on I/O.

use crate::canvas::{Canvas, CanvasCommand, CommandOutcome};
use crate::config::{CanvasConfig, FlowConfig};
use crate::error::CanvasError;
use crate::gateway::{InstallId, PersistenceGateway};
use cbam_analysis::{ChainDetectionEngine, DetectionConfig, LayoutOptions};
use cbam_graph::{HydrationReport, ProcessChain, ValidatorConfig};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Where chain detection runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DetectionMode {
    /// In process, over the cached canvas
    #[default]
    Local,
    /// On the persistence service, over the stored flow
    Remote,
}

/// Result of [`CanvasStateManager::load`]
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// The canvas now holds the fetched content
    Applied(HydrationReport),
    /// A newer load was issued; this response was discarded
    Superseded,
}

/// Result of [`CanvasStateManager::save`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// `revision` is now stored remotely
    Saved { revision: u64 },
    /// Nothing to save
    Clean,
}

struct CanvasSlot {
    canvas: RwLock<Canvas>,
    /// FIFO queue for persistence calls
    io: tokio::sync::Mutex<()>,
    load_ticket: AtomicU64,
    autosave_ticket: AtomicU64,
}

impl CanvasSlot {
    fn new(canvas: Canvas) -> Self {
        Self {
            canvas: RwLock::new(canvas),
            io: tokio::sync::Mutex::new(()),
            load_ticket: AtomicU64::new(0),
            autosave_ticket: AtomicU64::new(0),
        }
    }
}

/// Owns every install's canvas and the active-install pointer
pub struct CanvasStateManager {
    gateway: Arc<dyn PersistenceGateway>,
    slots: DashMap<InstallId, Arc<CanvasSlot>>,
    active: RwLock<Option<InstallId>>,
    canvas_config: CanvasConfig,
    validator: ValidatorConfig,
    detection: DetectionConfig,
    layout: LayoutOptions,
}

impl std::fmt::Debug for CanvasStateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanvasStateManager")
            .field("installs", &self.slots.len())
            .field("active", &*self.active.read())
            .finish_non_exhaustive()
    }
}

impl CanvasStateManager {
    /// Create a manager with default configuration
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self::with_config(gateway, &FlowConfig::default())
    }

    /// Create a manager with explicit configuration
    pub fn with_config(gateway: Arc<dyn PersistenceGateway>, config: &FlowConfig) -> Self {
        Self {
            gateway,
            slots: DashMap::new(),
            active: RwLock::new(None),
            canvas_config: config.canvas.clone(),
            validator: config.validator,
            detection: config.detection,
            layout: config.layout,
        }
    }

    #[inline]
    #[must_use]
    pub fn gateway(&self) -> &Arc<dyn PersistenceGateway> {
        &self.gateway
    }

    /// Make `install` the active canvas, creating an empty one on first use
    ///
    /// Returns whether a canvas was created. The previously active canvas
    /// stays cached untouched; nothing is copied.
    pub fn activate(&self, install: InstallId) -> bool {
        let mut created = false;
        self.slots.entry(install).or_insert_with(|| {
            created = true;
            tracing::debug!(%install, "empty canvas created");
            Arc::new(CanvasSlot::new(self.empty_canvas(install)))
        });
        *self.active.write() = Some(install);
        tracing::debug!(%install, created, "canvas activated");
        created
    }

    /// Copy of the active canvas
    #[must_use]
    pub fn current(&self) -> Option<Canvas> {
        let install = (*self.active.read())?;
        let slot = self.existing(install).ok()?;
        let canvas = slot.canvas.read().clone();
        Some(canvas)
    }

    #[must_use]
    pub fn active_install(&self) -> Option<InstallId> {
        *self.active.read()
    }

    /// Installs with a cached canvas, in ascending order
    #[must_use]
    pub fn installs(&self) -> Vec<InstallId> {
        let mut ids: Vec<InstallId> = self.slots.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Drop the cached canvas of an install removed upstream
    pub fn evict(&self, install: InstallId) -> Option<Canvas> {
        let (_, slot) = self.slots.remove(&install)?;
        let mut active = self.active.write();
        if *active == Some(install) {
            *active = None;
        }
        tracing::info!(%install, "canvas evicted");
        let canvas = slot.canvas.read().clone();
        Some(canvas)
    }

    /// Read the canvas of `install` without copying it
    pub fn with_canvas<R>(
        &self,
        install: InstallId,
        f: impl FnOnce(&Canvas) -> R,
    ) -> Result<R, CanvasError> {
        let slot = self.existing(install)?;
        let canvas = slot.canvas.read();
        Ok(f(&canvas))
    }

    /// Apply an editor gesture to the canvas of `install`
    pub fn apply(
        &self,
        install: InstallId,
        command: CanvasCommand,
    ) -> Result<CommandOutcome, CanvasError> {
        let slot = self.existing(install)?;
        let outcome = slot.canvas.write().apply(command)?;
        Ok(outcome)
    }

    /// Apply an editor gesture to the active canvas
    pub fn apply_active(&self, command: CanvasCommand) -> Result<CommandOutcome, CanvasError> {
        let install = self.active_install().ok_or(CanvasError::NoActiveCanvas)?;
        self.apply(install, command)
    }

    /// Run the configured auto-layout on the canvas of `install`
    pub fn auto_layout(&self, install: InstallId) -> Result<usize, CanvasError> {
        let slot = self.existing(install)?;
        let moved = slot.canvas.write().auto_layout(&self.layout)?;
        Ok(moved)
    }

    /// Persist the canvas of `install`
    ///
    /// Creates the remote flow on first save. On success the revision that
    /// was sent is marked saved; on failure the canvas stays dirty and the
    /// error is returned for the user to retry.
    #[tracing::instrument(skip_all, fields(%install))]
    pub async fn save(&self, install: InstallId) -> Result<SaveOutcome, CanvasError> {
        let slot = self.existing(install)?;
        let _queue = slot.io.lock().await;

        let (revision, flow, name, snapshot) = {
            let canvas = slot.canvas.read();
            if !canvas.is_dirty() {
                return Ok(SaveOutcome::Clean);
            }
            let snapshot = canvas
                .to_snapshot()
                .map_err(crate::error::PersistenceError::from)?;
            (
                canvas.revision(),
                canvas.flow_id().cloned(),
                canvas.metadata().name.clone(),
                snapshot,
            )
        };

        let flow = match flow {
            Some(flow) => flow,
            None => {
                let flow = self.gateway.create_flow(install, &name).await?;
                slot.canvas.write().bind_flow(flow.clone());
                tracing::info!(%flow, "remote flow created");
                flow
            }
        };

        match self.gateway.save_flow(&flow, &snapshot).await {
            Ok(_ack) => {
                slot.canvas.write().mark_saved(revision);
                tracing::info!(
                    revision,
                    nodes = snapshot.metadata.node_count,
                    edges = snapshot.metadata.edge_count,
                    "canvas saved"
                );
                Ok(SaveOutcome::Saved { revision })
            }
            Err(e) => {
                tracing::warn!(error = %e, retryable = e.is_retryable(), "save failed, canvas left dirty");
                Err(e.into())
            }
        }
    }

    /// Replace the canvas of `install` with the stored flow
    ///
    /// Unsaved local edits are discarded. An install without a stored flow
    /// loads as an empty canvas.
    #[tracing::instrument(skip_all, fields(%install))]
    pub async fn load(&self, install: InstallId) -> Result<LoadOutcome, CanvasError> {
        let slot = self.slot(install);
        let ticket = slot.load_ticket.fetch_add(1, Ordering::SeqCst) + 1;
        let _queue = slot.io.lock().await;
        if slot.load_ticket.load(Ordering::SeqCst) != ticket {
            tracing::debug!(ticket, "load superseded before it was sent");
            return Ok(LoadOutcome::Superseded);
        }

        let bound = slot.canvas.read().flow_id().cloned();
        let flow = match bound {
            Some(flow) => Some(flow),
            None => self.gateway.find_flow(install).await?,
        };
        let fetched = match &flow {
            Some(flow) => Some(self.gateway.load_flow(flow).await?),
            None => None,
        };

        if slot.load_ticket.load(Ordering::SeqCst) != ticket {
            tracing::warn!(ticket, "stale load response discarded");
            return Ok(LoadOutcome::Superseded);
        }

        let (canvas, report) = match (flow, fetched) {
            (Some(flow), Some(snapshot)) => {
                Canvas::from_snapshot(install, flow, snapshot, self.validator)
            }
            _ => (self.empty_canvas(install), HydrationReport::default()),
        };
        tracing::info!(
            nodes = report.nodes_loaded,
            edges = report.edges_loaded,
            dropped = report.issues.len(),
            "canvas loaded"
        );
        *slot.canvas.write() = canvas;
        Ok(LoadOutcome::Applied(report))
    }

    /// Save `install` once no further save has been scheduled for the
    /// configured debounce period
    ///
    /// Only the most recently scheduled save runs; earlier timers expire
    /// without saving. Failures are logged and the canvas stays dirty.
    pub fn schedule_save(self: &Arc<Self>, install: InstallId) -> JoinHandle<()> {
        let ticket = self
            .slots
            .get(&install)
            .map(|slot| slot.autosave_ticket.fetch_add(1, Ordering::SeqCst) + 1);
        let manager = Arc::clone(self);
        let debounce = self.canvas_config.autosave_debounce();
        tokio::spawn(async move {
            let Some(ticket) = ticket else {
                tracing::warn!(%install, "autosave requested for unknown install");
                return;
            };
            tokio::time::sleep(debounce).await;
            let latest = manager
                .slots
                .get(&install)
                .map(|slot| slot.autosave_ticket.load(Ordering::SeqCst));
            if latest != Some(ticket) {
                return;
            }
            if let Err(e) = manager.save(install).await {
                tracing::warn!(%install, error = %e, "autosave failed");
            }
        })
    }

    /// Recompute the chains of `install`, replacing the previous set
    #[tracing::instrument(skip_all, fields(%install))]
    pub async fn detect_chains(
        &self,
        install: InstallId,
        mode: DetectionMode,
    ) -> Result<Vec<ProcessChain>, CanvasError> {
        let slot = self.existing(install)?;
        let _queue = slot.io.lock().await;
        let chains = match mode {
            DetectionMode::Local => {
                let chains = {
                    let canvas = slot.canvas.read();
                    ChainDetectionEngine::new(self.detection).detect(canvas.store())
                };
                self.gateway.save_chains(install, &chains).await?;
                chains
            }
            DetectionMode::Remote => self.gateway.detect_chains(install).await?,
        };
        slot.canvas.write().replace_chains(chains.clone());
        tracing::info!(chains = chains.len(), ?mode, "chains replaced");
        Ok(chains)
    }

    /// Fetch the persisted chains of `install` and cache them on its canvas
    #[tracing::instrument(skip_all, fields(%install))]
    pub async fn list_chains(&self, install: InstallId) -> Result<Vec<ProcessChain>, CanvasError> {
        let slot = self.existing(install)?;
        let _queue = slot.io.lock().await;
        let chains = self.gateway.list_chains(install).await?;
        slot.canvas.write().replace_chains(chains.clone());
        Ok(chains)
    }

    fn empty_canvas(&self, install: InstallId) -> Canvas {
        Canvas::new(install, self.canvas_config.default_canvas_name.clone())
            .with_validator(self.validator)
    }

    fn slot(&self, install: InstallId) -> Arc<CanvasSlot> {
        let entry = self.slots.entry(install).or_insert_with(|| {
            tracing::debug!(%install, "empty canvas created");
            Arc::new(CanvasSlot::new(self.empty_canvas(install)))
        });
        Arc::clone(entry.value())
    }

    fn existing(&self, install: InstallId) -> Result<Arc<CanvasSlot>, CanvasError> {
        self.slots
            .get(&install)
            .map(|slot| Arc::clone(slot.value()))
            .ok_or(CanvasError::UnknownInstall(install))
    }
}
