//! Id-keyed registry of live workers.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info};

use isolet_common::{RegistryError, WorkerId, WorkerOptions};
use isolet_core::{Worker, WorkerHost, WorkerRuntime};

/// Shared table of live workers, keyed by their host-assigned ids.
///
/// The registry is the host-facing control surface for multi-worker
/// embeddings: workers are created, routed to, and disposed of purely by
/// id. Stale ids resolve to [`RegistryError::UnknownWorker`], which is the
/// guard against driving a disposed worker.
///
/// # Thread Safety
///
/// All operations take `&self`; the registry can be shared across host
/// threads freely. Per-worker serialization remains the worker's own
/// concern.
pub struct WorkerRegistry {
    runtime: WorkerRuntime,
    workers: DashMap<WorkerId, Worker>,
}

impl WorkerRegistry {
    /// An empty registry spawning workers through `runtime`.
    pub fn new(runtime: WorkerRuntime) -> Self {
        Self {
            runtime,
            workers: DashMap::new(),
        }
    }

    /// The runtime workers are spawned through.
    pub fn runtime(&self) -> &WorkerRuntime {
        &self.runtime
    }

    /// Version string of the engine collaborator.
    pub fn version(&self) -> &str {
        self.runtime.version()
    }

    /// Create a worker under `id`.
    ///
    /// Fails with [`RegistryError::DuplicateId`] while a live worker owns
    /// the id; an id becomes reusable once its worker is disposed.
    pub fn init(
        &self,
        id: WorkerId,
        host: Arc<dyn WorkerHost>,
        options: &WorkerOptions,
    ) -> Result<Worker, RegistryError> {
        match self.workers.entry(id) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateId { id }),
            Entry::Vacant(entry) => {
                let worker = self.runtime.spawn(id, host, options)?;
                entry.insert(worker.clone());
                info!(worker = id, "worker registered");
                Ok(worker)
            }
        }
    }

    /// The live worker owning `id`, if any.
    pub fn worker(&self, id: WorkerId) -> Option<Worker> {
        self.workers.get(&id).map(|entry| entry.value().clone())
    }

    /// Remove the worker owning `id` and release its engine.
    pub fn dispose(&self, id: WorkerId) -> Result<(), RegistryError> {
        let (_, worker) = self
            .workers
            .remove(&id)
            .ok_or(RegistryError::UnknownWorker { id })?;

        if worker.dispose().is_err() {
            // A handle clone was disposed out-of-band; removal from the
            // table is still the registry's part of the contract.
            debug!(worker = id, "worker was already disposed");
        }
        info!(worker = id, "worker deregistered");
        Ok(())
    }

    /// Ids of all live workers, in no particular order.
    pub fn ids(&self) -> Vec<WorkerId> {
        self.workers.iter().map(|entry| *entry.key()).collect()
    }

    /// Number of live workers.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Returns `true` if no worker is live.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("workers", &self.workers.len())
            .field("version", &self.runtime.version())
            .finish_non_exhaustive()
    }
}
