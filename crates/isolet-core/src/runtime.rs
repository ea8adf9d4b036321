//! Worker creation and engine collaborator metadata.

use std::sync::Arc;

use tracing::info;

use isolet_common::{SpawnError, WorkerId, WorkerOptions};

use crate::bridge::WorkerBridge;
use crate::engine::EngineFactory;
use crate::host::WorkerHost;
use crate::worker::Worker;

/// Process-wide root of the worker runtime.
///
/// Owns the engine factory and the collaborator version string; both are
/// initialized once and read-only thereafter, so the runtime can be shared
/// freely across threads without further synchronization.
#[derive(Clone)]
pub struct WorkerRuntime {
    factory: Arc<dyn EngineFactory>,
}

impl WorkerRuntime {
    /// A runtime spawning workers through `factory`.
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self { factory }
    }

    /// Version string of the engine collaborator. No worker required.
    pub fn version(&self) -> &str {
        self.factory.version()
    }

    /// Create a worker: a fresh engine instance and global scope with the
    /// boundary globals installed, an empty module cache, and the worker's
    /// identity wired into the bridge so collaborator callbacks can route
    /// back to it.
    ///
    /// Atomic: on engine-creation failure no partially constructed worker
    /// exists.
    pub fn spawn(
        &self,
        id: WorkerId,
        host: Arc<dyn WorkerHost>,
        options: &WorkerOptions,
    ) -> Result<Worker, SpawnError> {
        let bridge = Arc::new(WorkerBridge::new(id, host.clone(), options.enable_print));
        let engine = self.factory.create_engine(bridge.clone())?;

        info!(
            worker = id,
            print = options.enable_print,
            "worker initialized"
        );
        Ok(Worker::assemble(id, Arc::from(engine), bridge, host))
    }
}

impl std::fmt::Debug for WorkerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRuntime")
            .field("version", &self.factory.version())
            .finish_non_exhaustive()
    }
}
