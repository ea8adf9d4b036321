//! Recursive module-graph loading.

use tracing::debug;

use isolet_common::ModuleError;

use crate::engine::{ModuleRef, ScriptEngine, ScriptException};
use crate::worker::{Worker, WorkerState};

impl Worker {
    /// Load, link, and evaluate the module graph rooted at `root`.
    ///
    /// Depth-first and cache-guarded: each module's source is fetched
    /// through the host's source provider and compiled at most once per
    /// worker. A root that is already cached returns success immediately.
    /// On failure the load aborts as a whole with the failing stage's kind
    /// and a recorded diagnostic; modules cached before the failure are
    /// retained for reuse, not rolled back.
    pub fn load_module(&self, root: &str) -> Result<(), ModuleError> {
        let _guard = self.state.exec.lock();
        let engine = self.state.engine()?;

        if self.state.modules.lock().lookup(root).is_some() {
            return Ok(());
        }

        let handle = compile_subtree(&self.state, engine.as_ref(), root)?;

        // The cache is the sole source of truth for the resolver; a miss
        // during linking is a contract violation, reported as the failure.
        let resolver = self.state.modules.lock().clone();
        if let Err(exception) = engine.instantiate_module(handle, &resolver) {
            self.state.record_exception(&exception);
            return Err(ModuleError::instantiate(root));
        }

        if let Err(exception) = engine.evaluate_module(handle) {
            self.state.record_exception(&exception);
            return Err(ModuleError::evaluate(root));
        }

        debug!(
            worker = self.state.id,
            root,
            cached = self.state.modules.lock().len(),
            "module graph loaded"
        );
        Ok(())
    }
}

/// Fetch, compile, and cache `identifier`, then recurse into its declared
/// imports in declaration order.
fn compile_subtree(
    state: &WorkerState,
    engine: &dyn ScriptEngine,
    identifier: &str,
) -> Result<ModuleRef, ModuleError> {
    if let Some(handle) = state.modules.lock().lookup(identifier) {
        return Ok(handle);
    }

    let source = match state.host.module_source(state.id, identifier) {
        Ok(source) => source,
        Err(err) => {
            state.record_exception(&ScriptException::new(err.to_string()));
            return Err(ModuleError::compile(identifier));
        }
    };

    let unit = match engine.compile_module(identifier, &source) {
        Ok(unit) => unit,
        Err(exception) => {
            state.record_exception(&exception);
            return Err(ModuleError::compile(identifier));
        }
    };

    // Cache before visiting imports: a module that directly or indirectly
    // imports itself finds the handle here and terminates the recursion.
    state
        .modules
        .lock()
        .insert(identifier.to_string(), unit.handle);

    for import in &unit.imports {
        compile_subtree(state, engine, import)?;
    }

    Ok(unit.handle)
}
