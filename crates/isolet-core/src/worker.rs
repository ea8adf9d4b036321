//! Worker lifecycle and the host-facing control surface.
//!
//! A [`Worker`] pairs one engine instance with one global scope, two
//! message-channel slots, and the most recent diagnostic. Handles are cheap
//! clones over shared state; disposal empties the engine slot so stale
//! handles fail with [`Disposed`] instead of reaching released engine
//! state.
//!
//! # Locking discipline
//!
//! Every operation that touches the engine enters through the per-worker
//! execution lock, a re-entrant mutex: the same thread may re-enter (a host
//! callback reached from script code calling back into the worker acquires
//! the lock freshly instead of deadlocking) while other threads remain
//! serialized until the outermost guard releases.
//! [`terminate_execution`](Worker::terminate_execution) is the one
//! exception; it skips the lock entirely so it can interrupt a thread
//! currently holding it.

use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, warn};

use isolet_common::{Disposed, ScriptError, SendError, WorkerId};

use crate::bridge::{NO_ASYNC_RECEIVER, NO_SYNC_RECEIVER, NON_STRING_RESULT, WorkerBridge};
use crate::cache::ModuleCache;
use crate::diagnostics::render_exception;
use crate::engine::{ScriptEngine, ScriptException};
use crate::host::WorkerHost;

/// Handle to one isolated, independently disposable execution unit.
#[derive(Clone)]
pub struct Worker {
    pub(crate) state: Arc<WorkerState>,
}

pub(crate) struct WorkerState {
    pub(crate) id: WorkerId,
    /// Per-worker execution lock. Guards every engine entry except
    /// termination.
    pub(crate) exec: ReentrantMutex<()>,
    /// The engine slot; emptied by disposal.
    pub(crate) engine: Mutex<Option<Arc<dyn ScriptEngine>>>,
    pub(crate) bridge: Arc<WorkerBridge>,
    pub(crate) host: Arc<dyn WorkerHost>,
    pub(crate) modules: Mutex<ModuleCache>,
    /// Most recent diagnostic. Overwritten on every failing operation,
    /// never cleared on success.
    pub(crate) last_exception: Mutex<String>,
}

impl WorkerState {
    pub(crate) fn engine(&self) -> Result<Arc<dyn ScriptEngine>, Disposed> {
        self.engine.lock().clone().ok_or(Disposed)
    }

    pub(crate) fn record_exception(&self, exception: &ScriptException) {
        warn!(worker = self.id, message = %exception.message, "exception recorded");
        *self.last_exception.lock() = render_exception(exception);
    }

    fn record_text(&self, text: &str) {
        warn!(worker = self.id, text, "failure recorded");
        *self.last_exception.lock() = text.to_string();
    }
}

impl Worker {
    pub(crate) fn assemble(
        id: WorkerId,
        engine: Arc<dyn ScriptEngine>,
        bridge: Arc<WorkerBridge>,
        host: Arc<dyn WorkerHost>,
    ) -> Self {
        Self {
            state: Arc::new(WorkerState {
                id,
                exec: ReentrantMutex::new(()),
                engine: Mutex::new(Some(engine)),
                bridge,
                host,
                modules: Mutex::new(ModuleCache::new()),
                last_exception: Mutex::new(String::new()),
            }),
        }
    }

    /// The host-assigned worker id.
    pub fn id(&self) -> WorkerId {
        self.state.id
    }

    /// Compile `source` tagged with `resource` and run it once in the
    /// worker's global scope.
    ///
    /// No caching: every call recompiles. The two failure points, compile
    /// and run, are reported distinctly and each records a diagnostic.
    pub fn load_script(&self, resource: &str, source: &str) -> Result<(), ScriptError> {
        let _guard = self.state.exec.lock();
        let engine = self.state.engine()?;

        let script = match engine.compile_script(resource, source) {
            Ok(script) => script,
            Err(exception) => {
                self.state.record_exception(&exception);
                return Err(ScriptError::compile(resource));
            }
        };

        if let Err(exception) = engine.run_script(&script) {
            self.state.record_exception(&exception);
            return Err(ScriptError::run(resource));
        }

        debug!(worker = self.state.id, resource, "script loaded");
        Ok(())
    }

    /// Deliver `message` to the registered async receiver.
    ///
    /// The call returns once the script-side receiver has returned or
    /// thrown; any return value is discarded. Without a registered receiver
    /// the call fails with [`SendError::NoReceiver`] and the diagnostic is
    /// set to the no-`$recv` sentinel.
    pub fn send(&self, message: &str) -> Result<(), SendError> {
        let _guard = self.state.exec.lock();
        let engine = self.state.engine()?;

        let Some(receiver) = self.state.bridge.async_receiver() else {
            self.state.record_text(NO_ASYNC_RECEIVER);
            return Err(SendError::NoReceiver);
        };

        match engine.call_function(receiver, message) {
            Ok(_) => Ok(()),
            Err(exception) => {
                self.state.record_exception(&exception);
                Err(SendError::ReceiverException)
            }
        }
    }

    /// Deliver `message` to the registered sync receiver and return its
    /// string result.
    ///
    /// Failure is encoded in the returned string, never in the diagnostic:
    /// no registered receiver yields the no-`$recvSync` sentinel, and a
    /// non-string result (or a receiver that throws) yields the non-string
    /// sentinel. This asymmetry with [`send`](Self::send) is part of the
    /// observable contract; callers must not assume both "missing receiver"
    /// cases are reported identically.
    pub fn send_sync(&self, message: &str) -> Result<String, Disposed> {
        let _guard = self.state.exec.lock();
        let engine = self.state.engine()?;

        let Some(receiver) = self.state.bridge.sync_receiver() else {
            return Ok(NO_SYNC_RECEIVER.to_string());
        };

        match engine.call_function(receiver, message) {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) | Err(_) => Ok(NON_STRING_RESULT.to_string()),
        }
    }

    /// Request that any in-progress execution on this worker abort as soon
    /// as possible.
    ///
    /// Does not acquire the execution lock, so it may be called from a
    /// different thread than the one currently executing. Best-effort: the
    /// engine honors the request at its own check points. No-op after
    /// disposal.
    pub fn terminate_execution(&self) {
        let engine = self.state.engine.lock().clone();
        if let Some(engine) = engine {
            debug!(worker = self.state.id, "termination requested");
            engine.terminate_execution();
        }
    }

    /// The most recent diagnostic, or the empty string when no operation
    /// has failed yet. Readable any time, including after disposal.
    pub fn last_exception(&self) -> String {
        self.state.last_exception.lock().clone()
    }

    /// Release the engine and everything transitively owned by it:
    /// compiled modules, cached handles, registered callbacks.
    ///
    /// Disposing through a second handle clone reports [`Disposed`]; that
    /// is a caller error, not a state this layer recovers from.
    pub fn dispose(self) -> Result<(), Disposed> {
        let _guard = self.state.exec.lock();
        let engine = self.state.engine.lock().take().ok_or(Disposed)?;

        self.state.bridge.clear_receivers();
        self.state.modules.lock().clear();
        drop(engine);

        debug!(worker = self.state.id, "worker disposed");
        Ok(())
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.state.id)
            .field("disposed", &self.state.engine.lock().is_none())
            .field("cached_modules", &self.state.modules.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{FunctionRef, ModuleRef, ModuleUnit, ScriptRef};
    use isolet_common::SourceError;

    /// Engine stub that succeeds at everything and returns no values.
    struct NullEngine;

    impl ScriptEngine for NullEngine {
        fn compile_script(&self, _: &str, _: &str) -> Result<ScriptRef, ScriptException> {
            Ok(ScriptRef::new(0))
        }

        fn run_script(&self, _: &ScriptRef) -> Result<(), ScriptException> {
            Ok(())
        }

        fn compile_module(&self, _: &str, _: &str) -> Result<ModuleUnit, ScriptException> {
            Ok(ModuleUnit {
                handle: ModuleRef::new(0),
                imports: Vec::new(),
            })
        }

        fn instantiate_module(
            &self,
            _: ModuleRef,
            _: &dyn crate::engine::ImportResolver,
        ) -> Result<(), ScriptException> {
            Ok(())
        }

        fn evaluate_module(&self, _: ModuleRef) -> Result<(), ScriptException> {
            Ok(())
        }

        fn call_function(&self, _: FunctionRef, _: &str) -> Result<Option<String>, ScriptException> {
            Ok(None)
        }

        fn terminate_execution(&self) {}
    }

    struct NullHost;

    impl WorkerHost for NullHost {
        fn module_source(&self, _: WorkerId, identifier: &str) -> Result<String, SourceError> {
            Err(SourceError::new(identifier))
        }

        fn on_message(&self, _: WorkerId, _: &str) {}

        fn on_request(&self, _: WorkerId, _: &str) -> Option<String> {
            None
        }

        fn on_print(&self, _: WorkerId, _: &str) {}
    }

    fn worker() -> Worker {
        let host: Arc<dyn WorkerHost> = Arc::new(NullHost);
        let bridge = Arc::new(WorkerBridge::new(9, host.clone(), false));
        Worker::assemble(9, Arc::new(NullEngine), bridge, host)
    }

    #[test]
    fn test_send_without_receiver_sets_sentinel() {
        let worker = worker();

        let err = worker.send("hi").unwrap_err();
        assert_eq!(err, SendError::NoReceiver);
        assert_eq!(err.code(), 1);
        assert_eq!(worker.last_exception(), NO_ASYNC_RECEIVER);
    }

    #[test]
    fn test_send_sync_without_receiver_keeps_diagnostic() {
        let worker = worker();

        let reply = worker.send_sync("hi").unwrap();
        assert_eq!(reply, NO_SYNC_RECEIVER);
        assert_eq!(worker.last_exception(), "");
    }

    #[test]
    fn test_sync_receiver_non_string_result() {
        let worker = worker();
        worker.state.bridge.register_sync_receiver(FunctionRef::new(0));

        // NullEngine always reports a non-string result.
        assert_eq!(worker.send_sync("hi").unwrap(), NON_STRING_RESULT);
        assert_eq!(worker.last_exception(), "");
    }

    #[test]
    fn test_dispose_empties_the_engine_slot() {
        let worker = worker();
        let stale = worker.clone();

        worker.dispose().unwrap();

        assert_eq!(stale.load_script("a.js", ""), Err(Disposed.into()));
        assert_eq!(stale.send("hi"), Err(Disposed.into()));
        assert_eq!(stale.send_sync("hi"), Err(Disposed));
        assert_eq!(stale.dispose(), Err(Disposed));
    }

    #[test]
    fn test_terminate_after_dispose_is_noop() {
        let worker = worker();
        let stale = worker.clone();
        worker.dispose().unwrap();

        stale.terminate_execution();
    }

    #[test]
    fn test_last_exception_survives_disposal() {
        let worker = worker();
        worker.send("hi").unwrap_err();
        let stale = worker.clone();
        worker.dispose().unwrap();

        assert_eq!(stale.last_exception(), NO_ASYNC_RECEIVER);
    }
}
