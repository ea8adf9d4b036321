//! The script-engine collaborator interface.
//!
//! The engine itself (compiler, interpreter, garbage collector) is an
//! external collaborator; this module specifies it exactly at the seam the
//! worker runtime needs: compile-and-run of a flat script,
//! compile-instantiate-evaluate of a module with import resolution, calling
//! a captured function value, and exception introspection.
//!
//! All long-lived engine-side values (compiled scripts, compiled modules,
//! captured callbacks) surface here as opaque handle newtypes owned by the
//! worker or its module cache, with release tied to worker disposal.

use std::sync::Arc;

use isolet_common::SpawnError;

use crate::bridge::WorkerBridge;

/// Handle to a compiled flat script inside an engine scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScriptRef(u64);

impl ScriptRef {
    /// Wrap a raw engine-assigned handle value.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw engine-assigned handle value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Handle to a compiled module inside an engine scope.
///
/// Handle identity is stable for the lifetime of the scope; the module
/// cache relies on it for its inverse mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleRef(u64);

impl ModuleRef {
    /// Wrap a raw engine-assigned handle value.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw engine-assigned handle value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Handle to a script function value captured across the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionRef(u64);

impl FunctionRef {
    /// Wrap a raw engine-assigned handle value.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw engine-assigned handle value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// A freshly compiled module: its handle plus its declared imports, in
/// declaration order.
#[derive(Debug, Clone)]
pub struct ModuleUnit {
    /// Engine handle for the compiled module.
    pub handle: ModuleRef,

    /// Import identifiers exactly as declared in the source.
    pub imports: Vec<String>,
}

/// An uncaught failure reported by the engine.
///
/// Carries the bare exception message and, when the engine can attribute
/// the failure to a source location, a [`ExceptionSite`] used by the
/// diagnostic formatter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptException {
    /// The exception message.
    pub message: String,

    /// Source attribution, absent when the engine has no extra information.
    pub site: Option<ExceptionSite>,
}

/// Source attribution for a [`ScriptException`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionSite {
    /// Diagnostic resource name of the script or module.
    pub resource: String,

    /// 1-based line number.
    pub line: u32,

    /// 0-based column where the reported span starts.
    pub start_column: u32,

    /// 0-based column where the reported span ends (exclusive).
    pub end_column: u32,

    /// The offending source line, verbatim.
    pub source_line: String,

    /// Engine stack trace, when one is available.
    pub stack_trace: Option<String>,
}

impl ScriptException {
    /// An exception with no source attribution.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            site: None,
        }
    }

    /// An exception attributed to a source location.
    pub fn with_site(message: impl Into<String>, site: ExceptionSite) -> Self {
        Self {
            message: message.into(),
            site: Some(site),
        }
    }
}

/// Resolves module import specifiers to compiled handles during
/// instantiation.
///
/// The worker passes the module cache here; the cache is the sole source of
/// truth for the resolver, and a `None` at this stage is a collaborator
/// contract violation the engine reports as an instantiation failure.
pub trait ImportResolver {
    /// Look up the compiled handle for an import specifier.
    fn resolve(&self, specifier: &str) -> Option<ModuleRef>;
}

/// One instance of the external script engine plus its persistent global
/// scope.
///
/// # Threading contract
///
/// An engine supports execution by only one native thread at a time; the
/// worker serializes entry through its per-worker execution lock, so
/// implementations may assume serialized calls. Two refinements:
///
/// - **Nested invocation**: a host callback reached from inside script
///   execution may call back into the engine on the same thread (for
///   example a sync request issued from within a receiver). Implementations
///   must support this nesting.
/// - **Termination**: [`terminate_execution`](Self::terminate_execution) is
///   the one method callable from any thread without the execution lock; it
///   only flips a request that the engine honors at its own check points.
///
/// # Boundary globals
///
/// The engine installs the script-visible globals (`$recv`, `$send`,
/// `$recvSync`, `$sendSync`, and `$print` when enabled) at creation and
/// routes every invocation of them through the [`WorkerBridge`] it received
/// from its factory. No process-global routing state is involved.
pub trait ScriptEngine: Send + Sync {
    /// Compile `source` as a flat script tagged with `resource` for
    /// diagnostics.
    fn compile_script(&self, resource: &str, source: &str) -> Result<ScriptRef, ScriptException>;

    /// Run a previously compiled script once in the global scope.
    fn run_script(&self, script: &ScriptRef) -> Result<(), ScriptException>;

    /// Compile `source` as a module identified by `identifier`, reporting
    /// its declared imports.
    fn compile_module(&self, identifier: &str, source: &str)
    -> Result<ModuleUnit, ScriptException>;

    /// Link a compiled module graph rooted at `module`, resolving every
    /// import through `resolver`.
    fn instantiate_module(
        &self,
        module: ModuleRef,
        resolver: &dyn ImportResolver,
    ) -> Result<(), ScriptException>;

    /// Evaluate an instantiated module graph rooted at `module`.
    fn evaluate_module(&self, module: ModuleRef) -> Result<(), ScriptException>;

    /// Invoke a captured function with a single string argument.
    ///
    /// Returns `Ok(Some(_))` for a string result and `Ok(None)` when the
    /// function produced anything else.
    fn call_function(
        &self,
        function: FunctionRef,
        argument: &str,
    ) -> Result<Option<String>, ScriptException>;

    /// Request that in-flight execution abort as soon as possible.
    ///
    /// Callable from any thread. Best-effort: honored at the engine's own
    /// execution check points, never a hard preemption.
    fn terminate_execution(&self);
}

/// Creates engine instances and reports collaborator metadata.
pub trait EngineFactory: Send + Sync {
    /// Version string of the underlying engine. Process-wide, read-only,
    /// available without any worker.
    fn version(&self) -> &str;

    /// Create a fresh engine bound to `bridge`, with the boundary globals
    /// installed in a new global scope.
    ///
    /// Must succeed or fail atomically; on failure no engine-side state
    /// remains allocated.
    fn create_engine(&self, bridge: Arc<WorkerBridge>)
    -> Result<Box<dyn ScriptEngine>, SpawnError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_identity() {
        assert_eq!(ModuleRef::new(7), ModuleRef::new(7));
        assert_ne!(ModuleRef::new(7), ModuleRef::new(8));
        assert_eq!(FunctionRef::new(3).raw(), 3);
        assert_eq!(ScriptRef::new(0).raw(), 0);
    }

    #[test]
    fn test_exception_constructors() {
        let plain = ScriptException::new("boom");
        assert_eq!(plain.message, "boom");
        assert!(plain.site.is_none());

        let sited = ScriptException::with_site(
            "boom",
            ExceptionSite {
                resource: "main.js".into(),
                line: 3,
                start_column: 0,
                end_column: 4,
                source_line: "boom".into(),
                stack_trace: None,
            },
        );
        assert_eq!(sited.site.unwrap().line, 3);
    }
}
