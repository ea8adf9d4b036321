//! Error types for the isolet worker runtime.
//!
//! This module defines a hierarchy of error types using `thiserror`:
//! - [`ScriptError`]: failures while loading a flat script
//! - [`ModuleError`]: failures while loading a module graph
//! - [`SendError`]: failures on the async message channel
//! - [`SpawnError`], [`RegistryError`], [`SourceError`], [`Disposed`]
//!
//! The staged enums expose [`code`](ScriptError::code) accessors returning
//! the small integer that distinguishes the failure stage on the control
//! surface (0 is success, reported through `Ok`). Disposal misuse maps to
//! -1, which never appears in the staged contract.

use thiserror::Error;

/// The worker's engine has already been released.
///
/// Raised when an operation reaches a worker handle after `dispose` ran.
/// This is a caller contract violation surfaced as an error instead of
/// undefined behavior.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("worker already disposed")]
pub struct Disposed;

/// Failures while loading a flat (non-module) script.
///
/// A script load has two independent failure points, compile and run, each
/// reported with a distinct code so the host can react differently (retry
/// with different source vs. treat as fatal). Both record a diagnostic on
/// the worker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// The source failed to compile.
    #[error("script compilation failed: {resource}")]
    Compile {
        /// Diagnostic resource name the source was tagged with.
        resource: String,
    },

    /// The compiled script threw while running in the global scope.
    #[error("script execution failed: {resource}")]
    Run {
        /// Diagnostic resource name the source was tagged with.
        resource: String,
    },

    /// The worker was already disposed.
    #[error(transparent)]
    Disposed(#[from] Disposed),
}

impl ScriptError {
    /// Create a new `Compile` error.
    pub fn compile(resource: impl Into<String>) -> Self {
        Self::Compile {
            resource: resource.into(),
        }
    }

    /// Create a new `Run` error.
    pub fn run(resource: impl Into<String>) -> Self {
        Self::Run {
            resource: resource.into(),
        }
    }

    /// The control-surface code for this failure stage.
    pub fn code(&self) -> i32 {
        match self {
            Self::Compile { .. } => 1,
            Self::Run { .. } => 2,
            Self::Disposed(_) => -1,
        }
    }
}

/// Failures while loading a module graph from a root identifier.
///
/// The three stages mirror the load algorithm: compile (including source
/// fetch), instantiate (link-time resolution), evaluate (run-time). All
/// record a diagnostic on the worker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModuleError {
    /// A module source failed to fetch or compile.
    ///
    /// `identifier` names the module at which the load aborted, which for a
    /// transitive failure is the failing import rather than the root.
    #[error("module compilation failed: {identifier}")]
    Compile {
        /// Resolved identifier of the failing module.
        identifier: String,
    },

    /// The compiled graph failed to link.
    #[error("module instantiation failed: {identifier}")]
    Instantiate {
        /// Resolved identifier of the root module.
        identifier: String,
    },

    /// The root module threw during evaluation.
    #[error("module evaluation failed: {identifier}")]
    Evaluate {
        /// Resolved identifier of the root module.
        identifier: String,
    },

    /// The worker was already disposed.
    #[error(transparent)]
    Disposed(#[from] Disposed),
}

impl ModuleError {
    /// Create a new `Compile` error.
    pub fn compile(identifier: impl Into<String>) -> Self {
        Self::Compile {
            identifier: identifier.into(),
        }
    }

    /// Create a new `Instantiate` error.
    pub fn instantiate(identifier: impl Into<String>) -> Self {
        Self::Instantiate {
            identifier: identifier.into(),
        }
    }

    /// Create a new `Evaluate` error.
    pub fn evaluate(identifier: impl Into<String>) -> Self {
        Self::Evaluate {
            identifier: identifier.into(),
        }
    }

    /// The control-surface code for this failure stage.
    pub fn code(&self) -> i32 {
        match self {
            Self::Compile { .. } => 1,
            Self::Instantiate { .. } => 2,
            Self::Evaluate { .. } => 3,
            Self::Disposed(_) => -1,
        }
    }

    /// Returns `true` if the load aborted before link time.
    pub fn is_compile(&self) -> bool {
        matches!(self, Self::Compile { .. })
    }
}

/// Failures on the async (fire-and-forget) message channel.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// No callback was registered with `$recv`.
    ///
    /// Unlike the reverse-sync channel, this case also writes a sentinel
    /// diagnostic on the worker.
    #[error("no async receiver registered")]
    NoReceiver,

    /// The registered receiver threw; the diagnostic holds the details.
    #[error("async receiver raised an exception")]
    ReceiverException,

    /// The worker was already disposed.
    #[error(transparent)]
    Disposed(#[from] Disposed),
}

impl SendError {
    /// The control-surface code for this failure stage.
    pub fn code(&self) -> i32 {
        match self {
            Self::NoReceiver => 1,
            Self::ReceiverException => 2,
            Self::Disposed(_) => -1,
        }
    }
}

/// Failure to create a worker's engine instance.
///
/// Worker creation is atomic: when this is returned, no partially
/// constructed worker exists.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpawnError {
    /// The engine collaborator could not create an instance.
    #[error("engine creation failed: {reason}")]
    Engine {
        /// Description of the engine-side failure.
        reason: String,
    },
}

impl SpawnError {
    /// Create a new `Engine` error.
    pub fn engine(reason: impl Into<String>) -> Self {
        Self::Engine {
            reason: reason.into(),
        }
    }
}

/// Errors from the id-keyed worker registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// A live worker already owns the requested id.
    #[error("worker id already in use: {id}")]
    DuplicateId {
        /// The contested worker id.
        id: u32,
    },

    /// No live worker owns the id; it was never created or was disposed.
    #[error("no live worker with id {id}")]
    UnknownWorker {
        /// The unresolved worker id.
        id: u32,
    },

    /// Worker creation failed.
    #[error(transparent)]
    Spawn(#[from] SpawnError),
}

impl RegistryError {
    /// Returns `true` if the id resolved to no live worker.
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::UnknownWorker { .. })
    }
}

/// The host's source provider could not produce module source text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("module source unavailable: {identifier}")]
pub struct SourceError {
    /// The identifier that could not be resolved to source text.
    pub identifier: String,
}

impl SourceError {
    /// Create a new `SourceError` for `identifier`.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ScriptError::compile("main.js");
        assert_eq!(err.to_string(), "script compilation failed: main.js");

        let err = ModuleError::evaluate("lib/a.js");
        assert_eq!(err.to_string(), "module evaluation failed: lib/a.js");

        assert_eq!(Disposed.to_string(), "worker already disposed");
    }

    #[test]
    fn test_script_codes() {
        assert_eq!(ScriptError::compile("x").code(), 1);
        assert_eq!(ScriptError::run("x").code(), 2);
        assert_eq!(ScriptError::from(Disposed).code(), -1);
    }

    #[test]
    fn test_module_codes() {
        assert_eq!(ModuleError::compile("x").code(), 1);
        assert_eq!(ModuleError::instantiate("x").code(), 2);
        assert_eq!(ModuleError::evaluate("x").code(), 3);
        assert!(ModuleError::compile("x").is_compile());
        assert!(!ModuleError::evaluate("x").is_compile());
    }

    #[test]
    fn test_send_codes() {
        assert_eq!(SendError::NoReceiver.code(), 1);
        assert_eq!(SendError::ReceiverException.code(), 2);
    }

    #[test]
    fn test_registry_predicates() {
        assert!(RegistryError::UnknownWorker { id: 7 }.is_unknown());
        assert!(!RegistryError::DuplicateId { id: 7 }.is_unknown());

        let err: RegistryError = SpawnError::engine("boom").into();
        assert!(matches!(err, RegistryError::Spawn(_)));
    }
}
