//! Common types, errors, and configuration for isolet.
//!
//! This crate provides shared functionality used across the isolet workspace:
//! - Error types using `thiserror` for type-safe error handling
//! - Configuration structures for worker settings
//! - Common type definitions

pub mod config;
pub mod error;

pub use config::WorkerOptions;
pub use error::{
    Disposed, ModuleError, RegistryError, ScriptError, SendError, SourceError, SpawnError,
};

/// Host-assigned identity of a live worker.
///
/// Ids are opaque to the runtime; the host picks them and uses them to route
/// collaborator callbacks back to the originating worker. An id must be
/// unique among live workers but may be reused after disposal.
pub type WorkerId = u32;
