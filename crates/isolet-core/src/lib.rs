//! Core worker runtime for isolet.
//!
//! This crate embeds an isolated script execution environment (a "worker")
//! behind a narrow, thread-safe control surface:
//! - [`Worker`]: one engine instance, one global scope, two message-channel
//!   slots, and the most recent diagnostic
//! - [`WorkerRuntime`]: engine factory holder that spawns workers
//! - [`WorkerBridge`]: the boundary context connecting script-visible
//!   globals to host callbacks
//! - [`ModuleCache`]: per-worker compile-once module map
//! - [`ScriptEngine`]: the external engine collaborator, specified as a
//!   trait at its interface
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     WorkerRuntime                       │
//! │  (EngineFactory + version, shared, read-only)           │
//! └─────────────────────────────────────────────────────────┘
//!                            │ spawn
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                        Worker                           │
//! │  (execution lock, engine slot, module cache,            │
//! │   last diagnostic)                                      │
//! └─────────────────────────────────────────────────────────┘
//!                            │ $send / $sendSync / $print
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                  WorkerBridge → WorkerHost              │
//! │  (receiver slots, sentinel replies, debug sink)         │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod bridge;
pub mod cache;
pub mod diagnostics;
pub mod engine;
pub mod host;
mod loader;
pub mod runtime;
pub mod worker;

pub use bridge::{NO_ASYNC_RECEIVER, NO_SYNC_RECEIVER, NON_STRING_RESULT, WorkerBridge};
pub use cache::ModuleCache;
pub use diagnostics::render_exception;
pub use engine::{
    EngineFactory, ExceptionSite, FunctionRef, ImportResolver, ModuleRef, ModuleUnit, ScriptEngine,
    ScriptException, ScriptRef,
};
pub use host::WorkerHost;
pub use runtime::WorkerRuntime;
pub use worker::Worker;
