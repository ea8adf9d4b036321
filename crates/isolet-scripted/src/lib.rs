//! Deterministic reference engine for isolet.
//!
//! The worker runtime treats the script engine as an external collaborator
//! behind the [`isolet_core::ScriptEngine`] trait. This crate supplies a
//! small, fully deterministic implementation of that contract over a
//! line-based command language, together with [`MemoryHost`], an in-memory
//! host collaborator. The pair drives the CLI binary and the integration
//! test-suite without any native engine dependency.

pub mod engine;
pub mod host;

pub use engine::{SCRIPTED_ENGINE_VERSION, ScriptedEngine, ScriptedEngineFactory};
pub use host::MemoryHost;
