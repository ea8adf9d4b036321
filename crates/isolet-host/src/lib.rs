//! Host-side utilities above a single worker.
//!
//! This crate provides [`WorkerRegistry`], the id-keyed table of live
//! workers backing the host's control surface: create by id, route by id,
//! dispose by id, with duplicate- and unknown-id guards.

pub mod registry;

pub use registry::WorkerRegistry;
