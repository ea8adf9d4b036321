//! Configuration structures for isolet workers.

use serde::{Deserialize, Serialize};

/// Per-worker creation options.
///
/// Passed at spawn time; immutable for the worker's lifetime. Can be loaded
/// from files (TOML, JSON) or built in code.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerOptions {
    /// Install the `$print` debug global in the worker's scope.
    ///
    /// When disabled (the default), the global is absent and script code
    /// referencing it fails like any other undefined name.
    #[serde(default = "defaults::enable_print")]
    pub enable_print: bool,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            enable_print: defaults::enable_print(),
        }
    }
}

impl WorkerOptions {
    /// Options with the `$print` debug global installed.
    pub fn with_print() -> Self {
        Self { enable_print: true }
    }
}

/// Default value functions for serde.
mod defaults {
    pub const fn enable_print() -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = WorkerOptions::default();
        assert!(!options.enable_print);
    }

    #[test]
    fn test_with_print() {
        assert!(WorkerOptions::with_print().enable_print);
    }

    #[test]
    fn test_options_serialization() {
        let options = WorkerOptions::with_print();
        let json = serde_json::to_string(&options).unwrap();
        let deserialized: WorkerOptions = serde_json::from_str(&json).unwrap();

        assert_eq!(options.enable_print, deserialized.enable_print);
    }

    #[test]
    fn test_partial_deserialization() {
        let options: WorkerOptions = serde_json::from_str("{}").unwrap();
        assert!(!options.enable_print);
    }
}
