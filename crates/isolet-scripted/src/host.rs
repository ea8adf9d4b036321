//! In-memory host collaborator.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use isolet_common::{SourceError, WorkerId};
use isolet_core::host::WorkerHost;

type Responder = Arc<dyn Fn(WorkerId, &str) -> Option<String> + Send + Sync>;

/// A [`WorkerHost`] backed entirely by memory.
///
/// Sources are registered up front and served with a per-identifier fetch
/// counter; messages, requests, and printed lines are recorded for
/// inspection. The sync responder defaults to echoing the request back and
/// can be replaced, including with one that returns `None` to exercise the
/// non-string reply path.
#[derive(Default)]
pub struct MemoryHost {
    sources: Mutex<HashMap<String, String>>,
    fetches: Mutex<HashMap<String, usize>>,
    messages: Mutex<Vec<String>>,
    requests: Mutex<Vec<String>>,
    printed: Mutex<Vec<String>>,
    responder: Mutex<Option<Responder>>,
}

impl MemoryHost {
    /// An empty host with no sources and the echoing responder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register source text for a module identifier.
    pub fn add_source(&self, identifier: impl Into<String>, source: impl Into<String>) {
        self.sources.lock().insert(identifier.into(), source.into());
    }

    /// How many times `identifier` was fetched.
    pub fn fetch_count(&self, identifier: &str) -> usize {
        self.fetches.lock().get(identifier).copied().unwrap_or(0)
    }

    /// Messages delivered through the async channel, oldest first.
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    /// Requests received on the sync channel, oldest first.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    /// Lines written through the debug sink, oldest first.
    pub fn printed(&self) -> Vec<String> {
        self.printed.lock().clone()
    }

    /// Replace the sync responder.
    pub fn set_responder(
        &self,
        responder: impl Fn(WorkerId, &str) -> Option<String> + Send + Sync + 'static,
    ) {
        *self.responder.lock() = Some(Arc::new(responder));
    }
}

impl WorkerHost for MemoryHost {
    fn module_source(&self, _worker: WorkerId, identifier: &str) -> Result<String, SourceError> {
        *self.fetches.lock().entry(identifier.to_string()).or_insert(0) += 1;
        self.sources
            .lock()
            .get(identifier)
            .cloned()
            .ok_or_else(|| SourceError::new(identifier))
    }

    fn on_message(&self, _worker: WorkerId, message: &str) {
        self.messages.lock().push(message.to_string());
    }

    fn on_request(&self, worker: WorkerId, message: &str) -> Option<String> {
        self.requests.lock().push(message.to_string());
        // Clone the responder out so a re-entrant request cannot deadlock
        // on the slot lock.
        let responder = self.responder.lock().clone();
        match responder {
            Some(responder) => responder(worker, message),
            None => Some(message.to_string()),
        }
    }

    fn on_print(&self, _worker: WorkerId, line: &str) {
        self.printed.lock().push(line.to_string());
    }
}

impl std::fmt::Debug for MemoryHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHost")
            .field("sources", &self.sources.lock().len())
            .field("messages", &self.messages.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_counting() {
        let host = MemoryHost::new();
        host.add_source("a.is", "send hi");

        assert_eq!(host.fetch_count("a.is"), 0);
        host.module_source(1, "a.is").unwrap();
        host.module_source(1, "a.is").unwrap();
        assert_eq!(host.fetch_count("a.is"), 2);

        assert!(host.module_source(1, "missing.is").is_err());
        assert_eq!(host.fetch_count("missing.is"), 1);
    }

    #[test]
    fn test_default_responder_echoes() {
        let host = MemoryHost::new();
        assert_eq!(host.on_request(1, "ping"), Some("ping".to_string()));
        assert_eq!(host.requests(), vec!["ping"]);
    }

    #[test]
    fn test_responder_override() {
        let host = MemoryHost::new();
        host.set_responder(|_, _| None);
        assert_eq!(host.on_request(1, "ping"), None);
    }
}
