//! The duplex channel bridge between script-side globals and host
//! callbacks.
//!
//! A [`WorkerBridge`] is the explicit context object handed to the engine
//! at creation: every boundary-global invocation (`$recv`, `$send`,
//! `$recvSync`, `$sendSync`, `$print`) routes through it, and it carries
//! the back-reference (the worker id) the host needs to attribute
//! callbacks. The bridge never acquires the worker's execution lock, which
//! is what keeps re-entrant host callbacks deadlock-free.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use isolet_common::WorkerId;

use crate::engine::FunctionRef;
use crate::host::WorkerHost;

/// Sentinel diagnostic recorded when `send` finds no `$recv` callback.
pub const NO_ASYNC_RECEIVER: &str = "isolet: callback not registered with $recv";

/// Sentinel string returned when `send_sync` finds no `$recvSync` callback.
pub const NO_SYNC_RECEIVER: &str = "isolet: callback not registered with $recvSync";

/// Sentinel string standing in for a reply that is not a string.
pub const NON_STRING_RESULT: &str = "isolet: non-string return value";

/// Boundary context shared between a worker and its engine.
///
/// Holds exactly one callback slot per channel; registering replaces the
/// previous callback, there is no queuing of multiple listeners.
pub struct WorkerBridge {
    worker: WorkerId,
    host: Arc<dyn WorkerHost>,
    print_enabled: bool,
    async_receiver: Mutex<Option<FunctionRef>>,
    sync_receiver: Mutex<Option<FunctionRef>>,
}

impl WorkerBridge {
    /// Create the bridge for worker `worker`, delivering to `host`.
    pub fn new(worker: WorkerId, host: Arc<dyn WorkerHost>, print_enabled: bool) -> Self {
        Self {
            worker,
            host,
            print_enabled,
            async_receiver: Mutex::new(None),
            sync_receiver: Mutex::new(None),
        }
    }

    /// The owning worker's id.
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Whether the `$print` global was requested at worker creation.
    ///
    /// Engines consult this when installing boundary globals; when `false`
    /// the global must be absent from the scope.
    pub fn print_enabled(&self) -> bool {
        self.print_enabled
    }

    /// `$recv`: capture the async receiver. Last registration wins.
    pub fn register_async_receiver(&self, receiver: FunctionRef) {
        *self.async_receiver.lock() = Some(receiver);
        debug!(worker = self.worker, "async receiver registered");
    }

    /// `$recvSync`: capture the sync receiver. Last registration wins.
    pub fn register_sync_receiver(&self, receiver: FunctionRef) {
        *self.sync_receiver.lock() = Some(receiver);
        debug!(worker = self.worker, "sync receiver registered");
    }

    /// The currently registered async receiver.
    pub fn async_receiver(&self) -> Option<FunctionRef> {
        *self.async_receiver.lock()
    }

    /// The currently registered sync receiver.
    pub fn sync_receiver(&self) -> Option<FunctionRef> {
        *self.sync_receiver.lock()
    }

    /// Release both captured callbacks. Worker disposal only.
    pub(crate) fn clear_receivers(&self) {
        *self.async_receiver.lock() = None;
        *self.sync_receiver.lock() = None;
    }

    /// `$send`: deliver a script-initiated message to the host.
    ///
    /// Fire-and-forget from the script's point of view; the host callback
    /// runs to completion before script execution resumes.
    pub fn post_message(&self, message: &str) {
        self.host.on_message(self.worker, message);
    }

    /// `$sendSync`: deliver a script-initiated request and produce the
    /// string handed back to the script.
    ///
    /// A reply the host cannot represent as a string becomes the fixed
    /// non-string sentinel, so the script-side caller always receives some
    /// string.
    pub fn request(&self, message: &str) -> String {
        match self.host.on_request(self.worker, message) {
            Some(reply) => reply,
            None => NON_STRING_RESULT.to_string(),
        }
    }

    /// `$print`: space-join `arguments`, append a newline, hand the line to
    /// the host's debug sink.
    pub fn print(&self, arguments: &[String]) {
        let mut line = arguments.join(" ");
        line.push('\n');
        self.host.on_print(self.worker, &line);
    }
}

impl std::fmt::Debug for WorkerBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerBridge")
            .field("worker", &self.worker)
            .field("print_enabled", &self.print_enabled)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isolet_common::SourceError;

    #[derive(Default)]
    struct CollectingHost {
        messages: Mutex<Vec<String>>,
        printed: Mutex<Vec<String>>,
        reply: Mutex<Option<String>>,
    }

    impl WorkerHost for CollectingHost {
        fn module_source(&self, _: WorkerId, identifier: &str) -> Result<String, SourceError> {
            Err(SourceError::new(identifier))
        }

        fn on_message(&self, _: WorkerId, message: &str) {
            self.messages.lock().push(message.to_string());
        }

        fn on_request(&self, _: WorkerId, _: &str) -> Option<String> {
            self.reply.lock().clone()
        }

        fn on_print(&self, _: WorkerId, line: &str) {
            self.printed.lock().push(line.to_string());
        }
    }

    fn bridge(host: &Arc<CollectingHost>) -> WorkerBridge {
        WorkerBridge::new(1, host.clone(), true)
    }

    #[test]
    fn test_receiver_slots_last_registration_wins() {
        let host = Arc::new(CollectingHost::default());
        let bridge = bridge(&host);

        assert_eq!(bridge.async_receiver(), None);
        bridge.register_async_receiver(FunctionRef::new(1));
        bridge.register_async_receiver(FunctionRef::new(2));
        assert_eq!(bridge.async_receiver(), Some(FunctionRef::new(2)));

        bridge.register_sync_receiver(FunctionRef::new(5));
        assert_eq!(bridge.sync_receiver(), Some(FunctionRef::new(5)));

        bridge.clear_receivers();
        assert_eq!(bridge.async_receiver(), None);
        assert_eq!(bridge.sync_receiver(), None);
    }

    #[test]
    fn test_post_message_reaches_host() {
        let host = Arc::new(CollectingHost::default());
        let bridge = bridge(&host);

        bridge.post_message("hello");
        assert_eq!(*host.messages.lock(), vec!["hello".to_string()]);
    }

    #[test]
    fn test_request_string_reply() {
        let host = Arc::new(CollectingHost::default());
        *host.reply.lock() = Some("pong".into());
        let bridge = bridge(&host);

        assert_eq!(bridge.request("ping"), "pong");
    }

    #[test]
    fn test_request_non_string_reply_yields_sentinel() {
        let host = Arc::new(CollectingHost::default());
        let bridge = bridge(&host);

        assert_eq!(bridge.request("ping"), NON_STRING_RESULT);
    }

    #[test]
    fn test_print_joins_and_terminates() {
        let host = Arc::new(CollectingHost::default());
        let bridge = bridge(&host);

        bridge.print(&["a".into(), "b".into(), "c".into()]);
        assert_eq!(*host.printed.lock(), vec!["a b c\n".to_string()]);
    }
}
