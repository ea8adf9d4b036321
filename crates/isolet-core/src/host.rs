//! The host collaborator interface.

use std::io::Write;

use isolet_common::{SourceError, WorkerId};

/// Host-supplied collaborator a worker calls into, keyed by worker id.
///
/// One host serves a worker for its whole lifetime (it may serve many
/// workers; the id identifies the caller). All methods are synchronous and
/// may be invoked from whichever thread currently drives the worker.
pub trait WorkerHost: Send + Sync {
    /// Produce source text for a module identifier.
    ///
    /// Called during a module load, from inside the worker's execution
    /// lock. The implementation must not recurse into this worker's
    /// execution lock (loading modules or sending messages on the same
    /// worker from here is a contract violation).
    fn module_source(&self, worker: WorkerId, identifier: &str) -> Result<String, SourceError>;

    /// Fire-and-forget delivery of a script-initiated `$send` message.
    fn on_message(&self, worker: WorkerId, message: &str);

    /// Script-initiated `$sendSync` request.
    ///
    /// The returned string becomes the boundary call's result inside the
    /// script. Return `None` for a reply the boundary cannot represent as a
    /// string; the script then receives the fixed non-string sentinel
    /// instead of an exception.
    fn on_request(&self, worker: WorkerId, message: &str) -> Option<String>;

    /// Debug sink behind the optional `$print` global.
    ///
    /// `line` arrives space-joined with a trailing newline. Never fails
    /// observably. The default writes to stdout.
    fn on_print(&self, worker: WorkerId, line: &str) {
        let _ = worker;
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(line.as_bytes());
        let _ = stdout.flush();
    }
}
