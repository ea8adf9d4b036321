//! isolet CLI entry point.
//!
//! Spawns a single worker on the scripted reference engine, loads a script
//! or module from disk, then pumps any requested messages through the
//! duplex channels.

use std::ffi::OsStr;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use isolet_common::{SourceError, WorkerId, WorkerOptions};
use isolet_core::{Worker, WorkerHost, WorkerRuntime};
use isolet_scripted::ScriptedEngineFactory;

/// Load and drive a scripted worker from the command line.
#[derive(Parser, Debug)]
#[command(name = "isolet", version, about)]
struct Args {
    /// Script or module file to load.
    file: PathBuf,

    /// Load the file as a module graph root instead of a flat script.
    #[arg(long)]
    module: bool,

    /// Install the `$print` debug global in the worker's scope.
    #[arg(long)]
    print: bool,

    /// Worker id used for collaborator callbacks.
    #[arg(long, default_value_t = 1)]
    id: WorkerId,

    /// Messages to deliver on the async channel after loading.
    #[arg(long = "send", value_name = "MSG")]
    send: Vec<String>,

    /// Requests to deliver on the sync channel after loading.
    #[arg(long = "request", value_name = "MSG")]
    request: Vec<String>,
}

/// Filesystem-backed host: module sources are files next to the root
/// script, messages go to stdout, and sync requests are echoed back.
struct CliHost {
    root: PathBuf,
}

impl WorkerHost for CliHost {
    fn module_source(&self, _worker: WorkerId, identifier: &str) -> Result<String, SourceError> {
        fs::read_to_string(self.root.join(identifier)).map_err(|_| SourceError::new(identifier))
    }

    fn on_message(&self, worker: WorkerId, message: &str) {
        println!("[worker {worker}] {message}");
    }

    fn on_request(&self, _worker: WorkerId, message: &str) -> Option<String> {
        Some(message.to_string())
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let runtime = WorkerRuntime::new(Arc::new(ScriptedEngineFactory::new()));
    info!(version = runtime.version(), "engine collaborator ready");

    let root = args
        .file
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), |parent| parent.to_path_buf());
    let host = Arc::new(CliHost { root });

    let options = if args.print {
        WorkerOptions::with_print()
    } else {
        WorkerOptions::default()
    };
    let worker = runtime.spawn(args.id, host, &options)?;

    let code = load(&worker, &args)?;
    if code != 0 {
        eprint!("{}", worker.last_exception());
        std::process::exit(code);
    }

    for message in &args.send {
        if worker.send(message).is_err() {
            eprint!("{}", worker.last_exception());
            std::process::exit(1);
        }
    }

    for message in &args.request {
        println!("{}", worker.send_sync(message)?);
    }

    worker.dispose()?;
    Ok(())
}

/// Load the file through the requested path, returning the stage code.
fn load(worker: &Worker, args: &Args) -> anyhow::Result<i32> {
    if args.module {
        let identifier = args
            .file
            .file_name()
            .and_then(OsStr::to_str)
            .context("module path has no file name")?;
        Ok(worker
            .load_module(identifier)
            .map_or_else(|e| e.code(), |()| 0))
    } else {
        let source = fs::read_to_string(&args.file)
            .with_context(|| format!("cannot read {}", args.file.display()))?;
        let resource = args.file.display().to_string();
        Ok(worker
            .load_script(&resource, &source)
            .map_or_else(|e| e.code(), |()| 0))
    }
}
