//! A deterministic line-based engine implementing the collaborator
//! contract.
//!
//! Programs are plain text, one operation per line. Blank lines and lines
//! starting with `#` are skipped. Operations:
//!
//! | Line | Meaning |
//! |---|---|
//! | `use <identifier>` | declare a module import (modules only) |
//! | `fn <name>` … `end` | define a function; its value is captured when the defining program runs |
//! | `recv <name>` | register `<name>` as the async receiver |
//! | `recvsync <name>` | register `<name>` as the sync receiver |
//! | `send <words…>` | post a message to the host |
//! | `sendsync <words…>` | issue a request to the host; the reply is readable as `$reply` |
//! | `print <words…>` | write through the debug sink (fails when `$print` is absent) |
//! | `fail <words…>` | raise a runtime exception |
//! | `return <words…>` | function result; bare `return` produces a non-string result |
//! | `spin` | busy-wait until execution is terminated |
//!
//! Inside any argument list the token `$msg` expands to the invocation
//! argument and `$reply` to the most recent `sendsync` reply. An
//! unrecognized operation is a compile error attributed to its line and
//! column span; `fail` raises with a stack line, so both diagnostic shapes
//! of the formatter are exercised.
//!
//! Termination is a sticky flag checked between operations (and inside
//! `spin`); a terminated engine is expected to be disposed, matching how
//! terminated workers are used.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use isolet_common::SpawnError;
use isolet_core::engine::{
    EngineFactory, ExceptionSite, FunctionRef, ImportResolver, ModuleRef, ModuleUnit, ScriptEngine,
    ScriptException, ScriptRef,
};
use isolet_core::bridge::WorkerBridge;

/// Version string reported for this collaborator.
pub const SCRIPTED_ENGINE_VERSION: &str = "scripted/1.0.0";

/// Source text of one compiled program, kept for diagnostics.
#[derive(Debug)]
struct ProgramText {
    resource: String,
    lines: Vec<String>,
}

#[derive(Debug, Clone)]
struct OpLine {
    line: u32,
    op: Op,
}

#[derive(Debug, Clone)]
enum Op {
    Import(String),
    Define { name: String, body: Vec<OpLine> },
    Recv(String),
    RecvSync(String),
    Send(Vec<String>),
    SendSync(Vec<String>),
    Print(Vec<String>),
    Fail(Vec<String>),
    Return(Vec<String>),
    Spin,
}

#[derive(Debug, Clone)]
struct Program {
    text: Arc<ProgramText>,
    ops: Vec<OpLine>,
    imports: Vec<String>,
}

#[derive(Clone)]
struct FunctionDef {
    text: Arc<ProgramText>,
    body: Vec<OpLine>,
}

struct ModuleSlot {
    program: Program,
    links: Vec<ModuleRef>,
    instantiated: bool,
    evaluated: bool,
}

#[derive(Default)]
struct EngineInner {
    scripts: Vec<Program>,
    modules: Vec<ModuleSlot>,
    functions: Vec<FunctionDef>,
    globals: HashMap<String, FunctionRef>,
}

/// The scripted engine: one instance per worker, bound to its bridge.
pub struct ScriptedEngine {
    bridge: Arc<WorkerBridge>,
    inner: Mutex<EngineInner>,
    terminated: AtomicBool,
}

impl ScriptedEngine {
    /// A fresh engine routing its boundary globals through `bridge`.
    pub fn new(bridge: Arc<WorkerBridge>) -> Self {
        Self {
            bridge,
            inner: Mutex::new(EngineInner::default()),
            terminated: AtomicBool::new(false),
        }
    }

    fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Relaxed)
    }

    fn define_function(&self, text: Arc<ProgramText>, body: Vec<OpLine>) -> FunctionRef {
        let mut inner = self.inner.lock();
        let reference = FunctionRef::new(inner.functions.len() as u64);
        inner.functions.push(FunctionDef { text, body });
        reference
    }

    fn execute(
        &self,
        text: &Arc<ProgramText>,
        ops: &[OpLine],
        argument: Option<&str>,
    ) -> Result<Option<String>, ScriptException> {
        let mut frame = Frame {
            engine: self,
            text,
            argument,
            reply: String::new(),
        };
        frame.run(ops)
    }

    fn evaluate_inner(
        &self,
        handle: ModuleRef,
        resource_hint: &str,
    ) -> Result<(), ScriptException> {
        let (program, links, already) = {
            let mut inner = self.inner.lock();
            let slot = inner
                .modules
                .get_mut(handle.raw() as usize)
                .ok_or_else(|| ScriptException::new("unknown module handle"))?;
            if !slot.instantiated {
                return Err(ScriptException::new(format!(
                    "module not instantiated: {resource_hint}"
                )));
            }
            let already = slot.evaluated;
            // Marked before visiting links so a cyclic graph evaluates each
            // module exactly once.
            slot.evaluated = true;
            (slot.program.clone(), slot.links.clone(), already)
        };

        if already {
            return Ok(());
        }

        for link in links {
            self.evaluate_inner(link, resource_hint)?;
        }

        self.execute(&program.text, &program.ops, None).map(|_| ())
    }
}

impl ScriptEngine for ScriptedEngine {
    fn compile_script(&self, resource: &str, source: &str) -> Result<ScriptRef, ScriptException> {
        let program = parse(resource, source, false)?;
        let mut inner = self.inner.lock();
        let reference = ScriptRef::new(inner.scripts.len() as u64);
        inner.scripts.push(program);
        debug!(resource, "script compiled");
        Ok(reference)
    }

    fn run_script(&self, script: &ScriptRef) -> Result<(), ScriptException> {
        let program = self
            .inner
            .lock()
            .scripts
            .get(script.raw() as usize)
            .cloned()
            .ok_or_else(|| ScriptException::new("unknown script handle"))?;

        self.execute(&program.text, &program.ops, None).map(|_| ())
    }

    fn compile_module(
        &self,
        identifier: &str,
        source: &str,
    ) -> Result<ModuleUnit, ScriptException> {
        let program = parse(identifier, source, true)?;
        let imports = program.imports.clone();

        let mut inner = self.inner.lock();
        let handle = ModuleRef::new(inner.modules.len() as u64);
        inner.modules.push(ModuleSlot {
            program,
            links: Vec::new(),
            instantiated: false,
            evaluated: false,
        });
        debug!(identifier, imports = imports.len(), "module compiled");
        Ok(ModuleUnit { handle, imports })
    }

    fn instantiate_module(
        &self,
        module: ModuleRef,
        resolver: &dyn ImportResolver,
    ) -> Result<(), ScriptException> {
        let mut stack = vec![module];
        let mut seen = HashSet::new();

        while let Some(handle) = stack.pop() {
            if !seen.insert(handle) {
                continue;
            }

            let (imports, resource) = {
                let inner = self.inner.lock();
                let slot = inner
                    .modules
                    .get(handle.raw() as usize)
                    .ok_or_else(|| ScriptException::new("unknown module handle"))?;
                (
                    slot.program.imports.clone(),
                    slot.program.text.resource.clone(),
                )
            };

            let mut links = Vec::with_capacity(imports.len());
            for specifier in &imports {
                match resolver.resolve(specifier) {
                    Some(resolved) => {
                        links.push(resolved);
                        stack.push(resolved);
                    }
                    None => {
                        return Err(ScriptException::new(format!(
                            "unresolved import `{specifier}` in {resource}"
                        )));
                    }
                }
            }

            let mut inner = self.inner.lock();
            let slot = &mut inner.modules[handle.raw() as usize];
            slot.links = links;
            slot.instantiated = true;
        }

        Ok(())
    }

    fn evaluate_module(&self, module: ModuleRef) -> Result<(), ScriptException> {
        let resource = {
            let inner = self.inner.lock();
            inner
                .modules
                .get(module.raw() as usize)
                .map(|slot| slot.program.text.resource.clone())
                .ok_or_else(|| ScriptException::new("unknown module handle"))?
        };
        self.evaluate_inner(module, &resource)
    }

    fn call_function(
        &self,
        function: FunctionRef,
        argument: &str,
    ) -> Result<Option<String>, ScriptException> {
        let def = self
            .inner
            .lock()
            .functions
            .get(function.raw() as usize)
            .cloned()
            .ok_or_else(|| ScriptException::new("unknown function handle"))?;

        self.execute(&def.text, &def.body, Some(argument))
    }

    fn terminate_execution(&self) {
        self.terminated.store(true, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for ScriptedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ScriptedEngine")
            .field("worker", &self.bridge.worker())
            .field("scripts", &inner.scripts.len())
            .field("modules", &inner.modules.len())
            .field("terminated", &self.is_terminated())
            .finish_non_exhaustive()
    }
}

/// Factory for [`ScriptedEngine`] instances.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptedEngineFactory;

impl ScriptedEngineFactory {
    /// A new factory.
    pub fn new() -> Self {
        Self
    }
}

impl EngineFactory for ScriptedEngineFactory {
    fn version(&self) -> &str {
        SCRIPTED_ENGINE_VERSION
    }

    fn create_engine(
        &self,
        bridge: Arc<WorkerBridge>,
    ) -> Result<Box<dyn ScriptEngine>, SpawnError> {
        Ok(Box::new(ScriptedEngine::new(bridge)))
    }
}

/// One in-flight program or function invocation.
struct Frame<'a> {
    engine: &'a ScriptedEngine,
    text: &'a Arc<ProgramText>,
    argument: Option<&'a str>,
    reply: String,
}

impl Frame<'_> {
    fn run(&mut self, ops: &[OpLine]) -> Result<Option<String>, ScriptException> {
        for op_line in ops {
            if self.engine.is_terminated() {
                return Err(terminated());
            }

            match &op_line.op {
                Op::Import(_) => {}
                Op::Define { name, body } => {
                    let reference = self
                        .engine
                        .define_function(self.text.clone(), body.clone());
                    self.engine.inner.lock().globals.insert(name.clone(), reference);
                }
                Op::Recv(name) => {
                    let function = self.function_named(name, op_line.line)?;
                    self.engine.bridge.register_async_receiver(function);
                }
                Op::RecvSync(name) => {
                    let function = self.function_named(name, op_line.line)?;
                    self.engine.bridge.register_sync_receiver(function);
                }
                Op::Send(args) => {
                    let message = self.expand(args);
                    self.engine.bridge.post_message(&message);
                }
                Op::SendSync(args) => {
                    let message = self.expand(args);
                    self.reply = self.engine.bridge.request(&message);
                }
                Op::Print(args) => {
                    if !self.engine.bridge.print_enabled() {
                        return Err(self.raise(op_line.line, "$print is not defined".to_string()));
                    }
                    let expanded: Vec<String> =
                        args.iter().map(|arg| self.expand_token(arg)).collect();
                    self.engine.bridge.print(&expanded);
                }
                Op::Fail(args) => {
                    let message = if args.is_empty() {
                        "script failure".to_string()
                    } else {
                        self.expand(args)
                    };
                    return Err(self.raise(op_line.line, message));
                }
                Op::Return(args) => {
                    return Ok(if args.is_empty() {
                        None
                    } else {
                        Some(self.expand(args))
                    });
                }
                Op::Spin => loop {
                    if self.engine.is_terminated() {
                        return Err(terminated());
                    }
                    thread::sleep(Duration::from_millis(1));
                },
            }
        }
        Ok(None)
    }

    fn expand(&self, args: &[String]) -> String {
        let expanded: Vec<String> = args.iter().map(|arg| self.expand_token(arg)).collect();
        expanded.join(" ")
    }

    fn expand_token(&self, token: &str) -> String {
        match token {
            "$msg" => self.argument.unwrap_or_default().to_string(),
            "$reply" => self.reply.clone(),
            other => other.to_string(),
        }
    }

    fn function_named(&self, name: &str, line: u32) -> Result<FunctionRef, ScriptException> {
        self.engine
            .inner
            .lock()
            .globals
            .get(name)
            .copied()
            .ok_or_else(|| self.raise(line, format!("`{name}` is not defined")))
    }

    fn raise(&self, line: u32, message: String) -> ScriptException {
        runtime_error(self.text, line, message)
    }
}

fn terminated() -> ScriptException {
    ScriptException::new("execution terminated")
}

fn parse(resource: &str, source: &str, as_module: bool) -> Result<Program, ScriptException> {
    let text = Arc::new(ProgramText {
        resource: resource.to_string(),
        lines: source.lines().map(str::to_string).collect(),
    });

    let mut ops = Vec::new();
    let mut imports = Vec::new();
    let mut index = 0;

    while index < text.lines.len() {
        let line_no = (index + 1) as u32;
        let raw = text.lines[index].clone();
        index += 1;

        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut tokens = trimmed.split_whitespace();
        let word = tokens.next().unwrap_or_default().to_string();
        let args: Vec<String> = tokens.map(str::to_string).collect();

        match word.as_str() {
            "use" => {
                if !as_module {
                    return Err(compile_error(
                        &text,
                        line_no,
                        &word,
                        "import declarations are only valid in modules",
                    ));
                }
                let [specifier] = args.as_slice() else {
                    return Err(compile_error(
                        &text,
                        line_no,
                        &word,
                        "`use` expects exactly one specifier",
                    ));
                };
                imports.push(specifier.clone());
                ops.push(OpLine {
                    line: line_no,
                    op: Op::Import(specifier.clone()),
                });
            }
            "fn" => {
                let [name] = args.as_slice() else {
                    return Err(compile_error(
                        &text,
                        line_no,
                        &word,
                        "`fn` expects exactly one name",
                    ));
                };

                let mut body = Vec::new();
                loop {
                    let Some(raw_body) = text.lines.get(index) else {
                        return Err(compile_error(
                            &text,
                            line_no,
                            name,
                            format!("missing `end` for function `{name}`"),
                        ));
                    };
                    let body_line_no = (index + 1) as u32;
                    let body_trimmed = raw_body.trim().to_string();
                    index += 1;

                    if body_trimmed.is_empty() || body_trimmed.starts_with('#') {
                        continue;
                    }
                    let mut body_tokens = body_trimmed.split_whitespace();
                    let body_word = body_tokens.next().unwrap_or_default().to_string();
                    if body_word == "end" {
                        break;
                    }
                    if body_word == "fn" || body_word == "use" {
                        return Err(compile_error(
                            &text,
                            body_line_no,
                            &body_word,
                            format!("`{body_word}` is not allowed inside a function"),
                        ));
                    }
                    let body_args: Vec<String> = body_tokens.map(str::to_string).collect();
                    let op = parse_simple(&text, body_line_no, &body_word, body_args)?;
                    body.push(OpLine {
                        line: body_line_no,
                        op,
                    });
                }

                ops.push(OpLine {
                    line: line_no,
                    op: Op::Define {
                        name: name.clone(),
                        body,
                    },
                });
            }
            "end" => {
                return Err(compile_error(
                    &text,
                    line_no,
                    &word,
                    "`end` without a function",
                ));
            }
            _ => {
                let op = parse_simple(&text, line_no, &word, args)?;
                ops.push(OpLine { line: line_no, op });
            }
        }
    }

    Ok(Program { text, ops, imports })
}

fn parse_simple(
    text: &Arc<ProgramText>,
    line: u32,
    word: &str,
    args: Vec<String>,
) -> Result<Op, ScriptException> {
    match word {
        "recv" | "recvsync" => {
            let [name] = args.as_slice() else {
                return Err(compile_error(
                    text,
                    line,
                    word,
                    format!("`{word}` expects exactly one function name"),
                ));
            };
            if word == "recv" {
                Ok(Op::Recv(name.clone()))
            } else {
                Ok(Op::RecvSync(name.clone()))
            }
        }
        "send" => Ok(Op::Send(args)),
        "sendsync" => Ok(Op::SendSync(args)),
        "print" => Ok(Op::Print(args)),
        "fail" => Ok(Op::Fail(args)),
        "return" => Ok(Op::Return(args)),
        "spin" => Ok(Op::Spin),
        _ => Err(compile_error(
            text,
            line,
            word,
            format!("unknown operation `{word}`"),
        )),
    }
}

/// Compile-time exception: the caret span covers the offending token, and
/// there is no stack trace, so the formatter falls back to the message.
fn compile_error(
    text: &Arc<ProgramText>,
    line: u32,
    token: &str,
    message: impl Into<String>,
) -> ScriptException {
    let source_line = text
        .lines
        .get((line - 1) as usize)
        .cloned()
        .unwrap_or_default();
    let start = source_line.find(token).unwrap_or(0) as u32;
    let end = start + token.len() as u32;

    ScriptException::with_site(
        message,
        ExceptionSite {
            resource: text.resource.clone(),
            line,
            start_column: start,
            end_column: end,
            source_line,
            stack_trace: None,
        },
    )
}

/// Run-time exception: the caret span covers the whole statement and a
/// single-frame stack trace points at the raising line.
fn runtime_error(text: &Arc<ProgramText>, line: u32, message: String) -> ScriptException {
    let source_line = text
        .lines
        .get((line - 1) as usize)
        .cloned()
        .unwrap_or_default();
    let start = (source_line.len() - source_line.trim_start().len()) as u32;
    let end = source_line.trim_end().len() as u32;
    let stack = format!("{message}\n    at {}:{line}", text.resource);

    ScriptException::with_site(
        message,
        ExceptionSite {
            resource: text.resource.clone(),
            line,
            start_column: start,
            end_column: end.max(start),
            source_line,
            stack_trace: Some(stack),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use isolet_core::cache::ModuleCache;

    fn engine_with_host(print: bool) -> (ScriptedEngine, Arc<MemoryHost>) {
        let host = Arc::new(MemoryHost::new());
        let bridge = Arc::new(WorkerBridge::new(1, host.clone(), print));
        (ScriptedEngine::new(bridge), host)
    }

    #[test]
    fn test_unknown_operation_is_positioned() {
        let (engine, _host) = engine_with_host(false);

        let err = engine
            .compile_script("bad.is", "send ok\n  frobnicate now\n")
            .unwrap_err();

        let site = err.site.expect("compile errors carry a site");
        assert_eq!(site.resource, "bad.is");
        assert_eq!(site.line, 2);
        assert_eq!(site.start_column, 2);
        assert_eq!(site.end_column, 12);
        assert_eq!(site.source_line, "  frobnicate now");
        assert!(site.stack_trace.is_none());
        assert!(err.message.contains("frobnicate"));
    }

    #[test]
    fn test_use_rejected_in_flat_scripts() {
        let (engine, _host) = engine_with_host(false);

        let err = engine.compile_script("bad.is", "use lib.is\n").unwrap_err();
        assert!(err.message.contains("only valid in modules"));
    }

    #[test]
    fn test_script_sends_reach_the_host() {
        let (engine, host) = engine_with_host(false);

        let script = engine
            .compile_script("main.is", "send one\nsend two words\n")
            .unwrap();
        engine.run_script(&script).unwrap();

        assert_eq!(host.messages(), vec!["one", "two words"]);
    }

    #[test]
    fn test_fail_produces_stack_trace() {
        let (engine, _host) = engine_with_host(false);

        let script = engine.compile_script("main.is", "fail boom\n").unwrap();
        let err = engine.run_script(&script).unwrap_err();

        assert_eq!(err.message, "boom");
        let site = err.site.unwrap();
        assert_eq!(site.line, 1);
        assert_eq!(site.stack_trace.as_deref(), Some("boom\n    at main.is:1"));
    }

    #[test]
    fn test_function_call_expands_argument() {
        let (engine, host) = engine_with_host(false);

        let script = engine
            .compile_script("main.is", "fn echo\nsend got $msg\nend\nrecv echo\n")
            .unwrap();
        engine.run_script(&script).unwrap();

        let function = engine.bridge.async_receiver().unwrap();
        let result = engine.call_function(function, "hi").unwrap();

        assert_eq!(result, None);
        assert_eq!(host.messages(), vec!["got hi"]);
    }

    #[test]
    fn test_function_return_values() {
        let (engine, _host) = engine_with_host(false);

        let script = engine
            .compile_script(
                "main.is",
                "fn stringy\nreturn ok $msg\nend\nfn silent\nsend ignored\nend\nrecvsync stringy\nrecv silent\n",
            )
            .unwrap();
        engine.run_script(&script).unwrap();

        let stringy = engine.bridge.sync_receiver().unwrap();
        assert_eq!(
            engine.call_function(stringy, "x").unwrap(),
            Some("ok x".to_string())
        );

        let silent = engine.bridge.async_receiver().unwrap();
        assert_eq!(engine.call_function(silent, "x").unwrap(), None);
    }

    #[test]
    fn test_sendsync_reply_is_visible() {
        let (engine, host) = engine_with_host(false);
        host.set_responder(|_, message| Some(format!("re:{message}")));

        let script = engine
            .compile_script("main.is", "sendsync ping\nsend $reply\n")
            .unwrap();
        engine.run_script(&script).unwrap();

        assert_eq!(host.requests(), vec!["ping"]);
        assert_eq!(host.messages(), vec!["re:ping"]);
    }

    #[test]
    fn test_print_requires_the_global() {
        let (engine, host) = engine_with_host(true);
        let script = engine.compile_script("main.is", "print a b\n").unwrap();
        engine.run_script(&script).unwrap();
        assert_eq!(host.printed(), vec!["a b\n"]);

        let (engine, _host) = engine_with_host(false);
        let script = engine.compile_script("main.is", "print a b\n").unwrap();
        let err = engine.run_script(&script).unwrap_err();
        assert!(err.message.contains("$print is not defined"));
    }

    #[test]
    fn test_instantiate_reports_unresolved_imports() {
        let (engine, _host) = engine_with_host(false);

        let unit = engine
            .compile_module("root.is", "use missing.is\nsend hi\n")
            .unwrap();
        assert_eq!(unit.imports, vec!["missing.is"]);

        let empty = ModuleCache::new();
        let err = engine.instantiate_module(unit.handle, &empty).unwrap_err();
        assert!(err.message.contains("unresolved import `missing.is`"));
    }

    #[test]
    fn test_module_graph_evaluates_children_first_and_once() {
        let (engine, host) = engine_with_host(false);
        let mut cache = ModuleCache::new();

        let leaf = engine.compile_module("leaf.is", "send leaf\n").unwrap();
        cache.insert("leaf.is", leaf.handle);
        let root = engine
            .compile_module("root.is", "use leaf.is\nuse leaf.is\nsend root\n")
            .unwrap();
        cache.insert("root.is", root.handle);

        engine.instantiate_module(root.handle, &cache).unwrap();
        engine.evaluate_module(root.handle).unwrap();

        assert_eq!(host.messages(), vec!["leaf", "root"]);
    }

    #[test]
    fn test_evaluate_requires_instantiation() {
        let (engine, _host) = engine_with_host(false);
        let unit = engine.compile_module("root.is", "send hi\n").unwrap();

        let err = engine.evaluate_module(unit.handle).unwrap_err();
        assert!(err.message.contains("not instantiated"));
    }

    #[test]
    fn test_termination_is_sticky() {
        let (engine, host) = engine_with_host(false);
        let script = engine.compile_script("main.is", "send hi\n").unwrap();

        engine.terminate_execution();
        let err = engine.run_script(&script).unwrap_err();

        assert_eq!(err.message, "execution terminated");
        assert!(host.messages().is_empty());
    }

    #[test]
    fn test_factory_version() {
        let factory = ScriptedEngineFactory::new();
        assert_eq!(factory.version(), SCRIPTED_ENGINE_VERSION);
    }
}
