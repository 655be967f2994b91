//! Sandbox executor — creates fresh V8 isolates and runs codemode fragments.
//!
//! Each execution gets a brand new runtime; no state leaks between runs.
//!
//! V8 isolates are `!Send`, so all JsRuntime operations run on a dedicated
//! thread with its own single-threaded tokio runtime. The public API is
//! fully async and `Send`-safe, and it never returns `Err`: every outcome
//! is an [`ExecutionResult`] envelope.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use deno_core::{v8, JsRuntime, PollEventLoopOptions, RuntimeOptions};
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::envelope::{ErrorDetail, ExecutionResult, ExecutionStats};
use crate::ops::{mcp_ext, CallBudget, LogSink, Outcome};
use crate::validate::validate_code;
use crate::{McpDispatcher, DEFAULT_MAX_MCP_CALLS, DEFAULT_TIMEOUT_MS, MAX_CODE_LENGTH};

/// Globals that must resolve to `undefined` inside the sandbox.
///
/// Sentinel bindings are installed for each name because V8 will not let a
/// context exist without its intrinsics; shadowing with a frozen
/// `undefined` property is equivalent from the fragment's point of view.
pub const DENIED_GLOBALS: &[&str] = &[
    // host introspection & module loading
    "process",
    "require",
    "module",
    // global object references
    "global",
    "globalThis",
    "self",
    "window",
    // dynamic code generation
    "eval",
    "Function",
    // timers & microtask escape
    "setTimeout",
    "setInterval",
    "setImmediate",
    "clearTimeout",
    "clearInterval",
    "queueMicrotask",
    // network
    "fetch",
    "WebSocket",
    "XMLHttpRequest",
    // binary buffers & shared memory
    "Buffer",
    "ArrayBuffer",
    "SharedArrayBuffer",
    "Atomics",
    // bytecode loading & runtime escape
    "WebAssembly",
    "Deno",
];

/// Configuration for the sandbox executor.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Deadline applied when the caller does not supply one, in ms.
    pub timeout_ms: u64,
    /// Budget of billable `mcp.*` calls per execution.
    pub max_mcp_calls: u32,
    /// Maximum accepted script size in characters.
    pub max_code_length: usize,
    /// Maximum concurrent executions.
    pub max_concurrent: usize,
    /// V8 heap limit in bytes.
    pub max_heap_size: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_mcp_calls: DEFAULT_MAX_MCP_CALLS,
            max_code_length: MAX_CODE_LENGTH,
            max_concurrent: 8,
            max_heap_size: 64 * 1024 * 1024,
        }
    }
}

/// Per-run options for [`SandboxExecutor::execute`].
///
/// All fields are trusted caller input. Range-checking a request's timeout
/// against the accepted bounds is the request layer's job
/// ([`validate_execute_request`](crate::validate::validate_execute_request));
/// the executor applies whatever deadline it is handed.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Deadline override.
    pub timeout_ms: Option<u64>,
    /// Call-budget override (trusted caller input, not validated).
    pub max_mcp_calls: Option<u32>,
    /// Lines seeded into the log buffer ahead of any sandbox output.
    pub initial_logs: Vec<String>,
}

/// The sandbox executor. Creates a fresh V8 isolate for each execution.
///
/// `Send + Sync` safe — all V8 operations are dispatched to a dedicated
/// thread internally. A semaphore caps the number of simultaneous isolates.
pub struct SandboxExecutor {
    config: ExecutionConfig,
    semaphore: Arc<Semaphore>,
}

/// Terminal state of the isolate run, before envelope assembly.
enum RunOutcome {
    Fulfilled(Value),
    Faulted(ErrorDetail),
    DeadlineExpired,
}

/// What the dedicated isolate thread hands back.
struct RunOutput {
    outcome: RunOutcome,
    logs: Vec<String>,
    mcp_calls: u32,
}

impl SandboxExecutor {
    /// Create a new sandbox executor with the given configuration.
    pub fn new(config: ExecutionConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        Self { config, semaphore }
    }

    /// Run a codemode fragment against the capability API.
    ///
    /// The fragment is wrapped as the body of an async block with an
    /// implicit `return`-able tail, raced against the deadline, and its
    /// outcome folded into an envelope. This method never fails; callers
    /// branch on the envelope.
    pub async fn execute(
        &self,
        code: &str,
        dispatcher: Arc<dyn McpDispatcher>,
        opts: ExecuteOptions,
    ) -> ExecutionResult {
        let started = Instant::now();
        let timeout_ms = opts.timeout_ms.unwrap_or(self.config.timeout_ms);
        let max_calls = opts.max_mcp_calls.unwrap_or(self.config.max_mcp_calls);
        let initial_logs = opts.initial_logs;

        tracing::info!(code_len = code.len(), timeout_ms, "execute: starting");

        if let Err(e) = validate_code(code, self.config.max_code_length) {
            return ExecutionResult::failed(
                ErrorDetail::named("ValidationError", e.to_string()),
                initial_logs,
                stats_since(started, 0),
            );
        }

        let Ok(_permit) = self.semaphore.clone().try_acquire_owned() else {
            return ExecutionResult::failed(
                ErrorDetail::generic(format!(
                    "Too many concurrent executions (max {})",
                    self.config.max_concurrent
                )),
                initial_logs,
                stats_since(started, 0),
            );
        };

        let code = code.to_string();
        let config = self.config.clone();
        let fallback_logs = initial_logs.clone();

        // V8 isolates are !Send — run everything on a dedicated thread with
        // its own current-thread runtime.
        let (tx, rx) = tokio::sync::oneshot::channel();
        std::thread::spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    let output = RunOutput {
                        outcome: RunOutcome::Faulted(ErrorDetail::generic(format!(
                            "sandbox runtime construction failed: {e}"
                        ))),
                        logs: initial_logs,
                        mcp_calls: 0,
                    };
                    if tx.send(output).is_err() {
                        tracing::warn!("sandbox result receiver dropped");
                    }
                    return;
                }
            };
            let output = rt.block_on(run_isolate(
                &config,
                &code,
                timeout_ms,
                max_calls,
                initial_logs,
                dispatcher,
            ));
            if tx.send(output).is_err() {
                tracing::warn!("sandbox result receiver dropped before result was sent");
            }
        });

        let output = match rx.await {
            Ok(output) => output,
            Err(_) => RunOutput {
                outcome: RunOutcome::Faulted(ErrorDetail::generic("sandbox thread panicked")),
                logs: fallback_logs,
                mcp_calls: 0,
            },
        };

        let stats = stats_since(started, output.mcp_calls);
        let result = match output.outcome {
            RunOutcome::Fulfilled(value) => ExecutionResult::ok(value, output.logs, stats),
            RunOutcome::Faulted(detail) => ExecutionResult::failed(detail, output.logs, stats),
            RunOutcome::DeadlineExpired => ExecutionResult::failed(
                ErrorDetail::generic(format!("Execution timed out after {timeout_ms}ms")),
                output.logs,
                stats,
            ),
        };

        match &result.error {
            None => tracing::info!(
                duration_ms = result.stats.duration_ms,
                mcp_calls = result.stats.mcp_calls,
                "execute: complete"
            ),
            Some(e) => tracing::warn!(
                duration_ms = result.stats.duration_ms,
                error = %e.message,
                "execute: failed"
            ),
        }
        result
    }
}

fn stats_since(started: Instant, mcp_calls: u32) -> ExecutionStats {
    ExecutionStats {
        duration_ms: started.elapsed().as_millis() as u64,
        mcp_calls,
    }
}

/// State for the near-heap-limit callback.
struct HeapLimitState {
    handle: v8::IsolateHandle,
    /// AtomicBool so the callback works through a shared `&` reference,
    /// even if V8 were to invoke it re-entrantly.
    triggered: AtomicBool,
}

/// V8 near-heap-limit callback. Terminates execution and grants 1MB grace
/// for the termination to propagate cleanly.
extern "C" fn near_heap_limit_callback(
    data: *mut std::ffi::c_void,
    current_heap_limit: usize,
    _initial_heap_limit: usize,
) -> usize {
    // SAFETY: `data` points to the Box<HeapLimitState> owned by
    // `run_isolate`, which joins the watchdog and outlives every V8
    // callback window before dropping the state.
    let state = unsafe { &*(data as *const HeapLimitState) };
    if !state.triggered.swap(true, Ordering::SeqCst) {
        state.handle.terminate_execution();
    }
    current_heap_limit + 1024 * 1024
}

/// Run one fragment to a terminal state on the current thread (must be a
/// dedicated thread, not the main tokio runtime).
async fn run_isolate(
    config: &ExecutionConfig,
    code: &str,
    timeout_ms: u64,
    max_calls: u32,
    initial_logs: Vec<String>,
    dispatcher: Arc<dyn McpDispatcher>,
) -> RunOutput {
    let create_params = v8::CreateParams::default().heap_limits(0, config.max_heap_size);
    let mut runtime = JsRuntime::new(RuntimeOptions {
        extensions: vec![mcp_ext::init_ops()],
        create_params: Some(create_params),
        ..Default::default()
    });

    {
        let op_state = runtime.op_state();
        let mut st = op_state.borrow_mut();
        st.put(dispatcher);
        st.put(CallBudget {
            max_calls,
            calls_made: 0,
        });
        st.put(LogSink(initial_logs));
    }

    if let Err(e) = runtime.execute_script("[junction:bootstrap]", bootstrap_script()) {
        return drain(
            runtime,
            RunOutcome::Faulted(ErrorDetail::generic(format!(
                "sandbox bootstrap failed: {e}"
            ))),
        );
    }

    // --- Heap limit callback ---
    let heap_state = Box::new(HeapLimitState {
        handle: runtime.v8_isolate().thread_safe_handle(),
        triggered: AtomicBool::new(false),
    });
    runtime.v8_isolate().add_near_heap_limit_callback(
        near_heap_limit_callback,
        &*heap_state as *const HeapLimitState as *mut std::ffi::c_void,
    );

    // --- CPU watchdog: catches synchronous hot loops the event-loop race
    // cannot reach ---
    let watchdog_handle = runtime.v8_isolate().thread_safe_handle();
    let timed_out = Arc::new(AtomicBool::new(false));
    let watchdog_timed_out = timed_out.clone();
    let deadline = Duration::from_millis(timeout_ms);
    let (cancel_tx, cancel_rx) = std::sync::mpsc::channel::<()>();

    let watchdog = std::thread::spawn(move || {
        if let Err(std::sync::mpsc::RecvTimeoutError::Timeout) = cancel_rx.recv_timeout(deadline) {
            watchdog_timed_out.store(true, Ordering::SeqCst);
            watchdog_handle.terminate_execution();
        }
    });

    // --- Execute the wrapped fragment and drive its event loop ---
    let wrapped = wrap_fragment(code);
    let exec_error = match runtime.execute_script("[junction:execute]", wrapped) {
        Ok(_) => {
            match tokio::time::timeout(
                deadline,
                runtime.run_event_loop(PollEventLoopOptions::default()),
            )
            .await
            {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => {
                    timed_out.store(true, Ordering::SeqCst);
                    None
                }
            }
        }
        Err(e) => Some(e.to_string()),
    };

    // Cancel the watchdog and wait for it before the runtime (and with it
    // the IsolateHandle) is dropped.
    let _ = cancel_tx.send(());
    let _ = watchdog.join();

    // A recorded outcome wins the race: the fragment settled before the
    // deadline, even if the event loop was still draining a floating op.
    let recorded = runtime.op_state().borrow_mut().try_take::<Outcome>();
    if let Some(outcome) = recorded {
        let outcome = match outcome {
            Outcome::Value(json) => match serde_json::from_str::<Value>(&json) {
                Ok(value) => RunOutcome::Fulfilled(value),
                Err(e) => RunOutcome::Faulted(ErrorDetail::generic(format!(
                    "sandbox returned malformed JSON: {e}"
                ))),
            },
            Outcome::Error {
                name,
                message,
                stack,
            } => RunOutcome::Faulted(ErrorDetail {
                name,
                message,
                stack,
            }),
        };
        return drain(runtime, outcome);
    }

    if heap_state.triggered.load(Ordering::SeqCst) {
        return drain(
            runtime,
            RunOutcome::Faulted(ErrorDetail::named(
                "RangeError",
                "JavaScript heap limit exceeded",
            )),
        );
    }

    if timed_out.load(Ordering::SeqCst) {
        return drain(runtime, RunOutcome::DeadlineExpired);
    }

    if let Some(raw) = exec_error {
        return drain(runtime, RunOutcome::Faulted(classify_js_error(&raw)));
    }

    // Nothing recorded and nothing raised: the fragment is parked on a
    // promise nothing can resolve. Report the deadline outcome the caller
    // would otherwise have waited for.
    drain(runtime, RunOutcome::DeadlineExpired)
}

/// Pull logs and call accounting out of the runtime and drop it.
fn drain(mut runtime: JsRuntime, outcome: RunOutcome) -> RunOutput {
    let (logs, mcp_calls) = {
        let op_state = runtime.op_state();
        let mut st = op_state.borrow_mut();
        let logs = st
            .try_take::<LogSink>()
            .map(|sink| sink.0)
            .unwrap_or_default();
        let mcp_calls = st
            .try_borrow::<CallBudget>()
            .map(|b| b.calls_made)
            .unwrap_or(0);
        (logs, mcp_calls)
    };
    RunOutput {
        outcome,
        logs,
        mcp_calls,
    }
}

/// Embed the fragment as the body of a deferred async block.
///
/// A bare trailing expression with no explicit `return` yields `undefined`,
/// normalized to `null` before the value leaves the isolate. Cyclic or
/// otherwise unserializable fulfilment values are replaced with `null` and
/// noted in the log, without failing the run.
fn wrap_fragment(code: &str) -> String {
    format!(
        r#"
(async () => {{
    let __result;
    try {{
        __result = await (async () => {{
{code}
        }})();
    }} catch (__e) {{
        const __name = (__e && __e.name) ? String(__e.name) : "Error";
        const __message = (__e && __e.message !== undefined && __e.message !== null)
            ? String(__e.message)
            : String(__e);
        const __stack = (__e && __e.stack) ? String(__e.stack) : "";
        __junction.fail(__name, __message, __stack);
        return;
    }}
    let __json;
    try {{
        __json = JSON.stringify(__result === undefined ? null : __result);
    }} catch (__e) {{
        __junction.warn("Result is not JSON-serializable; returning null");
        __json = "null";
    }}
    __junction.finish(__json === undefined ? "null" : __json);
}})();
"#
    )
}

/// The context bootstrap: capture ops, install `mcp`, `console`, and the
/// internal outcome channel, then sever code generation and land the
/// denied-global sentinels.
fn bootstrap_script() -> String {
    let denied =
        serde_json::to_string(DENIED_GLOBALS).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"
((g, ops, denied) => {{
    const listServersOp = ops.op_mcp_list_servers;
    const listToolsOp = ops.op_mcp_list_tools;
    const listResourcesOp = ops.op_mcp_list_resources;
    const listTemplatesOp = ops.op_mcp_list_resource_templates;
    const listPromptsOp = ops.op_mcp_list_prompts;
    const callToolOp = ops.op_mcp_call_tool;
    const readResourceOp = ops.op_mcp_read_resource;
    const getPromptOp = ops.op_mcp_get_prompt;
    const sleepOp = ops.op_mcp_sleep;
    const logOp = ops.op_sandbox_log;
    const finishOp = ops.op_sandbox_set_result;
    const failOp = ops.op_sandbox_set_error;

    // console/mcp.log formatter: primitives as themselves, compound values
    // as JSON, a generic tag when serialization is impossible.
    const fmt = (v) => {{
        if (typeof v === "string") return v;
        if (v === null || typeof v !== "object") return String(v);
        try {{
            const json = JSON.stringify(v);
            return json === undefined ? String(v) : json;
        }} catch (_) {{
            return "[object Object]";
        }}
    }};
    const emit = (vals) => logOp(vals.map(fmt).join(" "));

    const pat = (p) => (p === undefined || p === null) ? "" : String(p);
    const arg = (a) => {{
        const json = JSON.stringify(a === undefined || a === null ? {{}} : a);
        return json === undefined ? "{{}}" : json;
    }};

    g.mcp = Object.freeze({{
        listServers: async () =>
            JSON.parse(await listServersOp()),
        listTools: async (serverPattern) =>
            JSON.parse(await listToolsOp(pat(serverPattern))),
        listResources: async (serverPattern) =>
            JSON.parse(await listResourcesOp(pat(serverPattern))),
        listResourceTemplates: async (serverPattern) =>
            JSON.parse(await listTemplatesOp(pat(serverPattern))),
        listPrompts: async (serverPattern) =>
            JSON.parse(await listPromptsOp(pat(serverPattern))),
        callTool: async (server, tool, args) =>
            JSON.parse(await callToolOp(String(server), String(tool), arg(args))),
        readResource: async (server, uri) =>
            JSON.parse(await readResourceOp(String(server), String(uri))),
        getPrompt: async (server, name, args) =>
            JSON.parse(await getPromptOp(
                String(server),
                String(name),
                (args === undefined || args === null) ? "" : arg(args)
            )),
        sleep: (ms) => sleepOp(typeof ms === "number" ? ms : Number(ms) || 0),
        log: (...vals) => emit(vals),
    }});

    // defineProperty rather than assignment: the embedder may ship its own
    // console and a plain write to a non-writable slot fails silently.
    Object.defineProperty(g, "console", {{
        value: Object.freeze({{
            log: (...vals) => emit(vals),
            warn: (...vals) => emit(vals),
            error: (...vals) => emit(vals),
        }}),
        configurable: true,
        writable: false,
    }});

    g.__junction = Object.freeze({{
        finish: (json) => finishOp(json),
        fail: (name, message, stack) => failOp(name, message, stack),
        warn: (msg) => logOp(String(msg)),
    }});

    // Sever code generation reachable through the prototype chain before
    // the Function sentinel lands.
    const AsyncFunction = (async function () {{}}).constructor;
    const GeneratorFunction = (function* () {{}}).constructor;
    for (const proto of [Function.prototype, AsyncFunction.prototype, GeneratorFunction.prototype]) {{
        Object.defineProperty(proto, "constructor", {{
            value: undefined, configurable: false, writable: false,
        }});
    }}

    for (const name of denied) {{
        Object.defineProperty(g, name, {{
            value: undefined, configurable: false, writable: false,
        }});
    }}
}})(globalThis, Deno.core.ops, {denied});
"#
    )
}

/// Split a raw isolate error string into an error kind and message.
///
/// deno_core reports uncaught exceptions and parse failures as
/// `"Uncaught SyntaxError: ..."`-style strings with trailing location
/// lines; the envelope wants the kind and message separated.
fn classify_js_error(raw: &str) -> ErrorDetail {
    let first = raw.lines().next().unwrap_or(raw);
    let head = first.strip_prefix("Uncaught ").unwrap_or(first);
    if let Some((name, rest)) = head.split_once(": ") {
        if name.ends_with("Error") && name.chars().all(|c| c.is_ascii_alphanumeric()) {
            let stack = (raw.lines().count() > 1).then(|| raw.to_string());
            return ErrorDetail {
                name: name.to_string(),
                message: rest.trim().to_string(),
                stack,
            };
        }
    }
    ErrorDetail::generic(head.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_extracts_syntax_errors() {
        let detail = classify_js_error("Uncaught SyntaxError: Unexpected token '}'");
        assert_eq!(detail.name, "SyntaxError");
        assert_eq!(detail.message, "Unexpected token '}'");
    }

    #[test]
    fn classify_extracts_type_errors_with_location() {
        let raw = "Uncaught TypeError: x is not a function\n    at [junction:execute]:3:5";
        let detail = classify_js_error(raw);
        assert_eq!(detail.name, "TypeError");
        assert_eq!(detail.message, "x is not a function");
        assert!(detail.stack.is_some());
    }

    #[test]
    fn classify_defaults_to_generic_error() {
        let detail = classify_js_error("something exploded");
        assert_eq!(detail.name, "Error");
        assert_eq!(detail.message, "something exploded");
    }

    #[test]
    fn wrapped_fragment_embeds_code_verbatim() {
        let wrapped = wrap_fragment("return 1 + 1;");
        assert!(wrapped.contains("return 1 + 1;"));
        assert!(wrapped.contains("async () =>"));
    }

    #[test]
    fn bootstrap_lists_every_denied_global() {
        let script = bootstrap_script();
        for name in DENIED_GLOBALS {
            assert!(script.contains(name), "missing sentinel for {name}");
        }
    }
}
