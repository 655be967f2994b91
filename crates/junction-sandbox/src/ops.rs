//! deno_core op definitions backing the `mcp` capability object.
//!
//! The `#[op2]` macro generates additional public items (v8 function
//! pointers, metadata structs) that cannot carry doc comments, so
//! `missing_docs` is suppressed at module level — the actual functions and
//! types are documented below.
#![allow(missing_docs)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use deno_core::{op2, OpState};
use deno_error::JsErrorBox;
use serde_json::Value;

use crate::matcher::ServerMatcher;
use crate::types::ServerStatus;
use crate::{McpDispatcher, MAX_SLEEP_MS};

/// Per-execution accounting for billable `mcp.*` calls.
///
/// The count is pre-incremented before any work is dispatched, so a
/// fragment cannot start `max + k` concurrent calls before the first one
/// settles.
pub struct CallBudget {
    /// Maximum billable calls for this run.
    pub max_calls: u32,
    /// Billable calls that have begun, including the one that tripped the
    /// limit.
    pub calls_made: u32,
}

/// Ordered log buffer for one execution, seeded with caller-provided lines.
pub struct LogSink(pub Vec<String>);

/// Terminal outcome reported by the wrapper script.
pub enum Outcome {
    /// The fragment fulfilled; payload is its JSON-encoded value.
    Value(String),
    /// The fragment threw (or an `mcp.*` call rejected uncaught).
    Error {
        name: String,
        message: String,
        stack: Option<String>,
    },
}

/// Pre-increment the call budget; fails without contacting the registry
/// once the post-increment count exceeds the limit.
fn charge(op_state: &Rc<RefCell<OpState>>) -> Result<(), JsErrorBox> {
    let mut st = op_state.borrow_mut();
    let budget = st.borrow_mut::<CallBudget>();
    budget.calls_made += 1;
    if budget.calls_made > budget.max_calls {
        return Err(JsErrorBox::generic(format!(
            "Maximum mcp.* call limit exceeded ({})",
            budget.max_calls
        )));
    }
    Ok(())
}

fn dispatcher(op_state: &Rc<RefCell<OpState>>) -> Arc<dyn McpDispatcher> {
    op_state.borrow().borrow::<Arc<dyn McpDispatcher>>().clone()
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, JsErrorBox> {
    serde_json::to_string(value)
        .map_err(|e| JsErrorBox::generic(format!("result serialization failed: {e}")))
}

/// Which capability kind a fan-out listing enumerates.
#[derive(Clone, Copy, Debug)]
enum ListKind {
    Tools,
    Resources,
    ResourceTemplates,
    Prompts,
}

impl ListKind {
    fn as_str(self) -> &'static str {
        match self {
            ListKind::Tools => "tools",
            ListKind::Resources => "resources",
            ListKind::ResourceTemplates => "resource templates",
            ListKind::Prompts => "prompts",
        }
    }
}

/// Fan out one listing kind over connected servers matching `pattern`.
///
/// Per-server failures are swallowed: that server contributes nothing and
/// the aggregate still succeeds. Ordering follows the registry's server
/// order; within a server, the backend's own order.
async fn fan_out(
    op_state: Rc<RefCell<OpState>>,
    pattern: String,
    kind: ListKind,
) -> Result<String, JsErrorBox> {
    charge(&op_state)?;
    let d = dispatcher(&op_state);

    let matcher = ServerMatcher::new(if pattern.is_empty() {
        None
    } else {
        Some(pattern.as_str())
    });

    let servers = d
        .list_servers()
        .await
        .map_err(|e| JsErrorBox::generic(format!("server enumeration failed: {e}")))?;

    let mut aggregated: Vec<Value> = Vec::new();
    for server in servers {
        if server.status != ServerStatus::Connected || !matcher.matches(&server.name) {
            continue;
        }
        let listed = match kind {
            ListKind::Tools => d.list_tools(&server.name).await.and_then(|v| Ok(serde_json::to_value(v)?)),
            ListKind::Resources => d
                .list_resources(&server.name)
                .await
                .and_then(|v| Ok(serde_json::to_value(v)?)),
            ListKind::ResourceTemplates => d
                .list_resource_templates(&server.name)
                .await
                .and_then(|v| Ok(serde_json::to_value(v)?)),
            ListKind::Prompts => d
                .list_prompts(&server.name)
                .await
                .and_then(|v| Ok(serde_json::to_value(v)?)),
        };
        match listed {
            Ok(Value::Array(items)) => aggregated.extend(items),
            Ok(other) => aggregated.push(other),
            Err(e) => {
                tracing::debug!(
                    server = %server.name,
                    kind = kind.as_str(),
                    error = %e,
                    "fan-out listing failed for server, skipping"
                );
            }
        }
    }

    to_json(&Value::Array(aggregated))
}

/// Snapshot of all registered servers, regardless of status. Billable.
#[op2(async)]
#[string]
pub async fn op_mcp_list_servers(op_state: Rc<RefCell<OpState>>) -> Result<String, JsErrorBox> {
    charge(&op_state)?;
    let d = dispatcher(&op_state);
    let servers = d
        .list_servers()
        .await
        .map_err(|e| JsErrorBox::generic(format!("server enumeration failed: {e}")))?;
    to_json(&servers)
}

/// Fan-out tool listing over connected servers. Billable.
#[op2(async)]
#[string]
pub async fn op_mcp_list_tools(
    op_state: Rc<RefCell<OpState>>,
    #[string] pattern: String,
) -> Result<String, JsErrorBox> {
    fan_out(op_state, pattern, ListKind::Tools).await
}

/// Fan-out resource listing over connected servers. Billable.
#[op2(async)]
#[string]
pub async fn op_mcp_list_resources(
    op_state: Rc<RefCell<OpState>>,
    #[string] pattern: String,
) -> Result<String, JsErrorBox> {
    fan_out(op_state, pattern, ListKind::Resources).await
}

/// Fan-out resource-template listing over connected servers. Billable.
#[op2(async)]
#[string]
pub async fn op_mcp_list_resource_templates(
    op_state: Rc<RefCell<OpState>>,
    #[string] pattern: String,
) -> Result<String, JsErrorBox> {
    fan_out(op_state, pattern, ListKind::ResourceTemplates).await
}

/// Fan-out prompt listing over connected servers. Billable.
#[op2(async)]
#[string]
pub async fn op_mcp_list_prompts(
    op_state: Rc<RefCell<OpState>>,
    #[string] pattern: String,
) -> Result<String, JsErrorBox> {
    fan_out(op_state, pattern, ListKind::Prompts).await
}

/// Targeted tool invocation. Billable; backend errors propagate to the
/// fragment as a rejection it may catch.
#[op2(async)]
#[string]
pub async fn op_mcp_call_tool(
    op_state: Rc<RefCell<OpState>>,
    #[string] server: String,
    #[string] tool: String,
    #[string] args_json: String,
) -> Result<String, JsErrorBox> {
    charge(&op_state)?;
    tracing::debug!(
        server = %server,
        tool = %tool,
        args_len = args_json.len(),
        "tool call dispatched"
    );

    let args: Value = if args_json.is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_str(&args_json)
            .map_err(|e| JsErrorBox::generic(format!("invalid JSON args: {e}")))?
    };

    let d = dispatcher(&op_state);
    let result = d
        .call_tool(&server, &tool, args)
        .await
        .map_err(|e| JsErrorBox::generic(format!("{e:#}")))?;
    to_json(&result)
}

/// Targeted resource read. Billable; backend errors propagate.
#[op2(async)]
#[string]
pub async fn op_mcp_read_resource(
    op_state: Rc<RefCell<OpState>>,
    #[string] server: String,
    #[string] uri: String,
) -> Result<String, JsErrorBox> {
    charge(&op_state)?;
    tracing::debug!(server = %server, uri = %uri, "resource read dispatched");

    let d = dispatcher(&op_state);
    let result = d
        .read_resource(&server, &uri)
        .await
        .map_err(|e| JsErrorBox::generic(format!("{e:#}")))?;
    to_json(&result)
}

/// Targeted prompt rendering. Billable; backend errors propagate.
#[op2(async)]
#[string]
pub async fn op_mcp_get_prompt(
    op_state: Rc<RefCell<OpState>>,
    #[string] server: String,
    #[string] prompt: String,
    #[string] args_json: String,
) -> Result<String, JsErrorBox> {
    charge(&op_state)?;

    let args: Option<Value> = if args_json.is_empty() {
        None
    } else {
        Some(
            serde_json::from_str(&args_json)
                .map_err(|e| JsErrorBox::generic(format!("invalid JSON args: {e}")))?,
        )
    };

    let d = dispatcher(&op_state);
    let result = d
        .get_prompt(&server, &prompt, args)
        .await
        .map_err(|e| JsErrorBox::generic(format!("{e:#}")))?;
    to_json(&result)
}

/// Cooperative delay, clamped to `[0, MAX_SLEEP_MS]`. Free.
#[op2(async)]
pub async fn op_mcp_sleep(ms: f64) {
    let clamped = if ms.is_finite() {
        ms.clamp(0.0, MAX_SLEEP_MS as f64)
    } else {
        0.0
    };
    tokio::time::sleep(Duration::from_millis(clamped as u64)).await;
}

/// Append one formatted line to the run's log buffer. Free.
#[op2(fast)]
pub fn op_sandbox_log(state: &mut OpState, #[string] line: &str) {
    tracing::debug!(target: "junction::sandbox::js", "{}", line);
    state.borrow_mut::<LogSink>().0.push(line.to_string());
}

/// Record the fragment's fulfilment value (JSON-encoded).
#[op2(fast)]
pub fn op_sandbox_set_result(state: &mut OpState, #[string] json: &str) {
    state.put(Outcome::Value(json.to_string()));
}

/// Record the fragment's failure. An empty stack means none was available.
#[op2(fast)]
pub fn op_sandbox_set_error(
    state: &mut OpState,
    #[string] name: &str,
    #[string] message: &str,
    #[string] stack: &str,
) {
    state.put(Outcome::Error {
        name: name.to_string(),
        message: message.to_string(),
        stack: if stack.is_empty() {
            None
        } else {
            Some(stack.to_string())
        },
    });
}

deno_core::extension!(
    mcp_ext,
    ops = [
        op_mcp_list_servers,
        op_mcp_list_tools,
        op_mcp_list_resources,
        op_mcp_list_resource_templates,
        op_mcp_list_prompts,
        op_mcp_call_tool,
        op_mcp_read_resource,
        op_mcp_get_prompt,
        op_mcp_sleep,
        op_sandbox_log,
        op_sandbox_set_result,
        op_sandbox_set_error,
    ],
);
