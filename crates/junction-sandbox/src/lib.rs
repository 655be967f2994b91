#![warn(missing_docs)]

//! # junction-sandbox
//!
//! V8 codemode sandbox for the Junction MCP gateway.
//!
//! The gateway fronts a fleet of backend MCP servers and collapses their
//! combined tool surface to two operations: a *search* over aggregated
//! capabilities and an *execute* that runs an LLM-supplied JavaScript
//! fragment against a curated `mcp` capability object. This crate is the
//! execute half: it builds a fresh deno_core isolate per run, installs only
//! the permitted globals, proxies `mcp.*` calls to a [`McpDispatcher`], and
//! folds every outcome into a uniform [`ExecutionResult`] envelope.
//!
//! ## Security model
//!
//! - **V8 isolate per execution**: no state leaks between runs
//! - **No ambient authority**: no fs, net, env, timers, or dynamic eval;
//!   denied globals resolve to `undefined`
//! - **Deterministic ceilings**: wall-clock timeout, `mcp.*` call budget,
//!   code-size limit
//! - **Uniform envelope**: nothing escapes as a thrown error; timeout,
//!   budget exhaustion, user errors, and backend errors are all
//!   distinguishable on the envelope
//!
//! The sandbox is semi-trusted: it contains well-meaning generated code,
//! it is not hardened against a determined in-isolate adversary.

pub mod envelope;
pub mod executor;
pub mod matcher;
pub mod ops;
pub mod types;
pub mod validate;

pub use envelope::{ErrorDetail, ExecutionResult, ExecutionStats};
pub use executor::{ExecuteOptions, ExecutionConfig, SandboxExecutor};
pub use validate::{validate_code, validate_execute_request, validate_timeout, ValidationError};

use serde_json::Value;

use crate::types::{
    PromptInfo, PromptResult, ResourceContent, ResourceInfo, ResourceTemplateInfo, ServerInfo,
    ToolInfo, ToolResult,
};

/// Maximum accepted script size in characters.
pub const MAX_CODE_LENGTH: usize = 100_000;
/// Smallest accepted per-run timeout.
pub const MIN_TIMEOUT_MS: u64 = 1_000;
/// Largest accepted per-run timeout.
pub const MAX_TIMEOUT_MS: u64 = 300_000;
/// Timeout applied when the caller does not supply one.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
/// Default budget of billable `mcp.*` calls per execution.
pub const DEFAULT_MAX_MCP_CALLS: u32 = 100;
/// Upper clamp for `mcp.sleep`, in milliseconds.
pub const MAX_SLEEP_MS: u64 = 5_000;

/// Trait for dispatching capability operations from the sandbox to the
/// gateway's server registry.
///
/// Implementations hold the backend connections and credentials. Sandbox
/// code never sees tokens or connection state — it calls through the frozen
/// `mcp` object, whose ops route here. Every method addresses one named
/// server; the fan-out listing methods of the `mcp` API are composed on top
/// of [`list_servers`](Self::list_servers) by the op layer.
#[async_trait::async_trait]
pub trait McpDispatcher: Send + Sync {
    /// Snapshot of all registered servers, regardless of status.
    async fn list_servers(&self) -> Result<Vec<ServerInfo>, anyhow::Error>;

    /// List the tools advertised by one server.
    async fn list_tools(&self, server: &str) -> Result<Vec<ToolInfo>, anyhow::Error>;

    /// Invoke a tool on one server.
    async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        args: Value,
    ) -> Result<ToolResult, anyhow::Error>;

    /// List the concrete resources advertised by one server.
    async fn list_resources(&self, server: &str) -> Result<Vec<ResourceInfo>, anyhow::Error>;

    /// List the resource templates advertised by one server.
    async fn list_resource_templates(
        &self,
        server: &str,
    ) -> Result<Vec<ResourceTemplateInfo>, anyhow::Error>;

    /// Read a resource from one server.
    async fn read_resource(
        &self,
        server: &str,
        uri: &str,
    ) -> Result<ResourceContent, anyhow::Error>;

    /// List the prompts advertised by one server.
    async fn list_prompts(&self, server: &str) -> Result<Vec<PromptInfo>, anyhow::Error>;

    /// Render a prompt from one server.
    async fn get_prompt(
        &self,
        server: &str,
        prompt: &str,
        args: Option<Value>,
    ) -> Result<PromptResult, anyhow::Error>;
}
