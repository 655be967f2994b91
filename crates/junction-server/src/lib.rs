#![warn(missing_docs)]

//! # junction-server
//!
//! MCP server for the Junction codemode gateway.
//!
//! Exposes exactly two tools to agents:
//! - `search` — query the aggregated capabilities of all connected backends
//! - `execute` — run a JavaScript fragment against the `mcp` capability API
//!
//! This collapses N backends x M tools into a fixed two-tool surface.

use std::sync::Arc;

use junction_sandbox::envelope::{ErrorDetail, ExecutionResult, ExecutionStats};
use junction_sandbox::{
    validate_execute_request, ExecuteOptions, ExecutionConfig, McpDispatcher, SandboxExecutor,
};
use junction_search::{search_capabilities, SearchKind, SearchRequest};
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{Implementation, ServerCapabilities, ServerInfo};
use rmcp::schemars::JsonSchema;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use serde::Deserialize;

/// The Junction MCP server handler.
///
/// Implements `ServerHandler` from rmcp to serve the `search` and `execute`
/// codemode tools over stdio or HTTP transport.
#[derive(Clone)]
pub struct CodemodeServer {
    executor: Arc<SandboxExecutor>,
    dispatcher: Arc<dyn McpDispatcher>,
    config: ExecutionConfig,
    tool_router: ToolRouter<Self>,
}

impl CodemodeServer {
    /// Create a new server over the given dispatcher (normally the
    /// registry).
    pub fn new(config: ExecutionConfig, dispatcher: Arc<dyn McpDispatcher>) -> Self {
        Self {
            executor: Arc::new(SandboxExecutor::new(config.clone())),
            dispatcher,
            config,
            tool_router: Self::tool_router(),
        }
    }
}

/// Capability kinds accepted by the `search` tool.
#[derive(Debug, Clone, Copy, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    /// Tools only.
    Tools,
    /// Resources only.
    Resources,
    /// Prompts only.
    Prompts,
    /// Servers only.
    Servers,
    /// Every kind.
    #[default]
    All,
}

impl From<SearchType> for SearchKind {
    fn from(t: SearchType) -> Self {
        match t {
            SearchType::Tools => SearchKind::Tools,
            SearchType::Resources => SearchKind::Resources,
            SearchType::Prompts => SearchKind::Prompts,
            SearchType::Servers => SearchKind::Servers,
            SearchType::All => SearchKind::All,
        }
    }
}

/// Input for the `search` tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchInput {
    /// Pattern matched against capability names, descriptions, and
    /// resource URIs. Interpreted as a case-insensitive regular expression,
    /// falling back to a literal match if it does not parse.
    pub query: String,

    /// Which capability kinds to search. Defaults to "all".
    #[serde(rename = "type", default)]
    pub search_type: SearchType,

    /// Restrict the search to servers matching this pattern.
    #[serde(default)]
    pub server: Option<String>,

    /// Include tool input schemas in the result. Defaults to false.
    #[serde(rename = "includeSchemas", default)]
    pub include_schemas: bool,
}

/// Input for the `execute` tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExecuteInput {
    /// JavaScript fragment executed as the body of an async function; use
    /// `return` to produce the result. The `mcp` object is the only bridge
    /// to the gateway: `mcp.listServers()`, `mcp.listTools(pattern?)`,
    /// `mcp.callTool(server, tool, args)`, `mcp.readResource(server, uri)`,
    /// `mcp.getPrompt(server, name, args)`, `mcp.sleep(ms)`, `mcp.log(...)`.
    ///
    /// Runs in a sandboxed V8 isolate with no filesystem, network, timer,
    /// or module access; `eval` and `Function` are blocked.
    pub code: String,

    /// Execution deadline in milliseconds (1000–300000, default 30000).
    #[serde(default)]
    pub timeout: Option<u64>,
}

#[tool_router(router = tool_router)]
impl CodemodeServer {
    /// Search the aggregated capabilities of all connected backends.
    #[tool(
        name = "search",
        description = "Search the capabilities of all connected MCP servers. `query` is a case-insensitive regex matched against tool/resource/prompt names, descriptions, and resource URIs. Filter with `type` (tools|resources|prompts|servers|all) and `server` (a server-name pattern). Set `includeSchemas` to true to get tool input schemas. Returns a grouped object with only the requested kinds."
    )]
    pub async fn search(
        &self,
        Parameters(input): Parameters<SearchInput>,
    ) -> Result<String, String> {
        tracing::info!(query = %input.query, "search: starting");

        let request = SearchRequest {
            query: input.query,
            kind: input.search_type.into(),
            server: input.server,
            include_schemas: input.include_schemas,
        };
        let response = search_capabilities(self.dispatcher.as_ref(), &request).await;

        let json = serde_json::to_string_pretty(&response)
            .map_err(|e| format!("result serialization failed: {e}"))?;
        tracing::info!(result_len = json.len(), "search: complete");
        Ok(json)
    }

    /// Execute a codemode fragment against the `mcp` capability API.
    #[tool(
        name = "execute",
        description = "Execute a JavaScript fragment against the gateway API. The code runs as the body of an async function in a sandboxed V8 isolate; use `return` for the result and `await` for mcp calls. The `mcp` object provides: listServers(), listTools(pattern?), listResources(pattern?), listResourceTemplates(pattern?), listPrompts(pattern?), callTool(server, tool, args), readResource(server, uri), getPrompt(server, name, args), sleep(ms), log(...values). No filesystem, network, timers, or dynamic eval. Returns a result envelope {success, result|error, logs, stats}."
    )]
    pub async fn execute(
        &self,
        Parameters(input): Parameters<ExecuteInput>,
    ) -> Result<String, String> {
        tracing::info!(code_len = input.code.len(), "execute: starting");

        // Validation failures are part of the envelope contract, not a
        // separate tool error.
        let envelope = match validate_execute_request(
            &input.code,
            input.timeout,
            self.config.max_code_length,
        ) {
            Err(e) => ExecutionResult::failed(
                ErrorDetail::named("ValidationError", e.to_string()),
                Vec::new(),
                ExecutionStats {
                    duration_ms: 0,
                    mcp_calls: 0,
                },
            ),
            Ok(()) => {
                self.executor
                    .execute(
                        &input.code,
                        self.dispatcher.clone(),
                        ExecuteOptions {
                            timeout_ms: input.timeout,
                            ..Default::default()
                        },
                    )
                    .await
            }
        };

        serde_json::to_string_pretty(&envelope)
            .map_err(|e| format!("envelope serialization failed: {e}"))
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for CodemodeServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Junction Codemode Gateway. Use search() to discover capabilities across all \
                 connected MCP servers, then execute() to run a JavaScript fragment that calls \
                 them in one round trip.\n\
                 \n\
                 execute() code is the body of an async function: use `return` for the result \
                 and `await` for every mcp.* call. Chain as many operations as needed in one \
                 fragment.\n\
                 Example: `const tools = await mcp.listTools(\"github\"); \
                 return tools.map(t => t.name);`\n\
                 \n\
                 The sandbox has no filesystem, network, timers, or dynamic eval; mcp.* is the \
                 only bridge. Billable mcp.* calls are budgeted per execution; mcp.sleep and \
                 mcp.log are free."
                    .into(),
            ),
            server_info: Implementation {
                name: "junction".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            ..Default::default()
        }
    }
}
