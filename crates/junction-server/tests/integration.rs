//! Full-stack integration tests for the Junction codemode gateway surface.
//!
//! These exercise the complete pipeline:
//! CodemodeServer -> SandboxExecutor -> V8 -> ops -> McpDispatcher

use std::sync::{Arc, Mutex};

use junction_sandbox::types::{
    ContentItem, PromptInfo, PromptResult, ResourceContent, ResourceInfo, ResourceTemplateInfo,
    ServerCapabilities, ServerInfo, ServerStatus, ToolInfo, ToolResult,
};
use junction_sandbox::{ExecutionConfig, McpDispatcher};
use junction_server::{CodemodeServer, ExecuteInput, SearchInput, SearchType};
use rmcp::handler::server::wrapper::Parameters;
use rmcp::ServerHandler;
use serde_json::{json, Value};

/// A dispatcher that records all tool calls for test assertions.
struct RecordingDispatcher {
    calls: Mutex<Vec<(String, String, Value)>>,
}

impl RecordingDispatcher {
    fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }

    fn recorded_calls(&self) -> Vec<(String, String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl McpDispatcher for RecordingDispatcher {
    async fn list_servers(&self) -> Result<Vec<ServerInfo>, anyhow::Error> {
        Ok(vec![ServerInfo {
            name: "test-server".into(),
            status: ServerStatus::Connected,
            capabilities: ServerCapabilities {
                tools: true,
                resources: false,
                prompts: false,
            },
        }])
    }

    async fn list_tools(&self, server: &str) -> Result<Vec<ToolInfo>, anyhow::Error> {
        Ok(vec![ToolInfo {
            server: server.into(),
            name: "echo".into(),
            description: Some("Echo a message back".into()),
            input_schema: json!({"type": "object", "properties": {"message": {"type": "string"}}}),
        }])
    }

    async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        args: Value,
    ) -> Result<ToolResult, anyhow::Error> {
        self.calls
            .lock()
            .unwrap()
            .push((server.into(), tool.into(), args.clone()));
        let message = args["message"].as_str().unwrap_or_default();
        Ok(ToolResult {
            content: vec![ContentItem::text(format!("Echo: {message}"))],
            is_error: Some(false),
        })
    }

    async fn list_resources(&self, _: &str) -> Result<Vec<ResourceInfo>, anyhow::Error> {
        Ok(vec![])
    }

    async fn list_resource_templates(
        &self,
        _: &str,
    ) -> Result<Vec<ResourceTemplateInfo>, anyhow::Error> {
        Ok(vec![])
    }

    async fn read_resource(&self, _: &str, _: &str) -> Result<ResourceContent, anyhow::Error> {
        anyhow::bail!("no resources on this fleet")
    }

    async fn list_prompts(&self, _: &str) -> Result<Vec<PromptInfo>, anyhow::Error> {
        Ok(vec![])
    }

    async fn get_prompt(
        &self,
        _: &str,
        _: &str,
        _: Option<Value>,
    ) -> Result<PromptResult, anyhow::Error> {
        anyhow::bail!("no prompts on this fleet")
    }
}

fn server_with(dispatcher: Arc<RecordingDispatcher>) -> CodemodeServer {
    CodemodeServer::new(ExecutionConfig::default(), dispatcher)
}

fn search_input(query: &str, search_type: SearchType) -> SearchInput {
    SearchInput {
        query: query.into(),
        search_type,
        server: None,
        include_schemas: false,
    }
}

#[tokio::test]
async fn full_stack_search_then_execute() {
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let server = server_with(dispatcher.clone());

    // Step 1: discover the echo tool
    let search_json = server
        .search(Parameters(search_input("echo", SearchType::Tools)))
        .await
        .expect("search should succeed");
    let parsed: Value = serde_json::from_str(&search_json).unwrap();
    assert_eq!(parsed["tools"][0]["name"], "echo");
    assert_eq!(parsed["tools"][0]["server"], "test-server");

    // Step 2: call it from a fragment
    let exec_json = server
        .execute(Parameters(ExecuteInput {
            code: r#"
                const r = await mcp.callTool("test-server", "echo", { message: "hi" });
                return r.content[0].text;
            "#
            .into(),
            timeout: None,
        }))
        .await
        .expect("execute should succeed");
    let envelope: Value = serde_json::from_str(&exec_json).unwrap();
    assert_eq!(envelope["success"], true);
    assert_eq!(envelope["result"], "Echo: hi");
    assert_eq!(envelope["stats"]["mcpCalls"], 1);

    let calls = dispatcher.recorded_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "test-server");
    assert_eq!(calls[0].1, "echo");
    assert_eq!(calls[0].2["message"], "hi");
}

#[tokio::test]
async fn search_omits_unrequested_kinds() {
    let server = server_with(Arc::new(RecordingDispatcher::new()));
    let json = server
        .search(Parameters(search_input("echo", SearchType::Tools)))
        .await
        .unwrap();
    let parsed: Value = serde_json::from_str(&json).unwrap();
    assert!(parsed.get("tools").is_some());
    assert!(parsed.get("resources").is_none());
    assert!(parsed.get("servers").is_none());
}

#[tokio::test]
async fn search_include_schemas_flag() {
    let server = server_with(Arc::new(RecordingDispatcher::new()));
    let mut input = search_input("echo", SearchType::Tools);
    input.include_schemas = true;
    let json = server.search(Parameters(input)).await.unwrap();
    let parsed: Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed["tools"][0]["inputSchema"]["type"], "object");
}

#[tokio::test]
async fn execute_validation_failure_is_an_envelope_not_an_error() {
    let server = server_with(Arc::new(RecordingDispatcher::new()));
    let json = server
        .execute(Parameters(ExecuteInput {
            code: "   ".into(),
            timeout: None,
        }))
        .await
        .expect("the tool call itself succeeds");
    let envelope: Value = serde_json::from_str(&json).unwrap();
    assert_eq!(envelope["success"], false);
    assert_eq!(envelope["error"]["name"], "ValidationError");
    assert_eq!(envelope["error"]["message"], "Code cannot be empty");
}

#[tokio::test]
async fn execute_rejects_out_of_range_timeout_via_envelope() {
    let server = server_with(Arc::new(RecordingDispatcher::new()));
    let json = server
        .execute(Parameters(ExecuteInput {
            code: "return 1;".into(),
            timeout: Some(300_001),
        }))
        .await
        .unwrap();
    let envelope: Value = serde_json::from_str(&json).unwrap();
    assert_eq!(envelope["success"], false);
    assert!(envelope["error"]["message"]
        .as_str()
        .unwrap()
        .contains("cannot exceed"));
}

#[tokio::test]
async fn get_info_advertises_tools_only() {
    let server = server_with(Arc::new(RecordingDispatcher::new()));
    let info = server.get_info();
    assert!(info.capabilities.tools.is_some());
    assert!(info.instructions.unwrap().contains("search()"));
}
