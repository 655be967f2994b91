#![warn(missing_docs)]

//! # junction-client
//!
//! MCP client connections to backend servers for the Junction gateway.
//!
//! Provides [`McpBackend`] — an rmcp client session over stdio or
//! streamable HTTP that implements the registry's
//! [`BackendClient`](junction_registry::BackendClient) trait, mapping rmcp
//! model types to the gateway's capability records.

use std::borrow::Cow;
use std::collections::HashMap;

use anyhow::{Context, Result};
use junction_registry::BackendClient;
use junction_sandbox::types::{
    ContentItem, PromptArgument, PromptInfo, PromptMessage, PromptResult, ResourceContent,
    ResourceContentsItem, ResourceInfo, ResourceTemplateInfo, ServerCapabilities, ToolInfo,
    ToolResult,
};
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, GetPromptRequestParam,
    ReadResourceRequestParam, ResourceContents,
};
use rmcp::service::RunningService;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::{ConfigureCommandExt, StreamableHttpClientTransport, TokioChildProcess};
use rmcp::{RoleClient, ServiceExt};
use serde_json::Value;
use tokio::process::Command;

/// Configuration for connecting to a backend MCP server.
#[derive(Debug, Clone)]
pub enum TransportConfig {
    /// Connect via stdio to a child process.
    Stdio {
        /// Command to execute.
        command: String,
        /// Arguments to the command.
        args: Vec<String>,
    },
    /// Connect via streamable HTTP.
    Http {
        /// URL of the MCP server endpoint.
        url: String,
        /// Optional HTTP headers (e.g. Authorization).
        headers: HashMap<String, String>,
    },
}

/// A client connection to a single backend MCP server.
pub struct McpBackend {
    name: String,
    service: RunningService<RoleClient, ()>,
}

impl McpBackend {
    /// Connect to a backend over stdio (child process).
    pub async fn connect_stdio(
        name: impl Into<String>,
        command: &str,
        args: &[String],
    ) -> Result<Self> {
        let name = name.into();
        tracing::info!(
            server = %name,
            command = %command,
            args = ?args,
            "connecting to backend MCP server (stdio)"
        );

        let transport = TokioChildProcess::new(Command::new(command).configure(|cmd| {
            for arg in args {
                cmd.arg(arg);
            }
        }))
        .with_context(|| {
            format!("failed to spawn stdio transport for server '{name}' (command: {command})")
        })?;

        let service: RunningService<RoleClient, ()> = ()
            .serve(transport)
            .await
            .with_context(|| format!("MCP handshake failed for server '{name}'"))?;

        tracing::info!(server = %name, "connected to backend MCP server (stdio)");
        Ok(Self { name, service })
    }

    /// Connect to a backend over streamable HTTP.
    pub async fn connect_http(
        name: impl Into<String>,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<Self> {
        let name = name.into();

        if url.starts_with("http://") {
            tracing::warn!(
                server = %name,
                url = %url,
                "connecting over plain HTTP, consider HTTPS for production"
            );
        }
        tracing::info!(server = %name, url = %url, "connecting to backend MCP server (HTTP)");

        let mut config = StreamableHttpClientTransportConfig::with_uri(url);
        if !headers.is_empty() {
            let mut header_map = HashMap::new();
            for (key, value) in headers {
                if key.eq_ignore_ascii_case("authorization") {
                    tracing::debug!(server = %name, header = %key, "setting auth header (redacted)");
                } else {
                    tracing::debug!(server = %name, header = %key, value = %value, "setting header");
                }
                let header_name = http::HeaderName::from_bytes(key.as_bytes())
                    .with_context(|| format!("invalid header name: {key}"))?;
                let header_value = http::HeaderValue::from_str(value)
                    .with_context(|| format!("invalid header value for {key}"))?;
                header_map.insert(header_name, header_value);
            }
            config = config.custom_headers(header_map);
        }

        let transport = StreamableHttpClientTransport::from_config(config);
        let service: RunningService<RoleClient, ()> = ()
            .serve(transport)
            .await
            .with_context(|| format!("MCP handshake failed for server '{name}' (HTTP)"))?;

        tracing::info!(server = %name, "connected to backend MCP server (HTTP)");
        Ok(Self { name, service })
    }

    /// Connect using a [`TransportConfig`].
    pub async fn connect(name: impl Into<String>, config: &TransportConfig) -> Result<Self> {
        match config {
            TransportConfig::Stdio { command, args } => {
                Self::connect_stdio(name, command, args).await
            }
            TransportConfig::Http { url, headers } => Self::connect_http(name, url, headers).await,
        }
    }

    /// The registered server name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Discover which capability kinds the backend actually serves, by
    /// probing each listing and degrading gracefully on refusal.
    pub async fn probe_capabilities(&self) -> ServerCapabilities {
        let tools = self.service.list_all_tools().await.is_ok();
        let resources = self.service.list_all_resources().await.is_ok();
        let prompts = self.service.list_all_prompts().await.is_ok();
        ServerCapabilities {
            tools,
            resources,
            prompts,
        }
    }

    /// Gracefully disconnect from the backend.
    pub async fn disconnect(self) -> Result<()> {
        tracing::info!(server = %self.name, "disconnecting from backend MCP server");
        let _ = self.service.cancel().await;
        Ok(())
    }
}

#[async_trait::async_trait]
impl BackendClient for McpBackend {
    async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        let tools = self
            .service
            .list_all_tools()
            .await
            .with_context(|| format!("failed to list tools for server '{}'", self.name))?;

        Ok(tools
            .into_iter()
            .map(|t| ToolInfo {
                server: self.name.clone(),
                name: t.name.to_string(),
                description: t.description.map(|d: Cow<'_, str>| d.to_string()),
                input_schema: serde_json::to_value(&*t.input_schema)
                    .unwrap_or(Value::Object(Default::default())),
            })
            .collect())
    }

    async fn call_tool(&self, tool: &str, args: Value) -> Result<ToolResult> {
        let arguments = args.as_object().cloned().or_else(|| {
            if args.is_null() {
                Some(serde_json::Map::new())
            } else {
                None
            }
        });

        let result: CallToolResult = self
            .service
            .call_tool(CallToolRequestParam {
                name: Cow::Owned(tool.to_string()),
                arguments,
            })
            .await
            .with_context(|| {
                format!("tool call failed: server='{}', tool='{tool}'", self.name)
            })?;

        Ok(ToolResult {
            content: result.content.iter().map(content_to_item).collect(),
            is_error: result.is_error,
        })
    }

    async fn list_resources(&self) -> Result<Vec<ResourceInfo>> {
        let resources = self
            .service
            .list_all_resources()
            .await
            .with_context(|| format!("failed to list resources for server '{}'", self.name))?;

        Ok(resources
            .into_iter()
            .map(|r| ResourceInfo {
                server: self.name.clone(),
                uri: r.raw.uri.clone(),
                name: r.raw.name.clone(),
                description: r.raw.description.clone(),
                mime_type: r.raw.mime_type.clone(),
            })
            .collect())
    }

    async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplateInfo>> {
        let templates = self
            .service
            .list_all_resource_templates()
            .await
            .with_context(|| {
                format!(
                    "failed to list resource templates for server '{}'",
                    self.name
                )
            })?;

        Ok(templates
            .into_iter()
            .map(|t| ResourceTemplateInfo {
                server: self.name.clone(),
                uri_template: t.raw.uri_template.clone(),
                name: t.raw.name.clone(),
                description: t.raw.description.clone(),
                mime_type: t.raw.mime_type.clone(),
            })
            .collect())
    }

    async fn read_resource(&self, uri: &str) -> Result<ResourceContent> {
        let result = self
            .service
            .read_resource(ReadResourceRequestParam {
                uri: uri.to_string(),
            })
            .await
            .with_context(|| {
                format!("resource read failed: server='{}', uri='{uri}'", self.name)
            })?;

        Ok(ResourceContent {
            contents: result
                .contents
                .into_iter()
                .map(|c| match c {
                    ResourceContents::TextResourceContents {
                        uri,
                        mime_type,
                        text,
                        ..
                    } => ResourceContentsItem {
                        uri,
                        mime_type,
                        text: Some(text),
                        blob: None,
                    },
                    ResourceContents::BlobResourceContents {
                        uri,
                        mime_type,
                        blob,
                        ..
                    } => ResourceContentsItem {
                        uri,
                        mime_type,
                        text: None,
                        blob: Some(blob),
                    },
                })
                .collect(),
        })
    }

    async fn list_prompts(&self) -> Result<Vec<PromptInfo>> {
        let prompts = self
            .service
            .list_all_prompts()
            .await
            .with_context(|| format!("failed to list prompts for server '{}'", self.name))?;

        Ok(prompts
            .into_iter()
            .map(|p| PromptInfo {
                server: self.name.clone(),
                name: p.name.to_string(),
                description: p.description.map(|d| d.to_string()),
                arguments: p.arguments.map(|args| {
                    args.into_iter()
                        .map(|a| PromptArgument {
                            name: a.name.to_string(),
                            description: a.description.map(|d| d.to_string()),
                            required: a.required,
                        })
                        .collect()
                }),
            })
            .collect())
    }

    async fn get_prompt(&self, prompt: &str, args: Option<Value>) -> Result<PromptResult> {
        let arguments = args.and_then(|a| a.as_object().cloned());

        let result = self
            .service
            .get_prompt(GetPromptRequestParam {
                name: prompt.to_string(),
                arguments,
            })
            .await
            .with_context(|| {
                format!("prompt render failed: server='{}', prompt='{prompt}'", self.name)
            })?;

        Ok(PromptResult {
            description: result.description.map(|d| d.to_string()),
            messages: result
                .messages
                .into_iter()
                .map(|m| PromptMessage {
                    role: serde_json::to_value(&m.role)
                        .ok()
                        .and_then(|v| v.as_str().map(str::to_string))
                        .unwrap_or_else(|| "user".to_string()),
                    content: serde_json::to_value(&m.content).unwrap_or(Value::Null),
                })
                .collect(),
        })
    }
}

/// Convert one rmcp content item into the gateway's wire shape.
fn content_to_item(content: &Content) -> ContentItem {
    match &content.raw {
        rmcp::model::RawContent::Text(t) => ContentItem {
            kind: "text".into(),
            text: Some(t.text.clone()),
            data: None,
            mime_type: None,
        },
        rmcp::model::RawContent::Image(img) => ContentItem {
            kind: "image".into(),
            text: None,
            data: Some(img.data.clone()),
            mime_type: Some(img.mime_type.clone()),
        },
        rmcp::model::RawContent::Audio(a) => ContentItem {
            kind: "audio".into(),
            text: None,
            data: Some(a.data.clone()),
            mime_type: Some(a.mime_type.clone()),
        },
        rmcp::model::RawContent::Resource(r) => ContentItem {
            kind: "resource".into(),
            text: serde_json::to_value(&r.resource)
                .ok()
                .map(|v| v.to_string()),
            data: None,
            mime_type: None,
        },
        _ => ContentItem {
            kind: "unknown".into(),
            text: None,
            data: None,
            mime_type: None,
        },
    }
}
