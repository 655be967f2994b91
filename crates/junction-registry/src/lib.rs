#![warn(missing_docs)]

//! # junction-registry
//!
//! Backend server registry for the Junction codemode gateway.
//!
//! The registry is the gateway's per-client session state: a set of named
//! backend connections in registration order, plus the auxiliary buffers
//! that make the fleet observable — drainable notification/log queues and
//! the parked sampling/elicitation requests backends initiate.
//!
//! The sandbox reaches the registry through the [`McpDispatcher`] trait; it
//! may observe connections but never create or destroy them. Lifecycle
//! (connect, reconnect, credential handling) belongs to the layer that
//! calls [`ServerRegistry::add_server`] and
//! [`ServerRegistry::set_status`].

pub mod buffers;
pub mod pending;

pub use buffers::{BackendLogEntry, BackendNotification};
pub use pending::{PendingKind, PendingOutcome, PendingRequest, PendingRequests};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use junction_error::RegistryError;
use junction_sandbox::types::{
    PromptInfo, PromptResult, ResourceContent, ResourceInfo, ResourceTemplateInfo,
    ServerCapabilities, ServerInfo, ServerStatus, ToolInfo, ToolResult,
};
use junction_sandbox::McpDispatcher;
use serde_json::Value;
use tokio::sync::{oneshot, RwLock};

/// A client connection to one backend MCP server.
///
/// Implementations own the transport and credentials. Returned capability
/// records do not need their `server` tag filled in — the registry
/// overwrites it with the registered name.
#[async_trait::async_trait]
pub trait BackendClient: Send + Sync {
    /// List the tools this backend advertises.
    async fn list_tools(&self) -> Result<Vec<ToolInfo>, anyhow::Error>;

    /// Invoke a tool.
    async fn call_tool(&self, tool: &str, args: Value) -> Result<ToolResult, anyhow::Error>;

    /// List concrete resources.
    async fn list_resources(&self) -> Result<Vec<ResourceInfo>, anyhow::Error>;

    /// List resource templates.
    async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplateInfo>, anyhow::Error>;

    /// Read a resource by URI.
    async fn read_resource(&self, uri: &str) -> Result<ResourceContent, anyhow::Error>;

    /// List prompts.
    async fn list_prompts(&self) -> Result<Vec<PromptInfo>, anyhow::Error>;

    /// Render a prompt.
    async fn get_prompt(
        &self,
        prompt: &str,
        args: Option<Value>,
    ) -> Result<PromptResult, anyhow::Error>;
}

struct Connection {
    status: ServerStatus,
    capabilities: ServerCapabilities,
    client: Arc<dyn BackendClient>,
}

#[derive(Default)]
struct Inner {
    /// Registration order; aggregated listings iterate in this order.
    order: Vec<String>,
    connections: HashMap<String, Connection>,
}

/// The gateway's collection of backend connections.
pub struct ServerRegistry {
    inner: RwLock<Inner>,
    events: buffers::EventBuffers,
    pending: Arc<PendingRequests>,
    shutting_down: AtomicBool,
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerRegistry {
    /// An empty registry with the default pending-request timeout.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            events: buffers::EventBuffers::default(),
            pending: Arc::new(PendingRequests::default()),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// An empty registry with a non-default pending-request timeout.
    pub fn with_pending_timeout(timeout: Duration) -> Self {
        Self {
            pending: Arc::new(PendingRequests::with_timeout(timeout)),
            ..Self::new()
        }
    }

    // --- lifecycle (driven from outside the sandbox) ---

    /// Register a backend under `name`, initially connected. Re-adding an
    /// existing name replaces its client in place, keeping its position.
    pub async fn add_server(
        &self,
        name: impl Into<String>,
        capabilities: ServerCapabilities,
        client: Arc<dyn BackendClient>,
    ) -> Result<(), RegistryError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(RegistryError::ShuttingDown);
        }
        let name = name.into();
        let mut inner = self.inner.write().await;
        if !inner.connections.contains_key(&name) {
            inner.order.push(name.clone());
        }
        tracing::info!(server = %name, "backend registered");
        inner.connections.insert(
            name,
            Connection {
                status: ServerStatus::Connected,
                capabilities,
                client,
            },
        );
        Ok(())
    }

    /// Remove a backend. Its pending sampling/elicitation requests are
    /// rejected.
    pub async fn remove_server(&self, name: &str) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().await;
        if inner.connections.remove(name).is_none() {
            let known: Vec<&str> = inner.order.iter().map(String::as_str).collect();
            return Err(RegistryError::server_not_found(name, &known));
        }
        inner.order.retain(|n| n != name);
        drop(inner);

        self.pending
            .reject_server(name, &format!("Server '{name}' disconnected"));
        tracing::info!(server = %name, "backend removed");
        Ok(())
    }

    /// Update a backend's connection status.
    pub async fn set_status(&self, name: &str, status: ServerStatus) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().await;
        let known: Vec<String> = inner.order.clone();
        match inner.connections.get_mut(name) {
            Some(conn) => {
                conn.status = status;
                Ok(())
            }
            None => {
                let known: Vec<&str> = known.iter().map(String::as_str).collect();
                Err(RegistryError::server_not_found(name, &known))
            }
        }
    }

    /// Drop every connection and reject all pending requests.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let mut inner = self.inner.write().await;
        inner.connections.clear();
        inner.order.clear();
        drop(inner);
        self.pending.reject_all("Registry shutting down");
        tracing::info!("registry shut down");
    }

    // --- observation ---

    /// Whether a backend is registered under `name`, in any status.
    pub async fn has_server(&self, name: &str) -> bool {
        self.inner.read().await.connections.contains_key(name)
    }

    /// Snapshot of all registered servers, in registration order.
    pub async fn list_servers(&self) -> Vec<ServerInfo> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|name| {
                inner.connections.get(name).map(|c| ServerInfo {
                    name: name.clone(),
                    status: c.status,
                    capabilities: c.capabilities,
                })
            })
            .collect()
    }

    /// Resolve a connected backend or explain why it cannot be addressed.
    async fn connected_client(&self, name: &str) -> Result<Arc<dyn BackendClient>, RegistryError> {
        let inner = self.inner.read().await;
        match inner.connections.get(name) {
            Some(conn) if conn.status == ServerStatus::Connected => Ok(conn.client.clone()),
            Some(conn) => Err(RegistryError::ServerUnavailable {
                name: name.to_string(),
                status: conn.status.to_string(),
            }),
            None => {
                let known: Vec<&str> = inner.order.iter().map(String::as_str).collect();
                Err(RegistryError::server_not_found(name, &known))
            }
        }
    }

    /// Connected backends in registration order.
    async fn connected(&self) -> Vec<(String, Arc<dyn BackendClient>)> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|name| match inner.connections.get(name) {
                Some(c) if c.status == ServerStatus::Connected => {
                    Some((name.clone(), c.client.clone()))
                }
                _ => None,
            })
            .collect()
    }

    // --- enumeration & dispatch ---

    /// List tools: one server, or all connected servers when `server` is
    /// `None` (per-server failures skipped).
    pub async fn list_tools(&self, server: Option<&str>) -> Result<Vec<ToolInfo>, RegistryError> {
        match server {
            Some(name) => {
                let client = self.connected_client(name).await?;
                let mut tools = client.list_tools().await.map_err(|e| upstream(name, e))?;
                for t in &mut tools {
                    t.server = name.to_string();
                }
                Ok(tools)
            }
            None => {
                let mut all = Vec::new();
                for (name, client) in self.connected().await {
                    match client.list_tools().await {
                        Ok(mut tools) => {
                            for t in &mut tools {
                                t.server = name.clone();
                            }
                            all.extend(tools);
                        }
                        Err(e) => {
                            tracing::debug!(server = %name, error = %e, "tool listing failed, skipping server");
                        }
                    }
                }
                Ok(all)
            }
        }
    }

    /// List resources; same fan-out contract as [`list_tools`](Self::list_tools).
    pub async fn list_resources(
        &self,
        server: Option<&str>,
    ) -> Result<Vec<ResourceInfo>, RegistryError> {
        match server {
            Some(name) => {
                let client = self.connected_client(name).await?;
                let mut items = client
                    .list_resources()
                    .await
                    .map_err(|e| upstream(name, e))?;
                for r in &mut items {
                    r.server = name.to_string();
                }
                Ok(items)
            }
            None => {
                let mut all = Vec::new();
                for (name, client) in self.connected().await {
                    match client.list_resources().await {
                        Ok(mut items) => {
                            for r in &mut items {
                                r.server = name.clone();
                            }
                            all.extend(items);
                        }
                        Err(e) => {
                            tracing::debug!(server = %name, error = %e, "resource listing failed, skipping server");
                        }
                    }
                }
                Ok(all)
            }
        }
    }

    /// List resource templates; same fan-out contract as
    /// [`list_tools`](Self::list_tools).
    pub async fn list_resource_templates(
        &self,
        server: Option<&str>,
    ) -> Result<Vec<ResourceTemplateInfo>, RegistryError> {
        match server {
            Some(name) => {
                let client = self.connected_client(name).await?;
                let mut items = client
                    .list_resource_templates()
                    .await
                    .map_err(|e| upstream(name, e))?;
                for t in &mut items {
                    t.server = name.to_string();
                }
                Ok(items)
            }
            None => {
                let mut all = Vec::new();
                for (name, client) in self.connected().await {
                    match client.list_resource_templates().await {
                        Ok(mut items) => {
                            for t in &mut items {
                                t.server = name.clone();
                            }
                            all.extend(items);
                        }
                        Err(e) => {
                            tracing::debug!(server = %name, error = %e, "template listing failed, skipping server");
                        }
                    }
                }
                Ok(all)
            }
        }
    }

    /// List prompts; same fan-out contract as [`list_tools`](Self::list_tools).
    pub async fn list_prompts(
        &self,
        server: Option<&str>,
    ) -> Result<Vec<PromptInfo>, RegistryError> {
        match server {
            Some(name) => {
                let client = self.connected_client(name).await?;
                let mut items = client.list_prompts().await.map_err(|e| upstream(name, e))?;
                for p in &mut items {
                    p.server = name.to_string();
                }
                Ok(items)
            }
            None => {
                let mut all = Vec::new();
                for (name, client) in self.connected().await {
                    match client.list_prompts().await {
                        Ok(mut items) => {
                            for p in &mut items {
                                p.server = name.clone();
                            }
                            all.extend(items);
                        }
                        Err(e) => {
                            tracing::debug!(server = %name, error = %e, "prompt listing failed, skipping server");
                        }
                    }
                }
                Ok(all)
            }
        }
    }

    /// Invoke a tool on a named backend. Unknown or non-connected servers
    /// are rejected before the backend is contacted.
    pub async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        args: Value,
    ) -> Result<ToolResult, RegistryError> {
        let client = self.connected_client(server).await?;
        tracing::debug!(server = %server, tool = %tool, "dispatching tool call");
        client
            .call_tool(tool, args)
            .await
            .map_err(|e| upstream(server, e))
    }

    /// Read a resource from a named backend.
    pub async fn read_resource(
        &self,
        server: &str,
        uri: &str,
    ) -> Result<ResourceContent, RegistryError> {
        let client = self.connected_client(server).await?;
        tracing::debug!(server = %server, uri = %uri, "dispatching resource read");
        client.read_resource(uri).await.map_err(|e| upstream(server, e))
    }

    /// Render a prompt from a named backend.
    pub async fn get_prompt(
        &self,
        server: &str,
        prompt: &str,
        args: Option<Value>,
    ) -> Result<PromptResult, RegistryError> {
        let client = self.connected_client(server).await?;
        client
            .get_prompt(prompt, args)
            .await
            .map_err(|e| upstream(server, e))
    }

    // --- out-of-band buffers ---

    /// Park a notification received from a backend.
    pub fn record_notification(&self, server: &str, method: &str, params: Option<Value>) {
        self.events.record_notification(BackendNotification {
            server: server.to_string(),
            method: method.to_string(),
            params,
        });
    }

    /// Park a log message received from a backend.
    pub fn record_log(&self, server: &str, level: &str, message: &str) {
        self.events.record_log(BackendLogEntry {
            server: server.to_string(),
            level: level.to_string(),
            message: message.to_string(),
        });
    }

    /// Return all parked notifications and clear the buffer.
    pub fn get_notifications(&self) -> Vec<BackendNotification> {
        self.events.drain_notifications()
    }

    /// Return all parked backend log messages and clear the buffer.
    pub fn get_logs(&self) -> Vec<BackendLogEntry> {
        self.events.drain_logs()
    }

    // --- pending host-side requests ---

    /// Park a sampling/elicitation request initiated by `server`. The
    /// returned receiver resolves with the operator's response or a
    /// rejection reason.
    pub fn create_pending(
        &self,
        server: &str,
        kind: PendingKind,
        params: Value,
    ) -> (String, oneshot::Receiver<PendingOutcome>) {
        self.pending.create(server, kind, params)
    }

    /// Snapshot of parked requests.
    pub fn list_pending(&self) -> Vec<PendingRequest> {
        self.pending.list()
    }

    /// Answer a parked request.
    pub fn respond_pending(&self, id: &str, value: Value) -> Result<(), RegistryError> {
        self.pending.respond(id, value)
    }

    /// Reject a parked request.
    pub fn reject_pending(&self, id: &str, reason: &str) -> Result<(), RegistryError> {
        self.pending.reject(id, reason)
    }
}

fn upstream(server: &str, e: anyhow::Error) -> RegistryError {
    RegistryError::Upstream {
        server: server.to_string(),
        message: format!("{e:#}"),
    }
}

#[async_trait::async_trait]
impl McpDispatcher for ServerRegistry {
    async fn list_servers(&self) -> Result<Vec<ServerInfo>, anyhow::Error> {
        Ok(ServerRegistry::list_servers(self).await)
    }

    async fn list_tools(&self, server: &str) -> Result<Vec<ToolInfo>, anyhow::Error> {
        Ok(ServerRegistry::list_tools(self, Some(server)).await?)
    }

    async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        args: Value,
    ) -> Result<ToolResult, anyhow::Error> {
        Ok(ServerRegistry::call_tool(self, server, tool, args).await?)
    }

    async fn list_resources(&self, server: &str) -> Result<Vec<ResourceInfo>, anyhow::Error> {
        Ok(ServerRegistry::list_resources(self, Some(server)).await?)
    }

    async fn list_resource_templates(
        &self,
        server: &str,
    ) -> Result<Vec<ResourceTemplateInfo>, anyhow::Error> {
        Ok(ServerRegistry::list_resource_templates(self, Some(server)).await?)
    }

    async fn read_resource(
        &self,
        server: &str,
        uri: &str,
    ) -> Result<ResourceContent, anyhow::Error> {
        Ok(ServerRegistry::read_resource(self, server, uri).await?)
    }

    async fn list_prompts(&self, server: &str) -> Result<Vec<PromptInfo>, anyhow::Error> {
        Ok(ServerRegistry::list_prompts(self, Some(server)).await?)
    }

    async fn get_prompt(
        &self,
        server: &str,
        prompt: &str,
        args: Option<Value>,
    ) -> Result<PromptResult, anyhow::Error> {
        Ok(ServerRegistry::get_prompt(self, server, prompt, args).await?)
    }
}
