#![warn(missing_docs)]

//! Junction Codemode MCP Gateway
//!
//! Front a fleet of MCP servers with two tools: search and execute.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use junction_client::{McpBackend, TransportConfig};
use junction_config::GatewayConfig;
use junction_registry::ServerRegistry;
use junction_sandbox::ExecutionConfig;
use junction_server::CodemodeServer;
use rmcp::ServiceExt;
use tracing_subscriber::EnvFilter;

/// Build an ExecutionConfig from config overrides.
fn build_execution_config(overrides: &junction_config::SandboxOverrides) -> ExecutionConfig {
    let mut config = ExecutionConfig::default();
    if let Some(timeout) = overrides.timeout_ms {
        config.timeout_ms = timeout;
    }
    if let Some(calls) = overrides.max_mcp_calls {
        config.max_mcp_calls = calls;
    }
    if let Some(len) = overrides.max_code_length {
        config.max_code_length = len;
    }
    if let Some(concurrent) = overrides.max_concurrent {
        config.max_concurrent = concurrent;
    }
    if let Some(heap_mb) = overrides.max_heap_mb {
        config.max_heap_size = heap_mb * 1024 * 1024;
    }
    config
}

/// Convert a ServerConfig to a TransportConfig.
fn to_transport_config(server: &junction_config::ServerConfig) -> Result<TransportConfig> {
    match server.transport.as_str() {
        "stdio" => Ok(TransportConfig::Stdio {
            command: server.command.clone().unwrap_or_default(),
            args: server.args.clone(),
        }),
        "http" => Ok(TransportConfig::Http {
            url: server.url.clone().unwrap_or_default(),
            headers: server.headers.clone(),
        }),
        other => anyhow::bail!("unsupported transport type '{other}' (expected 'stdio' or 'http')"),
    }
}

/// Locate the config file.
///
/// Search order:
/// 1. `JUNCTION_CONFIG` environment variable
/// 2. `./junction.toml` in the current directory
/// 3. None (no config file found — not an error)
fn find_config_file() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("JUNCTION_CONFIG") {
        let p = PathBuf::from(path);
        if p.exists() {
            return Some(p);
        }
    }

    let cwd = PathBuf::from("junction.toml");
    if cwd.exists() {
        return Some(cwd);
    }

    None
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("junction {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match find_config_file() {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading config");
            GatewayConfig::from_file_with_env(&path)
                .with_context(|| format!("failed to load config from {}", path.display()))?
        }
        None => {
            tracing::info!("no config file found, starting with no backend servers");
            GatewayConfig::default()
        }
    };

    let execution_config = build_execution_config(&config.sandbox);
    let registry = Arc::new(ServerRegistry::new());

    for (name, server_config) in &config.servers {
        let transport_config = to_transport_config(server_config)?;

        let backend = McpBackend::connect(name.clone(), &transport_config)
            .await
            .with_context(|| format!("failed to connect to server '{name}'"))?;

        let capabilities = backend.probe_capabilities().await;
        tracing::info!(
            server = %name,
            tools = capabilities.tools,
            resources = capabilities.resources,
            prompts = capabilities.prompts,
            "discovered capabilities"
        );

        registry
            .add_server(name.clone(), capabilities, Arc::new(backend))
            .await
            .with_context(|| format!("failed to register server '{name}'"))?;
    }

    tracing::info!(
        servers = registry.list_servers().await.len(),
        "junction gateway starting on stdio"
    );

    let server = CodemodeServer::new(execution_config, registry.clone());
    let service = server
        .serve(rmcp::transport::io::stdio())
        .await
        .context("failed to start MCP server on stdio")?;

    service.waiting().await?;

    registry.shutdown().await;
    Ok(())
}
