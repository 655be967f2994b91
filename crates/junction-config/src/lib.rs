#![warn(missing_docs)]

//! # junction-config
//!
//! Configuration loading for the Junction codemode MCP gateway.
//!
//! Supports TOML configuration files with `${ENV_VAR}` expansion.
//!
//! ## Example
//!
//! ```toml
//! [servers.github]
//! url = "https://mcp.github.com/mcp"
//! transport = "http"
//! headers = { Authorization = "Bearer ${GITHUB_TOKEN}" }
//!
//! [servers.files]
//! command = "files-mcp"
//! args = ["--root", "."]
//! transport = "stdio"
//!
//! [sandbox]
//! timeout_ms = 30000
//! max_mcp_calls = 100
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Errors from config parsing.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Invalid configuration value.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    /// Backend MCP server configurations, keyed by server name.
    #[serde(default)]
    pub servers: HashMap<String, ServerConfig>,

    /// Sandbox execution settings.
    #[serde(default)]
    pub sandbox: SandboxOverrides,
}

/// Configuration for a single backend MCP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Transport type: "stdio" or "http".
    pub transport: String,

    /// Command to execute (stdio transport).
    #[serde(default)]
    pub command: Option<String>,

    /// Command arguments (stdio transport).
    #[serde(default)]
    pub args: Vec<String>,

    /// Server URL (http transport).
    #[serde(default)]
    pub url: Option<String>,

    /// HTTP headers (http transport).
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Sandbox configuration overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SandboxOverrides {
    /// Default execution deadline in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Billable `mcp.*` call budget per execution.
    #[serde(default)]
    pub max_mcp_calls: Option<u32>,

    /// Maximum accepted script size in characters.
    #[serde(default)]
    pub max_code_length: Option<usize>,

    /// Maximum concurrent executions.
    #[serde(default)]
    pub max_concurrent: Option<usize>,

    /// V8 heap limit in megabytes.
    #[serde(default)]
    pub max_heap_mb: Option<usize>,
}

impl GatewayConfig {
    /// Parse a config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: GatewayConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a config from a TOML string, expanding `${ENV_VAR}` references.
    pub fn from_toml_with_env(toml_str: &str) -> Result<Self, ConfigError> {
        Self::from_toml(&expand_env_vars(toml_str))
    }

    /// Load config from a file path, expanding environment variables.
    pub fn from_file_with_env(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_with_env(&content)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, server) in &self.servers {
            match server.transport.as_str() {
                "stdio" => {
                    if server.command.is_none() {
                        return Err(ConfigError::Invalid(format!(
                            "server '{name}': stdio transport requires 'command'"
                        )));
                    }
                }
                "http" => {
                    if server.url.is_none() {
                        return Err(ConfigError::Invalid(format!(
                            "server '{name}': http transport requires 'url'"
                        )));
                    }
                }
                other => {
                    return Err(ConfigError::Invalid(format!(
                        "server '{name}': unsupported transport '{other}', supported: stdio, http"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Expand `${ENV_VAR}` patterns using environment variables. Unknown
/// variables keep their placeholder, as does an unterminated `${`.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let Some((var, tail)) = rest[start + 2..].split_once('}') else {
            // no closing brace anywhere in the tail
            out.push_str(&rest[start..]);
            return out;
        };
        match std::env::var(var) {
            Ok(value) => out.push_str(&value),
            Err(_) => {
                out.push_str(&rest[start..start + 2 + var.len() + 1]);
            }
        }
        rest = tail;
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_stdio_server() {
        let toml = r#"
            [servers.files]
            command = "files-mcp"
            transport = "stdio"
        "#;
        let config = GatewayConfig::from_toml(toml).unwrap();
        assert_eq!(config.servers.len(), 1);
        let files = &config.servers["files"];
        assert_eq!(files.transport, "stdio");
        assert_eq!(files.command.as_deref(), Some("files-mcp"));
    }

    #[test]
    fn parses_http_server_and_sandbox_overrides() {
        let toml = r#"
            [servers.github]
            url = "https://mcp.github.com/mcp"
            transport = "http"

            [sandbox]
            timeout_ms = 10000
            max_mcp_calls = 25
            max_heap_mb = 128
        "#;
        let config = GatewayConfig::from_toml(toml).unwrap();
        assert_eq!(
            config.servers["github"].url.as_deref(),
            Some("https://mcp.github.com/mcp")
        );
        assert_eq!(config.sandbox.timeout_ms, Some(10_000));
        assert_eq!(config.sandbox.max_mcp_calls, Some(25));
        assert_eq!(config.sandbox.max_heap_mb, Some(128));
    }

    #[test]
    fn expands_environment_variables() {
        std::env::set_var("JUNCTION_TEST_TOKEN", "secret123");
        let toml = r#"
            [servers.github]
            url = "https://mcp.github.com/mcp"
            transport = "http"
            headers = { Authorization = "Bearer ${JUNCTION_TEST_TOKEN}" }
        "#;
        let config = GatewayConfig::from_toml_with_env(toml).unwrap();
        assert_eq!(
            config.servers["github"].headers["Authorization"],
            "Bearer secret123"
        );
        std::env::remove_var("JUNCTION_TEST_TOKEN");
    }

    #[test]
    fn unknown_env_var_keeps_placeholder() {
        let toml = r#"
            [servers.x]
            url = "${JUNCTION_DEFINITELY_UNSET}"
            transport = "http"
        "#;
        let config = GatewayConfig::from_toml_with_env(toml).unwrap();
        assert_eq!(
            config.servers["x"].url.as_deref(),
            Some("${JUNCTION_DEFINITELY_UNSET}")
        );
    }

    #[test]
    fn unterminated_placeholder_is_left_alone() {
        std::env::set_var("JUNCTION_TEST_PREFIX", "ok");
        assert_eq!(
            expand_env_vars("${JUNCTION_TEST_PREFIX}/${broken"),
            "ok/${broken"
        );
        std::env::remove_var("JUNCTION_TEST_PREFIX");
    }

    #[test]
    fn rejects_unknown_transport() {
        let toml = r#"
            [servers.test]
            command = "test"
            transport = "grpc"
        "#;
        let err = GatewayConfig::from_toml(toml).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("grpc"), "names the transport: {msg}");
        assert!(msg.contains("stdio"), "lists supported transports: {msg}");
    }

    #[test]
    fn rejects_stdio_without_command() {
        let toml = r#"
            [servers.test]
            transport = "stdio"
        "#;
        let err = GatewayConfig::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("command"));
    }

    #[test]
    fn rejects_http_without_url() {
        let toml = r#"
            [servers.test]
            transport = "http"
        "#;
        let err = GatewayConfig::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("url"));
    }

    #[test]
    fn empty_config_is_valid() {
        let config = GatewayConfig::from_toml("").unwrap();
        assert!(config.servers.is_empty());
        assert!(config.sandbox.timeout_ms.is_none());
    }
}
