#![warn(missing_docs)]

//! # junction-search
//!
//! Capability search for the Junction codemode gateway.
//!
//! Search is a pure transformation over the registry snapshot: the query is
//! compiled to a case-insensitive regex (degrading to an escaped literal
//! when it does not parse), fanned out across the matching connected
//! servers per requested capability kind, and shaped into a grouped result.
//! Individual backend failures are suppressed — a server that cannot be
//! enumerated simply contributes nothing, and a wholly failing search still
//! returns an empty grouped result rather than an error.

use junction_sandbox::matcher::ServerMatcher;
use junction_sandbox::types::{PromptInfo, ResourceInfo, ServerInfo, ServerStatus};
use junction_sandbox::McpDispatcher;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which capability kinds a search covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
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

impl SearchKind {
    fn wants_tools(self) -> bool {
        matches!(self, SearchKind::Tools | SearchKind::All)
    }
    fn wants_resources(self) -> bool {
        matches!(self, SearchKind::Resources | SearchKind::All)
    }
    fn wants_prompts(self) -> bool {
        matches!(self, SearchKind::Prompts | SearchKind::All)
    }
    fn wants_servers(self) -> bool {
        matches!(self, SearchKind::Servers | SearchKind::All)
    }
}

/// A capability search request.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    /// Pattern matched against capability names, descriptions, and (for
    /// resources) URIs. Tried as a case-insensitive regex first, then as an
    /// escaped literal.
    pub query: String,
    /// Kinds to search.
    #[serde(rename = "type", default)]
    pub kind: SearchKind,
    /// Optional server filter, regex-then-equality like the query.
    #[serde(default)]
    pub server: Option<String>,
    /// Include tool input schemas in the result.
    #[serde(rename = "includeSchemas", default)]
    pub include_schemas: bool,
}

/// A matched tool; the input schema is present only when requested.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolMatch {
    /// Server of origin.
    pub server: String,
    /// Tool name.
    pub name: String,
    /// Tool description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema, when `includeSchemas` was set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

/// The grouped search result. Kinds excluded by the request's `type` filter
/// are absent from the serialized object, not empty.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResponse {
    /// Matched tools.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolMatch>>,
    /// Matched resources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<ResourceInfo>>,
    /// Matched prompts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<Vec<PromptInfo>>,
    /// Matched servers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub servers: Option<Vec<ServerInfo>>,
}

/// Compiled query: regex, escaped-literal regex, or nothing-matches.
struct QueryMatcher(Option<Regex>);

impl QueryMatcher {
    fn new(query: &str) -> Self {
        let direct = RegexBuilder::new(query).case_insensitive(true).build();
        let compiled = match direct {
            Ok(re) => Some(re),
            Err(_) => RegexBuilder::new(&regex::escape(query))
                .case_insensitive(true)
                .build()
                .ok(),
        };
        Self(compiled)
    }

    fn matches(&self, candidate: &str) -> bool {
        self.0.as_ref().is_some_and(|re| re.is_match(candidate))
    }

    fn matches_any<'a>(&self, candidates: impl IntoIterator<Item = Option<&'a str>>) -> bool {
        candidates
            .into_iter()
            .flatten()
            .any(|c| self.matches(c))
    }
}

/// Run a search against the live registry snapshot.
pub async fn search_capabilities(
    dispatcher: &dyn McpDispatcher,
    request: &SearchRequest,
) -> SearchResponse {
    let mut response = empty_response(request.kind);
    let query = QueryMatcher::new(&request.query);
    let server_filter = ServerMatcher::new(request.server.as_deref());

    // A failing snapshot means nothing can match; the search still
    // succeeds, with empty groups.
    let servers = match dispatcher.list_servers().await {
        Ok(servers) => servers,
        Err(e) => {
            tracing::debug!(error = %e, "server snapshot failed, returning empty search result");
            return response;
        }
    };

    if let Some(out) = response.servers.as_mut() {
        out.extend(
            servers
                .iter()
                .filter(|s| server_filter.matches(&s.name) && query.matches(&s.name))
                .cloned(),
        );
    }

    let targets: Vec<&ServerInfo> = servers
        .iter()
        .filter(|s| s.status == ServerStatus::Connected && server_filter.matches(&s.name))
        .collect();

    for server in targets {
        if let Some(out) = response.tools.as_mut() {
            match dispatcher.list_tools(&server.name).await {
                Ok(tools) => out.extend(
                    tools
                        .into_iter()
                        .filter(|t| {
                            query.matches_any([Some(t.name.as_str()), t.description.as_deref()])
                        })
                        .map(|t| ToolMatch {
                            server: t.server,
                            name: t.name,
                            description: t.description,
                            input_schema: request.include_schemas.then_some(t.input_schema),
                        }),
                ),
                Err(e) => {
                    tracing::debug!(server = %server.name, error = %e, "tool search skipped server");
                }
            }
        }

        if let Some(out) = response.resources.as_mut() {
            match dispatcher.list_resources(&server.name).await {
                Ok(resources) => out.extend(resources.into_iter().filter(|r| {
                    query.matches_any([
                        Some(r.name.as_str()),
                        r.description.as_deref(),
                        Some(r.uri.as_str()),
                    ])
                })),
                Err(e) => {
                    tracing::debug!(server = %server.name, error = %e, "resource search skipped server");
                }
            }
        }

        if let Some(out) = response.prompts.as_mut() {
            match dispatcher.list_prompts(&server.name).await {
                Ok(prompts) => out.extend(prompts.into_iter().filter(|p| {
                    query.matches_any([Some(p.name.as_str()), p.description.as_deref()])
                })),
                Err(e) => {
                    tracing::debug!(server = %server.name, error = %e, "prompt search skipped server");
                }
            }
        }
    }

    response
}

/// A response with the requested kinds present (and empty) and everything
/// else absent.
fn empty_response(kind: SearchKind) -> SearchResponse {
    SearchResponse {
        tools: kind.wants_tools().then(Vec::new),
        resources: kind.wants_resources().then(Vec::new),
        prompts: kind.wants_prompts().then(Vec::new),
        servers: kind.wants_servers().then(Vec::new),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use junction_sandbox::types::{
        PromptResult, ResourceContent, ResourceTemplateInfo, ServerCapabilities, ToolInfo,
        ToolResult,
    };
    use serde_json::json;

    struct FleetApi;

    fn server(name: &str, status: ServerStatus) -> ServerInfo {
        ServerInfo {
            name: name.into(),
            status,
            capabilities: ServerCapabilities {
                tools: true,
                resources: true,
                prompts: true,
            },
        }
    }

    #[async_trait::async_trait]
    impl McpDispatcher for FleetApi {
        async fn list_servers(&self) -> Result<Vec<ServerInfo>, anyhow::Error> {
            Ok(vec![
                server("github", ServerStatus::Connected),
                server("jira", ServerStatus::Connected),
                server("wiki", ServerStatus::Disconnected),
            ])
        }

        async fn list_tools(&self, server: &str) -> Result<Vec<ToolInfo>, anyhow::Error> {
            match server {
                "github" => Ok(vec![
                    ToolInfo {
                        server: server.into(),
                        name: "issues.list".into(),
                        description: Some("List open issues".into()),
                        input_schema: json!({"type": "object"}),
                    },
                    ToolInfo {
                        server: server.into(),
                        name: "repos.get".into(),
                        description: None,
                        input_schema: json!({"type": "object"}),
                    },
                ]),
                "jira" => Err(anyhow::anyhow!("jira enumeration failed")),
                other => anyhow::bail!("unexpected server {other}"),
            }
        }

        async fn call_tool(&self, _: &str, _: &str, _: Value) -> Result<ToolResult, anyhow::Error> {
            unreachable!("search never invokes tools")
        }

        async fn list_resources(&self, server: &str) -> Result<Vec<ResourceInfo>, anyhow::Error> {
            Ok(vec![ResourceInfo {
                server: server.into(),
                uri: format!("mcp://{server}/issues/recent"),
                name: "recent".into(),
                description: None,
                mime_type: None,
            }])
        }

        async fn list_resource_templates(
            &self,
            _: &str,
        ) -> Result<Vec<ResourceTemplateInfo>, anyhow::Error> {
            Ok(vec![])
        }

        async fn read_resource(&self, _: &str, _: &str) -> Result<ResourceContent, anyhow::Error> {
            unreachable!("search never reads resources")
        }

        async fn list_prompts(&self, server: &str) -> Result<Vec<PromptInfo>, anyhow::Error> {
            Ok(vec![PromptInfo {
                server: server.into(),
                name: "triage-issues".into(),
                description: Some("Triage the issue backlog".into()),
                arguments: None,
            }])
        }

        async fn get_prompt(
            &self,
            _: &str,
            _: &str,
            _: Option<Value>,
        ) -> Result<PromptResult, anyhow::Error> {
            unreachable!("search never renders prompts")
        }
    }

    fn request(query: &str) -> SearchRequest {
        SearchRequest {
            query: query.into(),
            kind: SearchKind::All,
            server: None,
            include_schemas: false,
        }
    }

    #[tokio::test]
    async fn all_kinds_are_grouped_and_failures_suppressed() {
        let response = search_capabilities(&FleetApi, &request("issue")).await;

        // jira's tool listing failed — suppressed, github's matches remain
        let tools = response.tools.as_ref().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "issues.list");
        assert!(tools[0].input_schema.is_none(), "schemas excluded by default");

        // resources match on uri as well as name; wiki is disconnected
        let resources = response.resources.as_ref().unwrap();
        let owners: Vec<&str> = resources.iter().map(|r| r.server.as_str()).collect();
        assert_eq!(owners, vec!["github", "jira"]);

        let prompts = response.prompts.as_ref().unwrap();
        assert_eq!(prompts.len(), 2, "prompt description matches on both");
    }

    #[tokio::test]
    async fn type_filter_omits_other_kinds_entirely() {
        let mut req = request("issue");
        req.kind = SearchKind::Tools;
        let response = search_capabilities(&FleetApi, &req).await;

        assert!(response.tools.is_some());
        assert!(response.resources.is_none());
        assert!(response.prompts.is_none());
        assert!(response.servers.is_none());

        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("resources").is_none(), "absent, not empty: {json}");
    }

    #[tokio::test]
    async fn include_schemas_carries_the_schema_through() {
        let mut req = request("issues");
        req.kind = SearchKind::Tools;
        req.include_schemas = true;
        let response = search_capabilities(&FleetApi, &req).await;
        let tools = response.tools.unwrap();
        assert_eq!(tools[0].input_schema, Some(json!({"type": "object"})));
    }

    #[tokio::test]
    async fn server_search_matches_names_across_statuses() {
        let mut req = request("^wi");
        req.kind = SearchKind::Servers;
        let response = search_capabilities(&FleetApi, &req).await;
        let servers = response.servers.unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].name, "wiki");
    }

    #[tokio::test]
    async fn server_filter_limits_the_fan_out() {
        let mut req = request(".");
        req.kind = SearchKind::Tools;
        req.server = Some("^github$".into());
        let response = search_capabilities(&FleetApi, &req).await;
        let tools = response.tools.unwrap();
        assert!(tools.iter().all(|t| t.server == "github"));
        assert_eq!(tools.len(), 2);
    }

    #[tokio::test]
    async fn invalid_regex_query_degrades_to_literal() {
        // "c++" is not a valid regex; after escaping it matches literally
        struct CppApi;

        #[async_trait::async_trait]
        impl McpDispatcher for CppApi {
            async fn list_servers(&self) -> Result<Vec<ServerInfo>, anyhow::Error> {
                Ok(vec![server("build", ServerStatus::Connected)])
            }
            async fn list_tools(&self, server: &str) -> Result<Vec<ToolInfo>, anyhow::Error> {
                Ok(vec![
                    ToolInfo {
                        server: server.into(),
                        name: "compile-c++".into(),
                        description: None,
                        input_schema: json!({}),
                    },
                    ToolInfo {
                        server: server.into(),
                        name: "compile-rust".into(),
                        description: None,
                        input_schema: json!({}),
                    },
                ])
            }
            async fn call_tool(
                &self,
                _: &str,
                _: &str,
                _: Value,
            ) -> Result<ToolResult, anyhow::Error> {
                unreachable!()
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
            async fn read_resource(
                &self,
                _: &str,
                _: &str,
            ) -> Result<ResourceContent, anyhow::Error> {
                unreachable!()
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
                unreachable!()
            }
        }

        let mut req = request("c++");
        req.kind = SearchKind::Tools;
        let response = search_capabilities(&CppApi, &req).await;
        let tools = response.tools.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "compile-c++");
    }

    #[tokio::test]
    async fn wholly_failing_search_returns_empty_groups() {
        struct DeadApi;

        #[async_trait::async_trait]
        impl McpDispatcher for DeadApi {
            async fn list_servers(&self) -> Result<Vec<ServerInfo>, anyhow::Error> {
                anyhow::bail!("registry unreachable")
            }
            async fn list_tools(&self, _: &str) -> Result<Vec<ToolInfo>, anyhow::Error> {
                unreachable!()
            }
            async fn call_tool(
                &self,
                _: &str,
                _: &str,
                _: Value,
            ) -> Result<ToolResult, anyhow::Error> {
                unreachable!()
            }
            async fn list_resources(&self, _: &str) -> Result<Vec<ResourceInfo>, anyhow::Error> {
                unreachable!()
            }
            async fn list_resource_templates(
                &self,
                _: &str,
            ) -> Result<Vec<ResourceTemplateInfo>, anyhow::Error> {
                unreachable!()
            }
            async fn read_resource(
                &self,
                _: &str,
                _: &str,
            ) -> Result<ResourceContent, anyhow::Error> {
                unreachable!()
            }
            async fn list_prompts(&self, _: &str) -> Result<Vec<PromptInfo>, anyhow::Error> {
                unreachable!()
            }
            async fn get_prompt(
                &self,
                _: &str,
                _: &str,
                _: Option<Value>,
            ) -> Result<PromptResult, anyhow::Error> {
                unreachable!()
            }
        }

        let response = search_capabilities(&DeadApi, &request("anything")).await;
        assert_eq!(response.tools.map(|v| v.len()), Some(0));
        assert_eq!(response.servers.map(|v| v.len()), Some(0));
    }

    #[test]
    fn request_deserializes_with_defaults() {
        let req: SearchRequest = serde_json::from_str(r#"{"query": "x"}"#).unwrap();
        assert_eq!(req.kind, SearchKind::All);
        assert!(req.server.is_none());
        assert!(!req.include_schemas);

        let req: SearchRequest =
            serde_json::from_str(r#"{"query": "x", "type": "prompts", "includeSchemas": true}"#)
                .unwrap();
        assert_eq!(req.kind, SearchKind::Prompts);
        assert!(req.include_schemas);
    }
}
