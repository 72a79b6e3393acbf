//! Tool Protocol Implementations
//!
//! - **CustomToolProtocol**: Rust closures (sync and async) registered as tools.
//! - **McpClientProtocol**: HTTP client for a remote MCP tool server, the way hosted agents
//!   reach the local time, search and SQL servers.
//!
//! The concrete tool servers (`tools::*`) and the FAQ plugin (`faq_protocol`) implement
//! [`ToolProtocol`] directly.

use crate::agentdesk::http_client_pool::get_or_create_client_with_timeout;
use crate::agentdesk::tool_protocol::{ToolError, ToolMetadata, ToolProtocol, ToolResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::error::Error;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Type alias for synchronous tool functions exposed via the custom adapter.
pub type ToolFunction =
    Arc<dyn Fn(JsonValue) -> Result<ToolResult, Box<dyn Error + Send + Sync>> + Send + Sync>;

/// Type alias for asynchronous tool functions exposed via the custom adapter.
pub type AsyncToolFunction = Arc<
    dyn Fn(
            JsonValue,
        )
            -> Pin<Box<dyn Future<Output = Result<ToolResult, Box<dyn Error + Send + Sync>>> + Send>>
        + Send
        + Sync,
>;

enum CustomFunction {
    Sync(ToolFunction),
    Async(AsyncToolFunction),
}

/// Register Rust functions as tools.
///
/// # Example
///
/// ```rust
/// use agentdesk::tool_protocols::CustomToolProtocol;
/// use agentdesk::tool_protocol::{ToolMetadata, ToolParameter, ToolParameterType, ToolResult};
/// use std::sync::Arc;
///
/// # async {
/// let protocol = CustomToolProtocol::new();
/// protocol
///     .register_tool(
///         ToolMetadata::new("shout", "Upper-cases its input").with_parameter(
///             ToolParameter::new("text", ToolParameterType::String).required(),
///         ),
///         Arc::new(|params| {
///             let text = params["text"].as_str().unwrap_or_default();
///             Ok(ToolResult::success(serde_json::json!(text.to_uppercase())))
///         }),
///     )
///     .await;
/// # };
/// ```
pub struct CustomToolProtocol {
    tools: RwLock<HashMap<String, (ToolMetadata, CustomFunction)>>,
}

impl CustomToolProtocol {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
        }
    }

    /// Register a synchronous tool function, replacing any tool with the same name.
    pub async fn register_tool(&self, metadata: ToolMetadata, function: ToolFunction) {
        let name = metadata.name.clone();
        self.tools
            .write()
            .await
            .insert(name, (metadata, CustomFunction::Sync(function)));
    }

    /// Register an asynchronous tool function, replacing any tool with the same name.
    pub async fn register_async_tool(&self, metadata: ToolMetadata, function: AsyncToolFunction) {
        let name = metadata.name.clone();
        self.tools
            .write()
            .await
            .insert(name, (metadata, CustomFunction::Async(function)));
    }

    pub async fn unregister_tool(&self, name: &str) {
        self.tools.write().await.remove(name);
    }
}

impl Default for CustomToolProtocol {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolProtocol for CustomToolProtocol {
    async fn execute(
        &self,
        tool_name: &str,
        parameters: JsonValue,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        // The future is awaited after the read guard is released.
        let pending = {
            let tools = self.tools.read().await;
            match tools.get(tool_name) {
                Some((_, CustomFunction::Sync(f))) => return f(parameters),
                Some((_, CustomFunction::Async(f))) => f(parameters),
                None => return Err(Box::new(ToolError::NotFound(tool_name.to_string()))),
            }
        };
        pending.await
    }

    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>> {
        let tools = self.tools.read().await;
        let mut list: Vec<ToolMetadata> = tools.values().map(|(m, _)| m.clone()).collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }

    fn protocol_name(&self) -> &str {
        "custom"
    }
}

#[derive(Deserialize)]
struct ToolsListResponse {
    tools: Vec<ToolMetadata>,
}

#[derive(Deserialize)]
struct ToolsExecuteResponse {
    result: ToolResult,
}

/// Client for a remote MCP tool server.
///
/// Talks to the REST surface every agentdesk MCP server exposes:
/// `POST {base}/tools/list` and `POST {base}/tools/execute`. Plugin URLs are often written with
/// the transport path (`http://localhost:8087/mcp`); a trailing `/mcp` or `/sse` is stripped.
///
/// ```rust,no_run
/// use agentdesk::tool_protocols::McpClientProtocol;
/// use agentdesk::tool_protocol::ToolProtocol;
///
/// # async {
/// let clock = McpClientProtocol::new("http://localhost:8087/mcp");
/// let result = clock.execute("get_local_time", serde_json::json!({})).await.unwrap();
/// println!("{}", result.to_output_text());
/// # };
/// ```
pub struct McpClientProtocol {
    base_url: String,
    client: reqwest::Client,
    bearer_token: Option<String>,
    tools_cache: RwLock<Option<(Instant, Vec<ToolMetadata>)>>,
    cache_ttl: Duration,
}

impl McpClientProtocol {
    /// Default request timeout for tool calls.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(endpoint: impl Into<String>) -> Self {
        let base_url = normalize_endpoint(&endpoint.into());
        Self {
            client: get_or_create_client_with_timeout(&base_url, Self::DEFAULT_TIMEOUT),
            base_url,
            bearer_token: None,
            tools_cache: RwLock::new(None),
            cache_ttl: Duration::from_secs(300),
        }
    }

    /// Override the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = get_or_create_client_with_timeout(&self.base_url, timeout);
        self
    }

    /// Override how long a fetched tool list is reused.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Base URL requests are sent to, after normalisation.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Drop the cached tool list so the next `list_tools` hits the server.
    pub async fn invalidate_cache(&self) {
        *self.tools_cache.write().await = None;
    }

    async fn post(
        &self,
        path: &str,
        body: JsonValue,
    ) -> Result<reqwest::Response, Box<dyn Error + Send + Sync>> {
        let mut request = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(&body);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| {
            Box::new(ToolError::ProtocolError(format!(
                "MCP server {} unreachable: {}",
                self.base_url, e
            ))) as Box<dyn Error + Send + Sync>
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<JsonValue>(&body)
            .ok()
            .and_then(|v| v["error"].as_str().map(str::to_string))
            .unwrap_or(body);
        let message = format!("MCP server returned status {}: {}", status.as_u16(), detail);
        Err(if status.as_u16() == 404 {
            Box::new(ToolError::NotFound(message))
        } else if status.is_client_error() {
            Box::new(ToolError::ExecutionFailed(message))
        } else {
            Box::new(ToolError::ProtocolError(message))
        })
    }
}

fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim_end_matches('/');
    trimmed
        .strip_suffix("/mcp")
        .or_else(|| trimmed.strip_suffix("/sse"))
        .unwrap_or(trimmed)
        .to_string()
}

#[async_trait]
impl ToolProtocol for McpClientProtocol {
    async fn execute(
        &self,
        tool_name: &str,
        parameters: JsonValue,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        log::debug!("MCP call {} -> {}", self.base_url, tool_name);
        let response = self
            .post(
                "/tools/execute",
                json!({ "tool": tool_name, "parameters": parameters }),
            )
            .await?;
        let body: ToolsExecuteResponse = response.json().await?;
        Ok(body.result)
    }

    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>> {
        if let Some((fetched_at, tools)) = self.tools_cache.read().await.as_ref() {
            if fetched_at.elapsed() < self.cache_ttl {
                return Ok(tools.clone());
            }
        }

        let response = self.post("/tools/list", json!({})).await?;
        let body: ToolsListResponse = response.json().await?;
        *self.tools_cache.write().await = Some((Instant::now(), body.tools.clone()));
        Ok(body.tools)
    }

    fn protocol_name(&self) -> &str {
        "mcp"
    }
}
