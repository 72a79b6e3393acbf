//! HTTP Server Adapter for MCP
//!
//! [`HttpServerAdapter`] keeps the HTTP framework out of [`MCPServerBuilder`]'s API;
//! [`AxumHttpAdapter`] is the implementation every agentdesk tool server runs on.
//!
//! Routes served:
//!
//! | Route | Body | Reply |
//! |-------|------|-------|
//! | `POST /tools/list` | any | `{"tools": [ToolMetadata]}` |
//! | `POST /tools/execute` | `{"tool", "parameters"}` | `{"result": ToolResult}` |
//! | `POST /mcp` | JSON-RPC 2.0 request | JSON-RPC 2.0 response |
//!
//! IP filtering (403) and authentication (401) run before every route.
//!
//! [`MCPServerBuilder`]: crate::mcp_server_builder::MCPServerBuilder

use crate::agentdesk::event::{EventHandler, McpEvent};
use crate::agentdesk::mcp_server::UnifiedMcpServer;
use crate::agentdesk::mcp_server_builder_utils::{AuthConfig, IpFilter};
use crate::agentdesk::tool_protocol::{ToolError, ToolProtocol};
use axum::body::Bytes;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value as JsonValue};
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// MCP protocol revision reported by `initialize` when the client does not send one.
pub const MCP_PROTOCOL_VERSION: &str = "2025-03-26";

/// Configuration for an HTTP MCP server
#[derive(Clone)]
pub struct HttpServerConfig {
    pub addr: SocketAddr,
    /// Reported as `serverInfo.name` by `initialize`.
    pub server_name: String,
    pub auth: AuthConfig,
    pub ip_filter: IpFilter,
    pub event_handler: Option<Arc<dyn EventHandler>>,
}

impl std::fmt::Debug for HttpServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServerConfig")
            .field("addr", &self.addr)
            .field("server_name", &self.server_name)
            .field("auth", &self.auth)
            .field("ip_filter", &self.ip_filter)
            .field("has_event_handler", &self.event_handler.is_some())
            .finish()
    }
}

/// A running HTTP server.
pub struct HttpServerInstance {
    pub addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<std::io::Result<()>>,
}

impl HttpServerInstance {
    pub fn new(
        addr: SocketAddr,
        shutdown_tx: oneshot::Sender<()>,
        handle: JoinHandle<std::io::Result<()>>,
    ) -> Self {
        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            handle,
        }
    }

    pub fn get_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and wait for in-flight requests to finish.
    pub async fn shutdown(mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.handle.await??;
        Ok(())
    }

    /// Serve until the task ends (normally: never, or when the process is interrupted).
    pub async fn wait(self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let _keep_open = self.shutdown_tx;
        self.handle.await??;
        Ok(())
    }
}

/// Trait for HTTP server implementations
#[async_trait::async_trait]
pub trait HttpServerAdapter: Send + Sync {
    /// Bind `config.addr` and start serving `server`.
    async fn start(
        &self,
        config: HttpServerConfig,
        server: UnifiedMcpServer,
    ) -> Result<HttpServerInstance, Box<dyn Error + Send + Sync>>;

    fn name(&self) -> &str {
        "unknown"
    }
}

struct AdapterState {
    server: UnifiedMcpServer,
    server_name: String,
    auth: AuthConfig,
    ip_filter: IpFilter,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl AdapterState {
    async fn emit(&self, event: McpEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_mcp_event(&event).await;
        }
    }
}

type SharedState = Arc<AdapterState>;

/// Axum-based HTTP server adapter.
pub struct AxumHttpAdapter;

impl AxumHttpAdapter {
    fn router(state: SharedState) -> Router {
        Router::new()
            .route("/tools/list", post(rest_list_tools))
            .route("/tools/execute", post(rest_execute))
            .route("/mcp", post(json_rpc))
            .layer(middleware::from_fn_with_state(state.clone(), guard))
            .with_state(state)
    }
}

#[async_trait::async_trait]
impl HttpServerAdapter for AxumHttpAdapter {
    async fn start(
        &self,
        config: HttpServerConfig,
        server: UnifiedMcpServer,
    ) -> Result<HttpServerInstance, Box<dyn Error + Send + Sync>> {
        let state = Arc::new(AdapterState {
            server,
            server_name: config.server_name,
            auth: config.auth,
            ip_filter: config.ip_filter,
            event_handler: config.event_handler,
        });
        let app = Self::router(state.clone()).into_make_service_with_connect_info::<SocketAddr>();

        let listener = TcpListener::bind(config.addr).await?;
        let addr = listener.local_addr()?;
        state
            .emit(McpEvent::ServerStarted {
                addr: addr.to_string(),
            })
            .await;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        Ok(HttpServerInstance::new(addr, shutdown_tx, handle))
    }

    fn name(&self) -> &str {
        "axum"
    }
}

async fn guard(
    State(state): State<SharedState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if !state.ip_filter.is_allowed(addr.ip()) {
        state
            .emit(McpEvent::RequestRejected {
                client_addr: addr.ip().to_string(),
                reason: "IP not allowed".to_string(),
            })
            .await;
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"error": "Access denied"})),
        )
            .into_response();
    }

    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if !state.auth.validate(authorization) {
        state
            .emit(McpEvent::RequestRejected {
                client_addr: addr.ip().to_string(),
                reason: "authentication failed".to_string(),
            })
            .await;
        let mut response = (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Unauthorized"})),
        )
            .into_response();
        if let Some(challenge) = state.auth.challenge() {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                header::HeaderValue::from_static(challenge),
            );
        }
        return response;
    }

    next.run(request).await
}

async fn rest_list_tools(
    State(state): State<SharedState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Response {
    let client_addr = addr.ip().to_string();
    state
        .emit(McpEvent::ToolListRequested {
            client_addr: client_addr.clone(),
        })
        .await;
    match state.server.list_tools().await {
        Ok(tools) => {
            state
                .emit(McpEvent::ToolListReturned {
                    client_addr,
                    tool_count: tools.len(),
                })
                .await;
            (StatusCode::OK, Json(json!({ "tools": tools }))).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

async fn rest_execute(
    State(state): State<SharedState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<JsonValue>,
) -> Response {
    let Some(tool_name) = payload["tool"].as_str() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "missing 'tool'"})),
        )
            .into_response();
    };
    let parameters = match &payload["parameters"] {
        JsonValue::Null => json!({}),
        other => other.clone(),
    };

    match call_tool(&state, &addr.ip().to_string(), tool_name, parameters).await {
        Ok(result) => (StatusCode::OK, Json(json!({ "result": result }))).into_response(),
        Err(e) => {
            let status = match e.downcast_ref::<ToolError>() {
                Some(ToolError::NotFound(_)) => StatusCode::NOT_FOUND,
                _ => StatusCode::BAD_REQUEST,
            };
            (status, Json(json!({"error": e.to_string()}))).into_response()
        }
    }
}

/// Execute with the received/completed/error events around it.
async fn call_tool(
    state: &AdapterState,
    client_addr: &str,
    tool_name: &str,
    parameters: JsonValue,
) -> Result<crate::agentdesk::tool_protocol::ToolResult, Box<dyn Error + Send + Sync>> {
    state
        .emit(McpEvent::ToolCallReceived {
            client_addr: client_addr.to_string(),
            tool_name: tool_name.to_string(),
            parameters: parameters.clone(),
        })
        .await;

    let started = Instant::now();
    let outcome = state.server.execute(tool_name, parameters).await;
    let duration_ms = started.elapsed().as_millis() as u64;
    match &outcome {
        Ok(result) => {
            state
                .emit(McpEvent::ToolCallCompleted {
                    client_addr: client_addr.to_string(),
                    tool_name: tool_name.to_string(),
                    success: result.success,
                    error: result.error.clone(),
                    duration_ms,
                })
                .await
        }
        Err(e) => {
            state
                .emit(McpEvent::ToolError {
                    source: client_addr.to_string(),
                    tool_name: tool_name.to_string(),
                    error: e.to_string(),
                    duration_ms,
                })
                .await
        }
    }
    outcome
}

fn rpc_result(id: JsonValue, result: JsonValue) -> Response {
    Json(json!({"jsonrpc": "2.0", "id": id, "result": result})).into_response()
}

fn rpc_error(id: JsonValue, code: i64, message: impl Into<String>) -> Response {
    Json(json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {"code": code, "message": message.into()}
    }))
    .into_response()
}

async fn json_rpc(
    State(state): State<SharedState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> Response {
    let request: JsonValue = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => return rpc_error(JsonValue::Null, -32700, format!("Parse error: {}", e)),
    };
    let Some(method) = request["method"].as_str() else {
        return rpc_error(request["id"].clone(), -32600, "Invalid Request");
    };
    let params = &request["params"];
    let client_addr = addr.ip().to_string();

    // Notifications carry no id and get no body back.
    let Some(id) = request.get("id").cloned() else {
        log::debug!("MCP notification '{}' from {}", method, client_addr);
        return StatusCode::ACCEPTED.into_response();
    };

    match method {
        "initialize" => {
            let version = params["protocolVersion"]
                .as_str()
                .unwrap_or(MCP_PROTOCOL_VERSION);
            rpc_result(
                id,
                json!({
                    "protocolVersion": version,
                    "capabilities": {
                        "tools": {"listChanged": false},
                        "prompts": {"listChanged": false}
                    },
                    "serverInfo": {
                        "name": state.server_name,
                        "version": env!("CARGO_PKG_VERSION")
                    }
                }),
            )
        }
        "ping" => rpc_result(id, json!({})),
        "tools/list" => {
            state
                .emit(McpEvent::ToolListRequested {
                    client_addr: client_addr.clone(),
                })
                .await;
            match state.server.list_tools().await {
                Ok(tools) => {
                    state
                        .emit(McpEvent::ToolListReturned {
                            client_addr,
                            tool_count: tools.len(),
                        })
                        .await;
                    let tools: Vec<JsonValue> = tools
                        .iter()
                        .map(|t| {
                            json!({
                                "name": t.name,
                                "description": t.description,
                                "inputSchema": t.to_json_schema()
                            })
                        })
                        .collect();
                    rpc_result(id, json!({ "tools": tools }))
                }
                Err(e) => rpc_error(id, -32603, e.to_string()),
            }
        }
        "tools/call" => {
            let Some(name) = params["name"].as_str() else {
                return rpc_error(id, -32602, "missing tool name");
            };
            let arguments = match &params["arguments"] {
                JsonValue::Null => json!({}),
                other => other.clone(),
            };
            match call_tool(&state, &client_addr, name, arguments).await {
                Ok(result) => rpc_result(
                    id,
                    json!({
                        "content": [{"type": "text", "text": result.to_output_text()}],
                        "isError": !result.success
                    }),
                ),
                Err(e) => match e.downcast_ref::<ToolError>() {
                    Some(ToolError::NotFound(_)) => {
                        rpc_error(id, -32602, format!("Unknown tool: {}", name))
                    }
                    _ => rpc_result(
                        id,
                        json!({
                            "content": [{"type": "text", "text": e.to_string()}],
                            "isError": true
                        }),
                    ),
                },
            }
        }
        "prompts/list" => {
            let prompts: Vec<JsonValue> = state
                .server
                .list_prompts()
                .await
                .into_iter()
                .map(|p| json!({"name": p.name, "description": p.description, "arguments": []}))
                .collect();
            rpc_result(id, json!({ "prompts": prompts }))
        }
        "prompts/get" => {
            let name = params["name"].as_str().unwrap_or_default();
            match state.server.get_prompt(name).await {
                Some(prompt) => rpc_result(
                    id,
                    json!({
                        "description": prompt.description,
                        "messages": [{
                            "role": "user",
                            "content": {"type": "text", "text": prompt.text}
                        }]
                    }),
                ),
                None => rpc_error(id, -32602, format!("Unknown prompt: {}", name)),
            }
        }
        other => rpc_error(id, -32601, format!("Method not found: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agentdesk::mcp_server::McpPrompt;
    use crate::agentdesk::tool_protocol::{ToolMetadata, ToolResult};
    use crate::agentdesk::tool_protocols::CustomToolProtocol;

    async fn start(auth: AuthConfig, ip_filter: IpFilter) -> HttpServerInstance {
        let tools = CustomToolProtocol::new();
        tools
            .register_tool(
                ToolMetadata::new("greet", "Says hello"),
                Arc::new(|_| Ok(ToolResult::success(json!("hello")))),
            )
            .await;
        let server = UnifiedMcpServer::new();
        server.register_protocol(Arc::new(tools)).await.unwrap();
        server
            .add_prompt(McpPrompt::new("intro", "Introduction", "Be brief."))
            .await;

        AxumHttpAdapter
            .start(
                HttpServerConfig {
                    addr: "127.0.0.1:0".parse().unwrap(),
                    server_name: "test-server".into(),
                    auth,
                    ip_filter,
                    event_handler: None,
                },
                server,
            )
            .await
            .unwrap()
    }

    async fn rpc(addr: SocketAddr, body: JsonValue) -> reqwest::Response {
        reqwest::Client::new()
            .post(format!("http://{}/mcp", addr))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_json_rpc_initialize_and_tools() {
        let instance = start(AuthConfig::None, IpFilter::new()).await;
        let addr = instance.get_addr();

        let init: JsonValue = rpc(
            addr,
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        )
        .await
        .json()
        .await
        .unwrap();
        assert_eq!(init["result"]["serverInfo"]["name"], "test-server");
        assert_eq!(init["result"]["protocolVersion"], MCP_PROTOCOL_VERSION);

        let notified = rpc(
            addr,
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        )
        .await;
        assert_eq!(notified.status(), 202);

        let listed: JsonValue = rpc(
            addr,
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
        )
        .await
        .json()
        .await
        .unwrap();
        assert_eq!(listed["result"]["tools"][0]["name"], "greet");
        assert_eq!(listed["result"]["tools"][0]["inputSchema"]["type"], "object");

        let called: JsonValue = rpc(
            addr,
            json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call",
                   "params": {"name": "greet", "arguments": {}}}),
        )
        .await
        .json()
        .await
        .unwrap();
        assert_eq!(called["result"]["content"][0]["text"], "hello");
        assert_eq!(called["result"]["isError"], false);

        let unknown: JsonValue = rpc(
            addr,
            json!({"jsonrpc": "2.0", "id": 4, "method": "resources/list"}),
        )
        .await
        .json()
        .await
        .unwrap();
        assert_eq!(unknown["error"]["code"], -32601);

        instance.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_json_rpc_prompts() {
        let instance = start(AuthConfig::None, IpFilter::new()).await;
        let addr = instance.get_addr();

        let got: JsonValue = rpc(
            addr,
            json!({"jsonrpc": "2.0", "id": "a", "method": "prompts/get", "params": {"name": "intro"}}),
        )
        .await
        .json()
        .await
        .unwrap();
        assert_eq!(got["id"], "a");
        assert_eq!(got["result"]["messages"][0]["content"]["text"], "Be brief.");

        let missing: JsonValue = rpc(
            addr,
            json!({"jsonrpc": "2.0", "id": 5, "method": "prompts/get", "params": {"name": "x"}}),
        )
        .await
        .json()
        .await
        .unwrap();
        assert_eq!(missing["error"]["code"], -32602);

        let garbage = reqwest::Client::new()
            .post(format!("http://{}/mcp", addr))
            .body("{not json")
            .send()
            .await
            .unwrap();
        let garbage: JsonValue = garbage.json().await.unwrap();
        assert_eq!(garbage["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn test_bearer_token_enforced() {
        let instance = start(AuthConfig::bearer("t0ken"), IpFilter::new()).await;
        let url = format!("http://{}/tools/list", instance.get_addr());
        let client = reqwest::Client::new();

        let denied = client.post(&url).send().await.unwrap();
        assert_eq!(denied.status(), 401);
        assert_eq!(denied.headers()["www-authenticate"], "Bearer");

        let allowed = client.post(&url).bearer_auth("t0ken").send().await.unwrap();
        assert_eq!(allowed.status(), 200);
    }

    #[tokio::test]
    async fn test_ip_filter_enforced() {
        let mut filter = IpFilter::new();
        filter.allow("10.20.30.40").unwrap();
        let instance = start(AuthConfig::None, filter).await;
        let response = reqwest::Client::new()
            .post(format!("http://{}/tools/list", instance.get_addr()))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 403);
    }

    #[tokio::test]
    async fn test_rest_execute_unknown_tool_is_404() {
        let instance = start(AuthConfig::None, IpFilter::new()).await;
        let response = reqwest::Client::new()
            .post(format!("http://{}/tools/execute", instance.get_addr()))
            .json(&json!({"tool": "missing", "parameters": {}}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
    }
}
