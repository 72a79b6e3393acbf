//! Chat backend.
//!
//! | Route | Input | Reply |
//! |-------|-------|-------|
//! | `POST /chat` | `{"user_input", "agent_id"?, "thread_id"?}` | depends on [`ServerMode`] |
//! | `POST /reset_agent_thread_id` | `?agent_id&thread_id` | `{"message", "agent_id", "thread_id"}` |
//! | `POST /reset_threads` | `?thread_id` | `{"message", "thread_id"}` |
//! | `GET /health` | | `OK` |
//!
//! Errors are `{"detail": "..."}` with a 4xx/5xx status.

use crate::agentdesk::agent_definitions;
use crate::agentdesk::agents_api::{find_search_connection, AgentsApi};
use crate::agentdesk::config::{AgentDeskConfig, ServerMode};
use crate::agentdesk::event::{ChatEvent, EventHandler};
use crate::agentdesk::faq_memory::{cache_lookup, FaqHit, FaqMemory};
use crate::agentdesk::group_chat::{
    extract_final_answer, AgentGroupChat, ChatMessage, ConsensusTerminationStrategy,
    GroupChatParticipant, HostedParticipant,
};
use crate::agentdesk::hosted_agent::{AgentReply, HostedAgent, McpPlugin, DEFAULT_POLL_INTERVAL};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::future::join_all;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Builds the MCP plugins for one request.
pub type PluginFactory = Arc<dyn Fn() -> Vec<McpPlugin> + Send + Sync>;

/// Shared state of the backend.
#[derive(Clone)]
pub struct AppState {
    config: Arc<AgentDeskConfig>,
    api: Arc<dyn AgentsApi>,
    faq: Option<Arc<FaqMemory>>,
    plugins: PluginFactory,
    event_handler: Option<Arc<dyn EventHandler>>,
    poll_interval: Duration,
}

impl AppState {
    /// Plugins default to `config.mcp_plugins`.
    pub fn new(config: AgentDeskConfig, api: Arc<dyn AgentsApi>) -> Self {
        let plugin_configs = config.mcp_plugins.clone();
        Self {
            config: Arc::new(config),
            api,
            faq: None,
            plugins: Arc::new(move || plugin_configs.iter().map(McpPlugin::from_config).collect()),
            event_handler: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_faq(mut self, faq: Arc<FaqMemory>) -> Self {
        self.faq = Some(faq);
        self
    }

    pub fn with_plugins(mut self, plugins: PluginFactory) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn config(&self) -> &AgentDeskConfig {
        &self.config
    }

    async fn emit(&self, event: ChatEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_chat_event(&event).await;
        }
    }

    fn tune(&self, agent: HostedAgent) -> HostedAgent {
        let agent = agent.with_poll_interval(self.poll_interval);
        match &self.event_handler {
            Some(handler) => agent.with_event_handler(handler.clone()),
            None => agent,
        }
    }

    async fn create_agent(
        &self,
        definition: crate::agentdesk::agents_api::AgentDefinition,
        plugins: Vec<McpPlugin>,
    ) -> Result<HostedAgent, Box<dyn Error + Send + Sync>> {
        let agent = HostedAgent::create(self.api.as_ref(), definition, plugins).await?;
        self.emit(ChatEvent::AgentCreated {
            agent_id: agent.id().to_string(),
            agent_name: agent.name().to_string(),
        })
        .await;
        Ok(self.tune(agent))
    }

    /// FAQ cache check. Lookup failures are logged and treated as a miss.
    async fn cached_answer(&self, query: &str) -> Option<FaqHit> {
        let faq = self.faq.as_ref()?;
        match cache_lookup(faq, query, self.config.cache_threshold).await {
            Ok(Some(hit)) => {
                self.emit(ChatEvent::CacheHit {
                    query: query.to_string(),
                    record_id: hit.record.id.clone(),
                    score: hit.score,
                })
                .await;
                Some(hit)
            }
            Ok(None) => {
                self.emit(ChatEvent::CacheMiss {
                    query: query.to_string(),
                })
                .await;
                None
            }
            Err(e) => {
                log::error!("FAQ cache lookup failed: {}", e);
                None
            }
        }
    }

    /// Id of the project's search connection and the configured index.
    async fn search_binding(&self) -> Result<(String, String), ApiError> {
        let connections = self
            .api
            .list_connections()
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
        let connection = find_search_connection(&connections)
            .ok_or_else(|| ApiError::internal("Azure AI Search connection not found"))?;
        log::info!("found Azure AI Search connection: {}", connection.id);
        let index = self
            .config
            .search_index
            .clone()
            .ok_or_else(|| ApiError::internal("AZURE_SEARCH_INDEX is not set"))?;
        Ok((connection.id.clone(), index))
    }
}

/// `{"detail": ...}` error reply.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_input: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResetParams {
    pub agent_id: Option<String>,
    pub thread_id: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/reset_agent_thread_id", post(reset_agent_thread))
        .route("/reset_threads", post(reset_threads))
        .route("/health", get(health))
        .with_state(state)
}

/// Bind `addr` and serve until the process ends.
pub async fn serve(state: AppState, addr: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    let local: SocketAddr = listener.local_addr()?;
    log::info!(
        "agentdesk backend ({:?} mode) listening on {}",
        state.config.mode,
        local
    );
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health() -> &'static str {
    "OK"
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<JsonValue>, ApiError> {
    log::info!("user input: {}", request.user_input);
    log::info!(
        "agent id: {:?}, thread id: {:?}",
        request.agent_id,
        request.thread_id
    );
    match state.config.mode {
        ServerMode::Mcp => chat_mcp(&state, request).await,
        ServerMode::Rag => chat_rag(&state, request).await,
        ServerMode::Group => chat_group(&state, request).await,
    }
}

/// Run one turn, mapping failures on a caller-supplied thread to their own message.
async fn respond(
    state: &AppState,
    agent: &HostedAgent,
    request: &ChatRequest,
) -> Result<Json<JsonValue>, ApiError> {
    let reply: AgentReply = match request.thread_id.as_deref() {
        Some(thread_id) => agent
            .get_response(state.api.as_ref(), &request.user_input, Some(thread_id))
            .await
            .map_err(|e| {
                log::error!("error with existing thread ID {}: {}", thread_id, e);
                ApiError::internal(format!("Error with existing thread ID {}: {}", thread_id, e))
            })?,
        None => agent
            .get_response(state.api.as_ref(), &request.user_input, None)
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?,
    };
    log::info!("agent response: {}", reply.content);
    Ok(Json(json!({
        "response": reply.content,
        "thread_id": reply.thread_id,
        "agent_id": reply.agent_id,
    })))
}

async fn chat_mcp(state: &AppState, request: ChatRequest) -> Result<Json<JsonValue>, ApiError> {
    let plugins = (state.plugins)();
    let agent = match request.agent_id.as_deref() {
        None => state
            .create_agent(
                agent_definitions::mcp_agent(&state.config.model_deployment),
                plugins,
            )
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?,
        Some(agent_id) => state.tune(
            HostedAgent::attach(state.api.as_ref(), agent_id, plugins)
                .await
                .map_err(|e| ApiError::internal(e.to_string()))?,
        ),
    };
    respond(state, &agent, &request).await
}

async fn chat_rag(state: &AppState, request: ChatRequest) -> Result<Json<JsonValue>, ApiError> {
    if let Some(hit) = state.cached_answer(&request.user_input).await {
        return Ok(Json(json!({
            "response": hit.record.answer,
            "agent_id": request.agent_id,
            "thread_id": request.thread_id,
        })));
    }
    log::info!("no cached answer, asking the agent");

    let agent = match request.agent_id.as_deref() {
        None => {
            let (connection_id, index) = state.search_binding().await?;
            state
                .create_agent(
                    agent_definitions::rag_agent(
                        &state.config.model_deployment,
                        &connection_id,
                        &index,
                    ),
                    Vec::new(),
                )
                .await
                .map_err(|e| ApiError::internal(e.to_string()))?
        }
        Some(agent_id) => state.tune(
            HostedAgent::attach(state.api.as_ref(), agent_id, Vec::new())
                .await
                .map_err(|e| ApiError::internal(e.to_string()))?,
        ),
    };
    respond(state, &agent, &request).await
}

async fn chat_group(state: &AppState, request: ChatRequest) -> Result<Json<JsonValue>, ApiError> {
    if let Some(hit) = state.cached_answer(&request.user_input).await {
        return Ok(Json(json!({
            "response": hit.record.answer,
            "thread_id": request.thread_id,
        })));
    }

    let mut created = Vec::new();
    let outcome = run_group(state, &request.user_input, &mut created).await;

    for result in join_all(created.iter().map(|id| state.api.delete_agent(id))).await {
        if let Err(e) = result {
            log::warn!("could not delete group chat agent: {}", e);
        }
    }

    match outcome {
        Ok(transcript) => Ok(Json(json!({
            "response": extract_final_answer(&transcript),
            "thread_id": request.thread_id,
            "full_conversation": transcript,
        }))),
        Err(e) => {
            log::error!("error in group chat: {}", e);
            Err(ApiError::internal(format!("Error processing request: {}", e)))
        }
    }
}

/// Create both experts, let them talk, tear down their threads. Ids of agents created are
/// pushed to `created` even when a later step fails.
async fn run_group(
    state: &AppState,
    user_input: &str,
    created: &mut Vec<String>,
) -> Result<Vec<ChatMessage>, Box<dyn Error + Send + Sync>> {
    let model = &state.config.model_deployment;
    let (connection_id, index) = state
        .search_binding()
        .await
        .map_err(|e| e.detail)?;

    let knowledge = state
        .create_agent(
            agent_definitions::knowledge_expert(model, &connection_id, &index),
            Vec::new(),
        )
        .await?;
    created.push(knowledge.id().to_string());

    let system = state
        .create_agent(agent_definitions::system_expert(model), (state.plugins)())
        .await?;
    created.push(system.id().to_string());

    let participants: Vec<Arc<dyn GroupChatParticipant>> = vec![
        Arc::new(HostedParticipant::new(state.api.clone(), knowledge)),
        Arc::new(HostedParticipant::new(state.api.clone(), system)),
    ];
    let strategy = ConsensusTerminationStrategy::new(participants.len(), state.config.max_iterations);
    let mut chat = AgentGroupChat::new(participants, Box::new(strategy));
    if let Some(handler) = &state.event_handler {
        chat = chat.with_event_handler(handler.clone());
    }

    let result = chat.invoke(user_input).await;
    chat.reset().await;
    Ok(result?)
}

async fn reset_agent_thread(
    State(state): State<AppState>,
    Query(params): Query<ResetParams>,
) -> Result<Json<JsonValue>, ApiError> {
    log::info!(
        "resetting thread {:?} of agent {:?}",
        params.thread_id,
        params.agent_id
    );
    let (Some(agent_id), Some(thread_id)) = (params.agent_id, params.thread_id) else {
        return Err(ApiError::bad_request("Agent ID is required to reset thread."));
    };

    let internal = |e: crate::agentdesk::agents_api::AgentsApiError| ApiError::internal(e.to_string());
    state.api.get_agent(&agent_id).await.map_err(internal)?;
    state.api.delete_thread(&thread_id).await.map_err(internal)?;
    state.api.delete_agent(&agent_id).await.map_err(internal)?;

    Ok(Json(json!({
        "message": "Agent thread reset successfully.",
        "agent_id": agent_id,
        "thread_id": thread_id,
    })))
}

async fn reset_threads(
    State(state): State<AppState>,
    Query(params): Query<ResetParams>,
) -> Json<JsonValue> {
    if let Some(thread_id) = params.thread_id.as_deref() {
        match state.api.delete_thread(thread_id).await {
            Ok(()) => log::info!("deleted thread {}", thread_id),
            Err(e) => log::error!("error deleting thread {}: {}", thread_id, e),
        }
    }
    Json(json!({
        "message": "Reset completed successfully",
        "thread_id": params.thread_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agentdesk::agents_api::{
        AgentDefinition, AgentInfo, AgentsApiError, Connection, Run, ToolDefinition, ToolOutput,
    };
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    /// Every platform call fails as if the service were down.
    struct Offline;

    fn offline<T>() -> Result<T, AgentsApiError> {
        Err(AgentsApiError::Transport("connection refused".into()))
    }

    #[async_trait]
    impl AgentsApi for Offline {
        async fn create_agent(&self, _: &AgentDefinition) -> Result<AgentInfo, AgentsApiError> {
            offline()
        }
        async fn get_agent(&self, _: &str) -> Result<AgentInfo, AgentsApiError> {
            offline()
        }
        async fn delete_agent(&self, _: &str) -> Result<(), AgentsApiError> {
            offline()
        }
        async fn create_thread(&self) -> Result<String, AgentsApiError> {
            offline()
        }
        async fn delete_thread(&self, _: &str) -> Result<(), AgentsApiError> {
            offline()
        }
        async fn create_message(&self, _: &str, _: &str, _: &str) -> Result<(), AgentsApiError> {
            offline()
        }
        async fn create_run(
            &self,
            _: &str,
            _: &str,
            _: &[ToolDefinition],
        ) -> Result<Run, AgentsApiError> {
            offline()
        }
        async fn get_run(&self, _: &str, _: &str) -> Result<Run, AgentsApiError> {
            offline()
        }
        async fn submit_tool_outputs(
            &self,
            _: &str,
            _: &str,
            _: &[ToolOutput],
        ) -> Result<Run, AgentsApiError> {
            offline()
        }
        async fn latest_assistant_text(&self, _: &str, _: &str) -> Result<String, AgentsApiError> {
            offline()
        }
        async fn list_connections(&self) -> Result<Vec<Connection>, AgentsApiError> {
            offline()
        }
    }

    fn app(mode: ServerMode) -> Router {
        let config = AgentDeskConfig {
            mode,
            mcp_plugins: Vec::new(),
            ..Default::default()
        };
        router(AppState::new(config, Arc::new(Offline)))
    }

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, JsonValue) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null))
    }

    fn post_json(uri: &str, body: JsonValue) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_reset_without_ids_is_bad_request() {
        let request = Request::builder()
            .method("POST")
            .uri("/reset_agent_thread_id?thread_id=thread_1")
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(app(ServerMode::Mcp), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Agent ID is required to reset thread.");
    }

    #[tokio::test]
    async fn test_platform_outage_is_500() {
        let (status, body) = call(
            app(ServerMode::Rag),
            post_json("/chat", json!({"user_input": "hi"})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["detail"].as_str().unwrap().contains("connection refused"));

        let (status, body) = call(
            app(ServerMode::Group),
            post_json("/chat", json!({"user_input": "hi"})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["detail"]
            .as_str()
            .unwrap()
            .starts_with("Error processing request: "));
    }

    #[tokio::test]
    async fn test_chat_requires_user_input() {
        let (status, _) = call(
            app(ServerMode::Mcp),
            post_json("/chat", json!({"thread_id": "thread_1"})),
        )
        .await;
        assert!(status.is_client_error());
    }
}
