//! Hosted agent platform abstraction.
//!
//! [`AgentsApi`] is the narrow surface agentdesk needs from the remote agent service: agents,
//! threads, messages, runs and project connections. [`AzureAgentsClient`] implements it over
//! the Azure AI Foundry Agents REST API; tests implement it in memory.
//!
//! [`AzureAgentsClient`]: crate::clients::azure_agents::AzureAgentsClient

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::error::Error;
use std::fmt;

/// Errors talking to the hosted agent platform.
#[derive(Debug, Clone)]
pub enum AgentsApiError {
    /// Non-2xx reply.
    Http { status: u16, body: String },
    /// The request never got a reply (DNS, TLS, connection, timeout at the socket).
    Transport(String),
    /// No access token could be obtained.
    Credential(String),
    /// A run ended in a non-completed terminal state.
    RunFailed { status: String, message: String },
    /// A run did not finish in time.
    Timeout(String),
    /// The reply did not have the expected shape.
    Decode(String),
}

impl fmt::Display for AgentsApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentsApiError::Http { status, body } => {
                write!(f, "agent service returned {}: {}", status, body)
            }
            AgentsApiError::Transport(msg) => write!(f, "agent service unreachable: {}", msg),
            AgentsApiError::Credential(msg) => write!(f, "credential error: {}", msg),
            AgentsApiError::RunFailed { status, message } => {
                write!(f, "run {}: {}", status, message)
            }
            AgentsApiError::Timeout(msg) => write!(f, "timed out: {}", msg),
            AgentsApiError::Decode(msg) => write!(f, "unexpected reply: {}", msg),
        }
    }
}

impl Error for AgentsApiError {}

impl AgentsApiError {
    /// Whether the remote object does not exist (404).
    pub fn is_not_found(&self) -> bool {
        matches!(self, AgentsApiError::Http { status: 404, .. })
    }
}

/// A function the agent may call; `parameters` is a JSON schema object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: JsonValue,
}

/// A tool attached to an agent or a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolDefinition {
    CodeInterpreter,
    AzureAiSearch,
    Function { function: FunctionDefinition },
}

impl ToolDefinition {
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: JsonValue,
    ) -> Self {
        ToolDefinition::Function {
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }

    /// `tool_resources` binding the Azure AI Search tool to an index through a project
    /// connection.
    pub fn azure_ai_search_resources(connection_id: &str, index_name: &str) -> JsonValue {
        json!({
            "azure_ai_search": {
                "indexes": [{
                    "index_connection_id": connection_id,
                    "index_name": index_name,
                    "query_type": "simple"
                }]
            }
        })
    }
}

/// Body of an agent creation request.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AgentDefinition {
    pub model: String,
    pub name: String,
    pub description: String,
    pub instructions: String,
    pub temperature: f32,
    pub top_p: f32,
    pub tools: Vec<ToolDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_resources: Option<JsonValue>,
}

impl AgentDefinition {
    /// Temperature and top_p default to 0.1.
    pub fn new(
        model: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            name: name.into(),
            description: description.into(),
            instructions: instructions.into(),
            temperature: 0.1,
            top_p: 0.1,
            tools: Vec::new(),
            tool_resources: None,
        }
    }

    pub fn with_tool(mut self, tool: ToolDefinition) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_tool_resources(mut self, resources: JsonValue) -> Self {
        self.tool_resources = Some(resources);
        self
    }
}

/// An agent as the service reports it.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AgentInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub tools: Vec<JsonValue>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Expired,
    Incomplete,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Cancelled
                | RunStatus::Failed
                | RunStatus::Completed
                | RunStatus::Expired
                | RunStatus::Incomplete
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Expired => "expired",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments, as produced by the model.
    #[serde(default)]
    pub arguments: String,
}

/// A function call the run is waiting on.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RequiredToolCall {
    pub id: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SubmitToolOutputsAction {
    #[serde(default)]
    pub tool_calls: Vec<RequiredToolCall>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RequiredAction {
    pub submit_tool_outputs: Option<SubmitToolOutputsAction>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RunError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Run {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub required_action: Option<RequiredAction>,
    #[serde(default)]
    pub last_error: Option<RunError>,
}

impl Run {
    /// Function calls awaiting outputs; empty unless the run `requires_action`.
    pub fn required_tool_calls(&self) -> &[RequiredToolCall] {
        self.required_action
            .as_ref()
            .and_then(|a| a.submit_tool_outputs.as_ref())
            .map(|s| s.tool_calls.as_slice())
            .unwrap_or(&[])
    }

    /// `last_error` rendered for humans.
    pub fn failure_message(&self) -> String {
        match &self.last_error {
            Some(e) if !e.code.is_empty() => format!("{}: {}", e.code, e.message),
            Some(e) => e.message.clone(),
            None => format!("run ended with status {}", self.status.as_str()),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

/// A project connection (search service, storage, ...).
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Connection {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub connection_type: String,
}

impl Connection {
    pub fn is_search(&self) -> bool {
        matches!(
            self.connection_type.as_str(),
            "CognitiveSearch" | "AzureAISearch"
        )
    }
}

/// First Azure AI Search connection, if the project has one.
pub fn find_search_connection(connections: &[Connection]) -> Option<&Connection> {
    connections.iter().find(|c| c.is_search())
}

/// Operations on the hosted agent platform.
#[async_trait]
pub trait AgentsApi: Send + Sync {
    async fn create_agent(&self, definition: &AgentDefinition) -> Result<AgentInfo, AgentsApiError>;

    async fn get_agent(&self, agent_id: &str) -> Result<AgentInfo, AgentsApiError>;

    async fn delete_agent(&self, agent_id: &str) -> Result<(), AgentsApiError>;

    /// Returns the new thread id.
    async fn create_thread(&self) -> Result<String, AgentsApiError>;

    async fn delete_thread(&self, thread_id: &str) -> Result<(), AgentsApiError>;

    async fn create_message(
        &self,
        thread_id: &str,
        role: &str,
        content: &str,
    ) -> Result<(), AgentsApiError>;

    /// Start a run. Non-empty `tools` replace the agent's tools for this run.
    async fn create_run(
        &self,
        thread_id: &str,
        agent_id: &str,
        tools: &[ToolDefinition],
    ) -> Result<Run, AgentsApiError>;

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AgentsApiError>;

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run, AgentsApiError>;

    /// Text of the newest assistant message produced by `run_id`.
    async fn latest_assistant_text(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<String, AgentsApiError>;

    async fn list_connections(&self) -> Result<Vec<Connection>, AgentsApiError>;
}
