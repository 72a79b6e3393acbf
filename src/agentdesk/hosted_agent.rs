//! A hosted agent driven through [`AgentsApi`], with MCP plugins as its function tools.
//!
//! The platform runs the model; this side posts messages, starts runs, polls them and answers
//! `requires_action` by executing the requested functions on the matching MCP plugin. Plugin
//! tools are published to the agent as `{plugin}-{tool}`.

use crate::agentdesk::agents_api::{
    AgentDefinition, AgentsApi, AgentsApiError, RequiredToolCall, RunStatus, ToolDefinition,
    ToolOutput,
};
use crate::agentdesk::config::McpPluginConfig;
use crate::agentdesk::event::{ChatEvent, EventHandler, McpEvent};
use crate::agentdesk::tool_protocol::{ToolProtocol, ToolRegistry};
use crate::agentdesk::tool_protocols::McpClientProtocol;
use futures_util::future::join_all;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;

/// A tool server the agent can call.
#[derive(Clone)]
pub struct McpPlugin {
    pub name: String,
    pub description: String,
    protocol: Arc<dyn ToolProtocol>,
}

impl McpPlugin {
    /// Plugin backed by the MCP server at `url`.
    pub fn new(name: impl Into<String>, description: impl Into<String>, url: &str) -> Self {
        Self::with_protocol(name, description, Arc::new(McpClientProtocol::new(url)))
    }

    /// Plugin backed by any [`ToolProtocol`].
    pub fn with_protocol(
        name: impl Into<String>,
        description: impl Into<String>,
        protocol: Arc<dyn ToolProtocol>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            protocol,
        }
    }

    pub fn from_config(config: &McpPluginConfig) -> Self {
        Self::new(&config.name, &config.description, &config.url)
    }
}

/// Result of one agent turn.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentReply {
    pub content: String,
    pub thread_id: String,
    pub agent_id: String,
}

pub struct HostedAgent {
    agent_id: String,
    name: String,
    tools: Vec<ToolDefinition>,
    registry: ToolRegistry,
    poll_interval: Duration,
    run_timeout: Duration,
    max_tool_rounds: usize,
    event_handler: Option<Arc<dyn EventHandler>>,
}

fn registry_for(plugins: &[McpPlugin]) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for plugin in plugins {
        registry.add_protocol(plugin.name.clone(), plugin.protocol.clone());
    }
    registry
}

/// Function tool definitions for every tool the plugins currently expose.
async fn function_tools(registry: &ToolRegistry) -> Vec<ToolDefinition> {
    registry
        .list_qualified()
        .await
        .into_iter()
        .map(|tool| {
            ToolDefinition::function(
                tool.qualified_name,
                tool.metadata.description.clone(),
                tool.metadata.to_json_schema(),
            )
        })
        .collect()
}

impl HostedAgent {
    fn assemble(
        agent_id: String,
        name: String,
        tools: Vec<ToolDefinition>,
        registry: ToolRegistry,
    ) -> Self {
        Self {
            agent_id,
            name,
            tools,
            registry,
            poll_interval: DEFAULT_POLL_INTERVAL,
            run_timeout: DEFAULT_RUN_TIMEOUT,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            event_handler: None,
        }
    }

    /// Create a new agent on the platform with the plugins' tools added to `definition`.
    pub async fn create(
        api: &dyn AgentsApi,
        mut definition: AgentDefinition,
        plugins: Vec<McpPlugin>,
    ) -> Result<Self, AgentsApiError> {
        let registry = registry_for(&plugins);
        definition.tools.extend(function_tools(&registry).await);
        let info = api.create_agent(&definition).await?;
        Ok(Self::assemble(
            info.id,
            definition.name,
            definition.tools,
            registry,
        ))
    }

    /// Use an existing agent. Its built-in tools are kept; function tools come from `plugins`.
    pub async fn attach(
        api: &dyn AgentsApi,
        agent_id: &str,
        plugins: Vec<McpPlugin>,
    ) -> Result<Self, AgentsApiError> {
        let info = api.get_agent(agent_id).await?;
        let registry = registry_for(&plugins);
        let mut tools: Vec<ToolDefinition> = info
            .tools
            .iter()
            .filter_map(|t| serde_json::from_value::<ToolDefinition>(t.clone()).ok())
            .filter(|t| !matches!(t, ToolDefinition::Function { .. }))
            .collect();
        tools.extend(function_tools(&registry).await);
        let name = info.name.unwrap_or_else(|| agent_id.to_string());
        Ok(Self::assemble(info.id, name, tools, registry))
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn id(&self) -> &str {
        &self.agent_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    async fn emit(&self, event: ChatEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_chat_event(&event).await;
        }
    }

    /// Post `message` to `thread_id` (a new thread when `None`) and run the agent to completion.
    pub async fn get_response(
        &self,
        api: &dyn AgentsApi,
        message: &str,
        thread_id: Option<&str>,
    ) -> Result<AgentReply, AgentsApiError> {
        let thread_id = match thread_id {
            Some(id) => id.to_string(),
            None => api.create_thread().await?,
        };
        api.create_message(&thread_id, "user", message).await?;

        let deadline = Instant::now() + self.run_timeout;
        let mut run = api.create_run(&thread_id, &self.agent_id, &self.tools).await?;
        let mut tool_rounds = 0;

        loop {
            match run.status {
                RunStatus::Completed => break,
                RunStatus::RequiresAction => {
                    if tool_rounds >= self.max_tool_rounds {
                        return Err(AgentsApiError::RunFailed {
                            status: run.status.as_str().to_string(),
                            message: format!(
                                "gave up after {} tool rounds",
                                self.max_tool_rounds
                            ),
                        });
                    }
                    tool_rounds += 1;
                    let outputs = self.run_tool_calls(run.required_tool_calls()).await;
                    run = api
                        .submit_tool_outputs(&thread_id, &run.id, &outputs)
                        .await?;
                    continue;
                }
                status if status.is_terminal() => {
                    log::warn!("run {} of agent {} ended {}", run.id, self.name, status.as_str());
                    return Err(AgentsApiError::RunFailed {
                        status: status.as_str().to_string(),
                        message: run.failure_message(),
                    });
                }
                _ => {}
            }
            if Instant::now() >= deadline {
                return Err(AgentsApiError::Timeout(format!(
                    "run {} did not finish within {}s",
                    run.id,
                    self.run_timeout.as_secs()
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
            run = api.get_run(&thread_id, &run.id).await?;
        }

        let content = api.latest_assistant_text(&thread_id, &run.id).await?;
        self.emit(ChatEvent::AgentTurnCompleted {
            agent_id: self.agent_id.clone(),
            agent_name: self.name.clone(),
            thread_id: thread_id.clone(),
            tool_rounds,
            response_length: content.len(),
        })
        .await;

        Ok(AgentReply {
            content,
            thread_id,
            agent_id: self.agent_id.clone(),
        })
    }

    /// Execute the calls concurrently. A failing call yields an `Error: ...` output so the
    /// model can react to it.
    async fn run_tool_calls(&self, calls: &[RequiredToolCall]) -> Vec<ToolOutput> {
        join_all(calls.iter().map(|call| async move {
            let started = Instant::now();
            let parameters: JsonValue = if call.function.arguments.trim().is_empty() {
                json!({})
            } else {
                serde_json::from_str(&call.function.arguments).unwrap_or_else(|e| {
                    log::warn!("unparseable arguments for {}: {}", call.function.name, e);
                    json!({})
                })
            };
            let output = match self
                .registry
                .execute_qualified(&call.function.name, parameters)
                .await
            {
                Ok(result) => result.to_output_text(),
                Err(e) => {
                    if let Some(handler) = &self.event_handler {
                        handler
                            .on_mcp_event(&McpEvent::ToolError {
                                source: self.name.clone(),
                                tool_name: call.function.name.clone(),
                                error: e.to_string(),
                                duration_ms: started.elapsed().as_millis() as u64,
                            })
                            .await;
                    }
                    format!("Error: {}", e)
                }
            };
            ToolOutput {
                tool_call_id: call.id.clone(),
                output,
            }
        }))
        .await
    }
}
