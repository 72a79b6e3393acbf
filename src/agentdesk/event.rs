//! Chat and MCP event system.
//!
//! A callback-based observability layer. Implement [`EventHandler`] to receive:
//!
//! - **MCP server events** ([`McpEvent`]): startup, tool listing, tool calls, rejected requests
//! - **Chat events** ([`ChatEvent`]): FAQ cache hits and misses, hosted agent lifecycle,
//!   group chat turns and termination
//!
//! Both trait methods default to no-ops. [`LoggingEventHandler`] forwards everything to the
//! `log` facade and is what the binaries install.
//!
//! ```rust,no_run
//! use agentdesk::event::{ChatEvent, EventHandler};
//! use async_trait::async_trait;
//!
//! struct CacheCounter(std::sync::atomic::AtomicUsize);
//!
//! #[async_trait]
//! impl EventHandler for CacheCounter {
//!     async fn on_chat_event(&self, event: &ChatEvent) {
//!         if let ChatEvent::CacheHit { .. } = event {
//!             self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
//!         }
//!     }
//! }
//! ```

use async_trait::async_trait;

/// Events emitted by the MCP HTTP adapter.
#[derive(Debug, Clone)]
pub enum McpEvent {
    /// The listener is bound and serving.
    ServerStarted { addr: String },
    /// `tools/list` arrived (REST or JSON-RPC).
    ToolListRequested { client_addr: String },
    ToolListReturned {
        client_addr: String,
        tool_count: usize,
    },
    /// A tool call arrived, before execution.
    ToolCallReceived {
        client_addr: String,
        tool_name: String,
        parameters: serde_json::Value,
    },
    /// The tool returned a [`ToolResult`](crate::tool_protocol::ToolResult), successful or not.
    ToolCallCompleted {
        client_addr: String,
        tool_name: String,
        success: bool,
        error: Option<String>,
        duration_ms: u64,
    },
    /// The tool raised an error instead of returning a result.
    ToolError {
        source: String,
        tool_name: String,
        error: String,
        duration_ms: u64,
    },
    /// Blocked by the IP filter or by authentication.
    RequestRejected { client_addr: String, reason: String },
}

/// Events emitted by the chat backend, hosted agents and the group chat.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// The FAQ memory answered the question; no agent was invoked.
    CacheHit {
        query: String,
        record_id: String,
        score: f32,
    },
    CacheMiss { query: String },
    /// A hosted agent was created for this request.
    AgentCreated { agent_id: String, agent_name: String },
    /// A hosted agent run reached `completed`.
    AgentTurnCompleted {
        agent_id: String,
        agent_name: String,
        thread_id: String,
        tool_rounds: usize,
        response_length: usize,
    },
    /// The group chat stopped taking turns.
    GroupChatTerminated {
        turns: usize,
        /// `true` when the strategy fired, `false` when the turn cap was hit first.
        by_strategy: bool,
    },
}

/// Trait for receiving MCP and chat events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_mcp_event(&self, _event: &McpEvent) {}

    async fn on_chat_event(&self, _event: &ChatEvent) {}
}

/// Forwards every event to the `log` facade.
///
/// Rejections and tool errors log at `warn`, everything else at `info` or `debug`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEventHandler;

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn on_mcp_event(&self, event: &McpEvent) {
        match event {
            McpEvent::ServerStarted { addr } => log::info!("MCP server listening on {}", addr),
            McpEvent::ToolListRequested { client_addr } => {
                log::debug!("tools/list from {}", client_addr)
            }
            McpEvent::ToolListReturned {
                client_addr,
                tool_count,
            } => log::debug!("returned {} tools to {}", tool_count, client_addr),
            McpEvent::ToolCallReceived {
                client_addr,
                tool_name,
                ..
            } => log::info!("tool call '{}' from {}", tool_name, client_addr),
            McpEvent::ToolCallCompleted {
                tool_name,
                success,
                error,
                duration_ms,
                ..
            } => {
                if *success {
                    log::info!("tool '{}' completed in {}ms", tool_name, duration_ms)
                } else {
                    log::warn!(
                        "tool '{}' failed in {}ms: {}",
                        tool_name,
                        duration_ms,
                        error.as_deref().unwrap_or("unknown error")
                    )
                }
            }
            McpEvent::ToolError {
                source,
                tool_name,
                error,
                ..
            } => log::warn!("tool '{}' raised for {}: {}", tool_name, source, error),
            McpEvent::RequestRejected {
                client_addr,
                reason,
            } => log::warn!("rejected request from {}: {}", client_addr, reason),
        }
    }

    async fn on_chat_event(&self, event: &ChatEvent) {
        match event {
            ChatEvent::CacheHit {
                query,
                record_id,
                score,
            } => log::info!(
                "FAQ cache hit for '{}' (record {}, score {:.4})",
                query,
                record_id,
                score
            ),
            ChatEvent::CacheMiss { query } => log::info!("FAQ cache miss for '{}'", query),
            ChatEvent::AgentCreated {
                agent_id,
                agent_name,
            } => log::info!("created agent {} ({})", agent_name, agent_id),
            ChatEvent::AgentTurnCompleted {
                agent_name,
                thread_id,
                tool_rounds,
                response_length,
                ..
            } => log::info!(
                "{} answered on thread {} ({} chars, {} tool rounds)",
                agent_name,
                thread_id,
                response_length,
                tool_rounds
            ),
            ChatEvent::GroupChatTerminated { turns, by_strategy } => log::info!(
                "group chat finished after {} turns ({})",
                turns,
                if *by_strategy {
                    "termination strategy"
                } else {
                    "turn cap"
                }
            ),
        }
    }
}
