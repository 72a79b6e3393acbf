//! # agentdesk
//!
//! agentdesk puts a chat-style HTTP API in front of a hosted LLM agent platform and wires in
//! the pieces a small assistant deployment needs around it:
//!
//! * **FAQ semantic cache**: [`faq_memory::FaqMemory`] embeds known question/answer pairs and
//!   answers near-duplicate questions directly, before any hosted agent is invoked.
//! * **Hosted agents**: [`agents_api::AgentsApi`] abstracts the remote agent service (agents,
//!   threads, messages, runs); [`clients::azure_agents::AzureAgentsClient`] implements it over
//!   the Azure AI Foundry Agents REST API, and [`hosted_agent::HostedAgent`] drives a run to
//!   completion, executing function calls through MCP plugins.
//! * **Multi-agent consensus**: [`group_chat::AgentGroupChat`] lets two agents take turns until
//!   a [`group_chat::TerminationStrategy`] decides they have converged.
//! * **Tool servers**: [`mcp_server::UnifiedMcpServer`] plus `MCPServerBuilder` (on the
//!   `server` feature) expose [`tool_protocol::ToolProtocol`] implementations over HTTP, both as
//!   plain REST routes and as JSON-RPC on `/mcp`.
//!
//! ## Checking the FAQ cache
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use agentdesk::clients::azure_openai::AzureOpenAIEmbedder;
//! use agentdesk::faq_memory::{cache_lookup, FaqMemory};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     agentdesk::init_logger();
//!
//!     let embedder = Arc::new(AzureOpenAIEmbedder::new(
//!         &std::env::var("AZURE_OPENAI_ENDPOINT")?,
//!         &std::env::var("AZURE_OPENAI_API_KEY")?,
//!         &std::env::var("EMBEDDING_DEPLOYMENT_NAME")?,
//!     ));
//!     let memory = FaqMemory::from_json_file("data/faq-qna-items.json", embedder)?;
//!
//!     if let Some(hit) = cache_lookup(&memory, "What drinks are popular?", 0.25).await? {
//!         println!("cached answer ({:.3}): {}", hit.score, hit.record.answer);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Serving a tool
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use agentdesk::mcp_server_builder::MCPServerBuilder;
//! use agentdesk::tools::LocalTimeProtocol;
//!
//! let server = MCPServerBuilder::new()
//!     .with_tool("get_local_time", Arc::new(LocalTimeProtocol::new()))
//!     .await
//!     .start_on(8087)
//!     .await?;
//! println!("listening on {}", server.get_addr());
//! ```

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// Every binary in this crate calls it first thing; `RUST_LOG` drives verbosity.
///
/// ```rust
/// agentdesk::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

pub mod agentdesk;

pub use agentdesk::agent_definitions;
pub use agentdesk::agents_api;
pub use agentdesk::agents_api::{AgentDefinition, AgentsApi, AgentsApiError, ToolDefinition};
pub use agentdesk::chat_client;
pub use agentdesk::clients;
pub use agentdesk::config;
pub use agentdesk::config::{AgentDeskConfig, ServerMode};
pub use agentdesk::embeddings;
pub use agentdesk::embeddings::EmbeddingGenerator;
pub use agentdesk::event;
pub use agentdesk::event::{ChatEvent, EventHandler, LoggingEventHandler, McpEvent};
pub use agentdesk::faq_memory;
pub use agentdesk::faq_memory::{FaqHit, FaqMemory, FaqRecord};
pub use agentdesk::faq_protocol;
pub use agentdesk::group_chat;
pub use agentdesk::group_chat::{AgentGroupChat, ConsensusTerminationStrategy, TerminationStrategy};
pub use agentdesk::hosted_agent;
pub use agentdesk::hosted_agent::{AgentReply, HostedAgent, McpPlugin};
pub use agentdesk::http_client_pool;
pub use agentdesk::mcp_server;
pub use agentdesk::tool_protocol;
pub use agentdesk::tool_protocols;
pub use agentdesk::tools;

#[cfg(feature = "server")]
pub use agentdesk::mcp_http_adapter;
#[cfg(feature = "server")]
pub use agentdesk::mcp_server_builder;
pub use agentdesk::mcp_server_builder_utils;
#[cfg(feature = "server")]
pub use agentdesk::server;
