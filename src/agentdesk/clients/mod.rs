//! Clients for the remote services agentdesk depends on.
//!
//! - [`azure_agents`]: Azure AI Foundry Agents REST API ([`AgentsApi`](crate::agents_api::AgentsApi))
//! - [`azure_openai`]: Azure OpenAI embeddings ([`EmbeddingGenerator`](crate::embeddings::EmbeddingGenerator))
//! - [`credentials`]: bearer tokens for the agent service

pub mod azure_agents;
pub mod azure_openai;
pub mod credentials;
