// src/agentdesk/mod.rs

pub mod agent_definitions;
pub mod agents_api;
pub mod chat_client;
pub mod clients;
pub mod config;
pub mod embeddings;
pub mod event;
pub mod faq_memory;
pub mod faq_protocol;
pub mod group_chat;
pub mod hosted_agent;
pub mod http_client_pool;
pub mod mcp_server;
pub mod mcp_server_builder_utils;
pub mod tool_protocol;
pub mod tool_protocols;
pub mod tools;

#[cfg(feature = "server")]
pub mod mcp_http_adapter;
#[cfg(feature = "server")]
pub mod mcp_server_builder;
#[cfg(feature = "server")]
pub mod server;
