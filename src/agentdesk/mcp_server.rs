//! Unified MCP Server
//!
//! Aggregates tools (and the prompts a server advertises) behind one [`ToolProtocol`], routing
//! each call by tool name. This is what the HTTP adapter serves.
//!
//! ```text
//! LocalTimeProtocol / AiSearchProtocol / SqlQueryProtocol
//!         ↓
//! UnifiedMcpServer (implements ToolProtocol, carries prompts)
//!         ↓
//! HTTP endpoints (POST /tools/list, POST /tools/execute, POST /mcp)
//!         ↓
//! McpClientProtocol inside a hosted agent's plugin
//! ```

use crate::agentdesk::tool_protocol::{ToolError, ToolMetadata, ToolProtocol, ToolResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A named prompt template a server advertises through `prompts/list` and `prompts/get`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct McpPrompt {
    pub name: String,
    pub description: String,
    pub text: String,
}

impl McpPrompt {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            text: text.into(),
        }
    }
}

/// Tool router shared by every request of an MCP server.
///
/// Cloning is cheap; clones share the same registrations.
#[derive(Clone, Default)]
pub struct UnifiedMcpServer {
    tools: Arc<RwLock<HashMap<String, Arc<dyn ToolProtocol>>>>,
    prompts: Arc<RwLock<Vec<McpPrompt>>>,
}

impl UnifiedMcpServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `tool_name` to `protocol`.
    pub async fn register_tool(&self, tool_name: &str, protocol: Arc<dyn ToolProtocol>) {
        self.tools
            .write()
            .await
            .insert(tool_name.to_string(), protocol);
    }

    /// Route every tool `protocol` lists to it; returns the registered names.
    pub async fn register_protocol(
        &self,
        protocol: Arc<dyn ToolProtocol>,
    ) -> Result<Vec<String>, Box<dyn Error + Send + Sync>> {
        let names: Vec<String> = protocol
            .list_tools()
            .await?
            .into_iter()
            .map(|t| t.name)
            .collect();
        let mut tools = self.tools.write().await;
        for name in &names {
            tools.insert(name.clone(), protocol.clone());
        }
        Ok(names)
    }

    pub async fn unregister_tool(&self, tool_name: &str) {
        self.tools.write().await.remove(tool_name);
    }

    pub async fn has_tool(&self, tool_name: &str) -> bool {
        self.tools.read().await.contains_key(tool_name)
    }

    pub async fn tool_count(&self) -> usize {
        self.tools.read().await.len()
    }

    /// Add or replace a prompt by name.
    pub async fn add_prompt(&self, prompt: McpPrompt) {
        let mut prompts = self.prompts.write().await;
        prompts.retain(|p| p.name != prompt.name);
        prompts.push(prompt);
    }

    pub async fn list_prompts(&self) -> Vec<McpPrompt> {
        self.prompts.read().await.clone()
    }

    pub async fn get_prompt(&self, name: &str) -> Option<McpPrompt> {
        self.prompts
            .read()
            .await
            .iter()
            .find(|p| p.name == name)
            .cloned()
    }
}

#[async_trait]
impl ToolProtocol for UnifiedMcpServer {
    async fn execute(
        &self,
        tool_name: &str,
        parameters: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let protocol = self.tools.read().await.get(tool_name).cloned();
        match protocol {
            Some(protocol) => protocol.execute(tool_name, parameters).await,
            None => Err(Box::new(ToolError::NotFound(tool_name.to_string()))),
        }
    }

    /// Metadata of every registered tool name, sorted by name.
    ///
    /// A protocol registered under several names is asked once.
    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>> {
        let routes: Vec<(String, Arc<dyn ToolProtocol>)> = self
            .tools
            .read()
            .await
            .iter()
            .map(|(name, p)| (name.clone(), p.clone()))
            .collect();

        let mut listed: Vec<(Arc<dyn ToolProtocol>, Vec<ToolMetadata>)> = Vec::new();
        let mut all = Vec::new();
        for (name, protocol) in routes {
            let cached = listed
                .iter()
                .find(|(p, _)| Arc::ptr_eq(p, &protocol))
                .map(|(_, tools)| tools.clone());
            let tools = match cached {
                Some(tools) => tools,
                None => match protocol.list_tools().await {
                    Ok(tools) => {
                        listed.push((protocol.clone(), tools.clone()));
                        tools
                    }
                    Err(e) => {
                        log::warn!("listing tools for '{}' failed: {}", name, e);
                        continue;
                    }
                },
            };
            match tools.into_iter().find(|t| t.name == name) {
                Some(meta) => all.push(meta),
                None => all.push(ToolMetadata::new(name, "")),
            }
        }
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    fn protocol_name(&self) -> &str {
        "unified-mcp-server"
    }
}
