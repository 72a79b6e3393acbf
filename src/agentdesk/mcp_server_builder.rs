//! MCP Server Builder
//!
//! Fluent setup for the standalone tool servers: register tools and prompts, restrict who may
//! connect, then bind.
//!
//! ```rust,ignore
//! use agentdesk::mcp_server_builder::MCPServerBuilder;
//! use agentdesk::tools::SqlQueryProtocol;
//! use std::sync::Arc;
//!
//! let sql = Arc::new(SqlQueryProtocol::open("data/logs.db")?);
//! let server = MCPServerBuilder::new()
//!     .with_name("SystemLogRepository")
//!     .with_protocol(sql)
//!     .await?
//!     .allow_localhost_only()
//!     .with_bearer_token("my-secret-token")
//!     .start_on(8089)
//!     .await?;
//! server.wait().await?;
//! ```

use crate::agentdesk::event::EventHandler;
use crate::agentdesk::mcp_http_adapter::{
    AxumHttpAdapter, HttpServerAdapter, HttpServerConfig, HttpServerInstance,
};
use crate::agentdesk::mcp_server::{McpPrompt, UnifiedMcpServer};
use crate::agentdesk::mcp_server_builder_utils::{AuthConfig, IpFilter};
use crate::agentdesk::tool_protocol::ToolProtocol;
use std::error::Error;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

/// Builder for MCP tool servers.
///
/// Defaults: no tools, every client allowed, no authentication, axum adapter, bound on all
/// interfaces.
pub struct MCPServerBuilder {
    server: UnifiedMcpServer,
    name: String,
    ip_filter: IpFilter,
    auth: AuthConfig,
    adapter: Arc<dyn HttpServerAdapter>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl MCPServerBuilder {
    pub fn new() -> Self {
        Self {
            server: UnifiedMcpServer::new(),
            name: "agentdesk-mcp".to_string(),
            ip_filter: IpFilter::new(),
            auth: AuthConfig::None,
            adapter: Arc::new(AxumHttpAdapter),
            event_handler: None,
        }
    }

    /// Name reported to JSON-RPC clients in `initialize`.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Serve `tool_name` with `protocol`.
    pub async fn with_tool(self, tool_name: &str, protocol: Arc<dyn ToolProtocol>) -> Self {
        self.server.register_tool(tool_name, protocol).await;
        self
    }

    /// Serve every tool `protocol` lists.
    pub async fn with_protocol(
        self,
        protocol: Arc<dyn ToolProtocol>,
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let names = self.server.register_protocol(protocol).await?;
        log::debug!("{}: registered tools {:?}", self.name, names);
        Ok(self)
    }

    pub async fn with_prompt(self, prompt: McpPrompt) -> Self {
        self.server.add_prompt(prompt).await;
        self
    }

    /// Require `Authorization: Bearer <token>`.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.auth = AuthConfig::bearer(token);
        self
    }

    /// Require `Authorization: Basic <base64(username:password)>`.
    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.auth = AuthConfig::basic(username, password);
        self
    }

    /// Allow a specific IP address (`127.0.0.1`, `::1`).
    pub fn allow_ip(mut self, ip: &str) -> Result<Self, String> {
        if ip.contains('/') {
            return Err(format!("'{}' is a CIDR block; use allow_cidr", ip));
        }
        self.ip_filter.allow(ip)?;
        Ok(self)
    }

    /// Allow a CIDR block (`192.168.1.0/24`, `2001:db8::/32`).
    pub fn allow_cidr(mut self, cidr: &str) -> Result<Self, String> {
        if !cidr.contains('/') {
            return Err(format!("'{}' is not a CIDR block", cidr));
        }
        self.ip_filter.allow(cidr)?;
        Ok(self)
    }

    /// Allow only 127.0.0.1 and ::1.
    pub fn allow_localhost_only(mut self) -> Self {
        for loopback in ["127.0.0.1", "::1"] {
            if let Err(e) = self.ip_filter.allow(loopback) {
                log::error!("loopback rule rejected: {}", e);
            }
        }
        self
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn HttpServerAdapter>) -> Self {
        self.adapter = adapter;
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// The router being configured; useful to inspect registrations before starting.
    pub fn server(&self) -> &UnifiedMcpServer {
        &self.server
    }

    /// Start on `0.0.0.0:port`; port 0 picks a free port.
    pub async fn start_on(
        self,
        port: u16,
    ) -> Result<HttpServerInstance, Box<dyn Error + Send + Sync>> {
        self.start_at(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port))
            .await
    }

    pub async fn start_at(
        self,
        addr: SocketAddr,
    ) -> Result<HttpServerInstance, Box<dyn Error + Send + Sync>> {
        let config = HttpServerConfig {
            addr,
            server_name: self.name,
            auth: self.auth,
            ip_filter: self.ip_filter,
            event_handler: self.event_handler,
        };
        log::info!(
            "starting MCP server '{}' on {} ({} adapter)",
            config.server_name,
            addr,
            self.adapter.name()
        );
        self.adapter.start(config, self.server).await
    }
}

impl Default for MCPServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agentdesk::tool_protocol::{ToolMetadata, ToolResult};
    use crate::agentdesk::tool_protocols::CustomToolProtocol;
    use serde_json::json;

    #[test]
    fn test_ip_and_cidr_are_not_interchangeable() {
        assert!(MCPServerBuilder::new().allow_ip("10.0.0.0/8").is_err());
        assert!(MCPServerBuilder::new().allow_cidr("10.0.0.1").is_err());
        assert!(MCPServerBuilder::new()
            .allow_ip("10.0.0.1")
            .and_then(|b| b.allow_cidr("192.168.0.0/16"))
            .is_ok());
    }

    #[tokio::test]
    async fn test_builder_registers_and_serves() {
        let tools = Arc::new(CustomToolProtocol::new());
        tools
            .register_tool(
                ToolMetadata::new("answer", "The answer"),
                Arc::new(|_| Ok(ToolResult::success(json!(42)))),
            )
            .await;

        let builder = MCPServerBuilder::new()
            .with_name("builder-test")
            .with_protocol(tools)
            .await
            .unwrap()
            .allow_localhost_only();
        assert!(builder.server().has_tool("answer").await);

        let instance = builder
            .start_at("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let body: serde_json::Value = reqwest::Client::new()
            .post(format!("http://{}/tools/execute", instance.get_addr()))
            .json(&json!({"tool": "answer", "parameters": {}}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["result"]["output"], 42);
        instance.shutdown().await.unwrap();
    }
}
