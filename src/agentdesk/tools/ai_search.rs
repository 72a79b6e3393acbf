//! `search_documents`: a thin proxy over an Azure AI Search index.

use crate::agentdesk::http_client_pool::get_or_create_client;
use crate::agentdesk::mcp_server::McpPrompt;
use crate::agentdesk::tool_protocol::{
    required_str, ToolError, ToolMetadata, ToolParameter, ToolParameterType, ToolProtocol,
    ToolResult,
};
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use std::error::Error;

pub const SEARCH_DOCUMENTS: &str = "search_documents";
pub const SEARCH_API_VERSION: &str = "2021-04-30-Preview";

const SEARCH_DESCRIPTION: &str = "Executes a search query against the Azure AI Search index. \
The index holds PCI DSS v4.0 (Payment Card Industry Data Security Standard) requirements, \
testing procedures and guidance: the baseline of technical and operational requirements for \
protecting payment card account data.";

const SEARCH_PROMPT: &str = "This Azure AI Search service contains PCI DSS v4.0 (Payment Card \
Industry Data Security Standard) documentation and compliance guides.

You can search for information about:
- Network security requirements
- Cardholder data protection
- Vulnerability management programs
- Access control measures
- Network monitoring and testing
- Information security policies
- Requirements 1-12, their testing procedures and implementation guidance
- Customized approaches and compensating controls

Example queries:
- \"What are the network security requirements for PCI DSS?\"
- \"Multi-factor authentication requirements\"
- \"Encryption requirements for cardholder data\"
- \"Incident response requirements\"

Provide your search query about PCI DSS compliance, security controls or implementation guidance.";

/// Search service coordinates. Any empty field makes every search fail.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AiSearchConfig {
    pub endpoint: String,
    pub api_key: String,
    pub index: String,
}

impl AiSearchConfig {
    /// `AZURE_SEARCH_ENDPOINT`, `AZURE_SEARCH_API_KEY`, `AZURE_SEARCH_INDEX`; unset means empty.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).unwrap_or_default();
        Self {
            endpoint: var("AZURE_SEARCH_ENDPOINT").trim_end_matches('/').to_string(),
            api_key: var("AZURE_SEARCH_API_KEY"),
            index: var("AZURE_SEARCH_INDEX"),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.endpoint.is_empty() && !self.api_key.is_empty() && !self.index.is_empty()
    }

    pub fn search_url(&self) -> String {
        format!(
            "{}/indexes/{}/docs/search?api-version={}",
            self.endpoint, self.index, SEARCH_API_VERSION
        )
    }
}

pub struct AiSearchProtocol {
    config: AiSearchConfig,
    client: reqwest::Client,
}

impl AiSearchProtocol {
    pub fn new(config: AiSearchConfig) -> Self {
        let client = get_or_create_client(&config.endpoint);
        Self { config, client }
    }

    /// The prompt the search server advertises alongside the tool.
    pub fn search_prompt() -> McpPrompt {
        McpPrompt::new(
            "search_prompt",
            "What the search index contains and how to query it",
            SEARCH_PROMPT,
        )
    }

    async fn search(&self, query: &str) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        if !self.config.is_complete() {
            return Ok(ToolResult::failure(
                "Azure Search configuration is missing. Please set AZURE_SEARCH_ENDPOINT, \
                 AZURE_SEARCH_API_KEY, and AZURE_SEARCH_INDEX environment variables."
                    .to_string(),
            ));
        }

        log::info!("Search query: {}", query);
        let response = self
            .client
            .post(self.config.search_url())
            .header("api-key", &self.config.api_key)
            .json(&json!({ "search": query, "select": "content", "top": 5 }))
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        let status = response.status();
        log::info!("Response status code: {}", status.as_u16());
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Ok(ToolResult::failure(format!(
                "search service returned {}: {}",
                status.as_u16(),
                body
            )));
        }
        let body: JsonValue = response.json().await?;
        let hits = body["value"].as_array().map(|v| v.len()).unwrap_or(0);
        Ok(ToolResult::success(body).with_metadata("hits", json!(hits)))
    }
}

#[async_trait]
impl ToolProtocol for AiSearchProtocol {
    async fn execute(
        &self,
        tool_name: &str,
        parameters: JsonValue,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        match tool_name {
            SEARCH_DOCUMENTS => {
                let query = required_str(&parameters, "query")?;
                self.search(query).await
            }
            other => Err(Box::new(ToolError::NotFound(other.to_string()))),
        }
    }

    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>> {
        Ok(vec![ToolMetadata::new(SEARCH_DOCUMENTS, SEARCH_DESCRIPTION)
            .with_parameter(
                ToolParameter::new("query", ToolParameterType::String)
                    .with_description("Full-text search query")
                    .required(),
            )])
    }

    fn protocol_name(&self) -> &str {
        "azure-ai-search"
    }
}
