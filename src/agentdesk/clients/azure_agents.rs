//! Azure AI Foundry Agents REST client.

use crate::agentdesk::agents_api::{
    AgentDefinition, AgentInfo, AgentsApi, AgentsApiError, Connection, Run, ToolDefinition,
    ToolOutput,
};
use crate::agentdesk::clients::credentials::CredentialProvider;
use crate::agentdesk::http_client_pool::get_or_create_client;
use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

pub struct AzureAgentsClient {
    endpoint: String,
    api_version: String,
    credential: Arc<dyn CredentialProvider>,
    headers: Vec<(String, String)>,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct Created {
    id: String,
}

#[derive(Deserialize)]
struct ConnectionList {
    #[serde(default)]
    value: Vec<Connection>,
}

impl AzureAgentsClient {
    /// `endpoint` is the project endpoint, e.g.
    /// `https://<resource>.services.ai.azure.com/api/projects/<project>`.
    pub fn new(
        endpoint: &str,
        api_version: &str,
        credential: Arc<dyn CredentialProvider>,
    ) -> Self {
        let endpoint = endpoint.trim_end_matches('/').to_string();
        Self {
            client: get_or_create_client(&endpoint),
            endpoint,
            api_version: api_version.to_string(),
            credential,
            headers: Vec::new(),
        }
    }

    /// Send `name: value` on every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<JsonValue>,
    ) -> Result<T, AgentsApiError> {
        let token = self.credential.token().await?;
        let mut request = self
            .client
            .request(method.clone(), format!("{}/{}", self.endpoint, path))
            .query(&[("api-version", self.api_version.as_str())])
            .query(query)
            .bearer_auth(token);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AgentsApiError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AgentsApiError::Transport(e.to_string()))?;
        if !status.is_success() {
            log::warn!("{} {} returned {}", method, path, status);
            return Err(AgentsApiError::Http {
                status: status.as_u16(),
                body: text,
            });
        }
        serde_json::from_str(&text)
            .map_err(|e| AgentsApiError::Decode(format!("{} {}: {}", method, path, e)))
    }
}

/// Text of the newest assistant message of `run_id` in a `GET /threads/{id}/messages` reply.
pub fn assistant_text(messages: &JsonValue, run_id: &str) -> Option<String> {
    messages["data"]
        .as_array()?
        .iter()
        .filter(|m| m["role"] == "assistant")
        .find(|m| m["run_id"].as_str().map_or(true, |r| r == run_id))
        .map(|m| {
            m["content"]
                .as_array()
                .map(|parts| {
                    parts
                        .iter()
                        .filter_map(|p| p["text"]["value"].as_str())
                        .collect::<Vec<_>>()
                        .join("\n")
                })
                .unwrap_or_default()
        })
}

#[async_trait]
impl AgentsApi for AzureAgentsClient {
    async fn create_agent(&self, definition: &AgentDefinition) -> Result<AgentInfo, AgentsApiError> {
        let body = serde_json::to_value(definition)
            .map_err(|e| AgentsApiError::Decode(e.to_string()))?;
        let agent: AgentInfo = self
            .call(Method::POST, "assistants", &[], Some(body))
            .await?;
        log::info!("created agent {} ({})", definition.name, agent.id);
        Ok(agent)
    }

    async fn get_agent(&self, agent_id: &str) -> Result<AgentInfo, AgentsApiError> {
        self.call(Method::GET, &format!("assistants/{}", agent_id), &[], None)
            .await
    }

    async fn delete_agent(&self, agent_id: &str) -> Result<(), AgentsApiError> {
        let _: JsonValue = self
            .call(Method::DELETE, &format!("assistants/{}", agent_id), &[], None)
            .await?;
        log::info!("deleted agent {}", agent_id);
        Ok(())
    }

    async fn create_thread(&self) -> Result<String, AgentsApiError> {
        let created: Created = self
            .call(Method::POST, "threads", &[], Some(json!({})))
            .await?;
        Ok(created.id)
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<(), AgentsApiError> {
        let _: JsonValue = self
            .call(Method::DELETE, &format!("threads/{}", thread_id), &[], None)
            .await?;
        log::info!("deleted thread {}", thread_id);
        Ok(())
    }

    async fn create_message(
        &self,
        thread_id: &str,
        role: &str,
        content: &str,
    ) -> Result<(), AgentsApiError> {
        let _: JsonValue = self
            .call(
                Method::POST,
                &format!("threads/{}/messages", thread_id),
                &[],
                Some(json!({ "role": role, "content": content })),
            )
            .await?;
        Ok(())
    }

    async fn create_run(
        &self,
        thread_id: &str,
        agent_id: &str,
        tools: &[ToolDefinition],
    ) -> Result<Run, AgentsApiError> {
        let mut body = json!({ "assistant_id": agent_id });
        if !tools.is_empty() {
            body["tools"] =
                serde_json::to_value(tools).map_err(|e| AgentsApiError::Decode(e.to_string()))?;
        }
        self.call(
            Method::POST,
            &format!("threads/{}/runs", thread_id),
            &[],
            Some(body),
        )
        .await
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AgentsApiError> {
        self.call(
            Method::GET,
            &format!("threads/{}/runs/{}", thread_id, run_id),
            &[],
            None,
        )
        .await
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run, AgentsApiError> {
        self.call(
            Method::POST,
            &format!("threads/{}/runs/{}/submit_tool_outputs", thread_id, run_id),
            &[],
            Some(json!({ "tool_outputs": outputs })),
        )
        .await
    }

    async fn latest_assistant_text(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<String, AgentsApiError> {
        let messages: JsonValue = self
            .call(
                Method::GET,
                &format!("threads/{}/messages", thread_id),
                &[("order", "desc"), ("limit", "20"), ("run_id", run_id)],
                None,
            )
            .await?;
        assistant_text(&messages, run_id).ok_or_else(|| {
            AgentsApiError::Decode(format!("run {} produced no assistant message", run_id))
        })
    }

    async fn list_connections(&self) -> Result<Vec<Connection>, AgentsApiError> {
        let list: ConnectionList = self.call(Method::GET, "connections", &[], None).await?;
        Ok(list.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assistant_text_picks_newest_of_run() {
        let messages = json!({
            "data": [
                {"role": "assistant", "run_id": "run_2", "content": [
                    {"type": "text", "text": {"value": "It is 10:00."}},
                    {"type": "text", "text": {"value": "Anything else?"}}
                ]},
                {"role": "user", "run_id": null, "content": [
                    {"type": "text", "text": {"value": "What time is it?"}}
                ]},
                {"role": "assistant", "run_id": "run_1", "content": [
                    {"type": "text", "text": {"value": "Hello"}}
                ]}
            ]
        });
        assert_eq!(
            assistant_text(&messages, "run_2").unwrap(),
            "It is 10:00.\nAnything else?"
        );
        assert_eq!(assistant_text(&messages, "run_1").unwrap(), "Hello");
        assert!(assistant_text(&json!({"data": []}), "run_1").is_none());
    }

    #[test]
    fn test_with_header_and_endpoint() {
        let client = AzureAgentsClient::new(
            "https://x.services.ai.azure.com/api/projects/p/",
            "2025-05-01",
            Arc::new(crate::agentdesk::clients::credentials::StaticToken::new("t")),
        )
        .with_header("x-ms-enable-preview", "true");
        assert_eq!(client.endpoint(), "https://x.services.ai.azure.com/api/projects/p");
        assert_eq!(client.headers.len(), 1);
    }
}
