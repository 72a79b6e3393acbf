//! Azure OpenAI embeddings.

use crate::agentdesk::config::EmbeddingConfig;
use crate::agentdesk::embeddings::EmbeddingGenerator;
use crate::agentdesk::http_client_pool::get_or_create_client;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::error::Error;

pub const DEFAULT_EMBEDDINGS_API_VERSION: &str = "2023-05-15";

/// Inputs per request.
const BATCH_SIZE: usize = 64;

/// Calls `{endpoint}/openai/deployments/{deployment}/embeddings`.
pub struct AzureOpenAIEmbedder {
    endpoint: String,
    api_key: String,
    deployment: String,
    api_version: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

impl AzureOpenAIEmbedder {
    pub fn new(endpoint: &str, api_key: &str, deployment: &str) -> Self {
        let endpoint = endpoint.trim_end_matches('/').to_string();
        Self {
            client: get_or_create_client(&endpoint),
            endpoint,
            api_key: api_key.to_string(),
            deployment: deployment.to_string(),
            api_version: DEFAULT_EMBEDDINGS_API_VERSION.to_string(),
        }
    }

    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self::new(&config.endpoint, &config.api_key, &config.deployment)
            .with_api_version(&config.api_version)
    }

    pub fn with_api_version(mut self, api_version: &str) -> Self {
        self.api_version = api_version.to_string();
        self
    }

    pub fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/embeddings?api-version={}",
            self.endpoint, self.deployment, self.api_version
        )
    }

    async fn embed_batch(
        &self,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, Box<dyn Error + Send + Sync>> {
        let response = self
            .client
            .post(self.url())
            .header("api-key", &self.api_key)
            .json(&json!({ "input": texts }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("embedding request failed with {}: {}", status, body);
            return Err(format!("embedding service returned {}: {}", status, body).into());
        }

        let mut parsed: EmbeddingResponse = response.json().await?;
        if parsed.data.len() != texts.len() {
            return Err(format!(
                "embedding service returned {} vectors for {} inputs",
                parsed.data.len(),
                texts.len()
            )
            .into());
        }
        parsed.data.sort_by_key(|item| item.index);
        Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingGenerator for AzureOpenAIEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, Box<dyn Error + Send + Sync>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(BATCH_SIZE) {
            vectors.extend(self.embed_batch(chunk).await?);
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url() {
        let embedder = AzureOpenAIEmbedder::new(
            "https://example.openai.azure.com/",
            "key",
            "text-embedding-3-small",
        );
        assert_eq!(
            embedder.url(),
            "https://example.openai.azure.com/openai/deployments/text-embedding-3-small/embeddings?api-version=2023-05-15"
        );
        assert!(embedder
            .with_api_version("2024-02-01")
            .url()
            .ends_with("api-version=2024-02-01"));
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_request() {
        let embedder = AzureOpenAIEmbedder::new("http://127.0.0.1:9", "key", "d");
        assert!(embedder.embed(&[]).await.unwrap().is_empty());
    }
}
