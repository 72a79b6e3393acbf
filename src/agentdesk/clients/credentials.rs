//! Access tokens for the agent service.

use crate::agentdesk::agents_api::AgentsApiError;
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;

/// Audience of Azure AI Foundry tokens.
pub const AI_AZURE_RESOURCE: &str = "https://ai.azure.com";

/// Supplies a bearer token per request.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn token(&self) -> Result<String, AgentsApiError>;
}

/// A fixed token, e.g. from `AZURE_AI_AGENT_TOKEN`.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn token(&self) -> Result<String, AgentsApiError> {
        Ok(self.0.clone())
    }
}

/// Tokens from the signed-in Azure CLI (`az account get-access-token`).
///
/// A token is reused until five minutes before it expires.
pub struct AzureCliCredential {
    resource: String,
    cached: Mutex<Option<(String, DateTime<Utc>)>>,
}

impl AzureCliCredential {
    pub fn new() -> Self {
        Self::for_resource(AI_AZURE_RESOURCE)
    }

    pub fn for_resource(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            cached: Mutex::new(None),
        }
    }

    async fn fetch(&self) -> Result<(String, DateTime<Utc>), AgentsApiError> {
        let output = tokio::process::Command::new("az")
            .args([
                "account",
                "get-access-token",
                "--resource",
                &self.resource,
                "--output",
                "json",
            ])
            .output()
            .await
            .map_err(|e| AgentsApiError::Credential(format!("could not run az: {}", e)))?;
        if !output.status.success() {
            return Err(AgentsApiError::Credential(format!(
                "az account get-access-token failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        parse_cli_token(&output.stdout)
    }
}

impl Default for AzureCliCredential {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialProvider for AzureCliCredential {
    async fn token(&self) -> Result<String, AgentsApiError> {
        let mut cached = self.cached.lock().await;
        if let Some((token, expires_at)) = cached.as_ref() {
            if Utc::now() + chrono::Duration::minutes(5) < *expires_at {
                return Ok(token.clone());
            }
        }
        log::debug!("requesting access token for {} from Azure CLI", self.resource);
        let (token, expires_at) = self.fetch().await?;
        *cached = Some((token.clone(), expires_at));
        Ok(token)
    }
}

#[derive(Deserialize)]
struct CliToken {
    #[serde(rename = "accessToken")]
    access_token: String,
    /// Unix seconds; newer CLI versions only.
    expires_on: Option<i64>,
    /// Local time, `2025-01-01 10:00:00.000000`.
    #[serde(rename = "expiresOn")]
    expires_on_local: Option<String>,
}

/// Parse `az account get-access-token --output json`.
pub fn parse_cli_token(stdout: &[u8]) -> Result<(String, DateTime<Utc>), AgentsApiError> {
    let parsed: CliToken = serde_json::from_slice(stdout)
        .map_err(|e| AgentsApiError::Credential(format!("unreadable az output: {}", e)))?;

    let expires_at = match (parsed.expires_on, parsed.expires_on_local.as_deref()) {
        (Some(secs), _) => Utc.timestamp_opt(secs, 0).single(),
        (None, Some(local)) => NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .and_then(|naive| Local.from_local_datetime(&naive).earliest())
            .map(|t| t.with_timezone(&Utc)),
        (None, None) => None,
    }
    .ok_or_else(|| AgentsApiError::Credential("az output has no usable expiry".into()))?;

    Ok((parsed.access_token, expires_at))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token() {
        assert_eq!(StaticToken::new("abc").token().await.unwrap(), "abc");
    }

    #[test]
    fn test_parse_unix_expiry() {
        let (token, expires) = parse_cli_token(
            br#"{"accessToken":"eyJ0","expiresOn":"2030-01-01 10:00:00.000000","expires_on":1893492000,"tokenType":"Bearer"}"#,
        )
        .unwrap();
        assert_eq!(token, "eyJ0");
        assert_eq!(expires.timestamp(), 1893492000);
    }

    #[test]
    fn test_parse_local_expiry() {
        let (_, expires) =
            parse_cli_token(br#"{"accessToken":"t","expiresOn":"2030-06-01 08:30:00.123456"}"#)
                .unwrap();
        assert!(expires > Utc::now());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_cli_token(b"Please run 'az login'").is_err());
        assert!(parse_cli_token(br#"{"accessToken":"t"}"#).is_err());
    }

    #[tokio::test]
    async fn test_cached_token_is_reused() {
        let credential = AzureCliCredential::new();
        *credential.cached.lock().await = Some((
            "cached".to_string(),
            Utc::now() + chrono::Duration::hours(1),
        ));
        assert_eq!(credential.token().await.unwrap(), "cached");
    }
}
