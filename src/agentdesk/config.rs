//! Environment configuration for the agentdesk binaries.
//!
//! Everything is read from process environment variables, optionally seeded from a `.env`
//! file via [`load_dotenv`].
//!
//! ```rust,no_run
//! use agentdesk::config::{load_dotenv, AgentDeskConfig};
//!
//! load_dotenv();
//! let config = AgentDeskConfig::from_env().expect("configuration");
//! println!("serving {:?} mode on {}", config.mode, config.bind_addr());
//! ```

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Load `.env` from the working directory (or a parent) into the environment.
///
/// A missing file is normal in deployed environments and is only logged.
pub fn load_dotenv() {
    match dotenv::dotenv() {
        Ok(path) => log::debug!("loaded environment from {}", path.display()),
        Err(e) => log::debug!("no .env file loaded: {}", e),
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    Missing(String),
    /// A variable is set but cannot be parsed.
    Invalid { name: String, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(name) => write!(f, "missing required setting {}", name),
            ConfigError::Invalid { name, value } => {
                write!(f, "invalid value for {}: '{}'", name, value)
            }
        }
    }
}

impl Error for ConfigError {}

/// Which chat flow `POST /chat` runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerMode {
    /// One hosted agent with MCP plugins and the code interpreter.
    #[default]
    Mcp,
    /// FAQ cache, then one hosted agent grounded on Azure AI Search.
    Rag,
    /// FAQ cache, then a knowledge agent and a system agent in a group chat.
    Group,
}

impl FromStr for ServerMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mcp" => Ok(ServerMode::Mcp),
            "rag" => Ok(ServerMode::Rag),
            "group" => Ok(ServerMode::Group),
            _ => Err(ConfigError::Invalid {
                name: "AGENTDESK_MODE".into(),
                value: s.to_string(),
            }),
        }
    }
}

impl ServerMode {
    /// Whether requests consult the FAQ memory before invoking agents.
    pub fn uses_faq_cache(&self) -> bool {
        matches!(self, ServerMode::Rag | ServerMode::Group)
    }
}

/// A remote MCP tool server a hosted agent may call.
#[derive(Debug, Clone, PartialEq)]
pub struct McpPluginConfig {
    /// Function-name prefix; letters, digits and `_` only.
    pub name: String,
    pub description: String,
    pub url: String,
}

impl McpPluginConfig {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            url: url.into(),
        }
    }

    /// Weather (:8086), GetSystemLocalTime (:8087) and SystemLogRepository (:8089).
    pub fn defaults() -> Vec<McpPluginConfig> {
        vec![
            McpPluginConfig::new(
                "Weather",
                "Get current weather information",
                "http://localhost:8086/mcp",
            ),
            McpPluginConfig::new(
                "GetSystemLocalTime",
                "System local time plugin for retrieving current system time",
                "http://localhost:8087/mcp",
            ),
            McpPluginConfig::new(
                "SystemLogRepository",
                "System log repository for monitoring and debugging",
                "http://localhost:8089/mcp",
            ),
        ]
    }

    /// Parse `name|description|url;name|description|url`.
    ///
    /// Blank entries are skipped. An entry without exactly three fields, an empty name or url,
    /// or a name with characters other than ASCII letters, digits and `_` is rejected.
    pub fn parse_list(raw: &str) -> Result<Vec<McpPluginConfig>, ConfigError> {
        let invalid = |entry: &str| ConfigError::Invalid {
            name: "AGENTDESK_MCP_PLUGINS".into(),
            value: entry.to_string(),
        };
        let mut plugins = Vec::new();
        for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let fields: Vec<&str> = entry.split('|').map(str::trim).collect();
            let [name, description, url] = fields[..] else {
                return Err(invalid(entry));
            };
            let name_ok = !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !name_ok || url.is_empty() {
                return Err(invalid(entry));
            }
            plugins.push(McpPluginConfig::new(name, description, url));
        }
        Ok(plugins)
    }
}

/// Embedding service settings (Azure OpenAI).
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    pub api_version: String,
}

/// Backend configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentDeskConfig {
    /// Azure AI Foundry project endpoint.
    pub agent_endpoint: String,
    pub model_deployment: String,
    pub api_version: String,
    /// Static bearer token; when absent tokens come from the Azure CLI.
    pub agent_token: Option<String>,
    /// Index the Azure AI Search tool is bound to.
    pub search_index: Option<String>,
    /// Required by the modes that use the FAQ cache.
    pub embeddings: Option<EmbeddingConfig>,
    pub faq_data_path: PathBuf,
    pub mode: ServerMode,
    pub host: String,
    pub port: u16,
    pub mcp_plugins: Vec<McpPluginConfig>,
    /// Strict upper bound on cosine distance for a cache hit.
    pub cache_threshold: f32,
    /// Group chat turn cap, per agent.
    pub max_iterations: usize,
}

impl Default for AgentDeskConfig {
    fn default() -> Self {
        Self {
            agent_endpoint: String::new(),
            model_deployment: "gpt-4.1".to_string(),
            api_version: "2025-05-01".to_string(),
            agent_token: None,
            search_index: None,
            embeddings: None,
            faq_data_path: PathBuf::from("data/faq-qna-items.json"),
            mode: ServerMode::Mcp,
            host: "0.0.0.0".to_string(),
            port: 8091,
            mcp_plugins: McpPluginConfig::defaults(),
            cache_threshold: 0.25,
            max_iterations: 5,
        }
    }
}

impl AgentDeskConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from a map instead of the environment.
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|name| vars.get(name).cloned())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let first = |names: &[&str]| names.iter().find_map(|n| get(n));
        let defaults = Self::default();

        let agent_endpoint = first(&["AZURE_AI_AGENT_ENDPOINT", "PROJECT_ENDPOINT"])
            .ok_or_else(|| ConfigError::Missing("AZURE_AI_AGENT_ENDPOINT".into()))?
            .trim_end_matches('/')
            .to_string();

        let mode = match get("AGENTDESK_MODE") {
            Some(raw) => raw.parse()?,
            None => defaults.mode,
        };

        let embeddings = match (
            get("AZURE_OPENAI_ENDPOINT"),
            get("AZURE_OPENAI_API_KEY"),
            get("EMBEDDING_DEPLOYMENT_NAME"),
        ) {
            (Some(endpoint), Some(api_key), Some(deployment)) => Some(EmbeddingConfig {
                endpoint: endpoint.trim_end_matches('/').to_string(),
                api_key,
                deployment,
                api_version: get("AZURE_OPENAI_API_VERSION")
                    .unwrap_or_else(|| "2023-05-15".to_string()),
            }),
            (endpoint, api_key, _) if mode.uses_faq_cache() => {
                let missing = if endpoint.is_none() {
                    "AZURE_OPENAI_ENDPOINT"
                } else if api_key.is_none() {
                    "AZURE_OPENAI_API_KEY"
                } else {
                    "EMBEDDING_DEPLOYMENT_NAME"
                };
                return Err(ConfigError::Missing(missing.into()));
            }
            _ => None,
        };

        let mcp_plugins = match get("AGENTDESK_MCP_PLUGINS") {
            Some(raw) => McpPluginConfig::parse_list(&raw)?,
            None => defaults.mcp_plugins,
        };

        Ok(Self {
            agent_endpoint,
            model_deployment: first(&[
                "AZURE_AI_AGENT_MODEL_DEPLOYMENT_NAME",
                "MODEL_DEPLOYMENT_NAME",
            ])
            .unwrap_or(defaults.model_deployment),
            api_version: get("AZURE_AI_AGENT_API_VERSION").unwrap_or(defaults.api_version),
            agent_token: get("AZURE_AI_AGENT_TOKEN"),
            search_index: get("AZURE_SEARCH_INDEX"),
            embeddings,
            faq_data_path: get("FAQ_DATA_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.faq_data_path),
            mode,
            host: get("AGENTDESK_HOST").unwrap_or(defaults.host),
            port: parse_or("AGENTDESK_PORT", get("AGENTDESK_PORT"), defaults.port)?,
            mcp_plugins,
            cache_threshold: parse_or(
                "AGENTDESK_CACHE_THRESHOLD",
                get("AGENTDESK_CACHE_THRESHOLD"),
                defaults.cache_threshold,
            )?,
            max_iterations: parse_or(
                "AGENTDESK_MAX_ITERATIONS",
                get("AGENTDESK_MAX_ITERATIONS"),
                defaults.max_iterations,
            )?,
        })
    }

    /// `host:port` to bind the backend on.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: FromStr>(name: &str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            name: name.to_string(),
            value,
        }),
    }
}

/// Port from an optional command-line argument, e.g. `localtime-mcp 9087`.
pub fn port_arg(arg: Option<String>, default: u16) -> Result<u16, ConfigError> {
    parse_or("port", arg, default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_minimal_mcp_config_uses_defaults() {
        let config = AgentDeskConfig::from_map(&vars(&[(
            "PROJECT_ENDPOINT",
            "https://acct.services.ai.azure.com/api/projects/demo/",
        )]))
        .unwrap();
        assert_eq!(
            config.agent_endpoint,
            "https://acct.services.ai.azure.com/api/projects/demo"
        );
        assert_eq!(config.model_deployment, "gpt-4.1");
        assert_eq!(config.mode, ServerMode::Mcp);
        assert_eq!(config.bind_addr(), "0.0.0.0:8091");
        assert_eq!(config.mcp_plugins.len(), 3);
        assert_eq!(config.cache_threshold, 0.25);
        assert!(config.embeddings.is_none());
    }

    #[test]
    fn test_missing_endpoint() {
        assert_eq!(
            AgentDeskConfig::from_map(&HashMap::new()),
            Err(ConfigError::Missing("AZURE_AI_AGENT_ENDPOINT".into()))
        );
    }

    #[test]
    fn test_rag_mode_requires_embeddings() {
        let err = AgentDeskConfig::from_map(&vars(&[
            ("AZURE_AI_AGENT_ENDPOINT", "https://x"),
            ("AGENTDESK_MODE", "RAG"),
            ("AZURE_OPENAI_ENDPOINT", "https://aoai"),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing("AZURE_OPENAI_API_KEY".into()));

        let config = AgentDeskConfig::from_map(&vars(&[
            ("AZURE_AI_AGENT_ENDPOINT", "https://x"),
            ("AGENTDESK_MODE", "group"),
            ("AZURE_OPENAI_ENDPOINT", "https://aoai/"),
            ("AZURE_OPENAI_API_KEY", "k"),
            ("EMBEDDING_DEPLOYMENT_NAME", "text-embedding-3-small"),
            ("AGENTDESK_MAX_ITERATIONS", "3"),
        ]))
        .unwrap();
        assert_eq!(config.mode, ServerMode::Group);
        assert_eq!(config.max_iterations, 3);
        let embeddings = config.embeddings.unwrap();
        assert_eq!(embeddings.endpoint, "https://aoai");
        assert_eq!(embeddings.api_version, "2023-05-15");
    }

    #[test]
    fn test_invalid_numbers_are_reported() {
        let err = AgentDeskConfig::from_map(&vars(&[
            ("AZURE_AI_AGENT_ENDPOINT", "https://x"),
            ("AGENTDESK_PORT", "eighty"),
        ]))
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                name: "AGENTDESK_PORT".into(),
                value: "eighty".into()
            }
        );
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Group".parse::<ServerMode>().unwrap(), ServerMode::Group);
        assert!("semantic".parse::<ServerMode>().is_err());
        assert!(!ServerMode::Mcp.uses_faq_cache());
    }

    #[test]
    fn test_plugin_list_parsing() {
        let plugins = McpPluginConfig::parse_list(
            "Clock|Local time|http://localhost:9001/mcp; ;Logs|Log search|http://localhost:9002",
        )
        .unwrap();
        assert_eq!(plugins.len(), 2);
        assert_eq!(plugins[1].name, "Logs");
        assert_eq!(plugins[1].url, "http://localhost:9002");

        assert!(McpPluginConfig::parse_list("Clock|http://x").is_err());
        assert!(McpPluginConfig::parse_list("Bad-Name|d|http://x").is_err());
        assert!(McpPluginConfig::parse_list("Clock|d|").is_err());
    }

    #[test]
    fn test_port_arg() {
        assert_eq!(port_arg(None, 8087).unwrap(), 8087);
        assert_eq!(port_arg(Some("9000".into()), 8087).unwrap(), 9000);
        assert!(port_arg(Some("70000".into()), 8087).is_err());
    }
}
