//! Tool Protocol Abstraction Layer
//!
//! Every callable function in agentdesk (the local time tool, the search proxy, the SQL proxy,
//! the FAQ plugin, and remote MCP servers seen from the client side) implements
//! [`ToolProtocol`]. The same trait object is served over HTTP by the MCP server and consumed
//! by hosted agents through a [`ToolRegistry`].
//!
//! # Architecture
//!
//! ```text
//! HostedAgent → ToolRegistry ("{plugin}-{tool}") → ToolProtocol (trait) → [MCP client | local]
//! ```
//!
//! # Example
//!
//! ```rust
//! use agentdesk::tool_protocol::{ToolMetadata, ToolParameter, ToolParameterType};
//!
//! let meta = ToolMetadata::new("search_documents", "Search the document index")
//!     .with_parameter(
//!         ToolParameter::new("query", ToolParameterType::String)
//!             .with_description("Free text query")
//!             .required(),
//!     );
//! let schema = meta.to_json_schema();
//! assert_eq!(schema["required"][0], "query");
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Represents the result of a tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool execution was successful
    pub success: bool,
    /// The output data from the tool
    pub output: JsonValue,
    /// Optional error message if execution failed
    pub error: Option<String>,
    /// Metadata about the execution (timing, row counts, etc.)
    #[serde(default)]
    pub metadata: HashMap<String, JsonValue>,
}

impl ToolResult {
    /// Convenience constructor for successful tool execution.
    pub fn success(output: JsonValue) -> Self {
        Self {
            success: true,
            output,
            error: None,
            metadata: HashMap::new(),
        }
    }

    /// Convenience constructor for failed tool execution.
    pub fn failure(error: String) -> Self {
        Self {
            success: false,
            output: JsonValue::Null,
            error: Some(error),
            metadata: HashMap::new(),
        }
    }

    /// Attach application specific metadata to the result.
    pub fn with_metadata(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Render the result as the text handed back to an LLM as a tool output.
    ///
    /// Strings are passed through untouched, other JSON is serialized, failures become
    /// `Error: ...`.
    pub fn to_output_text(&self) -> String {
        if !self.success {
            return format!(
                "Error: {}",
                self.error.as_deref().unwrap_or("unknown tool error")
            );
        }
        match &self.output {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Defines the type of a tool parameter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ToolParameterType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl ToolParameterType {
    fn schema_name(&self) -> &'static str {
        match self {
            ToolParameterType::String => "string",
            ToolParameterType::Number => "number",
            ToolParameterType::Integer => "integer",
            ToolParameterType::Boolean => "boolean",
            ToolParameterType::Array => "array",
            ToolParameterType::Object => "object",
        }
    }
}

/// Defines a parameter for a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ToolParameterType,
    pub description: Option<String>,
    pub required: bool,
    pub default: Option<JsonValue>,
    /// For array types, specifies the type of items
    pub items: Option<Box<ToolParameterType>>,
}

impl ToolParameter {
    /// Define a new tool parameter with the provided name and type.
    pub fn new(name: impl Into<String>, param_type: ToolParameterType) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: None,
            required: false,
            default: None,
            items: None,
        }
    }

    /// Add a human readable description that will surface in generated schemas.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark the argument as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Provide a default value that will be used when the caller omits the parameter.
    pub fn with_default(mut self, default: JsonValue) -> Self {
        self.default = Some(default);
        self
    }

    /// For array parameters, declare the type of the contained items.
    pub fn with_items(mut self, item_type: ToolParameterType) -> Self {
        self.items = Some(Box::new(item_type));
        self
    }

    fn to_json_schema(&self) -> JsonValue {
        let mut schema = Map::new();
        schema.insert("type".into(), json!(self.param_type.schema_name()));
        if let Some(description) = &self.description {
            schema.insert("description".into(), json!(description));
        }
        if let Some(default) = &self.default {
            schema.insert("default".into(), default.clone());
        }
        if let Some(items) = &self.items {
            schema.insert("items".into(), json!({ "type": items.schema_name() }));
        }
        JsonValue::Object(schema)
    }
}

/// Metadata about a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ToolParameter>,
}

impl ToolMetadata {
    /// Create metadata with the supplied identifier and description.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    /// Append a parameter definition to the tool metadata.
    pub fn with_parameter(mut self, param: ToolParameter) -> Self {
        self.parameters.push(param);
        self
    }

    /// JSON-schema `object` describing the parameters.
    ///
    /// Used for MCP `inputSchema` and for function tool declarations on hosted agents.
    pub fn to_json_schema(&self) -> JsonValue {
        let properties: Map<String, JsonValue> = self
            .parameters
            .iter()
            .map(|p| (p.name.clone(), p.to_json_schema()))
            .collect();
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Trait for implementing tool execution protocols
#[async_trait]
pub trait ToolProtocol: Send + Sync {
    /// Execute a tool with the given parameters
    async fn execute(
        &self,
        tool_name: &str,
        parameters: JsonValue,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>>;

    /// Get metadata about available tools
    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>>;

    /// Get metadata about a specific tool
    async fn get_tool_metadata(
        &self,
        tool_name: &str,
    ) -> Result<ToolMetadata, Box<dyn Error + Send + Sync>> {
        self.list_tools()
            .await?
            .into_iter()
            .find(|t| t.name == tool_name)
            .ok_or_else(|| {
                Box::new(ToolError::NotFound(tool_name.to_string())) as Box<dyn Error + Send + Sync>
            })
    }

    /// Protocol identifier (e.g., "mcp", "custom", "sqlite")
    fn protocol_name(&self) -> &str;
}

/// Error types for tool operations
#[derive(Debug, Clone)]
pub enum ToolError {
    /// Requested tool is not registered in the current registry/protocol.
    NotFound(String),
    /// Tool execution completed with an application level failure.
    ExecutionFailed(String),
    /// The provided JSON parameters failed validation or deserialization.
    InvalidParameters(String),
    /// A lower level protocol/transport error occurred.
    ProtocolError(String),
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::NotFound(name) => write!(f, "Tool not found: {}", name),
            ToolError::ExecutionFailed(msg) => write!(f, "Tool execution failed: {}", msg),
            ToolError::InvalidParameters(msg) => write!(f, "Invalid parameters: {}", msg),
            ToolError::ProtocolError(msg) => write!(f, "Protocol error: {}", msg),
        }
    }
}

impl Error for ToolError {}

/// Read a required string parameter or fail with [`ToolError::InvalidParameters`].
pub fn required_str<'a>(
    parameters: &'a JsonValue,
    name: &str,
) -> Result<&'a str, Box<dyn Error + Send + Sync>> {
    parameters
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            Box::new(ToolError::InvalidParameters(format!(
                "missing string parameter '{}'",
                name
            ))) as Box<dyn Error + Send + Sync>
        })
}

/// A function tool exposed through a registry under its qualified name.
#[derive(Debug, Clone)]
pub struct QualifiedTool {
    /// `{prefix}-{tool}`; what the hosted agent sees and calls.
    pub qualified_name: String,
    pub metadata: ToolMetadata,
}

/// Registry routing qualified function names to the protocol that owns them.
///
/// Each protocol is registered under a prefix (the plugin name); its tools are published as
/// `{prefix}-{tool}`, the same naming hosted agent function tools use.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    protocols: Vec<(String, Arc<dyn ToolProtocol>)>,
}

impl ToolRegistry {
    /// Build an empty registry.
    pub fn new() -> Self {
        Self {
            protocols: Vec::new(),
        }
    }

    /// Register a protocol under `prefix`, replacing any protocol previously registered there.
    pub fn add_protocol(&mut self, prefix: impl Into<String>, protocol: Arc<dyn ToolProtocol>) {
        let prefix = prefix.into();
        self.protocols.retain(|(p, _)| *p != prefix);
        self.protocols.push((prefix, protocol));
    }

    /// Whether any protocol has been registered.
    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }

    /// Registered prefixes in registration order.
    pub fn prefixes(&self) -> Vec<&str> {
        self.protocols.iter().map(|(p, _)| p.as_str()).collect()
    }

    /// List every tool of every protocol under its qualified name.
    ///
    /// A protocol that fails to list (e.g. an MCP server that is down) is logged and skipped so
    /// one unreachable server does not take the others with it.
    pub async fn list_qualified(&self) -> Vec<QualifiedTool> {
        let mut all = Vec::new();
        for (prefix, protocol) in &self.protocols {
            match protocol.list_tools().await {
                Ok(tools) => all.extend(tools.into_iter().map(|metadata| QualifiedTool {
                    qualified_name: format!("{}-{}", prefix, metadata.name),
                    metadata,
                })),
                Err(e) => log::warn!("listing tools of '{}' failed: {}", prefix, e),
            }
        }
        all
    }

    /// Execute a tool by its qualified `{prefix}-{tool}` name.
    ///
    /// Prefixes may themselves contain `-`; the longest matching prefix wins.
    pub async fn execute_qualified(
        &self,
        qualified_name: &str,
        parameters: JsonValue,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let routed = self
            .protocols
            .iter()
            .filter_map(|(prefix, protocol)| {
                qualified_name
                    .strip_prefix(prefix.as_str())
                    .and_then(|rest| rest.strip_prefix('-'))
                    .map(|tool| (prefix.len(), tool, protocol))
            })
            .max_by_key(|(len, _, _)| *len);
        match routed {
            Some((_, tool, protocol)) => protocol.execute(tool, parameters).await,
            None => Err(Box::new(ToolError::NotFound(qualified_name.to_string()))),
        }
    }
}
