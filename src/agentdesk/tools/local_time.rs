//! `get_local_time`: the host's wall-clock time.

use crate::agentdesk::tool_protocol::{ToolError, ToolMetadata, ToolProtocol, ToolResult};
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use serde_json::{json, Value as JsonValue};
use std::error::Error;

pub const GET_LOCAL_TIME: &str = "get_local_time";

/// Serves the current local time as ISO-8601 without a UTC offset, with microseconds.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalTimeProtocol;

impl LocalTimeProtocol {
    pub fn new() -> Self {
        Self
    }

    pub fn format(time: NaiveDateTime) -> String {
        time.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }
}

#[async_trait]
impl ToolProtocol for LocalTimeProtocol {
    async fn execute(
        &self,
        tool_name: &str,
        _parameters: JsonValue,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        if tool_name != GET_LOCAL_TIME {
            return Err(Box::new(ToolError::NotFound(tool_name.to_string())));
        }
        Ok(ToolResult::success(json!(Self::format(
            Local::now().naive_local()
        ))))
    }

    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>> {
        Ok(vec![ToolMetadata::new(
            GET_LOCAL_TIME,
            "Get the current local time in ISO format.",
        )])
    }

    fn protocol_name(&self) -> &str {
        "local-time"
    }
}
