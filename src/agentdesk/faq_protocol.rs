//! FAQ memory exposed as tools, so an agent can search and extend the FAQ itself.
//!
//! Every tool answers with prose. Failures are reported in the text (with `success = true`)
//! because the agent reads the output either way.

use crate::agentdesk::faq_memory::FaqMemory;
use crate::agentdesk::tool_protocol::{
    required_str, ToolError, ToolMetadata, ToolParameter, ToolParameterType, ToolProtocol,
    ToolResult,
};
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use std::error::Error;
use std::fmt::Write;
use std::sync::Arc;

pub const SEARCH_FAQ: &str = "search_faq";
pub const GET_FAQ_ANSWER: &str = "get_faq_answer";
pub const ADD_FAQ_ENTRY: &str = "add_faq_entry";

const DEFAULT_LIMIT: usize = 3;
const DEFAULT_SCORE: f32 = 0.21;

pub struct FaqProtocol {
    memory: Arc<FaqMemory>,
}

impl FaqProtocol {
    pub fn new(memory: Arc<FaqMemory>) -> Self {
        Self { memory }
    }

    async fn search(&self, parameters: &JsonValue) -> Result<String, Box<dyn Error + Send + Sync>> {
        let query = required_str(parameters, "query")?;
        let category = optional_str(parameters, "category");
        let limit = parameters
            .get("limit")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_LIMIT);
        let score = parameters
            .get("score")
            .and_then(|v| v.as_f64())
            .map(|s| s as f32)
            .unwrap_or(DEFAULT_SCORE);

        let hits = match self.memory.search_faq(query, category, limit, score).await {
            Ok(hits) => hits,
            Err(e) => return Ok(format!("Error searching FAQ: {}", e)),
        };
        if hits.is_empty() {
            return Ok(format!("No FAQ entries found for query: '{}'", query));
        }

        let mut out = format!("Found {} FAQ result(s) for '{}':\n\n", hits.len(), query);
        for (i, hit) in hits.iter().enumerate() {
            let record = &hit.record;
            let _ = writeln!(out, "**Result {}:**", i + 1);
            let _ = writeln!(out, "Category: {}", record.category);
            let _ = writeln!(out, "Question: {}", record.question);
            let _ = writeln!(out, "Answer: {}", record.answer);
            let _ = writeln!(out, "Score: {}", hit.score);
            if !record.tags.is_empty() {
                let _ = writeln!(out, "Tags: {}", record.tags);
            }
            out.push_str("\n---\n\n");
        }
        Ok(out)
    }

    async fn answer(&self, parameters: &JsonValue) -> Result<String, Box<dyn Error + Send + Sync>> {
        let query = required_str(parameters, "query")?;
        let category = optional_str(parameters, "category");
        Ok(match self.memory.get_answer(query, category).await {
            Ok(Some(answer)) => format!("FAQ Answer: {}", answer),
            Ok(None) => format!("No specific answer found in FAQ for: '{}'", query),
            Err(e) => format!("Error getting FAQ answer: {}", e),
        })
    }

    async fn add(&self, parameters: &JsonValue) -> Result<String, Box<dyn Error + Send + Sync>> {
        let question = required_str(parameters, "question")?;
        let answer = required_str(parameters, "answer")?;
        let category = optional_str(parameters, "category").unwrap_or("general");
        let tags: Vec<String> = optional_str(parameters, "tags")
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();

        Ok(
            match self.memory.add_faq(question, answer, category, &tags).await {
                Ok(id) => format!(
                    "Successfully added FAQ entry with ID: {}\nQuestion: {}\nAnswer: {}...",
                    id,
                    question,
                    answer.chars().take(100).collect::<String>()
                ),
                Err(e) => format!("Error adding FAQ entry: {}", e),
            },
        )
    }
}

fn optional_str<'a>(parameters: &'a JsonValue, name: &str) -> Option<&'a str> {
    parameters
        .get(name)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl ToolProtocol for FaqProtocol {
    async fn execute(
        &self,
        tool_name: &str,
        parameters: JsonValue,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let text = match tool_name {
            SEARCH_FAQ => self.search(&parameters).await?,
            GET_FAQ_ANSWER => self.answer(&parameters).await?,
            ADD_FAQ_ENTRY => self.add(&parameters).await?,
            other => return Err(Box::new(ToolError::NotFound(other.to_string()))),
        };
        Ok(ToolResult::success(JsonValue::String(text)))
    }

    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>> {
        let query = || {
            ToolParameter::new("query", ToolParameterType::String)
                .with_description("The user's query to search for in the FAQ database")
                .required()
        };
        let category = || {
            ToolParameter::new("category", ToolParameterType::String)
                .with_description("Optional category filter (e.g., 'coffee', 'general', 'non-coffee')")
        };
        Ok(vec![
            ToolMetadata::new(SEARCH_FAQ, "Search for FAQ answers based on a user query")
                .with_parameter(query())
                .with_parameter(category())
                .with_parameter(
                    ToolParameter::new("limit", ToolParameterType::Integer)
                        .with_description("Maximum number of results to return")
                        .with_default(json!(DEFAULT_LIMIT)),
                )
                .with_parameter(
                    ToolParameter::new("score", ToolParameterType::Number)
                        .with_description("Distance threshold; results at or above it are dropped")
                        .with_default(json!(DEFAULT_SCORE)),
                ),
            ToolMetadata::new(
                GET_FAQ_ANSWER,
                "Get the best answer for a specific question from the FAQ database",
            )
            .with_parameter(query())
            .with_parameter(category()),
            ToolMetadata::new(ADD_FAQ_ENTRY, "Add a new FAQ entry to the database")
                .with_parameter(
                    ToolParameter::new("question", ToolParameterType::String)
                        .with_description("The question to add")
                        .required(),
                )
                .with_parameter(
                    ToolParameter::new("answer", ToolParameterType::String)
                        .with_description("The answer to the question")
                        .required(),
                )
                .with_parameter(
                    ToolParameter::new("category", ToolParameterType::String)
                        .with_description("The category for the FAQ entry")
                        .with_default(json!("general")),
                )
                .with_parameter(
                    ToolParameter::new("tags", ToolParameterType::String)
                        .with_description("Comma-separated tags for the entry")
                        .with_default(json!("")),
                ),
        ])
    }

    fn protocol_name(&self) -> &str {
        "faq"
    }
}
