//! Shared fakes for the integration tests: an in-memory agent platform and a keyword embedder.

#![allow(dead_code)]

use agentdesk::agents_api::{
    AgentDefinition, AgentInfo, AgentsApi, AgentsApiError, Connection, Run, ToolDefinition,
    ToolOutput,
};
use agentdesk::embeddings::EmbeddingGenerator;
use agentdesk::faq_memory::{FaqMemory, FaqRecord};
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use std::collections::{HashMap, HashSet, VecDeque};
use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub role: String,
    pub content: String,
}

struct FakeRun {
    agent_name: String,
    thread_id: String,
    reply: String,
}

/// Agent platform kept in memory.
///
/// Agents answer with the next scripted reply for their name, or echo the last user message.
/// A scripted tool call makes the first run of that agent stop in `requires_action`; the
/// submitted output becomes the reply.
#[derive(Default)]
pub struct FakeAgentsApi {
    next_id: AtomicUsize,
    calls: Mutex<Vec<String>>,
    definitions: Mutex<Vec<AgentDefinition>>,
    agents: Mutex<HashMap<String, (String, Vec<JsonValue>)>>,
    threads: Mutex<HashMap<String, Vec<StoredMessage>>>,
    runs: Mutex<HashMap<String, FakeRun>>,
    replies: Mutex<HashMap<String, VecDeque<String>>>,
    tool_calls: Mutex<HashMap<String, (String, String)>>,
    failing_agents: Mutex<HashSet<String>>,
    connections: Vec<Connection>,
}

impl FakeAgentsApi {
    /// A project with an Azure AI Search connection.
    pub fn new() -> Self {
        Self {
            connections: vec![
                connection("conn-storage", "AzureStorageAccount"),
                connection("conn-search", "CognitiveSearch"),
            ],
            ..Default::default()
        }
    }

    pub fn without_search() -> Self {
        Self {
            connections: vec![connection("conn-storage", "AzureStorageAccount")],
            ..Default::default()
        }
    }

    pub fn script(&self, agent_name: &str, replies: &[&str]) {
        self.replies
            .lock()
            .unwrap()
            .entry(agent_name.to_string())
            .or_default()
            .extend(replies.iter().map(|r| r.to_string()));
    }

    pub fn script_tool_call(&self, agent_name: &str, function: &str, arguments: JsonValue) {
        self.tool_calls.lock().unwrap().insert(
            agent_name.to_string(),
            (function.to_string(), arguments.to_string()),
        );
    }

    /// Runs of this agent are rejected by the platform.
    pub fn fail_runs_of(&self, agent_name: &str) {
        self.failing_agents
            .lock()
            .unwrap()
            .insert(agent_name.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn definitions(&self) -> Vec<AgentDefinition> {
        self.definitions.lock().unwrap().clone()
    }

    pub fn agent_count(&self) -> usize {
        self.agents.lock().unwrap().len()
    }

    pub fn thread_count(&self) -> usize {
        self.threads.lock().unwrap().len()
    }

    pub fn messages(&self, thread_id: &str) -> Vec<StoredMessage> {
        self.threads
            .lock()
            .unwrap()
            .get(thread_id)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn fresh_id(&self, prefix: &str) -> String {
        format!("{}_{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn not_found(what: &str, id: &str) -> AgentsApiError {
        AgentsApiError::Http {
            status: 404,
            body: format!("{} {} not found", what, id),
        }
    }

    fn finish(&self, run_id: &str) -> Run {
        let runs = self.runs.lock().unwrap();
        let run = &runs[run_id];
        self.threads
            .lock()
            .unwrap()
            .entry(run.thread_id.clone())
            .or_default()
            .push(StoredMessage {
                role: "assistant".into(),
                content: run.reply.clone(),
            });
        run_value(run_id, &run.thread_id, json!({"status": "completed"}))
    }
}

fn connection(id: &str, kind: &str) -> Connection {
    serde_json::from_value(json!({"id": id, "name": id, "type": kind})).unwrap()
}

fn run_value(id: &str, thread_id: &str, extra: JsonValue) -> Run {
    let mut value = json!({"id": id, "thread_id": thread_id});
    for (k, v) in extra.as_object().unwrap() {
        value[k] = v.clone();
    }
    serde_json::from_value(value).unwrap()
}

#[async_trait]
impl AgentsApi for FakeAgentsApi {
    async fn create_agent(&self, definition: &AgentDefinition) -> Result<AgentInfo, AgentsApiError> {
        let id = self.fresh_id("asst");
        self.record(format!("create_agent {}", definition.name));
        let tools = definition
            .tools
            .iter()
            .map(|t| serde_json::to_value(t).unwrap())
            .collect::<Vec<_>>();
        self.agents
            .lock()
            .unwrap()
            .insert(id.clone(), (definition.name.clone(), tools.clone()));
        self.definitions.lock().unwrap().push(definition.clone());
        Ok(AgentInfo {
            id,
            name: Some(definition.name.clone()),
            model: definition.model.clone(),
            tools,
        })
    }

    async fn get_agent(&self, agent_id: &str) -> Result<AgentInfo, AgentsApiError> {
        self.record(format!("get_agent {}", agent_id));
        let agents = self.agents.lock().unwrap();
        let (name, tools) = agents
            .get(agent_id)
            .ok_or_else(|| Self::not_found("agent", agent_id))?;
        Ok(AgentInfo {
            id: agent_id.to_string(),
            name: Some(name.clone()),
            model: "gpt-4.1".into(),
            tools: tools.clone(),
        })
    }

    async fn delete_agent(&self, agent_id: &str) -> Result<(), AgentsApiError> {
        self.record(format!("delete_agent {}", agent_id));
        self.agents
            .lock()
            .unwrap()
            .remove(agent_id)
            .map(|_| ())
            .ok_or_else(|| Self::not_found("agent", agent_id))
    }

    async fn create_thread(&self) -> Result<String, AgentsApiError> {
        let id = self.fresh_id("thread");
        self.record(format!("create_thread {}", id));
        self.threads.lock().unwrap().insert(id.clone(), Vec::new());
        Ok(id)
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<(), AgentsApiError> {
        self.record(format!("delete_thread {}", thread_id));
        self.threads
            .lock()
            .unwrap()
            .remove(thread_id)
            .map(|_| ())
            .ok_or_else(|| Self::not_found("thread", thread_id))
    }

    async fn create_message(
        &self,
        thread_id: &str,
        role: &str,
        content: &str,
    ) -> Result<(), AgentsApiError> {
        let mut threads = self.threads.lock().unwrap();
        let thread = threads
            .get_mut(thread_id)
            .ok_or_else(|| Self::not_found("thread", thread_id))?;
        thread.push(StoredMessage {
            role: role.to_string(),
            content: content.to_string(),
        });
        Ok(())
    }

    async fn create_run(
        &self,
        thread_id: &str,
        agent_id: &str,
        _tools: &[ToolDefinition],
    ) -> Result<Run, AgentsApiError> {
        let agent_name = self
            .agents
            .lock()
            .unwrap()
            .get(agent_id)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| Self::not_found("agent", agent_id))?;
        if self.failing_agents.lock().unwrap().contains(&agent_name) {
            return Err(AgentsApiError::Http {
                status: 500,
                body: "run rejected".into(),
            });
        }

        let run_id = self.fresh_id("run");
        self.record(format!("create_run {}", agent_name));
        let last_user = self
            .messages(thread_id)
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(&agent_name)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| format!("{} echo: {}", agent_name, last_user));

        let tool_call = self.tool_calls.lock().unwrap().remove(&agent_name);
        self.runs.lock().unwrap().insert(
            run_id.clone(),
            FakeRun {
                agent_name,
                thread_id: thread_id.to_string(),
                reply,
            },
        );

        match tool_call {
            Some((function, arguments)) => Ok(run_value(
                &run_id,
                thread_id,
                json!({
                    "status": "requires_action",
                    "required_action": {"submit_tool_outputs": {"tool_calls": [
                        {"id": "call_1", "function": {"name": function, "arguments": arguments}}
                    ]}}
                }),
            )),
            None => Ok(self.finish(&run_id)),
        }
    }

    async fn get_run(&self, _thread_id: &str, run_id: &str) -> Result<Run, AgentsApiError> {
        Ok(self.finish(run_id))
    }

    async fn submit_tool_outputs(
        &self,
        _thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run, AgentsApiError> {
        let output = outputs
            .iter()
            .map(|o| o.output.clone())
            .collect::<Vec<_>>()
            .join("; ");
        {
            let mut runs = self.runs.lock().unwrap();
            let run = runs
                .get_mut(run_id)
                .ok_or_else(|| Self::not_found("run", run_id))?;
            self.calls
                .lock()
                .unwrap()
                .push(format!("submit_tool_outputs {}", run.agent_name));
            run.reply = format!("tool said: {}", output);
        }
        Ok(self.finish(run_id))
    }

    async fn latest_assistant_text(
        &self,
        _thread_id: &str,
        run_id: &str,
    ) -> Result<String, AgentsApiError> {
        self.runs
            .lock()
            .unwrap()
            .get(run_id)
            .map(|r| r.reply.clone())
            .ok_or_else(|| Self::not_found("run", run_id))
    }

    async fn list_connections(&self) -> Result<Vec<Connection>, AgentsApiError> {
        Ok(self.connections.clone())
    }
}

/// Counts keyword occurrences; records sharing keywords with the query land close to it.
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
}

pub const KEYWORDS: [&str; 5] = ["espresso", "refund", "hours", "wifi", "flat white"];

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingGenerator for KeywordEmbedder {
    async fn embed(
        &self,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, Box<dyn Error + Send + Sync>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|text| {
                let text = text.to_lowercase();
                KEYWORDS
                    .iter()
                    .map(|k| text.matches(k).count() as f32)
                    .collect()
            })
            .collect())
    }
}

/// FAQ memory with two coffee-shop entries.
pub fn coffee_faq() -> Arc<FaqMemory> {
    let records = vec![
        FaqRecord::new("faq-hours", "What are your opening hours?", "We open 7-19 daily.")
            .with_category("store"),
        FaqRecord::new("faq-wifi", "Is there wifi?", "Yes, free wifi in every store.")
            .with_category("store"),
    ];
    Arc::new(FaqMemory::new(records, Arc::new(KeywordEmbedder::new())))
}
