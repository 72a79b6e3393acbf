//! Client side of the chat backend, used by the console frontend.
//!
//! A [`ChatSession`] remembers the `agent_id`/`thread_id` of the last reply and sends them back
//! with the next message, so the conversation continues on the same hosted thread.

use crate::agentdesk::http_client_pool::get_or_create_client_with_timeout;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Group chats can take several agent runs; allow for it.
pub const CHAT_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug)]
pub enum ChatClientError {
    /// Nothing is listening at the backend address.
    Connect(String),
    /// Non-2xx reply; `detail` is the backend's `detail` field or the raw body.
    Backend { status: u16, detail: String },
    /// Any other transport or decoding problem.
    Other(String),
}

impl fmt::Display for ChatClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatClientError::Connect(_) => write!(
                f,
                "Could not connect to the backend server. Please ensure the server is running."
            ),
            ChatClientError::Backend { status, detail } => {
                write!(f, "Backend error ({}): {}", status, detail)
            }
            ChatClientError::Other(msg) => write!(f, "Error communicating with backend: {}", msg),
        }
    }
}

impl Error for ChatClientError {}

impl From<reqwest::Error> for ChatClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            ChatClientError::Connect(e.to_string())
        } else {
            ChatClientError::Other(e.to_string())
        }
    }
}

#[derive(Deserialize)]
struct ChatReply {
    response: Option<String>,
    agent_id: Option<String>,
    thread_id: Option<String>,
}

pub struct ChatSession {
    base_url: String,
    client: reqwest::Client,
    agent_id: Option<String>,
    thread_id: Option<String>,
}

impl ChatSession {
    pub fn new(base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            client: get_or_create_client_with_timeout(&base_url, CHAT_TIMEOUT),
            base_url,
            agent_id: None,
            thread_id: None,
        }
    }

    pub fn agent_id(&self) -> Option<&str> {
        self.agent_id.as_deref()
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    /// Send `message` and return the reply text.
    pub async fn send(&mut self, message: &str) -> Result<String, ChatClientError> {
        let payload = json!({
            "user_input": message,
            "agent_id": self.agent_id,
            "thread_id": self.thread_id,
        });
        log::debug!("sending {}", payload);
        let response = self
            .client
            .post(format!("{}/chat", self.base_url))
            .json(&payload)
            .send()
            .await?;
        let response = check(response).await?;
        let reply: ChatReply = response.json().await?;

        self.agent_id = reply.agent_id;
        self.thread_id = reply.thread_id;
        Ok(reply
            .response
            .unwrap_or_else(|| "No response received.".to_string()))
    }

    /// Ask the backend to delete the current agent and thread, then forget both ids.
    ///
    /// Returns whether anything was deleted. The ids are cleared even when the call fails.
    pub async fn reset(&mut self) -> Result<bool, ChatClientError> {
        let (agent_id, thread_id) = (self.agent_id.take(), self.thread_id.take());
        let (Some(agent_id), Some(thread_id)) = (agent_id, thread_id) else {
            return Ok(false);
        };
        let response = self
            .client
            .post(format!("{}/reset_agent_thread_id", self.base_url))
            .query(&[("agent_id", &agent_id), ("thread_id", &thread_id)])
            .send()
            .await?;
        check(response).await?;
        Ok(true)
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, ChatClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<JsonValue>(&body)
        .ok()
        .and_then(|v| v.get("detail").map(|d| match d {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        }))
        .unwrap_or(body);
    Err(ChatClientError::Backend {
        status: status.as_u16(),
        detail,
    })
}
