//! Multi-agent group chat.
//!
//! Participants take turns in a fixed order. After every turn a [`TerminationStrategy`] looks
//! at the shared history and decides whether the conversation is over. The default
//! [`ConsensusTerminationStrategy`] stops once an agent declares a `FINAL ANSWER:`.
//!
//! ```rust,no_run
//! use agentdesk::group_chat::{extract_final_answer, AgentGroupChat, ConsensusTerminationStrategy};
//!
//! # async fn demo(
//! #     rag: std::sync::Arc<dyn agentdesk::group_chat::GroupChatParticipant>,
//! #     sys: std::sync::Arc<dyn agentdesk::group_chat::GroupChatParticipant>,
//! # ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let mut chat = AgentGroupChat::new(
//!     vec![rag, sys],
//!     Box::new(ConsensusTerminationStrategy::new(2, 5)),
//! );
//! let transcript = chat.invoke("What time is it and what is a flat white?").await?;
//! println!("{:?}", extract_final_answer(&transcript));
//! chat.reset().await;
//! # Ok(())
//! # }
//! ```

use crate::agentdesk::agents_api::{AgentsApi, AgentsApiError};
use crate::agentdesk::event::{ChatEvent, EventHandler};
use crate::agentdesk::hosted_agent::HostedAgent;
use async_trait::async_trait;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const FINAL_ANSWER_MARKER: &str = "FINAL ANSWER:";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// `user` or `assistant`.
    pub role: String,
    /// Author; `None` for the user.
    pub name: Option<String>,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            name: None,
            content: content.into(),
        }
    }

    pub fn assistant(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            name: Some(name.into()),
            content: content.into(),
        }
    }
}

#[derive(Debug)]
pub enum GroupChatError {
    NoParticipants,
    Agent { name: String, source: AgentsApiError },
}

impl fmt::Display for GroupChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupChatError::NoParticipants => write!(f, "group chat has no participants"),
            GroupChatError::Agent { name, source } => write!(f, "agent {} failed: {}", name, source),
        }
    }
}

impl Error for GroupChatError {}

/// Decides when a group conversation ends.
pub trait TerminationStrategy: Send + Sync {
    /// Consulted after `agent_name` has spoken; `history` includes the user message.
    fn should_terminate(&self, agent_name: &str, history: &[ChatMessage]) -> bool;

    /// Upper bound on agent turns per [`AgentGroupChat::invoke`].
    fn maximum_iterations(&self) -> usize;
}

/// Ends the chat when the last speaker marks a final answer, or when every agent has used up
/// its iterations.
#[derive(Debug, Clone, Copy)]
pub struct ConsensusTerminationStrategy {
    agent_count: usize,
    maximum_iterations: usize,
}

impl ConsensusTerminationStrategy {
    pub fn new(agent_count: usize, maximum_iterations: usize) -> Self {
        Self {
            agent_count,
            maximum_iterations,
        }
    }
}

impl TerminationStrategy for ConsensusTerminationStrategy {
    fn should_terminate(&self, _agent_name: &str, history: &[ChatMessage]) -> bool {
        if history.len() <= 1 {
            return false;
        }
        let cap = self
            .maximum_iterations
            .saturating_mul(self.agent_count)
            .saturating_add(1);
        if history.len() >= cap {
            return true;
        }
        history.len() >= 3
            && history
                .last()
                .is_some_and(|m| m.content.contains(FINAL_ANSWER_MARKER))
    }

    fn maximum_iterations(&self) -> usize {
        self.maximum_iterations
    }
}

/// An agent taking part in a group chat.
#[async_trait]
pub trait GroupChatParticipant: Send + Sync {
    fn name(&self) -> &str;

    /// Reply to the conversation so far.
    async fn respond(&self, history: &[ChatMessage]) -> Result<String, AgentsApiError>;

    /// Release whatever conversation state the participant holds.
    async fn reset(&self) {}
}

#[derive(Default)]
struct ParticipantState {
    thread_id: Option<String>,
    seen: usize,
}

/// A [`HostedAgent`] in a group chat.
///
/// It keeps one remote thread and on each turn posts only the messages it has not seen yet,
/// skipping its own replies (they are already on the thread).
pub struct HostedParticipant {
    api: Arc<dyn AgentsApi>,
    agent: HostedAgent,
    state: Mutex<ParticipantState>,
}

impl HostedParticipant {
    pub fn new(api: Arc<dyn AgentsApi>, agent: HostedAgent) -> Self {
        Self {
            api,
            agent,
            state: Mutex::new(ParticipantState::default()),
        }
    }

    pub fn agent_id(&self) -> &str {
        self.agent.id()
    }

    pub async fn thread_id(&self) -> Option<String> {
        self.state.lock().await.thread_id.clone()
    }
}

#[async_trait]
impl GroupChatParticipant for HostedParticipant {
    fn name(&self) -> &str {
        self.agent.name()
    }

    async fn respond(&self, history: &[ChatMessage]) -> Result<String, AgentsApiError> {
        let mut state = self.state.lock().await;
        let pending = history
            .iter()
            .skip(state.seen)
            .filter(|m| m.name.as_deref() != Some(self.agent.name()))
            .map(|m| match &m.name {
                Some(author) if m.role != "user" => format!("{}: {}", author, m.content),
                _ => m.content.clone(),
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        // Created up front so reset() can delete it even when the first run fails.
        let thread_id = match state.thread_id.clone() {
            Some(id) => id,
            None => {
                let id = self.api.create_thread().await?;
                state.thread_id = Some(id.clone());
                id
            }
        };
        let reply = self
            .agent
            .get_response(self.api.as_ref(), &pending, Some(&thread_id))
            .await?;
        state.seen = history.len();
        Ok(reply.content)
    }

    async fn reset(&self) {
        let mut state = self.state.lock().await;
        if let Some(thread_id) = state.thread_id.take() {
            if let Err(e) = self.api.delete_thread(&thread_id).await {
                log::warn!("could not delete thread {}: {}", thread_id, e);
            }
        }
        state.seen = 0;
    }
}

pub struct AgentGroupChat {
    participants: Vec<Arc<dyn GroupChatParticipant>>,
    strategy: Box<dyn TerminationStrategy>,
    history: Vec<ChatMessage>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl AgentGroupChat {
    pub fn new(
        participants: Vec<Arc<dyn GroupChatParticipant>>,
        strategy: Box<dyn TerminationStrategy>,
    ) -> Self {
        Self {
            participants,
            strategy,
            history: Vec::new(),
            event_handler: None,
        }
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Add `user_input` and let the participants take turns until the strategy stops them.
    ///
    /// Returns the agent messages produced by this call, in order.
    pub async fn invoke(&mut self, user_input: &str) -> Result<Vec<ChatMessage>, GroupChatError> {
        if self.participants.is_empty() {
            return Err(GroupChatError::NoParticipants);
        }
        self.history.push(ChatMessage::user(user_input));

        let mut transcript = Vec::new();
        let mut by_strategy = false;
        for turn in 0..self.strategy.maximum_iterations() {
            let participant = &self.participants[turn % self.participants.len()];
            let content = participant.respond(&self.history).await.map_err(|source| {
                GroupChatError::Agent {
                    name: participant.name().to_string(),
                    source,
                }
            })?;
            log::info!("{}: {}", participant.name(), content);

            let message = ChatMessage::assistant(participant.name(), content);
            self.history.push(message.clone());
            transcript.push(message);

            if self
                .strategy
                .should_terminate(participant.name(), &self.history)
            {
                by_strategy = true;
                break;
            }
        }

        if let Some(handler) = &self.event_handler {
            handler
                .on_chat_event(&ChatEvent::GroupChatTerminated {
                    turns: transcript.len(),
                    by_strategy,
                })
                .await;
        }
        Ok(transcript)
    }

    /// Clear the history and every participant's state.
    pub async fn reset(&mut self) {
        join_all(self.participants.iter().map(|p| p.reset())).await;
        self.history.clear();
    }
}

/// The answer to show the user: the newest message carrying the marker (marker removed,
/// trimmed), else the last message. A bare marker counts as no answer.
pub fn extract_final_answer(transcript: &[ChatMessage]) -> Option<String> {
    transcript
        .iter()
        .rev()
        .find(|m| m.content.contains(FINAL_ANSWER_MARKER))
        .map(|m| m.content.replace(FINAL_ANSWER_MARKER, "").trim().to_string())
        .filter(|answer| !answer.is_empty())
        .or_else(|| transcript.last().map(|m| m.content.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        name: String,
        replies: Vec<&'static str>,
        turn: AtomicUsize,
        resets: AtomicUsize,
    }

    impl Scripted {
        fn new(name: &str, replies: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                replies,
                turn: AtomicUsize::new(0),
                resets: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl GroupChatParticipant for Scripted {
        fn name(&self) -> &str {
            &self.name
        }

        async fn respond(&self, _history: &[ChatMessage]) -> Result<String, AgentsApiError> {
            let turn = self.turn.fetch_add(1, Ordering::SeqCst);
            self.replies
                .get(turn)
                .map(|r| r.to_string())
                .ok_or_else(|| AgentsApiError::Timeout("out of replies".into()))
        }

        async fn reset(&self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn history(contents: &[&str]) -> Vec<ChatMessage> {
        contents
            .iter()
            .enumerate()
            .map(|(i, c)| {
                if i == 0 {
                    ChatMessage::user(*c)
                } else {
                    ChatMessage::assistant("a", *c)
                }
            })
            .collect()
    }

    #[test]
    fn test_consensus_rules() {
        let strategy = ConsensusTerminationStrategy::new(2, 5);
        assert!(!strategy.should_terminate("a", &history(&["FINAL ANSWER: x"])));
        // marker needs at least two agent messages
        assert!(!strategy.should_terminate("a", &history(&["q", "FINAL ANSWER: x"])));
        assert!(strategy.should_terminate("a", &history(&["q", "hm", "FINAL ANSWER: x"])));
        assert!(!strategy.should_terminate("a", &history(&["q", "FINAL ANSWER: x", "hm"])));

        let eleven: Vec<&str> = std::iter::once("q").chain(std::iter::repeat("hm").take(10)).collect();
        assert!(strategy.should_terminate("a", &history(&eleven)));
        assert!(!strategy.should_terminate("a", &history(&eleven[..10])));
    }

    #[tokio::test]
    async fn test_turns_alternate_until_final_answer() {
        let rag = Scripted::new("Coffee-Knowledge-Expert", vec!["A flat white is...", "FINAL ANSWER: both"]);
        let sys = Scripted::new("Systemadmin-Expert", vec!["It is 10:00."]);
        let mut chat = AgentGroupChat::new(
            vec![rag.clone(), sys.clone()],
            Box::new(ConsensusTerminationStrategy::new(2, 5)),
        );
        let transcript = chat.invoke("time and coffee?").await.unwrap();
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript[1].name.as_deref(), Some("Systemadmin-Expert"));
        assert_eq!(chat.history().len(), 4);
        assert_eq!(extract_final_answer(&transcript).as_deref(), Some("both"));

        chat.reset().await;
        assert!(chat.history().is_empty());
        assert_eq!(rag.resets.load(Ordering::SeqCst), 1);
        assert_eq!(sys.resets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_turn_cap() {
        let a = Scripted::new("a", vec!["1", "3", "5"]);
        let b = Scripted::new("b", vec!["2", "4"]);
        let mut chat = AgentGroupChat::new(
            vec![a, b],
            Box::new(ConsensusTerminationStrategy::new(2, 5)),
        );
        let transcript = chat.invoke("go").await.unwrap();
        assert_eq!(transcript.len(), 5);
        assert_eq!(extract_final_answer(&transcript).as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn test_errors() {
        let mut empty = AgentGroupChat::new(Vec::new(), Box::new(ConsensusTerminationStrategy::new(0, 5)));
        assert!(matches!(empty.invoke("x").await, Err(GroupChatError::NoParticipants)));

        let mut chat = AgentGroupChat::new(
            vec![Scripted::new("mute", Vec::new())],
            Box::new(ConsensusTerminationStrategy::new(1, 5)),
        );
        let err = chat.invoke("x").await.unwrap_err();
        assert_eq!(err.to_string(), "agent mute failed: timed out: out of replies");
    }

    #[test]
    fn test_extract_final_answer() {
        assert_eq!(extract_final_answer(&[]), None);
        let transcript = vec![
            ChatMessage::assistant("a", "FINAL ANSWER: old"),
            ChatMessage::assistant("b", "  FINAL ANSWER: new FINAL ANSWER: twice "),
            ChatMessage::assistant("a", "agreed"),
        ];
        assert_eq!(extract_final_answer(&transcript).as_deref(), Some("new  twice"));
        assert_eq!(
            extract_final_answer(&transcript[2..]).as_deref(),
            Some("agreed")
        );

        let bare = vec![
            ChatMessage::assistant("a", "thinking"),
            ChatMessage::assistant("b", "FINAL ANSWER:  "),
        ];
        assert_eq!(
            extract_final_answer(&bare).as_deref(),
            Some("FINAL ANSWER:  ")
        );
    }

    #[test]
    fn test_huge_iteration_limit_does_not_overflow() {
        let strategy = ConsensusTerminationStrategy::new(2, usize::MAX);
        let history = vec![
            ChatMessage::user("question"),
            ChatMessage::assistant("a", "thinking"),
        ];
        assert!(!strategy.should_terminate("a", &history));
        assert_eq!(strategy.maximum_iterations(), usize::MAX);
    }
}
