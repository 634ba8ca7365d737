//! Conversation data model: sessions, messages, and loading stages.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::cache::QuestionCache;
use crate::mask::Mask;

/// Topic given to sessions that have not been auto-titled yet.
pub const DEFAULT_TOPIC: &str = "New conversation";

/// Who authored a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// The end user.
    User,
    /// The agent.
    Assistant,
    /// Injected context (system prompts, memory summaries).
    System,
}

/// Where a streaming turn currently is, for progress display.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadingStage {
    /// Establishing the connection / validating the session.
    Connecting,
    /// The request is with the backend, no output yet.
    #[default]
    Processing,
    /// Answer text is arriving.
    Generating,
    /// Reasoning text is arriving.
    Thinking,
    /// One or more tools are in flight.
    ToolCalling,
    /// The turn ended in an error.
    Error,
}

/// One chat turn.
///
/// While `streaming` is true the content mutates in place as events arrive;
/// after finalization it is immutable except for later error marking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// Unique message identifier.
    pub id: String,

    /// Author of the message.
    pub role: MessageRole,

    /// The message text; accumulates during streaming.
    pub content: String,

    /// When the message was created or finalized.
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,

    /// True while stream events are still mutating this message.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub streaming: bool,

    /// True when the turn ended in a surfaced failure.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,

    /// Progress tag while the turn is live; cleared on finalization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loading_stage: Option<LoadingStage>,
}

impl ChatMessage {
    /// Creates a message with a fresh id and the current timestamp.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            date: OffsetDateTime::now_utc(),
            streaming: false,
            is_error: false,
            loading_stage: None,
        }
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Creates the live assistant placeholder a turn starts with.
    pub fn assistant_placeholder() -> Self {
        let mut message = Self::new(MessageRole::Assistant, "");
        message.streaming = true;
        message.loading_stage = Some(LoadingStage::Connecting);
        message
    }
}

/// A conversation thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    /// Local session identifier; stable across reorder and persistence.
    pub id: String,

    /// Display title; auto-summarized once enough content accumulates.
    pub topic: String,

    /// Rolling long-term memory summary.
    pub memory_prompt: String,

    /// Ordered messages, append-only except for explicit history clears.
    pub messages: Vec<ChatMessage>,

    /// Last time anything changed, for sorting in a picker.
    #[serde(with = "time::serde::rfc3339")]
    pub last_update: OffsetDateTime,

    /// Watermark: messages before this index are covered by the memory
    /// summary.
    pub last_summarize_index: usize,

    /// Watermark: messages before this index are excluded from context
    /// after an explicit "clear history".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clear_context_index: Option<usize>,

    /// Whether the agent should stream reasoning separately.
    pub deep_thinking: bool,

    /// Remote agent session binding.
    ///
    /// Set after a successful init/recover; cleared on a 404 or explicit
    /// deletion. `None` means the next turn must initialize first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_session_id: Option<String>,

    /// Cached follow-up suggestions.
    #[serde(default)]
    pub suggested_questions: QuestionCache,

    /// Persona preset this session runs under.
    pub mask: Mask,
}

impl ChatSession {
    /// Creates an empty session with the default persona.
    pub fn new() -> Self {
        Self::with_mask(Mask::default())
    }

    /// Creates an empty session bound to a persona preset.
    ///
    /// The mask's name becomes the starting topic when it has one.
    pub fn with_mask(mask: Mask) -> Self {
        let topic = if mask.name.is_empty() {
            DEFAULT_TOPIC.to_string()
        } else {
            mask.name.clone()
        };
        Self {
            id: Uuid::new_v4().to_string(),
            topic,
            memory_prompt: String::new(),
            messages: Vec::new(),
            last_update: OffsetDateTime::now_utc(),
            last_summarize_index: 0,
            clear_context_index: None,
            deep_thinking: true,
            agent_session_id: None,
            suggested_questions: QuestionCache::default(),
            mask,
        }
    }

    /// Index the next context window may not reach behind.
    pub fn clear_context_start(&self) -> usize {
        self.clear_context_index.unwrap_or(0)
    }

    /// Toggles the clear-history watermark.
    ///
    /// Clearing when the watermark already sits at the end un-clears it;
    /// otherwise the watermark moves to the end and the memory summary is
    /// dropped with the context it summarized.
    pub fn toggle_clear_context(&mut self) {
        if self.clear_context_index == Some(self.messages.len()) {
            self.clear_context_index = None;
        } else {
            self.clear_context_index = Some(self.messages.len());
            self.memory_prompt.clear();
        }
    }

    /// Deep-copies this session into an unbound fork.
    ///
    /// Messages get fresh ids; the remote binding and suggestion cache do
    /// not carry over.
    pub fn fork(&self) -> Self {
        let mut forked = Self::with_mask(self.mask.clone());
        forked.topic = self.topic.clone();
        forked.deep_thinking = self.deep_thinking;
        forked.messages = self
            .messages
            .iter()
            .map(|message| {
                let mut copy = message.clone();
                copy.id = Uuid::new_v4().to_string();
                copy
            })
            .collect();
        forked
    }

    /// Marks the session as touched now.
    pub fn touch(&mut self) {
        self.last_update = OffsetDateTime::now_utc();
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_empty() {
        let session = ChatSession::new();
        assert!(session.messages.is_empty());
        assert_eq!(session.topic, DEFAULT_TOPIC);
        assert!(session.agent_session_id.is_none());
        assert!(session.deep_thinking);
        assert_eq!(session.last_summarize_index, 0);
    }

    #[test]
    fn placeholder_starts_connecting() {
        let message = ChatMessage::assistant_placeholder();
        assert!(message.streaming);
        assert_eq!(message.loading_stage, Some(LoadingStage::Connecting));
        assert!(message.content.is_empty());
    }

    #[test]
    fn toggle_clear_context_round_trip() {
        let mut session = ChatSession::new();
        session.messages.push(ChatMessage::user("one"));
        session.messages.push(ChatMessage::user("two"));
        session.memory_prompt = "summary".to_string();

        session.toggle_clear_context();
        assert_eq!(session.clear_context_index, Some(2));
        assert!(session.memory_prompt.is_empty());

        session.toggle_clear_context();
        assert_eq!(session.clear_context_index, None);
    }

    #[test]
    fn fork_copies_messages_with_fresh_ids() {
        let mut session = ChatSession::new();
        session.topic = "Ticket stats".to_string();
        session.agent_session_id = Some("sess-remote".to_string());
        session.messages.push(ChatMessage::user("hello"));

        let fork = session.fork();
        assert_eq!(fork.topic, "Ticket stats");
        assert_eq!(fork.messages.len(), 1);
        assert_ne!(fork.messages[0].id, session.messages[0].id);
        assert_eq!(fork.messages[0].content, "hello");
        assert!(fork.agent_session_id.is_none());
        assert_ne!(fork.id, session.id);
    }

    #[test]
    fn message_serialization_skips_transient_false() {
        let message = ChatMessage::user("hi");
        let json = serde_json::to_value(&message).unwrap();
        assert!(json.get("streaming").is_none());
        assert!(json.get("is_error").is_none());
        assert!(json.get("loading_stage").is_none());
    }

    #[test]
    fn session_round_trips_through_json() {
        let mut session = ChatSession::new();
        session.agent_session_id = Some("sess-1".to_string());
        session.messages.push(ChatMessage::user("hello"));

        let json = serde_json::to_string(&session).unwrap();
        let back: ChatSession = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, session.id);
        assert_eq!(back.agent_session_id.as_deref(), Some("sess-1"));
        assert_eq!(back.messages.len(), 1);
    }
}
