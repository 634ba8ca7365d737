//! Context-window assembly and rolling summarization.
//!
//! The window is assembled for the legacy direct-LLM path and as the
//! summarizer's input: system prompt, then the long-term memory summary
//! (when still inside the active context), then the persona's fixed
//! context, then the most recent non-error messages within the token
//! budget, oldest first. The clear watermark and the memory watermark both
//! bound how far back the window reaches; the more restrictive wins.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::Result;
use crate::session::{ChatMessage, ChatSession, DEFAULT_TOPIC};
use crate::store::ChatStore;
use crate::token::estimate_tokens;

/// Summarizes conversations into memory prompts and topics.
///
/// The store calls this when thresholds are crossed; without an
/// implementation attached, maintenance is skipped.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Condenses the given messages into a rolling memory summary.
    async fn summarize(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Produces a short topic title for the given messages.
    async fn title(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Builds the wrapped memory message, when the session has a summary.
pub(crate) fn memory_message(session: &ChatSession) -> Option<ChatMessage> {
    if session.memory_prompt.is_empty() {
        None
    } else {
        Some(ChatMessage::system(format!(
            "This is a summary of the chat history as a recap: {}",
            session.memory_prompt
        )))
    }
}

/// Total estimated tokens across messages.
pub(crate) fn count_tokens(messages: &[ChatMessage]) -> usize {
    messages
        .iter()
        .map(|m| estimate_tokens(&m.content))
        .sum()
}

/// Assembles the bounded context window for a session.
pub(crate) fn build_context_window(session: &ChatSession) -> Vec<ChatMessage> {
    let tuning = &session.mask.tuning;
    let total = session.messages.len();
    let clear_start = session.clear_context_start();

    let mut window = Vec::new();

    if let Some(prompt) = &tuning.system_prompt {
        window.push(ChatMessage::system(prompt.clone()));
    }

    // Long-term memory only counts while it still covers live context:
    // a clear that moved past the watermark supersedes it.
    let send_memory = tuning.send_memory && session.last_summarize_index > clear_start;
    if send_memory {
        if let Some(memory) = memory_message(session) {
            window.push(memory);
        }
    }

    window.extend(session.mask.context.iter().cloned());

    // Short-term window start, further bounded by memory and clear marks.
    let short_start = total.saturating_sub(tuning.history_message_count);
    let start = if send_memory {
        session.last_summarize_index.min(short_start)
    } else {
        short_start
    };
    let start = start.max(clear_start);

    let mut recent = Vec::new();
    let mut spent = 0usize;
    for index in (start..total).rev() {
        if spent >= tuning.max_context_tokens {
            break;
        }
        let message = &session.messages[index];
        if message.is_error {
            continue;
        }
        spent += estimate_tokens(&message.content);
        recent.push(message.clone());
    }
    recent.reverse();
    window.extend(recent);

    window
}

/// Strips quotes and trailing punctuation from a generated title.
pub(crate) fn trim_topic(topic: &str) -> String {
    topic
        .trim()
        .trim_matches(['"', '\u{201c}', '\u{201d}', '*', '_'])
        .trim_end_matches(['.', '!', '?', ',', '\u{3002}', '\u{ff01}', '\u{ff1f}'])
        .trim()
        .to_string()
}

impl ChatStore {
    /// The bounded context window for a session, by id.
    pub fn context_window(&self, session_id: &str) -> Option<Vec<ChatMessage>> {
        self.with_session(session_id, build_context_window)
    }

    /// Runs summarization maintenance for a session.
    ///
    /// Auto-titles untitled sessions once enough content accumulates, and
    /// compresses unsummarized history into the rolling memory prompt once
    /// it outgrows the threshold. Summarizer failures are logged and the
    /// session stays as it was.
    pub async fn summarize_session(&self, session_id: &str, refresh_title: bool) {
        let Some(summarizer) = self.summarizer() else {
            return;
        };
        let Some(snapshot) = self.with_session(session_id, Clone::clone) else {
            return;
        };
        let tuning = snapshot.mask.tuning.clone();

        // Topic
        let live_messages: Vec<ChatMessage> = snapshot
            .messages
            .iter()
            .filter(|m| !m.is_error)
            .cloned()
            .collect();
        let wants_title = self.config().auto_generate_title
            && snapshot.topic == DEFAULT_TOPIC
            && count_tokens(&live_messages) >= self.config().summarize_min_tokens;
        if wants_title || refresh_title {
            let start = live_messages
                .len()
                .saturating_sub(tuning.history_message_count);
            match summarizer.title(&live_messages[start..]).await {
                Ok(topic) => {
                    let topic = trim_topic(&topic);
                    if !topic.is_empty() {
                        debug!(session_id, topic, "auto-generated session topic");
                        self.update_session(session_id, |session| session.topic = topic);
                    }
                }
                Err(err) => warn!(session_id, error = %err, "topic generation failed"),
            }
        }

        // Memory
        if !tuning.send_memory {
            return;
        }
        let summarize_start = snapshot
            .last_summarize_index
            .max(snapshot.clear_context_start())
            .min(snapshot.messages.len());
        let mut to_summarize: Vec<ChatMessage> = snapshot.messages[summarize_start..]
            .iter()
            .filter(|m| !m.is_error)
            .cloned()
            .collect();

        let unsummarized = count_tokens(&to_summarize);
        if unsummarized <= tuning.compress_message_length_threshold {
            return;
        }

        // Keep the summarizer's own input bounded.
        if unsummarized > tuning.max_context_tokens {
            let keep_from = to_summarize
                .len()
                .saturating_sub(tuning.history_message_count);
            to_summarize.drain(..keep_from);
        }
        if let Some(memory) = memory_message(&snapshot) {
            to_summarize.insert(0, memory);
        }

        let new_watermark = snapshot.messages.len();
        match summarizer.summarize(&to_summarize).await {
            Ok(summary) => {
                debug!(session_id, "memory summary refreshed");
                self.update_session(session_id, |session| {
                    session.memory_prompt = summary;
                    session.last_summarize_index = new_watermark;
                });
            }
            Err(err) => warn!(session_id, error = %err, "memory summarization failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex;

    use crate::config::StoreConfig;
    use crate::mask::{Mask, ModelTuning};
    use crate::session::MessageRole;
    use crate::storage::MemoryStorage;
    use crate::tests_support::NullApi;

    fn message(role: MessageRole, content: &str) -> ChatMessage {
        ChatMessage::new(role, content)
    }

    fn session_with_tuning(tuning: ModelTuning) -> ChatSession {
        ChatSession::with_mask(Mask::new("m", "", "general").with_tuning(tuning))
    }

    #[test]
    fn window_orders_system_memory_context_recent() {
        let tuning = ModelTuning {
            system_prompt: Some("be brief".to_string()),
            ..ModelTuning::default()
        };
        let mut session = session_with_tuning(tuning);
        session.mask.context = vec![message(MessageRole::System, "persona context")];
        session.memory_prompt = "they like trains".to_string();
        session.last_summarize_index = 1;
        session.messages = vec![
            message(MessageRole::User, "old"),
            message(MessageRole::User, "recent"),
        ];

        let window = build_context_window(&session);
        assert_eq!(window[0].content, "be brief");
        assert!(window[1].content.contains("they like trains"));
        assert_eq!(window[2].content, "persona context");
        assert_eq!(window.last().unwrap().content, "recent");
    }

    #[test]
    fn cleared_history_is_excluded() {
        let mut session = session_with_tuning(ModelTuning::default());
        session.messages = vec![
            message(MessageRole::User, "before clear"),
            message(MessageRole::User, "after clear"),
        ];
        session.clear_context_index = Some(1);

        let window = build_context_window(&session);
        let contents: Vec<&str> = window.iter().map(|m| m.content.as_str()).collect();
        assert!(!contents.contains(&"before clear"));
        assert!(contents.contains(&"after clear"));
    }

    #[test]
    fn clear_supersedes_memory() {
        let mut session = session_with_tuning(ModelTuning::default());
        session.memory_prompt = "stale memory".to_string();
        session.last_summarize_index = 1;
        session.clear_context_index = Some(2);
        session.messages = vec![
            message(MessageRole::User, "a"),
            message(MessageRole::User, "b"),
            message(MessageRole::User, "c"),
        ];

        let window = build_context_window(&session);
        assert!(!window.iter().any(|m| m.content.contains("stale memory")));
    }

    #[test]
    fn errored_messages_never_enter_the_window() {
        let mut session = session_with_tuning(ModelTuning::default());
        let mut bad = message(MessageRole::Assistant, "errored reply");
        bad.is_error = true;
        session.messages = vec![message(MessageRole::User, "fine"), bad];

        let window = build_context_window(&session);
        assert!(!window.iter().any(|m| m.content == "errored reply"));
    }

    #[test]
    fn token_budget_bounds_the_window() {
        let tuning = ModelTuning {
            max_context_tokens: 10,
            history_message_count: 100,
            ..ModelTuning::default()
        };
        let mut session = session_with_tuning(tuning);
        for i in 0..20 {
            session
                .messages
                .push(message(MessageRole::User, &format!("padding message {i}")));
        }

        let window = build_context_window(&session);
        assert!(window.len() < 20);
        // The newest message always survives.
        assert_eq!(window.last().unwrap().content, "padding message 19");
    }

    #[test]
    fn trim_topic_strips_decoration() {
        assert_eq!(trim_topic("\"Ticket Trends\""), "Ticket Trends");
        assert_eq!(trim_topic("  Plans for Friday.  "), "Plans for Friday");
        assert_eq!(trim_topic("**Bold Idea!**"), "Bold Idea");
    }

    struct FixedSummarizer {
        calls: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl Summarizer for FixedSummarizer {
        async fn summarize(&self, _messages: &[ChatMessage]) -> Result<String> {
            self.calls.lock().unwrap().push("summarize");
            Ok("a rolling summary".to_string())
        }

        async fn title(&self, _messages: &[ChatMessage]) -> Result<String> {
            self.calls.lock().unwrap().push("title");
            Ok("\"Train Plans\"".to_string())
        }
    }

    fn store_with_summarizer() -> (ChatStore, Arc<FixedSummarizer>) {
        let summarizer = Arc::new(FixedSummarizer {
            calls: Mutex::new(Vec::new()),
        });
        let store = ChatStore::new(
            Arc::new(NullApi::default()),
            Arc::new(MemoryStorage::new()),
            StoreConfig::default(),
        )
        .unwrap()
        .with_summarizer(Arc::clone(&summarizer) as Arc<dyn Summarizer>);
        (store, summarizer)
    }

    #[tokio::test]
    async fn small_sessions_are_left_alone() {
        let (store, summarizer) = store_with_summarizer();
        let session_id = store.current_session().id.clone();
        store.update_session(&session_id, |session| {
            session.messages.push(message(MessageRole::User, "hi"));
        });

        store.summarize_session(&session_id, false).await;
        assert!(summarizer.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn big_sessions_get_title_and_memory() {
        let (store, summarizer) = store_with_summarizer();
        let session_id = store.current_session().id.clone();
        store.update_session(&session_id, |session| {
            session.mask.tuning.compress_message_length_threshold = 10;
            for i in 0..30 {
                session.messages.push(message(
                    MessageRole::User,
                    &format!("a reasonably long message number {i}"),
                ));
            }
        });

        store.summarize_session(&session_id, false).await;

        let session = store.current_session();
        assert_eq!(session.topic, "Train Plans");
        assert_eq!(session.memory_prompt, "a rolling summary");
        assert_eq!(session.last_summarize_index, 30);
        let calls = summarizer.calls.lock().unwrap();
        assert!(calls.contains(&"title"));
        assert!(calls.contains(&"summarize"));
    }

    #[tokio::test]
    async fn titled_sessions_keep_their_topic() {
        let (store, summarizer) = store_with_summarizer();
        let session_id = store.current_session().id.clone();
        store.update_session(&session_id, |session| {
            session.topic = "Hand-picked".to_string();
            session.mask.tuning.compress_message_length_threshold = 100_000;
            for i in 0..30 {
                session.messages.push(message(
                    MessageRole::User,
                    &format!("a reasonably long message number {i}"),
                ));
            }
        });

        store.summarize_session(&session_id, false).await;
        assert_eq!(store.current_session().topic, "Hand-picked");
        assert!(!summarizer.calls.lock().unwrap().contains(&"title"));
    }
}
