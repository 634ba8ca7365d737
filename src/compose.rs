//! Folds stream events into the assistant message's display content.
//!
//! A [`ResponseComposer`] tracks the thinking buffer, the answer buffer,
//! and the tool invocation lists for one streaming turn, and renders the
//! markdown the message should show after each event. Display order is
//! fixed: thinking block, tool banner, separator, answer block.

use tracing::debug;

use crate::session::LoadingStage;
use crate::types::{StreamEvent, ToolPhase};

/// Line shown when a turn produced neither thinking nor answer text.
pub const EMPTY_REPLY: &str = "The agent returned no reply.";

/// Streaming display state for a single turn.
///
/// Tool names accumulate and never leave their lists mid-turn: a completed
/// tool stays listed as "calling" until finalization, and failed tools are
/// only logged. This keeps a visible history of what ran.
#[derive(Debug, Default)]
pub struct ResponseComposer {
    thinking: String,
    answer: String,
    calling_tools: Vec<String>,
    completed_tools: Vec<String>,
    stage: LoadingStage,
    display: String,
}

impl ResponseComposer {
    /// Creates a composer for a fresh turn.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current loading stage for the live message.
    pub fn stage(&self) -> LoadingStage {
        self.stage
    }

    /// The display content after the most recent event.
    pub fn display(&self) -> &str {
        &self.display
    }

    /// The bare answer text accumulated so far.
    pub fn answer(&self) -> &str {
        &self.answer
    }

    /// True when no event changed the display yet.
    pub fn is_empty(&self) -> bool {
        self.thinking.is_empty() && self.answer.is_empty() && self.completed_tools.is_empty()
    }

    /// Folds one event into the display state.
    ///
    /// Terminal and error events leave the display untouched; the caller
    /// ends the turn via [`finalize`](Self::finalize) or error handling.
    pub fn apply(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Chunk {
                content,
                is_thinking: true,
            } => {
                self.thinking.push_str(content);
                self.stage = LoadingStage::Thinking;
                // While thinking, the answer stays suppressed.
                self.display = format!("**🤔 Thinking:**\n\n{}", self.thinking);
            }
            StreamEvent::Chunk {
                content,
                is_thinking: false,
            } => {
                self.answer.push_str(content);
                self.stage = LoadingStage::Generating;

                let mut content = self.thinking_block();
                if !self.completed_tools.is_empty() && self.calling_tools.is_empty() {
                    content.push_str(&self.completed_banner());
                }
                content.push_str(&self.answer_block());
                self.display = if content.is_empty() {
                    self.answer.clone()
                } else {
                    content
                };
            }
            StreamEvent::ToolStatus { tool_status, .. } => {
                let label = event.tool_label().unwrap_or_else(|| "unknown".to_string());

                if tool_status.is_start() {
                    if !self.calling_tools.contains(&label) {
                        self.calling_tools.push(label);
                    }
                } else if tool_status.is_success() {
                    if !self.completed_tools.contains(&label) {
                        self.completed_tools.push(label);
                    }
                } else {
                    // Failures and timeouts are recorded nowhere visible;
                    // the name stays on the calling banner for the rest of
                    // the turn.
                    debug!(tool = %label, status = ?tool_status, "tool did not succeed");
                }

                let mut content = self.thinking_block();
                if !self.calling_tools.is_empty() {
                    content.push_str(&format!(
                        "**🔧 Calling tools, please wait: {}**\n\n",
                        self.calling_tools.join(", ")
                    ));
                } else if !self.completed_tools.is_empty() {
                    content.push_str(&self.completed_banner());
                }
                content.push_str(&self.answer_block());

                self.display = content;
                self.stage = if self.calling_tools.is_empty() {
                    LoadingStage::Generating
                } else {
                    LoadingStage::ToolCalling
                };
            }
            StreamEvent::Complete | StreamEvent::Done | StreamEvent::Error { .. } => {}
        }
    }

    /// Builds the final message content and consumes the composer.
    ///
    /// The calling list is dropped, the completed banner survives, and an
    /// entirely empty turn falls back to a fixed line.
    pub fn finalize(mut self) -> String {
        self.calling_tools.clear();

        let mut content = self.thinking_block();
        if !self.completed_tools.is_empty() {
            content.push_str(&self.completed_banner());
        }
        content.push_str(&self.answer_block());

        if content.is_empty() {
            EMPTY_REPLY.to_string()
        } else {
            content
        }
    }

    fn thinking_block(&self) -> String {
        if self.thinking.is_empty() {
            String::new()
        } else {
            format!("**🤔 Thought process:**\n\n{}\n\n", self.thinking)
        }
    }

    fn completed_banner(&self) -> String {
        format!(
            "**✅ Tools succeeded: {}**\n\n",
            self.completed_tools.join(", ")
        )
    }

    fn answer_block(&self) -> String {
        if self.answer.is_empty() {
            String::new()
        } else {
            format!("---\n\n**💬 Answer:**\n\n{}", self.answer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(content: &str, is_thinking: bool) -> StreamEvent {
        StreamEvent::Chunk {
            content: content.to_string(),
            is_thinking,
        }
    }

    fn tool(phase: ToolPhase, name: &str) -> StreamEvent {
        StreamEvent::ToolStatus {
            tool_status: phase,
            tool_name: Some(name.to_string()),
            server_name: None,
            content: None,
        }
    }

    #[test]
    fn thinking_suppresses_answer() {
        let mut composer = ResponseComposer::new();
        composer.apply(&chunk("because ", true));
        composer.apply(&chunk("reasons", true));

        assert_eq!(composer.stage(), LoadingStage::Thinking);
        assert_eq!(composer.display(), "**🤔 Thinking:**\n\nbecause reasons");
        assert!(!composer.display().contains("Answer"));
    }

    #[test]
    fn answer_after_thinking_shows_both() {
        let mut composer = ResponseComposer::new();
        composer.apply(&chunk("pondering", true));
        composer.apply(&chunk("42", false));

        assert_eq!(composer.stage(), LoadingStage::Generating);
        let display = composer.display();
        assert!(display.contains("**🤔 Thought process:**\n\npondering"));
        assert!(display.contains("---\n\n**💬 Answer:**\n\n42"));
        // Thinking precedes the answer.
        assert!(display.find("Thought process").unwrap() < display.find("Answer").unwrap());
    }

    #[test]
    fn plain_answer_has_no_decoration() {
        let mut composer = ResponseComposer::new();
        composer.apply(&chunk("hello", false));
        composer.apply(&chunk(" world", false));

        assert_eq!(
            composer.display(),
            "---\n\n**💬 Answer:**\n\nhello world"
        );
        assert_eq!(composer.answer(), "hello world");
    }

    #[test]
    fn calling_banner_while_in_flight() {
        let mut composer = ResponseComposer::new();
        composer.apply(&tool(ToolPhase::Calling, "search"));

        assert_eq!(composer.stage(), LoadingStage::ToolCalling);
        assert!(
            composer
                .display()
                .contains("**🔧 Calling tools, please wait: search**")
        );
    }

    #[test]
    fn completed_tool_stays_on_calling_banner() {
        let mut composer = ResponseComposer::new();
        composer.apply(&tool(ToolPhase::Calling, "search"));
        composer.apply(&tool(ToolPhase::Success, "search"));

        // The calling list never shrinks mid-turn, so the calling banner
        // still wins while the turn is live.
        assert!(composer.display().contains("Calling tools"));
        assert_eq!(composer.stage(), LoadingStage::ToolCalling);
    }

    #[test]
    fn success_without_start_shows_completed_banner() {
        let mut composer = ResponseComposer::new();
        composer.apply(&tool(ToolPhase::ToolSuccess, "lookup"));

        assert!(composer.display().contains("**✅ Tools succeeded: lookup**"));
        assert_eq!(composer.stage(), LoadingStage::Generating);
    }

    #[test]
    fn completed_survives_later_chunks() {
        let mut composer = ResponseComposer::new();
        composer.apply(&tool(ToolPhase::ToolSuccess, "search"));
        composer.apply(&chunk("found it", false));
        composer.apply(&chunk(" easily", false));

        assert!(composer.display().contains("Tools succeeded: search"));
        assert!(composer.display().contains("found it easily"));
    }

    #[test]
    fn failed_tool_is_not_listed_as_completed() {
        let mut composer = ResponseComposer::new();
        composer.apply(&tool(ToolPhase::Calling, "flaky"));
        composer.apply(&tool(ToolPhase::Error, "flaky"));

        let final_content = composer.finalize();
        assert!(!final_content.contains("Tools succeeded"));
    }

    #[test]
    fn finalize_drops_calling_keeps_completed() {
        let mut composer = ResponseComposer::new();
        composer.apply(&tool(ToolPhase::Calling, "search"));
        composer.apply(&chunk("the answer", false));
        composer.apply(&tool(ToolPhase::Success, "search"));

        let final_content = composer.finalize();
        assert!(final_content.contains("Tools succeeded: search"));
        assert!(final_content.contains("the answer"));
        assert!(!final_content.contains("Calling tools"));
    }

    #[test]
    fn empty_turn_finalizes_to_fallback() {
        let composer = ResponseComposer::new();
        assert_eq!(composer.finalize(), EMPTY_REPLY);
    }

    #[test]
    fn duplicate_tool_names_collapse() {
        let mut composer = ResponseComposer::new();
        composer.apply(&tool(ToolPhase::Calling, "search"));
        composer.apply(&tool(ToolPhase::ToolStart, "search"));
        composer.apply(&tool(ToolPhase::Calling, "maps"));

        assert!(
            composer
                .display()
                .contains("Calling tools, please wait: search, maps")
        );
    }

    #[test]
    fn terminal_events_do_not_touch_display() {
        let mut composer = ResponseComposer::new();
        composer.apply(&chunk("partial", false));
        let before = composer.display().to_string();
        composer.apply(&StreamEvent::Complete);
        assert_eq!(composer.display(), before);
    }
}
