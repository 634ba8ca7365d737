use serde::{Deserialize, Serialize};

/// Request body for a chat turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    /// Remote session to converse under.
    pub session_id: String,

    /// The user's message text.
    pub message: String,

    /// Server-side paths of attachments uploaded earlier.
    pub file_paths: Vec<String>,

    /// Whether the agent should stream its reasoning separately.
    pub deep_thinking: bool,
}

impl ChatRequest {
    /// Creates a chat request with no attachments.
    pub fn new(
        session_id: impl Into<String>,
        message: impl Into<String>,
        deep_thinking: bool,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            message: message.into(),
            file_paths: Vec::new(),
            deep_thinking,
        }
    }

    /// Attaches server-side file paths to the request.
    pub fn with_file_paths(mut self, file_paths: Vec<String>) -> Self {
        self.file_paths = file_paths;
        self
    }
}

/// Non-streaming reply body, used by the legacy single-JSON path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatReply {
    /// The full reply text.
    pub response: String,
}
