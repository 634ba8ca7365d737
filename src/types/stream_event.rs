use serde::{Deserialize, Serialize};

/// One event from the chat response stream.
///
/// The wire format is a sequence of newline-delimited `data: {json}` lines;
/// each payload is tagged with a `type` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A fragment of model output, either reasoning or answer text.
    Chunk {
        /// The text fragment.
        #[serde(default)]
        content: String,

        /// True when the fragment belongs to the thinking stream.
        #[serde(default)]
        is_thinking: bool,
    },

    /// A change in the status of a server-side tool invocation.
    ToolStatus {
        /// What happened to the tool.
        tool_status: ToolPhase,

        /// The tool's name.
        #[serde(default)]
        tool_name: Option<String>,

        /// The server the tool lives on, if namespaced.
        #[serde(default)]
        server_name: Option<String>,

        /// Optional human-readable detail.
        #[serde(default)]
        content: Option<String>,
    },

    /// The reply is complete; the stream ends after this.
    Complete,

    /// The backend reported a failure mid-stream.
    Error {
        /// Server-supplied failure description.
        #[serde(default)]
        error: Option<String>,
    },

    /// Trailing end-of-stream marker, equivalent to `Complete`.
    Done,
}

impl StreamEvent {
    /// Display label for the tool a `ToolStatus` event refers to.
    ///
    /// Namespaced as `server.tool` when both parts are present.
    pub fn tool_label(&self) -> Option<String> {
        match self {
            StreamEvent::ToolStatus {
                tool_name,
                server_name,
                ..
            } => Some(match (server_name, tool_name) {
                (Some(server), Some(tool)) => format!("{server}.{tool}"),
                (None, Some(tool)) => tool.clone(),
                _ => "unknown".to_string(),
            }),
            _ => None,
        }
    }

    /// True for the events that terminate the read loop.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete | StreamEvent::Done)
    }
}

/// Lifecycle phases a tool invocation can report.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolPhase {
    /// The tool is being invoked.
    Calling,
    /// Alternate spelling of `Calling` used by some agents.
    ToolStart,
    /// The tool finished successfully.
    Success,
    /// Alternate spelling of `Success` used by some agents.
    ToolSuccess,
    /// The tool failed.
    Error,
    /// The tool timed out.
    Timeout,
}

impl ToolPhase {
    /// True when the phase marks the start of an invocation.
    pub fn is_start(&self) -> bool {
        matches!(self, ToolPhase::Calling | ToolPhase::ToolStart)
    }

    /// True when the phase marks a successful completion.
    pub fn is_success(&self) -> bool {
        matches!(self, ToolPhase::Success | ToolPhase::ToolSuccess)
    }
}
