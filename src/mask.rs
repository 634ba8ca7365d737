//! Persona presets ("masks") applied when starting a session.
//!
//! A mask names the server-side agent to talk to, seeds the conversation
//! with fixed context, and carries the per-session tuning knobs for
//! context windowing and summarization. Presets can be defined in code or
//! loaded from a YAML catalog.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::session::ChatMessage;

/// Default cap on context assembly, in estimated tokens.
const DEFAULT_MAX_CONTEXT_TOKENS: usize = 4_000;

/// Default number of recent messages considered for the window.
const DEFAULT_HISTORY_MESSAGE_COUNT: usize = 8;

/// Default unsummarized-token threshold that triggers memory compression.
const DEFAULT_COMPRESS_THRESHOLD: usize = 1_000;

/// Tuning knobs for context windowing and summarization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelTuning {
    /// How many recent messages the short-term window considers.
    pub history_message_count: usize,

    /// Unsummarized token count that triggers memory summarization.
    pub compress_message_length_threshold: usize,

    /// Token budget for the assembled context window.
    pub max_context_tokens: usize,

    /// Whether the long-term memory summary is sent upstream at all.
    pub send_memory: bool,

    /// Optional system prompt injected at the head of the window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for ModelTuning {
    fn default() -> Self {
        Self {
            history_message_count: DEFAULT_HISTORY_MESSAGE_COUNT,
            compress_message_length_threshold: DEFAULT_COMPRESS_THRESHOLD,
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            send_memory: true,
            system_prompt: None,
        }
    }
}

/// A persona preset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Mask {
    /// Stable identifier sent to the backend as `mask_id`.
    pub id: String,

    /// Display name; becomes the initial topic of new sessions.
    pub name: String,

    /// Server-side agent handler this persona talks to.
    pub agent_type: String,

    /// Short description shown in a persona picker.
    #[serde(default)]
    pub description: String,

    /// Fixed in-context messages sent ahead of the conversation.
    #[serde(default)]
    pub context: Vec<ChatMessage>,

    /// Client-minted UUID; forces a fresh backend session on init.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_uuid: Option<Uuid>,

    /// Windowing and summarization knobs.
    #[serde(default)]
    pub tuning: ModelTuning,
}

impl Mask {
    /// Creates a bare mask for the given agent type.
    pub fn new(id: impl Into<String>, name: impl Into<String>, agent_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            agent_type: agent_type.into(),
            description: String::new(),
            context: Vec::new(),
            session_uuid: None,
            tuning: ModelTuning::default(),
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the fixed in-context messages.
    pub fn with_context(mut self, context: Vec<ChatMessage>) -> Self {
        self.context = context;
        self
    }

    /// Mints a session UUID, forcing a fresh backend session on init.
    pub fn with_fresh_session_uuid(mut self) -> Self {
        self.session_uuid = Some(Uuid::new_v4());
        self
    }

    /// Sets the tuning knobs.
    pub fn with_tuning(mut self, tuning: ModelTuning) -> Self {
        self.tuning = tuning;
        self
    }
}

impl Default for Mask {
    fn default() -> Self {
        Mask::new("default", "", "general")
    }
}

/// The built-in persona catalog.
pub fn builtin_masks() -> Vec<Mask> {
    vec![
        Mask::new("default", "Companion", "general")
            .with_description("General-purpose assistant: chat, search, directions."),
        Mask::new("coding-1", "Coding Assistant", "coding")
            .with_description("Programming, development, and technical questions."),
        Mask::new("writing-1", "Writing Assistant", "writing")
            .with_description("Writing, copy, and content creation."),
        Mask::new("business-1", "Business Advisor", "business")
            .with_description("Business, management, and entrepreneurship."),
        Mask::new("education-1", "Education Assistant", "education")
            .with_description("Study methods, learning plans, and skills."),
        Mask::new("ticket-1", "Ticket Assistant", "ticket")
            .with_description("Ticket order lookups, analytics, and reports."),
    ]
}

/// Loads a persona catalog from YAML.
///
/// The document is a sequence of masks; unknown ids simply extend the
/// catalog, so a deployment can ship presets without recompiling.
pub fn masks_from_yaml(yaml: &str) -> Result<Vec<Mask>> {
    serde_yaml::from_str(yaml)
        .map_err(|e| Error::serialization(format!("failed to parse mask catalog: {e}"), Some(Box::new(e))))
}

/// Finds a mask by id, if the catalog has it.
pub fn find_mask<'a>(masks: &'a [Mask], id: &str) -> Option<&'a Mask> {
    masks.iter().find(|mask| mask.id == id)
}
