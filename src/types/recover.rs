use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request body for recovering a lost remote agent session.
///
/// Carries the old session id so the backend can reattach conversational
/// state, plus everything needed to mint a replacement if it cannot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecoverRequest {
    /// Persistent client identity.
    pub user_id: String,

    /// Persona preset of the session being recovered.
    pub mask_id: String,

    /// Server-side agent handler.
    pub agent_type: String,

    /// The remote session id that went missing.
    pub session_id: String,

    /// Client-generated UUID for the local session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_uuid: Option<Uuid>,
}

/// Response body from the recover endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecoverResponse {
    /// Whether the backend produced a usable session.
    pub success: bool,

    /// The session id to adopt; may differ from the one sent.
    #[serde(default)]
    pub session_id: Option<String>,

    /// True if prior state was reattached, false if a new session was made.
    #[serde(default)]
    pub recovered: bool,
}
