use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request body for creating a remote agent session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InitRequest {
    /// Persistent client identity; correlates sessions to a device.
    pub user_id: String,

    /// Persona preset the session should start from.
    pub mask_id: String,

    /// Server-side agent handler, e.g. "general" or "ticket".
    pub agent_type: String,

    /// Client-generated UUID carried so the backend can dedupe sessions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_uuid: Option<Uuid>,

    /// Force a brand new session even if one exists for the UUID.
    pub force_new: bool,
}

impl InitRequest {
    /// Creates a new init request.
    ///
    /// `force_new` follows the session UUID: when the client minted a UUID
    /// for this session it always wants a fresh backend session for it.
    pub fn new(
        user_id: impl Into<String>,
        mask_id: impl Into<String>,
        agent_type: impl Into<String>,
        session_uuid: Option<Uuid>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            mask_id: mask_id.into(),
            agent_type: agent_type.into(),
            force_new: session_uuid.is_some(),
            session_uuid,
        }
    }
}

/// Response body from the init endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InitResponse {
    /// The identifier the backend will track conversational state under.
    pub session_id: String,
}
