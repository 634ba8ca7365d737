//! Shared test doubles for unit tests.

use async_trait::async_trait;

use crate::client::{AgentApi, EventStream};
use crate::error::{Error, Result};
use crate::types::{
    ChatRequest, InitRequest, InitResponse, RecoverRequest, RecoverResponse, SessionStatus,
    SuggestedQuestionsRequest, SuggestedQuestionsResponse,
};

/// An agent API that answers every call with a benign default.
///
/// Useful for store tests that never reach the network: suggestions fail
/// over to the local catalog, lifecycle calls succeed silently, and chat
/// refuses outright.
#[derive(Debug, Default)]
pub(crate) struct NullApi;

#[async_trait]
impl AgentApi for NullApi {
    async fn init(&self, _request: &InitRequest) -> Result<InitResponse> {
        Ok(InitResponse {
            session_id: "sess-null".to_string(),
        })
    }

    async fn recover(&self, _request: &RecoverRequest) -> Result<RecoverResponse> {
        Ok(RecoverResponse {
            success: false,
            session_id: None,
            recovered: false,
        })
    }

    async fn session_status(&self, _session_id: &str) -> Result<SessionStatus> {
        Ok(SessionStatus {
            success: true,
            exists: false,
        })
    }

    async fn chat(&self, _request: &ChatRequest) -> Result<EventStream> {
        Err(Error::unknown("NullApi has no chat backend"))
    }

    async fn clear_history(&self, _session_id: &str) -> Result<()> {
        Ok(())
    }

    async fn remove_session(&self, _session_id: &str) -> Result<()> {
        Ok(())
    }

    async fn suggested_questions(
        &self,
        _request: &SuggestedQuestionsRequest,
    ) -> Result<SuggestedQuestionsResponse> {
        Ok(SuggestedQuestionsResponse {
            success: false,
            questions: Vec::new(),
        })
    }
}
