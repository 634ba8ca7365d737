//! The agent session protocol: validate, recover, initialize.
//!
//! Every chat turn must hold a live remote session id before it can POST.
//! [`ensure_session`] walks the per-turn state machine
//! `NO_SESSION -> VALIDATING -> {VALID, NEEDS_INIT} -> RECOVERING? ->
//! INITIALIZED`, clearing a dead binding, trying to reattach the old
//! session, and finally minting a new one.

use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::AgentApi;
use crate::error::{Error, Result};
use crate::types::{InitRequest, RecoverRequest};

/// Client-side timeout on the lightweight status probe.
///
/// Only the probe gets a hard timeout; chat and streaming rely on the
/// per-message cancellation token instead.
pub const STATUS_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything the backend needs to identify or mint a session.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    /// Persistent client identity.
    pub user_id: String,
    /// Persona preset id.
    pub mask_id: String,
    /// Server-side agent handler.
    pub agent_type: String,
    /// Client-minted UUID, when the mask carries one.
    pub session_uuid: Option<Uuid>,
}

/// Ensures `binding` holds a usable remote session id and returns it.
///
/// With `is_retry` set (the one-shot path after a chat 404) validation and
/// recovery are skipped: an existing binding is trusted as-is and a
/// missing one goes straight to a fresh init.
///
/// # Errors
///
/// Only initialization failures surface, as [`Error::InitFailed`];
/// validation and recovery problems degrade to a fresh init instead.
pub async fn ensure_session(
    api: &dyn AgentApi,
    binding: &mut Option<String>,
    identity: &SessionIdentity,
    is_retry: bool,
) -> Result<String> {
    if let Some(session_id) = binding.as_ref() {
        if is_retry {
            return Ok(session_id.clone());
        }

        debug!(session_id, "validating remote session");
        match tokio::time::timeout(STATUS_PROBE_TIMEOUT, api.session_status(session_id)).await {
            Ok(Ok(status)) if status.is_live() => {
                return Ok(session_id.clone());
            }
            Ok(Ok(_)) => {
                warn!(session_id, "remote session no longer exists");
            }
            Ok(Err(err)) => {
                warn!(session_id, error = %err, "session status probe failed");
            }
            Err(_) => {
                warn!(session_id, "session status probe timed out");
            }
        }

        // Invalidated: drop the binding but remember the old id so the
        // backend gets a chance to reattach its state.
        let old_id = binding.take().unwrap_or_default();

        debug!(old_id, "attempting session recovery");
        let request = RecoverRequest {
            user_id: identity.user_id.clone(),
            mask_id: identity.mask_id.clone(),
            agent_type: identity.agent_type.clone(),
            session_id: old_id.clone(),
            session_uuid: identity.session_uuid,
        };
        match api.recover(&request).await {
            Ok(response) if response.success => {
                if let Some(new_id) = response.session_id {
                    info!(
                        session_id = %new_id,
                        recovered = response.recovered,
                        "session recovery succeeded"
                    );
                    *binding = Some(new_id.clone());
                    return Ok(new_id);
                }
                warn!(old_id, "recovery succeeded but returned no session id");
            }
            Ok(_) => {
                warn!(old_id, "session recovery was unsuccessful");
            }
            Err(err) => {
                warn!(old_id, error = %err, "session recovery failed");
            }
        }
    }

    debug!("initializing a new remote session");
    let request = InitRequest::new(
        identity.user_id.clone(),
        identity.mask_id.clone(),
        identity.agent_type.clone(),
        identity.session_uuid,
    );
    match api.init(&request).await {
        Ok(response) => {
            info!(session_id = %response.session_id, "remote session initialized");
            *binding = Some(response.session_id.clone());
            Ok(response.session_id)
        }
        Err(err) => Err(Error::init_failed(format!(
            "could not create an agent session: {err}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::client::EventStream;
    use crate::types::{
        ChatRequest, InitResponse, RecoverResponse, SessionStatus, SuggestedQuestionsRequest,
        SuggestedQuestionsResponse,
    };

    #[derive(Default)]
    struct FakeApi {
        status: Option<Result<SessionStatus>>,
        recover: Option<Result<RecoverResponse>>,
        init: Option<Result<InitResponse>>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl FakeApi {
        fn log(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AgentApi for FakeApi {
        async fn init(&self, _request: &InitRequest) -> Result<InitResponse> {
            self.log("init");
            self.init
                .clone()
                .unwrap_or_else(|| panic!("unexpected init call"))
        }

        async fn recover(&self, _request: &RecoverRequest) -> Result<RecoverResponse> {
            self.log("recover");
            self.recover
                .clone()
                .unwrap_or_else(|| panic!("unexpected recover call"))
        }

        async fn session_status(&self, _session_id: &str) -> Result<SessionStatus> {
            self.log("status");
            self.status
                .clone()
                .unwrap_or_else(|| panic!("unexpected status call"))
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<EventStream> {
            panic!("chat is not part of ensure_session");
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
            panic!("suggested_questions is not part of ensure_session");
        }
    }

    fn identity() -> SessionIdentity {
        SessionIdentity {
            user_id: "user_test".to_string(),
            mask_id: "default".to_string(),
            agent_type: "general".to_string(),
            session_uuid: None,
        }
    }

    #[tokio::test]
    async fn live_session_is_reused() {
        let api = FakeApi {
            status: Some(Ok(SessionStatus {
                success: true,
                exists: true,
            })),
            ..FakeApi::default()
        };
        let mut binding = Some("sess-live".to_string());

        let id = ensure_session(&api, &mut binding, &identity(), false)
            .await
            .unwrap();
        assert_eq!(id, "sess-live");
        assert_eq!(api.calls(), vec!["status"]);
        assert_eq!(binding.as_deref(), Some("sess-live"));
    }

    #[tokio::test]
    async fn dead_session_recovers() {
        let api = FakeApi {
            status: Some(Ok(SessionStatus {
                success: true,
                exists: false,
            })),
            recover: Some(Ok(RecoverResponse {
                success: true,
                session_id: Some("sess-recovered".to_string()),
                recovered: true,
            })),
            ..FakeApi::default()
        };
        let mut binding = Some("sess-dead".to_string());

        let id = ensure_session(&api, &mut binding, &identity(), false)
            .await
            .unwrap();
        assert_eq!(id, "sess-recovered");
        assert_eq!(api.calls(), vec!["status", "recover"]);
        assert_eq!(binding.as_deref(), Some("sess-recovered"));
    }

    #[tokio::test]
    async fn failed_recovery_falls_back_to_init() {
        let api = FakeApi {
            status: Some(Err(Error::not_found("gone", None, None))),
            recover: Some(Ok(RecoverResponse {
                success: false,
                session_id: None,
                recovered: false,
            })),
            init: Some(Ok(InitResponse {
                session_id: "sess-new".to_string(),
            })),
            ..FakeApi::default()
        };
        let mut binding = Some("sess-dead".to_string());

        let id = ensure_session(&api, &mut binding, &identity(), false)
            .await
            .unwrap();
        assert_eq!(id, "sess-new");
        assert_eq!(api.calls(), vec!["status", "recover", "init"]);
    }

    #[tokio::test]
    async fn no_binding_initializes_directly() {
        let api = FakeApi {
            init: Some(Ok(InitResponse {
                session_id: "sess-first".to_string(),
            })),
            ..FakeApi::default()
        };
        let mut binding = None;

        let id = ensure_session(&api, &mut binding, &identity(), false)
            .await
            .unwrap();
        assert_eq!(id, "sess-first");
        assert_eq!(api.calls(), vec!["init"]);
        assert_eq!(binding.as_deref(), Some("sess-first"));
    }

    #[tokio::test]
    async fn init_failure_is_fatal() {
        let api = FakeApi {
            init: Some(Err(Error::internal_server("db down"))),
            ..FakeApi::default()
        };
        let mut binding = None;

        let err = ensure_session(&api, &mut binding, &identity(), false)
            .await
            .unwrap_err();
        assert!(err.is_init_failed());
        assert!(!err.is_retryable());
        assert!(binding.is_none());
    }

    #[tokio::test]
    async fn retry_path_trusts_existing_binding() {
        // No status/recover configured: any probe would panic.
        let api = FakeApi::default();
        let mut binding = Some("sess-kept".to_string());

        let id = ensure_session(&api, &mut binding, &identity(), true)
            .await
            .unwrap();
        assert_eq!(id, "sess-kept");
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn retry_path_without_binding_goes_straight_to_init() {
        let api = FakeApi {
            init: Some(Ok(InitResponse {
                session_id: "sess-retry".to_string(),
            })),
            ..FakeApi::default()
        };
        let mut binding = None;

        let id = ensure_session(&api, &mut binding, &identity(), true)
            .await
            .unwrap();
        assert_eq!(id, "sess-retry");
        assert_eq!(api.calls(), vec!["init"]);
    }
}
