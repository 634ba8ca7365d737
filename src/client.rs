//! HTTP client for the remote agent service.
//!
//! [`AgentClient`] speaks the agent REST contract under `/flask/agent/`;
//! the [`AgentApi`] trait is the seam the session store depends on, so
//! tests can drive the whole protocol against a scripted fake.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};
use crate::observability;
use crate::sse::process_event_stream;
use crate::types::{
    ChatReply, ChatRequest, InitRequest, InitResponse, RecoverRequest, RecoverResponse,
    SessionStatus, StreamEvent, SuggestedQuestionsRequest, SuggestedQuestionsResponse,
};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000/flask/agent/";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// A stream of parsed chat events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// The operations the session store needs from the agent service.
///
/// Implemented by [`AgentClient`] over HTTP and by scripted fakes in tests.
#[async_trait]
pub trait AgentApi: Send + Sync {
    /// Creates a remote agent session.
    async fn init(&self, request: &InitRequest) -> Result<InitResponse>;

    /// Attempts to reattach a lost remote session.
    async fn recover(&self, request: &RecoverRequest) -> Result<RecoverResponse>;

    /// Probes whether a remote session still exists.
    async fn session_status(&self, session_id: &str) -> Result<SessionStatus>;

    /// Sends a chat turn and returns the response event stream.
    async fn chat(&self, request: &ChatRequest) -> Result<EventStream>;

    /// Best-effort: clears a remote session's history.
    async fn clear_history(&self, session_id: &str) -> Result<()>;

    /// Best-effort: releases a remote session entirely.
    async fn remove_session(&self, session_id: &str) -> Result<()>;

    /// Generates suggested follow-up questions.
    async fn suggested_questions(
        &self,
        request: &SuggestedQuestionsRequest,
    ) -> Result<SuggestedQuestionsResponse>;
}

/// HTTP client for the agent service.
#[derive(Debug, Clone)]
pub struct AgentClient {
    client: ReqwestClient,
    base_url: String,
    timeout: Duration,
}

impl AgentClient {
    /// Creates a client against the given base URL, or the local default.
    pub fn new(base_url: Option<String>) -> Result<Self> {
        Self::with_options(base_url, None)
    }

    /// Creates a client with custom settings.
    pub fn with_options(base_url: Option<String>, timeout: Option<Duration>) -> Result<Self> {
        let base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        // Validate early so every later join is infallible.
        Url::parse(&base_url)?;
        let base_url = if base_url.ends_with('/') {
            base_url
        } else {
            format!("{base_url}/")
        };

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    /// The resolved base URL, always slash-terminated.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }

    fn request_error(&self, e: reqwest::Error) -> Error {
        observability::CLIENT_REQUEST_ERRORS.click();
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {e}"),
                Some(self.timeout.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
        }
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        observability::CLIENT_REQUEST_ERRORS.click();
        let status = response.status();
        let status_code = status.as_u16();

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        // Try to parse error response body
        #[derive(Deserialize)]
        struct ErrorResponse {
            error: Option<String>,
            #[serde(rename = "type")]
            error_type: Option<String>,
        }

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };

        let parsed = serde_json::from_str::<ErrorResponse>(&error_body).ok();
        let error_type = parsed.as_ref().and_then(|e| e.error_type.clone());
        let error_message = parsed
            .and_then(|e| e.error)
            .unwrap_or_else(|| error_body.clone());

        match status_code {
            400 => Error::bad_request(error_message, None),
            404 => Error::not_found(error_message, Some("session".to_string()), None),
            408 => Error::timeout(error_message, None),
            429 => Error::rate_limit(error_message, retry_after),
            500 => Error::internal_server(error_message),
            502..=504 => Error::service_unavailable(error_message, retry_after),
            _ => Error::api(status_code, error_type, error_message),
        }
    }

    async fn post_json<B: serde::Serialize>(&self, path: &str, body: &B) -> Result<Response> {
        observability::CLIENT_REQUESTS.click();
        let response = self
            .client
            .post(self.endpoint(path))
            .headers(self.default_headers())
            .json(body)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }
        Ok(response)
    }

    async fn parse_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
        response.json::<T>().await.map_err(|e| {
            Error::serialization(format!("Failed to parse response: {e}"), Some(Box::new(e)))
        })
    }

    /// Sends a chat turn over the legacy non-streaming path.
    ///
    /// Kept for backends that answer with a single `{response}` body
    /// instead of an event stream.
    pub async fn chat_once(&self, request: &ChatRequest) -> Result<ChatReply> {
        let response = self.post_json("chat", request).await?;
        Self::parse_json(response).await
    }
}

#[async_trait]
impl AgentApi for AgentClient {
    async fn init(&self, request: &InitRequest) -> Result<InitResponse> {
        let response = self.post_json("init", request).await?;
        Self::parse_json(response).await
    }

    async fn recover(&self, request: &RecoverRequest) -> Result<RecoverResponse> {
        let response = self.post_json("recover", request).await?;
        Self::parse_json(response).await
    }

    async fn session_status(&self, session_id: &str) -> Result<SessionStatus> {
        observability::CLIENT_REQUESTS.click();
        let response = self
            .client
            .get(self.endpoint(&format!("session/{session_id}/status")))
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }
        Self::parse_json(response).await
    }

    async fn chat(&self, request: &ChatRequest) -> Result<EventStream> {
        observability::CLIENT_REQUESTS.click();
        let mut headers = self.default_headers();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );

        // The chat call is not bounded by the client-wide timeout: turns
        // can stream for minutes and cancellation runs through the
        // per-message token instead.
        let response = self
            .client
            .post(self.endpoint("chat"))
            .headers(headers)
            .timeout(Duration::from_secs(24 * 60 * 60))
            .json(request)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        let stream = response.bytes_stream();
        Ok(Box::pin(process_event_stream(stream)))
    }

    async fn clear_history(&self, session_id: &str) -> Result<()> {
        self.post_json(&format!("clear/{session_id}"), &serde_json::json!({}))
            .await?;
        Ok(())
    }

    async fn remove_session(&self, session_id: &str) -> Result<()> {
        observability::CLIENT_REQUESTS.click();
        let response = self
            .client
            .delete(self.endpoint(&format!("remove/{session_id}")))
            .headers(self.default_headers())
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }
        Ok(())
    }

    async fn suggested_questions(
        &self,
        request: &SuggestedQuestionsRequest,
    ) -> Result<SuggestedQuestionsResponse> {
        let response = self.post_json("suggested-questions", request).await?;
        Self::parse_json(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation() {
        let client = AgentClient::new(None).unwrap();
        assert_eq!(client.base_url, DEFAULT_BASE_URL);
        assert_eq!(client.timeout, DEFAULT_TIMEOUT);

        let client = AgentClient::with_options(
            Some("https://agents.example.com/flask/agent".to_string()),
            Some(Duration::from_secs(30)),
        )
        .unwrap();
        // A missing trailing slash is added.
        assert_eq!(client.base_url, "https://agents.example.com/flask/agent/");
        assert_eq!(client.timeout, Duration::from_secs(30));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = AgentClient::new(Some("not a url".to_string())).unwrap_err();
        assert!(matches!(err, Error::Url { .. }));
    }

    #[test]
    fn endpoints_join_cleanly() {
        let client =
            AgentClient::new(Some("https://agents.example.com/flask/agent/".to_string())).unwrap();
        assert_eq!(
            client.endpoint("session/abc/status"),
            "https://agents.example.com/flask/agent/session/abc/status"
        );
        assert_eq!(
            client.endpoint("init"),
            "https://agents.example.com/flask/agent/init"
        );
    }
}
