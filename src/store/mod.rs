//! The chat session store: single source of truth for all sessions.
//!
//! All mutation funnels through [`ChatStore::update_session`], which
//! persists the serialized session blob wholesale and notifies
//! subscribers over a broadcast channel. Sessions are addressed by id,
//! never by index: indices shift on reorder and delete.
//!
//! # Architecture
//!
//! The module is organized into three parts:
//!
//! - `mod.rs`: the store container, session CRUD, persistence, pub/sub,
//!   and the suggested-questions flow
//! - `turn`: turn orchestration, from retry wrapping and the session
//!   protocol through stream ingestion and failure classification
//! - `context`: context-window assembly and memory/title summarization

mod context;
mod turn;

pub use context::Summarizer;

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{CachedKind, QuestionCacheEntry};
use crate::client::AgentApi;
use crate::config::StoreConfig;
use crate::controller::ControllerPool;
use crate::error::Result;
use crate::mask::Mask;
use crate::questions::fallback_questions;
use crate::session::{ChatMessage, ChatSession};
use crate::storage::KvStorage;
use crate::types::{Question, QuestionKind, SuggestedQuestionsRequest};

const SESSIONS_KEY: &str = "chat_sessions";
const USER_ID_KEY: &str = "persistent_user_id";
const SESSIONS_FILE_VERSION: u32 = 1;

/// Change notifications published to subscribers.
#[derive(Debug, Clone)]
pub enum StoreUpdate {
    /// Sessions were added, removed, or reordered.
    SessionList,
    /// One session's fields changed.
    Session {
        /// The session that changed.
        session_id: String,
    },
    /// One message changed (typically during streaming).
    Message {
        /// The session holding the message.
        session_id: String,
        /// The message that changed.
        message_id: String,
    },
}

#[derive(Serialize, Deserialize)]
struct SessionsFile {
    version: u32,
    current_index: usize,
    sessions: Vec<ChatSession>,
}

pub(crate) struct StoreState {
    pub(crate) sessions: Vec<ChatSession>,
    pub(crate) current_index: usize,
}

impl StoreState {
    fn clamp(&mut self) {
        if self.sessions.is_empty() {
            self.sessions.push(ChatSession::new());
        }
        if self.current_index >= self.sessions.len() {
            self.current_index = self.sessions.len() - 1;
        }
    }

    pub(crate) fn current(&mut self) -> &mut ChatSession {
        self.clamp();
        &mut self.sessions[self.current_index]
    }

    fn find(&mut self, session_id: &str) -> Option<&mut ChatSession> {
        self.sessions.iter_mut().find(|s| s.id == session_id)
    }
}

/// A deleted session, kept around so the deletion can be undone.
#[derive(Debug, Clone)]
pub struct RemovedSession {
    /// The removed session, remote binding already cleared.
    pub session: ChatSession,
    /// Where it sat in the list.
    pub index: usize,
}

/// Single source of truth for all chat sessions.
pub struct ChatStore {
    state: Mutex<StoreState>,
    user_id: String,
    api: Arc<dyn AgentApi>,
    storage: Arc<dyn KvStorage>,
    controllers: ControllerPool,
    config: StoreConfig,
    summarizer: Option<Arc<dyn Summarizer>>,
    updates: broadcast::Sender<StoreUpdate>,
}

impl ChatStore {
    /// Creates a store over an agent API and a storage collaborator.
    ///
    /// Previously persisted sessions are loaded; a corrupt blob is
    /// discarded with a warning rather than blocking startup. The
    /// persistent user id is created on first run.
    pub fn new(
        api: Arc<dyn AgentApi>,
        storage: Arc<dyn KvStorage>,
        config: StoreConfig,
    ) -> Result<Self> {
        let user_id = load_or_create_user_id(storage.as_ref())?;
        let state = load_state(storage.as_ref());
        let (updates, _) = broadcast::channel(256);

        Ok(Self {
            state: Mutex::new(state),
            user_id,
            api,
            storage,
            controllers: ControllerPool::new(),
            config,
            summarizer: None,
            updates,
        })
    }

    /// Attaches a summarizer for rolling memory and auto titles.
    ///
    /// Without one, summarization maintenance is skipped entirely.
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Subscribes to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreUpdate> {
        self.updates.subscribe()
    }

    /// The persistent client identity sent with every request.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub(crate) fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub(crate) fn api(&self) -> &dyn AgentApi {
        self.api.as_ref()
    }

    pub(crate) fn controllers(&self) -> &ControllerPool {
        &self.controllers
    }

    pub(crate) fn summarizer(&self) -> Option<Arc<dyn Summarizer>> {
        self.summarizer.clone()
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut StoreState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    pub(crate) fn publish(&self, update: StoreUpdate) {
        // No receivers is fine; the store works headless.
        let _ = self.updates.send(update);
    }

    /// Reads a session by id without mutating it.
    pub fn with_session<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&ChatSession) -> R,
    ) -> Option<R> {
        self.with_state(|state| state.find(session_id).map(|session| f(session)))
    }

    /// The single mutation entry point.
    ///
    /// Applies `f` to the session with the given id, rewrites the
    /// persisted blob, and publishes a [`StoreUpdate::Session`].
    pub fn update_session<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut ChatSession) -> R,
    ) -> Option<R> {
        let result = self.with_state(|state| state.find(session_id).map(f));
        if result.is_some() {
            self.persist();
            self.publish(StoreUpdate::Session {
                session_id: session_id.to_string(),
            });
        }
        result
    }

    /// Mutates one message, publishing a message-level update.
    pub fn update_message<R>(
        &self,
        session_id: &str,
        message_id: &str,
        f: impl FnOnce(&mut ChatMessage) -> R,
    ) -> Option<R> {
        let result = self.with_state(|state| {
            state
                .find(session_id)
                .and_then(|session| session.messages.iter_mut().find(|m| m.id == message_id))
                .map(f)
        });
        if result.is_some() {
            self.persist();
            self.publish(StoreUpdate::Message {
                session_id: session_id.to_string(),
                message_id: message_id.to_string(),
            });
        }
        result
    }

    /// Rewrites the persisted session blob.
    ///
    /// Best effort: a write failure is logged, never surfaced, so a full
    /// disk cannot take down the conversation.
    fn persist(&self) {
        let blob = self.with_state(|state| {
            serde_json::to_string(&SessionsFile {
                version: SESSIONS_FILE_VERSION,
                current_index: state.current_index,
                sessions: state.sessions.clone(),
            })
        });
        match blob {
            Ok(blob) => {
                if let Err(err) = self.storage.set(SESSIONS_KEY, &blob) {
                    warn!(error = %err, "failed to persist sessions");
                }
            }
            Err(err) => warn!(error = %err, "failed to serialize sessions"),
        }
    }

    // ---- session list operations ----

    /// All sessions, cloned.
    pub fn sessions(&self) -> Vec<ChatSession> {
        self.with_state(|state| {
            state.clamp();
            state.sessions.clone()
        })
    }

    /// Number of sessions.
    pub fn session_count(&self) -> usize {
        self.with_state(|state| state.sessions.len())
    }

    /// Index of the selected session.
    pub fn current_index(&self) -> usize {
        self.with_state(|state| {
            state.clamp();
            state.current_index
        })
    }

    /// A clone of the selected session.
    pub fn current_session(&self) -> ChatSession {
        self.with_state(|state| state.current().clone())
    }

    /// Creates a session, optionally from a persona preset, and selects it.
    ///
    /// Returns the new session's id.
    pub fn new_session(&self, mask: Option<Mask>) -> String {
        let mut session = match mask {
            Some(mask) => ChatSession::with_mask(mask),
            None => ChatSession::new(),
        };
        session.deep_thinking = self.config.deep_thinking;
        let session_id = session.id.clone();

        self.with_state(|state| {
            state.sessions.insert(0, session);
            state.current_index = 0;
        });
        self.persist();
        self.publish(StoreUpdate::SessionList);
        session_id
    }

    /// Selects a session by index, clamped to the list.
    pub fn select_session(&self, index: usize) {
        self.with_state(|state| {
            state.current_index = index;
            state.clamp();
        });
        self.persist();
        self.publish(StoreUpdate::SessionList);
    }

    /// Moves the selection by `delta`, wrapping around.
    pub fn next_session(&self, delta: isize) {
        self.with_state(|state| {
            state.clamp();
            let n = state.sessions.len() as isize;
            let i = state.current_index as isize;
            state.current_index = ((i + delta) % n + n) as usize % n as usize;
        });
        self.persist();
        self.publish(StoreUpdate::SessionList);
    }

    /// Reorders the session list, keeping the selection pointed at the
    /// same session.
    pub fn move_session(&self, from: usize, to: usize) {
        self.with_state(|state| {
            if from >= state.sessions.len() || to >= state.sessions.len() {
                return;
            }
            let session = state.sessions.remove(from);
            state.sessions.insert(to, session);

            let old_index = state.current_index;
            let mut new_index = if old_index == from { to } else { old_index };
            if old_index > from && old_index <= to {
                new_index -= 1;
            } else if old_index < from && old_index >= to {
                new_index += 1;
            }
            state.current_index = new_index;
        });
        self.persist();
        self.publish(StoreUpdate::SessionList);
    }

    /// Forks the selected session into a new one at the front.
    ///
    /// Returns the fork's id.
    pub fn fork_current(&self) -> String {
        let fork = self.with_state(|state| state.current().fork());
        let fork_id = fork.id.clone();
        self.with_state(|state| {
            state.sessions.insert(0, fork);
            state.current_index = 0;
        });
        self.persist();
        self.publish(StoreUpdate::SessionList);
        fork_id
    }

    /// Deletes a session by index.
    ///
    /// The backend is notified best-effort; a failure there is logged and
    /// never blocks the local removal. Returns the removed session so the
    /// caller can offer undo via [`restore_session`](Self::restore_session).
    pub async fn delete_session(&self, index: usize) -> Option<RemovedSession> {
        let (removed, remote_id) = self.with_state(|state| {
            if index >= state.sessions.len() {
                return (None, None);
            }
            let mut session = state.sessions.remove(index);
            let remote_id = session.agent_session_id.take();
            if state.sessions.is_empty() {
                state.sessions.push(ChatSession::new());
                state.current_index = 0;
            } else if state.current_index > index
                || state.current_index >= state.sessions.len()
            {
                state.current_index = state
                    .current_index
                    .saturating_sub(1)
                    .min(state.sessions.len() - 1);
            }
            (Some(RemovedSession { session, index }), remote_id)
        });

        if removed.is_some() {
            self.persist();
            self.publish(StoreUpdate::SessionList);
        }

        // Release the backend's session after the local state settles.
        if let Some(remote_id) = remote_id {
            match self.api.remove_session(&remote_id).await {
                Ok(()) => info!(session_id = %remote_id, "released remote agent session"),
                Err(err) => {
                    warn!(session_id = %remote_id, error = %err, "failed to release remote agent session");
                }
            }
        }

        removed
    }

    /// Restores a previously deleted session (undo).
    ///
    /// The remote binding is gone; the next turn re-initializes it.
    pub fn restore_session(&self, removed: RemovedSession) {
        self.with_state(|state| {
            let index = removed.index.min(state.sessions.len());
            state.sessions.insert(index, removed.session);
            state.current_index = index;
        });
        self.persist();
        self.publish(StoreUpdate::SessionList);
    }

    /// Replaces everything with a single empty session.
    pub fn clear_sessions(&self) {
        self.with_state(|state| {
            state.sessions = vec![ChatSession::new()];
            state.current_index = 0;
        });
        self.persist();
        self.publish(StoreUpdate::SessionList);
    }

    /// Clears the selected session's history.
    ///
    /// Locally this toggles the clear watermark; the backend is told
    /// best-effort to drop its copy too.
    pub async fn clear_history(&self) {
        let (session_id, remote_id) = self.with_state(|state| {
            let session = state.current();
            (session.id.clone(), session.agent_session_id.clone())
        });

        self.update_session(&session_id, |session| {
            session.toggle_clear_context();
        });

        if let Some(remote_id) = remote_id {
            match self.api.clear_history(&remote_id).await {
                Ok(()) => info!(session_id = %remote_id, "cleared remote agent history"),
                Err(err) => {
                    warn!(session_id = %remote_id, error = %err, "failed to clear remote agent history");
                }
            }
        }
    }

    // ---- cancellation ----

    /// Cancels the live turn of the selected session, if any.
    pub fn cancel_current(&self) -> bool {
        let live = self.with_state(|state| {
            let session = state.current();
            session
                .messages
                .iter()
                .rev()
                .find(|m| m.streaming)
                .map(|m| (session.id.clone(), m.id.clone()))
        });
        match live {
            Some((session_id, message_id)) => self.controllers.cancel(&session_id, &message_id),
            None => false,
        }
    }

    /// Cancels one specific turn.
    pub fn cancel_turn(&self, session_id: &str, message_id: &str) -> bool {
        self.controllers.cancel(session_id, message_id)
    }

    // ---- suggested questions ----

    /// Returns suggested questions for the selected session.
    ///
    /// Serves from the session cache when a valid entry covers the
    /// request; otherwise asks the backend, falling back to the local
    /// per-agent catalog when that fails. The result is cached either way.
    pub async fn suggested_questions(&self, kind: QuestionKind) -> Result<Vec<Question>> {
        let (session_id, remote_id, agent_type, last_user_message) = self.with_state(|state| {
            let session = state.current();
            let last_user = session
                .messages
                .iter()
                .rev()
                .find(|m| !m.is_error && m.role == crate::session::MessageRole::User)
                .map(|m| m.content.clone());
            (
                session.id.clone(),
                session.agent_session_id.clone(),
                session.mask.agent_type.clone(),
                last_user,
            )
        });

        let user_message = match kind {
            QuestionKind::Default => None,
            QuestionKind::Related => last_user_message,
        };
        if kind == QuestionKind::Related && user_message.is_none() {
            // Nothing to relate to yet.
            return Ok(fallback_questions(&agent_type));
        }

        let now = OffsetDateTime::now_utc();
        let cached = self.with_session(&session_id, |session| {
            session
                .suggested_questions
                .lookup(kind, remote_id.as_deref(), user_message.as_deref(), now)
                .map(<[Question]>::to_vec)
        });
        if let Some(Some(hit)) = cached {
            debug!(?kind, "suggested questions served from cache");
            return Ok(hit);
        }

        let request = SuggestedQuestionsRequest {
            session_id: remote_id.clone(),
            kind,
            user_message: user_message.clone(),
        };
        let questions = match self.api.suggested_questions(&request).await {
            Ok(response) if response.success && !response.questions.is_empty() => {
                response.questions
            }
            Ok(_) => {
                debug!(?kind, "backend returned no questions, using fallback");
                fallback_questions(&agent_type)
            }
            Err(err) => {
                warn!(?kind, error = %err, "suggested questions failed, using fallback");
                fallback_questions(&agent_type)
            }
        };

        let entry = QuestionCacheEntry::new(
            questions.clone(),
            remote_id,
            match kind {
                QuestionKind::Default => CachedKind::Default,
                QuestionKind::Related => CachedKind::Related {
                    user_message: user_message.unwrap_or_default(),
                },
            },
        );
        self.update_session(&session_id, |session| {
            session.suggested_questions.store(entry);
        });

        Ok(questions)
    }
}

fn load_or_create_user_id(storage: &dyn KvStorage) -> Result<String> {
    if let Some(user_id) = storage.get(USER_ID_KEY)? {
        if !user_id.trim().is_empty() {
            return Ok(user_id);
        }
    }
    let user_id = format!("user_{}", Uuid::new_v4());
    storage.set(USER_ID_KEY, &user_id)?;
    info!(user_id, "generated persistent user id");
    Ok(user_id)
}

fn load_state(storage: &dyn KvStorage) -> StoreState {
    let fresh = || StoreState {
        sessions: vec![ChatSession::new()],
        current_index: 0,
    };

    let blob = match storage.get(SESSIONS_KEY) {
        Ok(Some(blob)) => blob,
        Ok(None) => return fresh(),
        Err(err) => {
            warn!(error = %err, "failed to read persisted sessions");
            return fresh();
        }
    };

    match serde_json::from_str::<SessionsFile>(&blob) {
        Ok(file) => {
            let mut state = StoreState {
                sessions: file.sessions,
                current_index: file.current_index,
            };
            state.clamp();
            state
        }
        Err(err) => {
            warn!(error = %err, "persisted sessions were unreadable, starting fresh");
            fresh()
        }
    }
}
