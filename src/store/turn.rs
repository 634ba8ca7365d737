//! Turn orchestration: from user input to a finalized assistant message.
//!
//! A turn appends the user message and a live assistant placeholder
//! atomically, then drives the agent protocol under the smart-retry
//! wrapper: ensure a remote session, POST the chat, ingest the event
//! stream. Transient failures are retried with backoff; a chat 404 gets
//! exactly one silent re-initialization; everything else finalizes the
//! message with a human-readable failure class.

use futures::StreamExt;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::EventStream;
use crate::compose::ResponseComposer;
use crate::error::{Error, Result};
use crate::observability;
use crate::protocol::{SessionIdentity, ensure_session};
use crate::retry::{RetryOptions, RetryPolicy, smart_retry};
use crate::session::{ChatMessage, LoadingStage, MessageRole};
use crate::store::{ChatStore, StoreUpdate};

/// Everything a turn needs, cloneable so each retry attempt can re-run it.
#[derive(Debug, Clone)]
struct TurnArgs {
    session_id: String,
    user_message_id: String,
    bot_message_id: String,
    content: String,
    attachments: Vec<String>,
    is_retry: bool,
}

impl ChatStore {
    /// Submits user input on the selected session and runs the turn to
    /// completion.
    ///
    /// The returned `Ok` means the turn was handled, including the case
    /// where it failed and the failure was recorded on the messages. An
    /// `Err` is reserved for local misuse (no session selected).
    pub async fn send_user_input(&self, content: &str, attachments: Vec<String>) -> Result<()> {
        let session_id = self.with_state(|state| state.current().id.clone());

        let user_message = ChatMessage::user(content);
        let bot_message = ChatMessage::assistant_placeholder();
        let user_message_id = user_message.id.clone();
        let bot_message_id = bot_message.id.clone();

        // One atomic append for the pair, so no observer ever sees the
        // user message without its placeholder.
        self.update_session(&session_id, |session| {
            session.messages.push(user_message);
            session.messages.push(bot_message);
            session.touch();
        })
        .ok_or_else(|| Error::validation("no session to send on", None))?;

        self.run_turn(TurnArgs {
            session_id,
            user_message_id,
            bot_message_id,
            content: content.to_string(),
            attachments,
            is_retry: false,
        })
        .await
    }

    /// Re-runs the last failed turn of the selected session.
    ///
    /// # Errors
    ///
    /// Fails synchronously when the history does not end in a
    /// user/assistant pair to re-run; that is caller misuse, not a
    /// network condition, and is never retried.
    pub async fn retry_last_turn(&self) -> Result<()> {
        let session_id = self.with_state(|state| state.current().id.clone());

        let (user_message_id, bot_message_id, content) = self
            .with_session(&session_id, |session| {
                let n = session.messages.len();
                if n < 2 {
                    return Err(Error::validation(
                        "not enough history to retry",
                        None,
                    ));
                }
                let user = &session.messages[n - 2];
                let bot = &session.messages[n - 1];
                if user.role != MessageRole::User {
                    return Err(Error::validation(
                        "no user message to retry; please resend",
                        None,
                    ));
                }
                if bot.role != MessageRole::Assistant {
                    return Err(Error::validation(
                        "no assistant message to retry; please resend",
                        None,
                    ));
                }
                Ok((user.id.clone(), bot.id.clone(), user.content.clone()))
            })
            .ok_or_else(|| Error::validation("no session to retry on", None))??;

        self.update_session(&session_id, |session| {
            if let Some(user) = session
                .messages
                .iter_mut()
                .find(|m| m.id == user_message_id)
            {
                user.is_error = false;
            }
            if let Some(bot) = session.messages.iter_mut().find(|m| m.id == bot_message_id) {
                bot.streaming = true;
                bot.is_error = false;
                bot.content = "Reconnecting...".to_string();
                bot.loading_stage = Some(LoadingStage::Connecting);
            }
        });

        self.run_turn(TurnArgs {
            session_id,
            user_message_id,
            bot_message_id,
            content,
            attachments: Vec::new(),
            is_retry: true,
        })
        .await
    }

    async fn run_turn(&self, args: TurnArgs) -> Result<()> {
        observability::TURNS.click();
        let started = std::time::Instant::now();
        let cancel = self
            .controllers()
            .register(&args.session_id, &args.bot_message_id);

        let max_retries = RetryPolicy::NETWORK.max_retries;
        let on_retry = |attempt: u32, err: &Error| {
            observability::TURN_RETRIES.click();
            info!(attempt, error = %err, "turn attempt failed, retrying");
            self.update_message(&args.session_id, &args.bot_message_id, |message| {
                message.loading_stage = Some(LoadingStage::Connecting);
                message.content =
                    format!("Connection unstable, retrying ({attempt}/{max_retries})...");
            });
        };

        let outcome = smart_retry(
            || self.perform_turn(args.clone(), cancel.clone()),
            RetryOptions {
                on_retry: Some(&on_retry),
                cancel: Some(&cancel),
                ..RetryOptions::default()
            },
        )
        .await;

        self.controllers()
            .remove(&args.session_id, &args.bot_message_id);
        observability::TURN_DURATION.add(started.elapsed().as_secs_f64());

        match outcome.result {
            Ok(()) => Ok(()),
            Err(err) if err.is_abort() => {
                // Cancelled between attempts: keep whatever is rendered.
                self.finalize_preserving(&args);
                Ok(())
            }
            Err(err) => {
                self.record_final_failure(&args, &err);
                Ok(())
            }
        }
    }

    /// One attempt at the turn: session protocol, chat POST, ingestion.
    async fn perform_turn(&self, args: TurnArgs, cancel: CancellationToken) -> Result<()> {
        self.update_message(&args.session_id, &args.bot_message_id, |message| {
            message.loading_stage = Some(LoadingStage::Processing);
        });

        let identity = self
            .with_session(&args.session_id, |session| SessionIdentity {
                user_id: self.user_id().to_string(),
                mask_id: session.mask.id.clone(),
                agent_type: session.mask.agent_type.clone(),
                session_uuid: session.mask.session_uuid,
            })
            .ok_or_else(|| Error::validation("session no longer exists", None))?;
        let deep_thinking = self
            .with_session(&args.session_id, |session| session.deep_thinking)
            .unwrap_or(true);

        let mut is_retry = args.is_retry;
        loop {
            if cancel.is_cancelled() {
                self.finalize_preserving(&args);
                return Ok(());
            }

            // The binding lives inside the store; the protocol works on a
            // local copy that is written back whatever happens, so an
            // invalidation is never lost.
            let mut binding =
                self.with_session(&args.session_id, |s| s.agent_session_id.clone())
                    .flatten();
            let ensured = tokio::select! {
                _ = cancel.cancelled() => None,
                result = ensure_session(self.api(), &mut binding, &identity, is_retry) => {
                    Some(result)
                }
            };
            self.update_session(&args.session_id, |session| {
                session.agent_session_id = binding.clone();
            });
            let Some(ensured) = ensured else {
                self.finalize_preserving(&args);
                return Ok(());
            };
            let remote_id = ensured?;

            let request = crate::types::ChatRequest::new(
                remote_id.clone(),
                args.content.clone(),
                deep_thinking,
            )
            .with_file_paths(args.attachments.clone());

            info!(
                session_id = %remote_id,
                agent_type = %identity.agent_type,
                "sending chat request"
            );

            let chat_result = tokio::select! {
                _ = cancel.cancelled() => {
                    self.finalize_preserving(&args);
                    return Ok(());
                }
                result = self.api().chat(&request) => result,
            };

            match chat_result {
                Ok(stream) => {
                    return self.ingest_stream(&args, stream, &cancel).await;
                }
                Err(err) if err.is_not_found() => {
                    // The session vanished between validation and use.
                    warn!(session_id = %remote_id, "chat hit a vanished session, clearing binding");
                    self.update_session(&args.session_id, |session| {
                        session.agent_session_id = None;
                    });
                    if is_retry {
                        return Err(Error::session_expired(
                            "the agent session is gone; please resend your message",
                        ));
                    }
                    // One silent re-init, skipping validation and recovery.
                    is_retry = true;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Drives the event stream into the assistant message.
    async fn ingest_stream(
        &self,
        args: &TurnArgs,
        mut stream: EventStream,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut composer = ResponseComposer::new();

        self.update_message(&args.session_id, &args.bot_message_id, |message| {
            message.streaming = true;
            message.is_error = false;
            message.content.clear();
            message.loading_stage = Some(LoadingStage::Generating);
        });

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    // Cooperative cancel: keep the partial render as-is.
                    self.finalize_preserving(args);
                    return Ok(());
                }
                event = stream.next() => event,
            };

            match next {
                Some(Ok(event)) => {
                    observability::STREAM_EVENTS.click();
                    if event.is_terminal() {
                        break;
                    }
                    composer.apply(&event);
                    let display = composer.display().to_string();
                    let stage = composer.stage();
                    self.update_message(&args.session_id, &args.bot_message_id, |message| {
                        message.content = display;
                        message.loading_stage = Some(stage);
                    });
                }
                Some(Err(err)) => {
                    observability::STREAM_ERRORS.click();
                    return Err(err);
                }
                // The transport ended without a terminal event; treat the
                // reply as complete rather than losing it.
                None => break,
            }
        }

        let final_content = composer.finalize();
        self.update_session(&args.session_id, |session| {
            if let Some(message) = session
                .messages
                .iter_mut()
                .find(|m| m.id == args.bot_message_id)
            {
                message.streaming = false;
                message.content = final_content.clone();
                message.is_error = false;
                message.loading_stage = None;
                message.date = OffsetDateTime::now_utc();
            }
            session.touch();
        });
        self.publish(StoreUpdate::Message {
            session_id: args.session_id.clone(),
            message_id: args.bot_message_id.clone(),
        });

        self.summarize_session(&args.session_id, false).await;
        Ok(())
    }

    /// Ends the turn quietly, preserving the rendered content verbatim.
    fn finalize_preserving(&self, args: &TurnArgs) {
        self.update_message(&args.session_id, &args.bot_message_id, |message| {
            message.streaming = false;
            message.is_error = false;
            message.loading_stage = None;
            message.date = OffsetDateTime::now_utc();
        });
    }

    /// Replaces the assistant message with a failure classification and
    /// flags the paired user message.
    fn record_final_failure(&self, args: &TurnArgs, err: &Error) {
        observability::TURN_FAILURES.click();
        warn!(session_id = %args.session_id, error = %err, "turn failed after retries");

        let classification = classify_failure(err);
        self.update_session(&args.session_id, |session| {
            if let Some(bot) = session
                .messages
                .iter_mut()
                .find(|m| m.id == args.bot_message_id)
            {
                bot.streaming = false;
                bot.is_error = true;
                bot.content = classification.clone();
                bot.loading_stage = Some(LoadingStage::Error);
                bot.date = OffsetDateTime::now_utc();
            }
            if let Some(user) = session
                .messages
                .iter_mut()
                .find(|m| m.id == args.user_message_id)
            {
                user.is_error = true;
            }
        });
    }
}

/// Maps a terminal error to the line shown in the assistant bubble.
///
/// Always a human-readable classification, never a raw error chain.
fn classify_failure(err: &Error) -> String {
    match err {
        Error::SessionExpired { .. } => {
            "The session has expired. Please send your message again.".to_string()
        }
        Error::InitFailed { .. } => {
            "Agent setup failed after several attempts. Please try again later.".to_string()
        }
        Error::InternalServer { .. } | Error::ServiceUnavailable { .. } => {
            "The server is busy right now. We retried a few times; please try again later."
                .to_string()
        }
        Error::Api { status_code, .. } if *status_code >= 500 => {
            "The server is busy right now. We retried a few times; please try again later."
                .to_string()
        }
        Error::Timeout { .. } | Error::Connection { .. } | Error::Streaming { .. } => {
            "Network connection failed. Please check your connection and retry.".to_string()
        }
        Error::Abort { .. } => "The request was cancelled.".to_string(),
        other => format!("{other} (retried without success)"),
    }
}
