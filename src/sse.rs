//! Streaming response parsing for chat turns.
//!
//! The agent service streams newline-delimited `data: {json}` lines in the
//! style of server-sent events. This module turns the raw byte stream into
//! a stream of [`StreamEvent`]s, carrying a trailing partial line across
//! reads and skipping lines that fail to parse.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use tracing::warn;

use crate::error::{Error, Result};
use crate::types::StreamEvent;

/// Process a stream of bytes into a stream of chat events.
///
/// The returned stream ends when the underlying byte stream ends or when a
/// `complete`/`done` event arrives. A server-sent `error` event surfaces as
/// an `Err` item; malformed lines are logged and skipped, never fatal.
pub fn process_event_stream<S>(byte_stream: S) -> impl Stream<Item = Result<StreamEvent>>
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Unpin + 'static,
{
    // Convert reqwest errors to our error type
    let stream = byte_stream.map(|result| {
        result
            .map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    });

    let buffer = String::new();
    let done = false;

    stream::unfold(
        (stream, buffer, done),
        move |(mut stream, mut buffer, done)| async move {
            if done {
                return None;
            }
            loop {
                // Drain complete lines already sitting in the buffer
                while let Some(newline) = buffer.find('\n') {
                    let line: String = buffer.drain(..=newline).collect();
                    match parse_line(line.trim_end_matches(['\n', '\r'])) {
                        LineOutcome::Event(event) => {
                            let done = event.is_terminal();
                            return Some((Ok(event), (stream, buffer, done)));
                        }
                        LineOutcome::Error(err) => {
                            return Some((Err(err), (stream, buffer, true)));
                        }
                        LineOutcome::Skip => {}
                    }
                }

                // Read more data
                match stream.next().await {
                    Some(Ok(bytes)) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => buffer.push_str(&text),
                        Err(e) => {
                            return Some((
                                Err(Error::encoding(
                                    format!("Invalid UTF-8 in stream: {e}"),
                                    Some(Box::new(e)),
                                )),
                                (stream, buffer, true),
                            ));
                        }
                    },
                    Some(Err(e)) => {
                        return Some((Err(e), (stream, buffer, true)));
                    }
                    None => {
                        // End of stream; the buffer may hold one last line
                        // that never got its newline.
                        if !buffer.is_empty() {
                            let line = std::mem::take(&mut buffer);
                            match parse_line(line.trim_end_matches(['\n', '\r'])) {
                                LineOutcome::Event(event) => {
                                    return Some((Ok(event), (stream, buffer, true)));
                                }
                                LineOutcome::Error(err) => {
                                    return Some((Err(err), (stream, buffer, true)));
                                }
                                LineOutcome::Skip => {}
                            }
                        }
                        return None;
                    }
                }
            }
        },
    )
}

enum LineOutcome {
    Event(StreamEvent),
    Error(Error),
    Skip,
}

/// Parse one line of the stream.
///
/// Only `data: {json}` lines carry events; blank lines are keep-alives and
/// anything unparseable is skipped so a single bad line cannot kill the
/// whole turn.
fn parse_line(line: &str) -> LineOutcome {
    let Some(payload) = line.strip_prefix("data: ").or_else(|| {
        line.strip_prefix("data:")
    }) else {
        if !line.trim().is_empty() {
            warn!(line, "ignoring non-data line in chat stream");
        }
        return LineOutcome::Skip;
    };

    match serde_json::from_str::<StreamEvent>(payload.trim()) {
        Ok(StreamEvent::Error { error }) => LineOutcome::Error(Error::streaming(
            error.unwrap_or_else(|| "stream reported an error".to_string()),
            None,
        )),
        Ok(event) => LineOutcome::Event(event),
        Err(e) => {
            warn!(line, error = %e, "failed to parse stream line, skipping");
            LineOutcome::Skip
        }
    }
}
