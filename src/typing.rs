//! Typewriter-style incremental text reveal.
//!
//! Used by UIs that receive a complete reply (the legacy non-streaming
//! path) but still want streaming-feel display. The reveal rate adapts to
//! the text length, long texts are truncated, and cancellation reveals the
//! rest immediately rather than erroring.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

/// How a reveal run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingOutcome {
    /// Every character was revealed at the configured pace.
    Completed,
    /// Cancellation hit mid-reveal; the full text was flushed at once.
    Aborted,
}

/// Options for a typing effect.
#[derive(Debug, Clone, Copy)]
pub struct TypingOptions {
    /// Base reveal speed in characters per second.
    pub base_speed: u32,
    /// Whether speed scales up with text length.
    pub adaptive_speed: bool,
    /// Texts longer than this (in characters) are truncated with an
    /// ellipsis before revealing.
    pub max_length: usize,
}

impl Default for TypingOptions {
    fn default() -> Self {
        Self {
            base_speed: 30,
            adaptive_speed: true,
            max_length: 50_000,
        }
    }
}

/// Reveals text incrementally at an adaptive rate.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypingEffect {
    options: TypingOptions,
}

impl TypingEffect {
    /// Creates an effect with the given options.
    pub fn new(options: TypingOptions) -> Self {
        Self { options }
    }

    /// Effective speed for a text of `len` characters.
    fn speed_for(&self, len: usize) -> u32 {
        if !self.options.adaptive_speed {
            return self.options.base_speed.max(1);
        }
        let floor = if len < 100 {
            40
        } else if len < 500 {
            50
        } else if len < 2_000 {
            60
        } else {
            80
        };
        self.options.base_speed.max(floor)
    }

    /// Reveals `text` through `on_update`, one growing prefix at a time.
    ///
    /// `on_update` always receives prefixes on character boundaries and is
    /// guaranteed a final call with the complete text, whether the run
    /// finishes or is cancelled.
    pub async fn run(
        &self,
        text: &str,
        mut on_update: impl FnMut(&str),
        cancel: &CancellationToken,
    ) -> TypingOutcome {
        let mut truncated;
        let mut text = text;
        if text.chars().count() > self.options.max_length {
            warn!(
                limit = self.options.max_length,
                "text exceeds reveal limit, truncating"
            );
            truncated = text
                .chars()
                .take(self.options.max_length)
                .collect::<String>();
            truncated.push_str("...");
            text = truncated.as_str();
        }

        // Byte offset after each character, so prefixes slice cleanly.
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(idx, c)| idx + c.len_utf8())
            .collect();
        let total = boundaries.len();
        if total == 0 {
            on_update(text);
            return TypingOutcome::Completed;
        }

        let speed = self.speed_for(total);
        let per_char = Duration::from_secs_f64(1.0 / speed as f64);
        let tick = Duration::from_millis(16).max(per_char);
        let chars_per_tick = (tick.as_secs_f64() / per_char.as_secs_f64()).floor() as usize;
        let chars_per_tick = chars_per_tick.max(1);

        let mut revealed = 0usize;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    // Flush the rest instead of leaving a stub.
                    on_update(text);
                    return TypingOutcome::Aborted;
                }
                _ = tokio::time::sleep(tick) => {
                    revealed = (revealed + chars_per_tick).min(total);
                    on_update(&text[..boundaries[revealed - 1]]);
                    if revealed == total {
                        return TypingOutcome::Completed;
                    }
                }
            }
        }
    }
}
