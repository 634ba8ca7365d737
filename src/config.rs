//! Store configuration.
//!
//! All knobs are resolved once at startup and injected into the store;
//! nothing reads the environment at call time.

use crate::mask::ModelTuning;

/// Minimum estimated tokens of conversation before auto-titling kicks in.
const DEFAULT_SUMMARIZE_MIN_TOKENS: usize = 50;

/// Configuration for a [`ChatStore`](crate::store::ChatStore).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Tuning applied to masks that do not carry their own.
    pub default_tuning: ModelTuning,

    /// Whether new sessions start with deep thinking enabled.
    pub deep_thinking: bool,

    /// Whether untitled sessions get auto-generated topics.
    pub auto_generate_title: bool,

    /// Conversation size (estimated tokens) before auto-titling runs.
    pub summarize_min_tokens: usize,
}

impl StoreConfig {
    /// Creates a configuration with defaults.
    ///
    /// Defaults:
    /// - Deep thinking: enabled
    /// - Auto titles: enabled
    /// - Title threshold: 50 estimated tokens
    pub fn new() -> Self {
        Self {
            default_tuning: ModelTuning::default(),
            deep_thinking: true,
            auto_generate_title: true,
            summarize_min_tokens: DEFAULT_SUMMARIZE_MIN_TOKENS,
        }
    }

    /// Sets the default tuning for new masks.
    pub fn with_default_tuning(mut self, tuning: ModelTuning) -> Self {
        self.default_tuning = tuning;
        self
    }

    /// Sets whether new sessions start with deep thinking enabled.
    pub fn with_deep_thinking(mut self, enabled: bool) -> Self {
        self.deep_thinking = enabled;
        self
    }

    /// Sets whether untitled sessions get auto-generated topics.
    pub fn with_auto_generate_title(mut self, enabled: bool) -> Self {
        self.auto_generate_title = enabled;
        self
    }

    /// Sets the auto-title threshold in estimated tokens.
    pub fn with_summarize_min_tokens(mut self, tokens: usize) -> Self {
        self.summarize_min_tokens = tokens;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}
