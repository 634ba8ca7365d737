//! Session-scoped cache for suggested follow-up questions.
//!
//! Entries are valid for a fixed TTL, only for the session they were
//! fetched under, and (for related suggestions) only for the user
//! message that produced them. A stale entry is never returned.

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::types::{Question, QuestionKind};

/// How long a cached suggestion set stays usable.
pub const SUGGESTION_TTL: Duration = Duration::minutes(5);

/// What produced a cached entry, and what it is therefore valid for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CachedKind {
    /// Conversation openers; valid for the whole session.
    Default,
    /// Follow-ups derived from one specific user message.
    Related {
        /// The message the suggestions were derived from.
        user_message: String,
    },
}

impl CachedKind {
    fn question_kind(&self) -> QuestionKind {
        match self {
            CachedKind::Default => QuestionKind::Default,
            CachedKind::Related { .. } => QuestionKind::Related,
        }
    }
}

/// One cached suggestion set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionCacheEntry {
    /// The cached questions.
    pub questions: Vec<Question>,

    /// When the set was fetched.
    #[serde(with = "time::serde::rfc3339")]
    pub fetched_at: OffsetDateTime,

    /// Remote session the set belongs to, when one existed at fetch time.
    pub session_id: Option<String>,

    /// What the set was derived from.
    #[serde(flatten)]
    pub kind: CachedKind,
}

impl QuestionCacheEntry {
    /// Creates an entry stamped `now`.
    pub fn new(questions: Vec<Question>, session_id: Option<String>, kind: CachedKind) -> Self {
        Self {
            questions,
            fetched_at: OffsetDateTime::now_utc(),
            session_id,
            kind,
        }
    }

    /// Whether the entry may serve a lookup made `now`.
    fn is_valid(
        &self,
        session_id: Option<&str>,
        user_message: Option<&str>,
        now: OffsetDateTime,
    ) -> bool {
        if now - self.fetched_at > SUGGESTION_TTL {
            return false;
        }
        if self.session_id.as_deref() != session_id {
            return false;
        }
        match &self.kind {
            CachedKind::Default => true,
            CachedKind::Related { user_message: cached } => {
                Some(cached.as_str()) == user_message
            }
        }
    }
}

/// Per-session suggestion cache, one slot per question kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionCache {
    /// Cached conversation openers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<QuestionCacheEntry>,

    /// Cached follow-ups for the latest user message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related: Option<QuestionCacheEntry>,
}

impl QuestionCache {
    /// Returns the cached questions if a valid entry covers the lookup.
    pub fn lookup(
        &self,
        kind: QuestionKind,
        session_id: Option<&str>,
        user_message: Option<&str>,
        now: OffsetDateTime,
    ) -> Option<&[Question]> {
        let slot = match kind {
            QuestionKind::Default => self.default.as_ref(),
            QuestionKind::Related => self.related.as_ref(),
        };
        slot.filter(|entry| entry.is_valid(session_id, user_message, now))
            .map(|entry| entry.questions.as_slice())
    }

    /// Stores an entry in the slot its kind belongs to.
    pub fn store(&mut self, entry: QuestionCacheEntry) {
        match entry.kind.question_kind() {
            QuestionKind::Default => self.default = Some(entry),
            QuestionKind::Related => self.related = Some(entry),
        }
    }

    /// Drops both slots.
    pub fn clear(&mut self) {
        self.default = None;
        self.related = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn questions() -> Vec<Question> {
        vec![Question::new("q1", "What next?")]
    }

    fn entry_at(fetched_at: OffsetDateTime, session_id: Option<&str>, kind: CachedKind) -> QuestionCacheEntry {
        QuestionCacheEntry {
            questions: questions(),
            fetched_at,
            session_id: session_id.map(String::from),
            kind,
        }
    }

    #[test]
    fn fresh_default_entry_hits() {
        let now = OffsetDateTime::now_utc();
        let mut cache = QuestionCache::default();
        cache.store(entry_at(now, Some("sess-1"), CachedKind::Default));

        let hit = cache.lookup(QuestionKind::Default, Some("sess-1"), None, now);
        assert_eq!(hit.unwrap().len(), 1);
    }

    #[test]
    fn expired_entry_misses() {
        let now = OffsetDateTime::now_utc();
        let stale = now - SUGGESTION_TTL - Duration::seconds(1);
        let mut cache = QuestionCache::default();
        cache.store(entry_at(stale, Some("sess-1"), CachedKind::Default));

        assert!(
            cache
                .lookup(QuestionKind::Default, Some("sess-1"), None, now)
                .is_none()
        );
    }

    #[test]
    fn session_mismatch_misses() {
        let now = OffsetDateTime::now_utc();
        let mut cache = QuestionCache::default();
        cache.store(entry_at(now, Some("sess-1"), CachedKind::Default));

        assert!(
            cache
                .lookup(QuestionKind::Default, Some("sess-2"), None, now)
                .is_none()
        );
    }

    #[test]
    fn related_requires_matching_message() {
        let now = OffsetDateTime::now_utc();
        let mut cache = QuestionCache::default();
        cache.store(entry_at(
            now,
            Some("sess-1"),
            CachedKind::Related {
                user_message: "tell me about trains".to_string(),
            },
        ));

        let hit = cache.lookup(
            QuestionKind::Related,
            Some("sess-1"),
            Some("tell me about trains"),
            now,
        );
        assert!(hit.is_some());

        let miss = cache.lookup(
            QuestionKind::Related,
            Some("sess-1"),
            Some("tell me about boats"),
            now,
        );
        assert!(miss.is_none());
    }

    #[test]
    fn kinds_use_separate_slots() {
        let now = OffsetDateTime::now_utc();
        let mut cache = QuestionCache::default();
        cache.store(entry_at(now, None, CachedKind::Default));

        assert!(cache.lookup(QuestionKind::Related, None, None, now).is_none());
        assert!(cache.lookup(QuestionKind::Default, None, None, now).is_some());
    }

    #[test]
    fn clear_drops_everything() {
        let now = OffsetDateTime::now_utc();
        let mut cache = QuestionCache::default();
        cache.store(entry_at(now, None, CachedKind::Default));
        cache.clear();
        assert!(cache.lookup(QuestionKind::Default, None, None, now).is_none());
    }

    #[test]
    fn entry_round_trips_through_json() {
        let entry = QuestionCacheEntry::new(
            questions(),
            Some("sess-9".to_string()),
            CachedKind::Related {
                user_message: "why?".to_string(),
            },
        );
        let json = serde_json::to_string(&entry).unwrap();
        let back: QuestionCacheEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
