use serde::{Deserialize, Serialize};

/// A follow-up prompt the user can click instead of typing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    /// Stable identifier, used for dedupe and click tracking.
    pub id: String,

    /// Display text.
    pub text: String,
}

impl Question {
    /// Creates a new question.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// Which flavor of suggestions to generate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    /// Conversation openers for an idle session.
    Default,
    /// Follow-ups derived from the user's latest message.
    Related,
}

/// Request body for the suggested-questions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuggestedQuestionsRequest {
    /// Remote session to derive suggestions from, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Flavor of suggestions requested.
    #[serde(rename = "type")]
    pub kind: QuestionKind,

    /// Required for `Related`: the message to derive follow-ups from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,
}

/// Response body from the suggested-questions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuggestedQuestionsResponse {
    /// Whether generation succeeded.
    pub success: bool,

    /// The generated questions.
    #[serde(default)]
    pub questions: Vec<Question>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&QuestionKind::Default).unwrap(),
            r#""default""#
        );
        assert_eq!(
            serde_json::to_string(&QuestionKind::Related).unwrap(),
            r#""related""#
        );
    }

    #[test]
    fn request_serialization() {
        let req = SuggestedQuestionsRequest {
            session_id: Some("sess-1".to_string()),
            kind: QuestionKind::Related,
            user_message: Some("what about trains?".to_string()),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "session_id": "sess-1",
                "type": "related",
                "user_message": "what about trains?",
            })
        );
    }

    #[test]
    fn response_deserialization() {
        let json = r#"{"success":true,"questions":[{"id":"q1","text":"How does it work?"}]}"#;
        let resp: SuggestedQuestionsResponse = serde_json::from_str(json).unwrap();
        assert!(resp.success);
        assert_eq!(resp.questions, vec![Question::new("q1", "How does it work?")]);
    }

    #[test]
    fn empty_questions_default() {
        let resp: SuggestedQuestionsResponse =
            serde_json::from_str(r#"{"success":false}"#).unwrap();
        assert!(resp.questions.is_empty());
    }
}
