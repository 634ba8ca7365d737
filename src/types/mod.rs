// Public modules
pub mod chat_request;
pub mod init;
pub mod recover;
pub mod session_status;
pub mod stream_event;
pub mod suggested_questions;

// Re-exports
pub use chat_request::{ChatReply, ChatRequest};
pub use init::{InitRequest, InitResponse};
pub use recover::{RecoverRequest, RecoverResponse};
pub use session_status::SessionStatus;
pub use stream_event::{StreamEvent, ToolPhase};
pub use suggested_questions::{
    Question, QuestionKind, SuggestedQuestionsRequest, SuggestedQuestionsResponse,
};
