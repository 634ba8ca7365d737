// Public modules
pub mod cache;
pub mod client;
pub mod compose;
pub mod config;
pub mod controller;
pub mod error;
pub mod mask;
pub mod observability;
pub mod protocol;
pub mod questions;
pub mod retry;
pub mod session;
pub mod sse;
pub mod storage;
pub mod store;
pub mod token;
pub mod types;
pub mod typing;

#[cfg(test)]
pub(crate) mod tests_support;

// Re-exports
pub use client::{AgentApi, AgentClient, EventStream};
pub use config::StoreConfig;
pub use error::{Error, Result};
pub use mask::{Mask, ModelTuning};
pub use session::{ChatMessage, ChatSession, LoadingStage, MessageRole};
pub use store::{ChatStore, RemovedSession, StoreUpdate, Summarizer};
pub use types::*;
