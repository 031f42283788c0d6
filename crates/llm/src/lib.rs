//! Streaming LLM integration
//!
//! `backend` defines the streaming completion contract and `openai` its
//! production implementation (an OpenAI-compatible chat API, Groq by
//! default). `service` owns the per-call conversation history and runs one
//! cancellable generation at a time on top of a backend.

pub mod backend;
pub mod openai;
pub mod service;

pub use backend::{FinishReason, GenerationResult, LlmBackend};
pub use openai::OpenAiBackend;
pub use service::{LlmService, LlmTurnEvent};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM configuration error: {0}")]
    Configuration(String),

    #[error("LLM network error: {0}")]
    Network(String),

    #[error("LLM API error: {0}")]
    Api(String),

    #[error("invalid LLM response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        LlmError::Network(e.to_string())
    }
}
