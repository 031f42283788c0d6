//! LLM backend contract

use async_trait::async_trait;
use tokio::sync::mpsc;

use dialtone_core::ChatMessage;

use crate::LlmError;

/// Why a generation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
}

/// Result of one completed generation.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// The full generated text.
    pub text: String,
    pub finish_reason: FinishReason,
}

/// A streaming completion backend.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Stream a completion for `messages`.
    ///
    /// Each text delta is sent on `tx` as it arrives; the call returns the
    /// assembled result once the stream ends. If the receiver side of `tx`
    /// goes away the backend stops streaming and returns what it has.
    async fn generate_stream(
        &self,
        messages: &[ChatMessage],
        tx: mpsc::Sender<String>,
    ) -> Result<GenerationResult, LlmError>;

    /// Model identifier for logging.
    fn model_name(&self) -> &str;
}
