//! Streaming text-to-speech
//!
//! A synthesizer session is a duplex WebSocket: text fragments go in, base64
//! mulaw chunks come out. Sessions are poolable: a session opened ahead of
//! time with no consumer (`sink = None`) can later be adopted by a turn via
//! [`TtsSession::rebind`], which swaps the delivery target atomically without
//! reconnecting.

pub mod pool;
pub mod session;

pub use pool::TtsPool;
pub use session::{ElevenLabsConnector, ElevenLabsSession};

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::PipelineError;

/// One item a synthesizer session delivers to its bound consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TtsStreamEvent {
    /// Base64-encoded mulaw audio chunk.
    Audio(String),
    /// Terminal marker: no more audio will follow.
    Done,
}

/// Delivery target for a session's events. `None` is the warm, no-op binding
/// used for pooled sessions that nobody owns yet.
pub type TtsSink = Option<mpsc::UnboundedSender<TtsStreamEvent>>;

/// A live synthesizer session.
#[async_trait]
pub trait TtsSession: Send + Sync {
    /// Append text to the synthesis input. Failures are logged and dropped.
    async fn send(&self, text: &str);

    /// Force synthesis of any buffered text short of a natural break.
    async fn flush(&self);

    /// Abort the session immediately.
    async fn cancel(&self);

    /// Atomically swap the consumer of this session's events.
    fn rebind(&self, sink: TtsSink);

    /// Whether the session can still accept input.
    fn is_open(&self) -> bool;
}

/// Opens synthesizer sessions. The pool keeps warm ones ready; a cold
/// `open` is the blocking fallback path.
#[async_trait]
pub trait TtsConnector: Send + Sync {
    async fn open(&self, sink: TtsSink) -> Result<Arc<dyn TtsSession>, PipelineError>;
}
