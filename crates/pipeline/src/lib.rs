//! Streaming audio pipeline for dialtone
//!
//! Everything between the telephony socket and the LLM lives here:
//! - `recognizer`: the long-lived duplex speech session that detects turn
//!   boundaries and feeds typed events into the call loop
//! - `tts`: streaming synthesizer sessions and the warm-session pool that
//!   hides their handshake latency
//! - `player`: real-time paced playback of synthesized audio back to the
//!   caller, with instant stop-and-clear for barge-in

pub mod player;
pub mod recognizer;
pub mod tts;

pub use player::AudioPlayer;
pub use recognizer::{DeepgramFactory, DeepgramRecognizer, Recognizer, RecognizerFactory};
pub use tts::{
    ElevenLabsConnector, ElevenLabsSession, TtsConnector, TtsPool, TtsSession, TtsSink,
    TtsStreamEvent,
};

use thiserror::Error;

/// Pipeline errors. Background read loops never surface these; they log and
/// fall back to the documented degraded behavior. Only session opens return
/// them to callers.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("recognizer connection failed: {0}")]
    RecognizerConnect(String),

    #[error("synthesizer connection failed: {0}")]
    TtsConnect(String),

    #[error("websocket error: {0}")]
    WebSocket(String),
}
