//! Per-call events and actions
//!
//! Everything the call loop reacts to is an [`Event`]; everything the pure
//! transition asks the loop to do is an [`Action`]. Both are closed unions so
//! the transition can be checked for exhaustiveness at compile time.

use serde::{Deserialize, Serialize};

/// Depth of the per-call event queue shared by all producers.
pub const EVENT_QUEUE_DEPTH: usize = 256;

/// Conversation phase for a single call.
///
/// `Listening` feeds caller audio to the recognizer and waits for a turn
/// boundary. `Responding` means an agent turn is being generated or played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Listening,
    Responding,
}

/// Immutable per-call state consumed by the pure transition.
///
/// Conversation history deliberately does not live here; it belongs to the
/// agent's LLM service.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallState {
    pub phase: Phase,
    /// Assigned once on stream start, never mutated afterwards.
    pub stream_sid: Option<String>,
}

/// One event on the per-call queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The telephony stream opened and assigned its stream id.
    StreamStart { stream_sid: String },
    /// The telephony stream closed (caller hangup or transport failure).
    StreamStop,
    /// One inbound mulaw frame from the caller.
    Media { audio: Vec<u8> },
    /// The recognizer heard the caller start speaking (barge-in signal).
    RecognizerStartOfTurn,
    /// The recognizer delimited a caller turn and produced its transcript.
    RecognizerEndOfTurn { transcript: String },
    /// The agent finished playing a response.
    AgentTurnDone,
}

impl Event {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::StreamStart { .. } => "stream_start",
            Event::StreamStop => "stream_stop",
            Event::Media { .. } => "media",
            Event::RecognizerStartOfTurn => "start_of_turn",
            Event::RecognizerEndOfTurn { .. } => "end_of_turn",
            Event::AgentTurnDone => "agent_turn_done",
        }
    }
}

/// Side effect requested by the transition, executed by the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Forward one audio frame to the recognizer session.
    FeedRecognizer { audio: Vec<u8> },
    /// Begin a new agent turn for the given transcript.
    StartAgentTurn { transcript: String },
    /// Cancel the in-flight agent turn (barge-in or teardown).
    ResetAgentTurn,
}

impl Action {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::FeedRecognizer { .. } => "feed_recognizer",
            Action::StartAgentTurn { .. } => "start_agent_turn",
            Action::ResetAgentTurn => "reset_agent_turn",
        }
    }
}
