//! Core types for the dialtone call runtime
//!
//! This crate provides the foundational pieces shared by all other crates:
//! - The per-call event and action unions
//! - The call state and the pure transition over it
//! - Audio framing constants for the telephony media stream
//! - Conversation message types
//! - The `TelephonySink` seam for writing back to the caller

pub mod audio;
pub mod conversation;
pub mod error;
pub mod event;
pub mod traits;
pub mod update;

pub use conversation::{ChatMessage, Role, CUT_OFF_MARKER};
pub use error::{Error, Result};
pub use event::{Action, CallState, Event, Phase, EVENT_QUEUE_DEPTH};
pub use traits::TelephonySink;
pub use update::transition;
