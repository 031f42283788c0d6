//! Core seams
//!
//! The only seam that lives here is the outbound half of the telephony
//! socket: the player writes paced media frames through it and clears the
//! provider's buffer on interrupt. Everything else (recognizer, synthesizer,
//! LLM) is defined next to its implementation crate.

use async_trait::async_trait;

use crate::error::Result;

/// Outbound writer for the telephony media stream.
///
/// There is exactly one writer at a time per call: the active player. The
/// payload is base64-encoded mulaw, already in wire format. The stream sid is
/// passed per call because it is only assigned once the stream starts, after
/// the socket itself is open.
#[async_trait]
pub trait TelephonySink: Send + Sync {
    /// Send one audio frame to the caller.
    async fn send_media(&self, stream_sid: &str, payload_b64: &str) -> Result<()>;

    /// Discard any audio the provider has buffered but not yet played.
    async fn send_clear(&self, stream_sid: &str) -> Result<()>;
}
