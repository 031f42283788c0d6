//! Telephony integration
//!
//! Two halves: the JSON wire frames of the provider's media-stream WebSocket
//! (`frames`), and the REST client that places outbound calls plus the
//! connection markup the provider fetches when a call is answered (`client`).

pub mod client;
pub mod frames;

pub use client::{connect_twiml, TwilioClient};
pub use frames::{clear_frame, media_frame, parse_inbound};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelephonyError {
    /// Phone number is not in E.164 form.
    #[error("invalid phone number {0:?}: must be E.164 (e.g. +15550001111)")]
    InvalidNumber(String),

    /// The REST request could not be sent.
    #[error("telephony request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider rejected the request.
    #[error("telephony API error {status}: {body}")]
    Api { status: u16, body: String },
}
