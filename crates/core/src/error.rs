//! Core error type

use thiserror::Error;

/// Errors surfaced through core seams (currently only the telephony sink).
#[derive(Debug, Error)]
pub enum Error {
    /// The telephony socket rejected a write. Not recoverable at this layer.
    #[error("telephony transport error: {0}")]
    Transport(String),

    /// The telephony socket is already closed.
    #[error("telephony socket closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, Error>;
