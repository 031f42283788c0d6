//! Audio framing constants for the telephony media stream
//!
//! The stream carries mulaw mono at 8 kHz in both directions. One wire frame
//! is 160 samples (one byte each), i.e. 20 ms of audio. Nothing in the
//! runtime transcodes or resamples; the recognizer and synthesizer are opened
//! with the matching encoding.

use std::time::Duration;

/// Sample rate of the telephony media stream.
pub const SAMPLE_RATE_HZ: u32 = 8000;

/// Samples (= bytes, mulaw) per wire frame.
pub const FRAME_SAMPLES: usize = 160;

/// Wall-clock duration of one wire frame.
pub const FRAME_DURATION: Duration = Duration::from_millis(20);

/// How long the player sleeps when its queue is empty but input is still open.
pub const PLAYER_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Duration of `n` mulaw samples at the stream rate.
pub fn samples_duration(n: usize) -> Duration {
    Duration::from_micros(n as u64 * 1_000_000 / SAMPLE_RATE_HZ as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_is_twenty_milliseconds() {
        assert_eq!(samples_duration(FRAME_SAMPLES), FRAME_DURATION);
    }

    #[test]
    fn one_second_of_samples() {
        assert_eq!(
            samples_duration(SAMPLE_RATE_HZ as usize),
            Duration::from_secs(1)
        );
    }
}
