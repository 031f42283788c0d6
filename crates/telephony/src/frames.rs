//! Media-stream wire frames
//!
//! Inbound frames are parsed into typed call [`Event`]s; outbound frames are
//! rendered to JSON text ready to write to the socket. Frame shapes follow
//! the Twilio Media Streams protocol: `connected`, `start`, `media`, `stop`
//! inbound; `media` and `clear` outbound.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

use dialtone_core::Event;

/// Inbound frame as it appears on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum InboundFrame {
    /// Informational handshake frame; carries nothing the loop needs.
    Connected,
    Start { start: StartMeta },
    Media { media: MediaPayload },
    Stop,
}

#[derive(Debug, Clone, Deserialize)]
struct StartMeta {
    #[serde(rename = "streamSid")]
    stream_sid: String,
}

#[derive(Debug, Clone, Deserialize)]
struct MediaPayload {
    payload: String,
}

/// Parse one inbound text frame into a call event.
///
/// Returns `None` for the `connected` frame, for frame kinds this runtime
/// does not consume (e.g. `mark`), and for malformed payloads. Unknown
/// frames are not an error; the provider may add kinds at any time.
pub fn parse_inbound(raw: &str) -> Option<Event> {
    let frame = match serde_json::from_str::<InboundFrame>(raw) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(error = %e, "ignoring unrecognized telephony frame");
            return None;
        }
    };

    match frame {
        InboundFrame::Connected => {
            tracing::debug!("telephony websocket connected");
            None
        }
        InboundFrame::Start { start } => Some(Event::StreamStart {
            stream_sid: start.stream_sid,
        }),
        InboundFrame::Media { media } => {
            if media.payload.is_empty() {
                return None;
            }
            match BASE64.decode(&media.payload) {
                Ok(audio) => Some(Event::Media { audio }),
                Err(e) => {
                    tracing::warn!(error = %e, "dropping media frame with invalid base64");
                    None
                }
            }
        }
        InboundFrame::Stop => Some(Event::StreamStop),
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum OutboundFrame<'a> {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: &'a str,
        media: OutboundMedia<'a>,
    },
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: &'a str,
    },
}

#[derive(Debug, Serialize)]
struct OutboundMedia<'a> {
    payload: &'a str,
}

/// Render one outbound audio frame. `payload_b64` is base64 mulaw.
pub fn media_frame(stream_sid: &str, payload_b64: &str) -> String {
    serde_json::to_string(&OutboundFrame::Media {
        stream_sid,
        media: OutboundMedia {
            payload: payload_b64,
        },
    })
    .unwrap()
}

/// Render the buffer-clear control frame used for barge-in.
pub fn clear_frame(stream_sid: &str) -> String {
    serde_json::to_string(&OutboundFrame::Clear { stream_sid }).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connected_frame_is_ignored() {
        assert_eq!(parse_inbound(r#"{"event":"connected","protocol":"Call"}"#), None);
    }

    #[test]
    fn start_frame_yields_stream_start() {
        let raw = r#"{"event":"start","sequenceNumber":"1","start":{"streamSid":"MZ8a3b1f","accountSid":"AC0"}}"#;
        assert_eq!(
            parse_inbound(raw),
            Some(Event::StreamStart {
                stream_sid: "MZ8a3b1f".into()
            })
        );
    }

    #[test]
    fn media_frame_decodes_payload() {
        let payload = BASE64.encode([0u8; 160]);
        let raw = format!(r#"{{"event":"media","media":{{"payload":"{payload}"}}}}"#);
        assert_eq!(
            parse_inbound(&raw),
            Some(Event::Media {
                audio: vec![0u8; 160]
            })
        );
    }

    #[test]
    fn empty_or_invalid_media_is_dropped() {
        assert_eq!(parse_inbound(r#"{"event":"media","media":{"payload":""}}"#), None);
        assert_eq!(
            parse_inbound(r#"{"event":"media","media":{"payload":"!!!"}}"#),
            None
        );
    }

    #[test]
    fn stop_frame_yields_stream_stop() {
        assert_eq!(parse_inbound(r#"{"event":"stop"}"#), Some(Event::StreamStop));
    }

    #[test]
    fn unknown_frames_are_ignored() {
        assert_eq!(parse_inbound(r#"{"event":"mark","mark":{"name":"x"}}"#), None);
        assert_eq!(parse_inbound("not json"), None);
    }

    #[test]
    fn outbound_media_frame_matches_wire_shape() {
        assert_eq!(
            media_frame("MZ1", "AAAA"),
            r#"{"event":"media","streamSid":"MZ1","media":{"payload":"AAAA"}}"#
        );
    }

    #[test]
    fn outbound_clear_frame_matches_wire_shape() {
        assert_eq!(clear_frame("MZ1"), r#"{"event":"clear","streamSid":"MZ1"}"#);
    }
}
