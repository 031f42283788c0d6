//! ElevenLabs streaming synthesizer session
//!
//! Speaks the `stream-input` protocol: an init message carrying the API key
//! and voice settings, then text fragments with `try_trigger_generation`, an
//! empty-text `flush` to force out buffered audio, and responses of the form
//! `{"audio": <base64>, "isFinal": bool}`. Output format is mulaw 8 kHz so
//! chunks can be forwarded to the telephony stream untouched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use dialtone_config::TtsSettings;

use super::{TtsConnector, TtsSession, TtsSink, TtsStreamEvent};
use crate::PipelineError;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Shared between the session handle and its receive task.
struct SessionShared {
    sink: parking_lot::Mutex<TtsSink>,
    open: AtomicBool,
}

impl SessionShared {
    fn deliver(&self, event: TtsStreamEvent) {
        if let Some(tx) = self.sink.lock().as_ref() {
            let _ = tx.send(event);
        }
    }
}

#[derive(Debug, Deserialize)]
struct TtsMessage {
    #[serde(default)]
    audio: Option<String>,
    #[serde(default, rename = "isFinal")]
    is_final: Option<bool>,
}

/// Translate one raw synthesizer message into stream events.
fn parse_tts_message(raw: &str) -> Vec<TtsStreamEvent> {
    let msg: TtsMessage = match serde_json::from_str(raw) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!(error = %e, "invalid synthesizer message");
            return Vec::new();
        }
    };
    let mut events = Vec::new();
    if let Some(audio) = msg.audio {
        if !audio.is_empty() {
            events.push(TtsStreamEvent::Audio(audio));
        }
    }
    if msg.is_final == Some(true) {
        events.push(TtsStreamEvent::Done);
    }
    events
}

/// A live ElevenLabs session.
pub struct ElevenLabsSession {
    write: Mutex<WsSink>,
    shared: Arc<SessionShared>,
    receiver: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ElevenLabsSession {
    /// Open a session with the given delivery target (`None` for a warm,
    /// unowned session).
    pub async fn connect(settings: &TtsSettings, sink: TtsSink) -> Result<Self, PipelineError> {
        let url = format!(
            "{}/v1/text-to-speech/{}/stream-input?model_id={}&output_format=ulaw_8000",
            settings.endpoint, settings.voice_id, settings.model_id
        );

        let (ws, response) = connect_async(url)
            .await
            .map_err(|e| PipelineError::TtsConnect(e.to_string()))?;

        let region = response
            .headers()
            .get("x-region")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown");
        tracing::debug!(region = %region, "synthesizer session connected");

        let (mut write, read) = ws.split();

        let init = json!({
            "text": " ",
            "voice_settings": {
                "stability": 0.5,
                "similarity_boost": 0.75,
            },
            "xi_api_key": settings.api_key,
        });
        write
            .send(Message::Text(init.to_string()))
            .await
            .map_err(|e| PipelineError::TtsConnect(e.to_string()))?;

        let shared = Arc::new(SessionShared {
            sink: parking_lot::Mutex::new(sink),
            open: AtomicBool::new(true),
        });
        let receiver = tokio::spawn(receive_loop(read, shared.clone()));

        Ok(Self {
            write: Mutex::new(write),
            shared,
            receiver: parking_lot::Mutex::new(Some(receiver)),
        })
    }

    async fn send_json(&self, body: serde_json::Value, what: &str) {
        if !self.is_open() {
            return;
        }
        let mut write = self.write.lock().await;
        if let Err(e) = write.send(Message::Text(body.to_string())).await {
            tracing::warn!(error = %e, "synthesizer {what} failed");
        }
    }
}

async fn receive_loop(mut read: WsSource, shared: Arc<SessionShared>) {
    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                for event in parse_tts_message(&text) {
                    shared.deliver(event);
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "synthesizer receive failed");
                break;
            }
        }
    }
    // Socket gone. If the session was still live, make sure the consumer
    // sees a terminal marker so the player can drain and finish.
    if shared.open.swap(false, Ordering::SeqCst) {
        shared.deliver(TtsStreamEvent::Done);
    }
}

#[async_trait]
impl TtsSession for ElevenLabsSession {
    async fn send(&self, text: &str) {
        self.send_json(
            json!({ "text": text, "try_trigger_generation": true }),
            "send",
        )
        .await;
    }

    async fn flush(&self) {
        self.send_json(json!({ "text": "", "flush": true }), "flush").await;
    }

    async fn cancel(&self) {
        self.shared.open.store(false, Ordering::SeqCst);
        self.rebind(None);
        if let Some(receiver) = self.receiver.lock().take() {
            receiver.abort();
        }
        let mut write = self.write.lock().await;
        let _ = write.close().await;
        tracing::debug!("synthesizer session cancelled");
    }

    fn rebind(&self, sink: TtsSink) {
        *self.shared.sink.lock() = sink;
    }

    fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }
}

/// Production connector over [`ElevenLabsSession`].
pub struct ElevenLabsConnector {
    settings: TtsSettings,
}

impl ElevenLabsConnector {
    pub fn new(settings: TtsSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl TtsConnector for ElevenLabsConnector {
    async fn open(&self, sink: TtsSink) -> Result<Arc<dyn TtsSession>, PipelineError> {
        let session = ElevenLabsSession::connect(&self.settings, sink).await?;
        Ok(Arc::new(session))
    }
}
