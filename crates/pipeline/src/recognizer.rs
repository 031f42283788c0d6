//! Streaming recognizer session
//!
//! A single duplex WebSocket opened at stream start and held for the whole
//! call. Caller audio goes in unmodified (mulaw 8 kHz, same format as the
//! telephony stream); turn events come back and are pushed straight onto the
//! call loop's queue. All turn-boundary detection happens on the recognizer
//! side; this session is a dumb adapter.
//!
//! Failure semantics: a send failure drops that one frame. A receive failure
//! ends the reader task; the call keeps running without further recognizer
//! events until the caller hangs up, which still produces `StreamStop`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use dialtone_config::RecognizerSettings;
use dialtone_core::{audio, Event};

use crate::PipelineError;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// A live recognizer session.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Forward one caller audio frame. Failures are logged, not returned;
    /// the frame is simply lost.
    async fn feed(&self, audio: &[u8]);

    /// Close the session and stop its reader task.
    async fn stop(&self);
}

/// Opens recognizer sessions bound to a call's event queue.
#[async_trait]
pub trait RecognizerFactory: Send + Sync {
    async fn open(
        &self,
        events: mpsc::Sender<Event>,
    ) -> Result<Box<dyn Recognizer>, PipelineError>;
}

/// One message from the recognizer. Only `TurnInfo` is consumed; every other
/// message type is ignored.
#[derive(Debug, Deserialize)]
struct RecognizerMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    transcript: Option<String>,
}

/// Translate one raw recognizer message into a call event.
fn parse_turn_event(raw: &str) -> Option<Event> {
    let msg: RecognizerMessage = serde_json::from_str(raw).ok()?;
    if msg.kind != "TurnInfo" {
        return None;
    }
    match msg.event.as_deref() {
        Some("StartOfTurn") => Some(Event::RecognizerStartOfTurn),
        Some("EndOfTurn") => {
            let transcript = msg.transcript.unwrap_or_default().trim().to_string();
            Some(Event::RecognizerEndOfTurn { transcript })
        }
        _ => None,
    }
}

/// Deepgram Flux recognizer session.
pub struct DeepgramRecognizer {
    write: Mutex<WsSink>,
    reader: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
    open: Arc<AtomicBool>,
}

impl DeepgramRecognizer {
    /// Connect and start the background reader that pushes turn events onto
    /// the call queue.
    pub async fn connect(
        settings: &RecognizerSettings,
        events: mpsc::Sender<Event>,
    ) -> Result<Self, PipelineError> {
        let url = format!(
            "{}?model={}&encoding=mulaw&sample_rate={}",
            settings.endpoint,
            settings.model,
            audio::SAMPLE_RATE_HZ
        );

        let mut request = url
            .into_client_request()
            .map_err(|e| PipelineError::RecognizerConnect(e.to_string()))?;
        let token = format!("Token {}", settings.api_key);
        request.headers_mut().insert(
            AUTHORIZATION,
            token
                .parse()
                .map_err(|_| PipelineError::RecognizerConnect("invalid api key".into()))?,
        );

        let (ws, _response) = connect_async(request)
            .await
            .map_err(|e| PipelineError::RecognizerConnect(e.to_string()))?;
        let (write, read) = ws.split();

        let open = Arc::new(AtomicBool::new(true));
        let reader = tokio::spawn(read_loop(read, events, open.clone()));

        tracing::info!(model = %settings.model, "recognizer session connected");
        Ok(Self {
            write: Mutex::new(write),
            reader: parking_lot::Mutex::new(Some(reader)),
            open,
        })
    }
}

async fn read_loop(mut read: WsSource, events: mpsc::Sender<Event>, open: Arc<AtomicBool>) {
    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if let Some(event) = parse_turn_event(&text) {
                    if events.send(event).await.is_err() {
                        // Call loop is gone; nothing left to deliver to.
                        break;
                    }
                }
            }
            Ok(Message::Close(_)) => {
                tracing::info!("recognizer closed the session");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "recognizer receive failed, session ends");
                break;
            }
        }
    }
    open.store(false, Ordering::SeqCst);
}

#[async_trait]
impl Recognizer for DeepgramRecognizer {
    async fn feed(&self, audio: &[u8]) {
        if !self.open.load(Ordering::SeqCst) {
            return;
        }
        let mut write = self.write.lock().await;
        if let Err(e) = write.send(Message::Binary(audio.to_vec())).await {
            tracing::warn!(error = %e, "recognizer send failed, frame dropped");
        }
    }

    async fn stop(&self) {
        self.open.store(false, Ordering::SeqCst);
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        let mut write = self.write.lock().await;
        let _ = write.close().await;
        tracing::info!("recognizer session stopped");
    }
}

/// Production factory over [`DeepgramRecognizer`].
pub struct DeepgramFactory {
    settings: RecognizerSettings,
}

impl DeepgramFactory {
    pub fn new(settings: RecognizerSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl RecognizerFactory for DeepgramFactory {
    async fn open(
        &self,
        events: mpsc::Sender<Event>,
    ) -> Result<Box<dyn Recognizer>, PipelineError> {
        let session = DeepgramRecognizer::connect(&self.settings, events).await?;
        Ok(Box::new(session))
    }
}
