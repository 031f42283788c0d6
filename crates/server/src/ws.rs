//! Media-stream WebSocket handler
//!
//! Owns the boundary between the socket and the call loop: a reader task
//! parses inbound frames into events, and a sink adapter gives the player
//! its exclusive write path. Everything else is `run_call`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};

use dialtone_agent::{run_call, CallServices, CallTuning};
use dialtone_core::error::{Error, Result};
use dialtone_core::{Event, TelephonySink, EVENT_QUEUE_DEPTH};
use dialtone_llm::OpenAiBackend;
use dialtone_pipeline::{DeepgramFactory, ElevenLabsConnector};
use dialtone_telephony::{clear_frame, media_frame, parse_inbound};

use crate::state::AppState;

/// `GET /ws` — the telephony provider connects here once a call is live.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Outbound half of the telephony socket.
struct WsTelephonySink {
    sender: Mutex<SplitSink<WebSocket, Message>>,
}

#[async_trait]
impl TelephonySink for WsTelephonySink {
    async fn send_media(&self, stream_sid: &str, payload_b64: &str) -> Result<()> {
        let frame = media_frame(stream_sid, payload_b64);
        let mut sender = self.sender.lock().await;
        sender
            .send(Message::Text(frame))
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }

    async fn send_clear(&self, stream_sid: &str) -> Result<()> {
        let frame = clear_frame(stream_sid);
        let mut sender = self.sender.lock().await;
        sender
            .send(Message::Text(frame))
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }
}

impl WsTelephonySink {
    async fn close(&self) {
        let _ = self.sender.lock().await.close().await;
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sender, mut receiver) = socket.split();
    let sink = Arc::new(WsTelephonySink {
        sender: Mutex::new(sender),
    });

    let (events_tx, events_rx) = mpsc::channel::<Event>(EVENT_QUEUE_DEPTH);

    // Reader: demultiplex the socket into typed events. Any read failure
    // synthesizes StreamStop so the loop always terminates.
    let reader_events = events_tx.clone();
    let reader = tokio::spawn(async move {
        loop {
            match receiver.next().await {
                Some(Ok(Message::Text(text))) => {
                    if let Some(event) = parse_inbound(&text) {
                        let stopping = matches!(event, Event::StreamStop);
                        if reader_events.send(event).await.is_err() || stopping {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    let _ = reader_events.try_send(Event::StreamStop);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "telephony read failed");
                    let _ = reader_events.try_send(Event::StreamStop);
                    break;
                }
            }
        }
    });

    let reader_abort = reader.abort_handle();

    let settings = &state.settings;
    let llm = match OpenAiBackend::new(settings.llm.clone()) {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            // Credentials are validated at startup; this is belt and braces.
            tracing::error!(error = %e, "cannot build LLM backend, refusing call");
            reader.abort();
            sink.close().await;
            return;
        }
    };

    let services = CallServices {
        recognizer: Arc::new(DeepgramFactory::new(settings.recognizer.clone())),
        tts: Arc::new(ElevenLabsConnector::new(settings.tts.clone())),
        llm,
    };
    let tuning = CallTuning {
        system_prompt: settings.llm.system_prompt.clone(),
        pool_size: settings.tts.pool_size,
        pool_ttl: Duration::from_secs_f64(settings.tts.pool_ttl_secs),
        trace_dir: settings.trace.dir.clone().into(),
    };

    // run_call cancels the reader first thing at teardown; closing the
    // socket is the only step left here.
    let report = run_call(
        events_rx,
        events_tx,
        sink.clone(),
        Some(reader_abort),
        services,
        tuning,
    )
    .await;

    sink.close().await;
    tracing::info!(
        history_len = report.history.len(),
        trace = ?report.trace_path,
        "telephony websocket closed"
    );
}
