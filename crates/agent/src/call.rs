//! The per-call event loop
//!
//! Single consumer of the call's event queue. Producers are the telephony
//! reader (owned by the server), the recognizer's reader task, and the
//! agent's playback-done callback. Every event runs through the pure
//! transition, and the resulting actions are dispatched in order before the
//! next event is dequeued.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use dialtone_core::{transition, Action, CallState, ChatMessage, Event, Phase, TelephonySink};
use dialtone_llm::LlmBackend;
use dialtone_pipeline::{Recognizer, RecognizerFactory, TtsConnector, TtsPool};

use crate::agent::Agent;
use crate::tracer::Tracer;

/// The external streaming services one call multiplexes.
pub struct CallServices {
    pub recognizer: Arc<dyn RecognizerFactory>,
    pub tts: Arc<dyn TtsConnector>,
    pub llm: Arc<dyn LlmBackend>,
}

/// Per-call tuning, all derived from settings at the server layer.
#[derive(Debug, Clone)]
pub struct CallTuning {
    pub system_prompt: String,
    pub pool_size: usize,
    pub pool_ttl: Duration,
    pub trace_dir: PathBuf,
}

/// What a finished call leaves behind.
#[derive(Debug)]
pub struct CallReport {
    /// Final conversation history (empty if the stream never started).
    pub history: Vec<ChatMessage>,
    /// Where the trace document was written, when there was one.
    pub trace_path: Option<PathBuf>,
}

/// Run one call to completion.
///
/// `events_rx` is the single-consumer end of the call queue; `events_tx` is
/// handed to the recognizer and agent so they can push their own events.
/// `media_reader`, when present, is the caller's socket-reader task; it is
/// the first thing cancelled at teardown so no further inbound frames can
/// race the shutdown sequence. Returns after a `StreamStop` has been
/// dequeued and dispatched, with all per-call tasks torn down; closing the
/// socket itself stays with the caller, last.
pub async fn run_call(
    mut events_rx: mpsc::Receiver<Event>,
    events_tx: mpsc::Sender<Event>,
    sink: Arc<dyn TelephonySink>,
    media_reader: Option<tokio::task::AbortHandle>,
    services: CallServices,
    tuning: CallTuning,
) -> CallReport {
    let tracer = Arc::new(Tracer::new(&tuning.trace_dir));
    let pool = Arc::new(TtsPool::new(
        services.tts.clone(),
        tuning.pool_size,
        tuning.pool_ttl,
    ));

    let mut state = CallState::default();
    let mut recognizer: Option<Box<dyn Recognizer>> = None;
    let mut agent: Option<Agent> = None;
    let mut call_id: Option<String> = None;

    while let Some(event) = events_rx.recv().await {
        // Stream start brings up the per-call services before the
        // transition runs, so the actions of later events have something to
        // dispatch into.
        if let Event::StreamStart { stream_sid } = &event {
            tracing::info!(stream_sid = %stream_sid, "stream started");
            metrics::counter!("dialtone_calls_started").increment(1);
            call_id = Some(stream_sid.clone());

            match services.recognizer.open(events_tx.clone()).await {
                Ok(session) => recognizer = Some(session),
                Err(e) => {
                    // Without turn detection the call can never progress;
                    // tear it down.
                    tracing::error!(error = %e, "recognizer open failed, ending call");
                    let _ = events_tx.try_send(Event::StreamStop);
                }
            }

            pool.start().await;
            agent = Some(Agent::new(
                sink.clone(),
                stream_sid.clone(),
                events_tx.clone(),
                pool.clone(),
                services.llm.clone(),
                tuning.system_prompt.clone(),
                tracer.clone(),
            ));
        }

        let stopping = matches!(event, Event::StreamStop);
        if stopping {
            tracing::info!("stream stopped");
        }

        let prior_phase = state.phase;
        let (next, actions) = transition(state, event);
        if next.phase != prior_phase {
            tracing::debug!(from = ?prior_phase, to = ?next.phase, "phase change");
        }
        state = next;

        for action in actions {
            match action {
                Action::FeedRecognizer { audio } => {
                    if let Some(recognizer) = &recognizer {
                        recognizer.feed(&audio).await;
                    }
                }
                Action::StartAgentTurn { transcript } => {
                    if let Some(agent) = &mut agent {
                        agent.start_turn(&transcript).await;
                    }
                }
                Action::ResetAgentTurn => {
                    if let Some(agent) = &mut agent {
                        agent.reset_turn().await;
                    }
                }
            }
        }

        if stopping {
            break;
        }
    }

    // Teardown, deterministic order: media reader, in-flight turn, pool,
    // recognizer. The socket is closed by the caller after this returns.
    if let Some(media_reader) = media_reader {
        media_reader.abort();
    }
    let mut history = Vec::new();
    if let Some(agent) = &mut agent {
        agent.cleanup().await;
        history = agent.history();
    }
    pool.stop().await;
    if let Some(recognizer) = &recognizer {
        recognizer.stop().await;
    }

    let trace_path = call_id.as_deref().and_then(|id| tracer.save(id));
    if state.phase == Phase::Responding {
        // Only reachable when the queue closed without a StreamStop; the
        // reset above already silenced the turn.
        tracing::debug!("call ended while responding");
    }
    tracing::info!("call loop exited");

    CallReport {
        history,
        trace_path,
    }
}
