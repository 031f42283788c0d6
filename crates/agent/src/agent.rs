//! Agent response pipeline
//!
//! One `Agent` lives for the whole call. The LLM service inside it is
//! persistent and owns the conversation history; the synthesizer binding and
//! the player exist only for the active turn. A turn flows
//!
//! ```text
//! start_turn(transcript) -> history -> LLM tokens -> TTS audio -> player -> caller
//! ```
//!
//! and `reset_turn` tears the active turn down in LLM → TTS → player order,
//! clearing the provider's outbound buffer so a barge-in goes silent
//! immediately. History always survives a reset.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;

use dialtone_core::{ChatMessage, Event, TelephonySink};
use dialtone_llm::{LlmBackend, LlmService, LlmTurnEvent};
use dialtone_pipeline::{AudioPlayer, TtsPool, TtsSession, TtsStreamEvent};

use crate::tracer::Tracer;

/// State for the turn currently being generated and played.
struct ActiveTurn {
    turn_no: usize,
    tts: Arc<dyn TtsSession>,
    player: Arc<AudioPlayer>,
    /// Forwarding task shuttling LLM tokens to the synthesizer and audio to
    /// the player.
    driver: tokio::task::JoinHandle<()>,
    /// Set once playback completed (or the turn failed over) and the turn no
    /// longer needs cancellation.
    completed: Arc<AtomicBool>,
}

/// Self-contained response pipeline for one call.
pub struct Agent {
    sink: Arc<dyn TelephonySink>,
    stream_sid: String,
    events: mpsc::Sender<Event>,
    pool: Arc<TtsPool>,
    llm: LlmService,
    tracer: Arc<Tracer>,
    turn: Option<ActiveTurn>,
}

impl Agent {
    pub fn new(
        sink: Arc<dyn TelephonySink>,
        stream_sid: impl Into<String>,
        events: mpsc::Sender<Event>,
        pool: Arc<TtsPool>,
        backend: Arc<dyn LlmBackend>,
        system_prompt: impl Into<String>,
        tracer: Arc<Tracer>,
    ) -> Self {
        Self {
            sink,
            stream_sid: stream_sid.into(),
            events,
            pool,
            llm: LlmService::new(backend, system_prompt),
            tracer,
            turn: None,
        }
    }

    /// Read-only snapshot of the conversation history.
    pub fn history(&self) -> Vec<ChatMessage> {
        self.llm.history()
    }

    pub fn is_turn_active(&self) -> bool {
        self.turn
            .as_ref()
            .is_some_and(|t| !t.completed.load(Ordering::SeqCst))
    }

    /// Start a new turn for `transcript`. An active turn is reset first.
    pub async fn start_turn(&mut self, transcript: &str) {
        if self.turn.is_some() {
            self.reset_turn().await;
        }

        let t0 = Instant::now();
        let turn_no = self.tracer.begin_turn(transcript);
        metrics::counter!("dialtone_turns_started").increment(1);

        // Synthesizer first: warm acquisition is what keeps the latency
        // floor low, and a turn without a synthesizer cannot proceed.
        self.tracer.begin(turn_no, "tts_pool");
        let (tts_tx, tts_rx) = mpsc::unbounded_channel();
        let tts = match self.pool.acquire(Some(tts_tx)).await {
            Ok(tts) => tts,
            Err(e) => {
                tracing::warn!(error = %e, turn = turn_no, "synthesizer acquisition failed, abandoning turn");
                self.tracer.cancel_turn(turn_no);
                let _ = self.events.try_send(Event::AgentTurnDone);
                return;
            }
        };
        self.tracer.end(turn_no, "tts_pool");
        let setup_ms = t0.elapsed().as_millis() as u64;

        let completed = Arc::new(AtomicBool::new(false));
        let player = {
            let tracer = self.tracer.clone();
            let events = self.events.clone();
            let completed = completed.clone();
            let on_done = Box::new(move || {
                completed.store(true, Ordering::SeqCst);
                tracer.end(turn_no, "player");
                tracing::info!(
                    turn = turn_no,
                    total_ms = t0.elapsed().as_millis() as u64,
                    "turn complete"
                );
                let _ = events.try_send(Event::AgentTurnDone);
            });
            Arc::new(AudioPlayer::start(
                self.sink.clone(),
                self.stream_sid.clone(),
                on_done,
            ))
        };

        let (llm_tx, llm_rx) = mpsc::channel(64);
        self.tracer.begin(turn_no, "llm");
        self.llm.start(transcript, llm_tx).await;

        let driver = tokio::spawn(drive_turn(TurnWiring {
            llm_rx,
            tts_rx,
            tts: tts.clone(),
            player: player.clone(),
            tracer: self.tracer.clone(),
            events: self.events.clone(),
            completed: completed.clone(),
            turn_no,
            t0,
        }));

        tracing::info!(turn = turn_no, setup_ms, "turn started");
        self.turn = Some(ActiveTurn {
            turn_no,
            tts,
            player,
            driver,
            completed,
        });
    }

    /// Cancel the active turn (barge-in or teardown). History is preserved;
    /// on a no-longer-active turn this only drops leftovers.
    pub async fn reset_turn(&mut self) {
        let Some(turn) = self.turn.take() else { return };

        if turn.completed.load(Ordering::SeqCst) {
            // Playback already finished; nothing is in flight. Drop the
            // dispensed session and the idle forwarding task.
            turn.driver.abort();
            turn.tts.cancel().await;
            return;
        }

        metrics::counter!("dialtone_turns_cancelled").increment(1);
        self.tracer.cancel_turn(turn.turn_no);

        // Order matters: the LLM stops producing, the forwarder stops
        // shuttling, the synthesizer is torn down, and only then is the
        // player stopped and the remote buffer cleared, so no cancelled
        // audio can trail the clear frame.
        self.llm.cancel().await;
        turn.driver.abort();
        turn.tts.cancel().await;
        if !turn.player.is_finished() {
            turn.player.stop_and_clear().await;
        }

        tracing::info!(turn = turn.turn_no, "turn reset (history preserved)");
    }

    /// Final cleanup when the call ends.
    pub async fn cleanup(&mut self) {
        self.reset_turn().await;
    }
}

struct TurnWiring {
    llm_rx: mpsc::Receiver<LlmTurnEvent>,
    tts_rx: mpsc::UnboundedReceiver<TtsStreamEvent>,
    tts: Arc<dyn TtsSession>,
    player: Arc<AudioPlayer>,
    tracer: Arc<Tracer>,
    events: mpsc::Sender<Event>,
    completed: Arc<AtomicBool>,
    turn_no: usize,
    t0: Instant,
}

/// Shuttle one turn's streams: LLM tokens into the synthesizer, synthesized
/// audio into the player. Exits when the synthesizer signals it is done (the
/// player then drains on its own) or when the turn fails over.
async fn drive_turn(mut w: TurnWiring) {
    let mut got_first_token = false;
    let mut got_first_audio = false;
    let mut llm_closed = false;

    loop {
        tokio::select! {
            maybe = w.llm_rx.recv(), if !llm_closed => match maybe {
                Some(LlmTurnEvent::Token(token)) => {
                    if !got_first_token {
                        got_first_token = true;
                        w.tracer.mark(w.turn_no, "llm_first_token");
                        w.tracer.begin(w.turn_no, "tts");
                        tracing::info!(
                            turn = w.turn_no,
                            elapsed_ms = w.t0.elapsed().as_millis() as u64,
                            "llm first token"
                        );
                    }
                    w.tts.send(&token).await;
                }
                Some(LlmTurnEvent::Done) => {
                    w.tracer.end(w.turn_no, "llm");
                    w.tts.flush().await;
                }
                Some(LlmTurnEvent::Failed) => {
                    // Mid-stream failure behaves like a barge-in: silence,
                    // then back to listening. History was left untouched by
                    // the service.
                    w.tracer.cancel_turn(w.turn_no);
                    w.tts.cancel().await;
                    w.player.stop_and_clear().await;
                    w.completed.store(true, Ordering::SeqCst);
                    let _ = w.events.try_send(Event::AgentTurnDone);
                    break;
                }
                None => llm_closed = true,
            },

            maybe = w.tts_rx.recv() => match maybe {
                Some(TtsStreamEvent::Audio(chunk)) => {
                    if !got_first_audio {
                        got_first_audio = true;
                        w.tracer.mark(w.turn_no, "tts_first_audio");
                        w.tracer.begin(w.turn_no, "player");
                        tracing::info!(
                            turn = w.turn_no,
                            elapsed_ms = w.t0.elapsed().as_millis() as u64,
                            "tts first audio"
                        );
                    }
                    w.player.push(chunk);
                }
                Some(TtsStreamEvent::Done) => {
                    w.tracer.end(w.turn_no, "tts");
                    w.player.mark_input_complete();
                    break;
                }
                // Sink unbound (session cancelled out from under us).
                None => break,
            },
        }
    }
}
