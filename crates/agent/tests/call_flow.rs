//! End-to-end call flow tests
//!
//! Drive `run_call` through scripted recognizer, LLM, and synthesizer fakes
//! and assert on the only things a caller can observe: what went out over
//! the telephony socket and what ended up in the conversation history.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::timeout;

use dialtone_agent::{run_call, CallReport, CallServices, CallTuning};
use dialtone_core::error::Result as SinkResult;
use dialtone_core::{ChatMessage, Event, TelephonySink, CUT_OFF_MARKER};
use dialtone_llm::{FinishReason, GenerationResult, LlmBackend, LlmError};
use dialtone_pipeline::{
    PipelineError, Recognizer, RecognizerFactory, TtsConnector, TtsSession, TtsSink,
    TtsStreamEvent,
};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum SinkCall {
    Media(String),
    Clear,
}

struct RecordingSink {
    calls: parking_lot::Mutex<Vec<SinkCall>>,
}

impl RecordingSink {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: parking_lot::Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().clone()
    }

    fn media_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, SinkCall::Media(_)))
            .count()
    }
}

#[async_trait]
impl TelephonySink for RecordingSink {
    async fn send_media(&self, _sid: &str, payload: &str) -> SinkResult<()> {
        self.calls.lock().push(SinkCall::Media(payload.to_string()));
        Ok(())
    }

    async fn send_clear(&self, _sid: &str) -> SinkResult<()> {
        self.calls.lock().push(SinkCall::Clear);
        Ok(())
    }
}

struct FakeRecognizer {
    fed: Arc<parking_lot::Mutex<Vec<Vec<u8>>>>,
    stopped: Arc<AtomicBool>,
}

#[async_trait]
impl Recognizer for FakeRecognizer {
    async fn feed(&self, audio: &[u8]) {
        self.fed.lock().push(audio.to_vec());
    }

    async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

struct FakeRecognizerFactory {
    fed: Arc<parking_lot::Mutex<Vec<Vec<u8>>>>,
    stopped: Arc<AtomicBool>,
}

impl FakeRecognizerFactory {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            fed: Arc::new(parking_lot::Mutex::new(Vec::new())),
            stopped: Arc::new(AtomicBool::new(false)),
        })
    }
}

#[async_trait]
impl RecognizerFactory for FakeRecognizerFactory {
    async fn open(
        &self,
        _events: mpsc::Sender<Event>,
    ) -> Result<Box<dyn Recognizer>, PipelineError> {
        Ok(Box::new(FakeRecognizer {
            fed: self.fed.clone(),
            stopped: self.stopped.clone(),
        }))
    }
}

/// Synthesizer fake: emits scripted chunks on the first `send` and on
/// `flush` (followed by the terminal marker).
struct FakeTtsSession {
    sink: parking_lot::Mutex<TtsSink>,
    sent: parking_lot::Mutex<Vec<String>>,
    on_first_send: Vec<String>,
    on_flush: Vec<String>,
    first_send_seen: AtomicBool,
    cancelled: AtomicUsize,
}

impl FakeTtsSession {
    fn deliver(&self, event: TtsStreamEvent) {
        if let Some(tx) = self.sink.lock().as_ref() {
            let _ = tx.send(event);
        }
    }
}

#[async_trait]
impl TtsSession for FakeTtsSession {
    async fn send(&self, text: &str) {
        self.sent.lock().push(text.to_string());
        if !self.first_send_seen.swap(true, Ordering::SeqCst) {
            for chunk in &self.on_first_send {
                self.deliver(TtsStreamEvent::Audio(chunk.clone()));
            }
        }
    }

    async fn flush(&self) {
        for chunk in &self.on_flush {
            self.deliver(TtsStreamEvent::Audio(chunk.clone()));
        }
        self.deliver(TtsStreamEvent::Done);
    }

    async fn cancel(&self) {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
        *self.sink.lock() = None;
    }

    fn rebind(&self, sink: TtsSink) {
        *self.sink.lock() = sink;
    }

    fn is_open(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) == 0
    }
}

struct FakeTtsConnector {
    on_first_send: Vec<String>,
    on_flush: Vec<String>,
    sessions: parking_lot::Mutex<Vec<Arc<FakeTtsSession>>>,
}

impl FakeTtsConnector {
    fn new(on_first_send: &[&str], on_flush: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            on_first_send: on_first_send.iter().map(|s| s.to_string()).collect(),
            on_flush: on_flush.iter().map(|s| s.to_string()).collect(),
            sessions: parking_lot::Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl TtsConnector for FakeTtsConnector {
    async fn open(&self, sink: TtsSink) -> Result<Arc<dyn TtsSession>, PipelineError> {
        let session = Arc::new(FakeTtsSession {
            sink: parking_lot::Mutex::new(sink),
            sent: parking_lot::Mutex::new(Vec::new()),
            on_first_send: self.on_first_send.clone(),
            on_flush: self.on_flush.clone(),
            first_send_seen: AtomicBool::new(false),
            cancelled: AtomicUsize::new(0),
        });
        self.sessions.lock().push(session.clone());
        Ok(session)
    }
}

/// LLM fake: streams scripted tokens, then completes or hangs until
/// cancelled.
struct FakeLlm {
    tokens: Vec<&'static str>,
    complete: bool,
}

#[async_trait]
impl LlmBackend for FakeLlm {
    async fn generate_stream(
        &self,
        _messages: &[ChatMessage],
        tx: mpsc::Sender<String>,
    ) -> Result<GenerationResult, LlmError> {
        for token in &self.tokens {
            let _ = tx.send(token.to_string()).await;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        if self.complete {
            Ok(GenerationResult {
                text: self.tokens.concat(),
                finish_reason: FinishReason::Stop,
            })
        } else {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!("hanging generation should be cancelled")
        }
    }

    fn model_name(&self) -> &str {
        "fake"
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    events: mpsc::Sender<Event>,
    sink: Arc<RecordingSink>,
    recognizer: Arc<FakeRecognizerFactory>,
    call: tokio::task::JoinHandle<CallReport>,
}

impl Harness {
    fn spawn(llm: FakeLlm, tts: Arc<FakeTtsConnector>) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        let sink = RecordingSink::new();
        let recognizer = FakeRecognizerFactory::new();

        let services = CallServices {
            recognizer: recognizer.clone(),
            tts: tts.clone(),
            llm: Arc::new(llm),
        };
        let tuning = CallTuning {
            system_prompt: "be brief".into(),
            pool_size: 1,
            pool_ttl: Duration::from_secs(8),
            trace_dir: trace_dir(),
        };

        // No reader task here: the tests inject events directly.
        let call = tokio::spawn(run_call(
            events_rx,
            events_tx.clone(),
            sink.clone(),
            None,
            services,
            tuning,
        ));

        Self {
            events: events_tx,
            sink,
            recognizer,
            call,
        }
    }

    async fn send(&self, event: Event) {
        self.events.send(event).await.expect("loop is gone");
    }

    async fn wait_until(&self, what: &str, predicate: impl Fn(&Self) -> bool) {
        timeout(Duration::from_secs(2), async {
            while !predicate(self) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
    }

    async fn finish(self) -> (CallReport, Arc<RecordingSink>) {
        self.send(Event::StreamStop).await;
        let report = timeout(Duration::from_secs(2), self.call)
            .await
            .expect("call loop did not exit in bounded time")
            .expect("call loop panicked");
        (report, self.sink)
    }
}

fn trace_dir() -> PathBuf {
    std::env::temp_dir().join(format!("dialtone-callflow-{}", std::process::id()))
}

fn frame() -> Event {
    Event::Media {
        audio: vec![0u8; 160],
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hello_turn_plays_response_and_records_history() {
    let tts = FakeTtsConnector::new(&[], &["F1", "F2"]);
    let h = Harness::spawn(
        FakeLlm {
            tokens: vec!["Hi", " there."],
            complete: true,
        },
        tts,
    );

    h.send(Event::StreamStart {
        stream_sid: "CA-hello".into(),
    })
    .await;
    h.send(frame()).await;
    h.send(Event::RecognizerEndOfTurn {
        transcript: "Hello".into(),
    })
    .await;

    h.wait_until("both frames played", |h| h.sink.media_count() == 2)
        .await;
    // Let playback drain and the turn complete before hanging up.
    tokio::time::sleep(Duration::from_millis(150)).await;

    let recognizer = h.recognizer.clone();
    let (report, sink) = h.finish().await;

    assert_eq!(
        sink.calls(),
        vec![
            SinkCall::Media("F1".into()),
            SinkCall::Media("F2".into())
        ]
    );
    assert_eq!(
        report.history,
        vec![
            ChatMessage::user("Hello"),
            ChatMessage::assistant("Hi there.")
        ]
    );
    assert_eq!(*recognizer.fed.lock(), vec![vec![0u8; 160]]);

    let trace = report.trace_path.expect("trace written");
    let raw = std::fs::read_to_string(&trace).unwrap();
    assert!(raw.contains("\"transcript\": \"Hello\""));
    std::fs::remove_file(trace).ok();
}

#[tokio::test]
async fn barge_in_clears_buffer_and_truncates_history() {
    // F1 is synthesized as soon as the first token reaches the synthesizer;
    // the LLM then stalls so the turn is still in flight when the caller
    // starts talking again.
    let tts = FakeTtsConnector::new(&["F1"], &[]);
    let h = Harness::spawn(
        FakeLlm {
            tokens: vec!["Hi"],
            complete: false,
        },
        tts.clone(),
    );

    h.send(Event::StreamStart {
        stream_sid: "CA-barge".into(),
    })
    .await;
    h.send(Event::RecognizerEndOfTurn {
        transcript: "Hello".into(),
    })
    .await;

    h.wait_until("first frame played", |h| h.sink.media_count() == 1)
        .await;

    h.send(Event::RecognizerStartOfTurn).await;
    h.wait_until("buffer cleared", |h| {
        h.sink.calls().last() == Some(&SinkCall::Clear)
    })
    .await;

    let (report, sink) = h.finish().await;

    assert_eq!(
        sink.calls(),
        vec![SinkCall::Media("F1".into()), SinkCall::Clear]
    );
    assert_eq!(
        report.history,
        vec![
            ChatMessage::user("Hello"),
            ChatMessage::assistant(format!("Hi{CUT_OFF_MARKER}"))
        ]
    );

    // The dispensed session was cancelled exactly once by the reset.
    let sessions = tts.sessions.lock();
    let dispensed = sessions
        .iter()
        .find(|s| !s.sent.lock().is_empty())
        .expect("a session saw the token");
    assert_eq!(dispensed.cancelled.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn empty_transcript_starts_no_turn() {
    let tts = FakeTtsConnector::new(&[], &["F1"]);
    let h = Harness::spawn(
        FakeLlm {
            tokens: vec!["Hi"],
            complete: true,
        },
        tts.clone(),
    );

    h.send(Event::StreamStart {
        stream_sid: "CA-empty".into(),
    })
    .await;
    h.send(frame()).await;
    h.send(Event::RecognizerEndOfTurn {
        transcript: String::new(),
    })
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (report, sink) = h.finish().await;

    assert!(sink.calls().is_empty());
    assert!(report.history.is_empty());
    assert!(report.trace_path.is_none());
    // No session was ever dispensed with a real consumer.
    assert!(tts.sessions.lock().iter().all(|s| s.sent.lock().is_empty()));
}

#[tokio::test]
async fn teardown_mid_response_silences_and_exits_cleanly() {
    let tts = FakeTtsConnector::new(&["F1"], &[]);
    let h = Harness::spawn(
        FakeLlm {
            tokens: vec!["Hi"],
            complete: false,
        },
        tts.clone(),
    );

    h.send(Event::StreamStart {
        stream_sid: "CA-teardown".into(),
    })
    .await;
    h.send(Event::RecognizerEndOfTurn {
        transcript: "Hello".into(),
    })
    .await;
    h.wait_until("first frame played", |h| h.sink.media_count() == 1)
        .await;

    let recognizer = h.recognizer.clone();
    // Hangup while the agent is mid-response; finish() bounds the exit time.
    let (report, sink) = h.finish().await;

    assert_eq!(sink.calls().last(), Some(&SinkCall::Clear));
    assert_eq!(
        report.history,
        vec![
            ChatMessage::user("Hello"),
            ChatMessage::assistant(format!("Hi{CUT_OFF_MARKER}"))
        ]
    );
    assert!(recognizer.stopped.load(Ordering::SeqCst));

    // Every session (dispensed and still-warm alike) was cancelled exactly
    // once by the reset or the pool shutdown.
    let sessions = tts.sessions.lock();
    assert!(!sessions.is_empty());
    for session in sessions.iter() {
        assert_eq!(session.cancelled.load(Ordering::SeqCst), 1);
    }
}
