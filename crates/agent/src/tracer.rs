//! Per-turn latency tracer
//!
//! Records named spans and point-in-time markers for every agent turn, with
//! all timestamps in milliseconds relative to the turn's start. The tracer is
//! a passive sink: every call is synchronous bookkeeping under a short lock,
//! and nothing here can block the call loop. One JSON document per call is
//! persisted at teardown.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
struct Span {
    name: String,
    start_ms: f64,
    end_ms: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
struct Marker {
    name: String,
    time_ms: f64,
}

#[derive(Debug)]
struct TurnTrace {
    transcript: String,
    t0: Instant,
    spans: Vec<Span>,
    markers: Vec<Marker>,
    cancelled: bool,
}

#[derive(Debug, Serialize)]
struct TurnRecord<'a> {
    turn: usize,
    transcript: &'a str,
    cancelled: bool,
    spans: &'a [Span],
    markers: &'a [Marker],
}

#[derive(Debug, Serialize)]
struct TraceDocument<'a> {
    call_id: &'a str,
    turns: Vec<TurnRecord<'a>>,
}

#[derive(Debug, Default)]
struct TracerInner {
    turns: BTreeMap<usize, TurnTrace>,
    counter: usize,
}

/// Span recorder for one call.
pub struct Tracer {
    inner: parking_lot::Mutex<TracerInner>,
    dir: PathBuf,
}

impl Tracer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: parking_lot::Mutex::new(TracerInner::default()),
            dir: dir.into(),
        }
    }

    /// Start a new turn; returns its number (1-based).
    pub fn begin_turn(&self, transcript: &str) -> usize {
        let mut inner = self.inner.lock();
        inner.counter += 1;
        let turn = inner.counter;
        inner.turns.insert(
            turn,
            TurnTrace {
                transcript: transcript.to_string(),
                t0: Instant::now(),
                spans: Vec::new(),
                markers: Vec::new(),
                cancelled: false,
            },
        );
        turn
    }

    /// Open a named span within a turn.
    pub fn begin(&self, turn: usize, name: &str) {
        let mut inner = self.inner.lock();
        let Some(t) = inner.turns.get_mut(&turn) else { return };
        let ms = t.t0.elapsed().as_secs_f64() * 1000.0;
        t.spans.push(Span {
            name: name.to_string(),
            start_ms: ms,
            end_ms: None,
        });
    }

    /// Close the most recent open span with this name.
    pub fn end(&self, turn: usize, name: &str) {
        let mut inner = self.inner.lock();
        let Some(t) = inner.turns.get_mut(&turn) else { return };
        let ms = t.t0.elapsed().as_secs_f64() * 1000.0;
        for span in t.spans.iter_mut().rev() {
            if span.name == name && span.end_ms.is_none() {
                span.end_ms = Some(ms);
                return;
            }
        }
    }

    /// Record a point-in-time marker.
    pub fn mark(&self, turn: usize, name: &str) {
        let mut inner = self.inner.lock();
        let Some(t) = inner.turns.get_mut(&turn) else { return };
        let ms = t.t0.elapsed().as_secs_f64() * 1000.0;
        t.markers.push(Marker {
            name: name.to_string(),
            time_ms: ms,
        });
    }

    /// Mark a turn as cancelled and close all of its open spans.
    pub fn cancel_turn(&self, turn: usize) {
        let mut inner = self.inner.lock();
        let Some(t) = inner.turns.get_mut(&turn) else { return };
        t.cancelled = true;
        let ms = t.t0.elapsed().as_secs_f64() * 1000.0;
        for span in t.spans.iter_mut() {
            if span.end_ms.is_none() {
                span.end_ms = Some(ms);
            }
        }
    }

    /// Persist the trace as `<dir>/<call_id>.json`. Returns `None` when the
    /// call had no turns or the write failed (logged, never fatal).
    pub fn save(&self, call_id: &str) -> Option<PathBuf> {
        let inner = self.inner.lock();
        if inner.turns.is_empty() {
            return None;
        }

        let doc = TraceDocument {
            call_id,
            turns: inner
                .turns
                .iter()
                .map(|(turn, t)| TurnRecord {
                    turn: *turn,
                    transcript: &t.transcript,
                    cancelled: t.cancelled,
                    spans: &t.spans,
                    markers: &t.markers,
                })
                .collect(),
        };

        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            tracing::warn!(error = %e, dir = %self.dir.display(), "cannot create trace dir");
            return None;
        }
        let path = self.dir.join(format!("{call_id}.json"));
        let json = serde_json::to_string_pretty(&doc).expect("trace document serializes");
        match std::fs::write(&path, json) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "trace saved");
                Some(path)
            }
            Err(e) => {
                tracing::warn!(error = %e, "trace write failed");
                None
            }
        }
    }

    /// Directory this tracer persists into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
