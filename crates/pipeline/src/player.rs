//! Audio player
//!
//! Paces synthesized audio back to the caller at real-time rate. The player
//! owns an independent drain task: chunks are appended with [`AudioPlayer::push`],
//! a sentinel from [`AudioPlayer::mark_input_complete`] tells the drain there
//! is no more input, and the drain invokes the completion callback exactly
//! once when it runs dry. [`AudioPlayer::stop_and_clear`] kills the drain,
//! drops everything queued locally, and clears the provider's remote buffer
//! so barge-in is audibly instant.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dialtone_core::audio::{FRAME_DURATION, PLAYER_POLL_INTERVAL};
use dialtone_core::TelephonySink;

struct PlayerShared {
    queue: parking_lot::Mutex<VecDeque<String>>,
    input_done: AtomicBool,
    /// Set when the drain exited on its own (completed or send failure),
    /// as opposed to being cancelled.
    finished: AtomicBool,
}

/// Real-time paced playback of base64 mulaw chunks.
pub struct AudioPlayer {
    shared: Arc<PlayerShared>,
    sink: Arc<dyn TelephonySink>,
    stream_sid: String,
    drain: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl AudioPlayer {
    /// Create the player and start its drain task. `on_done` fires exactly
    /// once if playback ends without being interrupted.
    pub fn start(
        sink: Arc<dyn TelephonySink>,
        stream_sid: impl Into<String>,
        on_done: Box<dyn FnOnce() + Send>,
    ) -> Self {
        let stream_sid = stream_sid.into();
        let shared = Arc::new(PlayerShared {
            queue: parking_lot::Mutex::new(VecDeque::new()),
            input_done: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        });

        let drain = tokio::spawn(drain_loop(
            shared.clone(),
            sink.clone(),
            stream_sid.clone(),
            on_done,
        ));

        Self {
            shared,
            sink,
            stream_sid,
            drain: parking_lot::Mutex::new(Some(drain)),
        }
    }

    /// Append one chunk (base64 mulaw) to the playback queue.
    pub fn push(&self, chunk: String) {
        self.shared.queue.lock().push_back(chunk);
    }

    /// Signal that no more chunks will be pushed; the drain finishes once
    /// the queue is empty.
    pub fn mark_input_complete(&self) {
        self.shared.input_done.store(true, Ordering::SeqCst);
    }

    /// Whether the drain already ran to its end.
    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::SeqCst)
    }

    /// Interrupt: cancel the drain, discard queued chunks, and clear the
    /// provider's outbound buffer.
    pub async fn stop_and_clear(&self) {
        if let Some(drain) = self.drain.lock().take() {
            drain.abort();
        }
        self.shared.queue.lock().clear();
        if let Err(e) = self.sink.send_clear(&self.stream_sid).await {
            tracing::debug!(error = %e, "buffer clear failed (socket likely closed)");
        }
        tracing::debug!("playback stopped and cleared");
    }
}

async fn drain_loop(
    shared: Arc<PlayerShared>,
    sink: Arc<dyn TelephonySink>,
    stream_sid: String,
    on_done: Box<dyn FnOnce() + Send>,
) {
    let mut sent: u64 = 0;
    loop {
        let chunk = shared.queue.lock().pop_front();
        match chunk {
            Some(chunk) => {
                if let Err(e) = sink.send_media(&stream_sid, &chunk).await {
                    // The telephony socket is not recoverable at this layer.
                    tracing::warn!(error = %e, "media send failed, ending playback");
                    break;
                }
                sent += 1;
                tokio::time::sleep(FRAME_DURATION).await;
            }
            None if shared.input_done.load(Ordering::SeqCst) => break,
            None => tokio::time::sleep(PLAYER_POLL_INTERVAL).await,
        }
    }
    shared.finished.store(true, Ordering::SeqCst);
    tracing::debug!(frames = sent, "playback complete");
    on_done();
}
