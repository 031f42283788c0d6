//! Warm synthesizer session pool
//!
//! Opening a synthesizer session costs a TLS + WebSocket handshake, which
//! would land squarely on the turn's critical path. The pool keeps up to
//! `size` sessions open and idle, each stamped with its creation time, and a
//! background fill loop replaces dispensed or expired ones. Sessions older
//! than the TTL are evicted because idle upstream sockets get closed
//! server-side.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Notify};

use super::{TtsConnector, TtsSession, TtsSink};
use crate::PipelineError;

/// Delay before retrying after a failed warm connect.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

struct PoolEntry {
    session: Arc<dyn TtsSession>,
    created_at: Instant,
}

/// Pool of pre-opened synthesizer sessions with TTL eviction.
pub struct TtsPool {
    connector: Arc<dyn TtsConnector>,
    size: usize,
    ttl: Duration,
    warm: Arc<Mutex<VecDeque<PoolEntry>>>,
    refill: Arc<Notify>,
    running: Arc<AtomicBool>,
    fill_task: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl TtsPool {
    pub fn new(connector: Arc<dyn TtsConnector>, size: usize, ttl: Duration) -> Self {
        Self {
            connector,
            size,
            ttl,
            warm: Arc::new(Mutex::new(VecDeque::new())),
            refill: Arc::new(Notify::new()),
            running: Arc::new(AtomicBool::new(false)),
            fill_task: parking_lot::Mutex::new(None),
        }
    }

    /// Number of warm sessions currently ready to dispense.
    pub async fn available(&self) -> usize {
        self.warm.lock().await.len()
    }

    /// Start the background fill loop.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let task = tokio::spawn(fill_loop(
            self.connector.clone(),
            self.size,
            self.ttl,
            self.warm.clone(),
            self.refill.clone(),
            self.running.clone(),
        ));
        *self.fill_task.lock() = Some(task);
    }

    /// Get a session bound to `sink`.
    ///
    /// Warm entries are dispensed oldest-first; any popped entry past the
    /// TTL is cancelled and skipped. With no usable warm entry the call
    /// blocks on a fresh connect. Either way the fill loop is signalled to
    /// top the pool back up.
    pub async fn acquire(&self, sink: TtsSink) -> Result<Arc<dyn TtsSession>, PipelineError> {
        loop {
            let entry = self.warm.lock().await.pop_front();
            let Some(entry) = entry else { break };
            let age = entry.created_at.elapsed();
            if age < self.ttl {
                entry.session.rebind(sink);
                tracing::debug!(idle_ms = age.as_millis() as u64, "dispensed warm synthesizer session");
                self.refill.notify_one();
                return Ok(entry.session);
            }
            tracing::debug!(idle_ms = age.as_millis() as u64, "discarding stale synthesizer session");
            entry.session.cancel().await;
        }

        tracing::info!("pool empty, opening synthesizer session inline");
        let session = self.connector.open(sink).await?;
        self.refill.notify_one();
        Ok(session)
    }

    /// Stop the fill loop and cancel every remaining warm session.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.refill.notify_one();
        if let Some(task) = self.fill_task.lock().take() {
            task.abort();
        }
        let mut warm = self.warm.lock().await;
        while let Some(entry) = warm.pop_front() {
            entry.session.cancel().await;
        }
    }
}

async fn fill_loop(
    connector: Arc<dyn TtsConnector>,
    size: usize,
    ttl: Duration,
    warm: Arc<Mutex<VecDeque<PoolEntry>>>,
    refill: Arc<Notify>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        // Evict entries past the TTL. Collect first so the lock is not held
        // across the cancel awaits.
        let stale: Vec<PoolEntry> = {
            let mut warm = warm.lock().await;
            let mut stale = Vec::new();
            // Entries sit in creation order, so expiry always hits the front.
            while warm
                .front()
                .is_some_and(|entry| entry.created_at.elapsed() >= ttl)
            {
                stale.extend(warm.pop_front());
            }
            stale
        };
        for entry in stale {
            tracing::debug!(
                idle_ms = entry.created_at.elapsed().as_millis() as u64,
                "evicted stale synthesizer session"
            );
            entry.session.cancel().await;
        }

        // Top up to the target size.
        while running.load(Ordering::SeqCst) && warm.lock().await.len() < size {
            match connector.open(None).await {
                Ok(session) => {
                    let mut warm = warm.lock().await;
                    warm.push_back(PoolEntry {
                        session,
                        created_at: Instant::now(),
                    });
                    tracing::debug!(warm = warm.len(), target = size, "warm synthesizer session ready");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "warm synthesizer connect failed, backing off");
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                }
            }
        }

        // Wake on dispense/evict, or periodically to re-check staleness.
        tokio::select! {
            _ = refill.notified() => {}
            _ = tokio::time::sleep(ttl / 2) => {}
        }
    }
}
