//! Per-call LLM service
//!
//! Persistent across turns: it owns the conversation history and survives
//! barge-ins. Each `start` runs one generation task that streams tokens to
//! the current turn; `cancel` stops it and records what the caller actually
//! heard.
//!
//! History rules:
//! - the user message is appended before the stream begins;
//! - on normal completion the full assistant text is appended;
//! - on cancellation the partial text plus a cut-off marker is appended,
//!   but only if at least one token was seen;
//! - on a stream error nothing is appended.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};

use dialtone_core::ChatMessage;

use crate::backend::LlmBackend;

/// Events a generation delivers to the turn that started it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmTurnEvent {
    /// One streamed text delta.
    Token(String),
    /// The stream completed; the assistant message is already in history.
    Done,
    /// The stream failed mid-flight; nothing was appended to history.
    Failed,
}

/// Conversation service over a streaming backend.
pub struct LlmService {
    backend: Arc<dyn LlmBackend>,
    system_prompt: String,
    history: Arc<parking_lot::Mutex<Vec<ChatMessage>>>,
    running: Arc<AtomicBool>,
    cancel: Arc<Notify>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl LlmService {
    pub fn new(backend: Arc<dyn LlmBackend>, system_prompt: impl Into<String>) -> Self {
        Self {
            backend,
            system_prompt: system_prompt.into(),
            history: Arc::new(parking_lot::Mutex::new(Vec::new())),
            running: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(Notify::new()),
            task: None,
        }
    }

    /// Snapshot of the conversation history.
    pub fn history(&self) -> Vec<ChatMessage> {
        self.history.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Begin generating a response to `user_message`, streaming events to
    /// `tx`. An already-running generation is cancelled first.
    pub async fn start(&mut self, user_message: &str, tx: mpsc::Sender<LlmTurnEvent>) {
        if self.is_running() {
            self.cancel().await;
        }

        // The user entry lands in history strictly before the stream begins.
        self.history.lock().push(ChatMessage::user(user_message));

        let mut messages = Vec::with_capacity(self.history.lock().len() + 1);
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        messages.extend(self.history.lock().iter().cloned());

        // Fresh cancel handle per generation: cancelling a turn that already
        // finished must not leave a stored permit that would kill this one.
        self.cancel = Arc::new(Notify::new());
        self.running.store(true, Ordering::SeqCst);
        let task = tokio::spawn(generate_turn(
            self.backend.clone(),
            messages,
            self.history.clone(),
            self.running.clone(),
            self.cancel.clone(),
            tx,
        ));
        self.task = Some(task);
        tracing::debug!(model = %self.backend.model_name(), "generation started");
    }

    /// Cancel the running generation, waiting for it to wind down so the
    /// partial-response history entry is recorded before this returns.
    pub async fn cancel(&mut self) {
        let Some(task) = self.task.take() else { return };
        self.cancel.notify_one();
        let _ = task.await;
        self.running.store(false, Ordering::SeqCst);
        tracing::debug!("generation cancelled");
    }
}

async fn generate_turn(
    backend: Arc<dyn LlmBackend>,
    messages: Vec<ChatMessage>,
    history: Arc<parking_lot::Mutex<Vec<ChatMessage>>>,
    running: Arc<AtomicBool>,
    cancel: Arc<Notify>,
    tx: mpsc::Sender<LlmTurnEvent>,
) {
    let (token_tx, mut token_rx) = mpsc::channel::<String>(64);
    let generation = backend.generate_stream(&messages, token_tx);
    tokio::pin!(generation);

    let mut partial = String::new();
    let mut tokens_closed = false;

    loop {
        tokio::select! {
            _ = cancel.notified() => {
                if !partial.is_empty() {
                    history.lock().push(ChatMessage::assistant_cut_off(&partial));
                }
                tracing::info!(chars = partial.len(), "generation interrupted");
                break;
            }

            maybe_token = token_rx.recv(), if !tokens_closed => {
                match maybe_token {
                    Some(token) => {
                        partial.push_str(&token);
                        let _ = tx.send(LlmTurnEvent::Token(token)).await;
                    }
                    None => tokens_closed = true,
                }
            }

            result = &mut generation => {
                // Deliver any tokens still buffered in the channel before
                // the terminal event.
                while let Ok(token) = token_rx.try_recv() {
                    partial.push_str(&token);
                    let _ = tx.send(LlmTurnEvent::Token(token)).await;
                }

                match result {
                    Ok(result) => {
                        // The assistant entry lands in history strictly
                        // before the Done event is observable.
                        history.lock().push(ChatMessage::assistant(result.text));
                        let _ = tx.send(LlmTurnEvent::Done).await;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "generation failed");
                        let _ = tx.send(LlmTurnEvent::Failed).await;
                    }
                }
                break;
            }
        }
    }

    running.store(false, Ordering::SeqCst);
}
