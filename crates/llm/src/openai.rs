//! OpenAI-compatible streaming backend
//!
//! Speaks the `/chat/completions` SSE protocol. The default deployment
//! points at Groq, whose completion latency fits inside a voice turn, but
//! any OpenAI-compatible endpoint works.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use dialtone_config::LlmSettings;
use dialtone_core::ChatMessage;

use crate::backend::{FinishReason, GenerationResult, LlmBackend};
use crate::LlmError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Streaming chat-completions client.
pub struct OpenAiBackend {
    settings: LlmSettings,
    client: Client,
}

impl OpenAiBackend {
    pub fn new(settings: LlmSettings) -> Result<Self, LlmError> {
        if settings.api_key.is_empty() {
            return Err(LlmError::Configuration(
                "LLM API key not set. Set GROQ_API_KEY via environment or config.".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        Ok(Self { settings, client })
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn generate_stream(
        &self,
        messages: &[ChatMessage],
        tx: mpsc::Sender<String>,
    ) -> Result<GenerationResult, LlmError> {
        let request = ChatRequest {
            model: &self.settings.model,
            messages,
            stream: true,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.settings.endpoint))
            .bearer_auth(&self.settings.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, error_text)));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut full_text = String::new();
        let mut finish_reason = FinishReason::Stop;

        'outer: while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| LlmError::Network(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(line_end) = buffer.find('\n') {
                let line = buffer[..line_end].trim().to_string();
                buffer = buffer[line_end + 1..].to_string();

                if line.is_empty() {
                    continue;
                }

                if let Some(json_str) = line.strip_prefix("data: ") {
                    if json_str == "[DONE]" {
                        continue;
                    }

                    if let Ok(event) = serde_json::from_str::<ChatChunk>(json_str) {
                        let Some(choice) = event.choices.into_iter().next() else {
                            continue;
                        };
                        if let Some(token) = choice.delta.content {
                            if !token.is_empty() {
                                full_text.push_str(&token);
                                if tx.send(token).await.is_err() {
                                    // Consumer hung up; stop generating.
                                    break 'outer;
                                }
                            }
                        }
                        if choice.finish_reason.as_deref() == Some("length") {
                            finish_reason = FinishReason::Length;
                        }
                    }
                }
            }
        }

        Ok(GenerationResult {
            text: full_text,
            finish_reason,
        })
    }

    fn model_name(&self) -> &str {
        &self.settings.model
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    delta: ChatDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatDelta {
    #[serde(default)]
    content: Option<String>,
}
