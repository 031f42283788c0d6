//! Default endpoints and tuning constants

/// External service endpoints.
pub mod endpoints {
    /// Twilio REST API base.
    pub const TWILIO_API: &str = "https://api.twilio.com";
    /// Deepgram Flux duplex listen endpoint (v2 API).
    pub const RECOGNIZER_WS: &str = "wss://api.deepgram.com/v2/listen";
    /// Groq's OpenAI-compatible completion API base.
    pub const LLM_API: &str = "https://api.groq.com/openai/v1";
    /// ElevenLabs WebSocket API base.
    pub const TTS_WS: &str = "wss://api.elevenlabs.io";
}

/// Model and voice defaults.
pub mod models {
    pub const RECOGNIZER_MODEL: &str = "flux-general-en";
    pub const LLM_MODEL: &str = "llama-3.3-70b-versatile";
    pub const TTS_MODEL: &str = "eleven_turbo_v2_5";
    pub const TTS_VOICE: &str = "21m00Tcm4TlvDq8ikWAM";
}

/// Runtime tuning defaults.
pub mod tuning {
    pub const PORT: u16 = 3040;
    pub const LLM_MAX_TOKENS: u32 = 500;
    pub const LLM_TEMPERATURE: f32 = 0.7;
    pub const TTS_POOL_SIZE: usize = 1;
    pub const TTS_POOL_TTL_SECS: f64 = 8.0;
}

/// Default system prompt. Responses are spoken, so the prompt steers the
/// model away from markdown and long enumerations.
pub const SYSTEM_PROMPT: &str = "You are a helpful voice assistant. Keep your responses \
concise and conversational, as they will be spoken aloud. Avoid using markdown, bullet \
points, or other formatting that doesn't work well in speech. Be friendly and natural.";
