//! Main settings module
//!
//! Each field's default reads the canonical environment variable, so a plain
//! `load_settings()` with a populated environment is enough in production;
//! a `config/dialtone.{toml,yaml,json}` file can override any field for
//! local development.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::{endpoints, models, tuning, SYSTEM_PROMPT};
use crate::ConfigError;

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_string(name: &str) -> String {
    std::env::var(name).unwrap_or_default()
}

/// Top-level application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub telephony: TelephonySettings,
    #[serde(default)]
    pub recognizer: RecognizerSettings,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub tts: TtsSettings,
    #[serde(default)]
    pub trace: TraceSettings,
}

/// HTTP/WebSocket server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Listening port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public base URL the telephony provider can reach, e.g. an ngrok URL.
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

fn default_port() -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(tuning::PORT)
}

fn default_public_url() -> String {
    env_string("PUBLIC_URL")
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            public_url: default_public_url(),
        }
    }
}

/// Telephony provider (Twilio) credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelephonySettings {
    #[serde(default = "default_account_sid")]
    pub account_sid: String,
    #[serde(default = "default_auth_token")]
    pub auth_token: String,
    /// Caller id for outbound calls, E.164.
    #[serde(default = "default_from_number")]
    pub from_number: String,
    #[serde(default = "default_twilio_endpoint")]
    pub endpoint: String,
}

fn default_account_sid() -> String {
    env_string("TWILIO_ACCOUNT_SID")
}

fn default_auth_token() -> String {
    env_string("TWILIO_AUTH_TOKEN")
}

fn default_from_number() -> String {
    env_string("TWILIO_PHONE_NUMBER")
}

fn default_twilio_endpoint() -> String {
    env_or("TWILIO_API_URL", endpoints::TWILIO_API)
}

impl Default for TelephonySettings {
    fn default() -> Self {
        Self {
            account_sid: default_account_sid(),
            auth_token: default_auth_token(),
            from_number: default_from_number(),
            endpoint: default_twilio_endpoint(),
        }
    }
}

/// Streaming recognizer (Deepgram Flux) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizerSettings {
    #[serde(default = "default_recognizer_key")]
    pub api_key: String,
    #[serde(default = "default_recognizer_model")]
    pub model: String,
    #[serde(default = "default_recognizer_endpoint")]
    pub endpoint: String,
}

fn default_recognizer_key() -> String {
    env_string("DEEPGRAM_API_KEY")
}

fn default_recognizer_model() -> String {
    env_or("RECOGNIZER_MODEL", models::RECOGNIZER_MODEL)
}

fn default_recognizer_endpoint() -> String {
    env_or("RECOGNIZER_URL", endpoints::RECOGNIZER_WS)
}

impl Default for RecognizerSettings {
    fn default() -> Self {
        Self {
            api_key: default_recognizer_key(),
            model: default_recognizer_model(),
            endpoint: default_recognizer_endpoint(),
        }
    }
}

/// Streaming LLM settings (OpenAI-compatible API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_llm_key")]
    pub api_key: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_llm_key() -> String {
    env_string("GROQ_API_KEY")
}

fn default_llm_model() -> String {
    env_or("LLM_MODEL", models::LLM_MODEL)
}

fn default_llm_endpoint() -> String {
    env_or("LLM_API_URL", endpoints::LLM_API)
}

fn default_llm_max_tokens() -> u32 {
    tuning::LLM_MAX_TOKENS
}

fn default_llm_temperature() -> f32 {
    tuning::LLM_TEMPERATURE
}

fn default_system_prompt() -> String {
    env_or("SYSTEM_PROMPT", SYSTEM_PROMPT)
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: default_llm_key(),
            model: default_llm_model(),
            endpoint: default_llm_endpoint(),
            max_tokens: default_llm_max_tokens(),
            temperature: default_llm_temperature(),
            system_prompt: default_system_prompt(),
        }
    }
}

/// Streaming synthesizer (ElevenLabs) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsSettings {
    #[serde(default = "default_tts_key")]
    pub api_key: String,
    #[serde(default = "default_tts_voice")]
    pub voice_id: String,
    #[serde(default = "default_tts_model")]
    pub model_id: String,
    #[serde(default = "default_tts_endpoint")]
    pub endpoint: String,
    /// Warm sessions the pool keeps ready.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Seconds before an idle warm session is evicted.
    #[serde(default = "default_pool_ttl")]
    pub pool_ttl_secs: f64,
}

fn default_tts_key() -> String {
    env_string("ELEVENLABS_API_KEY")
}

fn default_tts_voice() -> String {
    env_or("ELEVENLABS_VOICE_ID", models::TTS_VOICE)
}

fn default_tts_model() -> String {
    env_or("ELEVENLABS_MODEL_ID", models::TTS_MODEL)
}

fn default_tts_endpoint() -> String {
    env_or("ELEVENLABS_WS_URL", endpoints::TTS_WS)
}

fn default_pool_size() -> usize {
    std::env::var("TTS_POOL_SIZE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(tuning::TTS_POOL_SIZE)
}

fn default_pool_ttl() -> f64 {
    std::env::var("TTS_POOL_TTL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(tuning::TTS_POOL_TTL_SECS)
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            api_key: default_tts_key(),
            voice_id: default_tts_voice(),
            model_id: default_tts_model(),
            endpoint: default_tts_endpoint(),
            pool_size: default_pool_size(),
            pool_ttl_secs: default_pool_ttl(),
        }
    }
}

/// Tracer output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceSettings {
    /// Directory trace documents are written to, one JSON file per call.
    #[serde(default = "default_trace_dir")]
    pub dir: String,
}

fn default_trace_dir() -> String {
    std::env::var("TRACE_DIR").unwrap_or_else(|_| {
        std::env::temp_dir()
            .join("dialtone")
            .to_string_lossy()
            .into_owned()
    })
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            dir: default_trace_dir(),
        }
    }
}

impl Settings {
    /// Check that every credential required to run a call is present.
    ///
    /// All missing names are reported together so an operator can fix the
    /// environment in one pass.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        let required = [
            ("TWILIO_ACCOUNT_SID", &self.telephony.account_sid),
            ("TWILIO_AUTH_TOKEN", &self.telephony.auth_token),
            ("TWILIO_PHONE_NUMBER", &self.telephony.from_number),
            ("PUBLIC_URL", &self.server.public_url),
            ("DEEPGRAM_API_KEY", &self.recognizer.api_key),
            ("GROQ_API_KEY", &self.llm.api_key),
            ("ELEVENLABS_API_KEY", &self.tts.api_key),
        ];
        for (name, value) in required {
            if value.is_empty() {
                missing.push(name.to_string());
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingCredentials(missing))
        }
    }
}

/// Load settings from an optional local file plus the environment.
pub fn load_settings() -> Result<Settings, ConfigError> {
    let settings = Config::builder()
        .add_source(File::with_name("config/dialtone").required(false))
        .add_source(Environment::default().separator("__"))
        .build()?
        .try_deserialize()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fully populated settings, independent of the test environment.
    fn complete() -> Settings {
        let mut settings = Settings::default();
        settings.server.public_url = "https://example.ngrok.app".into();
        settings.telephony.account_sid = "AC0".into();
        settings.telephony.auth_token = "tok".into();
        settings.telephony.from_number = "+15550001111".into();
        settings.recognizer.api_key = "dg".into();
        settings.llm.api_key = "gq".into();
        settings.tts.api_key = "el".into();
        settings
    }

    #[test]
    fn tuning_defaults_are_wired() {
        let settings = Settings::default();
        assert_eq!(settings.llm.max_tokens, 500);
        assert!((settings.llm.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn validate_reports_every_missing_credential() {
        let mut settings = complete();
        settings.telephony.account_sid.clear();
        settings.telephony.auth_token.clear();
        match settings.validate() {
            Err(ConfigError::MissingCredentials(names)) => {
                assert!(names.contains(&"TWILIO_ACCOUNT_SID".to_string()));
                assert!(names.contains(&"TWILIO_AUTH_TOKEN".to_string()));
                assert!(!names.contains(&"TWILIO_PHONE_NUMBER".to_string()));
            }
            other => panic!("expected missing credentials, got {other:?}"),
        }
    }

    #[test]
    fn validate_accepts_complete_settings() {
        assert!(complete().validate().is_ok());
    }
}
