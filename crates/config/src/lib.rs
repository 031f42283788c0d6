//! Configuration for dialtone
//!
//! Settings come from the environment (optionally overlaid on a local
//! `config/dialtone.*` file). Every external service has its own section;
//! credentials are validated up front so a misconfigured deployment fails at
//! startup instead of mid-call.

pub mod constants;
mod error;
mod settings;

pub use error::ConfigError;
pub use settings::{
    load_settings, LlmSettings, RecognizerSettings, ServerSettings, Settings, TelephonySettings,
    TraceSettings, TtsSettings,
};
