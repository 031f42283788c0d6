//! Shared server state

use std::sync::Arc;

use dialtone_config::Settings;

/// State handed to every handler. Settings are immutable for the process
/// lifetime; each call builds its own services from them.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }
}
