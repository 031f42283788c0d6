//! HTTP and WebSocket server for dialtone
//!
//! The control surface is deliberately small: a health check, the connection
//! markup the telephony provider fetches when a call is answered, the
//! media-stream WebSocket that carries the call itself, an outbound-call
//! trigger, the latest trace document, and Prometheus metrics.

pub mod http;
pub mod metrics;
pub mod state;
pub mod ws;

pub use http::create_router;
pub use metrics::init_metrics;
pub use state::AppState;
