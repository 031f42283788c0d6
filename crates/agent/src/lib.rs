//! Per-call orchestration for dialtone
//!
//! `call::run_call` is the explicit loop that drives one call:
//!
//! ```text
//! while connected {
//!     event = queue.recv()                       // I/O
//!     (state, actions) = transition(state, event) // pure
//!     for action in actions { dispatch(action) }  // I/O
//! }
//! ```
//!
//! `agent::Agent` is the per-turn response pipeline (LLM → TTS → player)
//! dispatched by the loop, and `tracer::Tracer` records per-turn latency
//! spans for offline inspection.

pub mod agent;
pub mod call;
pub mod tracer;

pub use agent::Agent;
pub use call::{run_call, CallReport, CallServices, CallTuning};
pub use tracer::Tracer;
