//! palaver-lib: Chat server engine.
//!
//! Ollama chat, placeholder image rendering, cloud and offline speech, the
//! static asset store, and the HTTP API. Depends on palaver-core for pure
//! types and text processing.

pub mod chat;
pub mod cloud_tts;
pub mod error;
pub mod offline_tts;
pub mod render;
pub mod server;
pub mod speech;
pub mod store;

// Re-export palaver-core for convenience
pub use palaver_core;
