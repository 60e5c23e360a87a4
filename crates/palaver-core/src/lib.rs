//! palaver-core: Pure types, history log, and text processing.
//!
//! No async runtime, no network, no platform dependencies.

pub mod assets;
pub mod history;
pub mod text_prep;
pub mod types;
