//! Relay API - Shared types for the streaming artifact pipeline.
//!
//! The parser produces these records, the executor consumes them, and
//! observers (UI, logs, transcripts) receive them through events.

mod action;
mod element;
mod event;

pub use action::*;
pub use element::*;
pub use event::*;
