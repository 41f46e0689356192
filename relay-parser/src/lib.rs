//! Relay Parser - incremental extraction of artifacts from streamed text.
//!
//! Model output arrives a few characters at a time. The parser is fed the
//! cumulative text of each stream on every call and returns only the newly
//! resolved visible text, firing callbacks as elements and actions open and
//! close:
//!
//! ```text
//! Here you go <relayArtifact id="todo" title="Todo app">
//!   <relayAction type="file" path="index.js">console.log(1)</relayAction>
//!   <relayAction type="shell">node index.js</relayAction>
//! </relayArtifact> Done.
//! ```
//!
//! - `matcher`: decides whether a `<` starts a structural tag
//! - `attrs`: reads `name="value"` attributes out of an opening tag
//! - `state`: per-stream cursor and nesting mode
//! - `parser`: the streaming parser and its callback seam

mod attrs;
mod matcher;
mod parser;
mod state;

pub use attrs::{Attributes, parse_attributes};
pub use matcher::{MatchOutcome, match_open_tag};
pub use parser::{ParserCallbacks, ParserOptions, PlaceholderFn, StreamParser};
pub use state::{Mode, StreamState};
