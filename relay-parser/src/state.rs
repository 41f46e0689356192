//! Per-stream parser state.

use relay_api::{ActionRecord, ElementRecord};

/// Current nesting position of a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Mode {
    /// Outside any element; text is visible.
    #[default]
    Scanning,
    /// Inside an element, between operations.
    InsideElement(ElementRecord),
    /// Inside an operation of an element. The record's content stays empty
    /// until the close tag arrives.
    InsideOperation(ElementRecord, ActionRecord),
}

/// Resumable scan state for one stream.
#[derive(Debug, Clone, Default)]
pub struct StreamState {
    /// Byte offset into the cumulative input; everything before it is resolved.
    pub cursor: usize,
    pub mode: Mode,
    /// Number of operations opened so far, used for action ids.
    pub sequence: u64,
}

impl StreamState {
    pub fn current_element(&self) -> Option<&ElementRecord> {
        match &self.mode {
            Mode::Scanning => None,
            Mode::InsideElement(element) | Mode::InsideOperation(element, _) => Some(element),
        }
    }

    pub fn current_action(&self) -> Option<&ActionRecord> {
        match &self.mode {
            Mode::InsideOperation(_, action) => Some(action),
            _ => None,
        }
    }

    /// Allocate the next action id for `stream_id`.
    pub(crate) fn next_action_id(&mut self, stream_id: &str) -> String {
        let id = format!("{}-{}", stream_id, self.sequence);
        self.sequence += 1;
        id
    }
}
