//! Streaming tag parser.
//!
//! The caller passes the whole text produced so far for a stream on every
//! call. Only fully resolved regions move the stream's cursor forward; a tag
//! that is still arriving leaves the cursor where the tag starts, and the
//! next call re-examines it against the longer input.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use relay_api::{ActionRecord, ElementRecord, Operation, TagNames};

use crate::attrs::{Attributes, parse_attributes};
use crate::matcher::{MatchOutcome, match_open_tag};
use crate::state::{Mode, StreamState};

/// Observer for structural events. Every method defaults to a no-op.
pub trait ParserCallbacks: Send + Sync {
    /// A returned string replaces the element's opening tag in the visible
    /// text; `None` falls back to the configured placeholder.
    fn on_element_open(&self, _element: &ElementRecord) -> Option<String> {
        None
    }

    fn on_element_close(&self, _element: &ElementRecord) {}

    /// The operation's content is still empty at this point.
    fn on_action_open(&self, _action: &ActionRecord) {}

    /// Receives the finished record by value; the parser keeps no copy.
    fn on_action_close(&self, _action: ActionRecord) {}
}

/// Produces the text substituted for an element's opening tag, given the stream id.
pub type PlaceholderFn = dyn Fn(&str) -> String + Send + Sync;

/// Construction options for [`StreamParser`].
#[derive(Clone, Default)]
pub struct ParserOptions {
    pub tags: TagNames,
    pub callbacks: Option<Arc<dyn ParserCallbacks>>,
    /// Defaults to the empty string.
    pub placeholder: Option<Arc<PlaceholderFn>>,
}

impl ParserOptions {
    pub fn with_tags(mut self, tags: TagNames) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_callbacks(mut self, callbacks: Arc<dyn ParserCallbacks>) -> Self {
        self.callbacks = Some(callbacks);
        self
    }

    pub fn with_placeholder<F>(mut self, placeholder: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.placeholder = Some(Arc::new(placeholder));
        self
    }
}

impl fmt::Debug for ParserOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserOptions")
            .field("tags", &self.tags)
            .field("callbacks", &self.callbacks.is_some())
            .field("placeholder", &self.placeholder.is_some())
            .finish()
    }
}

/// Literal tag strings, built once per parser.
#[derive(Debug, Clone)]
struct TagSet {
    element_open: String,
    element_close: String,
    operation_open: String,
    operation_close: String,
}

impl From<&TagNames> for TagSet {
    fn from(tags: &TagNames) -> Self {
        Self {
            element_open: tags.element_open(),
            element_close: tags.element_close(),
            operation_open: tags.operation_open(),
            operation_close: tags.operation_close(),
        }
    }
}

/// Incremental parser holding one [`StreamState`] per stream id.
pub struct StreamParser {
    tags: TagSet,
    callbacks: Option<Arc<dyn ParserCallbacks>>,
    placeholder: Option<Arc<PlaceholderFn>>,
    streams: HashMap<String, StreamState>,
}

impl StreamParser {
    pub fn new(options: ParserOptions) -> Self {
        Self {
            tags: TagSet::from(&options.tags),
            callbacks: options.callbacks,
            placeholder: options.placeholder,
            streams: HashMap::new(),
        }
    }

    /// Advance `stream_id` over its cumulative text and return the visible
    /// text resolved by this call.
    ///
    /// `cumulative` must extend the text passed on the previous call for the
    /// same stream. Concatenating the returned strings of successive calls
    /// gives the same result as a single call with the final text.
    pub fn parse(&mut self, stream_id: &str, cumulative: &str) -> String {
        let state = self.streams.entry(stream_id.to_string()).or_default();

        if cumulative.len() < state.cursor {
            tracing::error!(
                stream_id,
                cursor = state.cursor,
                len = cumulative.len(),
                "cumulative text shrank; ignoring call"
            );
            return String::new();
        }

        let mut scan = Scan {
            tags: &self.tags,
            callbacks: self.callbacks.as_deref(),
            placeholder: self.placeholder.as_deref(),
            stream_id,
            input: cumulative,
            output: String::new(),
        };
        scan.run(state);
        scan.output
    }

    /// Drop the state of every stream.
    pub fn reset(&mut self) {
        self.streams.clear();
    }

    /// Drop the state of one stream. Returns whether it existed.
    pub fn forget(&mut self, stream_id: &str) -> bool {
        self.streams.remove(stream_id).is_some()
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn state(&self, stream_id: &str) -> Option<&StreamState> {
        self.streams.get(stream_id)
    }
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new(ParserOptions::default())
    }
}

/// One `parse` call over one stream.
struct Scan<'a> {
    tags: &'a TagSet,
    callbacks: Option<&'a dyn ParserCallbacks>,
    placeholder: Option<&'a PlaceholderFn>,
    stream_id: &'a str,
    input: &'a str,
    output: String,
}

/// Mode after a step, plus the new cursor or `None` to wait for more input.
type Step = (Mode, Option<usize>);

impl<'a> Scan<'a> {
    fn run(&mut self, state: &mut StreamState) {
        let mut i = state.cursor;

        while i < self.input.len() {
            let (mode, next) = match std::mem::take(&mut state.mode) {
                Mode::Scanning => self.scan_text(i),
                Mode::InsideElement(element) => self.scan_element(state, element, i),
                Mode::InsideOperation(element, action) => self.scan_operation(element, action, i),
            };
            state.mode = mode;

            match next {
                Some(next) => i = next,
                None => break,
            }
        }

        state.cursor = i;
    }

    fn scan_text(&mut self, i: usize) -> Step {
        let input = self.input;
        let rest = &input[i..];
        let lt = match rest.find('<') {
            Some(0) => i,
            Some(offset) => {
                self.output.push_str(&rest[..offset]);
                return (Mode::Scanning, Some(i + offset));
            }
            None => {
                self.output.push_str(rest);
                return (Mode::Scanning, Some(input.len()));
            }
        };

        // Closing tags never open anything.
        if input.as_bytes().get(lt + 1) == Some(&b'/') {
            self.output.push_str("</");
            return (Mode::Scanning, Some(lt + 2));
        }

        match match_open_tag(input, lt, &self.tags.element_open) {
            MatchOutcome::NeedMore => (Mode::Scanning, None),
            MatchOutcome::Diverged { at } => {
                self.output.push_str(&input[lt..at]);
                (Mode::Scanning, Some(at))
            }
            MatchOutcome::Matched => {
                let Some(gt) = self.find(lt + self.tags.element_open.len(), ">") else {
                    return (Mode::Scanning, None);
                };
                let element = self.open_element(&parse_attributes(&input[lt..=gt]));
                (Mode::InsideElement(element), Some(gt + 1))
            }
        }
    }

    fn scan_element(&mut self, state: &mut StreamState, element: ElementRecord, i: usize) -> Step {
        let action_at = self.find(i, &self.tags.operation_open);
        let close_at = self.find(i, &self.tags.element_close);

        match (action_at, close_at) {
            (Some(at), close) if close.map_or(true, |close| at < close) => {
                self.open_action(state, element, at)
            }
            (_, Some(close)) => {
                tracing::debug!(stream_id = self.stream_id, element_id = %element.id, "element closed");
                if let Some(callbacks) = self.callbacks {
                    callbacks.on_element_close(&element);
                }
                (Mode::Scanning, Some(close + self.tags.element_close.len()))
            }
            _ => (Mode::InsideElement(element), None),
        }
    }

    fn scan_operation(&mut self, element: ElementRecord, mut action: ActionRecord, i: usize) -> Step {
        let Some(close) = self.find(i, &self.tags.operation_close) else {
            return (Mode::InsideOperation(element, action), None);
        };

        action.operation.finish(&self.input[i..close]);
        tracing::debug!(
            stream_id = self.stream_id,
            action_id = %action.action_id,
            kind = action.operation.kind(),
            "action closed"
        );
        if let Some(callbacks) = self.callbacks {
            callbacks.on_action_close(action);
        }

        (Mode::InsideElement(element), Some(close + self.tags.operation_close.len()))
    }

    fn open_element(&mut self, attrs: &Attributes) -> ElementRecord {
        let id = self.attribute(attrs, "id", &self.tags.element_open);
        let title = self.attribute(attrs, "title", &self.tags.element_open);
        let element = ElementRecord::new(self.stream_id, id, title);
        tracing::debug!(stream_id = self.stream_id, element_id = %element.id, "element opened");

        let placeholder = self
            .callbacks
            .and_then(|callbacks| callbacks.on_element_open(&element))
            .or_else(|| self.placeholder.map(|f| f(self.stream_id)))
            .unwrap_or_default();
        self.output.push_str(&placeholder);

        element
    }

    fn open_action(&mut self, state: &mut StreamState, element: ElementRecord, at: usize) -> Step {
        let gt = match match_open_tag(self.input, at, &self.tags.operation_open) {
            MatchOutcome::NeedMore => return (Mode::InsideElement(element), None),
            // Lookalike tag: not an operation, and not visible inside an element.
            MatchOutcome::Diverged { at } => return (Mode::InsideElement(element), Some(at)),
            MatchOutcome::Matched => match self.find(at + self.tags.operation_open.len(), ">") {
                Some(gt) => gt,
                None => return (Mode::InsideElement(element), None),
            },
        };

        let input = self.input;
        let attrs = parse_attributes(&input[at..=gt]);
        let operation = self.operation(&attrs);
        let action = ActionRecord::new(
            self.stream_id,
            state.next_action_id(self.stream_id),
            element.id.clone(),
            operation,
        );
        tracing::debug!(
            stream_id = self.stream_id,
            action_id = %action.action_id,
            kind = action.operation.kind(),
            "action opened"
        );

        if let Some(callbacks) = self.callbacks {
            callbacks.on_action_open(&action);
        }

        (Mode::InsideOperation(element, action), Some(gt + 1))
    }

    fn operation(&self, attrs: &Attributes) -> Operation {
        let kind = self.attribute(attrs, "type", &self.tags.operation_open);
        let path = if kind == Operation::FILE {
            match attrs.get_any(&["path", "filePath"]) {
                Some(path) => Some(path.to_string()),
                None => {
                    tracing::warn!(stream_id = self.stream_id, "file action is missing a path attribute");
                    None
                }
            }
        } else {
            None
        };

        let operation = Operation::from_kind(&kind, path);
        if operation.is_unknown() {
            tracing::warn!(stream_id = self.stream_id, kind = %kind, "unrecognized action type");
        }
        operation
    }

    fn attribute(&self, attrs: &Attributes, name: &str, tag: &str) -> String {
        match attrs.get(name) {
            Some(value) => value.to_string(),
            None => {
                tracing::warn!(stream_id = self.stream_id, tag, attribute = name, "missing attribute");
                String::new()
            }
        }
    }

    fn find(&self, from: usize, needle: &str) -> Option<usize> {
        self.input[from..].find(needle).map(|offset| from + offset)
    }
}
