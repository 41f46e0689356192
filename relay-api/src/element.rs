//! Element records - the top-level structural region of a stream.

use serde::{Deserialize, Serialize};

/// Default tag name for the top-level structural element.
pub const DEFAULT_ELEMENT_TAG: &str = "relayArtifact";

/// Default tag name for operations nested inside an element.
pub const DEFAULT_OPERATION_TAG: &str = "relayAction";

/// An element opened by the parser.
///
/// `id` and `title` come from the opening tag. Both are expected but not
/// required; a missing attribute is recorded as an empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRecord {
    pub stream_id: String,
    pub id: String,
    pub title: String,
}

impl ElementRecord {
    pub fn new(stream_id: impl Into<String>, id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            id: id.into(),
            title: title.into(),
        }
    }
}

/// The tag vocabulary recognized in a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagNames {
    /// Name of the enclosing element tag, e.g. `relayArtifact`.
    pub element: String,
    /// Name of the operation tag, e.g. `relayAction`.
    pub operation: String,
}

impl TagNames {
    pub fn new(element: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            operation: operation.into(),
        }
    }

    /// `<element` without the closing `>`.
    pub fn element_open(&self) -> String {
        format!("<{}", self.element)
    }

    pub fn element_close(&self) -> String {
        format!("</{}>", self.element)
    }

    /// `<operation` without the closing `>`.
    pub fn operation_open(&self) -> String {
        format!("<{}", self.operation)
    }

    pub fn operation_close(&self) -> String {
        format!("</{}>", self.operation)
    }
}

impl Default for TagNames {
    fn default() -> Self {
        Self::new(DEFAULT_ELEMENT_TAG, DEFAULT_OPERATION_TAG)
    }
}
