//! Action records - operations extracted from a stream and their lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single operation extracted from an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    /// Run a command line in the sandbox shell.
    Shell { command: String },
    /// Write `content` to `path`, relative to the sandbox root.
    FileWrite { path: String, content: String },
    /// An operation whose `type` attribute is not recognized.
    /// Parsed and closed like any other, dispatched as a no-op.
    Unknown {
        /// The raw `type` attribute, serialized as `type`.
        #[serde(rename = "type")]
        kind: String,
        content: String,
    },
}

impl Operation {
    pub const SHELL: &'static str = "shell";
    pub const FILE: &'static str = "file";

    /// Build an empty operation from the `type` attribute of its opening tag.
    pub fn from_kind(kind: &str, path: Option<String>) -> Self {
        match kind {
            Self::SHELL => Operation::Shell { command: String::new() },
            Self::FILE => Operation::FileWrite {
                path: path.unwrap_or_default(),
                content: String::new(),
            },
            other => Operation::Unknown {
                kind: other.to_string(),
                content: String::new(),
            },
        }
    }

    /// The `type` attribute this operation was parsed from.
    pub fn kind(&self) -> &str {
        match self {
            Operation::Shell { .. } => Self::SHELL,
            Operation::FileWrite { .. } => Self::FILE,
            Operation::Unknown { kind, .. } => kind,
        }
    }

    /// The accumulated body of the operation.
    pub fn content(&self) -> &str {
        match self {
            Operation::Shell { command } => command,
            Operation::FileWrite { content, .. } => content,
            Operation::Unknown { content, .. } => content,
        }
    }

    fn content_mut(&mut self) -> &mut String {
        match self {
            Operation::Shell { command } => command,
            Operation::FileWrite { content, .. } => content,
            Operation::Unknown { content, .. } => content,
        }
    }

    /// Append the final body slice and normalize it.
    ///
    /// Content is trimmed of surrounding whitespace; file writes then get
    /// exactly one trailing newline.
    pub fn finish(&mut self, body: &str) {
        let is_file = matches!(self, Operation::FileWrite { .. });
        let content = self.content_mut();
        content.push_str(body);
        let mut trimmed = content.trim().to_string();
        if is_file {
            trimmed.push('\n');
        }
        *content = trimmed;
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Operation::Unknown { .. })
    }
}

/// The unit handed from the parser to an execution queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Stream the action was parsed from.
    pub stream_id: String,
    /// `<stream id>-<sequence>`, stable for the life of the stream.
    pub action_id: String,
    /// Id of the element the action was declared in.
    pub element_id: String,
    pub operation: Operation,
}

impl ActionRecord {
    pub fn new(
        stream_id: impl Into<String>,
        action_id: impl Into<String>,
        element_id: impl Into<String>,
        operation: Operation,
    ) -> Self {
        Self {
            stream_id: stream_id.into(),
            action_id: action_id.into(),
            element_id: element_id.into(),
            operation,
        }
    }
}

/// Lifecycle of an action inside its execution queue.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ActionStatus {
    #[default]
    Pending,
    Running,
    Complete,
    Aborted,
    Failed(String),
}

impl ActionStatus {
    /// Complete, aborted and failed actions never change status again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionStatus::Complete | ActionStatus::Aborted | ActionStatus::Failed(_)
        )
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionStatus::Pending => write!(f, "pending"),
            ActionStatus::Running => write!(f, "running"),
            ActionStatus::Complete => write!(f, "complete"),
            ActionStatus::Aborted => write!(f, "aborted"),
            ActionStatus::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_kind() {
        assert_eq!(
            Operation::from_kind("shell", None),
            Operation::Shell { command: String::new() }
        );
        assert_eq!(
            Operation::from_kind("file", Some("src/main.rs".into())),
            Operation::FileWrite {
                path: "src/main.rs".into(),
                content: String::new()
            }
        );
        let unknown = Operation::from_kind("deploy", None);
        assert!(unknown.is_unknown());
        assert_eq!(unknown.kind(), "deploy");
    }

    #[test]
    fn test_finish_file_appends_single_newline() {
        let mut op = Operation::from_kind("file", Some("a.js".into()));
        op.finish("  let x = 1;  ");
        assert_eq!(op.content(), "let x = 1;\n");
    }

    #[test]
    fn test_finish_file_collapses_trailing_newlines() {
        let mut op = Operation::from_kind("file", Some("a.js".into()));
        op.finish("\nfoo\n\n\n");
        assert_eq!(op.content(), "foo\n");
    }

    #[test]
    fn test_finish_shell_trims_only() {
        let mut op = Operation::from_kind("shell", None);
        op.finish("\n  npm install  \n");
        assert_eq!(op.content(), "npm install");
    }

    #[test]
    fn test_status_terminal() {
        assert!(!ActionStatus::Pending.is_terminal());
        assert!(!ActionStatus::Running.is_terminal());
        assert!(ActionStatus::Complete.is_terminal());
        assert!(ActionStatus::Aborted.is_terminal());
        assert!(ActionStatus::Failed("x".into()).is_terminal());
    }

    #[test]
    fn test_operation_serializes_with_kind_tag() {
        let op = Operation::Shell { command: "ls".into() };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["kind"], "shell");
        assert_eq!(json["command"], "ls");
    }

    #[test]
    fn test_every_operation_round_trips_through_json() {
        let ops = vec![
            Operation::Shell { command: "npm install".into() },
            Operation::FileWrite {
                path: "src/index.js".into(),
                content: "console.log(1);\n".into(),
            },
            Operation::Unknown {
                kind: "deploy".into(),
                content: "prod".into(),
            },
        ];

        let json = serde_json::to_string(&ops).unwrap();
        let back: Vec<Operation> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ops);
    }

    #[test]
    fn test_unknown_operation_keeps_raw_type() {
        let op = Operation::Unknown {
            kind: "deploy".into(),
            content: "prod".into(),
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["kind"], "unknown");
        assert_eq!(json["type"], "deploy");
        assert_eq!(json["content"], "prod");
    }
}
