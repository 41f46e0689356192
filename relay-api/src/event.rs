//! Events emitted by execution queues to subscribers (UI, logs, etc.)

use serde::{Deserialize, Serialize};

use crate::ActionStatus;

/// Events emitted while actions execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionEvent {
    /// An action moved to a new status.
    StatusChanged {
        action_id: String,
        status: ActionStatus,
    },

    /// A chunk of process output is available.
    Output {
        action_id: String,
        chunk: String,
    },
}

impl ActionEvent {
    pub fn action_id(&self) -> &str {
        match self {
            ActionEvent::StatusChanged { action_id, .. } => action_id,
            ActionEvent::Output { action_id, .. } => action_id,
        }
    }
}
