//! ActionQueue - serialized execution of the actions of one element.
//!
//! Actions are registered as the parser closes them and run strictly in
//! the order they are activated. A single worker task owns the execution
//! side; callers only touch the shared entry table, so registering,
//! activating and cancelling never wait on a running action.

use indexmap::IndexMap;
use relay_api::{ActionEvent, ActionRecord, ActionStatus, Operation};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::{OutputSink, RuntimeAdapter};

/// Status reason for an action whose dispatch returned an error.
pub const FAILED_REASON: &str = "action failed";

/// Status reason for an action whose runtime never became ready.
pub const UNAVAILABLE_REASON: &str = "runtime unavailable";

/// One registered action.
struct Entry {
    record: ActionRecord,
    status: ActionStatus,
    cancel: CancellationToken,
    activated: bool,
}

struct Shared {
    entries: Mutex<IndexMap<String, Entry>>,
    events: broadcast::Sender<ActionEvent>,
    /// Activated actions the worker has not finished with yet.
    outstanding: watch::Sender<usize>,
    runtime: Arc<dyn RuntimeAdapter>,
}

/// Serializes the actions of one element against a runtime.
///
/// Dropping the queue does not cancel anything: actions already activated
/// still run, then the worker exits.
pub struct ActionQueue {
    shared: Arc<Shared>,
    tx: mpsc::UnboundedSender<String>,
}

impl ActionQueue {
    /// Create a queue and spawn its worker on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(runtime: Arc<dyn RuntimeAdapter>) -> Self {
        let (events, _) = broadcast::channel(256);
        let (outstanding, _) = watch::channel(0);
        let shared = Arc::new(Shared {
            entries: Mutex::new(IndexMap::new()),
            events,
            outstanding,
            runtime,
        });

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(shared.clone(), rx));

        Self { shared, tx }
    }

    /// Register an action. Returns `false` if the id is already known, in
    /// which case nothing changes.
    pub fn register(&self, record: ActionRecord) -> bool {
        let mut entries = self.shared.entries();
        if let Some(existing) = entries.get(&record.action_id) {
            if existing.record != record {
                tracing::warn!(
                    action_id = %record.action_id,
                    "Duplicate registration with different content ignored"
                );
            }
            return false;
        }

        let action_id = record.action_id.clone();
        tracing::debug!(action_id = %action_id, kind = record.operation.kind(), "Registered action");
        entries.insert(
            action_id.clone(),
            Entry {
                record,
                status: ActionStatus::Pending,
                cancel: CancellationToken::new(),
                activated: false,
            },
        );
        self.shared.emit_status(&action_id, ActionStatus::Pending);
        true
    }

    /// Schedule a registered action to run after every action activated
    /// before it. Each action is scheduled at most once; returns whether
    /// this call scheduled it.
    pub fn activate(&self, action_id: &str) -> bool {
        let mut entries = self.shared.entries();
        let Some(entry) = entries.get_mut(action_id) else {
            tracing::warn!(action_id, "Cannot activate unknown action");
            return false;
        };
        if entry.activated {
            return false;
        }
        entry.activated = true;

        if entry.status != ActionStatus::Pending {
            tracing::debug!(action_id, status = %entry.status, "Not scheduling finished action");
            return false;
        }

        // Sent under the entry lock so the channel order is the activation order.
        self.shared.outstanding.send_modify(|n| *n += 1);
        if self.tx.send(action_id.to_string()).is_err() {
            self.shared.outstanding.send_modify(|n| *n -= 1);
            tracing::error!(action_id, "Execution worker is gone; action not scheduled");
            return false;
        }
        true
    }

    /// Cancel an action.
    ///
    /// A pending action is aborted without ever reaching the runtime. A
    /// running action has its token cancelled and becomes aborted once the
    /// runtime observes it. Finished actions are left alone.
    pub fn cancel(&self, action_id: &str) -> bool {
        let mut entries = self.shared.entries();
        let Some(entry) = entries.get_mut(action_id) else {
            tracing::warn!(action_id, "Cannot cancel unknown action");
            return false;
        };

        match entry.status {
            ActionStatus::Pending => {
                entry.cancel.cancel();
                entry.status = ActionStatus::Aborted;
                self.shared.emit_status(action_id, ActionStatus::Aborted);
                true
            }
            ActionStatus::Running => {
                tracing::debug!(action_id, "Signalling running action");
                entry.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn status(&self, action_id: &str) -> Option<ActionStatus> {
        self.shared.entries().get(action_id).map(|e| e.status.clone())
    }

    /// Every action's status, in registration order.
    pub fn statuses(&self) -> IndexMap<String, ActionStatus> {
        self.shared
            .entries()
            .iter()
            .map(|(id, entry)| (id.clone(), entry.status.clone()))
            .collect()
    }

    pub fn record(&self, action_id: &str) -> Option<ActionRecord> {
        self.shared.entries().get(action_id).map(|e| e.record.clone())
    }

    pub fn len(&self) -> usize {
        self.shared.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.entries().is_empty()
    }

    /// Subscribe to status changes and process output.
    pub fn subscribe(&self) -> broadcast::Receiver<ActionEvent> {
        self.shared.events.subscribe()
    }

    /// Wait until every activated action has finished.
    pub async fn wait_idle(&self) {
        let mut outstanding = self.shared.outstanding.subscribe();
        // The sender lives in `shared`, which we hold, so this cannot fail.
        let _ = outstanding.wait_for(|n| *n == 0).await;
    }
}

impl Shared {
    fn entries(&self) -> MutexGuard<'_, IndexMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit_status(&self, action_id: &str, status: ActionStatus) {
        let _ = self.events.send(ActionEvent::StatusChanged {
            action_id: action_id.to_string(),
            status,
        });
    }

    /// Move a pending action to running. Returns what the dispatch needs,
    /// or `None` if the action was aborted or removed meanwhile.
    fn begin(&self, action_id: &str) -> Option<(Operation, CancellationToken)> {
        let mut entries = self.entries();
        let entry = entries.get_mut(action_id)?;
        if entry.status != ActionStatus::Pending {
            tracing::debug!(action_id, status = %entry.status, "Skipping action");
            return None;
        }
        entry.status = ActionStatus::Running;
        self.emit_status(action_id, ActionStatus::Running);
        Some((entry.record.operation.clone(), entry.cancel.clone()))
    }

    /// Settle an action whose dispatch task died without reporting back.
    fn abandon(&self, action_id: &str) {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(action_id) else {
            return;
        };
        if entry.status.is_terminal() {
            return;
        }
        let status = if entry.cancel.is_cancelled() {
            ActionStatus::Aborted
        } else {
            ActionStatus::Failed(FAILED_REASON.to_string())
        };
        entry.status = status.clone();
        self.emit_status(action_id, status);
    }

    fn finish(&self, action_id: &str, status: ActionStatus) {
        let mut entries = self.entries();
        if let Some(entry) = entries.get_mut(action_id) {
            entry.status = status.clone();
        }
        self.emit_status(action_id, status);
    }

    async fn execute(&self, action_id: &str) {
        let Some((operation, cancel)) = self.begin(action_id) else {
            return;
        };

        if let Err(e) = self.runtime.ready().await {
            tracing::error!(action_id, "Runtime not ready: {:#}", e);
            self.finish(action_id, ActionStatus::Failed(UNAVAILABLE_REASON.to_string()));
            return;
        }

        let result = match &operation {
            Operation::Shell { command } => {
                let sink = EventSink {
                    action_id,
                    events: &self.events,
                };
                self.runtime
                    .spawn(command, cancel.clone(), Some(&sink))
                    .await
                    .map(|exit_code| {
                        if exit_code != 0 {
                            tracing::warn!(action_id, exit_code, "Shell action exited with non-zero status");
                        }
                    })
            }
            Operation::FileWrite { path, content } => {
                if cancel.is_cancelled() {
                    Ok(())
                } else {
                    self.runtime.write_file(path, content).await
                }
            }
            Operation::Unknown { kind, .. } => {
                tracing::debug!(action_id, kind = %kind, "No dispatch for unrecognized action");
                Ok(())
            }
        };

        let status = match result {
            _ if cancel.is_cancelled() => ActionStatus::Aborted,
            Ok(()) => ActionStatus::Complete,
            Err(e) => {
                tracing::error!(action_id, kind = operation.kind(), "Action failed: {:#}", e);
                ActionStatus::Failed(FAILED_REASON.to_string())
            }
        };
        tracing::debug!(action_id, status = %status, "Action finished");
        self.finish(action_id, status);
    }
}

async fn run_worker(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(action_id) = rx.recv().await {
        // Each dispatch runs in its own task so a panicking runtime fails one
        // action instead of stopping the worker.
        let dispatch = tokio::spawn({
            let shared = shared.clone();
            let action_id = action_id.clone();
            async move { shared.execute(&action_id).await }
        });
        if let Err(e) = dispatch.await {
            tracing::error!(action_id = %action_id, "Action dispatch died: {}", e);
            shared.abandon(&action_id);
        }
        shared.outstanding.send_modify(|n| *n = n.saturating_sub(1));
    }
    tracing::trace!("Action queue worker exiting");
}

/// Forwards process output to queue subscribers.
struct EventSink<'a> {
    action_id: &'a str,
    events: &'a broadcast::Sender<ActionEvent>,
}

impl OutputSink for EventSink<'_> {
    fn on_output_chunk(&self, chunk: &str) -> anyhow::Result<()> {
        let _ = self.events.send(ActionEvent::Output {
            action_id: self.action_id.to_string(),
            chunk: chunk.to_string(),
        });
        Ok(())
    }
}
