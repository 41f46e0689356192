//! Workbench - wires the stream parser to one action queue per element.
//!
//! The parser's callbacks fire synchronously from [`Workbench::push`]; the
//! router behind them creates a queue for every element opened, in any
//! stream, and hands each closed action to the queue of the element open in
//! its stream, which registers and activates it immediately.

use indexmap::IndexMap;
use relay_api::{ActionEvent, ActionRecord, ActionStatus, ElementRecord, TagNames};
use relay_executor::{ActionQueue, RuntimeAdapter};
use relay_parser::{ParserCallbacks, ParserOptions, StreamParser};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

/// Events observed across every element of a workbench.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkbenchEvent {
    ElementOpened(ElementRecord),
    ElementClosed(ElementRecord),
    Action(ActionEvent),
}

/// Snapshot of one element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSummary {
    pub record: ElementRecord,
    pub closed: bool,
    pub statuses: IndexMap<String, ActionStatus>,
}

struct ElementEntry {
    record: ElementRecord,
    closed: bool,
    queue: Arc<ActionQueue>,
}

/// Every element opened so far, in open order.
#[derive(Default)]
struct ElementTable {
    entries: Vec<ElementEntry>,
    /// Index of the element currently open in each stream.
    open: HashMap<String, usize>,
}

/// Receives parser callbacks and owns the element table.
struct Router {
    runtime: Arc<dyn RuntimeAdapter>,
    elements: Mutex<ElementTable>,
    events: broadcast::Sender<WorkbenchEvent>,
}

impl Router {
    fn elements(&self) -> MutexGuard<'_, ElementTable> {
        self.elements.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Give `element` a fresh queue and make it the open element of its stream.
    fn open(&self, table: &mut ElementTable, element: ElementRecord) -> Arc<ActionQueue> {
        let queue = Arc::new(ActionQueue::new(self.runtime.clone()));
        self.forward_events(&queue);

        table.open.insert(element.stream_id.clone(), table.entries.len());
        table.entries.push(ElementEntry {
            record: element,
            closed: false,
            queue: queue.clone(),
        });
        queue
    }

    /// Queue of the element open in `action`'s stream. An action arriving
    /// with no open element gets one created for it.
    fn queue_for_action(&self, action: &ActionRecord) -> Arc<ActionQueue> {
        let mut table = self.elements();
        if let Some(&index) = table.open.get(&action.stream_id) {
            return table.entries[index].queue.clone();
        }

        tracing::warn!(
            stream_id = %action.stream_id,
            element_id = %action.element_id,
            "Action without an open element; creating its queue"
        );
        let element = ElementRecord::new(action.stream_id.clone(), action.element_id.clone(), "");
        self.open(&mut table, element)
    }

    /// Relay a queue's events to workbench subscribers until the queue is gone.
    fn forward_events(&self, queue: &ActionQueue) {
        let mut rx = queue.subscribe();
        let tx = self.events.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let _ = tx.send(WorkbenchEvent::Action(event));
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Workbench event subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

impl ParserCallbacks for Router {
    fn on_element_open(&self, element: &ElementRecord) -> Option<String> {
        tracing::info!(
            stream_id = %element.stream_id,
            element_id = %element.id,
            title = %element.title,
            "Element opened"
        );
        let mut table = self.elements();
        self.open(&mut table, element.clone());
        drop(table);

        let _ = self.events.send(WorkbenchEvent::ElementOpened(element.clone()));
        None
    }

    fn on_element_close(&self, element: &ElementRecord) {
        let mut table = self.elements();
        if let Some(index) = table.open.remove(&element.stream_id) {
            table.entries[index].closed = true;
        }
        drop(table);

        let _ = self.events.send(WorkbenchEvent::ElementClosed(element.clone()));
    }

    fn on_action_close(&self, action: ActionRecord) {
        let queue = self.queue_for_action(&action);
        let action_id = action.action_id.clone();
        if queue.register(action) {
            queue.activate(&action_id);
        }
    }
}

/// A streaming session: parser state plus the queues of every element seen.
///
/// [`Workbench::push`] creates queues, which spawn tasks, so it must be
/// called from within a tokio runtime.
pub struct Workbench {
    parser: Mutex<StreamParser>,
    router: Arc<Router>,
}

impl Workbench {
    pub fn new(runtime: Arc<dyn RuntimeAdapter>, tags: TagNames) -> Self {
        Self::with_options(runtime, ParserOptions::default().with_tags(tags))
    }

    /// Build from parser options. Any callbacks in `options` are replaced by
    /// the workbench's own router.
    pub fn with_options(runtime: Arc<dyn RuntimeAdapter>, options: ParserOptions) -> Self {
        let (events, _) = broadcast::channel(1024);
        let router = Arc::new(Router {
            runtime,
            elements: Mutex::new(ElementTable::default()),
            events,
        });
        let parser = StreamParser::new(options.with_callbacks(router.clone()));

        Self {
            parser: Mutex::new(parser),
            router,
        }
    }

    /// Feed the cumulative text of a stream; returns the newly visible text.
    pub fn push(&self, stream_id: &str, cumulative: &str) -> String {
        self.parser
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .parse(stream_id, cumulative)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkbenchEvent> {
        self.router.events.subscribe()
    }

    /// Queue of the most recent element opened with `element_id` in `stream_id`.
    pub fn queue(&self, stream_id: &str, element_id: &str) -> Option<Arc<ActionQueue>> {
        self.router
            .elements()
            .entries
            .iter()
            .rev()
            .find(|e| e.record.stream_id == stream_id && e.record.id == element_id)
            .map(|e| e.queue.clone())
    }

    /// Element snapshots in the order the elements opened.
    pub fn elements(&self) -> Vec<ElementSummary> {
        self.router
            .elements()
            .entries
            .iter()
            .map(|entry| ElementSummary {
                record: entry.record.clone(),
                closed: entry.closed,
                statuses: entry.queue.statuses(),
            })
            .collect()
    }

    pub fn status(&self, action_id: &str) -> Option<ActionStatus> {
        self.queues().iter().find_map(|queue| queue.status(action_id))
    }

    /// Cancel one action, whichever element it belongs to.
    pub fn cancel(&self, action_id: &str) -> bool {
        match self.queues().into_iter().find(|q| q.status(action_id).is_some()) {
            Some(queue) => queue.cancel(action_id),
            None => {
                tracing::warn!(action_id, "Cannot cancel unknown action");
                false
            }
        }
    }

    /// Cancel every action that has not finished yet. Returns how many
    /// were signalled.
    pub fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        for queue in self.queues() {
            for (action_id, status) in queue.statuses() {
                if !status.is_terminal() && queue.cancel(&action_id) {
                    cancelled += 1;
                }
            }
        }
        cancelled
    }

    /// Wait until every activated action in every element has finished.
    pub async fn wait_idle(&self) {
        for queue in self.queues() {
            queue.wait_idle().await;
        }
    }

    /// End the session: forget all stream state and elements.
    ///
    /// Actions already activated keep running; cancel them first if needed.
    pub fn reset(&self) {
        self.parser
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .reset();
        let mut table = self.router.elements();
        table.entries.clear();
        table.open.clear();
    }

    fn queues(&self) -> Vec<Arc<ActionQueue>> {
        self.router.elements().entries.iter().map(|e| e.queue.clone()).collect()
    }
}
