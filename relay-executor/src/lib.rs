use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

mod error;
mod local_runtime;
mod queue;

pub use error::RuntimeError;
pub use local_runtime::LocalRuntime;
pub use queue::{ActionQueue, FAILED_REASON, UNAVAILABLE_REASON};

/// Callback trait for streaming process output
pub trait OutputSink: Send + Sync {
    fn on_output_chunk(&self, chunk: &str) -> Result<()>;
}

/// The sandboxed environment actions run against.
///
/// Callers must await [`RuntimeAdapter::ready`] before using the other
/// methods; the execution queue does this before every dispatch.
#[async_trait]
pub trait RuntimeAdapter: Send + Sync {
    /// Resolves once the runtime can accept work.
    async fn ready(&self) -> Result<()>;

    /// Run a command line, streaming output to `output` as it is produced,
    /// and return its exit code. Cancelling `cancel` must kill the process.
    async fn spawn(
        &self,
        command: &str,
        cancel: CancellationToken,
        output: Option<&dyn OutputSink>,
    ) -> Result<i32>;

    /// Write `content` to `path`, creating parent directories as needed.
    async fn write_file(&self, path: &str, content: &str) -> Result<()>;
}
