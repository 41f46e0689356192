use anyhow::Result;
use async_trait::async_trait;
use relay_executor::{OutputSink, RuntimeAdapter};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Runtime that records what would have run without touching the system.
#[derive(Debug, Default)]
pub struct DryRunRuntime {
    log: Mutex<Vec<String>>,
}

impl DryRunRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// One line per dispatch, in execution order.
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn record(&self, line: String) {
        tracing::info!("{}", line);
        self.log.lock().unwrap_or_else(|p| p.into_inner()).push(line);
    }
}

#[async_trait]
impl RuntimeAdapter for DryRunRuntime {
    async fn ready(&self) -> Result<()> {
        Ok(())
    }

    async fn spawn(
        &self,
        command: &str,
        _cancel: CancellationToken,
        _output: Option<&dyn OutputSink>,
    ) -> Result<i32> {
        self.record(format!("$ {command}"));
        Ok(0)
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        self.record(format!("write {path} ({} bytes)", content.len()));
        Ok(())
    }
}
