use anyhow::{Result, bail};
use relay_api::{ActionEvent, ActionStatus};
use relay_executor::{LocalRuntime, RuntimeAdapter};
use relay_runner::{DryRunRuntime, RunnerConfig, Workbench, WorkbenchEvent, prefix_ends};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Options for `relay run`, already merged with the config file.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: RunnerConfig,
    pub stream_id: String,
    pub dry_run: bool,
}

pub async fn run(transcript: &str, options: RunOptions) -> Result<()> {
    let RunOptions {
        config,
        stream_id,
        dry_run,
    } = options;

    let runtime: Arc<dyn RuntimeAdapter> = if dry_run {
        Arc::new(DryRunRuntime::new())
    } else {
        tracing::info!("Running actions in {}", config.workdir.display());
        Arc::new(LocalRuntime::new(&config.workdir).with_shell(&config.shell))
    };
    let workbench = Arc::new(Workbench::new(runtime, config.tags.clone()));

    let reporter = tokio::spawn(report_events(workbench.subscribe()));
    let interrupt = {
        let workbench = workbench.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let cancelled = workbench.cancel_all();
                tracing::warn!(cancelled, "Interrupted, cancelling outstanding actions");
            }
        })
    };

    let mut stdout = std::io::stdout();
    for end in prefix_ends(transcript, config.chunk_size) {
        let visible = workbench.push(&stream_id, &transcript[..end]);
        if !visible.is_empty() {
            stdout.write_all(visible.as_bytes())?;
            stdout.flush()?;
        }
        if config.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(config.delay_ms)).await;
        }
    }
    writeln!(stdout)?;

    workbench.wait_idle().await;
    interrupt.abort();

    let elements = workbench.elements();
    let mut failed = 0;
    for element in &elements {
        if !element.closed {
            tracing::warn!(element_id = %element.record.id, "Element was never closed");
        }
        for (action_id, status) in &element.statuses {
            eprintln!("{:<12} {:<10} {}", element.record.id, status.to_string(), action_id);
            if matches!(status, ActionStatus::Failed(_)) {
                failed += 1;
            }
        }
    }

    // Dropping the workbench closes the queues, which ends the reporter.
    drop(workbench);
    let _ = tokio::time::timeout(Duration::from_secs(1), reporter).await;

    if failed > 0 {
        bail!("{} action(s) failed", failed);
    }
    Ok(())
}

async fn report_events(mut events: broadcast::Receiver<WorkbenchEvent>) {
    let mut stderr = std::io::stderr();
    loop {
        match events.recv().await {
            Ok(WorkbenchEvent::ElementOpened(element)) => {
                tracing::debug!(element_id = %element.id, "Artifact started");
            }
            Ok(WorkbenchEvent::ElementClosed(element)) => {
                tracing::debug!(element_id = %element.id, "Artifact finished streaming");
            }
            Ok(WorkbenchEvent::Action(ActionEvent::StatusChanged { action_id, status })) => {
                tracing::info!(action_id = %action_id, "Action {}", status);
            }
            Ok(WorkbenchEvent::Action(ActionEvent::Output { chunk, .. })) => {
                let _ = stderr.write_all(chunk.as_bytes());
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Dropped events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
