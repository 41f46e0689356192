//! LocalRuntime - runs actions in a directory on the host.
//!
//! Commands run through `sh -c` with the sandbox root as working directory,
//! each in its own process group so cancellation reaches background jobs
//! too. File paths are resolved against the root and may not leave it.

use anyhow::Result;
use async_trait::async_trait;
use path_clean::PathClean;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{OnceCell, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{OutputSink, RuntimeAdapter, RuntimeError};

/// How long output may keep arriving after the shell exits. Background jobs
/// can hold the pipes open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Runtime backed by a host directory and the system shell.
pub struct LocalRuntime {
    root: PathBuf,
    shell: String,
    ready: OnceCell<()>,
}

impl LocalRuntime {
    /// Create a runtime rooted at `root`. The directory is created on first use.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            shell: "sh".to_string(),
            ready: OnceCell::new(),
        }
    }

    /// Use a different shell binary. It is invoked as `<shell> -c <command>`.
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a file action path inside the root.
    ///
    /// Absolute paths are taken relative to the root. `..` is resolved
    /// lexically and must not climb out of the root.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, RuntimeError> {
        let relative: PathBuf = Path::new(path.trim())
            .components()
            .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
            .collect();
        if relative.as_os_str().is_empty() {
            return Err(RuntimeError::EmptyPath);
        }

        let root = self.root.clean();
        let target = root.join(relative).clean();
        if target == root || !target.starts_with(&root) {
            return Err(RuntimeError::PathEscapesRoot(path.to_string()));
        }
        Ok(target)
    }
}

#[async_trait]
impl RuntimeAdapter for LocalRuntime {
    async fn ready(&self) -> Result<()> {
        self.ready
            .get_or_try_init(|| async {
                tokio::fs::create_dir_all(&self.root)
                    .await
                    .map_err(|source| RuntimeError::Root {
                        path: self.root.clone(),
                        source,
                    })
            })
            .await?;
        Ok(())
    }

    async fn spawn(
        &self,
        command: &str,
        cancel: CancellationToken,
        output: Option<&dyn OutputSink>,
    ) -> Result<i32> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        own_process_group(&mut cmd);

        let mut child = cmd.spawn().map_err(|source| RuntimeError::Spawn {
            command: command.to_string(),
            source,
        })?;
        tracing::debug!("Spawned `{}` (pid {:?})", command, child.id());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(forward_output(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(forward_output(stderr, tx.clone()));
        }
        drop(tx);

        let status = loop {
            tokio::select! {
                Some(chunk) = rx.recv() => {
                    if let Some(sink) = output {
                        sink.on_output_chunk(&chunk)?;
                    }
                }
                status = child.wait() => break status?,
                _ = cancel.cancelled() => {
                    tracing::debug!("Killing `{}` after cancellation", command);
                    kill_tree(&mut child).await;
                    readers.iter().for_each(JoinHandle::abort);
                    return Err(RuntimeError::Cancelled.into());
                }
            }
        };

        // Output still buffered after exit, bounded in time.
        let deadline = tokio::time::sleep(DRAIN_GRACE);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                chunk = rx.recv() => match chunk {
                    Some(chunk) => {
                        if let Some(sink) = output {
                            sink.on_output_chunk(&chunk)?;
                        }
                    }
                    None => break,
                },
                _ = &mut deadline => {
                    tracing::debug!("`{}` left background output open; detaching", command);
                    break;
                }
                _ = cancel.cancelled() => break,
            }
        }
        readers.iter().for_each(JoinHandle::abort);

        Ok(status.code().unwrap_or(-1))
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(RuntimeError::Io)?;
        }
        tokio::fs::write(&target, content).await.map_err(RuntimeError::Io)?;
        tracing::debug!("Wrote {} bytes to {}", content.len(), target.display());
        Ok(())
    }
}

#[cfg(unix)]
fn own_process_group(cmd: &mut Command) {
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_cmd: &mut Command) {}

/// SIGKILL the process group led by `pid`.
#[cfg(unix)]
fn kill_group(pid: u32) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        tracing::debug!("Failed to kill process group {}: {}", pid, e);
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}

/// Kill the child's whole process group, then the child itself.
async fn kill_tree(child: &mut Child) {
    if let Some(pid) = child.id() {
        kill_group(pid);
    }
    if let Err(e) = child.kill().await {
        tracing::debug!("Child already gone: {}", e);
    }
}

/// Pump a child pipe into the output channel until EOF.
fn forward_output<R>(mut reader: R, tx: mpsc::UnboundedSender<String>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buffer = [0u8; 4096];
        loop {
            match reader.read(&mut buffer).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let chunk = String::from_utf8_lossy(&buffer[..n]).into_owned();
                    if tx.send(chunk).is_err() {
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Collect(Mutex<String>);

    impl OutputSink for Collect {
        fn on_output_chunk(&self, chunk: &str) -> Result<()> {
            self.0.lock().unwrap().push_str(chunk);
            Ok(())
        }
    }

    #[test]
    fn test_resolve_relative() {
        let runtime = LocalRuntime::new("/sandbox");
        assert_eq!(runtime.resolve("src/main.rs").unwrap(), PathBuf::from("/sandbox/src/main.rs"));
        assert_eq!(runtime.resolve("./a/../b.txt").unwrap(), PathBuf::from("/sandbox/b.txt"));
    }

    #[test]
    fn test_resolve_absolute_is_rooted() {
        let runtime = LocalRuntime::new("/sandbox");
        assert_eq!(runtime.resolve("/etc/passwd").unwrap(), PathBuf::from("/sandbox/etc/passwd"));
    }

    #[test]
    fn test_resolve_rejects_escape() {
        let runtime = LocalRuntime::new("/sandbox");
        assert!(matches!(
            runtime.resolve("../outside.txt"),
            Err(RuntimeError::PathEscapesRoot(_))
        ));
        assert!(matches!(
            runtime.resolve("a/../../outside.txt"),
            Err(RuntimeError::PathEscapesRoot(_))
        ));
        assert!(matches!(runtime.resolve("."), Err(RuntimeError::PathEscapesRoot(_))));
        assert!(matches!(runtime.resolve("  "), Err(RuntimeError::EmptyPath)));
    }

    #[tokio::test]
    async fn test_ready_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested/root");
        let runtime = LocalRuntime::new(&root);

        runtime.ready().await.unwrap();
        runtime.ready().await.unwrap();
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn test_write_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = LocalRuntime::new(dir.path());
        runtime.ready().await.unwrap();

        runtime.write_file("src/deep/lib.rs", "pub fn x() {}\n").await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("src/deep/lib.rs")).unwrap();
        assert_eq!(written, "pub fn x() {}\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_streams_output_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = LocalRuntime::new(dir.path());
        runtime.ready().await.unwrap();
        let sink = Collect::default();

        let code = runtime
            .spawn("echo hello; echo oops 1>&2; exit 3", CancellationToken::new(), Some(&sink))
            .await
            .unwrap();

        assert_eq!(code, 3);
        let output = sink.0.lock().unwrap().clone();
        assert!(output.contains("hello"));
        assert!(output.contains("oops"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_runs_in_root() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = LocalRuntime::new(dir.path());
        runtime.ready().await.unwrap();

        runtime
            .spawn("echo data > made-by-shell.txt", CancellationToken::new(), None)
            .await
            .unwrap();

        assert!(dir.path().join("made-by-shell.txt").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_cancellation_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = LocalRuntime::new(dir.path());
        runtime.ready().await.unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let result = runtime.spawn("sleep 10", cancel, None).await;

        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_returns_when_background_job_holds_pipes() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = LocalRuntime::new(dir.path());
        runtime.ready().await.unwrap();
        let sink = Collect::default();

        let started = std::time::Instant::now();
        let code = tokio::time::timeout(
            Duration::from_secs(3),
            runtime.spawn("sleep 8 & echo started", CancellationToken::new(), Some(&sink)),
        )
        .await
        .expect("spawn should not wait for background jobs")
        .unwrap();

        assert_eq!(code, 0);
        assert!(sink.0.lock().unwrap().contains("started"));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_with_background_job_returns_promptly() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = LocalRuntime::new(dir.path());
        runtime.ready().await.unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(3),
            runtime.spawn("sleep 8 & echo started; wait", cancel, None),
        )
        .await
        .expect("cancelled spawn should return");
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_kills_background_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = LocalRuntime::new(dir.path());
        runtime.ready().await.unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let result = runtime
            .spawn("(sleep 0.6; touch late.txt) & wait", cancel, None)
            .await;
        assert!(result.is_err());

        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert!(!dir.path().join("late.txt").exists());
    }
}
