//! Subprocess agent invoker.
//!
//! The agent runs as `<program> <args..> <prompt>`. Standard output and
//! standard error are pumped by two reader tasks into one channel; the
//! invoker selects over that channel, the process exit and the deadline.
//! Every chunk is appended to a per-invocation log file as it arrives, so
//! the log survives a timeout kill.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{AgentError, AgentInvoker, InvocationOutput, Result};

/// Timestamp format used in log file names.
const LOG_TIMESTAMP: &str = "%Y%m%dT%H%M%S%.3fZ";

enum Chunk {
    Stdout(String),
    Stderr(String),
}

/// Runs the coding agent as a local command.
#[derive(Debug, Clone)]
pub struct CommandInvoker {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    log_dir: PathBuf,
}

impl CommandInvoker {
    /// Invoke `program`, writing logs to `log_dir`.
    pub fn new(program: impl Into<String>, log_dir: impl AsRef<Path>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            log_dir: log_dir.as_ref().to_path_buf(),
        }
    }

    /// Arguments placed before the prompt, e.g. a permission-bypass flag.
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Run the agent inside `dir`.
    pub fn with_working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    fn next_log_path(&self) -> PathBuf {
        self.log_dir
            .join(format!("agent-{}.log", Utc::now().format(LOG_TIMESTAMP)))
    }
}

#[async_trait]
impl AgentInvoker for CommandInvoker {
    async fn invoke(&self, prompt: &str, timeout: Duration) -> Result<InvocationOutput> {
        fs::create_dir_all(&self.log_dir).await?;
        let log_path = self.next_log_path();
        let mut log = fs::File::create(&log_path).await?;
        log.write_all(
            format!(
                "# {} {}\n# started {}\n# prompt: {} chars, timeout {}s\n\n",
                self.program,
                self.args.join(" "),
                Utc::now().to_rfc3339(),
                prompt.len(),
                timeout.as_secs()
            )
            .as_bytes(),
        )
        .await?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|source| AgentError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        info!(program = %self.program, log = %log_path.display(), "Agent started");

        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump(stdout, Chunk::Stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump(stderr, Chunk::Stderr, tx.clone()));
        }
        drop(tx);

        let mut output = String::new();
        let mut error_output = String::new();
        let mut exit_status = None;
        let mut streams_open = true;

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        while streams_open || exit_status.is_none() {
            tokio::select! {
                chunk = rx.recv(), if streams_open => match chunk {
                    Some(Chunk::Stdout(text)) => {
                        log.write_all(text.as_bytes()).await?;
                        output.push_str(&text);
                    }
                    Some(Chunk::Stderr(text)) => {
                        log.write_all(format!("[stderr] {}", text).as_bytes()).await?;
                        error_output.push_str(&text);
                    }
                    None => streams_open = false,
                },
                status = child.wait(), if exit_status.is_none() => {
                    exit_status = Some(status?);
                }
                _ = &mut deadline => {
                    let elapsed_seconds = start.elapsed().as_secs_f64();
                    warn!(elapsed_seconds, log = %log_path.display(), "Agent timed out, killing");
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "Failed to kill agent process");
                    }
                    log.write_all(format!("\n# killed after {:.1}s: timeout\n", elapsed_seconds).as_bytes())
                        .await?;
                    log.flush().await?;

                    return Err(AgentError::Timeout {
                        elapsed_seconds,
                        log_path: log_path.clone(),
                        partial: Box::new(InvocationOutput {
                            output,
                            error_output,
                            exit_code: None,
                            duration_seconds: elapsed_seconds,
                            log_path: Some(log_path),
                        }),
                    });
                }
            }
        }

        let duration_seconds = start.elapsed().as_secs_f64();
        let exit_code = exit_status.and_then(|s| s.code());
        log.write_all(
            format!(
                "\n# exited with {} after {:.1}s\n",
                exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
                duration_seconds
            )
            .as_bytes(),
        )
        .await?;
        log.flush().await?;

        debug!(?exit_code, duration_seconds, stdout_bytes = output.len(), "Agent finished");

        Ok(InvocationOutput {
            output,
            error_output,
            exit_code,
            duration_seconds,
            log_path: Some(log_path),
        })
    }
}

/// Forward a stream line by line until EOF.
async fn pump<R>(reader: R, wrap: fn(String) -> Chunk, tx: mpsc::UnboundedSender<Chunk>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf).into_owned();
                if tx.send(wrap(text)).is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(error = %e, "Agent stream closed with error");
                break;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str, log_dir: &Path) -> CommandInvoker {
        // The prompt lands in $0 of the script.
        CommandInvoker::new("sh", log_dir).with_args(["-c", script])
    }

    #[tokio::test]
    async fn test_captures_both_streams_and_logs() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = sh("echo \"got $0\"; echo oops >&2; exit 3", dir.path());

        let out = invoker.invoke("the-prompt", Duration::from_secs(10)).await.unwrap();
        assert_eq!(out.output, "got the-prompt\n");
        assert_eq!(out.error_output, "oops\n");
        assert_eq!(out.exit_code, Some(3));

        let log = std::fs::read_to_string(out.log_path.unwrap()).unwrap();
        assert!(log.contains("got the-prompt"));
        assert!(log.contains("[stderr] oops"));
        assert!(log.contains("exited with 3"));
    }

    #[tokio::test]
    async fn test_timeout_kills_and_keeps_log() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = sh("echo started; exec sleep 30", dir.path());

        let err = invoker
            .invoke("p", Duration::from_millis(300))
            .await
            .unwrap_err();

        match err {
            AgentError::Timeout { log_path, elapsed_seconds, .. } => {
                assert!(elapsed_seconds < 10.0);
                let log = std::fs::read_to_string(log_path).unwrap();
                assert!(log.contains("timeout"));
            }
            other => panic!("expected timeout, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = CommandInvoker::new("definitely-not-a-real-agent-binary", dir.path());

        let err = invoker.invoke("p", Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, AgentError::Spawn { .. }));
    }
}
