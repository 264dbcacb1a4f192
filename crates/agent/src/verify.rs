//! Post-success verification scripts.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

/// Longest output tail kept from a verification run.
const OUTPUT_TAIL_CHARS: usize = 1000;

/// Result of running a verification script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationOutcome {
    /// Script exited 0 within the timeout
    pub passed: bool,
    /// Exit code, `None` on timeout or signal
    pub exit_code: Option<i32>,
    /// Tail of combined stdout and stderr
    pub output: String,
}

impl VerificationOutcome {
    /// One-line failure summary.
    pub fn summary(&self) -> String {
        match (self.exit_code, self.output.trim()) {
            (Some(code), "") => format!("exit code {}", code),
            (Some(code), out) => format!("exit code {}: {}", code, out),
            (None, "") => "no exit code".to_string(),
            (None, out) => out.to_string(),
        }
    }
}

/// Runs a task's verification script through `sh -c`.
#[derive(Debug, Clone, Default)]
pub struct ScriptVerifier {
    working_dir: Option<PathBuf>,
}

impl ScriptVerifier {
    /// Verifier running in the current directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run scripts inside `dir`.
    pub fn with_working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Run `script`. Spawn failures and timeouts are reported as a failed
    /// outcome, not as an error.
    pub async fn verify(&self, script: &str, timeout: Duration) -> VerificationOutcome {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        debug!(script, "Running verification");
        match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));
                VerificationOutcome {
                    passed: output.status.success(),
                    exit_code: output.status.code(),
                    output: crate::excerpt(combined.trim(), OUTPUT_TAIL_CHARS),
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to start verification script");
                VerificationOutcome {
                    passed: false,
                    exit_code: None,
                    output: format!("failed to start: {}", e),
                }
            }
            Err(_) => VerificationOutcome {
                passed: false,
                exit_code: None,
                output: format!("timed out after {}s", timeout.as_secs_f64()),
            },
        }
    }
}
