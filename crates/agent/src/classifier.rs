//! Marker-based output classification.

use crate::{Classification, OutputClassifier};

/// Default line an agent prints when it finished the task.
pub const DEFAULT_SUCCESS_MARKER: &str = "TASK_STATUS: SUCCESS";

/// Default line an agent prints when it gave up.
pub const DEFAULT_FAILURE_MARKER: &str = "TASK_STATUS: FAILED";

/// Longest stderr tail quoted in a failure reason.
const STDERR_TAIL_CHARS: usize = 500;

/// Looks for explicit status markers in the agent's standard output.
///
/// The last marker line wins, so an agent that first fails and then fixes
/// the problem is classified by its final report. Without any marker the run
/// counts as a success only when it exited 0 and printed something.
#[derive(Debug, Clone)]
pub struct MarkerClassifier {
    success_markers: Vec<String>,
    failure_markers: Vec<String>,
}

impl Default for MarkerClassifier {
    fn default() -> Self {
        Self {
            success_markers: vec![DEFAULT_SUCCESS_MARKER.to_string()],
            failure_markers: vec![DEFAULT_FAILURE_MARKER.to_string()],
        }
    }
}

impl MarkerClassifier {
    /// Classifier with custom markers. Empty lists fall back to the defaults.
    pub fn new(success_markers: Vec<String>, failure_markers: Vec<String>) -> Self {
        let defaults = Self::default();
        Self {
            success_markers: if success_markers.is_empty() {
                defaults.success_markers
            } else {
                success_markers
            },
            failure_markers: if failure_markers.is_empty() {
                defaults.failure_markers
            } else {
                failure_markers
            },
        }
    }
}

impl OutputClassifier for MarkerClassifier {
    fn classify(&self, exit_code: Option<i32>, stdout: &str, stderr: &str) -> Classification {
        for line in stdout.lines().rev() {
            let line = line.trim();
            if let Some(marker) = self.failure_markers.iter().find(|m| line.contains(m.as_str())) {
                let reason = line
                    .split_once(marker.as_str())
                    .map(|(_, rest)| rest.trim_start_matches([':', ' ', '-']).trim())
                    .unwrap_or_default();
                return if reason.is_empty() {
                    Classification::failure(format!("agent reported failure: {}", line))
                } else {
                    Classification::failure(reason)
                };
            }
            if self.success_markers.iter().any(|m| line.contains(m.as_str())) {
                return Classification::success();
            }
        }

        match exit_code {
            Some(0) if !stdout.trim().is_empty() => Classification::success(),
            Some(0) => Classification::failure("agent produced no output"),
            Some(code) => {
                let tail = crate::excerpt(stderr.trim(), STDERR_TAIL_CHARS);
                if tail.is_empty() {
                    Classification::failure(format!("agent exited with code {}", code))
                } else {
                    Classification::failure(format!("agent exited with code {}: {}", code, tail))
                }
            }
            None => Classification::failure("agent was terminated by a signal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_zero_does_not_override_failure_marker() {
        let c = MarkerClassifier::default();
        let verdict = c.classify(Some(0), "did things\nTASK_STATUS: FAILED: tests still red\n", "");
        assert!(!verdict.success);
        assert_eq!(verdict.error.as_deref(), Some("tests still red"));
    }

    #[test]
    fn test_last_marker_wins() {
        let c = MarkerClassifier::default();
        let out = "TASK_STATUS: FAILED: first try\nfixed it\nTASK_STATUS: SUCCESS\n";
        assert!(c.classify(Some(0), out, "").success);

        let out = "TASK_STATUS: SUCCESS\nthen broke\nTASK_STATUS: FAILED\n";
        let verdict = c.classify(Some(0), out, "");
        assert!(!verdict.success);
        assert!(verdict.error.unwrap().contains("TASK_STATUS: FAILED"));
    }

    #[test]
    fn test_fallback_on_exit_code() {
        let c = MarkerClassifier::default();
        assert!(c.classify(Some(0), "all done", "").success);
        assert_eq!(
            c.classify(Some(0), "  \n", "").error.as_deref(),
            Some("agent produced no output")
        );
        assert_eq!(
            c.classify(Some(2), "", "boom\n").error.as_deref(),
            Some("agent exited with code 2: boom")
        );
        assert!(!c.classify(None, "partial", "").success);
    }

    #[test]
    fn test_custom_markers() {
        let c = MarkerClassifier::new(vec!["DONE".into()], vec!["GAVE UP".into()]);
        assert!(c.classify(Some(1), "DONE", "").success);
        assert_eq!(c.classify(Some(0), "GAVE UP - no disk", "").error.as_deref(), Some("no disk"));
    }
}
