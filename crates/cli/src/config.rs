//! `autodev.toml` configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use autodev_execution::OrchestratorConfig;
use autodev_queue::{QueueConfig, WorkerConfig};
use serde::{Deserialize, Serialize};
use tokio::fs;

/// Errors raised while loading the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration:\n  - {}", .0.join("\n  - "))]
    Invalid(Vec<String>),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AutodevConfig {
    pub paths: PathsConfig,
    pub agent: AgentConfig,
    pub classifier: ClassifierConfig,
    pub orchestrator: OrchestratorSettings,
    pub queue: QueueSettings,
    pub notification: NotificationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub state_dir: PathBuf,
    pub task_file: PathBuf,
    pub prompts_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".autodev"),
            task_file: PathBuf::from("TASKS.md"),
            prompts_dir: PathBuf::from("prompts"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub command: String,
    pub args: Vec<String>,
    pub timeout_secs: u64,
    pub working_dir: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            args: vec!["--dangerously-skip-permissions".to_string(), "-p".to_string()],
            timeout_secs: 600,
            working_dir: None,
        }
    }
}

/// Empty lists mean the built-in `TASK_STATUS:` markers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub success_markers: Vec<String>,
    pub failure_markers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    pub max_retries: u32,
    pub retain_prompts: bool,
    pub output_excerpt_chars: usize,
    pub verification_timeout_secs: u64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retain_prompts: true,
            output_excerpt_chars: 2000,
            verification_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub lock_duration_secs: u64,
    pub max_job_attempts: u32,
    pub job_backoff_secs: u64,
    pub retry_delay_unit_secs: u64,
    pub scheduler_interval_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            lock_duration_secs: 1200,
            max_job_attempts: 3,
            job_backoff_secs: 30,
            retry_delay_unit_secs: 60,
            scheduler_interval_secs: 600,
            poll_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    /// Without a URL notifications go to the log.
    pub webhook_url: Option<String>,
    pub target: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            webhook_url: None,
            target: "autodev".to_string(),
        }
    }
}

impl AutodevConfig {
    /// Load from `path`, falling back to defaults when the file is absent.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = match fs::read_to_string(path).await {
            Ok(content) => toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Check values for consistency, reporting every problem at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.agent.command.trim().is_empty() {
            errors.push("agent.command must not be empty".to_string());
        }
        if self.agent.timeout_secs == 0 {
            errors.push("agent.timeout_secs must be greater than 0".to_string());
        }
        let cycle_secs = self.agent.timeout_secs + self.orchestrator.verification_timeout_secs;
        if self.queue.lock_duration_secs <= cycle_secs {
            errors.push(format!(
                "queue.lock_duration_secs ({}) must be greater than agent.timeout_secs plus \
                 orchestrator.verification_timeout_secs ({}), otherwise a healthy cycle is \
                 abandoned as stalled",
                self.queue.lock_duration_secs, cycle_secs
            ));
        }
        if self.orchestrator.max_retries == 0 {
            errors.push("orchestrator.max_retries must be greater than 0".to_string());
        }
        if self.orchestrator.verification_timeout_secs == 0 {
            errors.push("orchestrator.verification_timeout_secs must be greater than 0".to_string());
        }
        if self.queue.max_job_attempts == 0 {
            errors.push("queue.max_job_attempts must be greater than 0".to_string());
        }
        for (name, value) in [
            ("queue.job_backoff_secs", self.queue.job_backoff_secs),
            ("queue.retry_delay_unit_secs", self.queue.retry_delay_unit_secs),
            ("queue.scheduler_interval_secs", self.queue.scheduler_interval_secs),
            ("queue.poll_interval_ms", self.queue.poll_interval_ms),
        ] {
            if value == 0 {
                errors.push(format!("{} must be greater than 0", name));
            }
        }
        if self.notification.enabled
            && self
                .notification
                .webhook_url
                .as_deref()
                .is_some_and(|url| !url.starts_with("http://") && !url.starts_with("https://"))
        {
            errors.push("notification.webhook_url must be an http(s) URL".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            agent_timeout: Duration::from_secs(self.agent.timeout_secs),
            max_retries: self.orchestrator.max_retries,
            retain_prompts: self.orchestrator.retain_prompts,
            output_excerpt_chars: self.orchestrator.output_excerpt_chars,
            verification_timeout: Duration::from_secs(self.orchestrator.verification_timeout_secs),
        }
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            lock_duration: Duration::from_secs(self.queue.lock_duration_secs),
            max_attempts: self.queue.max_job_attempts,
            backoff_base: Duration::from_secs(self.queue.job_backoff_secs),
            retry_delay_unit: Duration::from_secs(self.queue.retry_delay_unit_secs),
            ..Default::default()
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            scheduler_interval: Duration::from_secs(self.queue.scheduler_interval_secs),
            poll_interval: Duration::from_millis(self.queue.poll_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: AutodevConfig = toml::from_str(
            r#"
            [agent]
            command = "my-agent"

            [queue]
            poll_interval_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.agent.command, "my-agent");
        assert_eq!(config.agent.args, vec!["--dangerously-skip-permissions", "-p"]);
        assert_eq!(config.agent.timeout_secs, 600);
        assert_eq!(config.queue.poll_interval_ms, 250);
        assert_eq!(config.queue.lock_duration_secs, 1200);
        assert_eq!(config.paths.state_dir, PathBuf::from(".autodev"));
        config.validate().unwrap();
    }

    #[test]
    fn test_lock_must_outlast_agent_timeout() {
        let mut config = AutodevConfig::default();
        config.agent.timeout_secs = 900;
        config.orchestrator.verification_timeout_secs = 300;
        config.queue.poll_interval_ms = 0;

        match config.validate() {
            Err(ConfigError::Invalid(errors)) => {
                assert_eq!(errors.len(), 2);
                assert!(errors[0].contains("lock_duration_secs"));
                assert!(errors[1].contains("poll_interval_ms"));
            }
            other => panic!("expected validation errors, got {other:?}"),
        }
    }

    #[test]
    fn test_derived_runtime_configs() {
        let config = AutodevConfig::default();
        assert_eq!(config.orchestrator_config().agent_timeout, Duration::from_secs(600));
        assert_eq!(config.queue_config().retry_delay_unit, Duration::from_secs(60));
        assert_eq!(config.worker_config().scheduler_interval, Duration::from_secs(600));
    }

    #[tokio::test]
    async fn test_missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AutodevConfig::load(&dir.path().join("autodev.toml")).await.unwrap();
        assert_eq!(config.orchestrator.max_retries, 3);

        std::fs::write(dir.path().join("bad.toml"), "[agent\n").unwrap();
        assert!(matches!(
            AutodevConfig::load(&dir.path().join("bad.toml")).await,
            Err(ConfigError::Parse { .. })
        ));
    }
}
