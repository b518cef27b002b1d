//! Process management for the agent subprocess

use crate::error::{Result, TransportError};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;

/// Default time allowed for the process to exit on close
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Tracing target for lines the agent writes to stderr
pub const STDERR_TARGET: &str = "agentwire::cli_stderr";

/// Configuration for spawning the agent process
#[derive(Clone, Debug)]
pub struct ProcessConfig {
    /// Path to the CLI executable
    pub cli_path: String,

    /// Arguments to pass to the CLI
    pub args: Vec<String>,

    /// Environment variables to set
    pub env: HashMap<String, String>,

    /// Inherit the parent environment before applying `env`
    pub inherit_env: bool,

    /// Working directory for the process
    pub working_dir: Option<PathBuf>,

    /// How long `close` waits for the process to exit before killing it
    pub close_timeout: Duration,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self::new("claude")
    }
}

impl ProcessConfig {
    /// Create a new process configuration
    pub fn new(cli_path: impl Into<String>) -> Self {
        Self {
            cli_path: cli_path.into(),
            args: Vec::new(),
            env: HashMap::new(),
            inherit_env: true,
            working_dir: None,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    /// Add an argument
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add several arguments
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Start from an empty environment instead of the parent's
    ///
    /// Only variables set with [`ProcessConfig::with_env`] reach the child.
    pub fn isolated_env(mut self) -> Self {
        self.inherit_env = false;
        self
    }

    /// Set the working directory
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the close grace period
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }
}

/// A freshly spawned agent process with its pipes split out
///
/// The pieces are handed to separate locks so that writes never wait on a
/// pending read.
pub struct ProcessHandle {
    /// The child process
    pub child: Child,
    /// Buffered stdin
    pub stdin: BufWriter<ChildStdin>,
    /// Buffered stdout
    pub stdout: BufReader<ChildStdout>,
    /// Task forwarding stderr lines to tracing
    pub stderr_task: Option<JoinHandle<()>>,
}

impl ProcessHandle {
    /// Spawn the agent process
    pub fn spawn(config: &ProcessConfig) -> Result<Self> {
        if let Some(dir) = &config.working_dir
            && !dir.is_dir()
        {
            return Err(TransportError::Launch(format!(
                "working directory does not exist: {}",
                dir.display()
            )));
        }

        let mut cmd = Command::new(&config.cli_path);
        cmd.args(&config.args);

        if !config.inherit_env {
            cmd.env_clear();
        }
        cmd.envs(&config.env);

        if let Some(dir) = &config.working_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(cli = %config.cli_path, args = ?config.args, "spawning agent process");

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => TransportError::Launch(format!(
                "CLI executable not found: {}",
                config.cli_path
            )),
            std::io::ErrorKind::PermissionDenied => TransportError::Launch(format!(
                "CLI executable not runnable: {}",
                config.cli_path
            )),
            _ => TransportError::Launch(format!("failed to spawn {}: {}", config.cli_path, e)),
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Process("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Process("Failed to get stdout".to_string()))?;

        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(target: STDERR_TARGET, "{}", line);
                }
            })
        });

        tracing::info!(pid = ?child.id(), "agent process started");

        Ok(Self {
            child,
            stdin: BufWriter::new(stdin),
            stdout: BufReader::new(stdout),
            stderr_task,
        })
    }
}

/// Ask the process to exit, then force it after `grace`
pub(crate) async fn terminate(child: &mut Child, grace: Duration) -> Result<()> {
    if let Ok(Some(status)) = child.try_wait() {
        tracing::debug!(%status, "agent process already exited");
        return Ok(());
    }

    send_sigterm(child);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            tracing::debug!(%status, "agent process exited");
            Ok(())
        }
        Ok(Err(e)) => Err(TransportError::Process(format!(
            "failed to reap agent process: {}",
            e
        ))),
        Err(_) => {
            tracing::warn!(grace_ms = grace.as_millis() as u64, "agent process did not exit, killing");
            child
                .kill()
                .await
                .map_err(|e| TransportError::Process(format!("Failed to kill process: {}", e)))
        }
    }
}

#[cfg(unix)]
fn send_sigterm(child: &Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
        tracing::debug!(error = %e, "SIGTERM failed");
    }
}

#[cfg(not(unix))]
fn send_sigterm(_child: &Child) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_config_default() {
        let config = ProcessConfig::default();
        assert_eq!(config.cli_path, "claude");
        assert!(config.args.is_empty());
        assert!(config.inherit_env);
        assert_eq!(config.close_timeout, DEFAULT_CLOSE_TIMEOUT);
    }

    #[test]
    fn test_process_config_builder() {
        let config = ProcessConfig::new("my-claude")
            .with_arg("--verbose")
            .with_args(["--model", "opus"])
            .with_env("API_KEY", "sk-123")
            .with_working_dir("/tmp")
            .with_close_timeout(Duration::from_secs(1))
            .isolated_env();

        assert_eq!(config.cli_path, "my-claude");
        assert_eq!(config.args, vec!["--verbose", "--model", "opus"]);
        assert_eq!(config.env.get("API_KEY"), Some(&"sk-123".to_string()));
        assert_eq!(config.working_dir, Some(PathBuf::from("/tmp")));
        assert_eq!(config.close_timeout, Duration::from_secs(1));
        assert!(!config.inherit_env);
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_is_launch_error() {
        let config = ProcessConfig::new("/nonexistent/agentwire-cli");
        let err = ProcessHandle::spawn(&config).err().unwrap();
        assert!(matches!(err, TransportError::Launch(_)));
    }

    #[tokio::test]
    async fn test_spawn_missing_working_dir_is_launch_error() {
        let config = ProcessConfig::new("cat").with_working_dir("/nonexistent/agentwire-dir");
        let err = ProcessHandle::spawn(&config).err().unwrap();
        assert!(matches!(err, TransportError::Launch(msg) if msg.contains("working directory")));
    }
}
