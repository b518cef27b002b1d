//! CLI transport implementation
//!
//! Manages bidirectional communication with the agent process: one JSON
//! frame per line on stdin, one per line on stdout.

use crate::error::{Result, TransportError};
use crate::traits::Transport;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub use super::process::{ProcessConfig, ProcessHandle};
use super::process::terminate;

/// Subprocess transport for the agent CLI
///
/// Reads and writes use separate locks, so a reader task parked on stdout
/// never blocks a control response going out on stdin.
pub struct CliTransport {
    config: ProcessConfig,
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<BufWriter<ChildStdin>>>,
    stdout: Mutex<Option<BufReader<ChildStdout>>>,
    stderr_task: Mutex<Option<JoinHandle<()>>>,
    ready: AtomicBool,
}

impl CliTransport {
    /// Create an unstarted transport
    pub fn new(config: ProcessConfig) -> Self {
        Self {
            config,
            child: Mutex::new(None),
            stdin: Mutex::new(None),
            stdout: Mutex::new(None),
            stderr_task: Mutex::new(None),
            ready: AtomicBool::new(false),
        }
    }

    /// Create and start a transport
    pub async fn spawn(config: ProcessConfig) -> Result<Self> {
        let transport = Self::new(config);
        transport.start().await?;
        Ok(transport)
    }

    /// Get process configuration
    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// Check whether the process is still running
    pub async fn is_alive(&self) -> bool {
        let mut child = self.child.lock().await;
        match child.as_mut() {
            Some(child) => child.try_wait().ok().flatten().is_none(),
            None => false,
        }
    }
}

#[async_trait]
impl Transport for CliTransport {
    async fn start(&self) -> Result<()> {
        if self.ready.load(Ordering::SeqCst) {
            return Ok(());
        }

        let handle = ProcessHandle::spawn(&self.config)?;
        *self.child.lock().await = Some(handle.child);
        *self.stdin.lock().await = Some(handle.stdin);
        *self.stdout.lock().await = Some(handle.stdout);
        *self.stderr_task.lock().await = handle.stderr_task;
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn write_frame(&self, frame: &Value) -> Result<()> {
        let mut line = serde_json::to_string(frame)?;
        line.push('\n');

        let mut stdin = self.stdin.lock().await;
        let writer = stdin.as_mut().ok_or(TransportError::NotConnected)?;

        let written = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        }
        .await;

        written.map_err(|e| {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                self.ready.store(false, Ordering::SeqCst);
                TransportError::Connection("agent process closed stdin".to_string())
            } else {
                TransportError::Io(e)
            }
        })
    }

    async fn read_frame(&self) -> Result<Option<String>> {
        let mut stdout = self.stdout.lock().await;
        let reader = stdout.as_mut().ok_or(TransportError::NotConnected)?;

        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                self.ready.store(false, Ordering::SeqCst);
                return Ok(None);
            }
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok(Some(trimmed.to_string()));
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.ready.store(false, Ordering::SeqCst);

        // Closing stdin is the agent's cue to finish up.
        if let Some(mut writer) = self.stdin.lock().await.take() {
            let _ = writer.flush().await;
            let _ = writer.shutdown().await;
        }

        let child = self.child.lock().await.take();
        let result = match child {
            Some(mut child) => terminate(&mut child, self.config.close_timeout).await,
            None => Ok(()),
        };

        if let Some(task) = self.stderr_task.lock().await.take() {
            task.abort();
        }
        // The reader task may still hold this lock until it observes EOF.
        if let Ok(mut stdout) = self.stdout.try_lock() {
            stdout.take();
        }

        result
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}
