//! Blocking client
//!
//! [`ClaudeSyncClient`] drives the session engine on a private worker
//! runtime. Each call blocks the calling thread; the reader task keeps
//! decoding frames and answering hook callbacks on the workers in between.
//!
//! The client is `Sync`: one thread may iterate a turn while another calls
//! [`ClaudeSyncClient::interrupt`], or holds an [`InterruptHandle`].

use crate::error::{AgentError, Result};
use crate::hooks::HookLogEntry;
use crate::session::{AgentSession, TurnReceiver};
use agentwire_protocol::{Message, PermissionMode, ResultMessage};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::{Handle, Runtime};

const WORKER_THREADS: usize = 2;

/// Owns the worker runtime; shuts it down without blocking on drop
struct Worker(Option<Runtime>);

impl Worker {
    fn start() -> Result<Self> {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(WORKER_THREADS)
            .thread_name("agentwire-worker")
            .enable_all()
            .build()
            .map(|runtime| Self(Some(runtime)))
            .map_err(|e| AgentError::Launch(format!("failed to start worker runtime: {e}")))
    }

    fn block_on<F: Future>(&self, future: F) -> Result<F::Output> {
        if Handle::try_current().is_ok() {
            return Err(AgentError::InvalidState(
                "blocking client used from inside an async runtime; use ClaudeAsyncClient".into(),
            ));
        }
        match &self.0 {
            Some(runtime) => Ok(runtime.block_on(future)),
            None => Err(AgentError::InvalidState("client runtime is shut down".into())),
        }
    }

    fn handle(&self) -> Option<Handle> {
        self.0.as_ref().map(|runtime| runtime.handle().clone())
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

/// Blocking client over one session
pub struct ClaudeSyncClient {
    engine: Arc<AgentSession>,
    pending: Mutex<Option<TurnReceiver>>,
    worker: Worker,
}

impl std::fmt::Debug for ClaudeSyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeSyncClient")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl ClaudeSyncClient {
    pub(crate) fn new(engine: Arc<AgentSession>) -> Result<Self> {
        Ok(Self {
            engine,
            pending: Mutex::new(None),
            worker: Worker::start()?,
        })
    }

    fn set_pending(&self, turn: Option<TurnReceiver>) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = turn;
    }

    fn take_pending(&self) -> Result<TurnReceiver> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| AgentError::InvalidState("no turn is waiting to be received".into()))
    }

    /// Launch the agent, optionally submitting a first prompt
    ///
    /// The turn's messages are read with [`receive_response`](Self::receive_response).
    /// Without a prompt and with a resume target configured the client
    /// attaches to that session without running a turn.
    pub fn connect(&self, prompt: Option<&str>) -> Result<()> {
        let engine = Arc::clone(&self.engine);
        let turn = self.worker.block_on(async move { engine.connect(prompt).await })??;
        self.set_pending(turn);
        Ok(())
    }

    /// Connect with `prompt` and block until its text answer
    pub fn connect_text(&self, prompt: &str) -> Result<String> {
        self.connect(Some(prompt))?;
        self.receive_response()?.text()
    }

    /// Connect with `prompt` and iterate the first turn
    pub fn connect_and_receive(&self, prompt: &str) -> Result<MessageIter<'_>> {
        self.connect(Some(prompt))?;
        self.receive_response()
    }

    /// Submit a new turn on the live session
    pub fn query(&self, prompt: &str) -> Result<()> {
        self.submit(prompt, None)
    }

    /// Submit a new turn on `session_id`, relaunching the agent if it is not
    /// the live session
    pub fn query_with_session(&self, prompt: &str, session_id: &str) -> Result<()> {
        self.submit(prompt, Some(session_id))
    }

    fn submit(&self, prompt: &str, session_id: Option<&str>) -> Result<()> {
        let engine = Arc::clone(&self.engine);
        let turn = self
            .worker
            .block_on(async move { engine.query(prompt, session_id).await })??;
        self.set_pending(Some(turn));
        Ok(())
    }

    /// Submit `prompt` and block until its text answer
    pub fn query_text(&self, prompt: &str) -> Result<String> {
        self.query(prompt)?;
        self.receive_response()?.text()
    }

    /// Iterate the messages of the last submitted turn
    ///
    /// # Errors
    ///
    /// `InvalidState` when no submitted turn is waiting to be received.
    pub fn receive_response(&self) -> Result<MessageIter<'_>> {
        let turn = self.take_pending()?;
        Ok(MessageIter {
            client: self,
            turn,
            result: None,
            failed: false,
        })
    }

    /// Submit `prompt` and iterate its messages
    pub fn messages(&self, prompt: &str) -> Result<MessageIter<'_>> {
        self.query(prompt)?;
        self.receive_response()
    }

    /// Ask the agent to abandon the turn in flight
    pub fn interrupt(&self) -> Result<()> {
        let engine = Arc::clone(&self.engine);
        self.worker.block_on(async move { engine.interrupt().await })?
    }

    /// A handle other threads can use to interrupt this client's turns
    pub fn interrupt_handle(&self) -> Result<InterruptHandle> {
        let runtime = self
            .worker
            .handle()
            .ok_or_else(|| AgentError::InvalidState("client runtime is shut down".into()))?;
        Ok(InterruptHandle {
            engine: Arc::clone(&self.engine),
            runtime,
        })
    }

    /// Switch model for later turns
    pub fn set_model(&self, model: Option<&str>) -> Result<()> {
        let engine = Arc::clone(&self.engine);
        self.worker
            .block_on(async move { engine.set_model(model).await })?
    }

    /// Switch permission mode for later tool calls
    pub fn set_permission_mode(&self, mode: PermissionMode) -> Result<()> {
        let engine = Arc::clone(&self.engine);
        self.worker
            .block_on(async move { engine.set_permission_mode(mode).await })?
    }

    /// The underlying engine
    pub fn session(&self) -> &Arc<AgentSession> {
        &self.engine
    }

    /// The retained hook dispatches, oldest first
    pub fn hook_log(&self) -> Vec<HookLogEntry> {
        self.engine.hook_log()
    }

    /// Remove and return the retained hook dispatches
    pub fn take_hook_log(&self) -> Vec<HookLogEntry> {
        self.engine.take_hook_log()
    }

    /// Close the session and stop the agent process
    pub fn close(&self) -> Result<()> {
        self.set_pending(None);
        let engine = Arc::clone(&self.engine);
        self.worker.block_on(async move { engine.close().await })?
    }
}

impl Drop for ClaudeSyncClient {
    fn drop(&mut self) {
        if Handle::try_current().is_ok() {
            tracing::debug!("sync client dropped inside a runtime; skipping graceful close");
            return;
        }
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "failed to close session on drop");
        }
    }
}

/// Interrupts a [`ClaudeSyncClient`]'s turns from another thread
#[derive(Clone)]
pub struct InterruptHandle {
    engine: Arc<AgentSession>,
    runtime: Handle,
}

impl std::fmt::Debug for InterruptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptHandle").finish_non_exhaustive()
    }
}

impl InterruptHandle {
    /// Ask the agent to abandon the turn in flight
    ///
    /// Must be called from outside any async runtime.
    pub fn interrupt(&self) -> Result<()> {
        if Handle::try_current().is_ok() {
            return Err(AgentError::InvalidState(
                "interrupt handle used from inside an async runtime".into(),
            ));
        }
        self.runtime.block_on(self.engine.interrupt())
    }
}

/// Forward-only iterator over one turn's messages
///
/// Yields each message as it arrives, ending after the result. A timeout or
/// transport failure is yielded once as an error and ends the iteration.
pub struct MessageIter<'a> {
    client: &'a ClaudeSyncClient,
    turn: TurnReceiver,
    result: Option<ResultMessage>,
    failed: bool,
}

impl std::fmt::Debug for MessageIter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageIter")
            .field("turn", &self.turn)
            .field("result", &self.result)
            .finish()
    }
}

impl MessageIter<'_> {
    /// The turn's result, once it has been yielded
    pub fn result(&self) -> Option<&ResultMessage> {
        self.result.as_ref()
    }

    /// Drain the turn, returning the concatenated assistant text
    pub fn text(self) -> Result<String> {
        let messages = self.collect::<Result<Vec<_>>>()?;
        Ok(super::assistant_text(&messages))
    }
}

impl Iterator for MessageIter<'_> {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.turn.is_finished() {
            return None;
        }
        let item = match self.client.worker.block_on(self.turn.next()) {
            Ok(item) => item,
            Err(e) => {
                self.failed = true;
                return Some(Err(e));
            }
        };
        if let Some(Ok(Message::Result(result))) = &item {
            self.result = Some(result.clone());
        }
        item
    }
}
