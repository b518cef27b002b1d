//! Query execution and message streaming
//!
//! [`AgentSession::query`] reserves the session for one turn, submits the
//! prompt and returns a [`TurnReceiver`] over that turn's messages. The
//! receiver ends after the turn's `Result` message, which is always last.

use crate::error::{AgentError, Result};
use crate::session::core::AgentSession;
use agentwire_protocol::control::user_turn_frame;
use agentwire_protocol::{Message, ResultMessage};
use futures::Stream;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

impl AgentSession {
    /// Submit `prompt` as a new turn
    ///
    /// `session` targets a specific session id. If it differs from the live
    /// one the agent is relaunched on that id first (forked when the options
    /// ask for it).
    ///
    /// # Errors
    ///
    /// - `InvalidState` when not connected, closed, or a turn is in flight
    /// - `BudgetExceeded` when a session ceiling was reached
    /// - `Launch` / `Transport` when the agent could not be reached; the
    ///   session is closed afterwards
    pub async fn query(self: &Arc<Self>, prompt: &str, session: Option<&str>) -> Result<TurnReceiver> {
        let (tx, rx) = mpsc::unbounded_channel();
        let switch_to = {
            let mut state = self.shared.state();
            state.begin_turn(tx, &self.options)?;
            session
                .filter(|id| state.info.needs_switch(id))
                .map(String::from)
        };
        let timeout = self.settings.turn_timeout(&self.options);
        let deadline = Instant::now() + timeout;

        if let Err(e) = self.submit(prompt, switch_to.as_deref()).await {
            tracing::warn!(error = %e, "failed to submit turn");
            let abandoned = self.shared.state().finish_turn();
            drop(abandoned);
            if e.is_session_fatal() {
                self.close().await?;
            }
            return Err(e);
        }

        Ok(TurnReceiver {
            rx,
            engine: Arc::clone(self),
            deadline,
            timeout,
            finished: false,
        })
    }

    async fn submit(&self, prompt: &str, switch_to: Option<&str>) -> Result<()> {
        let transport = {
            let mut connection = self.connection.lock().await;
            if let Some(target) = switch_to {
                self.switch_session(&mut connection, target).await?;
            }
            connection
                .as_ref()
                .map(|c| Arc::clone(&c.transport))
                .ok_or(AgentError::NotConnected)?
        };

        let session_id = self.shared.info().session_id;
        transport
            .write_frame(&user_turn_frame(prompt, session_id.as_deref()))
            .await
            .map_err(|e| AgentError::Transport(format!("failed to submit prompt: {e}")))?;
        tracing::debug!(session_id = ?session_id, "prompt submitted");
        Ok(())
    }
}

/// The messages of one turn, in emission order
///
/// Dropping the receiver does not cancel the turn; call
/// [`AgentSession::interrupt`] for that.
pub struct TurnReceiver {
    rx: mpsc::UnboundedReceiver<Message>,
    engine: Arc<AgentSession>,
    deadline: Instant,
    timeout: Duration,
    finished: bool,
}

impl std::fmt::Debug for TurnReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnReceiver")
            .field("timeout", &self.timeout)
            .field("finished", &self.finished)
            .finish()
    }
}

impl TurnReceiver {
    /// Next message of the turn; `None` after the result
    ///
    /// When the turn outlives its timeout the agent is interrupted and a
    /// `Timeout` error is yielded in place of the result.
    pub async fn next(&mut self) -> Option<Result<Message>> {
        if self.finished {
            return None;
        }

        match tokio::time::timeout_at(self.deadline, self.rx.recv()).await {
            Ok(Some(message)) => {
                self.finished = message.is_result();
                Some(Ok(message))
            }
            Ok(None) => {
                self.finished = true;
                Some(Err(AgentError::Transport(
                    "turn ended without a result".into(),
                )))
            }
            Err(_) => {
                self.finished = true;
                tracing::warn!(timeout = ?self.timeout, "turn timed out; interrupting");
                if let Err(e) = self.engine.interrupt().await {
                    tracing::warn!(error = %e, "failed to interrupt timed out turn");
                }
                Some(Err(AgentError::Timeout(self.timeout)))
            }
        }
    }

    /// Whether the result (or an error) was already yielded
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Drain the turn, returning every message
    pub async fn collect(mut self) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        while let Some(message) = self.next().await {
            messages.push(message?);
        }
        Ok(messages)
    }

    /// Drain the turn, returning only its result
    pub async fn result(mut self) -> Result<ResultMessage> {
        while let Some(message) = self.next().await {
            if let Message::Result(result) = message? {
                return Ok(result);
            }
        }
        Err(AgentError::Transport("turn ended without a result".into()))
    }

    /// Adapt into a [`Stream`]
    pub fn into_stream(self) -> impl Stream<Item = Result<Message>> + Send {
        futures::stream::unfold(self, |mut turn| async move {
            turn.next().await.map(|item| (item, turn))
        })
    }
}
