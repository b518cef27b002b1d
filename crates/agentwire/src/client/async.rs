//! Non-blocking client
//!
//! [`ClaudeAsyncClient::connect`] and [`ClaudeAsyncClient::query`] return a
//! [`TurnSpec`]: nothing is sent until the spec is consumed as text, a text
//! stream, a message stream or a result. Awaiting one consumer to completion
//! marks the turn boundary, so turns compose by sequencing:
//!
//! ```no_run
//! use agentwire::ClaudeClient;
//!
//! # async fn run() -> agentwire::Result<()> {
//! let client = ClaudeClient::r#async().build()?;
//!
//! let first = client.connect("Remember the code ALPHA-123").text().await?;
//! let second = client.query("What was the code?").text().await?;
//! println!("{first}\n{second}");
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::hooks::HookLogEntry;
use crate::session::{AgentSession, TurnReceiver};
use agentwire_protocol::{Message, PermissionMode, ResultMessage};
use futures::{Stream, TryStreamExt};
use std::sync::Arc;

/// Non-blocking client over one session
///
/// Cheap to clone; clones share the session.
#[derive(Debug, Clone)]
pub struct ClaudeAsyncClient {
    engine: Arc<AgentSession>,
}

impl ClaudeAsyncClient {
    pub(crate) fn new(engine: Arc<AgentSession>) -> Self {
        Self { engine }
    }

    /// Launch the agent with a first prompt
    pub fn connect(&self, prompt: impl Into<String>) -> TurnSpec {
        TurnSpec {
            engine: Arc::clone(&self.engine),
            prompt: prompt.into(),
            submit: Submit::Connect,
        }
    }

    /// Launch the agent without running a turn
    ///
    /// With a resume target configured this attaches to that session.
    pub async fn connect_empty(&self) -> Result<()> {
        self.engine.connect(None).await.map(|_| ())
    }

    /// A new turn on the live session
    pub fn query(&self, prompt: impl Into<String>) -> TurnSpec {
        TurnSpec {
            engine: Arc::clone(&self.engine),
            prompt: prompt.into(),
            submit: Submit::Query { session_id: None },
        }
    }

    /// A new turn on `session_id`, relaunching the agent if it is not the
    /// live session
    pub fn query_with_session(&self, prompt: impl Into<String>, session_id: impl Into<String>) -> TurnSpec {
        TurnSpec {
            engine: Arc::clone(&self.engine),
            prompt: prompt.into(),
            submit: Submit::Query {
                session_id: Some(session_id.into()),
            },
        }
    }

    /// Ask the agent to abandon the turn in flight
    pub async fn interrupt(&self) -> Result<()> {
        self.engine.interrupt().await
    }

    /// Switch model for later turns
    pub async fn set_model(&self, model: Option<&str>) -> Result<()> {
        self.engine.set_model(model).await
    }

    /// Switch permission mode for later tool calls
    pub async fn set_permission_mode(&self, mode: PermissionMode) -> Result<()> {
        self.engine.set_permission_mode(mode).await
    }

    /// Observe every message of every turn
    pub fn on_message<F>(&self, observer: F) -> &Self
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.engine.on_message(observer);
        self
    }

    /// Observe every turn result
    pub fn on_result<F>(&self, observer: F) -> &Self
    where
        F: Fn(&ResultMessage) + Send + Sync + 'static,
    {
        self.engine.on_result(observer);
        self
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
    pub async fn close(&self) -> Result<()> {
        self.engine.close().await
    }
}

#[derive(Debug, Clone)]
enum Submit {
    Connect,
    Query { session_id: Option<String> },
}

/// A turn that has not been submitted yet
///
/// Consuming it with any of its methods submits the prompt.
#[derive(Debug)]
#[must_use = "a turn is only submitted when consumed"]
pub struct TurnSpec {
    engine: Arc<AgentSession>,
    prompt: String,
    submit: Submit,
}

enum TurnState {
    Pending(TurnSpec),
    Running(TurnReceiver),
    Done,
}

impl TurnSpec {
    async fn start(self) -> Result<TurnReceiver> {
        match self.submit {
            Submit::Connect => {
                let turn = self.engine.connect(Some(&self.prompt)).await?;
                turn.ok_or_else(|| {
                    crate::error::AgentError::InvalidState("connect did not start a turn".into())
                })
            }
            Submit::Query { session_id } => {
                self.engine
                    .query(&self.prompt, session_id.as_deref())
                    .await
            }
        }
    }

    /// Submit and stream every message of the turn
    pub fn messages(self) -> impl Stream<Item = Result<Message>> + Send {
        futures::stream::unfold(TurnState::Pending(self), |state| async move {
            let mut turn = match state {
                TurnState::Pending(spec) => match spec.start().await {
                    Ok(turn) => turn,
                    Err(e) => return Some((Err(e), TurnState::Done)),
                },
                TurnState::Running(turn) => turn,
                TurnState::Done => return None,
            };
            turn.next()
                .await
                .map(|item| (item, TurnState::Running(turn)))
        })
    }

    /// Submit and stream the text of each assistant message
    pub fn text_stream(self) -> impl Stream<Item = Result<String>> + Send {
        self.messages().try_filter_map(|message| async move {
            Ok(message
                .as_assistant()
                .map(|assistant| assistant.text())
                .filter(|text| !text.is_empty()))
        })
    }

    /// Submit and wait for the concatenated assistant text
    pub async fn text(self) -> Result<String> {
        let messages: Vec<Message> = self.messages().try_collect().await?;
        Ok(super::assistant_text(&messages))
    }

    /// Submit and wait for the turn's result
    pub async fn result(self) -> Result<ResultMessage> {
        self.start().await?.result().await
    }
}
