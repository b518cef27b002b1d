//! Core session management
//!
//! [`AgentSession`] owns the agent process for one client: it launches it,
//! performs the initialize handshake, relaunches it when a query switches to
//! another session, and tears it down on close.

use crate::config::{AgentOptions, ClientSettings};
use crate::error::{AgentError, Result};
use crate::hooks::{HookDispatcher, HookLogEntry, HookRegistry};
use crate::permissions::PermissionCallback;
use crate::routing::MessageRouter;
use crate::session::state::{ClientSpend, Lifecycle, SessionInfo, SessionShared};
use crate::session::query::TurnReceiver;
use agentwire_protocol::control::initialize_hooks;
use agentwire_protocol::{ClientControl, HookEvent};
use agentwire_transport::{CliTransport, ProcessConfig, Transport, TransportError};
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use tokio::sync::Mutex;

/// Creates the transport for each agent process the session launches
///
/// A session launches one process on connect and another every time a query
/// switches it to a different session id.
pub trait TransportFactory: Send + Sync {
    /// Build an unstarted transport for `config`
    fn create(&self, config: ProcessConfig) -> Arc<dyn Transport>;
}

/// Launches the real CLI as a subprocess
#[derive(Debug, Clone, Copy, Default)]
pub struct CliTransportFactory;

impl TransportFactory for CliTransportFactory {
    fn create(&self, config: ProcessConfig) -> Arc<dyn Transport> {
        Arc::new(CliTransport::new(config))
    }
}

/// A running agent process and its reader task
pub(crate) struct Connection {
    pub(crate) transport: Arc<dyn Transport>,
    router: MessageRouter,
}

impl Connection {
    pub(crate) async fn shutdown(self) {
        if let Err(e) = self.transport.close().await {
            tracing::warn!(error = %e, "agent process did not shut down cleanly");
        }
        self.router.abort();
    }
}

/// The session engine behind both clients
///
/// One instance drives one conversation at a time. Turns are strictly
/// sequential; the engine rejects a second query while one is in flight.
pub struct AgentSession {
    pub(crate) options: AgentOptions,
    pub(crate) settings: ClientSettings,
    factory: Arc<dyn TransportFactory>,
    pub(crate) shared: Arc<SessionShared>,
    pub(crate) connection: Mutex<Option<Connection>>,
    pub(crate) sequence: AtomicU64,
}

impl std::fmt::Debug for AgentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSession")
            .field("lifecycle", &self.lifecycle())
            .field("info", &self.info())
            .finish_non_exhaustive()
    }
}

impl AgentSession {
    pub(crate) fn new(
        options: AgentOptions,
        settings: ClientSettings,
        hooks: Arc<HookRegistry>,
        permission: Option<PermissionCallback>,
        factory: Arc<dyn TransportFactory>,
    ) -> Arc<Self> {
        let dispatcher = HookDispatcher::new(hooks, settings.hook_timeout, settings.hook_input_policy)
            .with_log_capacity(settings.hook_log_capacity);
        let shared = SessionShared::new(
            dispatcher,
            permission,
            settings.hook_timeout,
            options.output_schema().cloned(),
        );

        Arc::new(Self {
            options,
            settings,
            factory,
            shared: Arc::new(shared),
            connection: Mutex::new(None),
            sequence: AtomicU64::new(0),
        })
    }

    /// Frozen options this session was built with
    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    /// Snapshot of the conversation record
    pub fn info(&self) -> SessionInfo {
        self.shared.info()
    }

    /// Totals across every session this client ran, used for the ceilings
    pub fn spend(&self) -> ClientSpend {
        self.shared.spend()
    }

    /// Current lifecycle state
    pub fn lifecycle(&self) -> Lifecycle {
        self.shared.lifecycle()
    }

    /// The retained hook dispatches, oldest first
    pub fn hook_log(&self) -> Vec<HookLogEntry> {
        self.shared.hooks.log().entries()
    }

    /// Remove and return the retained hook dispatches
    pub fn take_hook_log(&self) -> Vec<HookLogEntry> {
        self.shared.hooks.log().drain()
    }

    /// Launch the agent and move to `Connected`
    ///
    /// With a prompt, the first turn is submitted and its receiver returned.
    /// Without one, the session attaches to the configured resume target (if
    /// any) without running a turn.
    pub async fn connect(self: &Arc<Self>, prompt: Option<&str>) -> Result<Option<TurnReceiver>> {
        {
            let mut connection = self.connection.lock().await;
            match self.lifecycle() {
                Lifecycle::Unconnected => {}
                Lifecycle::Connected { .. } => {
                    return Err(AgentError::InvalidState("session is already connected".into()));
                }
                Lifecycle::Closed => {
                    return Err(AgentError::InvalidState("session is closed".into()));
                }
            }

            let fresh = self.launch(&self.options).await?;
            let closed_meanwhile = {
                let mut state = self.shared.state();
                if state.lifecycle == Lifecycle::Closed {
                    true
                } else {
                    state.lifecycle = Lifecycle::Connected {
                        turn_in_flight: false,
                    };
                    state.info.open = true;
                    if let Some(target) = self.options.resume() {
                        if self.options.fork_session() {
                            state.info.parent_session_id = Some(target.to_string());
                        } else {
                            state.info.session_id = Some(target.to_string());
                        }
                    }
                    false
                }
            };
            if closed_meanwhile {
                fresh.shutdown().await;
                return Err(AgentError::InvalidState("session was closed while connecting".into()));
            }
            *connection = Some(fresh);
        }

        tracing::info!(
            resume = ?self.options.resume(),
            fork = self.options.fork_session(),
            "session connected"
        );

        match prompt {
            Some(prompt) => self.query(prompt, None).await.map(Some),
            None => Ok(None),
        }
    }

    /// Close the session from any state
    ///
    /// A turn still in flight is terminated with an `error_session_closed`
    /// result. Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        let interrupted = {
            let mut state = self.shared.state();
            if state.lifecycle == Lifecycle::Closed {
                None
            } else {
                let session_id = state.info.session_id.clone().unwrap_or_default();
                state.close().map(|turn| (turn, session_id))
            }
        };

        if let Some((turn, session_id)) = interrupted {
            let result = agentwire_protocol::ResultMessage::synthesized(
                "error_session_closed",
                session_id,
                "session closed while a turn was in flight",
            );
            self.shared
                .deliver(agentwire_protocol::Message::Result(result), Some(turn));
        }
        self.shared.fail_pending();

        let connection = self.connection.lock().await.take();
        if let Some(connection) = connection {
            connection.shutdown().await;
            tracing::info!("session closed");
        }
        Ok(())
    }

    /// Relaunch the agent on `target`, replacing the session record
    pub(crate) async fn switch_session(
        &self,
        connection: &mut Option<Connection>,
        target: &str,
    ) -> Result<()> {
        let fork = self.options.fork_session();
        tracing::info!(session_id = %target, fork, "switching session");

        if let Some(previous) = connection.take() {
            // Retire the old reader before its stream ends.
            self.shared.state().generation += 1;
            previous.shutdown().await;
        }

        let fresh = self.launch(&self.options.resuming(target)).await?;
        let closed_meanwhile = {
            let mut state = self.shared.state();
            if state.lifecycle == Lifecycle::Closed {
                true
            } else {
                state.info = SessionInfo {
                    session_id: (!fork).then(|| target.to_string()),
                    parent_session_id: fork.then(|| target.to_string()),
                    open: true,
                    ..SessionInfo::default()
                };
                false
            }
        };
        if closed_meanwhile {
            fresh.shutdown().await;
            return Err(AgentError::InvalidState("session was closed while switching".into()));
        }

        *connection = Some(fresh);
        Ok(())
    }

    /// Start an agent process for `options` and complete the handshake
    async fn launch(&self, options: &AgentOptions) -> Result<Connection> {
        let config = self.process_config(options);
        tracing::debug!(cli = %config.cli_path, args = ?config.args, "launching agent process");

        let transport = self.factory.create(config);
        transport.start().await.map_err(|e| match e {
            TransportError::Launch(msg) => AgentError::Launch(msg),
            other => AgentError::Launch(other.to_string()),
        })?;

        let generation = {
            let mut state = self.shared.state();
            state.generation += 1;
            state.generation
        };
        let router = MessageRouter::spawn(Arc::clone(&self.shared), Arc::clone(&transport), generation);
        let connection = Connection { transport, router };

        let handshake = ClientControl::Initialize {
            hooks: initialize_hooks(&[HookEvent::PreToolUse, HookEvent::PostToolUse]),
        };
        match self.request(&connection.transport, handshake).await {
            Ok(_) => Ok(connection),
            Err(e) => {
                connection.shutdown().await;
                Err(AgentError::Launch(format!("initialize handshake failed: {e}")))
            }
        }
    }

    fn process_config(&self, options: &AgentOptions) -> ProcessConfig {
        let mut args = options.to_cli_args();
        if self.shared.permission.is_some() {
            args.extend(["--permission-prompt-tool".to_string(), "stdio".to_string()]);
        }

        let mut config = ProcessConfig::new(self.settings.cli_path.clone())
            .with_args(args)
            .with_close_timeout(self.settings.close_timeout);
        for (key, value) in options.to_cli_env() {
            config = config.with_env(key, value);
        }
        for (key, value) in &self.settings.env {
            config = config.with_env(key.clone(), value.clone());
        }
        if let Some(dir) = &self.settings.working_directory {
            config = config.with_working_dir(dir.clone());
        }
        config
    }
}

impl Drop for AgentSession {
    fn drop(&mut self) {
        // The reader task holds the transport; without it the process is
        // killed when the last handle goes away.
        if let Some(connection) = self.connection.get_mut().take() {
            connection.router.abort();
        }
    }
}
