//! Runtime control
//!
//! Interrupts, model and permission-mode changes, and cross-turn observers.

use crate::error::{AgentError, Result};
use crate::session::core::AgentSession;
use crate::session::state::Lifecycle;
use agentwire_protocol::{ClientControl, Message, PermissionMode, RequestId, ResultMessage};
use agentwire_transport::Transport;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::Ordering;

impl AgentSession {
    /// Ask the agent to abandon the turn in flight
    ///
    /// A no-op when no turn is in flight or an interrupt was already sent for
    /// it. The turn still ends with a result, usually an interrupted error.
    pub async fn interrupt(&self) -> Result<()> {
        let send = {
            let mut state = self.shared.state();
            if state.turn_in_flight() && !state.interrupt_sent {
                state.interrupt_sent = true;
                true
            } else {
                false
            }
        };
        if !send {
            tracing::debug!("interrupt ignored; nothing to interrupt");
            return Ok(());
        }

        let transport = match self.connection.lock().await.as_ref() {
            Some(connection) => Arc::clone(&connection.transport),
            None => return Ok(()),
        };
        let request_id = transport
            .interrupt()
            .await
            .map_err(|e| AgentError::Transport(format!("failed to send interrupt: {e}")))?;
        tracing::info!(%request_id, "interrupt sent");
        Ok(())
    }

    /// Switch model for subsequent turns; `None` restores the default
    pub async fn set_model(&self, model: Option<&str>) -> Result<()> {
        let transport = self.connected_transport().await?;
        self.request(
            &transport,
            ClientControl::SetModel {
                model: model.map(String::from),
            },
        )
        .await?;
        tracing::info!(model = ?model, "model changed");
        Ok(())
    }

    /// Switch permission mode for subsequent tool calls
    pub async fn set_permission_mode(&self, mode: PermissionMode) -> Result<()> {
        let transport = self.connected_transport().await?;
        self.request(&transport, ClientControl::SetPermissionMode { mode })
            .await?;
        tracing::info!(%mode, "permission mode changed");
        Ok(())
    }

    /// Observe every message delivered on any turn
    ///
    /// Observers run on the reader task after the message was handed to the
    /// turn in flight; they must not block.
    pub fn on_message<F>(&self, observer: F)
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.shared.add_message_observer(Arc::new(observer));
    }

    /// Observe every turn result
    pub fn on_result<F>(&self, observer: F)
    where
        F: Fn(&ResultMessage) + Send + Sync + 'static,
    {
        self.shared.add_result_observer(Arc::new(observer));
    }

    /// Send a control request and wait for the agent's answer
    pub(crate) async fn request(
        &self,
        transport: &Arc<dyn Transport>,
        control: ClientControl,
    ) -> Result<Value> {
        let request_id = RequestId::new(self.sequence.fetch_add(1, Ordering::Relaxed));
        let waiter = self.shared.register_waiter(request_id.as_str());

        if let Err(e) = transport.write_frame(&control.to_frame(&request_id)).await {
            self.shared.forget_waiter(request_id.as_str());
            return Err(AgentError::Transport(format!(
                "failed to send {}: {e}",
                control.subtype()
            )));
        }

        let timeout = self.settings.control_timeout;
        match tokio::time::timeout(timeout, waiter).await {
            Ok(Ok(Ok(body))) => Ok(body),
            Ok(Ok(Err(message))) => Err(AgentError::Protocol(format!(
                "{} rejected by agent: {message}",
                control.subtype()
            ))),
            Ok(Err(_)) => Err(AgentError::Transport(format!(
                "agent exited before answering {}",
                control.subtype()
            ))),
            Err(_) => {
                self.shared.forget_waiter(request_id.as_str());
                Err(AgentError::Timeout(timeout))
            }
        }
    }

    async fn connected_transport(&self) -> Result<Arc<dyn Transport>> {
        if !matches!(self.lifecycle(), Lifecycle::Connected { .. }) {
            return Err(AgentError::InvalidState("session is not connected".into()));
        }
        self.connection
            .lock()
            .await
            .as_ref()
            .map(|connection| Arc::clone(&connection.transport))
            .ok_or(AgentError::NotConnected)
    }
}
