//! Message router for the agent's output stream
//!
//! One reader task per agent process. It decodes every frame, answers the
//! agent's control requests (hook callbacks, permission prompts), resolves
//! responses to the client's own control requests, and publishes messages to
//! the turn in flight and to observers. Each frame is fully handled before the
//! next one is read, so hooks run before the agent gets to execute the tool.

use crate::message_parser::{DecodeError, ParsedMessage, decode_frame};
use crate::session::state::SessionShared;
use agentwire_protocol::{AgentControl, AgentControlRequest, ControlResponse, Message};
use agentwire_transport::Transport;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Handle to a running reader task
pub(crate) struct MessageRouter {
    handle: JoinHandle<()>,
}

impl MessageRouter {
    /// Start reading `transport` on behalf of connection `generation`
    pub(crate) fn spawn(
        shared: Arc<SessionShared>,
        transport: Arc<dyn Transport>,
        generation: u64,
    ) -> Self {
        let handle = tokio::spawn(async move {
            Self::message_loop(shared, transport, generation).await;
        });
        Self { handle }
    }

    /// Stop the reader without waiting for end of stream
    pub(crate) fn abort(&self) {
        self.handle.abort();
    }

    async fn message_loop(
        shared: Arc<SessionShared>,
        transport: Arc<dyn Transport>,
        generation: u64,
    ) {
        loop {
            match transport.read_frame().await {
                Ok(Some(line)) => Self::route(&shared, transport.as_ref(), &line).await,
                Ok(None) => {
                    tracing::debug!(generation, "agent output reached end of stream");
                    shared.stream_ended(generation, "agent process closed its output");
                    break;
                }
                Err(e) => {
                    tracing::error!(generation, error = %e, "failed to read from agent");
                    shared.stream_ended(generation, &format!("read failed: {e}"));
                    break;
                }
            }
        }
    }

    async fn route(shared: &SessionShared, transport: &dyn Transport, line: &str) {
        match decode_frame(line) {
            Ok(ParsedMessage::Regular(message)) => Self::handle_message(shared, message),
            Ok(ParsedMessage::ControlRequest(request)) => {
                let response = Self::answer(shared, &request).await;
                if let Err(e) = transport.write_frame(&response).await {
                    tracing::error!(
                        request_id = %request.request_id,
                        error = %e,
                        "failed to answer control request"
                    );
                }
            }
            Ok(ParsedMessage::ControlResponse(ControlResponse {
                request_id,
                outcome,
            })) => shared.resolve(&request_id, outcome),
            Err(e @ DecodeError::Control(_)) => {
                tracing::warn!(error = %e, "ignoring malformed control frame");
            }
            Err(e) => {
                tracing::warn!(error = %e, "dropping undecodable frame");
                shared.record_decode_error(e.to_string());
            }
        }
    }

    fn handle_message(shared: &SessionShared, message: Message) {
        match message {
            Message::Unknown { message_type, .. } if message_type.starts_with("control_") => {
                tracing::debug!(%message_type, "ignoring control frame");
            }
            Message::Result(result) => shared.complete_turn(result),
            Message::System(system) => {
                if system.is_init() {
                    tracing::info!(
                        session_id = system.session_id().unwrap_or("unknown"),
                        "agent session initialized"
                    );
                }
                shared.publish(Message::System(system));
            }
            message => shared.publish(message),
        }
    }

    async fn answer(shared: &SessionShared, request: &AgentControlRequest) -> Value {
        match &request.request {
            AgentControl::HookCallback {
                callback_id,
                input,
                tool_use_id,
            } => match shared
                .hooks
                .handle_callback(callback_id, input, tool_use_id.as_deref())
                .await
            {
                Ok(body) => request.success(body),
                Err(e) => {
                    tracing::warn!(%callback_id, error = %e, "hook callback rejected");
                    request.error(e.to_string())
                }
            },
            AgentControl::CanUseTool(prompt) => match &shared.permission {
                Some(callback) => {
                    let decision = callback
                        .decide(prompt.clone(), shared.permission_timeout)
                        .await;
                    request.success(decision.to_wire(&prompt.input))
                }
                None => {
                    tracing::warn!(tool = %prompt.tool_name, "permission prompt with no callback");
                    request.error("no permission callback is registered")
                }
            },
            AgentControl::Unsupported { subtype } => {
                tracing::debug!(%subtype, "unsupported control request");
                request.error(format!("unsupported control request: {subtype}"))
            }
        }
    }
}
