//! Client builder
//!
//! [`ClientBuilder`] collects options, hooks, a permission callback and
//! client settings. Options come either from its fluent setters or from a
//! pre-built [`AgentOptions`] attached with [`ClientBuilder::options`]; once
//! options are attached they are frozen and option setters are recorded as
//! errors that [`build`](ClientBuilder::build) reports.

use crate::config::{AgentOptions, AgentOptionsBuilder, ClientSettings};
use crate::error::{AgentError, Result};
use crate::hooks::{HookInputPolicy, HookRegistry};
use crate::permissions::PermissionCallback;
use crate::session::{AgentSession, CliTransportFactory, TransportFactory};
use agentwire_protocol::{
    AgentDefinition, JsonSchema, McpServerConfig, PermissionMode, PermissionRequest,
    PermissionResult,
};
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::{ClaudeAsyncClient, ClaudeSyncClient};

/// Marker for builders producing [`ClaudeSyncClient`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncMode;

/// Marker for builders producing [`ClaudeAsyncClient`]
#[derive(Debug, Clone, Copy, Default)]
pub struct AsyncMode;

#[derive(Debug, Clone)]
enum OptionsSource {
    Fluent { builder: AgentOptionsBuilder, touched: bool },
    Frozen(AgentOptions),
}

/// Builder shared by both client kinds
pub struct ClientBuilder<K> {
    options: OptionsSource,
    settings: ClientSettings,
    hooks: Arc<HookRegistry>,
    permission: Option<PermissionCallback>,
    factory: Arc<dyn TransportFactory>,
    errors: Vec<String>,
    _kind: PhantomData<K>,
}

impl<K> std::fmt::Debug for ClientBuilder<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("options", &self.options)
            .field("settings", &self.settings)
            .field("hooks", &self.hooks.len())
            .field("permission", &self.permission.is_some())
            .finish_non_exhaustive()
    }
}

impl<K> ClientBuilder<K> {
    pub(crate) fn new() -> Self {
        Self {
            options: OptionsSource::Fluent {
                builder: AgentOptions::builder(),
                touched: false,
            },
            settings: ClientSettings::default(),
            hooks: Arc::new(HookRegistry::new()),
            permission: None,
            factory: Arc::new(CliTransportFactory),
            errors: Vec::new(),
            _kind: PhantomData,
        }
    }

    fn fluent(mut self, setter: &str, apply: impl FnOnce(AgentOptionsBuilder) -> AgentOptionsBuilder) -> Self {
        self.options = match self.options {
            OptionsSource::Fluent { builder, .. } => OptionsSource::Fluent {
                builder: apply(builder),
                touched: true,
            },
            frozen @ OptionsSource::Frozen(_) => {
                self.errors
                    .push(format!("cannot set {setter}: options are frozen"));
                frozen
            }
        };
        self
    }

    /// Attach pre-built options, freezing them for this client
    pub fn options(mut self, options: AgentOptions) -> Self {
        match &self.options {
            OptionsSource::Fluent { touched: false, .. } => {}
            OptionsSource::Fluent { touched: true, .. } => self
                .errors
                .push("cannot attach options after fluent option setters were used".into()),
            OptionsSource::Frozen(_) => self.errors.push("options were already attached".into()),
        }
        self.options = OptionsSource::Frozen(options);
        self
    }

    /// Set the model
    pub fn model(self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.fluent("model", |b| b.model(model))
    }

    /// Replace the system prompt
    pub fn system_prompt(self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        self.fluent("system_prompt", |b| b.system_prompt(prompt))
    }

    /// Append to the default system prompt
    pub fn append_system_prompt(self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        self.fluent("append_system_prompt", |b| b.append_system_prompt(prompt))
    }

    /// Limit agent turns per query
    pub fn max_turns(self, turns: u32) -> Self {
        self.fluent("max_turns", |b| b.max_turns(turns))
    }

    /// Reject new turns once the client has spent this much in USD
    pub fn max_budget_usd(self, budget: f64) -> Self {
        self.fluent("max_budget_usd", |b| b.max_budget_usd(budget))
    }

    /// Reject new turns once the client has run this many, across sessions
    pub fn max_session_turns(self, turns: u32) -> Self {
        self.fluent("max_session_turns", |b| b.max_session_turns(turns))
    }

    /// Reject new turns once the client has used this many tokens, across sessions
    pub fn max_session_tokens(self, tokens: u64) -> Self {
        self.fluent("max_session_tokens", |b| b.max_session_tokens(tokens))
    }

    /// Output token ceiling per response
    pub fn max_tokens(self, tokens: u32) -> Self {
        self.fluent("max_tokens", |b| b.max_tokens(tokens))
    }

    /// Tools the agent may use without asking
    pub fn allowed_tools<I, S>(self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tools: Vec<String> = tools.into_iter().map(Into::into).collect();
        self.fluent("allowed_tools", |b| b.allowed_tools(tools))
    }

    /// Tools the agent may never use
    pub fn disallowed_tools<I, S>(self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tools: Vec<String> = tools.into_iter().map(Into::into).collect();
        self.fluent("disallowed_tools", |b| b.disallowed_tools(tools))
    }

    /// Permission mode at launch
    pub fn permission_mode(self, mode: PermissionMode) -> Self {
        self.fluent("permission_mode", |b| b.permission_mode(mode))
    }

    /// Resume an existing session on connect
    pub fn resume(self, session_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        self.fluent("resume", |b| b.resume(session_id))
    }

    /// Fork instead of continuing when resuming
    pub fn fork_session(self, fork: bool) -> Self {
        self.fluent("fork_session", |b| b.fork_session(fork))
    }

    /// Require results to carry output matching `schema`
    pub fn output_schema(self, schema: JsonSchema) -> Self {
        self.fluent("output_schema", |b| b.output_schema(schema))
    }

    /// Declare a tool server
    pub fn mcp_server(self, name: impl Into<String>, server: McpServerConfig) -> Self {
        let name = name.into();
        self.fluent("mcp_server", |b| b.mcp_server(name, server))
    }

    /// Declare a sub-agent
    pub fn agent(self, name: impl Into<String>, definition: AgentDefinition) -> Self {
        let name = name.into();
        self.fluent("agent", |b| b.agent(name, definition))
    }

    /// Apply arbitrary option setters
    pub fn configure(self, apply: impl FnOnce(AgentOptionsBuilder) -> AgentOptionsBuilder) -> Self {
        self.fluent("options", apply)
    }

    /// Working directory for the agent process
    pub fn working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.settings.working_directory = Some(dir.into());
        self
    }

    /// Turn timeout, overriding the options' timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.settings.timeout = Some(timeout);
        self
    }

    /// Path to the CLI executable
    pub fn cli_path(mut self, path: impl Into<String>) -> Self {
        self.settings.cli_path = path.into();
        self
    }

    /// Extra environment for the agent process
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.env.insert(key.into(), value.into());
        self
    }

    /// Hook registry consulted for every tool call
    ///
    /// Pass an `Arc` to keep registering or deregistering hooks after the
    /// client is built.
    pub fn hooks(mut self, hooks: impl Into<Arc<HookRegistry>>) -> Self {
        self.hooks = hooks.into();
        self
    }

    /// Time allowed per hook or permission callback
    pub fn hook_timeout(mut self, timeout: Duration) -> Self {
        self.settings.hook_timeout = timeout;
        self
    }

    /// How hook input missing expected fields is treated
    pub fn hook_input_policy(mut self, policy: HookInputPolicy) -> Self {
        self.settings.hook_input_policy = policy;
        self
    }

    /// Number of hook dispatches kept for [`hook_log`](crate::AgentSession::hook_log)
    pub fn hook_log_capacity(mut self, capacity: usize) -> Self {
        self.settings.hook_log_capacity = capacity;
        self
    }

    /// Time allowed for control requests
    pub fn control_timeout(mut self, timeout: Duration) -> Self {
        self.settings.control_timeout = timeout;
        self
    }

    /// Answer the agent's permission prompts
    pub fn can_use_tool<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(PermissionRequest) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = PermissionResult> + Send + 'static,
    {
        self.permission = Some(PermissionCallback::new(handler));
        self
    }

    /// Answer permission prompts with a prepared callback
    pub fn permission_callback(mut self, callback: PermissionCallback) -> Self {
        self.permission = Some(callback);
        self
    }

    /// Replace how agent processes are launched
    pub fn transport_factory(mut self, factory: impl TransportFactory + 'static) -> Self {
        self.factory = Arc::new(factory);
        self
    }

    fn into_session(self) -> Result<Arc<AgentSession>> {
        let mut errors = self.errors;
        let options = match self.options {
            OptionsSource::Frozen(options) => Some(options),
            OptionsSource::Fluent { builder, .. } => match builder.build() {
                Ok(options) => Some(options),
                Err(AgentError::IllegalConfiguration(msg)) => {
                    errors.push(msg);
                    None
                }
                Err(e) => return Err(e),
            },
        };
        if self.settings.timeout.is_some_and(|t| t.is_zero()) {
            errors.push("timeout must be greater than zero".into());
        }
        if self.settings.hook_timeout.is_zero() {
            errors.push("hook_timeout must be greater than zero".into());
        }
        if self.settings.hook_log_capacity == 0 {
            errors.push("hook_log_capacity must be at least 1".into());
        }

        match options {
            Some(options) if errors.is_empty() => Ok(AgentSession::new(
                options,
                self.settings,
                self.hooks,
                self.permission,
                self.factory,
            )),
            _ => Err(AgentError::IllegalConfiguration(errors.join("; "))),
        }
    }
}

impl ClientBuilder<SyncMode> {
    /// Build the blocking client
    ///
    /// # Errors
    ///
    /// `IllegalConfiguration` for rejected options or setters used on frozen
    /// options; `Launch` when the worker runtime cannot start.
    pub fn build(self) -> Result<ClaudeSyncClient> {
        let session = self.into_session()?;
        ClaudeSyncClient::new(session)
    }
}

impl ClientBuilder<AsyncMode> {
    /// Build the non-blocking client
    pub fn build(self) -> Result<ClaudeAsyncClient> {
        self.into_session().map(ClaudeAsyncClient::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClaudeClient;
    use agentwire_protocol::models;

    #[test]
    fn test_fluent_and_frozen_options_match() {
        let frozen = AgentOptions::builder()
            .model(models::HAIKU)
            .allowed_tools(["Read"])
            .max_turns(2)
            .build()
            .unwrap();

        let fluent = ClaudeClient::r#async()
            .model(models::HAIKU)
            .allowed_tools(["Read"])
            .max_turns(2)
            .build()
            .unwrap();
        let attached = ClaudeClient::async_with(frozen).build().unwrap();

        assert_eq!(
            fluent.session().options().to_cli_args(),
            attached.session().options().to_cli_args()
        );
    }

    #[test]
    fn test_setter_on_frozen_options_rejected() {
        let frozen = AgentOptions::builder().build().unwrap();
        let err = ClaudeClient::async_with(frozen)
            .model(models::OPUS)
            .build()
            .unwrap_err();
        assert!(matches!(err, AgentError::IllegalConfiguration(ref m) if m.contains("model")));
    }

    #[test]
    fn test_attach_after_fluent_rejected() {
        let frozen = AgentOptions::builder().build().unwrap();
        let err = ClaudeClient::r#async()
            .model(models::OPUS)
            .options(frozen)
            .build()
            .unwrap_err();
        assert!(matches!(err, AgentError::IllegalConfiguration(_)));
    }

    #[test]
    fn test_errors_are_collected() {
        let err = ClaudeClient::r#async()
            .allowed_tools(["Bash"])
            .disallowed_tools(["Bash"])
            .hook_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        let AgentError::IllegalConfiguration(message) = err else {
            panic!("expected illegal configuration");
        };
        assert!(message.contains("Bash"));
        assert!(message.contains("hook_timeout"));
    }

    #[test]
    fn test_settings_applied() {
        let client = ClaudeClient::r#async()
            .cli_path("/usr/local/bin/claude")
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap();
        let session = client.session();
        assert_eq!(session.settings.cli_path, "/usr/local/bin/claude");
        assert_eq!(
            session.settings.turn_timeout(session.options()),
            Duration::from_secs(30)
        );
    }
}
