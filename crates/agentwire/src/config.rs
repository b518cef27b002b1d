//! Agent options and client settings
//!
//! [`AgentOptions`] is the immutable description of a conversation: model,
//! prompts, ceilings, tool lists, permission mode, resume/fork target, tool
//! servers, sub-agents and output schema. It is assembled with
//! [`AgentOptionsBuilder`] and frozen by [`AgentOptionsBuilder::build`].
//!
//! [`ClientSettings`] holds the per-client knobs that do not change what the
//! agent is asked to do: where the CLI lives, the working directory, extra
//! environment, and the various timeouts.

use crate::error::{AgentError, Result};
use crate::hooks::HookInputPolicy;
use agentwire_protocol::agent::mcp_config_json;
use agentwire_protocol::{AgentDefinition, JsonSchema, McpServerConfig, PermissionMode};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding the default CLI path
pub const CLI_PATH_ENV: &str = "CLAUDE_CLI_PATH";

/// Environment variable carrying the output token ceiling to the agent
pub const MAX_OUTPUT_TOKENS_ENV: &str = "CLAUDE_CODE_MAX_OUTPUT_TOKENS";

/// Default time a turn may take before it is interrupted
pub const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(600);

/// Default time a single hook callback may take
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(60);

/// Default time allowed for control requests, including the initialize handshake
pub const DEFAULT_CONTROL_TIMEOUT: Duration = Duration::from_secs(60);

/// Default time the agent process gets to exit on close
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of hook dispatches a client remembers
pub const DEFAULT_HOOK_LOG_CAPACITY: usize = 1024;

/// Immutable conversation options
///
/// # Example
///
/// ```
/// use agentwire::AgentOptions;
/// use agentwire_protocol::PermissionMode;
///
/// let options = AgentOptions::builder()
///     .model("claude-sonnet-4-5")
///     .allowed_tools(["Read", "Grep"])
///     .permission_mode(PermissionMode::AcceptEdits)
///     .build()
///     .unwrap();
///
/// let args = options.to_cli_args();
/// assert!(args.windows(2).any(|w| w == ["--allowedTools", "Read,Grep"]));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AgentOptions {
    model: Option<String>,
    system_prompt: Option<String>,
    append_system_prompt: Option<String>,
    max_turns: Option<u32>,
    max_budget_usd: Option<f64>,
    max_session_turns: Option<u32>,
    max_session_tokens: Option<u64>,
    max_tokens: Option<u32>,
    max_thinking_tokens: Option<u32>,
    allowed_tools: Vec<String>,
    disallowed_tools: Vec<String>,
    permission_mode: PermissionMode,
    resume: Option<String>,
    fork_session: bool,
    continue_conversation: bool,
    output_schema: Option<JsonSchema>,
    mcp_servers: BTreeMap<String, McpServerConfig>,
    agents: Map<String, Value>,
    add_dirs: Vec<PathBuf>,
    setting_sources: Vec<String>,
    extra_args: Vec<(String, Option<String>)>,
    timeout: Duration,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            model: None,
            system_prompt: None,
            append_system_prompt: None,
            max_turns: None,
            max_budget_usd: None,
            max_session_turns: None,
            max_session_tokens: None,
            max_tokens: None,
            max_thinking_tokens: None,
            allowed_tools: Vec::new(),
            disallowed_tools: Vec::new(),
            permission_mode: PermissionMode::Default,
            resume: None,
            fork_session: false,
            continue_conversation: false,
            output_schema: None,
            mcp_servers: BTreeMap::new(),
            agents: Map::new(),
            add_dirs: Vec::new(),
            setting_sources: Vec::new(),
            extra_args: Vec::new(),
            timeout: DEFAULT_TURN_TIMEOUT,
        }
    }
}

impl AgentOptions {
    /// Start building options
    pub fn builder() -> AgentOptionsBuilder {
        AgentOptionsBuilder::default()
    }

    /// Model identifier
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Replacement system prompt
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Text appended to the default system prompt
    pub fn append_system_prompt(&self) -> Option<&str> {
        self.append_system_prompt.as_deref()
    }

    /// Agent turns allowed per exchange
    pub fn max_turns(&self) -> Option<u32> {
        self.max_turns
    }

    /// Cost ceiling in USD, summed over every session the client runs
    pub fn max_budget_usd(&self) -> Option<f64> {
        self.max_budget_usd
    }

    /// Turns allowed across every session the client runs
    pub fn max_session_turns(&self) -> Option<u32> {
        self.max_session_turns
    }

    /// Token ceiling across every session the client runs
    pub fn max_session_tokens(&self) -> Option<u64> {
        self.max_session_tokens
    }

    /// Output token ceiling per response
    pub fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }

    /// Tools the agent may use without asking
    pub fn allowed_tools(&self) -> &[String] {
        &self.allowed_tools
    }

    /// Tools the agent may never use
    pub fn disallowed_tools(&self) -> &[String] {
        &self.disallowed_tools
    }

    /// Permission mode
    pub fn permission_mode(&self) -> PermissionMode {
        self.permission_mode
    }

    /// Session to resume
    pub fn resume(&self) -> Option<&str> {
        self.resume.as_deref()
    }

    /// Whether resuming forks into a new session
    pub fn fork_session(&self) -> bool {
        self.fork_session
    }

    /// Whether to continue the most recent conversation
    pub fn continue_conversation(&self) -> bool {
        self.continue_conversation
    }

    /// Schema the turn's structured output must satisfy
    pub fn output_schema(&self) -> Option<&JsonSchema> {
        self.output_schema.as_ref()
    }

    /// Named tool servers
    pub fn mcp_servers(&self) -> &BTreeMap<String, McpServerConfig> {
        &self.mcp_servers
    }

    /// Named sub-agent definitions as JSON
    pub fn agents(&self) -> &Map<String, Value> {
        &self.agents
    }

    /// Turn timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Launch arguments for the agent process
    ///
    /// Every launch goes through here, whichever way the options were built.
    pub fn to_cli_args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "--output-format",
            "stream-json",
            "--input-format",
            "stream-json",
            "--verbose",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        let mut flag = |name: &str, value: String| {
            args.push(name.to_string());
            args.push(value);
        };

        if let Some(model) = &self.model {
            flag("--model", model.clone());
        }
        if let Some(prompt) = &self.system_prompt {
            flag("--system-prompt", prompt.clone());
        }
        if let Some(prompt) = &self.append_system_prompt {
            flag("--append-system-prompt", prompt.clone());
        }
        if let Some(turns) = self.max_turns {
            flag("--max-turns", turns.to_string());
        }
        if let Some(budget) = self.max_budget_usd {
            flag("--max-budget-usd", budget.to_string());
        }
        if !self.allowed_tools.is_empty() {
            flag("--allowedTools", self.allowed_tools.join(","));
        }
        if !self.disallowed_tools.is_empty() {
            flag("--disallowedTools", self.disallowed_tools.join(","));
        }
        if let Some(id) = &self.resume {
            flag("--resume", id.clone());
        }
        if let Some(schema) = &self.output_schema {
            flag("--json-schema", schema.as_value().to_string());
        }
        if !self.mcp_servers.is_empty() {
            flag("--mcp-config", mcp_config_json(&self.mcp_servers).to_string());
        }
        if !self.agents.is_empty() {
            flag("--agents", Value::Object(self.agents.clone()).to_string());
        }
        for dir in &self.add_dirs {
            flag("--add-dir", dir.display().to_string());
        }
        if let Some(tokens) = self.max_thinking_tokens {
            flag("--max-thinking-tokens", tokens.to_string());
        }
        if !self.setting_sources.is_empty() {
            flag("--setting-sources", self.setting_sources.join(","));
        }

        if self.permission_mode != PermissionMode::Default {
            args.extend(self.permission_mode.cli_args());
        }
        if self.fork_session {
            args.push("--fork-session".into());
        }
        if self.continue_conversation {
            args.push("--continue".into());
        }
        for (name, value) in &self.extra_args {
            args.push(format!("--{}", name.trim_start_matches('-')));
            if let Some(value) = value {
                args.push(value.clone());
            }
        }

        args
    }

    /// Environment variables the options imply for the agent process
    pub fn to_cli_env(&self) -> Vec<(String, String)> {
        self.max_tokens
            .map(|tokens| (MAX_OUTPUT_TOKENS_ENV.to_string(), tokens.to_string()))
            .into_iter()
            .collect()
    }

    /// Copy of these options targeting another session
    pub(crate) fn resuming(&self, session_id: &str) -> Self {
        let mut options = self.clone();
        options.resume = Some(session_id.to_string());
        options.continue_conversation = false;
        options
    }
}

/// Fluent builder for [`AgentOptions`]
///
/// Setters never fail; problems are collected and reported together by
/// [`AgentOptionsBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct AgentOptionsBuilder {
    options: AgentOptions,
    errors: Vec<String>,
}

impl AgentOptionsBuilder {
    /// Set the model
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.options.model = Some(model.into());
        self
    }

    /// Replace the default system prompt
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.options.system_prompt = Some(prompt.into());
        self
    }

    /// Append to the default system prompt
    pub fn append_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.options.append_system_prompt = Some(prompt.into());
        self
    }

    /// Limit agent turns per exchange
    pub fn max_turns(mut self, turns: u32) -> Self {
        self.options.max_turns = Some(turns);
        self
    }

    /// Limit cumulative cost in USD
    ///
    /// Resuming or forking another session does not reset the total.
    pub fn max_budget_usd(mut self, budget: f64) -> Self {
        self.options.max_budget_usd = Some(budget);
        self
    }

    /// Limit the turns a client runs, counted across session switches
    pub fn max_session_turns(mut self, turns: u32) -> Self {
        self.options.max_session_turns = Some(turns);
        self
    }

    /// Limit the tokens a client uses, counted across session switches
    pub fn max_session_tokens(mut self, tokens: u64) -> Self {
        self.options.max_session_tokens = Some(tokens);
        self
    }

    /// Limit output tokens per response
    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.options.max_tokens = Some(tokens);
        self
    }

    /// Limit thinking tokens
    pub fn max_thinking_tokens(mut self, tokens: u32) -> Self {
        self.options.max_thinking_tokens = Some(tokens);
        self
    }

    /// Tools the agent may use without asking
    pub fn allowed_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options
            .allowed_tools
            .extend(tools.into_iter().map(Into::into));
        self
    }

    /// Tools the agent may never use
    pub fn disallowed_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options
            .disallowed_tools
            .extend(tools.into_iter().map(Into::into));
        self
    }

    /// Set the permission mode
    pub fn permission_mode(mut self, mode: PermissionMode) -> Self {
        self.options.permission_mode = mode;
        self
    }

    /// Resume an existing session
    pub fn resume(mut self, session_id: impl Into<String>) -> Self {
        self.options.resume = Some(session_id.into());
        self
    }

    /// Fork instead of continuing when resuming
    pub fn fork_session(mut self, fork: bool) -> Self {
        self.options.fork_session = fork;
        self
    }

    /// Continue the most recent conversation in the working directory
    pub fn continue_conversation(mut self, enabled: bool) -> Self {
        self.options.continue_conversation = enabled;
        self
    }

    /// Require structured output matching `schema`
    pub fn output_schema(mut self, schema: JsonSchema) -> Self {
        self.options.output_schema = Some(schema);
        self
    }

    /// Require structured output matching a raw schema document
    pub fn output_schema_value(mut self, schema: Value) -> Self {
        match JsonSchema::from_value(schema) {
            Ok(schema) => self.options.output_schema = Some(schema),
            Err(e) => self.errors.push(format!("output schema: {e}")),
        }
        self
    }

    /// Declare a named tool server
    pub fn mcp_server(mut self, name: impl Into<String>, server: McpServerConfig) -> Self {
        self.options.mcp_servers.insert(name.into(), server);
        self
    }

    /// Declare a named sub-agent
    pub fn agent(mut self, name: impl Into<String>, definition: AgentDefinition) -> Self {
        let name = name.into();
        match serde_json::to_value(&definition) {
            Ok(value) => {
                self.options.agents.insert(name, value);
            }
            Err(e) => self.errors.push(format!("agent '{name}': {e}")),
        }
        self
    }

    /// Declare sub-agents from a raw JSON object keyed by name
    pub fn agents_json(mut self, json: &str) -> Self {
        match serde_json::from_str::<Value>(json) {
            Ok(Value::Object(agents)) => self.options.agents.extend(agents),
            Ok(_) => self.errors.push("agents JSON must be an object".into()),
            Err(e) => self.errors.push(format!("agents JSON is invalid: {e}")),
        }
        self
    }

    /// Give the agent access to another directory
    pub fn add_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.add_dirs.push(dir.into());
        self
    }

    /// Which settings files the agent loads (`user`, `project`, `local`)
    pub fn setting_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.setting_sources = sources.into_iter().map(Into::into).collect();
        self
    }

    /// Pass an extra flag through to the agent process
    pub fn extra_arg(mut self, flag: impl Into<String>, value: Option<String>) -> Self {
        self.options.extra_args.push((flag.into(), value));
        self
    }

    /// Set the turn timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    /// Validate and freeze the options
    pub fn build(self) -> Result<AgentOptions> {
        let mut errors = self.errors;
        let options = self.options;

        let allowed: BTreeSet<&str> = options.allowed_tools.iter().map(String::as_str).collect();
        for tool in &options.disallowed_tools {
            if allowed.contains(tool.as_str()) {
                errors.push(format!("tool '{tool}' is both allowed and disallowed"));
            }
        }
        if let Some(budget) = options.max_budget_usd
            && !(budget.is_finite() && budget >= 0.0)
        {
            errors.push(format!("max_budget_usd must be a non-negative amount, got {budget}"));
        }
        if options.max_turns == Some(0) {
            errors.push("max_turns must be at least 1".into());
        }
        if options.timeout.is_zero() {
            errors.push("timeout must be greater than zero".into());
        }
        if let Some(schema) = &options.output_schema
            && let Err(e) = schema.check()
        {
            errors.push(format!("output schema: {e}"));
        }

        if errors.is_empty() {
            Ok(options)
        } else {
            Err(AgentError::IllegalConfiguration(errors.join("; ")))
        }
    }
}

/// Per-client settings that do not affect what the agent is asked to do
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Path to the CLI executable
    pub cli_path: String,

    /// Working directory for the agent process
    pub working_directory: Option<PathBuf>,

    /// Turn timeout override; falls back to [`AgentOptions::timeout`]
    pub timeout: Option<Duration>,

    /// Extra environment for the agent process
    pub env: HashMap<String, String>,

    /// Time allowed per hook callback
    pub hook_timeout: Duration,

    /// How malformed hook input is treated
    pub hook_input_policy: HookInputPolicy,

    /// Hook dispatches kept in the log before the oldest are dropped
    pub hook_log_capacity: usize,

    /// Time allowed for control requests and the initialize handshake
    pub control_timeout: Duration,

    /// Time the agent process gets to exit on close
    pub close_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            cli_path: std::env::var(CLI_PATH_ENV).unwrap_or_else(|_| "claude".to_string()),
            working_directory: None,
            timeout: None,
            env: HashMap::new(),
            hook_timeout: DEFAULT_HOOK_TIMEOUT,
            hook_input_policy: HookInputPolicy::default(),
            hook_log_capacity: DEFAULT_HOOK_LOG_CAPACITY,
            control_timeout: DEFAULT_CONTROL_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

impl ClientSettings {
    /// Effective turn timeout
    pub fn turn_timeout(&self, options: &AgentOptions) -> Duration {
        self.timeout.unwrap_or(options.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentwire_protocol::models;
    use rstest::rstest;
    use serde_json::json;

    fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.windows(2)
            .find(|w| w[0] == flag)
            .map(|w| w[1].as_str())
    }

    #[test]
    fn test_default_options() {
        let options = AgentOptions::builder().build().unwrap();
        assert_eq!(options.timeout(), DEFAULT_TURN_TIMEOUT);
        assert_eq!(options.permission_mode(), PermissionMode::Default);
        assert_eq!(
            options.to_cli_args(),
            vec![
                "--output-format",
                "stream-json",
                "--input-format",
                "stream-json",
                "--verbose"
            ]
        );
        assert!(options.to_cli_env().is_empty());
    }

    #[test]
    fn test_full_cli_args() {
        let options = AgentOptions::builder()
            .model(models::SONNET)
            .append_system_prompt("Be brief")
            .max_turns(3)
            .max_budget_usd(0.5)
            .allowed_tools(["Read", "Grep"])
            .disallowed_tools(["Bash"])
            .permission_mode(PermissionMode::AcceptEdits)
            .resume("sess-1")
            .fork_session(true)
            .mcp_server("fs", McpServerConfig::stdio("fs-server", ["--root", "/tmp"]))
            .agent("reviewer", AgentDefinition::new("Reviews code", "You review code"))
            .add_dir("/data")
            .max_tokens(1024)
            .build()
            .unwrap();

        let args = options.to_cli_args();
        assert_eq!(flag_value(&args, "--model"), Some(models::SONNET));
        assert_eq!(flag_value(&args, "--append-system-prompt"), Some("Be brief"));
        assert_eq!(flag_value(&args, "--max-turns"), Some("3"));
        assert_eq!(flag_value(&args, "--max-budget-usd"), Some("0.5"));
        assert_eq!(flag_value(&args, "--allowedTools"), Some("Read,Grep"));
        assert_eq!(flag_value(&args, "--disallowedTools"), Some("Bash"));
        assert_eq!(flag_value(&args, "--permission-mode"), Some("acceptEdits"));
        assert_eq!(flag_value(&args, "--resume"), Some("sess-1"));
        assert_eq!(flag_value(&args, "--add-dir"), Some("/data"));
        assert!(args.contains(&"--fork-session".to_string()));

        let mcp: Value = serde_json::from_str(flag_value(&args, "--mcp-config").unwrap()).unwrap();
        assert_eq!(mcp["mcpServers"]["fs"]["command"], "fs-server");

        let agents: Value = serde_json::from_str(flag_value(&args, "--agents").unwrap()).unwrap();
        assert_eq!(agents["reviewer"]["description"], "Reviews code");

        assert_eq!(
            options.to_cli_env(),
            vec![(MAX_OUTPUT_TOKENS_ENV.to_string(), "1024".to_string())]
        );
    }

    #[test]
    fn test_bypass_sandboxed_uses_skip_flag() {
        let options = AgentOptions::builder()
            .permission_mode(PermissionMode::DangerouslySkipPermissions)
            .build()
            .unwrap();
        let args = options.to_cli_args();
        assert!(args.contains(&"--dangerously-skip-permissions".to_string()));
        assert!(!args.contains(&"--permission-mode".to_string()));
    }

    #[test]
    fn test_schema_is_serialized() {
        let schema = JsonSchema::of_object([("answer", json!({"type": "number"}))], ["answer"]);
        let options = AgentOptions::builder().output_schema(schema).build().unwrap();
        let args = options.to_cli_args();
        let parsed: Value = serde_json::from_str(flag_value(&args, "--json-schema").unwrap()).unwrap();
        assert_eq!(parsed["required"], json!(["answer"]));
    }

    #[test]
    fn test_agents_json_merges_with_definitions() {
        let options = AgentOptions::builder()
            .agent("a", AgentDefinition::new("first", "p1"))
            .agents_json(r#"{"b": {"description": "second", "prompt": "p2"}}"#)
            .build()
            .unwrap();
        assert_eq!(options.agents().len(), 2);
    }

    #[test]
    fn test_extra_args() {
        let options = AgentOptions::builder()
            .extra_arg("debug-to-stderr", None)
            .extra_arg("--betas", Some("x".into()))
            .build()
            .unwrap();
        let args = options.to_cli_args();
        assert!(args.contains(&"--debug-to-stderr".to_string()));
        assert_eq!(flag_value(&args, "--betas"), Some("x"));
    }

    #[rstest]
    #[case::conflict(AgentOptions::builder().allowed_tools(["Bash"]).disallowed_tools(["Bash"]), "both allowed and disallowed")]
    #[case::bad_agents(AgentOptions::builder().agents_json("{nope"), "agents JSON is invalid")]
    #[case::agents_not_object(AgentOptions::builder().agents_json("[1]"), "must be an object")]
    #[case::schema_not_object(AgentOptions::builder().output_schema_value(json!("object")), "output schema")]
    #[case::schema_does_not_compile(AgentOptions::builder().output_schema_value(json!({"type": 5})), "invalid JSON schema")]
    #[case::property_schema_does_not_compile(
        AgentOptions::builder().output_schema(JsonSchema::of_object([("n", json!({"minimum": "zero"}))], ["n"])),
        "output schema"
    )]
    #[case::negative_budget(AgentOptions::builder().max_budget_usd(-1.0), "max_budget_usd")]
    #[case::zero_timeout(AgentOptions::builder().timeout(Duration::ZERO), "timeout")]
    #[case::zero_turns(AgentOptions::builder().max_turns(0), "max_turns")]
    fn test_illegal_configuration(#[case] builder: AgentOptionsBuilder, #[case] needle: &str) {
        let err = builder.build().unwrap_err();
        assert!(
            matches!(&err, AgentError::IllegalConfiguration(msg) if msg.contains(needle)),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_resume_and_fork_together_are_permitted() {
        let options = AgentOptions::builder()
            .resume("parent")
            .fork_session(true)
            .build()
            .unwrap();
        assert_eq!(options.resume(), Some("parent"));
        assert!(options.fork_session());
    }

    #[test]
    fn test_resuming_replaces_target() {
        let options = AgentOptions::builder()
            .continue_conversation(true)
            .build()
            .unwrap()
            .resuming("other");
        let args = options.to_cli_args();
        assert_eq!(flag_value(&args, "--resume"), Some("other"));
        assert!(!args.contains(&"--continue".to_string()));
    }

    #[test]
    fn test_turn_timeout_override() {
        let options = AgentOptions::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap();
        let mut settings = ClientSettings::default();
        assert_eq!(settings.turn_timeout(&options), Duration::from_secs(30));
        settings.timeout = Some(Duration::from_secs(5));
        assert_eq!(settings.turn_timeout(&options), Duration::from_secs(5));
    }
}
