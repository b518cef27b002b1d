//! Scripted agent for tests
//!
//! [`ScriptedAgent`] stands in for the CLI. It is a [`TransportFactory`]: every
//! process the session launches becomes a [`ScriptedTransport`] that speaks
//! the real stream-json protocol. For each submitted prompt it replays the
//! next queued [`ScriptedTurn`]: a `system/init` frame, assistant and tool
//! frames, hook callbacks and permission prompts that wait for the client's
//! control response, and finally a result.
//!
//! The agent keeps a table of sessions shared by all its processes, so resume
//! and fork behave the way they do against the CLI: resuming an unknown id
//! fails the turn, forking copies the parent's turn count into a new id.
//!
//! ```
//! use agentwire::testing::{ScriptedAgent, ScriptedTurn};
//! use agentwire::ClaudeClient;
//!
//! # fn main() -> agentwire::Result<()> {
//! let agent = ScriptedAgent::new();
//! agent.push_turn(ScriptedTurn::new().text("4"));
//!
//! let client = ClaudeClient::sync().transport_factory(agent.clone()).build()?;
//! assert_eq!(client.connect_text("What is 2+2?")?, "4");
//! # Ok(())
//! # }
//! ```

use crate::session::TransportFactory;
use agentwire_protocol::control::{POST_TOOL_USE_CALLBACK_ID, PRE_TOOL_USE_CALLBACK_ID};
use agentwire_protocol::Usage;
use agentwire_transport::{ProcessConfig, Result, Transport, TransportError};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

const REPLY_TIMEOUT: Duration = Duration::from_secs(30);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
enum Step {
    Text(String),
    Thinking(String),
    Tool {
        name: String,
        input: Value,
        output: Value,
    },
    Raw(String),
    HangUntilInterrupted,
    CloseStream,
    Delay(Duration),
}

/// What the agent does for one prompt
#[derive(Debug, Clone)]
pub struct ScriptedTurn {
    steps: Vec<Step>,
    cost_usd: f64,
    usage: Usage,
    subtype: String,
    result_text: Option<String>,
    structured_output: Option<Value>,
}

impl Default for ScriptedTurn {
    fn default() -> Self {
        Self {
            steps: Vec::new(),
            cost_usd: 0.01,
            usage: Usage::new(100, 50),
            subtype: "success".into(),
            result_text: None,
            structured_output: None,
        }
    }
}

impl ScriptedTurn {
    /// An empty turn that succeeds
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit an assistant text block
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.steps.push(Step::Text(text.into()));
        self
    }

    /// Emit an assistant thinking block
    pub fn thinking(mut self, thinking: impl Into<String>) -> Self {
        self.steps.push(Step::Thinking(thinking.into()));
        self
    }

    /// Try to use a tool
    ///
    /// The call is skipped when the tool is not allowed, refused when a
    /// permission prompt or pre hook denies it, and otherwise produces
    /// `output` as its result.
    pub fn tool(mut self, name: impl Into<String>, input: Value, output: impl Into<Value>) -> Self {
        self.steps.push(Step::Tool {
            name: name.into(),
            input,
            output: output.into(),
        });
        self
    }

    /// Emit a raw output line verbatim
    pub fn raw_frame(mut self, line: impl Into<String>) -> Self {
        self.steps.push(Step::Raw(line.into()));
        self
    }

    /// Stall until interrupted, then end with an interrupted error
    pub fn hang_until_interrupted(mut self) -> Self {
        self.steps.push(Step::HangUntilInterrupted);
        self
    }

    /// Close the output stream, as a crashing process would
    pub fn close_stream(mut self) -> Self {
        self.steps.push(Step::CloseStream);
        self
    }

    /// Pause before the next step
    pub fn delay(mut self, delay: Duration) -> Self {
        self.steps.push(Step::Delay(delay));
        self
    }

    /// Cost reported by the result
    pub fn cost(mut self, cost_usd: f64) -> Self {
        self.cost_usd = cost_usd;
        self
    }

    /// Usage reported by the result
    pub fn usage(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.usage = Usage::new(input_tokens, output_tokens);
        self
    }

    /// Result subtype; anything but `success` is an error
    pub fn subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = subtype.into();
        self
    }

    /// Result text; defaults to the concatenated assistant text
    pub fn result_text(mut self, text: impl Into<String>) -> Self {
        self.result_text = Some(text.into());
        self
    }

    /// Structured payload attached to the result
    pub fn structured_output(mut self, value: Value) -> Self {
        self.structured_output = Some(value);
        self
    }
}

#[derive(Default)]
struct AgentInner {
    scripts: Mutex<VecDeque<ScriptedTurn>>,
    sessions: Mutex<HashMap<String, u32>>,
    launches: Mutex<Vec<Vec<String>>>,
    written: Mutex<Vec<Value>>,
    session_counter: AtomicU64,
    fail_launch: AtomicBool,
}

impl AgentInner {
    fn new_session_id(&self) -> String {
        let n = self.session_counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("scripted-session-{n}")
    }
}

/// A fake agent shared by every process a session launches
#[derive(Clone, Default)]
pub struct ScriptedAgent {
    inner: Arc<AgentInner>,
}

impl std::fmt::Debug for ScriptedAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedAgent")
            .field("queued_turns", &lock(&self.inner.scripts).len())
            .field("sessions", &*lock(&self.inner.sessions))
            .finish()
    }
}

impl ScriptedAgent {
    /// An agent with no queued turns; unscripted prompts are answered `ok`
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the agent's behaviour for the next prompt
    pub fn push_turn(&self, turn: ScriptedTurn) -> &Self {
        lock(&self.inner.scripts).push_back(turn);
        self
    }

    /// Make every later launch fail
    pub fn fail_launches(&self) {
        self.inner.fail_launch.store(true, Ordering::SeqCst);
    }

    /// Argument lists of every launch, in order
    pub fn launches(&self) -> Vec<Vec<String>> {
        lock(&self.inner.launches).clone()
    }

    /// Every frame the client wrote, across all processes
    pub fn written_frames(&self) -> Vec<Value> {
        lock(&self.inner.written).clone()
    }

    /// Client control requests with the given subtype
    pub fn control_requests(&self, subtype: &str) -> Vec<Value> {
        self.written_frames()
            .into_iter()
            .filter(|frame| {
                frame["type"] == "control_request" && frame["request"]["subtype"] == subtype
            })
            .collect()
    }

    /// Prompts submitted so far
    pub fn prompts(&self) -> Vec<String> {
        self.written_frames()
            .into_iter()
            .filter(|frame| frame["type"] == "user")
            .filter_map(|frame| frame["message"]["content"].as_str().map(String::from))
            .collect()
    }

    /// Turns the agent has run on `session_id`
    pub fn session_turns(&self, session_id: &str) -> Option<u32> {
        lock(&self.inner.sessions).get(session_id).copied()
    }
}

impl TransportFactory for ScriptedAgent {
    fn create(&self, config: ProcessConfig) -> Arc<dyn Transport> {
        Arc::new(ScriptedTransport::new(Arc::clone(&self.inner), config))
    }
}

/// Flags the scripted process reads from its command line
#[derive(Debug, Default)]
struct LaunchFlags {
    resume: Option<String>,
    fork: bool,
    allowed: HashSet<String>,
    disallowed: HashSet<String>,
    permission_prompt: bool,
}

impl LaunchFlags {
    fn parse(args: &[String]) -> Self {
        let mut flags = Self::default();
        let mut args = args.iter();
        while let Some(arg) = args.next() {
            let list = |value: Option<&String>| -> HashSet<String> {
                value
                    .map(|v| v.split(',').map(String::from).collect())
                    .unwrap_or_default()
            };
            match arg.as_str() {
                "--resume" => flags.resume = args.next().cloned(),
                "--fork-session" => flags.fork = true,
                "--allowedTools" => flags.allowed = list(args.next()),
                "--disallowedTools" => flags.disallowed = list(args.next()),
                "--permission-prompt-tool" => flags.permission_prompt = args.next().is_some(),
                _ => {}
            }
        }
        flags
    }
}

struct ProcessState {
    agent: Arc<AgentInner>,
    flags: LaunchFlags,
    session_id: Mutex<String>,
    missing_resume: Mutex<Option<String>>,
    outbox: Mutex<Option<mpsc::UnboundedSender<String>>>,
    replies: Mutex<HashMap<String, oneshot::Sender<Value>>>,
    callbacks: Mutex<HashMap<String, String>>,
    interrupted: watch::Sender<bool>,
    request_seq: AtomicU64,
    tool_seq: AtomicU64,
}

impl ProcessState {
    fn emit(&self, frame: Value) {
        self.emit_line(frame.to_string());
    }

    fn emit_line(&self, line: String) {
        if let Some(outbox) = lock(&self.outbox).as_ref() {
            let _ = outbox.send(line);
        }
    }

    fn respond(&self, request_id: &str, body: Value) {
        self.emit(json!({
            "type": "control_response",
            "response": {"subtype": "success", "request_id": request_id, "response": body},
        }));
    }

    fn respond_error(&self, request_id: &str, error: &str) {
        self.emit(json!({
            "type": "control_response",
            "response": {"subtype": "error", "request_id": request_id, "error": error},
        }));
    }

    /// Ask the client something and wait for its control response
    async fn ask(&self, request: Value) -> Option<Value> {
        let request_id = format!(
            "agent_req_{}",
            self.request_seq.fetch_add(1, Ordering::Relaxed)
        );
        let (tx, rx) = oneshot::channel();
        lock(&self.replies).insert(request_id.clone(), tx);
        self.emit(json!({
            "type": "control_request",
            "request_id": request_id,
            "request": request,
        }));
        match tokio::time::timeout(REPLY_TIMEOUT, rx).await {
            Ok(Ok(reply)) if reply["subtype"] == "success" => Some(reply["response"].clone()),
            _ => None,
        }
    }

    fn session_id(&self) -> String {
        lock(&self.session_id).clone()
    }
}

/// One scripted agent process
pub struct ScriptedTransport {
    state: Arc<ProcessState>,
    args: Vec<String>,
    inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl ScriptedTransport {
    fn new(agent: Arc<AgentInner>, config: ProcessConfig) -> Self {
        let (outbox, inbox) = mpsc::unbounded_channel();
        let (interrupted, _) = watch::channel(false);
        let flags = LaunchFlags::parse(&config.args);

        Self {
            state: Arc::new(ProcessState {
                agent,
                flags,
                session_id: Mutex::new(String::new()),
                missing_resume: Mutex::new(None),
                outbox: Mutex::new(Some(outbox)),
                replies: Mutex::new(HashMap::new()),
                callbacks: Mutex::new(HashMap::new()),
                interrupted,
                request_seq: AtomicU64::new(0),
                tool_seq: AtomicU64::new(0),
            }),
            args: config.args,
            inbox: tokio::sync::Mutex::new(inbox),
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    fn handle_control_request(&self, frame: &Value) {
        let state = &self.state;
        let request_id = frame["request_id"].as_str().unwrap_or_default();
        let request = &frame["request"];

        match request["subtype"].as_str().unwrap_or_default() {
            "initialize" => {
                let mut callbacks = lock(&state.callbacks);
                for (event, fallback) in [
                    ("PreToolUse", PRE_TOOL_USE_CALLBACK_ID),
                    ("PostToolUse", POST_TOOL_USE_CALLBACK_ID),
                ] {
                    if let Some(id) = request["hooks"][event][0]["hookCallbackIds"][0].as_str() {
                        callbacks.insert(event.to_string(), id.to_string());
                    } else if request["hooks"][event].is_array() {
                        callbacks.insert(event.to_string(), fallback.to_string());
                    }
                }
                drop(callbacks);
                state.respond(request_id, json!({"commands": [], "models": []}));
            }
            "interrupt" => {
                state.interrupted.send_replace(true);
                state.respond(request_id, json!({}));
            }
            "set_model" | "set_permission_mode" => state.respond(request_id, json!({})),
            other => state.respond_error(request_id, &format!("unsupported: {other}")),
        }
    }

    fn handle_control_response(&self, frame: &Value) {
        let response = &frame["response"];
        let Some(request_id) = response["request_id"].as_str() else {
            return;
        };
        if let Some(waiter) = lock(&self.state.replies).remove(request_id) {
            let _ = waiter.send(response.clone());
        }
    }

    fn start_turn(&self, prompt: String) {
        let script = lock(&self.state.agent.scripts)
            .pop_front()
            .unwrap_or_else(|| ScriptedTurn::new().text("ok"));
        self.state.interrupted.send_replace(false);
        let state = Arc::clone(&self.state);
        let task = tokio::spawn(async move { run_turn(state, prompt, script).await });
        lock(&self.tasks).push(task);
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn start(&self) -> Result<()> {
        let agent = &self.state.agent;
        if agent.fail_launch.load(Ordering::SeqCst) {
            return Err(TransportError::Launch("scripted launch failure".into()));
        }
        lock(&agent.launches).push(self.args.clone());

        let flags = &self.state.flags;
        let mut sessions = lock(&agent.sessions);
        let session_id = match &flags.resume {
            Some(parent) => match sessions.get(parent).copied() {
                Some(turns) if flags.fork => {
                    let forked = agent.new_session_id();
                    sessions.insert(forked.clone(), turns);
                    forked
                }
                Some(_) => parent.clone(),
                None => {
                    *lock(&self.state.missing_resume) = Some(parent.clone());
                    parent.clone()
                }
            },
            None => {
                let fresh = agent.new_session_id();
                sessions.insert(fresh.clone(), 0);
                fresh
            }
        };
        drop(sessions);

        *lock(&self.state.session_id) = session_id;
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn write_frame(&self, frame: &Value) -> Result<()> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        if lock(&self.state.outbox).is_none() {
            return Err(TransportError::Connection("scripted agent exited".into()));
        }
        lock(&self.state.agent.written).push(frame.clone());

        match frame["type"].as_str() {
            Some("control_request") => self.handle_control_request(frame),
            Some("control_response") => self.handle_control_response(frame),
            Some("user") => {
                let prompt = frame["message"]["content"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                self.start_turn(prompt);
            }
            _ => {}
        }
        Ok(())
    }

    async fn read_frame(&self) -> Result<Option<String>> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        Ok(self.inbox.lock().await.recv().await)
    }

    async fn close(&self) -> Result<()> {
        self.started.store(false, Ordering::SeqCst);
        lock(&self.state.outbox).take();
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.started.load(Ordering::SeqCst) && lock(&self.state.outbox).is_some()
    }
}

async fn run_turn(state: Arc<ProcessState>, prompt: String, script: ScriptedTurn) {
    let session_id = state.session_id();
    tracing::trace!(%session_id, %prompt, "scripted turn");

    state.emit(json!({
        "type": "system",
        "subtype": "init",
        "session_id": session_id,
        "model": "scripted",
        "tools": ["Read", "Grep", "Bash", "Write"],
    }));

    let missing = lock(&state.missing_resume).clone();
    if let Some(missing) = missing {
        state.emit(json!({
            "type": "result",
            "subtype": "error_during_execution",
            "is_error": true,
            "num_turns": 0,
            "session_id": session_id,
            "errors": [format!("No conversation found with session ID: {missing}")],
        }));
        return;
    }

    let mut text = String::new();
    for step in script.steps.iter().cloned() {
        match step {
            Step::Text(chunk) => {
                text.push_str(&chunk);
                state.emit(assistant(&session_id, json!([{"type": "text", "text": chunk}])));
            }
            Step::Thinking(thinking) => {
                state.emit(assistant(
                    &session_id,
                    json!([{"type": "thinking", "thinking": thinking}]),
                ));
            }
            Step::Tool {
                name,
                input,
                output,
            } => run_tool(&state, &session_id, name, input, output).await,
            Step::Raw(line) => state.emit_line(line),
            Step::Delay(delay) => tokio::time::sleep(delay).await,
            Step::CloseStream => {
                lock(&state.outbox).take();
                return;
            }
            Step::HangUntilInterrupted => {
                let mut interrupted = state.interrupted.subscribe();
                if interrupted.wait_for(|flag| *flag).await.is_ok() {
                    state.emit(json!({
                        "type": "result",
                        "subtype": "error_during_execution",
                        "is_error": true,
                        "num_turns": 1,
                        "session_id": session_id,
                        "errors": ["Request interrupted by user"],
                    }));
                }
                return;
            }
        }
    }

    let num_turns = {
        let mut sessions = lock(&state.agent.sessions);
        let turns = sessions.entry(session_id.clone()).or_insert(0);
        *turns += 1;
        *turns
    };

    let mut result = json!({
        "type": "result",
        "subtype": script.subtype,
        "is_error": script.subtype != "success",
        "duration_ms": 12,
        "duration_api_ms": 9,
        "num_turns": num_turns,
        "session_id": session_id,
        "total_cost_usd": script.cost_usd,
        "usage": serde_json::to_value(script.usage).unwrap_or(Value::Null),
        "result": script.result_text.unwrap_or(text),
    });
    if let Some(structured) = script.structured_output {
        result["structured_output"] = structured;
    }
    state.emit(result);
}

async fn run_tool(state: &ProcessState, session_id: &str, name: String, input: Value, output: Value) {
    let flags = &state.flags;
    let pre_approved = flags.allowed.contains(&name);
    if flags.disallowed.contains(&name)
        || (!flags.allowed.is_empty() && !pre_approved && !flags.permission_prompt)
    {
        return;
    }

    let tool_use_id = format!("toolu_{:04}", state.tool_seq.fetch_add(1, Ordering::Relaxed));
    state.emit(assistant(
        session_id,
        json!([{"type": "tool_use", "id": tool_use_id, "name": name, "input": input}]),
    ));

    let mut input = input;
    if flags.permission_prompt && !pre_approved {
        let answer = state
            .ask(json!({"subtype": "can_use_tool", "tool_name": name, "input": input}))
            .await;
        match answer {
            Some(body) if body["behavior"] == "allow" => {
                if !body["updatedInput"].is_null() {
                    input = body["updatedInput"].clone();
                }
            }
            body => {
                let message = body
                    .as_ref()
                    .and_then(|b| b["message"].as_str())
                    .unwrap_or("permission denied")
                    .to_string();
                state.emit(tool_result(session_id, &tool_use_id, json!(message), true));
                return;
            }
        }
    }

    let pre_callback = lock(&state.callbacks).get("PreToolUse").cloned();
    if let Some(callback_id) = pre_callback {
        let answer = state
            .ask(json!({
                "subtype": "hook_callback",
                "callback_id": callback_id,
                "tool_use_id": tool_use_id,
                "input": {
                    "hook_event_name": "PreToolUse",
                    "session_id": session_id,
                    "tool_name": name,
                    "tool_input": input,
                },
            }))
            .await
            .unwrap_or(Value::Null);
        let denied = answer["decision"] == "block"
            || answer["hookSpecificOutput"]["permissionDecision"] == "deny";
        if denied {
            let reason = answer["reason"].as_str().unwrap_or("blocked by hook");
            state.emit(tool_result(session_id, &tool_use_id, json!(reason), true));
            return;
        }
    }

    state.emit(tool_result(session_id, &tool_use_id, output.clone(), false));

    let post_callback = lock(&state.callbacks).get("PostToolUse").cloned();
    if let Some(callback_id) = post_callback {
        state
            .ask(json!({
                "subtype": "hook_callback",
                "callback_id": callback_id,
                "tool_use_id": tool_use_id,
                "input": {
                    "hook_event_name": "PostToolUse",
                    "session_id": session_id,
                    "tool_name": name,
                    "tool_input": input,
                    "tool_response": output,
                },
            }))
            .await;
    }
}

fn assistant(session_id: &str, content: Value) -> Value {
    json!({
        "type": "assistant",
        "message": {"role": "assistant", "model": "scripted", "content": content},
        "parent_tool_use_id": null,
        "session_id": session_id,
    })
}

fn tool_result(session_id: &str, tool_use_id: &str, content: Value, is_error: bool) -> Value {
    json!({
        "type": "user",
        "message": {
            "role": "user",
            "content": [{
                "type": "tool_result",
                "tool_use_id": tool_use_id,
                "content": content,
                "is_error": is_error,
            }],
        },
        "parent_tool_use_id": null,
        "session_id": session_id,
    })
}
