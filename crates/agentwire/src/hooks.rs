//! Hook registry and dispatcher
//!
//! Hooks gate and observe tool execution. A [`HookRegistry`] holds callbacks
//! keyed by phase and an optional [`HookMatcher`]; the [`HookDispatcher`]
//! answers the agent's `hook_callback` control requests by running them.
//!
//! Dispatch order is fixed: hooks with a tool filter run before wildcard
//! hooks, each group in registration order. For the pre-tool-use phase the
//! first `Block` wins and later hooks are not run. A pre hook that fails,
//! panics or times out blocks the call with a synthesized reason. Post hooks
//! all run; their failures are logged and swallowed.
//!
//! # Example
//!
//! ```
//! use agentwire::hooks::HookRegistry;
//! use agentwire_protocol::{HookMatcher, HookOutput};
//!
//! let hooks = HookRegistry::new();
//! hooks.register_pre_tool_use_fn(HookMatcher::tool("Bash"), |input| {
//!     match input.str_argument("command") {
//!         Some(cmd) if cmd.contains("rm -rf") => HookOutput::block("destructive command"),
//!         _ => HookOutput::allow(),
//!     }
//! });
//! assert_eq!(hooks.len(), 1);
//! ```

use crate::config::DEFAULT_HOOK_LOG_CAPACITY;
use crate::error::{AgentError, Result};
use agentwire_protocol::control::callback_event;
use agentwire_protocol::{HookEvent, HookInput, HookMatcher, HookOutput};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use uuid::Uuid;

/// Future returned by asynchronous hook callbacks
pub type HookFuture = Pin<Box<dyn Future<Output = Result<HookOutput>> + Send>>;

type AsyncHook = Arc<dyn Fn(HookInput) -> HookFuture + Send + Sync>;
type BlockingHook = Arc<dyn Fn(HookInput) -> HookOutput + Send + Sync>;

#[derive(Clone)]
enum HookCallback {
    Async(AsyncHook),
    Blocking(BlockingHook),
}

struct RegisteredHook {
    id: Uuid,
    event: HookEvent,
    matcher: HookMatcher,
    callback: HookCallback,
}

/// Handle for a registered hook (allows deregistration)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookHandle {
    id: Uuid,
    event: HookEvent,
}

impl HookHandle {
    /// Phase the hook is registered for
    pub fn event(&self) -> HookEvent {
        self.event
    }
}

/// How malformed hook input is treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HookInputPolicy {
    /// Missing fields are treated as absent
    #[default]
    Lenient,
    /// Missing fields are a hook error; pre-tool-use calls are blocked
    Strict,
}

/// Registry of hook callbacks
///
/// Registration and dispatch may happen concurrently; lookups take a read
/// lock and see a consistent snapshot.
#[derive(Default)]
pub struct HookRegistry {
    hooks: RwLock<Vec<RegisteredHook>>,
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hooks", &self.len())
            .finish()
    }
}

impl HookRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered hooks
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no hooks are registered
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Register an async pre-tool-use hook for every tool
    pub fn register_pre_tool_use<F, Fut>(&self, handler: F) -> HookHandle
    where
        F: Fn(HookInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HookOutput>> + Send + 'static,
    {
        self.register_pre_tool_use_for(HookMatcher::new(), handler)
    }

    /// Register an async pre-tool-use hook for the tools `matcher` selects
    pub fn register_pre_tool_use_for<F, Fut>(&self, matcher: HookMatcher, handler: F) -> HookHandle
    where
        F: Fn(HookInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HookOutput>> + Send + 'static,
    {
        let callback: AsyncHook = Arc::new(move |input| Box::pin(handler(input)));
        self.insert(HookEvent::PreToolUse, matcher, HookCallback::Async(callback))
    }

    /// Register a synchronous pre-tool-use hook
    ///
    /// The closure runs on the blocking thread pool.
    pub fn register_pre_tool_use_fn<F>(&self, matcher: HookMatcher, handler: F) -> HookHandle
    where
        F: Fn(HookInput) -> HookOutput + Send + Sync + 'static,
    {
        self.insert(
            HookEvent::PreToolUse,
            matcher,
            HookCallback::Blocking(Arc::new(handler)),
        )
    }

    /// Register an async post-tool-use observer for every tool
    pub fn register_post_tool_use<F, Fut>(&self, handler: F) -> HookHandle
    where
        F: Fn(HookInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.register_post_tool_use_for(HookMatcher::new(), handler)
    }

    /// Register an async post-tool-use observer for the tools `matcher` selects
    pub fn register_post_tool_use_for<F, Fut>(&self, matcher: HookMatcher, handler: F) -> HookHandle
    where
        F: Fn(HookInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let callback: AsyncHook = Arc::new(move |input| {
            let fut = handler(input);
            Box::pin(async move { fut.await.map(|()| HookOutput::Allow) })
        });
        self.insert(HookEvent::PostToolUse, matcher, HookCallback::Async(callback))
    }

    /// Register a synchronous post-tool-use observer
    pub fn register_post_tool_use_fn<F>(&self, matcher: HookMatcher, handler: F) -> HookHandle
    where
        F: Fn(HookInput) + Send + Sync + 'static,
    {
        let callback: BlockingHook = Arc::new(move |input| {
            handler(input);
            HookOutput::Allow
        });
        self.insert(HookEvent::PostToolUse, matcher, HookCallback::Blocking(callback))
    }

    /// Remove a hook; returns false if it was already gone
    pub fn deregister(&self, handle: &HookHandle) -> bool {
        let mut hooks = self.hooks.write().unwrap_or_else(PoisonError::into_inner);
        let before = hooks.len();
        hooks.retain(|hook| hook.id != handle.id);
        hooks.len() != before
    }

    fn insert(&self, event: HookEvent, matcher: HookMatcher, callback: HookCallback) -> HookHandle {
        let id = Uuid::new_v4();
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RegisteredHook {
                id,
                event,
                matcher,
                callback,
            });
        HookHandle { id, event }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<RegisteredHook>> {
        self.hooks.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Callbacks that apply to `input`, in dispatch order
    fn matching(&self, input: &HookInput) -> Vec<HookCallback> {
        let hooks = self.read();
        let applicable = hooks.iter().filter(|hook| {
            hook.event == input.event()
                && hook.matcher.matches(input.tool_name(), input.tool_input())
        });
        let (wildcard, specific): (Vec<_>, Vec<_>) =
            applicable.partition(|hook| hook.matcher.is_wildcard());

        specific
            .into_iter()
            .chain(wildcard)
            .map(|hook| hook.callback.clone())
            .collect()
    }
}

/// What happened to one dispatched tool call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookDecision {
    /// Every pre hook allowed the call
    Allowed,
    /// A pre hook blocked the call
    Blocked {
        /// Reason given to the agent
        reason: String,
    },
    /// Post hooks ran
    Observed,
    /// At least one post hook failed
    Failed {
        /// The failure
        reason: String,
    },
}

/// One entry of the hook log
#[derive(Debug, Clone, PartialEq)]
pub struct HookLogEntry {
    /// Phase dispatched
    pub phase: HookEvent,
    /// Tool the call was about
    pub tool_name: String,
    /// Invocation id, when the agent supplied one
    pub tool_use_id: Option<String>,
    /// Outcome
    pub decision: HookDecision,
    /// When the dispatch finished
    pub timestamp: DateTime<Utc>,
}

impl HookLogEntry {
    /// Whether the call was blocked
    pub fn is_block(&self) -> bool {
        matches!(self.decision, HookDecision::Blocked { .. })
    }

    /// Block or failure reason
    pub fn reason(&self) -> Option<&str> {
        match &self.decision {
            HookDecision::Blocked { reason } | HookDecision::Failed { reason } => Some(reason),
            HookDecision::Allowed | HookDecision::Observed => None,
        }
    }
}

/// Shared record of the most recent hook dispatches
///
/// Holds at most `capacity` entries; the oldest entry is dropped to make room.
#[derive(Debug, Clone)]
pub struct HookLog {
    entries: Arc<Mutex<VecDeque<HookLogEntry>>>,
    capacity: usize,
}

impl Default for HookLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HOOK_LOG_CAPACITY)
    }
}

impl HookLog {
    /// Log keeping the last `capacity` dispatches
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(64)))),
            capacity: capacity.max(1),
        }
    }

    /// Snapshot of the retained entries, oldest first
    pub fn entries(&self) -> Vec<HookLogEntry> {
        self.lock().iter().cloned().collect()
    }

    /// Entries for calls that were blocked
    pub fn blocked(&self) -> Vec<HookLogEntry> {
        self.lock().iter().filter(|e| e.is_block()).cloned().collect()
    }

    /// Remove and return the retained entries, oldest first
    pub fn drain(&self) -> Vec<HookLogEntry> {
        self.lock().drain(..).collect()
    }

    /// Maximum number of retained entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn push(&self, entry: HookLogEntry) {
        let mut entries = self.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<HookLogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs registered hooks for the agent's `hook_callback` requests
#[derive(Debug, Clone)]
pub struct HookDispatcher {
    registry: Arc<HookRegistry>,
    timeout: Duration,
    policy: HookInputPolicy,
    log: HookLog,
}

impl HookDispatcher {
    /// Create a dispatcher over `registry`
    pub fn new(registry: Arc<HookRegistry>, timeout: Duration, policy: HookInputPolicy) -> Self {
        Self {
            registry,
            timeout,
            policy,
            log: HookLog::default(),
        }
    }

    /// Replace the dispatch log with one keeping the last `capacity` entries
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log = HookLog::with_capacity(capacity);
        self
    }

    /// The dispatch log
    pub fn log(&self) -> &HookLog {
        &self.log
    }

    /// Answer a `hook_callback` control request
    ///
    /// Returns the response body; an error means the request itself could not
    /// be attributed to a phase and should be answered with a control error.
    pub async fn handle_callback(
        &self,
        callback_id: &str,
        input: &Value,
        tool_use_id: Option<&str>,
    ) -> Result<Value> {
        let event = callback_event(callback_id)
            .or_else(|| {
                input
                    .get("hook_event_name")
                    .and_then(Value::as_str)
                    .and_then(HookEvent::from_wire)
            })
            .ok_or_else(|| AgentError::Hook(format!("unknown hook callback '{callback_id}'")))?;

        let mut payload = input.clone();
        if let Value::Object(fields) = &mut payload {
            fields
                .entry("hook_event_name")
                .or_insert_with(|| Value::String(event.as_str().to_string()));
        }

        let parsed = match self.policy {
            HookInputPolicy::Strict => HookInput::parse(&payload, tool_use_id)
                .map_err(|e| AgentError::Hook(format!("malformed hook input: {e}"))),
            HookInputPolicy::Lenient => HookInput::parse_lenient(&payload, tool_use_id)
                .ok_or_else(|| AgentError::Hook("malformed hook input".into())),
        };

        let output = match parsed {
            Ok(input) => match event {
                HookEvent::PreToolUse => self.dispatch_pre(input).await,
                HookEvent::PostToolUse => {
                    self.dispatch_post(input).await;
                    HookOutput::Allow
                }
            },
            Err(e) => self.reject_malformed(event, payload_tool(&payload), tool_use_id, e),
        };

        Ok(output.to_wire(event))
    }

    /// Run pre-tool-use hooks; the first block wins
    pub async fn dispatch_pre(&self, input: HookInput) -> HookOutput {
        let mut output = HookOutput::Allow;
        for callback in self.registry.matching(&input) {
            match self.run(callback, input.clone()).await {
                Ok(HookOutput::Allow) => {}
                Ok(block) => {
                    output = block;
                    break;
                }
                Err(reason) => {
                    tracing::warn!(tool = %input.tool_name(), %reason, "pre-tool-use hook failed; blocking call");
                    output = HookOutput::block(reason);
                    break;
                }
            }
        }

        let decision = match &output {
            HookOutput::Allow => HookDecision::Allowed,
            HookOutput::Block { reason } => {
                tracing::info!(tool = %input.tool_name(), %reason, "tool call blocked by hook");
                HookDecision::Blocked {
                    reason: reason.clone(),
                }
            }
        };
        self.record(&input, decision);
        output
    }

    /// Run every post-tool-use hook; failures are logged
    pub async fn dispatch_post(&self, input: HookInput) {
        let mut failures = Vec::new();
        for callback in self.registry.matching(&input) {
            if let Err(reason) = self.run(callback, input.clone()).await {
                tracing::warn!(tool = %input.tool_name(), %reason, "post-tool-use hook failed");
                failures.push(reason);
            }
        }

        let decision = if failures.is_empty() {
            HookDecision::Observed
        } else {
            HookDecision::Failed {
                reason: failures.join("; "),
            }
        };
        self.record(&input, decision);
    }

    async fn run(&self, callback: HookCallback, input: HookInput) -> std::result::Result<HookOutput, String> {
        let mut task = match callback {
            HookCallback::Async(f) => tokio::spawn(async move { f(input).await }),
            HookCallback::Blocking(f) => tokio::task::spawn_blocking(move || Ok(f(input))),
        };

        match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(Ok(Ok(output))) => Ok(output),
            Ok(Ok(Err(e))) => Err(e.to_string()),
            Ok(Err(join)) if join.is_panic() => Err("hook panicked".into()),
            Ok(Err(join)) => Err(format!("hook task failed: {join}")),
            Err(_) => {
                task.abort();
                Err(format!("hook timed out after {:?}", self.timeout))
            }
        }
    }

    fn reject_malformed(
        &self,
        event: HookEvent,
        tool_name: &str,
        tool_use_id: Option<&str>,
        error: AgentError,
    ) -> HookOutput {
        let reason = error.to_string();
        tracing::warn!(phase = %event, tool = %tool_name, %reason, "rejecting hook input");

        let (output, decision) = match event {
            HookEvent::PreToolUse => (
                HookOutput::block(reason.clone()),
                HookDecision::Blocked { reason },
            ),
            HookEvent::PostToolUse => (HookOutput::Allow, HookDecision::Failed { reason }),
        };
        self.log.push(HookLogEntry {
            phase: event,
            tool_name: tool_name.to_string(),
            tool_use_id: tool_use_id.map(String::from),
            decision,
            timestamp: Utc::now(),
        });
        output
    }

    fn record(&self, input: &HookInput, decision: HookDecision) {
        self.log.push(HookLogEntry {
            phase: input.event(),
            tool_name: input.tool_name().to_string(),
            tool_use_id: input.tool_use_id().map(String::from),
            decision,
            timestamp: Utc::now(),
        });
    }
}

fn payload_tool(payload: &Value) -> &str {
    payload
        .get("tool_name")
        .and_then(Value::as_str)
        .unwrap_or_default()
}
