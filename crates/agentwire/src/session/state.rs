//! Session state
//!
//! [`SessionInfo`] is the caller-visible record of a conversation. The
//! engine-internal [`SessionState`] adds the lifecycle, the sender for the
//! turn in flight and bookkeeping the reader task needs. [`SessionShared`] is
//! the part of the engine both the public API and the reader task hold.

use crate::config::AgentOptions;
use crate::error::{AgentError, Result};
use crate::hooks::HookDispatcher;
use crate::permissions::PermissionCallback;
use agentwire_protocol::{JsonSchema, Message, ResultMessage, Usage};
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Snapshot of a conversation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionInfo {
    /// Id assigned by the agent; `None` until the first turn completes
    pub session_id: Option<String>,

    /// Session this one was forked from
    pub parent_session_id: Option<String>,

    /// Turns completed by this client on this session
    pub turn_count: u32,

    /// Agent turns (model round trips) reported by those turns
    pub agent_turns: u32,

    /// Cumulative cost in USD
    pub total_cost_usd: f64,

    /// Cumulative token usage
    pub usage: Usage,

    /// Whether the session can still take turns
    pub open: bool,
}

impl SessionInfo {
    /// Whether a query targeting `session_id` has to relaunch the agent
    pub(crate) fn needs_switch(&self, session_id: &str) -> bool {
        match &self.session_id {
            Some(current) => current != session_id,
            None => self.parent_session_id.as_deref() != Some(session_id),
        }
    }

    /// Fold a turn's result into the record
    ///
    /// The first reported id is adopted; a different id later means the agent
    /// moved the conversation (it does so on fork) and the new id wins.
    pub(crate) fn record(&mut self, result: &ResultMessage) {
        if !result.session_id.is_empty() {
            match &self.session_id {
                None => self.session_id = Some(result.session_id.clone()),
                Some(current) if *current != result.session_id => {
                    tracing::warn!(
                        previous = %current,
                        reported = %result.session_id,
                        "agent reported a different session id; adopting it"
                    );
                    self.session_id = Some(result.session_id.clone());
                }
                Some(_) => {}
            }
        }

        self.turn_count += 1;
        self.agent_turns += result.num_turns;
        self.total_cost_usd += result.cost_usd();
        if let Some(usage) = &result.usage {
            self.usage.accumulate(usage);
        }
    }
}

/// What a client has spent across every session it ran
///
/// Unlike [`SessionInfo`] this survives session switches, so the ceilings
/// checked against it cannot be reset by resuming or forking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientSpend {
    /// Turns completed
    pub turns: u32,

    /// Cost in USD
    pub cost_usd: f64,

    /// Token usage
    pub usage: Usage,
}

impl ClientSpend {
    fn record(&mut self, result: &ResultMessage) {
        self.turns += 1;
        self.cost_usd += result.cost_usd();
        if let Some(usage) = &result.usage {
            self.usage.accumulate(usage);
        }
    }
}

/// Where a session is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Built but `connect` not yet called
    Unconnected,
    /// Agent process running
    Connected {
        /// Whether a turn is waiting for its result
        turn_in_flight: bool,
    },
    /// Closed by the caller or by a fatal transport failure
    Closed,
}

pub(crate) struct SessionState {
    pub(crate) lifecycle: Lifecycle,
    pub(crate) info: SessionInfo,
    pub(crate) spend: ClientSpend,
    pub(crate) turn: Option<mpsc::UnboundedSender<Message>>,
    pub(crate) decode_errors: Vec<String>,
    pub(crate) interrupt_sent: bool,
    pub(crate) generation: u64,
}

impl SessionState {
    pub(crate) fn new() -> Self {
        Self {
            lifecycle: Lifecycle::Unconnected,
            info: SessionInfo::default(),
            spend: ClientSpend::default(),
            turn: None,
            decode_errors: Vec::new(),
            interrupt_sent: false,
            generation: 0,
        }
    }

    pub(crate) fn turn_in_flight(&self) -> bool {
        matches!(
            self.lifecycle,
            Lifecycle::Connected {
                turn_in_flight: true
            }
        )
    }

    /// Reserve the session for a new turn
    ///
    /// Nothing changes when the turn is rejected.
    pub(crate) fn begin_turn(
        &mut self,
        turn: mpsc::UnboundedSender<Message>,
        options: &AgentOptions,
    ) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Unconnected => {
                return Err(AgentError::InvalidState(
                    "query called before connect".into(),
                ));
            }
            Lifecycle::Closed => {
                return Err(AgentError::InvalidState("session is closed".into()));
            }
            Lifecycle::Connected {
                turn_in_flight: true,
            } => {
                return Err(AgentError::InvalidState(
                    "a turn is already in flight".into(),
                ));
            }
            Lifecycle::Connected {
                turn_in_flight: false,
            } => {}
        }
        self.check_ceilings(options)?;

        self.lifecycle = Lifecycle::Connected {
            turn_in_flight: true,
        };
        self.turn = Some(turn);
        self.decode_errors.clear();
        self.interrupt_sent = false;
        Ok(())
    }

    /// Fold a finished turn into the session record and the client totals
    pub(crate) fn record_turn(&mut self, result: &ResultMessage) {
        self.info.record(result);
        self.spend.record(result);
    }

    fn check_ceilings(&self, options: &AgentOptions) -> Result<()> {
        let spend = &self.spend;
        if let Some(budget) = options.max_budget_usd()
            && spend.cost_usd >= budget
        {
            return Err(AgentError::BudgetExceeded(format!(
                "spent ${:.4} of ${budget:.4}",
                spend.cost_usd
            )));
        }
        if let Some(turns) = options.max_session_turns()
            && spend.turns >= turns
        {
            return Err(AgentError::BudgetExceeded(format!(
                "client already ran {} of {turns} turns",
                spend.turns
            )));
        }
        if let Some(tokens) = options.max_session_tokens()
            && spend.usage.total_tokens() >= tokens
        {
            return Err(AgentError::BudgetExceeded(format!(
                "client already used {} of {tokens} tokens",
                spend.usage.total_tokens()
            )));
        }
        Ok(())
    }

    /// End the turn in flight, handing back its sender
    pub(crate) fn finish_turn(&mut self) -> Option<mpsc::UnboundedSender<Message>> {
        if let Lifecycle::Connected { turn_in_flight } = &mut self.lifecycle {
            *turn_in_flight = false;
        }
        self.interrupt_sent = false;
        self.turn.take()
    }

    /// Move to `Closed`, handing back the sender of a turn still in flight
    pub(crate) fn close(&mut self) -> Option<mpsc::UnboundedSender<Message>> {
        self.lifecycle = Lifecycle::Closed;
        self.info.open = false;
        self.generation += 1;
        self.interrupt_sent = false;
        self.turn.take()
    }
}

/// Observer of every message the session delivers
pub type MessageObserver = Arc<dyn Fn(&Message) + Send + Sync>;

/// Observer of every turn result
pub type ResultObserver = Arc<dyn Fn(&ResultMessage) + Send + Sync>;

type ControlWaiter = oneshot::Sender<std::result::Result<Value, String>>;

/// Engine state shared with the reader task
pub(crate) struct SessionShared {
    state: Mutex<SessionState>,
    pending: Mutex<HashMap<String, ControlWaiter>>,
    message_observers: RwLock<Vec<MessageObserver>>,
    result_observers: RwLock<Vec<ResultObserver>>,
    pub(crate) hooks: HookDispatcher,
    pub(crate) permission: Option<PermissionCallback>,
    pub(crate) permission_timeout: Duration,
    pub(crate) output_schema: Option<JsonSchema>,
}

impl SessionShared {
    pub(crate) fn new(
        hooks: HookDispatcher,
        permission: Option<PermissionCallback>,
        permission_timeout: Duration,
        output_schema: Option<JsonSchema>,
    ) -> Self {
        Self {
            state: Mutex::new(SessionState::new()),
            pending: Mutex::new(HashMap::new()),
            message_observers: RwLock::new(Vec::new()),
            result_observers: RwLock::new(Vec::new()),
            hooks,
            permission,
            permission_timeout,
            output_schema,
        }
    }

    /// Lock the state, recovering from a panicked holder
    pub(crate) fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn info(&self) -> SessionInfo {
        self.state().info.clone()
    }

    pub(crate) fn spend(&self) -> ClientSpend {
        self.state().spend.clone()
    }

    pub(crate) fn lifecycle(&self) -> Lifecycle {
        self.state().lifecycle
    }

    pub(crate) fn generation(&self) -> u64 {
        self.state().generation
    }

    pub(crate) fn add_message_observer(&self, observer: MessageObserver) {
        self.message_observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    pub(crate) fn add_result_observer(&self, observer: ResultObserver) {
        self.result_observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    pub(crate) fn register_waiter(&self, request_id: &str) -> oneshot::Receiver<std::result::Result<Value, String>> {
        let (tx, rx) = oneshot::channel();
        self.pending().insert(request_id.to_string(), tx);
        rx
    }

    pub(crate) fn forget_waiter(&self, request_id: &str) {
        self.pending().remove(request_id);
    }

    /// Hand a control response to whoever is waiting for it
    pub(crate) fn resolve(&self, request_id: &str, outcome: std::result::Result<Value, String>) {
        match self.pending().remove(request_id) {
            Some(waiter) => {
                let _ = waiter.send(outcome);
            }
            None => tracing::debug!(%request_id, "control response with no waiter"),
        }
    }

    /// Drop every waiter; their callers see the transport as gone
    pub(crate) fn fail_pending(&self) {
        self.pending().clear();
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<String, ControlWaiter>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver a non-terminal message to the turn in flight and observers
    pub(crate) fn publish(&self, message: Message) {
        let turn = self.state().turn.clone();
        self.deliver(message, turn);
    }

    /// Push to the turn's channel first, then to every observer
    pub(crate) fn deliver(&self, message: Message, turn: Option<mpsc::UnboundedSender<Message>>) {
        let observed = self.has_observers().then(|| message.clone());
        if let Some(turn) = turn {
            // The receiver is gone when the caller stopped reading the turn.
            let _ = turn.send(message);
        }
        if let Some(message) = observed {
            self.notify(&message);
        }
    }

    fn has_observers(&self) -> bool {
        let messages = self
            .message_observers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let results = self
            .result_observers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        !messages.is_empty() || !results.is_empty()
    }

    fn notify(&self, message: &Message) {
        let observers = self
            .message_observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in observers {
            if catch_unwind(AssertUnwindSafe(|| observer(message))).is_err() {
                tracing::warn!(message_type = %message.type_name(), "message observer panicked");
            }
        }

        if let Message::Result(result) = message {
            let observers = self
                .result_observers
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            for observer in observers {
                if catch_unwind(AssertUnwindSafe(|| observer(result))).is_err() {
                    tracing::warn!("result observer panicked");
                }
            }
        }
    }

    /// Record a frame that failed to decode against the turn in flight
    pub(crate) fn record_decode_error(&self, error: String) {
        let mut state = self.state();
        if state.turn_in_flight() {
            state.decode_errors.push(error);
        }
    }

    /// Close out the turn in flight with the agent's result
    pub(crate) fn complete_turn(&self, mut result: ResultMessage) {
        self.finalize_structured_output(&mut result);

        let turn = {
            let mut state = self.state();
            if state.turn_in_flight() {
                for error in state.decode_errors.drain(..) {
                    result.mark_error(format!("undecodable frame: {error}"));
                }
                state.record_turn(&result);
                state.finish_turn()
            } else {
                tracing::warn!(session_id = %result.session_id, "result received with no turn in flight");
                None
            }
        };

        tracing::debug!(
            session_id = %result.session_id,
            subtype = %result.subtype,
            is_error = result.is_error,
            "turn finished"
        );
        self.deliver(Message::Result(result), turn);
    }

    /// The agent's output ended; close the session if this reader is current
    pub(crate) fn stream_ended(&self, generation: u64, reason: &str) {
        let turn = {
            let mut state = self.state();
            if state.generation != generation {
                return;
            }
            if matches!(state.lifecycle, Lifecycle::Connected { .. }) {
                tracing::warn!(%reason, "agent stream ended; closing session");
                let turn = state.close();
                turn.map(|turn| {
                    let session_id = state.info.session_id.clone().unwrap_or_default();
                    (turn, session_id)
                })
            } else {
                None
            }
        };

        if let Some((turn, session_id)) = turn {
            let result = ResultMessage::synthesized("error_stream_closed", session_id, reason);
            self.deliver(Message::Result(result), Some(turn));
        }
        self.fail_pending();
    }

    fn finalize_structured_output(&self, result: &mut ResultMessage) {
        let Some(schema) = &self.output_schema else {
            return;
        };
        if result.is_error {
            return;
        }

        if result.structured_output.is_none() {
            result.structured_output = result.result.as_deref().and_then(parse_json_text);
        }
        let verdict = match &result.structured_output {
            Some(payload) => schema
                .validate(payload)
                .map_err(|e| format!("structured output does not match schema: {e}")),
            None => Err("structured output missing: result text is not JSON".to_string()),
        };
        if let Err(error) = verdict {
            tracing::warn!(%error, "rejecting structured output");
            result.mark_error(error);
        }
    }
}

/// Parse prose that should be a JSON document, tolerating a code fence
fn parse_json_text(text: &str) -> Option<Value> {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        body = rest.strip_suffix("```").unwrap_or(rest).trim();
    }
    serde_json::from_str(body).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{HookInputPolicy, HookRegistry};
    use rstest::rstest;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn shared(schema: Option<JsonSchema>) -> SessionShared {
        let hooks = HookDispatcher::new(
            Arc::new(HookRegistry::new()),
            Duration::from_secs(1),
            HookInputPolicy::default(),
        );
        SessionShared::new(hooks, None, Duration::from_secs(1), schema)
    }

    fn connected(shared: &SessionShared) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = shared.state();
        state.lifecycle = Lifecycle::Connected {
            turn_in_flight: false,
        };
        state.info.open = true;
        state.begin_turn(tx, &AgentOptions::default()).unwrap();
        rx
    }

    fn result(session_id: &str, cost: f64) -> ResultMessage {
        ResultMessage {
            subtype: "success".into(),
            num_turns: 2,
            session_id: session_id.into(),
            total_cost_usd: Some(cost),
            usage: Some(Usage::new(10, 5)),
            result: Some("done".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_begin_turn_rejects_bad_states() {
        let options = AgentOptions::default();
        let mut state = SessionState::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(
            state.begin_turn(tx.clone(), &options),
            Err(AgentError::InvalidState(_))
        ));

        state.lifecycle = Lifecycle::Connected {
            turn_in_flight: false,
        };
        state.begin_turn(tx.clone(), &options).unwrap();
        assert!(matches!(
            state.begin_turn(tx.clone(), &options),
            Err(AgentError::InvalidState(msg)) if msg.contains("in flight")
        ));

        state.close();
        assert!(matches!(
            state.begin_turn(tx, &options),
            Err(AgentError::InvalidState(msg)) if msg.contains("closed")
        ));
    }

    #[rstest]
    #[case::budget(AgentOptions::builder().max_budget_usd(0.10), "spent")]
    #[case::turns(AgentOptions::builder().max_session_turns(1), "turns")]
    #[case::tokens(AgentOptions::builder().max_session_tokens(15), "tokens")]
    fn test_ceilings(#[case] options: crate::config::AgentOptionsBuilder, #[case] needle: &str) {
        let options = options.build().unwrap();
        let mut state = SessionState::new();
        state.lifecycle = Lifecycle::Connected {
            turn_in_flight: false,
        };
        state.record_turn(&result("s1", 0.25));

        let (tx, _rx) = mpsc::unbounded_channel();
        let err = state.begin_turn(tx, &options).unwrap_err();
        assert!(matches!(&err, AgentError::BudgetExceeded(msg) if msg.contains(needle)), "{err}");
        assert!(!state.turn_in_flight());
    }

    #[test]
    fn test_spend_survives_session_switch() {
        let options = AgentOptions::builder().max_session_turns(2).build().unwrap();
        let mut state = SessionState::new();
        state.lifecycle = Lifecycle::Connected {
            turn_in_flight: false,
        };
        state.record_turn(&result("s1", 0.25));
        state.record_turn(&result("s1", 0.25));

        state.info = SessionInfo {
            session_id: Some("s2".into()),
            open: true,
            ..SessionInfo::default()
        };
        assert_eq!(state.spend.turns, 2);
        assert!((state.spend.cost_usd - 0.5).abs() < 1e-9);

        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(
            state.begin_turn(tx, &options),
            Err(AgentError::BudgetExceeded(_))
        ));
    }

    #[test]
    fn test_record_accumulates() {
        let mut info = SessionInfo::default();
        info.record(&result("s1", 0.25));
        info.record(&result("s1", 0.5));
        assert_eq!(info.session_id.as_deref(), Some("s1"));
        assert_eq!(info.turn_count, 2);
        assert_eq!(info.agent_turns, 4);
        assert!((info.total_cost_usd - 0.75).abs() < 1e-9);
        assert_eq!(info.usage.total_tokens(), 30);
    }

    #[test]
    fn test_record_adopts_new_session_id() {
        let mut info = SessionInfo {
            session_id: Some("s1".into()),
            ..Default::default()
        };
        info.record(&result("s2", 0.0));
        assert_eq!(info.session_id.as_deref(), Some("s2"));
    }

    #[rstest]
    #[case(Some("s1"), None, "s1", false)]
    #[case(Some("s1"), None, "s2", true)]
    #[case(None, Some("p"), "p", false)]
    #[case(None, None, "p", true)]
    fn test_needs_switch(
        #[case] session: Option<&str>,
        #[case] parent: Option<&str>,
        #[case] target: &str,
        #[case] expected: bool,
    ) {
        let info = SessionInfo {
            session_id: session.map(String::from),
            parent_session_id: parent.map(String::from),
            ..Default::default()
        };
        assert_eq!(info.needs_switch(target), expected);
    }

    #[test]
    fn test_complete_turn_delivers_last_and_marks_decode_errors() {
        let shared = shared(None);
        let mut rx = connected(&shared);

        shared.record_decode_error("bad frame".into());
        shared.complete_turn(result("s1", 0.1));

        let Message::Result(delivered) = rx.try_recv().unwrap() else {
            panic!("expected result");
        };
        assert!(delivered.is_error);
        assert_eq!(delivered.errors, vec!["undecodable frame: bad frame"]);
        assert!(rx.try_recv().is_err());
        assert_eq!(
            shared.lifecycle(),
            Lifecycle::Connected {
                turn_in_flight: false
            }
        );
        assert_eq!(shared.info().turn_count, 1);
    }

    #[test]
    fn test_observers_see_everything_after_the_turn() {
        let shared = shared(None);
        let seen = Arc::new(AtomicUsize::new(0));
        let results = Arc::new(AtomicUsize::new(0));
        shared.add_message_observer({
            let seen = Arc::clone(&seen);
            Arc::new(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
        });
        shared.add_message_observer(Arc::new(|_| panic!("misbehaving observer")));
        shared.add_result_observer({
            let results = Arc::clone(&results);
            Arc::new(move |_| {
                results.fetch_add(1, Ordering::SeqCst);
            })
        });

        let mut rx = connected(&shared);
        shared.publish(Message::Unknown {
            message_type: "progress".into(),
            raw: json!({}),
        });
        shared.complete_turn(result("s1", 0.0));

        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(results.load(Ordering::SeqCst), 1);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().unwrap().is_result());
    }

    #[test]
    fn test_stream_end_synthesizes_result_once() {
        let shared = shared(None);
        let mut rx = connected(&shared);
        let generation = shared.generation();

        shared.stream_ended(generation + 1, "stale reader");
        assert!(rx.try_recv().is_err());

        shared.stream_ended(generation, "pipe closed");
        let Message::Result(result) = rx.try_recv().unwrap() else {
            panic!("expected result");
        };
        assert_eq!(result.subtype, "error_stream_closed");
        assert!(result.is_error);
        assert_eq!(shared.lifecycle(), Lifecycle::Closed);
        assert!(!shared.info().open);
    }

    #[test]
    fn test_stream_end_fails_pending_waiters() {
        let shared = shared(None);
        let mut waiter = shared.register_waiter("req_1");
        shared.stream_ended(shared.generation(), "gone");
        assert!(waiter.try_recv().is_err());
    }

    #[rstest]
    #[case::plain(r#"{"answer": 4}"#)]
    #[case::fenced("```json\n{\"answer\": 4}\n```")]
    #[case::bare_fence("```\n{\"answer\": 4}\n```")]
    fn test_parse_json_text(#[case] text: &str) {
        assert_eq!(parse_json_text(text), Some(json!({"answer": 4})));
    }

    #[test]
    fn test_structured_output_from_text_and_validation() {
        let schema = JsonSchema::of_object([("answer", json!({"type": "number"}))], ["answer"]);
        let shared = shared(Some(schema));

        let mut ok = result("s1", 0.0);
        ok.result = Some(r#"{"answer": 4}"#.into());
        shared.finalize_structured_output(&mut ok);
        assert_eq!(ok.structured_output, Some(json!({"answer": 4})));
        assert!(!ok.is_error);

        let mut wrong = result("s1", 0.0);
        wrong.structured_output = Some(json!({"answer": "four"}));
        shared.finalize_structured_output(&mut wrong);
        assert!(wrong.is_error);

        let mut prose = result("s1", 0.0);
        prose.result = Some("The answer is four".into());
        shared.finalize_structured_output(&mut prose);
        assert!(prose.is_error);
        assert!(prose.errors[0].contains("missing"));
    }
}
