//! Runtime control: interrupts, timeouts, model and permission-mode changes,
//! and cross-turn observers

mod common;

use agentwire::testing::{ScriptedAgent, ScriptedTurn};
use agentwire::{AgentError, Lifecycle, Message, PermissionMode, models};
use common::{client, scripted, wait_idle};
use futures::TryStreamExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::test]
async fn test_interrupt_ends_turn_with_error_result() {
    let agent = ScriptedAgent::new();
    agent.push_turn(ScriptedTurn::new().text("working").hang_until_interrupted());
    let client = client(&agent);

    let mut turn = client.session().connect(Some("long task")).await.unwrap().unwrap();
    let first = turn.next().await.unwrap().unwrap();
    assert_eq!(first.type_name(), "system");

    client.interrupt().await.unwrap();
    let result = turn.result().await.unwrap();
    assert!(result.is_error);
    assert_eq!(result.errors, vec!["Request interrupted by user"]);
    assert!(matches!(
        client.session().lifecycle(),
        Lifecycle::Connected { turn_in_flight: false }
    ));
}

#[tokio::test]
async fn test_interrupt_is_idempotent() {
    let agent = ScriptedAgent::new();
    agent.push_turn(ScriptedTurn::new().hang_until_interrupted());
    let client = client(&agent);

    let turn = client.session().connect(Some("wait")).await.unwrap().unwrap();
    client.interrupt().await.unwrap();
    client.interrupt().await.unwrap();
    turn.result().await.unwrap();
    client.interrupt().await.unwrap();

    assert_eq!(agent.control_requests("interrupt").len(), 1);
}

#[tokio::test]
async fn test_interrupt_without_turn_is_noop() {
    let agent = ScriptedAgent::new();
    let client = client(&agent);
    client.interrupt().await.unwrap();

    client.connect_empty().await.unwrap();
    client.interrupt().await.unwrap();
    assert!(agent.control_requests("interrupt").is_empty());
}

#[tokio::test]
async fn test_second_turn_rejected_while_in_flight() {
    let agent = ScriptedAgent::new();
    agent.push_turn(ScriptedTurn::new().hang_until_interrupted());
    let client = client(&agent);

    let turn = client.session().connect(Some("first")).await.unwrap().unwrap();
    let err = client.query("second").result().await.unwrap_err();
    assert!(matches!(err, AgentError::InvalidState(ref m) if m.contains("in flight")));
    assert_eq!(agent.prompts(), vec!["first"]);

    client.interrupt().await.unwrap();
    turn.result().await.unwrap();
    assert_eq!(client.query("third").text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_timeout_interrupts_and_reports() {
    let agent = ScriptedAgent::new();
    agent.push_turn(ScriptedTurn::new().hang_until_interrupted());
    let client = scripted(&agent)
        .timeout(Duration::from_millis(100))
        .build()
        .unwrap();

    let err = client.connect("slow").result().await.unwrap_err();
    assert!(matches!(err, AgentError::Timeout(d) if d == Duration::from_millis(100)));
    assert_eq!(agent.control_requests("interrupt").len(), 1);

    wait_idle(client.session()).await;
    assert_eq!(client.query("quick").text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_set_model_and_permission_mode() {
    let agent = ScriptedAgent::new();
    let client = client(&agent);

    let err = client.set_model(Some(models::HAIKU)).await.unwrap_err();
    assert!(matches!(err, AgentError::InvalidState(_)));

    client.connect_empty().await.unwrap();
    client.set_model(Some(models::HAIKU)).await.unwrap();
    client.set_model(None).await.unwrap();
    client
        .set_permission_mode(PermissionMode::AcceptEdits)
        .await
        .unwrap();

    let models: Vec<_> = agent
        .control_requests("set_model")
        .into_iter()
        .map(|frame| frame["request"]["model"].clone())
        .collect();
    assert_eq!(models, vec![serde_json::json!(models::HAIKU), serde_json::Value::Null]);
    assert_eq!(
        agent.control_requests("set_permission_mode")[0]["request"]["mode"],
        "acceptEdits"
    );
}

#[tokio::test]
async fn test_handshake_registers_hook_callbacks() {
    let agent = ScriptedAgent::new();
    client(&agent).connect_empty().await.unwrap();

    let init = &agent.control_requests("initialize")[0];
    assert!(init["request"]["hooks"]["PreToolUse"].is_array());
    assert!(init["request"]["hooks"]["PostToolUse"].is_array());
}

#[tokio::test]
async fn test_observers_see_every_turn() {
    let agent = ScriptedAgent::new();
    agent.push_turn(ScriptedTurn::new().text("one"));
    agent.push_turn(ScriptedTurn::new().text("two"));
    let client = client(&agent);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let results = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let result_sink = Arc::clone(&results);
    client
        .on_message(move |message| sink.lock().unwrap().push(message.type_name().to_string()))
        .on_result(move |result| result_sink.lock().unwrap().push(result.session_id.clone()));

    let first: Vec<Message> = client.connect("1").messages().try_collect().await.unwrap();
    let second: Vec<Message> = client.query("2").messages().try_collect().await.unwrap();

    let per_turn: Vec<String> = first
        .iter()
        .chain(&second)
        .map(|m| m.type_name().to_string())
        .collect();
    assert_eq!(*seen.lock().unwrap(), per_turn);
    assert_eq!(results.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_panicking_observer_does_not_break_turns() {
    let agent = ScriptedAgent::new();
    let client = client(&agent);
    client.on_message(|_| panic!("observer bug"));

    assert_eq!(client.connect("hi").text().await.unwrap(), "ok");
    assert_eq!(client.query("again").text().await.unwrap(), "ok");
}
