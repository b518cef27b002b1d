//! Error taxonomy: launch failures, rejected turns, undecodable frames and
//! transport loss

mod common;

use agentwire::testing::{ScriptedAgent, ScriptedTurn};
use agentwire::{AgentError, Lifecycle, Message};
use common::{client, scripted};
use futures::TryStreamExt;
use rstest::rstest;

#[tokio::test]
async fn test_launch_failure_is_surfaced() {
    let agent = ScriptedAgent::new();
    agent.fail_launches();
    let client = client(&agent);

    let err = client.connect("hi").text().await.unwrap_err();
    assert!(matches!(err, AgentError::Launch(_)));
    assert!(err.is_session_fatal());
    assert_eq!(client.session().lifecycle(), Lifecycle::Unconnected);
}

#[tokio::test]
async fn test_query_before_connect_has_no_side_effects() {
    let agent = ScriptedAgent::new();
    let client = client(&agent);

    let err = client.query("early").text().await.unwrap_err();
    assert!(matches!(err, AgentError::InvalidState(ref m) if m.contains("before connect")));
    assert!(err.is_rejection());
    assert!(agent.launches().is_empty());
    assert!(agent.written_frames().is_empty());
}

#[tokio::test]
async fn test_query_after_close_is_rejected() {
    let agent = ScriptedAgent::new();
    let client = client(&agent);
    client.connect("hi").result().await.unwrap();
    client.close().await.unwrap();
    client.close().await.unwrap();

    let err = client.query("more").result().await.unwrap_err();
    assert!(matches!(err, AgentError::InvalidState(ref m) if m.contains("closed")));
    assert!(!client.session().info().open);
}

#[rstest]
#[case::turns(scripted_turn_ceiling())]
#[case::budget(scripted_budget_ceiling())]
#[case::tokens(scripted_token_ceiling())]
#[tokio::test]
async fn test_ceiling_rejects_new_turns(#[case] setup: (ScriptedAgent, agentwire::ClaudeAsyncClient)) {
    let (agent, client) = setup;
    client.connect("one").result().await.unwrap();

    let err = client.query("two").result().await.unwrap_err();
    assert!(matches!(err, AgentError::BudgetExceeded(_)), "{err}");
    assert!(err.is_rejection());
    assert_eq!(agent.prompts(), vec!["one"]);
    assert!(matches!(client.session().lifecycle(), Lifecycle::Connected { .. }));
}

fn scripted_turn_ceiling() -> (ScriptedAgent, agentwire::ClaudeAsyncClient) {
    let agent = ScriptedAgent::new();
    let client = scripted(&agent).max_session_turns(1).build().unwrap();
    (agent, client)
}

fn scripted_budget_ceiling() -> (ScriptedAgent, agentwire::ClaudeAsyncClient) {
    let agent = ScriptedAgent::new();
    agent.push_turn(ScriptedTurn::new().cost(0.75));
    let client = scripted(&agent).max_budget_usd(0.5).build().unwrap();
    (agent, client)
}

fn scripted_token_ceiling() -> (ScriptedAgent, agentwire::ClaudeAsyncClient) {
    let agent = ScriptedAgent::new();
    agent.push_turn(ScriptedTurn::new().usage(900, 200));
    let client = scripted(&agent).max_session_tokens(1000).build().unwrap();
    (agent, client)
}

#[tokio::test]
async fn test_budget_is_not_reset_by_switching_sessions() {
    let agent = ScriptedAgent::new();
    for _ in 0..3 {
        agent.push_turn(ScriptedTurn::new().cost(0.3));
    }
    let other = client(&agent);
    let other_id = other.connect("elsewhere").result().await.unwrap().session_id;

    let client = scripted(&agent).max_budget_usd(0.5).build().unwrap();
    let own_id = client.connect("one").result().await.unwrap().session_id;
    client
        .query_with_session("two", other_id.as_str())
        .result()
        .await
        .unwrap();
    assert_eq!(client.session().info().turn_count, 1);
    assert_eq!(client.session().spend().turns, 2);

    let err = client
        .query_with_session("three", own_id.as_str())
        .result()
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::BudgetExceeded(_)), "{err}");
    assert_eq!(agent.prompts(), vec!["elsewhere", "one", "two"]);
}

#[tokio::test]
async fn test_turn_in_flight_completes_past_budget() {
    let agent = ScriptedAgent::new();
    agent.push_turn(ScriptedTurn::new().text("expensive").cost(2.0));
    let client = scripted(&agent).max_budget_usd(1.0).build().unwrap();

    let result = client.connect("go").result().await.unwrap();
    assert!(result.is_success());
    assert_eq!(client.session().info().total_cost_usd, 2.0);
}

#[tokio::test]
async fn test_undecodable_frame_marks_turn_and_continues() {
    let agent = ScriptedAgent::new();
    agent.push_turn(
        ScriptedTurn::new()
            .text("before")
            .raw_frame("{this is not json")
            .raw_frame(r#"{"type":"assistant","message":{}}"#)
            .text("after"),
    );
    agent.push_turn(ScriptedTurn::new().text("clean"));
    let client = client(&agent);

    let messages: Vec<Message> = client.connect("go").messages().try_collect().await.unwrap();
    let result = messages.last().and_then(Message::as_result).unwrap();
    assert!(result.is_error);
    assert_eq!(
        result
            .errors
            .iter()
            .filter(|e| e.starts_with("undecodable frame"))
            .count(),
        2
    );
    let texts: Vec<String> = messages
        .iter()
        .filter_map(Message::as_assistant)
        .map(|a| a.text())
        .collect();
    assert_eq!(texts, vec!["before", "after"]);

    let next = client.query("again").result().await.unwrap();
    assert!(next.is_success());
}

#[tokio::test]
async fn test_unknown_message_types_pass_through() {
    let agent = ScriptedAgent::new();
    agent.push_turn(
        ScriptedTurn::new()
            .raw_frame(r#"{"type":"stream_event","event":{"type":"message_start"}}"#)
            .text("done"),
    );
    let client = client(&agent);

    let messages: Vec<Message> = client.connect("go").messages().try_collect().await.unwrap();
    assert!(messages.iter().any(|m| m.type_name() == "stream_event"));
    assert!(messages.last().unwrap().as_result().unwrap().is_success());
}

#[tokio::test]
async fn test_stream_loss_closes_session() {
    let agent = ScriptedAgent::new();
    agent.push_turn(ScriptedTurn::new().text("partial").close_stream());
    let client = client(&agent);

    let messages: Vec<Message> = client.connect("go").messages().try_collect().await.unwrap();
    let result = messages.last().and_then(Message::as_result).unwrap();
    assert_eq!(result.subtype, "error_stream_closed");
    assert!(result.is_error);
    assert_eq!(messages.iter().filter(|m| m.is_result()).count(), 1);

    assert_eq!(client.session().lifecycle(), Lifecycle::Closed);
    let err = client.query("more").result().await.unwrap_err();
    assert!(matches!(err, AgentError::InvalidState(_)));
}

#[tokio::test]
async fn test_close_during_turn_terminates_it() {
    let agent = ScriptedAgent::new();
    agent.push_turn(ScriptedTurn::new().hang_until_interrupted());
    let client = client(&agent);

    let turn = client.session().connect(Some("wait")).await.unwrap().unwrap();
    client.close().await.unwrap();

    let result = turn.result().await.unwrap();
    assert_eq!(result.subtype, "error_session_closed");
    assert_eq!(client.session().lifecycle(), Lifecycle::Closed);
}
