//! Session identity: resume, fork and turn counting across clients

mod common;

use agentwire::testing::{ScriptedAgent, ScriptedTurn};
use agentwire::{AgentError, AgentOptions, ClaudeClient, Lifecycle};
use common::{client, scripted};

#[tokio::test]
async fn test_first_turn_assigns_session_id() {
    let agent = ScriptedAgent::new();
    let client = client(&agent);
    assert_eq!(client.session().info().session_id, None);

    let result = client.connect("hello").result().await.unwrap();
    let info = client.session().info();
    assert_eq!(info.session_id.as_deref(), Some(result.session_id.as_str()));
    assert_eq!(info.turn_count, 1);
    assert!(info.open);
}

#[tokio::test]
async fn test_resume_continues_turn_count() {
    let agent = ScriptedAgent::new();
    agent.push_turn(ScriptedTurn::new().text("Noted."));
    agent.push_turn(ScriptedTurn::new().text("ALPHA-123"));

    let first = client(&agent);
    let remembered = first
        .connect("Remember code ALPHA-123")
        .result()
        .await
        .unwrap();
    let s1 = remembered.session_id.clone();
    first.close().await.unwrap();

    let second = scripted(&agent).resume(s1.clone()).build().unwrap();
    let recalled = second.connect("What code?").result().await.unwrap();

    assert_eq!(recalled.session_id, s1);
    assert_eq!(recalled.num_turns, remembered.num_turns + 1);
    assert!(agent.launches()[1].windows(2).any(|w| w == ["--resume", s1.as_str()]));
}

#[tokio::test]
async fn test_resume_without_prompt_attaches() {
    let agent = ScriptedAgent::new();
    let first = client(&agent);
    let s1 = first.connect("hi").result().await.unwrap().session_id;

    let second = scripted(&agent).resume(s1.clone()).build().unwrap();
    second.connect_empty().await.unwrap();
    assert_eq!(second.session().info().session_id, Some(s1));
    assert_eq!(agent.prompts().len(), 1);
}

#[tokio::test]
async fn test_unknown_resume_target_is_an_error_result() {
    let agent = ScriptedAgent::new();
    let client = scripted(&agent).resume("no-such-session").build().unwrap();

    let result = client.connect("anyone there?").result().await.unwrap();
    assert!(result.is_error);
    assert!(result.errors[0].contains("no-such-session"));
    assert!(matches!(client.session().lifecycle(), Lifecycle::Connected { .. }));
}

#[tokio::test]
async fn test_resume_and_fork_yield_new_session() {
    let agent = ScriptedAgent::new();
    let parent = client(&agent);
    let s1 = parent.connect("start").result().await.unwrap().session_id;

    let fork = scripted(&agent)
        .resume(s1.clone())
        .fork_session(true)
        .build()
        .unwrap();
    let forked = fork.connect("branch off").result().await.unwrap();

    assert_ne!(forked.session_id, s1);
    let info = fork.session().info();
    assert_eq!(info.parent_session_id.as_deref(), Some(s1.as_str()));
    assert_eq!(info.session_id.as_deref(), Some(forked.session_id.as_str()));
}

#[tokio::test]
async fn test_fork_leaves_parent_untouched() {
    let agent = ScriptedAgent::new();
    let original = client(&agent);
    let s1 = original.connect("one").result().await.unwrap().session_id;
    original.query("two").result().await.unwrap();
    assert_eq!(agent.session_turns(&s1), Some(2));

    let fork = scripted(&agent).fork_session(true).build().unwrap();
    fork.connect_empty().await.unwrap();
    let s2 = fork
        .query_with_session("fork turn", s1.clone())
        .result()
        .await
        .unwrap()
        .session_id;
    fork.query("another fork turn").result().await.unwrap();
    assert_ne!(s2, s1);
    assert_eq!(agent.session_turns(&s2), Some(4));

    let back = original.query("three").result().await.unwrap();
    assert_eq!(back.session_id, s1);
    assert_eq!(back.num_turns, 3);
}

#[tokio::test]
async fn test_query_with_other_session_relaunches() {
    let agent = ScriptedAgent::new();
    let a = client(&agent);
    let s1 = a.connect("first").result().await.unwrap().session_id;

    let b = client(&agent);
    b.connect("unrelated").result().await.unwrap();
    let launches_before = agent.launches().len();

    let result = b.query_with_session("join", s1.clone()).result().await.unwrap();
    assert_eq!(result.session_id, s1);
    assert_eq!(agent.launches().len(), launches_before + 1);

    let info = b.session().info();
    assert_eq!(info.session_id, Some(s1.clone()));
    assert_eq!(info.turn_count, 1);

    b.query_with_session("again", s1).result().await.unwrap();
    assert_eq!(agent.launches().len(), launches_before + 1);
}

#[tokio::test]
async fn test_turn_counters_are_monotonic() {
    let agent = ScriptedAgent::new();
    let client = client(&agent);
    client.connect("0").result().await.unwrap();

    let mut last = client.session().info();
    for i in 1..5 {
        client.query(i.to_string()).result().await.unwrap();
        let info = client.session().info();
        assert!(info.turn_count > last.turn_count);
        assert!(info.agent_turns >= last.agent_turns);
        assert!(info.total_cost_usd >= last.total_cost_usd);
        assert_eq!(info.session_id, last.session_id);
        last = info;
    }
    assert_eq!(last.usage.total_tokens(), 5 * 150);
}

#[tokio::test]
async fn test_connect_twice_is_invalid_state() {
    let agent = ScriptedAgent::new();
    let client = client(&agent);
    client.connect_empty().await.unwrap();

    let err = client.connect_empty().await.unwrap_err();
    assert!(matches!(err, AgentError::InvalidState(_)));
    assert_eq!(agent.launches().len(), 1);
}

#[tokio::test]
async fn test_frozen_options_are_shared() {
    let agent = ScriptedAgent::new();
    let options = AgentOptions::builder().max_turns(3).build().unwrap();
    let one = ClaudeClient::async_with(options.clone())
        .transport_factory(agent.clone())
        .build()
        .unwrap();
    let two = ClaudeClient::async_with(options)
        .transport_factory(agent.clone())
        .build()
        .unwrap();

    one.connect_empty().await.unwrap();
    two.connect_empty().await.unwrap();
    let launches = agent.launches();
    assert_eq!(launches[0], launches[1]);
}
