//! Durability across restarts and per-conversation concurrency.

mod common;

use common::{Fixture, FlakyStore, call, handoff, test_config};
use std::sync::Arc;
use std::time::Duration;
use switchboard::agent::{AgentId, CheckpointStore, ConversationState};
use switchboard::prelude::*;
use switchboard::testing::ScriptedModel;

#[tokio::test]
async fn pending_approval_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    // First process: suspend on a sensitive call, then go away.
    {
        let store = Arc::new(FileCheckpointStore::new(dir.path()).unwrap());
        let fx = Fixture::with(
            ScriptedModel::new()
                .reply_tool_calls(vec![handoff("h1", "shop")])
                .reply_tool_calls(vec![call("p1", "order_purchase")]),
            test_config(),
            store,
        );
        let outcome = fx
            .orchestrator
            .submit("user@example.com", "buy the Pixel 9")
            .await
            .unwrap();
        assert_eq!(outcome.ending_state, TurnEnding::AwaitingApproval);
        assert!(fx.executed().is_empty());
    }

    // Second process: fresh orchestrator over the same directory.
    let store = Arc::new(FileCheckpointStore::new(dir.path()).unwrap());
    let fx = Fixture::with(
        ScriptedModel::new().reply_text("Your order is placed."),
        test_config(),
        store,
    );
    let snapshot = fx
        .orchestrator
        .snapshot("user@example.com")
        .await
        .unwrap()
        .unwrap();
    assert!(snapshot.state.is_awaiting_approval());
    assert_eq!(snapshot.state.dialog_stack.agents(), [AgentId::from("shop")]);

    let outcome = fx
        .orchestrator
        .resume("user@example.com", ApprovalDecision::Approve)
        .await
        .unwrap();

    assert_eq!(outcome.ending_state, TurnEnding::Terminal);
    assert_eq!(fx.executed(), ["order_purchase"]);
    assert_eq!(outcome.last_reply(), Some("Your order is placed."));
    assert!(outcome.prompt_token_count > 0);

    // The resumed model call saw the whole history, including the approved result.
    let (window, _) = fx.model.requests().remove(0);
    assert_eq!(window[0].content, "You are the shop assistant.");
    assert!(
        window
            .iter()
            .any(|m| m.tool_call_id.as_deref() == Some("p1"))
    );
}

#[tokio::test]
async fn rejection_after_restart_references_original_call() {
    let dir = tempfile::tempdir().unwrap();

    {
        let store = Arc::new(FileCheckpointStore::new(dir.path()).unwrap());
        let fx = Fixture::with(
            ScriptedModel::new()
                .reply_tool_calls(vec![handoff("h1", "shop")])
                .reply_tool_calls(vec![call("k1", "cancel_order")]),
            test_config(),
            store,
        );
        let outcome = fx.orchestrator.submit("c1", "cancel A-7").await.unwrap();
        assert_eq!(outcome.ending_state, TurnEnding::AwaitingApproval);
    }

    let store = Arc::new(FileCheckpointStore::new(dir.path()).unwrap());
    let fx = Fixture::with(
        ScriptedModel::new().reply_text("Which order should I cancel instead?"),
        test_config(),
        store,
    );
    let outcome = fx
        .orchestrator
        .resume("c1", ApprovalDecision::reject("wrong id"))
        .await
        .unwrap();

    assert!(fx.executed().is_empty());
    let denial = &outcome.appended_messages[0];
    assert_eq!(denial.tool_call_id.as_deref(), Some("k1"));
    assert!(denial.content.contains("wrong id"));
    assert_eq!(outcome.active_agent, AgentId::from("shop"));
    assert_eq!(outcome.ending_state, TurnEnding::Terminal);
    let (window, _) = fx.model.requests().remove(0);
    assert_eq!(window[0].content, "You are the shop assistant.");
}

#[tokio::test]
async fn every_step_is_checkpointed() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileCheckpointStore::new(dir.path()).unwrap());
    let fx = Fixture::with(
        ScriptedModel::new()
            .reply_tool_calls(vec![handoff("h1", "shop")])
            .reply_tool_calls(vec![call("t1", "search_products")])
            .reply_text("Found it."),
        test_config(),
        store.clone(),
    );

    let outcome = fx.orchestrator.submit("c1", "find a phone").await.unwrap();

    let persisted = store.get("c1").await.unwrap().unwrap();
    assert_eq!(persisted.conversation_id, "c1");
    assert_eq!(persisted.state.messages.len(), outcome.appended_messages.len());
    assert_eq!(persisted.state.prompt_token_count, outcome.prompt_token_count);
}

#[tokio::test]
async fn same_conversation_turns_are_serialized() {
    let fx = Arc::new(Fixture::new(
        ScriptedModel::new()
            .with_delay(Duration::from_millis(50))
            .reply_text("first answer")
            .reply_text("second answer"),
    ));

    let (a, b) = tokio::join!(
        fx.orchestrator.submit("c1", "question one"),
        fx.orchestrator.submit("c1", "question two"),
    );
    a.unwrap();
    b.unwrap();

    let state = fx.state("c1").await;
    let roles: Vec<MessageRole> = state.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        [
            MessageRole::Human,
            MessageRole::Assistant,
            MessageRole::Human,
            MessageRole::Assistant,
        ]
    );
}

#[tokio::test]
async fn different_conversations_do_not_share_state() {
    let fx = Arc::new(Fixture::new(
        ScriptedModel::new()
            .with_delay(Duration::from_millis(20))
            .reply_tool_calls(vec![handoff("h1", "shop")])
            .reply_text("hello b")
            .reply_text("hello a"),
    ));

    let mut handles = Vec::new();
    for id in ["a", "b"] {
        let fx = fx.clone();
        handles.push(tokio::spawn(async move {
            fx.orchestrator.submit(id, "hi").await.unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let a = fx.state("a").await;
    let b = fx.state("b").await;
    // Exactly one of them was delegated; the other stayed at root.
    let delegated = [&a, &b]
        .iter()
        .filter(|s| !s.dialog_stack.is_empty())
        .count();
    assert_eq!(delegated, 1);
    assert_eq!(a.messages[0].content, "hi");
    assert_eq!(b.messages[0].content, "hi");
    assert_eq!(fx.model.invocation_count(), 3);
}

// ── Interrupted resumes ────────────────────────────────────────────

fn single_purchase_script() -> ScriptedModel {
    ScriptedModel::new()
        .reply_tool_calls(vec![handoff("h1", "shop")])
        .reply_tool_calls(vec![call("p1", "order_purchase")])
}

fn flaky_fixture(model: ScriptedModel) -> (Fixture, Arc<FlakyStore>) {
    let store = Arc::new(FlakyStore::new());
    let fx = Fixture::with(model, test_config(), store.clone());
    (fx, store)
}

#[tokio::test]
async fn failed_decision_save_runs_nothing_and_can_be_retried() {
    let (fx, store) = flaky_fixture(single_purchase_script().reply_text("Order placed."));
    fx.orchestrator.submit("c1", "buy the Pixel 9").await.unwrap();

    store.fail_put_after(0);
    let err = fx
        .orchestrator
        .resume("c1", ApprovalDecision::Approve)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Store(_)));
    assert!(fx.executed().is_empty());
    let state = fx.state("c1").await;
    assert!(state.interrupt.as_ref().unwrap().decision.is_none());

    let outcome = fx
        .orchestrator
        .resume("c1", ApprovalDecision::Approve)
        .await
        .unwrap();
    assert_eq!(outcome.ending_state, TurnEnding::Terminal);
    assert_eq!(fx.executed(), ["order_purchase"]);
}

#[tokio::test]
async fn approved_call_is_not_rerun_when_its_result_was_not_saved() {
    let (fx, store) = flaky_fixture(single_purchase_script().reply_text("Let me check on that."));
    fx.orchestrator.submit("c1", "buy the Pixel 9").await.unwrap();

    // Decision and dispatch marker are saved; the write after the call fails.
    store.fail_put_after(2);
    let err = fx
        .orchestrator
        .resume("c1", ApprovalDecision::Approve)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Store(_)));
    assert_eq!(fx.executed(), ["order_purchase"]);

    let state = fx.state("c1").await;
    let point = state.interrupt.as_ref().unwrap();
    assert_eq!(point.decision, Some(ApprovalDecision::Approve));
    assert!(point.was_dispatched("p1"));

    let outcome = fx
        .orchestrator
        .resume("c1", ApprovalDecision::Approve)
        .await
        .unwrap();

    assert_eq!(fx.executed(), ["order_purchase"]);
    assert_eq!(outcome.ending_state, TurnEnding::Terminal);
    let result = &outcome.appended_messages[0];
    assert_eq!(result.tool_call_id.as_deref(), Some("p1"));
    assert!(result.content.contains("not run again"));
    assert!(fx.state("c1").await.interrupt.is_none());

    let err = fx
        .orchestrator
        .resume("c1", ApprovalDecision::Approve)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidState { .. }));
    assert_eq!(fx.executed(), ["order_purchase"]);
}

#[tokio::test]
async fn recorded_decision_wins_over_a_later_resume() {
    let (fx, store) = flaky_fixture(single_purchase_script().reply_text("Okay, nothing ordered."));
    fx.orchestrator.submit("c1", "buy the Pixel 9").await.unwrap();

    store.fail_put_after(1);
    fx.orchestrator
        .resume("c1", ApprovalDecision::reject("too pricey"))
        .await
        .unwrap_err();

    let outcome = fx
        .orchestrator
        .resume("c1", ApprovalDecision::Approve)
        .await
        .unwrap();

    assert!(fx.executed().is_empty());
    let denial = &outcome.appended_messages[0];
    assert_eq!(denial.tool_call_id.as_deref(), Some("p1"));
    assert!(denial.content.contains("too pricey"));
    assert_eq!(outcome.last_reply(), Some("Okay, nothing ordered."));
}

// ── Shared state directories ───────────────────────────────────────

#[tokio::test]
async fn concurrent_writer_in_shared_directory_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let slow = Fixture::with(
        ScriptedModel::new()
            .with_delay(Duration::from_millis(300))
            .reply_text("answer A"),
        test_config(),
        Arc::new(FileCheckpointStore::new(dir.path()).unwrap()),
    );
    let fast = Fixture::with(
        ScriptedModel::new().reply_text("answer B"),
        test_config(),
        Arc::new(FileCheckpointStore::new(dir.path()).unwrap()),
    );

    let (a, b) = tokio::join!(slow.orchestrator.submit("c1", "one"), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        fast.orchestrator.submit("c1", "two").await
    });

    b.unwrap();
    assert!(matches!(
        a.unwrap_err(),
        OrchestratorError::Conflict { expected: 1, found: 3, .. }
    ));
    let state = fast.state("c1").await;
    let log: Vec<&str> = state.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(log, ["one", "two", "answer B"]);
}

#[tokio::test]
async fn removed_agent_on_stack_falls_back_to_known_parent() {
    let store = Arc::new(MemoryCheckpointStore::new());
    let mut state = ConversationState::new();
    state.append(Message::human("I want to return my phone"));
    state
        .dialog_stack
        .push(&AgentDefinition::new("shop", "old prompt"), "h1");
    state
        .dialog_stack
        .push(&AgentDefinition::new("returns", "old prompt"), "h2");
    store
        .put("c1", &ConversationSnapshot::new("c1", state))
        .await
        .unwrap();

    let fx = Fixture::with(
        ScriptedModel::new().reply_text("I can help with returns here."),
        test_config(),
        store,
    );
    let outcome = fx.orchestrator.submit("c1", "still there?").await.unwrap();

    assert_eq!(outcome.ending_state, TurnEnding::Terminal);
    assert_eq!(outcome.dialog_stack, [AgentId::from("shop")]);
    let (window, _) = fx.model.requests().remove(0);
    assert_eq!(window[0].content, "You are the shop assistant.");
}
