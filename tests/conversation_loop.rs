//! Two-party conversation loop integration tests
//!
//! Drives complete conversations against scripted backends and humans.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conclave::agent::{
    AgentBuilder, ChatState, ConversationLoop, ExecutionProxy, HumanInput, LoopSettings,
    Participant, RetryPolicy, RoleProfile, ScriptedHuman, TerminationReason,
};
use conclave::core::{HumanInputMode, SpeakerRole, TurnKind};
use conclave::llm::ScriptedBackend;
use conclave::tools::{arg_i64, FunctionTool, ParamType, ToolCatalog, ToolOutput, ToolRegistry, ToolSpec};
use conclave::ConclaveError;
use serde_json::json;
use tokio_util::sync::CancellationToken;

const PROXY: &str = "User_Proxy";

fn no_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 0,
        base_delay: Duration::ZERO,
    }
}

fn assistant(backend: &Arc<ScriptedBackend>) -> Participant {
    AgentBuilder::new(RoleProfile::new("Assistant", "Solve the task step by step."))
        .backend(backend.clone())
        .retry(no_retry())
        .build_without_tools()
        .unwrap()
}

/// A human who never gets around to answering
struct AwayFromKeyboard;

#[async_trait]
impl HumanInput for AwayFromKeyboard {
    async fn ask(&self, _prompt: &str) -> Option<String> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        None
    }
}

fn cancel_soon(token: &CancellationToken) {
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });
}

fn settings(max_auto_reply: usize) -> LoopSettings {
    LoopSettings {
        max_auto_reply,
        ..LoopSettings::default()
    }
}

/// A calculator whose `add` tool is bound to it and executed by the proxy
fn calculator(backend: &Arc<ScriptedBackend>) -> ConversationLoop {
    let catalog = ToolCatalog::new()
        .with(ToolSpec::function(
            FunctionTool::new("add", "Add two integers")
                .param("a", ParamType::Integer, "first addend")
                .param("b", ParamType::Integer, "second addend")
                .sync_handler(|args| Ok(ToolOutput::from(arg_i64(&args, "a")? + arg_i64(&args, "b")?))),
        ))
        .unwrap();
    let mut registry = ToolRegistry::new();
    let participant = AgentBuilder::new(
        RoleProfile::new("Calculator", "Use your tools for arithmetic.").with_tools(["add"]),
    )
    .backend(backend.clone())
    .retry(no_retry())
    .build(&catalog, &mut registry, PROXY)
    .unwrap();

    ConversationLoop::new(participant, ExecutionProxy::new(PROXY, Arc::new(registry)))
        .settings(settings(5))
}

#[tokio::test]
async fn test_terminates_on_third_reply() {
    let backend = Arc::new(ScriptedBackend::with_replies(["step1", "step2", "TERMINATE"]));
    let mut chat = ConversationLoop::new(assistant(&backend), ExecutionProxy::without_tools(PROXY))
        .settings(settings(3));

    let outcome = chat.run("Plan the migration.").await;

    assert_eq!(outcome.state, ChatState::Terminated(TerminationReason::Predicate));
    assert_eq!(outcome.generations, 3);
    assert_eq!(backend.call_count(), 3);
    assert_eq!(outcome.final_reply.as_deref(), Some("step2"));

    let speakers: Vec<&str> = chat.transcript().turns().iter().map(|t| t.speaker.as_str()).collect();
    assert_eq!(
        speakers,
        [PROXY, "Assistant", PROXY, "Assistant", PROXY, "Assistant"]
    );
    let last = chat.transcript().last().unwrap();
    assert!(last.terminal);
    assert_eq!(last.content, "TERMINATE");
}

#[tokio::test]
async fn test_tool_result_follows_its_call() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .tool_call("add", json!({"a": 2, "b": 3}))
            .reply("2 + 3 = 5")
            .reply("TERMINATE"),
    );
    let mut chat = calculator(&backend);

    let outcome = chat.run("What is 2 + 3?").await;
    assert_eq!(outcome.reason(), Some(TerminationReason::Predicate));
    assert_eq!(outcome.final_reply.as_deref(), Some("2 + 3 = 5"));

    let turns = chat.transcript().turns();
    assert_eq!(turns[1].kind, TurnKind::ToolCall);
    assert_eq!(turns[2].kind, TurnKind::ToolResult);
    assert_eq!(turns[2].speaker, PROXY);
    assert_eq!(turns[2].tool_results.len(), 1);
    assert_eq!(turns[2].tool_results[0].call_id, turns[1].tool_calls[0].id);
    assert_eq!(turns[2].content, "5");

    // The model saw its own call and the answer as a tool message
    let requests = backend.requests();
    assert_eq!(requests[0].tools, ["add"]);
    let followup = &requests[1].messages;
    assert!(followup.iter().any(|m| m.role == "assistant" && m.tool_calls.is_some()));
    assert!(followup.iter().any(|m| m.role == "tool" && m.content == "5"));
}

#[tokio::test]
async fn test_tool_error_is_reported_not_raised() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .tool_call("add", json!({"a": 2}))
            .tool_call("divide", json!({"a": 1, "b": 0}))
            .reply("TERMINATE"),
    );
    let mut chat = calculator(&backend);

    let outcome = chat.run("Add 2 and something.").await;
    assert_eq!(outcome.reason(), Some(TerminationReason::Predicate));

    let results: Vec<_> = chat
        .transcript()
        .turns()
        .iter()
        .filter(|t| t.is_tool_result())
        .collect();
    assert_eq!(results.len(), 2);
    assert!(!results[0].tool_results[0].success);
    assert!(results[0].content.contains("missing required argument 'b'"));
    assert!(results[1].content.contains("not available"));
}

#[tokio::test]
async fn test_backend_failure_ends_with_error_turn() {
    let backend = Arc::new(ScriptedBackend::new().reply("Working on it.").fail("quota exceeded"));
    let mut chat = ConversationLoop::new(assistant(&backend), ExecutionProxy::without_tools(PROXY));

    let outcome = chat.run("Summarize the filing.").await;

    assert_eq!(outcome.reason(), Some(TerminationReason::BackendFailure));
    let last = chat.transcript().last().unwrap();
    assert_eq!(last.kind, TurnKind::Error);
    assert_eq!(last.role, SpeakerRole::System);
    assert!(last.terminal);
    assert!(last.content.contains("quota exceeded"));
    assert_eq!(outcome.final_reply.as_deref(), Some("Working on it."));
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let backend = Arc::new(ScriptedBackend::new().fail("connection reset").reply("TERMINATE"));
    let participant = AgentBuilder::new(RoleProfile::new("Assistant", "Help."))
        .backend(backend.clone())
        .retry(RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
        })
        .build_without_tools()
        .unwrap();
    let mut chat = ConversationLoop::new(participant, ExecutionProxy::without_tools(PROXY));

    let outcome = chat.run("Hello").await;
    assert_eq!(outcome.reason(), Some(TerminationReason::Predicate));
    assert_eq!(backend.call_count(), 2);
}

#[tokio::test]
async fn test_auto_reply_limit() {
    let backend = Arc::new(ScriptedBackend::repeating("Still thinking."));
    let mut chat = ConversationLoop::new(assistant(&backend), ExecutionProxy::without_tools(PROXY))
        .settings(settings(2));

    let outcome = chat.run("Prove the conjecture.").await;

    assert_eq!(outcome.reason(), Some(TerminationReason::MaxAutoReply));
    let auto_replies = chat
        .transcript()
        .turns()
        .iter()
        .filter(|t| t.role == SpeakerRole::Proxy)
        .count();
    assert_eq!(auto_replies, 2);
    assert!(chat.transcript().last().unwrap().terminal);
}

#[tokio::test]
async fn test_max_turns_bounds_generations() {
    let backend = Arc::new(ScriptedBackend::repeating("More."));
    let mut chat = ConversationLoop::new(assistant(&backend), ExecutionProxy::without_tools(PROXY))
        .settings(LoopSettings {
            max_turns: Some(2),
            ..settings(10)
        });

    let outcome = chat.run("Go on.").await;
    assert_eq!(outcome.reason(), Some(TerminationReason::MaxTurns));
    assert_eq!(outcome.generations, 2);
}

#[tokio::test]
async fn test_no_default_reply_stops() {
    let backend = Arc::new(ScriptedBackend::repeating("Here is the answer."));
    let mut chat = ConversationLoop::new(assistant(&backend), ExecutionProxy::without_tools(PROXY))
        .settings(LoopSettings {
            default_auto_reply: None,
            ..settings(10)
        });

    let outcome = chat.run("Answer once.").await;
    assert_eq!(outcome.reason(), Some(TerminationReason::NoFurtherInstruction));
    assert_eq!(outcome.generations, 1);
}

#[tokio::test]
async fn test_always_mode_without_human_waits() {
    let backend = Arc::new(ScriptedBackend::with_replies(["Draft ready.", "TERMINATE"]));
    let mut chat = ConversationLoop::new(assistant(&backend), ExecutionProxy::without_tools(PROXY))
        .settings(LoopSettings {
            human_input_mode: HumanInputMode::Always,
            ..settings(5)
        });

    let outcome = chat.run("Draft a memo.").await;
    assert_eq!(outcome.state, ChatState::AwaitUser);
    assert_eq!(backend.call_count(), 1);

    let outcome = chat.continue_with("Looks good, finish up.").await;
    assert_eq!(outcome.reason(), Some(TerminationReason::Predicate));
    assert_eq!(chat.transcript().len(), 4);
}

#[tokio::test]
async fn test_human_feedback_then_exit() {
    let backend = Arc::new(ScriptedBackend::with_replies(["Draft one.", "Draft two."]));
    let human = Arc::new(ScriptedHuman::new([
        Some("Make it shorter.".to_string()),
        Some("exit".to_string()),
    ]));
    let mut chat = ConversationLoop::new(assistant(&backend), ExecutionProxy::without_tools(PROXY))
        .settings(LoopSettings {
            human_input_mode: HumanInputMode::Always,
            ..settings(5)
        })
        .human(human.clone());

    let outcome = chat.run("Draft a memo.").await;

    assert_eq!(outcome.reason(), Some(TerminationReason::HumanDenied));
    assert_eq!(outcome.final_reply.as_deref(), Some("Draft two."));
    assert_eq!(human.prompts().len(), 2);
    let feedback = &chat.transcript().turns()[2];
    assert_eq!(feedback.role, SpeakerRole::User);
    assert_eq!(feedback.content, "Make it shorter.");
}

#[tokio::test]
async fn test_terminate_mode_gets_last_word() {
    let backend = Arc::new(ScriptedBackend::with_replies(["TERMINATE", "Added the chart. TERMINATE", "TERMINATE"]));
    let human = Arc::new(ScriptedHuman::new([Some("Add a chart.".to_string()), None]));
    let mut chat = ConversationLoop::new(assistant(&backend), ExecutionProxy::without_tools(PROXY))
        .settings(LoopSettings {
            human_input_mode: HumanInputMode::Terminate,
            ..settings(5)
        })
        .human(human.clone());

    let outcome = chat.run("Write the report.").await;

    assert_eq!(outcome.reason(), Some(TerminationReason::Predicate));
    assert_eq!(human.prompts().len(), 2);
    assert_eq!(backend.call_count(), 3);

    // The first TERMINATE was overruled, only the last one ended the loop
    let terminal: Vec<usize> = chat
        .transcript()
        .turns()
        .iter()
        .enumerate()
        .filter(|(_, t)| t.terminal)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(terminal, [chat.transcript().len() - 1]);
}

#[tokio::test]
async fn test_cancellation_interrupts_generation() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .stall(Duration::from_secs(30))
            .reply("too late"),
    );
    let cancel = CancellationToken::new();
    let mut chat = ConversationLoop::new(assistant(&backend), ExecutionProxy::without_tools(PROXY))
        .cancellation(cancel.clone());

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let outcome = tokio::time::timeout(Duration::from_secs(5), chat.run("Wait for it."))
        .await
        .expect("cancellation should end the run promptly");

    assert_eq!(outcome.state, ChatState::Cancelled);
    assert_eq!(chat.transcript().len(), 1);
}

#[tokio::test]
async fn test_cancellation_interrupts_feedback_prompt() {
    let backend = Arc::new(ScriptedBackend::with_replies(["Draft ready."]));
    let mut chat = ConversationLoop::new(assistant(&backend), ExecutionProxy::without_tools(PROXY))
        .settings(LoopSettings {
            human_input_mode: HumanInputMode::Always,
            ..settings(5)
        })
        .human(Arc::new(AwayFromKeyboard));
    cancel_soon(chat.cancellation_token());

    let outcome = tokio::time::timeout(Duration::from_secs(5), chat.run("Draft a memo."))
        .await
        .expect("cancellation should end the run promptly");

    assert_eq!(outcome.state, ChatState::Cancelled);
    assert_eq!(chat.transcript().len(), 2);
}

#[tokio::test]
async fn test_cancellation_interrupts_termination_prompt() {
    let backend = Arc::new(ScriptedBackend::with_replies(["TERMINATE"]));
    let mut chat = ConversationLoop::new(assistant(&backend), ExecutionProxy::without_tools(PROXY))
        .settings(LoopSettings {
            human_input_mode: HumanInputMode::Terminate,
            ..settings(5)
        })
        .human(Arc::new(AwayFromKeyboard));
    cancel_soon(chat.cancellation_token());

    let outcome = tokio::time::timeout(Duration::from_secs(5), chat.run("Finish up."))
        .await
        .expect("cancellation should end the run promptly");

    assert_eq!(outcome.state, ChatState::Cancelled);
    assert!(chat.transcript().turns().iter().all(|t| !t.terminal));
}

#[tokio::test]
async fn test_new_run_after_cancellation() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .stall(Duration::from_secs(30))
            .reply("TERMINATE"),
    );
    let mut chat = ConversationLoop::new(assistant(&backend), ExecutionProxy::without_tools(PROXY))
        .settings(LoopSettings {
            human_input_mode: HumanInputMode::Never,
            ..settings(5)
        });
    cancel_soon(chat.cancellation_token());

    let first = tokio::time::timeout(Duration::from_secs(5), chat.run("first"))
        .await
        .expect("cancellation should end the run promptly");
    assert_eq!(first.state, ChatState::Cancelled);
    assert!(chat.cancellation_token().is_cancelled());

    chat.reset();
    assert!(!chat.cancellation_token().is_cancelled());

    let second = chat.run("second").await;
    assert_eq!(second.reason(), Some(TerminationReason::Predicate));
    assert_eq!(chat.transcript().len(), 2);
}

#[test]
fn test_build_without_backend_is_config_error() {
    let err = AgentBuilder::new(RoleProfile::new("Assistant", "Help."))
        .build_without_tools()
        .unwrap_err();
    assert!(matches!(err, ConclaveError::Config(_)));
}
