//! Reflection supervisor integration tests

use std::sync::Arc;
use std::time::Duration;

use conclave::agent::{
    AgentBuilder, ConversationLoop, ExecutionProxy, Participant, ReflectiveChat, RetryPolicy,
    RoleProfile, TerminationReason,
};
use conclave::core::TurnKind;
use conclave::llm::ScriptedBackend;
use conclave::tools::{FunctionTool, ToolCatalog, ToolOutput, ToolRegistry, ToolSpec};
use conclave::ConclaveError;

const PROXY: &str = "User_Proxy";

fn participant(profile: RoleProfile, backend: &Arc<ScriptedBackend>) -> Participant {
    AgentBuilder::new(profile)
        .backend(backend.clone())
        .retry(RetryPolicy {
            max_retries: 0,
            base_delay: Duration::ZERO,
        })
        .build_without_tools()
        .unwrap()
}

fn shadowed(primary: &Arc<ScriptedBackend>, reviewer: &Arc<ScriptedBackend>) -> ReflectiveChat {
    let inner = ConversationLoop::new(
        participant(RoleProfile::new("Analyst", "Answer financial questions."), primary),
        ExecutionProxy::without_tools(PROXY),
    );
    let reviewer = participant(
        RoleProfile::new("Reviewer", "Critique answers for accuracy."),
        reviewer,
    );
    ReflectiveChat::new(inner, reviewer).unwrap()
}

#[tokio::test]
async fn test_empty_critique_ends_after_one_round() {
    let primary = Arc::new(ScriptedBackend::with_replies(["Revenue grew 10%.", "TERMINATE"]));
    let reviewer = Arc::new(ScriptedBackend::with_replies([""]));
    let mut chat = shadowed(&primary, &reviewer);

    let outcome = chat.run("How did revenue change?").await;

    assert!(outcome.approved);
    assert_eq!(outcome.rounds, 1);
    assert_eq!(reviewer.call_count(), 1);
    assert_eq!(primary.call_count(), 2);
    assert_eq!(outcome.chat.final_reply.as_deref(), Some("Revenue grew 10%."));
}

#[tokio::test]
async fn test_critique_drives_hidden_revision() {
    let primary = Arc::new(ScriptedBackend::with_replies([
        "Revenue grew 10%.",
        "TERMINATE",
        "Revenue grew 12% per the 10-K.",
        "TERMINATE",
    ]));
    let reviewer = Arc::new(ScriptedBackend::with_replies(["Cite the source.", "OK"]));
    let mut chat = shadowed(&primary, &reviewer);

    let outcome = chat.run("How did revenue change?").await;

    assert!(outcome.approved);
    assert_eq!(outcome.rounds, 2);
    assert_eq!(outcome.critiques, ["Cite the source.", "OK"]);
    assert_eq!(outcome.chat.reason(), Some(TerminationReason::Predicate));
    assert_eq!(
        outcome.chat.final_reply.as_deref(),
        Some("Revenue grew 12% per the 10-K.")
    );

    // The directive reaches the model but not the visible transcript
    let transcript = chat.transcript();
    let directives = transcript
        .turns()
        .iter()
        .filter(|t| t.kind == TurnKind::RevisionDirective)
        .count();
    assert_eq!(directives, 1);
    assert!(transcript
        .visible()
        .all(|t| t.kind != TurnKind::RevisionDirective));
    let revision_request = &primary.requests()[2];
    assert!(revision_request
        .messages
        .iter()
        .any(|m| m.content.contains("Cite the source.")));

    // The reviewer judged the latest answer in its own transcript
    let review = chat.review_transcript().turns()[0].content.clone();
    assert!(review.contains("Revenue grew 12% per the 10-K."));
}

#[tokio::test]
async fn test_round_limit_leaves_unapproved() {
    let primary = Arc::new(ScriptedBackend::repeating("TERMINATE").reply("Draft.").reply("TERMINATE"));
    let reviewer = Arc::new(ScriptedBackend::repeating("Still wrong."));
    let mut chat = shadowed(&primary, &reviewer).max_rounds(1);

    let outcome = chat.run("Value the company.").await;

    assert!(!outcome.approved);
    assert_eq!(outcome.rounds, 1);
    assert_eq!(reviewer.call_count(), 1);
}

#[tokio::test]
async fn test_failed_run_is_not_reviewed() {
    let primary = Arc::new(ScriptedBackend::new().fail("model offline"));
    let reviewer = Arc::new(ScriptedBackend::repeating("OK"));
    let mut chat = shadowed(&primary, &reviewer);

    let outcome = chat.run("Anything.").await;

    assert_eq!(outcome.chat.reason(), Some(TerminationReason::BackendFailure));
    assert_eq!(outcome.rounds, 0);
    assert_eq!(reviewer.call_count(), 0);
}

#[test]
fn test_reviewer_with_tools_rejected() {
    let backend = Arc::new(ScriptedBackend::new());
    let inner = ConversationLoop::new(
        participant(RoleProfile::new("Analyst", "Answer."), &backend),
        ExecutionProxy::without_tools(PROXY),
    );

    let catalog = ToolCatalog::new()
        .with(ToolSpec::function(
            FunctionTool::new("quote", "Latest quote").sync_handler(|_| Ok(ToolOutput::from(101.5))),
        ))
        .unwrap();
    let mut registry = ToolRegistry::new();
    let reviewer = AgentBuilder::new(RoleProfile::new("Reviewer", "Critique.").with_tools(["quote"]))
        .backend(backend.clone())
        .build(&catalog, &mut registry, PROXY)
        .unwrap();

    let err = ReflectiveChat::new(inner, reviewer).err().unwrap();
    assert!(matches!(err, ConclaveError::Config(_)));
}
