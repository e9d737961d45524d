//! Terminal rendering of transcripts and outcomes

use crate::agent::{ChatOutcome, ChatState, Transcript};
use crate::core::{Turn, TurnKind};

/// The whole visible conversation
pub fn render_transcript(transcript: &Transcript) -> String {
    if transcript.is_empty() {
        return "(empty conversation)".to_string();
    }
    render_turns(transcript.turns())
}

/// One block per visible turn, labelled with speaker and kind
pub fn render_turns(turns: &[Turn]) -> String {
    turns
        .iter()
        .filter(|turn| !turn.hidden)
        .map(|turn| {
            let label = match turn.kind {
                TurnKind::ToolCall => {
                    let calls: Vec<String> = turn
                        .tool_calls
                        .iter()
                        .map(|c| format!("{}({})", c.name, c.arguments))
                        .collect();
                    format!("{} -> {}", turn.speaker, calls.join(", "))
                }
                TurnKind::ToolResult => format!("{} (tool results)", turn.speaker),
                TurnKind::CodeResult => format!("{} (code output)", turn.speaker),
                TurnKind::DelegationSummary => format!("{} (summary)", turn.speaker),
                TurnKind::Error => format!("{} (error)", turn.speaker),
                _ => turn.speaker.clone(),
            };
            if turn.content.is_empty() {
                format!("[{}]", label)
            } else {
                format!("[{}]\n{}", label, turn.content)
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Short description of how a run ended
pub fn describe_outcome(outcome: &ChatOutcome) -> String {
    match outcome.state {
        ChatState::Terminated(reason) => {
            format!("Finished after {} replies: {}", outcome.generations, reason)
        }
        ChatState::Cancelled => "Cancelled".to_string(),
        ChatState::AwaitUser => "Waiting for your input".to_string(),
        other => format!("Stopped in state {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::TerminationReason;
    use crate::core::{ToolCall, Turn};
    use serde_json::json;

    #[test]
    fn test_render_labels_kinds() {
        let mut t = Transcript::new();
        t.push(Turn::user("User_Proxy", "price?"));
        t.push(Turn::tool_call(
            "Analyst",
            "",
            vec![ToolCall::new("quote", json!({"symbol": "NVDA"}))],
        ));
        t.push(Turn::revision_directive("Reviewer", "hidden"));
        let text = render_transcript(&t);
        assert!(text.contains("[User_Proxy]\nprice?"));
        assert!(text.contains("[Analyst -> quote({\"symbol\":\"NVDA\"})]"));
        assert!(!text.contains("hidden"));
    }

    #[test]
    fn test_describe_outcome() {
        let outcome = ChatOutcome {
            state: ChatState::Terminated(TerminationReason::Predicate),
            final_reply: None,
            generations: 3,
        };
        assert_eq!(
            describe_outcome(&outcome),
            "Finished after 3 replies: termination message received"
        );
    }
}
