//! Transcript management
//!
//! An append-only sequence of turns, and the translation from turns to the
//! message list a given participant's model sees.

use serde::{Deserialize, Serialize};

use crate::core::{Message, SpeakerRole, Turn, TurnKind};

/// Ordered, append-only record of a conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn and return its index
    pub fn push(&mut self, turn: Turn) -> usize {
        self.turns.push(turn);
        self.turns.len() - 1
    }

    /// Flag the most recent turn as the one that ended its loop
    pub fn mark_last_terminal(&mut self) {
        if let Some(turn) = self.turns.last_mut() {
            turn.terminal = true;
        }
    }

    /// Every turn, hidden ones included
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Turns a caller is meant to see
    pub fn visible(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter().filter(|t| !t.hidden)
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Last turn produced by a model-backed participant
    pub fn last_participant_turn(&self) -> Option<&Turn> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == SpeakerRole::Participant && t.kind != TurnKind::DelegationSummary)
    }

    /// Start a fresh conversation scope
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Build the message list `viewer` sends to its model.
    ///
    /// The viewer's own turns become assistant messages; tool results answering
    /// the viewer's own calls become tool messages. Everything else is a user
    /// message, prefixed with the speaker's name when another participant
    /// said it.
    pub fn to_messages(&self, viewer: &str, system_prompt: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.turns.len() + 1);
        if !system_prompt.is_empty() {
            messages.push(Message::system(system_prompt));
        }

        let mut last_caller: Option<&str> = None;
        for turn in &self.turns {
            match turn.kind {
                TurnKind::ToolCall if turn.speaker == viewer => {
                    let mut msg = Message::assistant(turn.content.clone());
                    msg.tool_calls = Some(turn.tool_calls.clone());
                    messages.push(msg);
                }
                TurnKind::ToolCall => {
                    let calls: Vec<String> = turn
                        .tool_calls
                        .iter()
                        .map(|c| format!("{}({})", c.name, c.arguments))
                        .collect();
                    let mut text = format!("{}: ", turn.speaker);
                    if !turn.content.is_empty() {
                        text.push_str(&turn.content);
                        text.push('\n');
                    }
                    text.push_str(&format!("requested {}", calls.join(", ")));
                    messages.push(Message::user(text));
                }
                TurnKind::ToolResult if last_caller == Some(viewer) => {
                    messages.extend(turn.tool_results.iter().map(|r| Message::tool(r.output.clone())));
                }
                TurnKind::ToolResult => {
                    messages.push(Message::user(format!("{}: {}", turn.speaker, turn.content)));
                }
                _ if turn.role == SpeakerRole::Participant && turn.speaker == viewer => {
                    messages.push(Message::assistant(turn.content.clone()));
                }
                _ if turn.role == SpeakerRole::Participant => {
                    messages.push(Message::user(format!("{}: {}", turn.speaker, turn.content)));
                }
                _ => messages.push(Message::user(turn.content.clone())),
            }

            if turn.kind == TurnKind::ToolCall {
                last_caller = Some(turn.speaker.as_str());
            }
        }
        messages
    }

    /// Plain-text rendering of the visible turns, one speaker line each
    pub fn render(&self) -> String {
        self.visible()
            .map(|t| match t.kind {
                TurnKind::ToolCall => {
                    let names: Vec<&str> = t.tool_calls.iter().map(|c| c.name.as_str()).collect();
                    format!("{}: {} [calls: {}]", t.speaker, t.content, names.join(", "))
                }
                _ => format!("{}: {}", t.speaker, t.content),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Turn;
    type IntoIter = std::slice::Iter<'a, Turn>;

    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ToolCall, ToolResultRecord};
    use serde_json::json;

    fn sample() -> Transcript {
        let call = ToolCall::new("add", json!({"a": 2, "b": 3})).with_id("c1");
        let mut t = Transcript::new();
        t.push(Turn::user("User_Proxy", "What is 2+3?"));
        t.push(Turn::tool_call("Analyst", "", vec![call.clone()]));
        t.push(Turn::tool_result("User_Proxy", vec![ToolResultRecord::success(&call, "5")]));
        t.push(Turn::reply("Analyst", "It is 5."));
        t
    }

    #[test]
    fn test_messages_for_caller() {
        let messages = sample().to_messages("Analyst", "You add numbers.");
        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, ["system", "user", "assistant", "tool", "assistant"]);
        assert_eq!(messages[3].content, "5");
        assert!(messages[2].tool_calls.is_some());
    }

    #[test]
    fn test_messages_for_other_participant() {
        let messages = sample().to_messages("Reviewer", "");
        assert!(messages.iter().all(|m| m.role == "user"));
        assert!(messages[1].content.starts_with("Analyst: requested add("));
        assert_eq!(messages[2].content, "User_Proxy: 5");
        assert_eq!(messages[3].content, "Analyst: It is 5.");
    }

    #[test]
    fn test_hidden_turns_reach_model_only() {
        let mut t = sample();
        t.push(Turn::revision_directive("Reviewer", "Show your work."));
        assert_eq!(t.visible().count(), 4);
        let messages = t.to_messages("Analyst", "");
        assert_eq!(messages.last().unwrap().content, "Show your work.");
    }

    #[test]
    fn test_last_participant_turn() {
        let mut t = sample();
        t.push(Turn::delegation_summary("Worker", "done"));
        assert_eq!(t.last_participant_turn().unwrap().content, "It is 5.");
    }

    #[test]
    fn test_mark_last_terminal() {
        let mut t = sample();
        t.mark_last_terminal();
        assert!(t.last().unwrap().terminal);
        assert!(!t.turns()[0].terminal);
    }
}
