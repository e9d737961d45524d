//! Conversation loop state management
//!
//! Tracks where a loop is, why it stopped, and the counters that bound it.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::{SpeakerRole, Turn};

/// Decides whether a participant reply ends its loop
pub type TerminationPredicate = Arc<dyn Fn(&Turn) -> bool + Send + Sync>;

/// Predicate matching a reply whose trimmed content is exactly `token`
pub fn token_predicate(token: impl Into<String>) -> TerminationPredicate {
    let token = token.into();
    Arc::new(move |turn: &Turn| {
        turn.role == SpeakerRole::Participant && turn.content.trim() == token
    })
}

/// Why a loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The termination predicate matched a reply
    Predicate,
    /// The consecutive auto-reply bound was reached
    MaxAutoReply,
    /// The generation bound was reached
    MaxTurns,
    /// A human declined to continue
    HumanDenied,
    /// A plain reply arrived and the proxy had nothing to say back
    NoFurtherInstruction,
    /// The model backend kept failing after retries
    BackendFailure,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TerminationReason::Predicate => "termination message received",
            TerminationReason::MaxAutoReply => "maximum consecutive auto replies reached",
            TerminationReason::MaxTurns => "maximum turns reached",
            TerminationReason::HumanDenied => "human ended the conversation",
            TerminationReason::NoFurtherInstruction => "no further instruction",
            TerminationReason::BackendFailure => "model backend failed",
        };
        f.write_str(text)
    }
}

/// Where a loop is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum ChatState {
    /// Waiting for the caller to send a message
    AwaitUser,
    /// A participant is producing a reply
    Generating,
    /// Tool calls are being executed
    AwaitToolResult,
    /// The loop ended and will not generate again on its own
    Terminated(TerminationReason),
    /// The caller cancelled the run
    Cancelled,
}

impl ChatState {
    /// Whether the loop is finished for good
    pub fn is_final(&self) -> bool {
        matches!(self, ChatState::Terminated(_) | ChatState::Cancelled)
    }

    pub fn reason(&self) -> Option<TerminationReason> {
        match self {
            ChatState::Terminated(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Counters bounding one drive of a loop
#[derive(Debug, Clone)]
pub struct LoopState {
    /// Participant generations so far
    pub generations: usize,
    /// Bound on generations, if any
    pub max_turns: Option<usize>,
    /// Consecutive automatic proxy replies
    pub auto_replies: usize,
    /// Bound on consecutive automatic replies
    pub max_auto_reply: usize,
}

impl LoopState {
    pub fn new(max_turns: Option<usize>, max_auto_reply: usize) -> Self {
        Self {
            generations: 0,
            max_turns,
            auto_replies: 0,
            max_auto_reply,
        }
    }

    /// Whether another generation is allowed
    pub fn can_generate(&self) -> bool {
        self.max_turns.is_none_or(|max| self.generations < max)
    }

    /// Whether the proxy may reply automatically once more
    pub fn can_auto_reply(&self) -> bool {
        self.auto_replies < self.max_auto_reply
    }

    pub fn record_generation(&mut self) {
        self.generations += 1;
    }

    pub fn record_auto_reply(&mut self) {
        self.auto_replies += 1;
    }

    /// A human or caller message restarts the consecutive count
    pub fn reset_auto_replies(&mut self) {
        self.auto_replies = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_predicate_is_exact() {
        let done = token_predicate("TERMINATE");
        assert!(done(&Turn::reply("A", "  TERMINATE\n")));
        assert!(!done(&Turn::reply("A", "All good. TERMINATE")));
        assert!(!done(&Turn::user("user", "TERMINATE")));
    }

    #[test]
    fn test_loop_bounds() {
        let mut state = LoopState::new(Some(2), 1);
        assert!(state.can_generate());
        state.record_generation();
        state.record_generation();
        assert!(!state.can_generate());

        assert!(state.can_auto_reply());
        state.record_auto_reply();
        assert!(!state.can_auto_reply());
        state.reset_auto_replies();
        assert!(state.can_auto_reply());
    }

    #[test]
    fn test_unbounded_turns() {
        let mut state = LoopState::new(None, 0);
        for _ in 0..100 {
            state.record_generation();
        }
        assert!(state.can_generate());
        assert!(!state.can_auto_reply());
    }

    #[test]
    fn test_final_states() {
        assert!(ChatState::Cancelled.is_final());
        assert!(ChatState::Terminated(TerminationReason::Predicate).is_final());
        assert!(!ChatState::AwaitUser.is_final());
        assert_eq!(
            ChatState::Terminated(TerminationReason::MaxTurns).reason(),
            Some(TerminationReason::MaxTurns)
        );
    }
}
