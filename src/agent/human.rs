//! Human input handlers
//!
//! Loops consult a [`HumanInput`] according to their human input mode. An
//! answer of `None` (or "exit") ends the conversation, an empty answer lets the
//! loop continue on its own, anything else becomes a new user message.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::{ConclaveError, Result};

/// Source of human feedback
#[async_trait]
pub trait HumanInput: Send + Sync {
    async fn ask(&self, prompt: &str) -> Option<String>;
}

/// What a loop does with a human answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HumanReply {
    /// Stop the conversation
    Exit,
    /// Proceed as if no human were present
    Skip,
    /// Continue with this message
    Message(String),
}

impl HumanReply {
    pub(crate) fn from_answer(answer: Option<String>) -> Self {
        match answer {
            None => HumanReply::Exit,
            Some(text) if text.trim().eq_ignore_ascii_case("exit") => HumanReply::Exit,
            Some(text) if text.trim().is_empty() => HumanReply::Skip,
            Some(text) => HumanReply::Message(text),
        }
    }
}

/// Ask `human` and classify the answer, giving up once `cancel` fires
pub(crate) async fn ask_human(
    human: &dyn HumanInput,
    prompt: &str,
    cancel: &CancellationToken,
) -> Result<HumanReply> {
    tokio::select! {
        _ = cancel.cancelled() => Err(ConclaveError::Cancelled),
        answer = human.ask(prompt) => Ok(HumanReply::from_answer(answer)),
    }
}

/// Prompt shown before a continuation
pub(crate) fn feedback_prompt(participant: &str) -> String {
    format!(
        "Provide feedback to {}. Press enter to skip and use auto-reply, or type 'exit' to end the conversation:",
        participant
    )
}

/// Prompt shown when a loop is about to end
pub(crate) fn termination_prompt(participant: &str) -> String {
    format!(
        "{} is done. Type a message to continue the conversation, or press enter to end it:",
        participant
    )
}

/// Replays prepared answers; answers `None` once they run out
#[derive(Debug, Default)]
pub struct ScriptedHuman {
    answers: Mutex<VecDeque<Option<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedHuman {
    pub fn new<I>(answers: I) -> Self
    where
        I: IntoIterator<Item = Option<String>>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl HumanInput for ScriptedHuman {
    async fn ask(&self, prompt: &str) -> Option<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        self.answers.lock().ok()?.pop_front().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_classification() {
        assert_eq!(HumanReply::from_answer(None), HumanReply::Exit);
        assert_eq!(HumanReply::from_answer(Some(" Exit ".into())), HumanReply::Exit);
        assert_eq!(HumanReply::from_answer(Some("  ".into())), HumanReply::Skip);
        assert_eq!(
            HumanReply::from_answer(Some("use 2024 data".into())),
            HumanReply::Message("use 2024 data".into())
        );
    }

    #[tokio::test]
    async fn test_ask_gives_up_on_cancel() {
        struct Absent;

        #[async_trait]
        impl HumanInput for Absent {
            async fn ask(&self, _prompt: &str) -> Option<String> {
                std::future::pending().await
            }
        }

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = ask_human(&Absent, "?", &cancel).await.unwrap_err();
        assert!(matches!(err, ConclaveError::Cancelled));

        let human = ScriptedHuman::new([Some(String::new())]);
        let reply = ask_human(&human, "?", &CancellationToken::new()).await.unwrap();
        assert_eq!(reply, HumanReply::Skip);
    }

    #[tokio::test]
    async fn test_scripted_human_runs_out() {
        let human = ScriptedHuman::new([Some("go on".to_string())]);
        assert_eq!(human.ask("?").await.as_deref(), Some("go on"));
        assert_eq!(human.ask("?").await, None);
        assert_eq!(human.prompts().len(), 2);
    }
}
