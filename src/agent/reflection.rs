//! Reflection supervision
//!
//! A tool-less reviewer critiques the primary participant's final answer on
//! its own private transcript. Critiques are folded back into the primary
//! conversation as hidden revision directives until the reviewer is satisfied
//! or the round limit is reached.

use tracing::{info, warn};

use crate::agent::conversation::{ChatOutcome, ConversationLoop, NoHook, ReplyHook};
use crate::agent::loop_state::{ChatState, TerminationReason};
use crate::agent::participant::Participant;
use crate::agent::transcript::Transcript;
use crate::core::{ConclaveError, Result, Turn};

const REVIEW_TEMPLATE: &str = "Review the answer below to the given task. Point out factual \
errors, missing steps and unsupported claims, and say concretely what to change. If the \
answer needs no changes, reply with OK only.\n\n\
TASK:\n{task}\n\nANSWER:\n{answer}";

const REVISION_TEMPLATE: &str = "A reviewer examined your previous answer and asked for changes:\n\
{critique}\n\nRevise your answer accordingly and give the complete revised answer.";

/// Whether a critique approves the answer
pub fn is_affirmative(critique: &str) -> bool {
    let text = critique.trim().trim_end_matches(['.', '!']).to_ascii_uppercase();
    text.is_empty()
        || ["OK", "LGTM", "APPROVED", "NO CHANGES", "NO ISSUES", "TERMINATE"]
            .iter()
            .any(|word| text == *word)
}

/// Outcome of a supervised run
#[derive(Debug, Clone)]
pub struct ReflectionOutcome {
    /// Outcome of the last primary drive
    pub chat: ChatOutcome,
    /// Critique rounds performed
    pub rounds: usize,
    /// Whether the reviewer ended up satisfied
    pub approved: bool,
    /// Every critique, in order
    pub critiques: Vec<String>,
}

/// A conversation loop shadowed by a silent reviewer
pub struct ReflectiveChat<H: ReplyHook = NoHook> {
    inner: ConversationLoop<H>,
    reviewer: Participant,
    review: Transcript,
    max_rounds: usize,
}

impl<H: ReplyHook> ReflectiveChat<H> {
    /// Wrap `inner`; a reviewer with tools is a configuration error
    pub fn new(inner: ConversationLoop<H>, reviewer: Participant) -> Result<Self> {
        if !reviewer.tools().is_empty() {
            return Err(ConclaveError::config(format!(
                "reviewer '{}' may not have tools",
                reviewer.name()
            )));
        }
        Ok(Self {
            inner,
            reviewer,
            review: Transcript::new(),
            max_rounds: 2,
        })
    }

    pub fn max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn inner(&self) -> &ConversationLoop<H> {
        &self.inner
    }

    /// The primary transcript, hidden directives included
    pub fn transcript(&self) -> &Transcript {
        self.inner.transcript()
    }

    /// The reviewer's private transcript of the last round
    pub fn review_transcript(&self) -> &Transcript {
        &self.review
    }

    pub async fn run(&mut self, task: impl Into<String>) -> ReflectionOutcome {
        let task = task.into();
        let mut chat = self.inner.run(task.clone()).await;
        let mut rounds = 0;
        let mut critiques = Vec::new();

        let approved = loop {
            if !reviewable(&chat) || rounds >= self.max_rounds {
                break false;
            }
            let Some(answer) = chat.final_reply.clone() else {
                break false;
            };

            rounds += 1;
            let critique = match self.critique(&task, &answer).await {
                Ok(critique) => critique,
                Err(e) => {
                    warn!(reviewer = self.reviewer.name(), error = %e, "review failed");
                    break false;
                }
            };
            critiques.push(critique.clone());

            if is_affirmative(&critique) {
                info!(rounds, "reviewer approved the answer");
                break true;
            }

            info!(round = rounds, "revision requested");
            let directive = Turn::revision_directive(
                self.reviewer.name(),
                REVISION_TEMPLATE.replace("{critique}", &critique),
            );
            chat = self.inner.continue_with_turn(directive).await;
        };

        ReflectionOutcome {
            chat,
            rounds,
            approved,
            critiques,
        }
    }

    async fn critique(&mut self, task: &str, answer: &str) -> Result<String> {
        self.review.clear();
        self.review.push(Turn::user(
            self.inner.proxy().name(),
            REVIEW_TEMPLATE
                .replace("{task}", task)
                .replace("{answer}", answer),
        ));
        let reply = self
            .reviewer
            .generate(&self.review, self.inner.cancellation_token())
            .await?;
        self.review.push(Turn::reply(self.reviewer.name(), reply.content.clone()));
        Ok(reply.content.trim().to_string())
    }
}

/// Only answers from loops that finished on their own are worth reviewing
fn reviewable(chat: &ChatOutcome) -> bool {
    match chat.state {
        ChatState::Terminated(reason) => !matches!(
            reason,
            TerminationReason::BackendFailure | TerminationReason::HumanDenied
        ),
        ChatState::AwaitUser => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affirmative_critiques() {
        assert!(is_affirmative(""));
        assert!(is_affirmative("  ok. "));
        assert!(is_affirmative("LGTM!"));
        assert!(!is_affirmative("OK, but cite the 10-K."));
        assert!(!is_affirmative("The growth rate is wrong."));
    }

    #[test]
    fn test_failed_runs_not_reviewed() {
        let outcome = |state| ChatOutcome {
            state,
            final_reply: Some("x".into()),
            generations: 1,
        };
        assert!(reviewable(&outcome(ChatState::Terminated(TerminationReason::Predicate))));
        assert!(!reviewable(&outcome(ChatState::Cancelled)));
        assert!(!reviewable(&outcome(ChatState::Terminated(
            TerminationReason::BackendFailure
        ))));
    }
}
