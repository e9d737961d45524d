//! Leader/worker delegation through nested chats
//!
//! A leader addresses a worker with a line of the form `[Worker_Name] task`.
//! The [`Delegator`] hook picks that up, runs the worker in a private nested
//! loop, condenses the nested transcript with a summarizer and hands the
//! summary back to the leader as the worker's reply.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::conversation::{ConversationLoop, LoopSettings, ReplyHook};
use crate::agent::loop_state::{ChatState, TerminationPredicate};
use crate::agent::participant::Participant;
use crate::agent::profile::RoleProfile;
use crate::agent::proxy::ExecutionProxy;
use crate::agent::transcript::Transcript;
use crate::core::config::DelegationConfig;
use crate::core::{ConclaveError, HumanInputMode, Result, SpeakerRole, Turn};

/// A leader loop whose replies may delegate to workers
pub type LeaderChat = ConversationLoop<Delegator>;

const ORDER_TEMPLATE: &str = "Follow leader's order and complete the following task: {order}\n\
For coding tasks, only use the functions you have been provided with.\n\
Reply {token} when the task is done.";

/// A parsed `[Worker] instruction` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub worker: String,
    pub instruction: String,
}

/// Find the first addressing line in a leader reply.
///
/// The worker name must start with a letter and hold only letters, digits,
/// `_`, `-` or spaces. Lines following the addressing line, up to the next
/// addressing line, are part of the instruction.
pub fn parse_directive(content: &str) -> Option<Directive> {
    let mut lines = content.lines();
    let (worker, first) = lines.by_ref().find_map(addressing_line)?;

    let mut instruction = first.to_string();
    for line in lines {
        if addressing_line(line).is_some() {
            break;
        }
        instruction.push('\n');
        instruction.push_str(line);
    }

    let instruction = instruction.trim().to_string();
    if instruction.is_empty() {
        return None;
    }
    Some(Directive {
        worker: worker.to_string(),
        instruction,
    })
}

fn addressing_line(line: &str) -> Option<(&str, &str)> {
    let rest = line.trim_start().strip_prefix('[')?;
    let end = rest.find(']')?;
    let name = rest[..end].trim();
    let valid = name.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ' '));
    valid.then(|| (name, rest[end + 1..].trim()))
}

/// Role profile for a leader coordinating `workers` (name, responsibility)
pub fn leader_profile(name: &str, workers: &[(String, String)], token: &str) -> RoleProfile {
    let group = workers
        .iter()
        .map(|(worker, duty)| {
            if duty.is_empty() {
                format!("- {}", worker)
            } else {
                format!("- {}: {}", worker, duty)
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    let instructions = format!(
        "You are the leader of the following group members:\n\n{group}\n\n\
         As a group leader, you are responsible for coordinating the team's efforts to \
         achieve the project's objectives. You must ensure that the team is working \
         together effectively and efficiently.\n\
         - Summarize the status of the project.\n\
         - Delegate tasks to the members of your group and monitor their progress.\n\
         - Evaluate the completed work and either accept it or ask for rework.\n\n\
         Whenever you delegate a task, put it on its own line in exactly this form:\n\
         [<Member_Name>] <instruction>\n\
         Address one member per reply and wait for the result before delegating again.\n\
         Reply {token} when everything is done."
    );
    RoleProfile::new(name, instructions).with_description("Coordinates the group.")
}

/// One completed delegation
#[derive(Debug, Clone)]
pub struct DelegationRecord {
    pub worker: String,
    pub instruction: String,
    pub transcript: Transcript,
    pub state: ChatState,
    pub summary: String,
}

/// Runs nested worker chats on behalf of a leader
pub struct Delegator {
    workers: Vec<Participant>,
    proxy: ExecutionProxy,
    summarizer: Participant,
    config: DelegationConfig,
    settings: LoopSettings,
    predicate: TerminationPredicate,
    token: String,
    records: Vec<DelegationRecord>,
}

impl Delegator {
    /// `summarizer` must not have tools; `settings` shape each nested loop and
    /// are clamped by the delegation bounds
    pub fn new(
        workers: Vec<Participant>,
        proxy: ExecutionProxy,
        summarizer: Participant,
        config: DelegationConfig,
        predicate: TerminationPredicate,
        token: impl Into<String>,
    ) -> Result<Self> {
        if workers.is_empty() {
            return Err(ConclaveError::config("a leader needs at least one worker"));
        }
        if !summarizer.tools().is_empty() {
            return Err(ConclaveError::config("the summarizer may not have tools"));
        }
        let settings = LoopSettings {
            max_auto_reply: config.max_auto_reply,
            max_turns: Some(config.max_turns),
            human_input_mode: HumanInputMode::Never,
            ..LoopSettings::default()
        };
        Ok(Self {
            workers,
            proxy,
            summarizer,
            config,
            settings,
            predicate,
            token: token.into(),
            records: Vec::new(),
        })
    }

    /// Override how nested loops continue after a plain worker reply
    pub fn default_auto_reply(mut self, reply: Option<String>) -> Self {
        self.settings.default_auto_reply = reply;
        self
    }

    pub fn workers(&self) -> &[Participant] {
        &self.workers
    }

    /// Delegations completed so far, oldest first
    pub fn records(&self) -> &[DelegationRecord] {
        &self.records
    }

    fn order(&self, instruction: &str) -> String {
        ORDER_TEMPLATE
            .replace("{order}", instruction)
            .replace("{token}", &self.token)
    }

    /// Condense a nested transcript with a dedicated model call
    async fn summarize(&self, transcript: &Transcript, cancel: &CancellationToken) -> Result<String> {
        let mut request = Transcript::new();
        request.push(Turn::user(
            self.proxy.name(),
            format!(
                "{}\n\n=== CONVERSATION ===\n{}\n=== END CONVERSATION ===",
                self.config.summary_prompt,
                transcript.render()
            ),
        ));
        let reply = self.summarizer.generate(&request, cancel).await?;
        Ok(reply.content.trim().to_string())
    }
}

#[async_trait]
impl ReplyHook for Delegator {
    async fn on_reply(&mut self, reply: &Turn, cancel: &CancellationToken) -> Option<Turn> {
        let directive = parse_directive(&reply.content)?;

        let Some(worker) = self.workers.iter().find(|w| w.name() == directive.worker) else {
            let known: Vec<&str> = self.workers.iter().map(|w| w.name()).collect();
            warn!(worker = %directive.worker, "leader addressed an unknown worker");
            let err = ConclaveError::delegation(format!(
                "unknown worker '{}'. Address one of: {}",
                directive.worker,
                known.join(", ")
            ));
            return Some(Turn::error(self.proxy.name(), SpeakerRole::System, err.to_string()));
        };

        info!(worker = %directive.worker, "delegating");
        let mut nested = ConversationLoop::new(worker.clone(), self.proxy.clone())
            .settings(self.settings.clone())
            .predicate(self.predicate.clone())
            .cancellation(cancel.child_token());
        // A fresh loop; `continue_with` keeps the parent's cancellation
        let outcome = nested.continue_with(self.order(&directive.instruction)).await;
        let transcript = nested.transcript().clone();

        if outcome.state == ChatState::Cancelled {
            return Some(Turn::error(
                self.proxy.name(),
                SpeakerRole::System,
                format!("Delegation to {} was cancelled", directive.worker),
            ));
        }

        let summary = match self.summarize(&transcript, cancel).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(worker = %directive.worker, error = %e, "summary failed");
                let err = ConclaveError::delegation(format!(
                    "could not summarize {}'s work: {}",
                    directive.worker, e
                ));
                return Some(Turn::error(self.proxy.name(), SpeakerRole::System, err.to_string()));
            }
        };

        info!(
            worker = %directive.worker,
            turns = transcript.len(),
            generations = outcome.generations,
            "delegation finished"
        );
        self.records.push(DelegationRecord {
            worker: directive.worker.clone(),
            instruction: directive.instruction,
            transcript,
            state: outcome.state,
            summary: summary.clone(),
        });
        Some(Turn::delegation_summary(directive.worker, summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_line() {
        let d = parse_directive("Plan:\n[Market_Analyst] Get NVDA's latest price.").unwrap();
        assert_eq!(d.worker, "Market_Analyst");
        assert_eq!(d.instruction, "Get NVDA's latest price.");
    }

    #[test]
    fn test_parse_multiline_stops_at_next_address() {
        let d = parse_directive(
            "[Data_Analyst] Compute returns.\nUse daily closes.\n[Accountant] Check totals.",
        )
        .unwrap();
        assert_eq!(d.worker, "Data_Analyst");
        assert_eq!(d.instruction, "Compute returns.\nUse daily closes.");
    }

    #[test]
    fn test_parse_rejects_non_directives() {
        assert!(parse_directive("All done, no delegation needed.").is_none());
        assert!(parse_directive("[1] a footnote").is_none());
        assert!(parse_directive("[Analyst]").is_none());
        assert!(parse_directive("see [Analyst] above").is_none());
    }

    #[test]
    fn test_leader_profile_lists_workers() {
        let profile = leader_profile(
            "Leader",
            &[
                ("Market_Analyst".into(), "Collect data.".into()),
                ("Accountant".into(), String::new()),
            ],
            "TERMINATE",
        );
        assert!(profile.instructions().contains("- Market_Analyst: Collect data."));
        assert!(profile.instructions().contains("- Accountant\n"));
        assert!(profile.instructions().contains("Reply TERMINATE when everything is done."));
    }
}
