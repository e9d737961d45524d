//! Group orchestration over more than two participants
//!
//! All participants share one transcript. After every turn a
//! [`SpeakerSelector`] picks who speaks next.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::agent::conversation::{final_reply, ChatOutcome};
use crate::agent::human::{ask_human, feedback_prompt, HumanInput, HumanReply};
use crate::agent::loop_state::{token_predicate, ChatState, TerminationPredicate, TerminationReason};
use crate::agent::participant::Participant;
use crate::agent::profile::RoleSource;
use crate::agent::proxy::ExecutionProxy;
use crate::agent::transcript::Transcript;
use crate::core::config::DEFAULT_TERMINATION_TOKEN;
use crate::core::{ConclaveError, HumanInputMode, Result, SpeakerRole, Turn};

/// Description of a team, resolved into a group or a leader chat
#[derive(Debug, Clone, Default)]
pub struct GroupConfig {
    /// Members, in speaking order
    pub members: Vec<RoleSource>,
    /// Leader for delegated work; synthesized when absent
    pub leader: Option<RoleSource>,
    /// One responsibility per member, used to brief the leader
    pub responsibilities: Vec<String>,
    /// Who speaks first; defaults to the first member
    pub initial_speaker: Option<String>,
    /// Who speaks after every tool result; defaults to the caller
    pub broadcaster: Option<String>,
    /// Bound on turns per run; falls back to the configured default
    pub max_round: Option<usize>,
    pub human_input_mode: HumanInputMode,
}

impl GroupConfig {
    pub fn new<I>(members: I) -> Self
    where
        I: IntoIterator<Item = RoleSource>,
    {
        Self {
            members: members.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn leader(mut self, leader: impl Into<RoleSource>) -> Self {
        self.leader = Some(leader.into());
        self
    }

    pub fn responsibilities<I, S>(mut self, responsibilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.responsibilities = responsibilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn initial_speaker(mut self, name: impl Into<String>) -> Self {
        self.initial_speaker = Some(name.into());
        self
    }

    pub fn broadcaster(mut self, name: impl Into<String>) -> Self {
        self.broadcaster = Some(name.into());
        self
    }

    pub fn max_round(mut self, max_round: usize) -> Self {
        self.max_round = Some(max_round);
        self
    }

    pub fn human_input_mode(mut self, mode: HumanInputMode) -> Self {
        self.human_input_mode = mode;
        self
    }
}

/// Picks the next speaker from the shared transcript
#[derive(Debug, Clone)]
pub struct SpeakerSelector {
    order: Vec<String>,
    initial: usize,
    broadcaster: Option<usize>,
}

impl SpeakerSelector {
    /// Selector over `order`; unknown initial speaker or broadcaster names are
    /// configuration errors
    pub fn new(
        order: Vec<String>,
        initial_speaker: Option<&str>,
        broadcaster: Option<&str>,
    ) -> Result<Self> {
        if order.is_empty() {
            return Err(ConclaveError::config("a group needs at least one participant"));
        }
        let lookup = |name: &str| {
            order.iter().position(|n| n == name).ok_or_else(|| {
                ConclaveError::config(format!("'{}' is not a member of the group", name))
            })
        };
        let initial = initial_speaker.map(lookup).transpose()?.unwrap_or(0);
        let broadcaster = broadcaster.map(lookup).transpose()?;
        Ok(Self {
            order,
            initial,
            broadcaster,
        })
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.order.iter().position(|n| n == name)
    }

    /// Index of the participant that speaks next.
    ///
    /// 1. No member has spoken yet: the initial speaker.
    /// 2. Right after a user turn: the member that last held the floor.
    /// 3. Right after a tool result: the broadcaster, else the caller.
    /// 4. Otherwise round-robin, skipping members with nothing new to react to.
    pub fn next(&self, transcript: &Transcript) -> usize {
        let turns = transcript.turns();
        let Some(last_member) = turns
            .iter()
            .rposition(|t| t.role == SpeakerRole::Participant && self.index_of(&t.speaker).is_some())
        else {
            return self.initial;
        };
        let floor = self.index_of(&turns[last_member].speaker).unwrap_or(self.initial);

        if let Some(last) = turns.last() {
            if last.role == SpeakerRole::User {
                return floor;
            }
            if last.is_tool_result() {
                if let Some(broadcaster) = self.broadcaster {
                    return broadcaster;
                }
                let caller = turns
                    .iter()
                    .rev()
                    .find(|t| t.has_tool_calls())
                    .and_then(|t| self.index_of(&t.speaker));
                if let Some(caller) = caller {
                    return caller;
                }
            }
        }

        self.round_robin(turns, floor)
    }

    fn round_robin(&self, turns: &[Turn], previous: usize) -> usize {
        let n = self.order.len();
        (1..=n)
            .map(|step| (previous + step) % n)
            .find(|&candidate| self.has_news(turns, candidate))
            .unwrap_or((previous + 1) % n)
    }

    /// Whether anyone else spoke since `candidate` last did
    fn has_news(&self, turns: &[Turn], candidate: usize) -> bool {
        let name = &self.order[candidate];
        match turns
            .iter()
            .rposition(|t| t.role == SpeakerRole::Participant && &t.speaker == name)
        {
            None => true,
            Some(i) => turns[i + 1..].iter().any(|t| &t.speaker != name),
        }
    }
}

/// Several participants sharing one transcript
pub struct GroupChat {
    participants: Vec<Participant>,
    proxy: ExecutionProxy,
    selector: SpeakerSelector,
    max_round: usize,
    human_input_mode: HumanInputMode,
    predicate: TerminationPredicate,
    human: Option<Arc<dyn HumanInput>>,
    transcript: Transcript,
    state: ChatState,
    cancel: CancellationToken,
}

impl GroupChat {
    pub fn new(
        participants: Vec<Participant>,
        proxy: ExecutionProxy,
        initial_speaker: Option<&str>,
        broadcaster: Option<&str>,
    ) -> Result<Self> {
        let order: Vec<String> = participants.iter().map(|p| p.name().to_string()).collect();
        let mut seen = HashSet::new();
        if let Some(dup) = order.iter().find(|name| !seen.insert(name.as_str())) {
            return Err(ConclaveError::config(format!(
                "duplicate participant '{}' in group",
                dup
            )));
        }
        drop(seen);
        let selector = SpeakerSelector::new(order, initial_speaker, broadcaster)?;

        Ok(Self {
            participants,
            proxy,
            selector,
            max_round: 12,
            human_input_mode: HumanInputMode::Never,
            predicate: token_predicate(DEFAULT_TERMINATION_TOKEN),
            human: None,
            transcript: Transcript::new(),
            state: ChatState::AwaitUser,
            cancel: CancellationToken::new(),
        })
    }

    pub fn max_round(mut self, max_round: usize) -> Self {
        self.max_round = max_round;
        self
    }

    pub fn human_input_mode(mut self, mode: HumanInputMode) -> Self {
        self.human_input_mode = mode;
        self
    }

    pub fn predicate(mut self, predicate: TerminationPredicate) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn termination_token(self, token: impl Into<String>) -> Self {
        self.predicate(token_predicate(token))
    }

    pub fn human(mut self, human: Arc<dyn HumanInput>) -> Self {
        self.human = Some(human);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn set_cancellation(&mut self, token: CancellationToken) {
        self.cancel = token;
    }

    /// Token of the current run; a cancelled one is replaced by the next `run`
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn state(&self) -> ChatState {
        self.state
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn selector(&self) -> &SpeakerSelector {
        &self.selector
    }

    /// Start a new task on a fresh transcript
    pub async fn run(&mut self, task: impl Into<String>) -> ChatOutcome {
        self.transcript.clear();
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
        self.continue_with(task).await
    }

    /// Interrupt with a user message and resume
    pub async fn continue_with(&mut self, message: impl Into<String>) -> ChatOutcome {
        self.post_user(message);
        self.drive().await
    }

    /// Append a user message without resuming
    pub fn post_user(&mut self, message: impl Into<String>) {
        let turn = Turn::user(self.proxy.name(), message);
        self.transcript.push(turn);
        self.state = ChatState::AwaitUser;
    }

    async fn drive(&mut self) -> ChatOutcome {
        let mut rounds = 0;
        let state = loop {
            if self.cancel.is_cancelled() {
                break ChatState::Cancelled;
            }
            if rounds >= self.max_round {
                self.transcript.mark_last_terminal();
                break ChatState::Terminated(TerminationReason::MaxTurns);
            }

            let index = self.selector.next(&self.transcript);
            let speaker = &self.participants[index];
            let name = speaker.name().to_string();
            debug!(speaker = %name, round = rounds + 1, "next speaker selected");

            self.state = ChatState::Generating;
            let reply = match speaker.generate(&self.transcript, &self.cancel).await {
                Ok(reply) => reply,
                Err(ConclaveError::Cancelled) => break ChatState::Cancelled,
                Err(e) => {
                    error!(speaker = %name, error = %e, "model backend failed");
                    self.transcript
                        .push(Turn::error(&name, SpeakerRole::System, e.to_string()).into_terminal());
                    break ChatState::Terminated(TerminationReason::BackendFailure);
                }
            };
            rounds += 1;

            let candidate = Turn::reply(&name, reply.content.clone());
            if (self.predicate)(&candidate) {
                self.transcript.push(candidate.into_terminal());
                break ChatState::Terminated(TerminationReason::Predicate);
            }

            if !reply.tool_calls.is_empty() {
                self.transcript
                    .push(Turn::tool_call(&name, reply.content, reply.tool_calls.clone()));
                self.state = ChatState::AwaitToolResult;
                let results = self
                    .proxy
                    .execute_calls(&name, &reply.tool_calls, &self.cancel)
                    .await;
                self.transcript.push(results);
                continue;
            }

            self.transcript.push(candidate);

            if self.human_input_mode == HumanInputMode::Always {
                let Some(human) = self.human.clone() else {
                    break ChatState::AwaitUser;
                };
                match ask_human(&*human, &feedback_prompt(&name), &self.cancel).await {
                    Ok(HumanReply::Exit) => {
                        self.transcript.mark_last_terminal();
                        break ChatState::Terminated(TerminationReason::HumanDenied);
                    }
                    Ok(HumanReply::Message(text)) => {
                        let turn = Turn::user(self.proxy.name(), text);
                        self.transcript.push(turn);
                    }
                    Ok(HumanReply::Skip) => {}
                    Err(_) => break ChatState::Cancelled,
                }
            }
        };

        self.state = state;
        if let ChatState::Terminated(reason) = state {
            info!(%reason, rounds, "group chat ended");
        }

        ChatOutcome {
            state,
            final_reply: final_reply(&self.transcript, None, &self.predicate),
            generations: rounds,
        }
    }
}
