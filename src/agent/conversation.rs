//! Two-party conversation loop
//!
//! Drives one participant against an execution proxy until a termination
//! condition is met or a human is needed:
//!
//! ```text
//! AwaitUser -> Generating -> (AwaitToolResult -> Generating)* -> AwaitUser | Terminated
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::agent::human::{ask_human, feedback_prompt, termination_prompt, HumanInput, HumanReply};
use crate::agent::loop_state::{
    token_predicate, ChatState, LoopState, TerminationPredicate, TerminationReason,
};
use crate::agent::participant::Participant;
use crate::agent::proxy::ExecutionProxy;
use crate::agent::transcript::Transcript;
use crate::core::config::{ChatConfig, DEFAULT_TERMINATION_TOKEN};
use crate::core::{ConclaveError, HumanInputMode, Result, SpeakerRole, Turn, TurnKind};

/// Bounds and policies of one loop
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub max_auto_reply: usize,
    pub max_turns: Option<usize>,
    pub human_input_mode: HumanInputMode,
    /// Proxy reply to a plain participant message; `None` ends the loop instead
    pub default_auto_reply: Option<String>,
}

impl From<&ChatConfig> for LoopSettings {
    fn from(chat: &ChatConfig) -> Self {
        Self {
            max_auto_reply: chat.max_consecutive_auto_reply,
            max_turns: chat.max_turns,
            human_input_mode: chat.human_input_mode,
            default_auto_reply: chat.default_auto_reply.clone(),
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from(&ChatConfig::default())
    }
}

/// Result of driving a loop until it hands control back
#[derive(Debug, Clone, PartialEq)]
pub struct ChatOutcome {
    pub state: ChatState,
    /// Last substantive participant reply, excluding the termination message
    pub final_reply: Option<String>,
    /// Participant generations during this drive
    pub generations: usize,
}

impl ChatOutcome {
    pub fn reason(&self) -> Option<TerminationReason> {
        self.state.reason()
    }
}

/// Gets the first say after a plain participant reply.
///
/// A returned turn is appended as the answer to the reply and counts as an
/// automatic reply; `None` lets the proxy answer as usual.
#[async_trait]
pub trait ReplyHook: Send + Sync {
    async fn on_reply(&mut self, reply: &Turn, cancel: &CancellationToken) -> Option<Turn>;
}

/// Hook that never intervenes
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHook;

#[async_trait]
impl ReplyHook for NoHook {
    async fn on_reply(&mut self, _reply: &Turn, _cancel: &CancellationToken) -> Option<Turn> {
        None
    }
}

/// A participant and a proxy taking turns over one transcript
pub struct ConversationLoop<H: ReplyHook = NoHook> {
    participant: Participant,
    proxy: ExecutionProxy,
    settings: LoopSettings,
    predicate: TerminationPredicate,
    human: Option<Arc<dyn HumanInput>>,
    hook: H,
    transcript: Transcript,
    state: ChatState,
    cancel: CancellationToken,
}

impl ConversationLoop<NoHook> {
    pub fn new(participant: Participant, proxy: ExecutionProxy) -> Self {
        Self::with_hook(participant, proxy, NoHook)
    }
}

impl<H: ReplyHook> ConversationLoop<H> {
    /// A loop whose plain replies are first offered to `hook`
    pub fn with_hook(participant: Participant, proxy: ExecutionProxy, hook: H) -> Self {
        Self {
            participant,
            proxy,
            settings: LoopSettings::default(),
            predicate: token_predicate(DEFAULT_TERMINATION_TOKEN),
            human: None,
            hook,
            transcript: Transcript::new(),
            state: ChatState::AwaitUser,
            cancel: CancellationToken::new(),
        }
    }

    pub fn settings(mut self, settings: LoopSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the termination predicate
    pub fn predicate(mut self, predicate: TerminationPredicate) -> Self {
        self.predicate = predicate;
        self
    }

    /// End on a reply that is exactly `token`
    pub fn termination_token(self, token: impl Into<String>) -> Self {
        self.predicate(token_predicate(token))
    }

    pub fn human(mut self, human: Arc<dyn HumanInput>) -> Self {
        self.human = Some(human);
        self
    }

    /// Token the caller can use to cancel a run
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn set_cancellation(&mut self, token: CancellationToken) {
        self.cancel = token;
    }

    /// Token of the current run.
    ///
    /// A cancelled token is replaced by [`reset`](Self::reset) and
    /// [`run`](Self::run), so fetch it again for every new task.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn state(&self) -> ChatState {
        self.state
    }

    pub fn participant(&self) -> &Participant {
        &self.participant
    }

    pub fn proxy(&self) -> &ExecutionProxy {
        &self.proxy
    }

    pub fn hook(&self) -> &H {
        &self.hook
    }

    pub fn hook_mut(&mut self) -> &mut H {
        &mut self.hook
    }

    /// Forget the transcript and wait for a new task, re-arming a spent
    /// cancellation token
    pub fn reset(&mut self) {
        self.transcript.clear();
        self.state = ChatState::AwaitUser;
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
    }

    /// Start a new top-level task on a fresh transcript
    pub async fn run(&mut self, task: impl Into<String>) -> ChatOutcome {
        self.reset();
        self.continue_with(task).await
    }

    /// Send another message, keeping the transcript so far
    pub async fn continue_with(&mut self, message: impl Into<String>) -> ChatOutcome {
        let turn = Turn::user(self.proxy.name(), message);
        self.continue_with_turn(turn).await
    }

    /// Append an arbitrary turn and resume generation
    pub async fn continue_with_turn(&mut self, turn: Turn) -> ChatOutcome {
        self.transcript.push(turn);
        self.drive().await
    }

    async fn drive(&mut self) -> ChatOutcome {
        let name = self.participant.name().to_string();
        let mut limits = LoopState::new(self.settings.max_turns, self.settings.max_auto_reply);
        debug!(participant = %name, turns = self.transcript.len(), "conversation resumed");

        let state = loop {
            if self.cancel.is_cancelled() {
                break ChatState::Cancelled;
            }
            if !limits.can_generate() {
                self.transcript.mark_last_terminal();
                break ChatState::Terminated(TerminationReason::MaxTurns);
            }

            self.state = ChatState::Generating;
            let reply = match self.participant.generate(&self.transcript, &self.cancel).await {
                Ok(reply) => reply,
                Err(ConclaveError::Cancelled) => break ChatState::Cancelled,
                Err(e) => {
                    error!(participant = %name, error = %e, "model backend failed");
                    self.transcript
                        .push(Turn::error(&name, SpeakerRole::System, e.to_string()).into_terminal());
                    break ChatState::Terminated(TerminationReason::BackendFailure);
                }
            };
            limits.record_generation();

            let candidate = Turn::reply(&name, reply.content.clone());
            if (self.predicate)(&candidate) {
                if !reply.tool_calls.is_empty() {
                    debug!(participant = %name, "dropping tool calls on terminating reply");
                }
                self.transcript.push(candidate);
                match self.consult_before_ending(&name).await {
                    Ok(Some(message)) => {
                        self.push_user(message);
                        limits.reset_auto_replies();
                        continue;
                    }
                    Ok(None) => {
                        self.transcript.mark_last_terminal();
                        break ChatState::Terminated(TerminationReason::Predicate);
                    }
                    Err(_) => break ChatState::Cancelled,
                }
            }

            if !reply.tool_calls.is_empty() {
                self.transcript.push(Turn::tool_call(
                    &name,
                    reply.content,
                    reply.tool_calls.clone(),
                ));
                self.state = ChatState::AwaitToolResult;
                let results = self
                    .proxy
                    .execute_calls(&name, &reply.tool_calls, &self.cancel)
                    .await;
                self.transcript.push(results);
                if self.cancel.is_cancelled() {
                    break ChatState::Cancelled;
                }
                limits.record_auto_reply();
                if !limits.can_auto_reply() {
                    match self.consult_before_ending(&name).await {
                        Ok(Some(message)) => {
                            self.push_user(message);
                            limits.reset_auto_replies();
                            continue;
                        }
                        Ok(None) => {
                            self.transcript.mark_last_terminal();
                            break ChatState::Terminated(TerminationReason::MaxAutoReply);
                        }
                        Err(_) => break ChatState::Cancelled,
                    }
                }
                continue;
            }

            self.transcript.push(candidate);

            if self.settings.human_input_mode == HumanInputMode::Always {
                let Some(human) = self.human.clone() else {
                    break ChatState::AwaitUser;
                };
                match ask_human(&*human, &feedback_prompt(&name), &self.cancel).await {
                    Ok(HumanReply::Exit) => {
                        self.transcript.mark_last_terminal();
                        break ChatState::Terminated(TerminationReason::HumanDenied);
                    }
                    Ok(HumanReply::Message(text)) => {
                        self.push_user(text);
                        limits.reset_auto_replies();
                        continue;
                    }
                    Ok(HumanReply::Skip) => {}
                    Err(_) => break ChatState::Cancelled,
                }
            }

            if !limits.can_auto_reply() {
                match self.consult_before_ending(&name).await {
                    Ok(Some(message)) => {
                        self.push_user(message);
                        limits.reset_auto_replies();
                        continue;
                    }
                    Ok(None) => {
                        self.transcript.mark_last_terminal();
                        break ChatState::Terminated(TerminationReason::MaxAutoReply);
                    }
                    Err(_) => break ChatState::Cancelled,
                }
            }

            match self.automatic_answer().await {
                Some(turn) => {
                    self.transcript.push(turn);
                    limits.record_auto_reply();
                }
                None => match self.consult_before_ending(&name).await {
                    Ok(Some(message)) => {
                        self.push_user(message);
                        limits.reset_auto_replies();
                    }
                    Ok(None) => {
                        self.transcript.mark_last_terminal();
                        break ChatState::Terminated(TerminationReason::NoFurtherInstruction);
                    }
                    Err(_) => break ChatState::Cancelled,
                },
            }
        };

        self.state = state;
        match state {
            ChatState::Terminated(reason) => {
                info!(participant = %name, %reason, generations = limits.generations, "conversation ended")
            }
            other => debug!(participant = %name, state = ?other, "conversation paused"),
        }
        self.outcome(limits.generations)
    }

    /// Hook reply, code output or the default auto reply, in that order
    async fn automatic_answer(&mut self) -> Option<Turn> {
        let reply = self.transcript.last()?.clone();
        if let Some(turn) = self.hook.on_reply(&reply, &self.cancel).await {
            return Some(turn);
        }
        if let Some(turn) = self.proxy.run_code(&reply.content).await {
            return Some(turn);
        }
        self.settings
            .default_auto_reply
            .as_deref()
            .map(|text| self.proxy.auto_reply(text))
    }

    /// Offer the human a last word before the loop ends; `Err` only when
    /// cancelled while waiting
    async fn consult_before_ending(&self, participant: &str) -> Result<Option<String>> {
        if self.settings.human_input_mode == HumanInputMode::Never {
            return Ok(None);
        }
        let Some(human) = self.human.as_ref() else {
            return Ok(None);
        };
        match ask_human(&**human, &termination_prompt(participant), &self.cancel).await? {
            HumanReply::Message(text) => Ok(Some(text)),
            HumanReply::Exit | HumanReply::Skip => Ok(None),
        }
    }

    fn push_user(&mut self, content: String) {
        let turn = Turn::user(self.proxy.name(), content);
        self.transcript.push(turn);
    }

    fn outcome(&self, generations: usize) -> ChatOutcome {
        ChatOutcome {
            state: self.state,
            final_reply: final_reply(&self.transcript, Some(self.participant.name()), &self.predicate),
            generations,
        }
    }
}

/// Last non-empty plain participant reply that is not a termination message,
/// optionally restricted to one speaker
pub(crate) fn final_reply(
    transcript: &Transcript,
    speaker: Option<&str>,
    predicate: &TerminationPredicate,
) -> Option<String> {
    transcript
        .turns()
        .iter()
        .rev()
        .filter(|t| t.role == SpeakerRole::Participant)
        .filter(|t| speaker.is_none_or(|s| t.speaker == s))
        .filter(|t| t.kind == TurnKind::Message && !t.content.trim().is_empty())
        .find(|t| !predicate(t))
        .map(|t| t.content.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::participant::AgentBuilder;
    use crate::agent::profile::RoleProfile;
    use crate::llm::ScriptedBackend;

    fn looped(backend: ScriptedBackend) -> ConversationLoop {
        let participant = AgentBuilder::new(RoleProfile::new("Assistant", "Help."))
            .backend(Arc::new(backend))
            .build_without_tools()
            .unwrap();
        ConversationLoop::new(participant, ExecutionProxy::without_tools("User_Proxy"))
    }

    #[tokio::test]
    async fn test_terminates_on_token() {
        let mut chat = looped(ScriptedBackend::with_replies(["The answer is 4.", "TERMINATE"]));
        let outcome = chat.run("2+2?").await;
        assert_eq!(outcome.reason(), Some(TerminationReason::Predicate));
        assert_eq!(outcome.final_reply.as_deref(), Some("The answer is 4."));
        assert!(chat.transcript().last().unwrap().terminal);
    }

    #[tokio::test]
    async fn test_run_resets_but_continue_keeps() {
        let mut chat = looped(ScriptedBackend::repeating("TERMINATE"));
        chat.run("first").await;
        assert_eq!(chat.transcript().len(), 2);
        chat.continue_with("second").await;
        assert_eq!(chat.transcript().len(), 4);
        chat.run("third").await;
        assert_eq!(chat.transcript().len(), 2);
    }

    #[test]
    fn test_final_reply_skips_termination() {
        let mut transcript = Transcript::new();
        transcript.push(Turn::user("u", "q"));
        transcript.push(Turn::reply("A", "answer"));
        transcript.push(Turn::reply("A", "TERMINATE"));
        let predicate = token_predicate("TERMINATE");
        assert_eq!(final_reply(&transcript, Some("A"), &predicate).as_deref(), Some("answer"));
        assert_eq!(final_reply(&transcript, Some("B"), &predicate), None);
        assert_eq!(final_reply(&transcript, None, &predicate).as_deref(), Some("answer"));
    }
}
