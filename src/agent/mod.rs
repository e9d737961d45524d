//! Agent module - participants and the loops that drive them
//!
//! Contains role profiles, participants, the execution proxy, and the
//! two-party, group, delegation and reflection orchestrators.

pub mod code;
pub mod conversation;
pub mod delegation;
pub mod group;
pub mod human;
pub mod loop_state;
pub mod participant;
pub mod profile;
pub mod proxy;
pub mod reflection;
pub mod transcript;
pub mod workflow;

pub use code::{CodeBlock, CodeExecutor, CodeResult, LocalCommandExecutor};
pub use conversation::{ChatOutcome, ConversationLoop, LoopSettings, NoHook, ReplyHook};
pub use delegation::{parse_directive, DelegationRecord, Delegator, Directive, LeaderChat};
pub use group::{GroupChat, GroupConfig, SpeakerSelector};
pub use human::{HumanInput, ScriptedHuman};
pub use loop_state::{token_predicate, ChatState, TerminationPredicate, TerminationReason};
pub use participant::{AgentBuilder, Participant, RetryPolicy};
pub use profile::{RoleLibrary, RoleProfile, RoleSource};
pub use proxy::ExecutionProxy;
pub use reflection::{ReflectionOutcome, ReflectiveChat};
pub use transcript::Transcript;
pub use workflow::{Workflow, DEFAULT_PROXY_NAME};
