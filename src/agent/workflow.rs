//! Ready-made workflows
//!
//! [`Workflow`] owns what every construction needs (backend, configuration,
//! role library, tool catalog) and assembles single assistants, groups,
//! leader chats and shadowed assistants from it. Each assembled workflow gets
//! its own tool registry, filled while its participants are built and shared
//! read-only afterwards.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::agent::code::LocalCommandExecutor;
use crate::agent::conversation::{ConversationLoop, LoopSettings};
use crate::agent::delegation::{leader_profile, Delegator, LeaderChat};
use crate::agent::group::{GroupChat, GroupConfig};
use crate::agent::loop_state::token_predicate;
use crate::agent::participant::{AgentBuilder, Participant};
use crate::agent::profile::{RoleLibrary, RoleProfile, RoleSource};
use crate::agent::proxy::ExecutionProxy;
use crate::agent::reflection::ReflectiveChat;
use crate::core::{Config, Result};
use crate::llm::ModelBackend;
use crate::tools::{ToolCatalog, ToolRegistry};

/// Name of the proxy unless configured otherwise
pub const DEFAULT_PROXY_NAME: &str = "User_Proxy";

/// Factory for conversation workflows
#[derive(Clone)]
pub struct Workflow {
    backend: Arc<dyn ModelBackend>,
    config: Config,
    library: RoleLibrary,
    catalog: ToolCatalog,
    proxy_name: String,
    vars: HashMap<String, String>,
}

impl Workflow {
    pub fn new(backend: Arc<dyn ModelBackend>, config: Config) -> Self {
        Self {
            backend,
            config,
            library: RoleLibrary::builtin(),
            catalog: ToolCatalog::new(),
            proxy_name: DEFAULT_PROXY_NAME.to_string(),
            vars: HashMap::new(),
        }
    }

    pub fn library(mut self, library: RoleLibrary) -> Self {
        self.library = library;
        self
    }

    pub fn catalog(mut self, catalog: ToolCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn proxy_name(mut self, name: impl Into<String>) -> Self {
        self.proxy_name = name.into();
        self
    }

    /// Placeholder value used when rendering every role's instructions
    pub fn var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn agent(&self, source: RoleSource) -> AgentBuilder {
        AgentBuilder::new(source)
            .library(self.library.clone())
            .backend(Arc::clone(&self.backend))
            .model(self.config.models.default.clone())
            .chat_config(&self.config.chat)
            .vars(self.vars.clone())
    }

    fn participant(&self, source: RoleSource, registry: &mut ToolRegistry) -> Result<Participant> {
        self.agent(source)
            .build(&self.catalog, registry, &self.proxy_name)
    }

    fn proxy(&self, registry: ToolRegistry) -> ExecutionProxy {
        let chat = &self.config.chat;
        let proxy = ExecutionProxy::new(self.proxy_name.clone(), Arc::new(registry))
            .with_tool_timeout(chat.tool_timeout());
        if chat.code_execution {
            let work_dir = std::env::temp_dir().join("conclave-coding");
            proxy.with_code_executor(Arc::new(LocalCommandExecutor::new(
                work_dir,
                Duration::from_secs(chat.tool_timeout_secs),
            )))
        } else {
            proxy
        }
    }

    /// One assistant and the proxy
    pub fn single(&self, role: impl Into<RoleSource>) -> Result<ConversationLoop> {
        let mut registry = ToolRegistry::new();
        let assistant = self.participant(role.into(), &mut registry)?;
        let chat = &self.config.chat;
        Ok(ConversationLoop::new(assistant, self.proxy(registry))
            .settings(LoopSettings::from(chat))
            .termination_token(chat.termination_token.clone()))
    }

    /// All members in one shared conversation
    pub fn group(&self, group: &GroupConfig) -> Result<GroupChat> {
        let mut registry = ToolRegistry::new();
        let members = group
            .members
            .iter()
            .map(|source| self.participant(source.clone(), &mut registry))
            .collect::<Result<Vec<_>>>()?;

        let chat = GroupChat::new(
            members,
            self.proxy(registry),
            group.initial_speaker.as_deref(),
            group.broadcaster.as_deref(),
        )?;
        Ok(chat
            .max_round(group.max_round.unwrap_or(self.config.group.max_round))
            .human_input_mode(group.human_input_mode)
            .termination_token(self.config.chat.termination_token.clone()))
    }

    /// A leader delegating to the members through nested chats
    pub fn leader(&self, group: &GroupConfig) -> Result<LeaderChat> {
        let mut registry = ToolRegistry::new();
        let workers = group
            .members
            .iter()
            .map(|source| self.participant(source.clone(), &mut registry))
            .collect::<Result<Vec<_>>>()?;

        let token = self.config.chat.termination_token.clone();
        let leader_source = match &group.leader {
            Some(source) => source.clone(),
            None => {
                let briefs: Vec<(String, String)> = workers
                    .iter()
                    .enumerate()
                    .map(|(i, w)| {
                        let duty = group
                            .responsibilities
                            .get(i)
                            .cloned()
                            .unwrap_or_else(|| w.profile().description().to_string());
                        (w.name().to_string(), duty)
                    })
                    .collect();
                RoleSource::Inline(leader_profile("Leader", &briefs, &token))
            }
        };
        let leader = self.participant(leader_source, &mut registry)?;

        let summarizer = AgentBuilder::new(RoleProfile::new(
            "Summarizer",
            "You condense conversations into their key findings.",
        ))
        .backend(Arc::clone(&self.backend))
        .model(self.config.summarizer_model())
        .chat_config(&self.config.chat)
        .build_without_tools()?;

        let proxy = self.proxy(registry);
        let predicate = token_predicate(token.clone());
        let delegator = Delegator::new(
            workers,
            proxy.clone(),
            summarizer,
            self.config.delegation.clone(),
            predicate.clone(),
            token,
        )?
        .default_auto_reply(self.config.chat.default_auto_reply.clone());

        Ok(ConversationLoop::with_hook(leader, proxy, delegator)
            .settings(LoopSettings::from(&self.config.chat))
            .predicate(predicate))
    }

    /// An assistant whose answers are critiqued by a silent reviewer
    pub fn shadow(
        &self,
        role: impl Into<RoleSource>,
        reviewer: impl Into<RoleSource>,
    ) -> Result<ReflectiveChat> {
        let primary = self.single(role)?;
        let reviewer = self.agent(reviewer.into()).build_without_tools()?;
        Ok(ReflectiveChat::new(primary, reviewer)?.max_rounds(self.config.reflection.max_rounds))
    }
}
