//! Participants - model-backed conversation members
//!
//! A participant pairs a resolved role profile with a model backend and the
//! tool schemas bound to it. It is built by [`AgentBuilder`], which resolves
//! the profile's tool names and registers them for the participant.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::agent::profile::{RoleLibrary, RoleProfile, RoleSource};
use crate::agent::transcript::Transcript;
use crate::core::config::ChatConfig;
use crate::core::{ConclaveError, Config, Result, ToolDefinition};
use crate::llm::{GenerateOptions, ModelBackend, ModelReply};
use crate::tools::{ToolCatalog, ToolRegistry, ToolSpec};

/// How model calls are retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// First backoff delay; doubles on every retry
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (0-based), with up to 50% jitter
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
        let jitter_ms = (base.as_millis() as u64) / 2;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// A named conversation member backed by a model
#[derive(Clone)]
pub struct Participant {
    profile: RoleProfile,
    system_message: String,
    backend: Arc<dyn ModelBackend>,
    model: String,
    options: GenerateOptions,
    tools: Vec<ToolDefinition>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl std::fmt::Debug for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Participant")
            .field("name", &self.profile.name())
            .field("model", &self.model)
            .field("backend", &self.backend.name())
            .field("tools", &self.tools.len())
            .finish()
    }
}

impl Participant {
    pub fn name(&self) -> &str {
        self.profile.name()
    }

    pub fn profile(&self) -> &RoleProfile {
        &self.profile
    }

    /// Rendered instructions sent as the system message
    pub fn system_message(&self) -> &str {
        &self.system_message
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Tool schemas advertised to this participant's model
    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    /// Produce the next reply given the shared transcript.
    ///
    /// Each attempt is bounded by the participant's timeout; transient failures
    /// are retried with exponential backoff. Tool calls without an id get one
    /// derived from the transcript position.
    pub async fn generate(
        &self,
        transcript: &Transcript,
        cancel: &CancellationToken,
    ) -> Result<ModelReply> {
        let messages = transcript.to_messages(self.name(), &self.system_message);
        let mut attempt = 0;

        loop {
            let call = tokio::time::timeout(
                self.timeout,
                self.backend
                    .chat(&self.model, &messages, &self.tools, &self.options),
            );
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(ConclaveError::Cancelled),
                result = call => result.unwrap_or_else(|_| Err(ConclaveError::Timeout(self.timeout))),
            };

            match result {
                Ok(mut reply) => {
                    for (i, call) in reply.tool_calls.iter_mut().enumerate() {
                        if call.id.is_empty() {
                            call.id = format!("call_{}_{}", transcript.len(), i);
                        }
                    }
                    debug!(
                        participant = self.name(),
                        tool_calls = reply.tool_calls.len(),
                        "reply received"
                    );
                    return Ok(reply);
                }
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        participant = self.name(),
                        attempt = attempt + 1,
                        ?delay,
                        error = %e,
                        "model call failed, retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(ConclaveError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Builder for participants
pub struct AgentBuilder {
    source: RoleSource,
    library: RoleLibrary,
    backend: Option<Arc<dyn ModelBackend>>,
    model: Option<String>,
    temperature: Option<f32>,
    timeout: Duration,
    retry: RetryPolicy,
    vars: HashMap<String, String>,
    termination_token: Option<String>,
}

impl AgentBuilder {
    /// Start from a role source
    pub fn new(source: impl Into<RoleSource>) -> Self {
        Self {
            source: source.into(),
            library: RoleLibrary::builtin(),
            backend: None,
            model: None,
            temperature: None,
            timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
            vars: HashMap::new(),
            termination_token: None,
        }
    }

    /// Start from a role looked up by name
    pub fn from_library(name: impl Into<String>) -> Self {
        Self::new(RoleSource::Library(name.into()))
    }

    /// Library used to resolve named roles
    pub fn library(mut self, library: RoleLibrary) -> Self {
        self.library = library;
        self
    }

    pub fn backend(mut self, backend: Arc<dyn ModelBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Per-attempt model call timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Value for a `{key}` placeholder in the instructions
    pub fn var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn vars(mut self, vars: HashMap<String, String>) -> Self {
        self.vars.extend(vars);
        self
    }

    /// Remind the model which reply ends the conversation
    pub fn termination_token(mut self, token: impl Into<String>) -> Self {
        self.termination_token = Some(token.into());
        self
    }

    /// Take temperature, timeout, retries and the termination token from
    /// chat settings
    pub fn chat_config(self, chat: &ChatConfig) -> Self {
        self.temperature(chat.temperature)
            .timeout(chat.model_timeout())
            .retry(RetryPolicy {
                max_retries: chat.max_retries,
                base_delay: chat.retry_backoff(),
            })
            .termination_token(chat.termination_token.clone())
    }

    /// Build a participant and bind its profile's tools.
    ///
    /// Each tool name is resolved in `catalog` and registered for this
    /// participant, executed by `executor`. An unknown name fails the build.
    pub fn build(
        self,
        catalog: &ToolCatalog,
        registry: &mut ToolRegistry,
        executor: &str,
    ) -> Result<Participant> {
        let profile = self.source.resolve(&self.library)?;

        let mut specs = Vec::with_capacity(profile.tools().len());
        for name in profile.tools() {
            let tool = catalog.get(name).ok_or_else(|| {
                ConclaveError::config(format!(
                    "role '{}' uses unknown tool '{}'",
                    profile.name(),
                    name
                ))
            })?;
            specs.push(ToolSpec::Function(tool));
        }
        for spec in specs {
            registry.register(spec, profile.name(), executor)?;
        }

        let tools = registry.definitions_for(profile.name());
        self.finish(profile, tools)
    }

    /// Build a participant that may not call tools
    pub fn build_without_tools(self) -> Result<Participant> {
        let profile = self.source.resolve(&self.library)?;
        if !profile.tools().is_empty() {
            return Err(ConclaveError::config(format!(
                "role '{}' declares tools but is built without a tool registry",
                profile.name()
            )));
        }
        self.finish(profile, Vec::new())
    }

    fn finish(self, profile: RoleProfile, tools: Vec<ToolDefinition>) -> Result<Participant> {
        let backend = self.backend.ok_or_else(|| {
            ConclaveError::config(format!("participant '{}' has no model backend", profile.name()))
        })?;

        let mut system_message = profile.render(&self.vars);
        if let Some(token) = &self.termination_token {
            system_message.push_str(&format!("\nReply {} when the task is done.", token));
        }

        Ok(Participant {
            system_message,
            backend,
            model: self
                .model
                .unwrap_or_else(|| Config::default().models.default),
            options: GenerateOptions {
                temperature: self.temperature,
                ..Default::default()
            },
            tools,
            timeout: self.timeout,
            retry: self.retry,
            profile,
        })
    }
}
