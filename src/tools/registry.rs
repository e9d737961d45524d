//! Tool registry - binds tools to callers and dispatches tool calls
//!
//! Every descriptor is owned by a (caller, executor) pair: the caller is the
//! participant allowed to request the tool, the executor is the proxy that runs
//! it. The registry is mutated only while a workflow is being built and is
//! shared read-only afterwards.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::core::{ConclaveError, Result, ToolCall, ToolDefinition, ToolResultRecord};
use crate::tools::function::{Tool, ToolSpec};

/// A tool bound to its caller and executor
#[derive(Clone)]
pub struct ToolDescriptor {
    /// Schema advertised to the caller's model
    pub definition: ToolDefinition,
    /// Participant allowed to call the tool
    pub caller: String,
    /// Proxy that executes it
    pub executor: String,
    tool: Arc<dyn Tool>,
}

impl ToolDescriptor {
    pub fn name(&self) -> &str {
        self.definition.name()
    }
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.definition.function.name)
            .field("caller", &self.caller)
            .field("executor", &self.executor)
            .finish()
    }
}

/// Registry of tool bindings, indexed by caller
#[derive(Default, Debug)]
pub struct ToolRegistry {
    /// Descriptors per caller, in registration order
    bindings: HashMap<String, Vec<ToolDescriptor>>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind every tool of `spec` to `caller`, executed by `executor`.
    ///
    /// Registration is all-or-nothing: a name clash with an existing binding of
    /// the same caller, or inside the spec itself, rejects the whole spec.
    pub fn register(&mut self, spec: ToolSpec, caller: &str, executor: &str) -> Result<Vec<String>> {
        let tools = spec.expand();
        let existing = self.bindings.get(caller);

        let mut seen = HashSet::new();
        for tool in &tools {
            let name = tool.name();
            let clashes = existing.is_some_and(|d| d.iter().any(|d| d.name() == name));
            if clashes || !seen.insert(name.to_string()) {
                return Err(ConclaveError::config(format!(
                    "tool '{}' is already registered for '{}'",
                    name, caller
                )));
            }
        }

        let entry = self.bindings.entry(caller.to_string()).or_default();
        let mut names = Vec::with_capacity(tools.len());
        for tool in tools {
            debug!(tool = tool.name(), caller, executor, "registering tool");
            names.push(tool.name().to_string());
            entry.push(ToolDescriptor {
                definition: tool.definition(),
                caller: caller.to_string(),
                executor: executor.to_string(),
                tool,
            });
        }

        Ok(names)
    }

    /// Definitions advertised to a caller's model
    pub fn definitions_for(&self, caller: &str) -> Vec<ToolDefinition> {
        self.bindings
            .get(caller)
            .map(|d| d.iter().map(|d| d.definition.clone()).collect())
            .unwrap_or_default()
    }

    /// Names of the tools bound to a caller
    pub fn tool_names(&self, caller: &str) -> Vec<String> {
        self.bindings
            .get(caller)
            .map(|d| d.iter().map(|d| d.name().to_string()).collect())
            .unwrap_or_default()
    }

    /// Look up one binding
    pub fn descriptor(&self, caller: &str, name: &str) -> Option<&ToolDescriptor> {
        self.bindings.get(caller)?.iter().find(|d| d.name() == name)
    }

    /// Whether the caller has any tools at all
    pub fn has_tools(&self, caller: &str) -> bool {
        self.bindings.get(caller).is_some_and(|d| !d.is_empty())
    }

    /// Execute a tool call on behalf of `caller`.
    ///
    /// Never fails: unknown tools, foreign executors, tool errors and timeouts
    /// all come back as failed records so the loop can keep going.
    pub async fn execute(
        &self,
        caller: &str,
        executor: &str,
        call: &ToolCall,
        timeout: Duration,
    ) -> ToolResultRecord {
        let Some(descriptor) = self.descriptor(caller, &call.name) else {
            warn!(tool = %call.name, caller, "tool not bound to caller");
            return ToolResultRecord::failure(
                call,
                format!("Error: tool '{}' is not available to {}", call.name, caller),
            );
        };

        if descriptor.executor != executor {
            return ToolResultRecord::failure(
                call,
                format!(
                    "Error: tool '{}' must be executed by {}, not {}",
                    call.name, descriptor.executor, executor
                ),
            );
        }

        debug!(tool = %call.name, caller, executor, "executing tool");
        match tokio::time::timeout(timeout, descriptor.tool.call(call.arguments.clone())).await {
            Ok(Ok(output)) => ToolResultRecord::success(call, output.to_canonical_text()),
            Ok(Err(e)) => {
                warn!(tool = %call.name, error = %e, "tool failed");
                ToolResultRecord::failure(call, format!("Error: {}", e))
            }
            Err(_) => {
                warn!(tool = %call.name, ?timeout, "tool timed out");
                ToolResultRecord::failure(
                    call,
                    format!("Error: {}", ConclaveError::Timeout(timeout)),
                )
            }
        }
    }
}
