//! Execution proxy - the non-model side of a conversation
//!
//! The proxy runs tool calls addressed to it, optionally runs code blocks,
//! and speaks on behalf of the caller when a loop continues automatically.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::agent::code::{extract_code_blocks, CodeExecutor};
use crate::core::{ToolCall, ToolResultRecord, Turn, TurnKind};
use crate::tools::ToolRegistry;

/// Executes tool calls and code for the participants bound to it
#[derive(Clone)]
pub struct ExecutionProxy {
    name: String,
    registry: Arc<ToolRegistry>,
    tool_timeout: Duration,
    code: Option<Arc<dyn CodeExecutor>>,
}

impl std::fmt::Debug for ExecutionProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionProxy")
            .field("name", &self.name)
            .field("tool_timeout", &self.tool_timeout)
            .field("code_execution", &self.code.is_some())
            .finish()
    }
}

impl ExecutionProxy {
    pub fn new(name: impl Into<String>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            name: name.into(),
            registry,
            tool_timeout: Duration::from_secs(60),
            code: None,
        }
    }

    /// A proxy with no tools; it can still auto-reply
    pub fn without_tools(name: impl Into<String>) -> Self {
        Self::new(name, Arc::new(ToolRegistry::new()))
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_code_executor(mut self, executor: Arc<dyn CodeExecutor>) -> Self {
        self.code = Some(executor);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run every call of one tool-call turn, in order.
    ///
    /// Always yields exactly one result turn holding one record per call.
    /// Calls left when `cancel` fires are answered with a cancellation record.
    pub async fn execute_calls(
        &self,
        caller: &str,
        calls: &[ToolCall],
        cancel: &CancellationToken,
    ) -> Turn {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            if cancel.is_cancelled() {
                results.push(ToolResultRecord::failure(call, "Error: run cancelled"));
                continue;
            }
            info!(tool = %call.name, caller, "tool call");
            let record = tokio::select! {
                _ = cancel.cancelled() => ToolResultRecord::failure(call, "Error: run cancelled"),
                record = self.registry.execute(caller, &self.name, call, self.tool_timeout) => record,
            };
            results.push(record);
        }
        Turn::tool_result(self.name.clone(), results)
    }

    /// Run the code blocks in `content`, if code execution is enabled and
    /// there are any
    pub async fn run_code(&self, content: &str) -> Option<Turn> {
        let executor = self.code.as_ref()?;
        let blocks = extract_code_blocks(content);
        if blocks.is_empty() {
            return None;
        }

        info!(blocks = blocks.len(), proxy = %self.name, "executing code blocks");
        let reply = match executor.execute(&blocks).await {
            Ok(result) => result.to_reply(),
            Err(e) => format!("exitcode: 1 (execution failed)\nCode output: {}", e),
        };
        Some(Turn::proxy(self.name.clone(), TurnKind::CodeResult, reply))
    }

    /// A plain continuation message
    pub fn auto_reply(&self, content: &str) -> Turn {
        Turn::proxy(self.name.clone(), TurnKind::Message, content)
    }
}
