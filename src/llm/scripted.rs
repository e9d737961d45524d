//! Scripted backend for deterministic conversations
//!
//! Replays a fixed sequence of replies and records every request it receives.
//! Useful for tests and for dry runs of a workflow without a model server.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::{ConclaveError, Message, Result, ToolCall, ToolDefinition};
use crate::llm::traits::{GenerateOptions, ModelBackend, ModelReply};

/// One scripted step
#[derive(Debug, Clone)]
enum Step {
    Reply(ModelReply),
    Fail(String),
    Stall(Duration),
}

/// A request as seen by the scripted backend
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<String>,
}

/// Backend that answers from a queue of prepared steps
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    steps: Mutex<VecDeque<Step>>,
    /// Replayed forever once the queue is empty
    fallback: Option<ModelReply>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedBackend {
    /// An empty script; every call fails until steps are added
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer each call with the next text, in order
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        replies.into_iter().fold(Self::new(), |b, r| b.reply(r))
    }

    /// Answer every call with the same text
    pub fn repeating(reply: impl Into<String>) -> Self {
        Self {
            fallback: Some(ModelReply::text(reply)),
            ..Self::default()
        }
    }

    /// Queue a plain text reply
    pub fn reply(self, content: impl Into<String>) -> Self {
        self.push(Step::Reply(ModelReply::text(content)))
    }

    /// Queue a reply requesting one tool call
    pub fn tool_call(self, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        self.tool_calls(vec![ToolCall::new(name, arguments)])
    }

    /// Queue a reply requesting several tool calls
    pub fn tool_calls(self, calls: Vec<ToolCall>) -> Self {
        self.push(Step::Reply(ModelReply::with_tool_calls("", calls)))
    }

    /// Queue a backend failure
    pub fn fail(self, message: impl Into<String>) -> Self {
        self.push(Step::Fail(message.into()))
    }

    /// Queue a call that sleeps before answering with the next step
    pub fn stall(self, duration: Duration) -> Self {
        self.push(Step::Stall(duration))
    }

    fn push(self, step: Step) -> Self {
        if let Ok(mut steps) = self.steps.lock() {
            steps.push_back(step);
        }
        self
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of calls received so far
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn next_step(&self) -> Option<Step> {
        let mut steps = self.steps.lock().ok()?;
        steps
            .pop_front()
            .or_else(|| self.fallback.clone().map(Step::Reply))
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        tools: &[ToolDefinition],
        _options: &GenerateOptions,
    ) -> Result<ModelReply> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                model: model.to_string(),
                messages: messages.to_vec(),
                tools: tools.iter().map(|t| t.function.name.clone()).collect(),
            });
        }

        loop {
            match self.next_step() {
                Some(Step::Reply(mut reply)) => {
                    reply.model = model.to_string();
                    return Ok(reply);
                }
                Some(Step::Fail(message)) => return Err(ConclaveError::backend(message)),
                Some(Step::Stall(duration)) => tokio::time::sleep(duration).await,
                None => return Err(ConclaveError::backend("script exhausted")),
            }
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_replies_in_order_then_exhausts() {
        let backend = ScriptedBackend::with_replies(["one", "two"]);
        let opts = GenerateOptions::default();
        let first = assert_ok!(backend.chat("m", &[], &[], &opts).await);
        let second = assert_ok!(backend.chat("m", &[], &[], &opts).await);
        assert_eq!(first.content, "one");
        assert_eq!(second.content, "two");
        assert_err!(backend.chat("m", &[], &[], &opts).await);
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_repeating_never_runs_out() {
        let backend = ScriptedBackend::repeating("OK");
        let opts = GenerateOptions::default();
        for _ in 0..5 {
            let reply = backend.chat("m", &[], &[], &opts).await.unwrap();
            assert_eq!(reply.content, "OK");
        }
    }

    #[tokio::test]
    async fn test_records_messages() {
        let backend = ScriptedBackend::with_replies(["hi"]);
        let messages = vec![Message::system("be brief"), Message::user("hello")];
        backend
            .chat("m", &messages, &[], &GenerateOptions::default())
            .await
            .unwrap();
        let recorded = backend.requests();
        assert_eq!(recorded[0].messages.len(), 2);
        assert_eq!(recorded[0].messages[1].content, "hello");
    }
}
