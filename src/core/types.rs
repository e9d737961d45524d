//! Shared types used across Conclave modules
//!
//! Contains backend message structures, tool definitions, and the Turn record
//! every transcript is made of.

use serde::{Deserialize, Serialize};

/// A message sent to a model backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (user, assistant, system, tool)
    pub role: String,
    /// Content of the message
    pub content: String,
    /// Optional tool calls made by the assistant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role("user", content)
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role("assistant", content)
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role("system", content)
    }

    /// Create a tool response message
    pub fn tool(content: impl Into<String>) -> Self {
        Self::with_role("tool", content)
    }

    fn with_role(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            tool_calls: None,
        }
    }
}

/// A tool call made by the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call identifier, pairs the call with its result
    #[serde(default)]
    pub id: String,
    /// Name of the tool to invoke
    pub name: String,
    /// JSON arguments for the tool
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Create a new tool call
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            arguments,
        }
    }

    /// Set the call identifier
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Get a string argument by key
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.arguments
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }
}

/// Definition of a tool that can be called by the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Type of tool (always "function" for now)
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Function details
    pub function: FunctionDefinition,
}

/// Function definition within a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// Name of the function
    pub name: String,
    /// Description of what the function does
    pub description: String,
    /// JSON Schema for the parameters
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new function tool definition
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }

    /// Name of the advertised function
    pub fn name(&self) -> &str {
        &self.function.name
    }
}

/// Outcome of one tool call, already serialized to text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultRecord {
    /// Identifier of the call this answers
    pub call_id: String,
    /// Name of the tool that was executed
    pub tool_name: String,
    /// Whether the execution was successful
    pub success: bool,
    /// Canonical text output (or the error text)
    pub output: String,
}

impl ToolResultRecord {
    /// Create a successful result
    pub fn success(call: &ToolCall, output: impl Into<String>) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            success: true,
            output: output.into(),
        }
    }

    /// Create a failed result
    pub fn failure(call: &ToolCall, error: impl Into<String>) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            success: false,
            output: error.into(),
        }
    }
}

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeakerRole {
    /// The task giver or a human interrupting
    User,
    /// A model-backed participant
    Participant,
    /// The execution proxy (tool and code results, auto replies)
    Proxy,
    /// The orchestration engine itself (errors, directives)
    System,
}

/// What a turn carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    Message,
    ToolCall,
    ToolResult,
    CodeResult,
    DelegationSummary,
    Error,
    RevisionDirective,
}

/// One entry of a transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Speaker id (participant or proxy name, "user", "system")
    pub speaker: String,
    pub role: SpeakerRole,
    pub kind: TurnKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResultRecord>,
    /// Set on the turn that ended its loop
    #[serde(default)]
    pub terminal: bool,
    /// Hidden turns reach the model but not the caller-visible view
    #[serde(default)]
    pub hidden: bool,
}

impl Turn {
    fn new(speaker: impl Into<String>, role: SpeakerRole, kind: TurnKind, content: String) -> Self {
        Self {
            speaker: speaker.into(),
            role,
            kind,
            content,
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            terminal: false,
            hidden: false,
        }
    }

    /// A task or interruption from the human side
    pub fn user(speaker: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(speaker, SpeakerRole::User, TurnKind::Message, content.into())
    }

    /// A plain participant reply
    pub fn reply(speaker: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(speaker, SpeakerRole::Participant, TurnKind::Message, content.into())
    }

    /// A participant reply carrying tool-call directives
    pub fn tool_call(
        speaker: impl Into<String>,
        content: impl Into<String>,
        calls: Vec<ToolCall>,
    ) -> Self {
        let mut turn = Self::new(
            speaker,
            SpeakerRole::Participant,
            TurnKind::ToolCall,
            content.into(),
        );
        turn.tool_calls = calls;
        turn
    }

    /// The proxy's answer to a tool-call turn
    pub fn tool_result(speaker: impl Into<String>, results: Vec<ToolResultRecord>) -> Self {
        let content = results
            .iter()
            .map(|r| r.output.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let mut turn = Self::new(speaker, SpeakerRole::Proxy, TurnKind::ToolResult, content);
        turn.tool_results = results;
        turn
    }

    /// A proxy auto reply (continuation or code output)
    pub fn proxy(speaker: impl Into<String>, kind: TurnKind, content: impl Into<String>) -> Self {
        Self::new(speaker, SpeakerRole::Proxy, kind, content.into())
    }

    /// An error surfaced into the transcript
    pub fn error(speaker: impl Into<String>, role: SpeakerRole, content: impl Into<String>) -> Self {
        Self::new(speaker, role, TurnKind::Error, content.into())
    }

    /// A worker's condensed answer injected into a leader transcript
    pub fn delegation_summary(worker: impl Into<String>, summary: impl Into<String>) -> Self {
        Self::new(
            worker,
            SpeakerRole::Participant,
            TurnKind::DelegationSummary,
            summary.into(),
        )
    }

    /// A hidden instruction asking the primary participant to revise
    pub fn revision_directive(speaker: impl Into<String>, content: impl Into<String>) -> Self {
        let mut turn = Self::new(
            speaker,
            SpeakerRole::System,
            TurnKind::RevisionDirective,
            content.into(),
        );
        turn.hidden = true;
        turn
    }

    /// Mark this turn as the one that ended its loop
    pub fn into_terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn is_tool_result(&self) -> bool {
        self.kind == TurnKind::ToolResult
    }
}

/// When a human is consulted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HumanInputMode {
    /// Never ask; run on auto replies until termination
    #[default]
    Never,
    /// Ask before every continuation
    Always,
    /// Ask only when the loop is about to terminate
    Terminate,
}

impl std::fmt::Display for HumanInputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HumanInputMode::Never => write!(f, "never"),
            HumanInputMode::Always => write!(f, "always"),
            HumanInputMode::Terminate => write!(f, "terminate"),
        }
    }
}

impl std::str::FromStr for HumanInputMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "never" => Ok(Self::Never),
            "always" => Ok(Self::Always),
            "terminate" => Ok(Self::Terminate),
            other => Err(format!("unknown human input mode '{}'", other)),
        }
    }
}
