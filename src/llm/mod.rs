//! LLM module - model backend integrations
//!
//! Provides the backend abstraction, the Ollama client and a scripted backend
//! for deterministic runs.

pub mod ollama;
pub mod scripted;
pub mod traits;

pub use ollama::OllamaClient;
pub use scripted::ScriptedBackend;
pub use traits::{GenerateOptions, ModelBackend, ModelReply, TokenUsage};
