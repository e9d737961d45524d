//! Conclave - Multi-agent conversation orchestration
//!
//! Drives conversations between model-backed participants: a two-party loop
//! with tool execution, round-robin group chats, leader/worker delegation
//! through nested chats, and reflection by a silent reviewer.
//!
//! # Architecture
//!
//! - **Core**: Shared types, configuration, logging and error handling
//! - **LLM**: Model backend abstraction with Ollama and scripted implementations
//! - **Tools**: Tool definitions, the catalog roles draw from, and the registry
//!   that binds tools to callers and executors
//! - **Agent**: Participants, the execution proxy and the orchestrators
//! - **CLI**: Command-line interface and REPL
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use conclave::agent::{RoleSource, Workflow};
//! use conclave::llm::OllamaClient;
//! use conclave::Config;
//!
//! #[tokio::main]
//! async fn main() -> conclave::Result<()> {
//!     let config = Config::load();
//!     let backend = Arc::new(OllamaClient::from_config(&config)?);
//!     let mut chat = Workflow::new(backend, config).single(RoleSource::library("Data_Analyst"))?;
//!
//!     let outcome = chat.run("Summarise the trend in [3, 5, 8, 13].").await;
//!     println!("{:?}", outcome.final_reply);
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod cli;
pub mod core;
pub mod llm;
pub mod tools;

// Re-export commonly used items
pub use agent::{ConversationLoop, GroupChat, LeaderChat, ReflectiveChat, Workflow};
pub use cli::Repl;
pub use core::{Config, ConclaveError, Result};
