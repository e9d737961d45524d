//! CLI commands
//!
//! Special commands that can be executed in the REPL.

use crate::agent::{ConversationLoop, RoleLibrary, RoleProfile, RoleSource};
use crate::cli::render::render_transcript;
use crate::core::{Config, ConclaveError, Result};
use crate::llm::OllamaClient;

/// Result of parsing a command
pub enum CommandResult {
    /// Send as a message to the assistant
    Continue(String),
    /// Command was handled, show output
    Handled(String),
    /// Exit the REPL
    Exit,
    /// Transcript was reset
    Clear,
}

/// What commands may look at or change
pub struct CommandContext<'a> {
    pub chat: &'a mut ConversationLoop,
    pub config: &'a Config,
    pub client: &'a OllamaClient,
    pub library: &'a RoleLibrary,
}

/// Parse and handle special commands
pub async fn handle_command(input: &str, ctx: CommandContext<'_>) -> Result<CommandResult> {
    let input = input.trim();
    let cmd = input.split_whitespace().next().unwrap_or("").to_lowercase();

    match cmd.as_str() {
        "exit" | "quit" | "q" => Ok(CommandResult::Exit),

        "clear" | "reset" => {
            ctx.chat.reset();
            Ok(CommandResult::Clear)
        }

        "help" | "?" => Ok(CommandResult::Handled(help_text())),

        "models" => {
            let models = ctx.client.list_models().await?;
            Ok(CommandResult::Handled(format!(
                "Available models:\n{}\n\nCurrent: {}",
                models
                    .iter()
                    .map(|m| format!("  - {}", m))
                    .collect::<Vec<_>>()
                    .join("\n"),
                ctx.chat.participant().model()
            )))
        }

        "roles" => Ok(CommandResult::Handled(format!(
            "Built-in roles:\n{}",
            role_listing(ctx.library)
        ))),

        "transcript" => Ok(CommandResult::Handled(render_transcript(ctx.chat.transcript()))),

        "status" => {
            let participant = ctx.chat.participant();
            Ok(CommandResult::Handled(format!(
                "Conclave Status:\n\
                 ─────────────────────────────\n\
                 Assistant:   {}\n\
                 Model:       {}\n\
                 Tools:       {}\n\
                 Human input: {}\n\
                 Auto replies: {}\n\
                 State:       {:?}\n\
                 Transcript:  {} turns",
                participant.name(),
                participant.model(),
                participant.tools().len(),
                ctx.config.chat.human_input_mode,
                ctx.config.chat.max_consecutive_auto_reply,
                ctx.chat.state(),
                ctx.chat.transcript().len(),
            )))
        }

        _ if input.starts_with('/') => Ok(CommandResult::Handled(format!(
            "Unknown command: {}. Type 'help' for available commands.",
            input
        ))),

        _ => Ok(CommandResult::Continue(input.to_string())),
    }
}

/// Generate help text
fn help_text() -> String {
    r#"Conclave Commands:
─────────────────────────────────────────────
  help, ?          Show this help message
  exit, quit, q    Exit Conclave
  clear, reset     Start a new conversation
  status           Show the assistant and loop state
  transcript       Print the conversation so far
  roles            List built-in roles
  models           List available Ollama models

Anything else is sent to the assistant. The conversation continues
until the assistant replies TERMINATE or the auto-reply limit is hit.
─────────────────────────────────────────────"#
        .to_string()
}

/// One line per role; roles that call tools are marked, the CLI cannot run them
pub fn role_listing(library: &RoleLibrary) -> String {
    library
        .names()
        .iter()
        .filter_map(|name| library.get(name))
        .map(|profile| {
            let marker = if profile.tools().is_empty() {
                ""
            } else {
                " [needs tools]"
            };
            format!("  {:<24} {}{}", profile.name(), profile.description(), marker)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Resolve a role for the command line, which has no tool catalog
pub fn cli_role(library: &RoleLibrary, source: &RoleSource) -> Result<RoleProfile> {
    let profile = source.resolve(library)?;
    if !profile.tools().is_empty() {
        return Err(ConclaveError::config(format!(
            "role '{}' calls tools ({}) and the command line has no tool catalog; \
             pick a role without tools or embed conclave as a library",
            profile.name(),
            profile.tools().join(", ")
        )));
    }
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_marks_tool_roles() {
        let listing = role_listing(&RoleLibrary::builtin());
        let line = |name: &str| {
            listing
                .lines()
                .find(|l| l.trim_start().starts_with(name))
                .unwrap_or_default()
                .to_string()
        };
        assert!(line("Market_Analyst").ends_with("[needs tools]"));
        assert!(!line("Software_Developer").contains("[needs tools]"));
    }

    #[test]
    fn test_cli_role_rejects_tool_roles() {
        let library = RoleLibrary::builtin();
        let err = cli_role(&library, &RoleSource::library("Market_Analyst")).unwrap_err();
        assert!(matches!(err, ConclaveError::Config(_)));
        assert!(err.to_string().contains("no tool catalog"));

        let profile = cli_role(&library, &RoleSource::library("Software_Developer")).unwrap();
        assert_eq!(profile.name(), "Software_Developer");
    }
}
