//! Conclave - Multi-agent conversation orchestration
//!
//! Main entry point for the CLI application.

use std::sync::Arc;

use clap::Parser;
use conclave::agent::{RoleLibrary, RoleProfile, RoleSource, TerminationReason, Workflow};
use conclave::cli::commands::{cli_role, role_listing};
use conclave::cli::render::{describe_outcome, render_transcript};
use conclave::cli::StdinHuman;
use conclave::core::{logging, HumanInputMode};
use conclave::llm::OllamaClient;
use conclave::{Config, Repl};

/// Conclave - Multi-agent conversations on local models
#[derive(Parser, Debug)]
#[command(name = "conclave")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Built-in role to chat with
    #[arg(long, short = 'r', default_value = "Software_Developer")]
    role: String,

    /// Inline instructions; replaces the built-in role
    #[arg(long, short = 'i')]
    instructions: Option<String>,

    /// Built-in role that silently reviews each answer (single prompt mode)
    #[arg(long)]
    reviewer: Option<String>,

    /// Model for every participant
    #[arg(long, short = 'm')]
    model: Option<String>,

    /// When to ask you: never, always or terminate
    #[arg(long)]
    human_input_mode: Option<HumanInputMode>,

    /// Automatic proxy replies allowed before stopping
    #[arg(long)]
    max_auto_reply: Option<usize>,

    /// Run fenced code blocks found in replies
    #[arg(long)]
    code_execution: bool,

    /// Placeholder value for role instructions, as KEY=VALUE
    #[arg(long = "var", value_parser = parse_var)]
    vars: Vec<(String, String)>,

    /// List built-in roles and exit
    #[arg(long)]
    list_roles: bool,

    /// Enable debug output
    #[arg(long, short = 'd')]
    debug: bool,

    /// Single prompt mode (non-interactive)
    #[arg(long, short = 'p')]
    prompt: Option<String>,
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.list_roles {
        println!("{}", role_listing(&RoleLibrary::builtin()));
        return Ok(());
    }

    // Build configuration
    let mut config = Config::load();

    // Apply CLI overrides
    if let Some(ref model) = args.model {
        config.models.default = model.clone();
    }

    if let Some(mode) = args.human_input_mode {
        config.chat.human_input_mode = mode;
    }

    if let Some(max) = args.max_auto_reply {
        config.chat.max_consecutive_auto_reply = max;
    }

    if args.code_execution {
        config.chat.code_execution = true;
    }

    if args.debug {
        config.chat.debug = true;
    }

    logging::init(config.chat.debug);

    let role = match args.instructions {
        Some(instructions) => RoleSource::Inline(RoleProfile::new("Assistant", instructions)),
        None => RoleSource::library(args.role),
    };

    cli_role(&RoleLibrary::builtin(), &role)?;

    // Single prompt mode
    if let Some(prompt) = args.prompt {
        let backend = Arc::new(OllamaClient::from_config(&config)?);
        let ask_human = config.chat.human_input_mode != HumanInputMode::Never;
        let workflow = args
            .vars
            .into_iter()
            .fold(Workflow::new(backend, config), |w, (k, v)| w.var(k, v));

        let outcome = match args.reviewer {
            Some(reviewer) => {
                let mut chat = workflow.shadow(role, RoleSource::library(reviewer))?;
                let outcome = chat.run(prompt).await;
                println!("{}", render_transcript(chat.transcript()));
                println!(
                    "\n(review rounds: {}, approved: {})",
                    outcome.rounds, outcome.approved
                );
                outcome.chat
            }
            None => {
                let mut chat = workflow.single(role)?;
                if ask_human {
                    chat = chat.human(Arc::new(StdinHuman));
                }
                let outcome = chat.run(prompt).await;
                println!("{}", render_transcript(chat.transcript()));
                outcome
            }
        };

        println!("\n({})", describe_outcome(&outcome));
        if outcome.reason() == Some(TerminationReason::BackendFailure) {
            anyhow::bail!("conversation ended with {}", describe_outcome(&outcome));
        }
        return Ok(());
    }

    // Interactive REPL mode
    let mut repl = Repl::new(config, role)?;
    repl.run().await?;

    Ok(())
}
