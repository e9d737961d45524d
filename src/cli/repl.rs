//! Interactive REPL for Conclave
//!
//! Provides the main user interaction loop around a two-party conversation.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use crate::agent::{ConversationLoop, RoleLibrary, RoleSource, Workflow};
use crate::cli::commands::{cli_role, handle_command, CommandContext, CommandResult};
use crate::cli::input::StdinHuman;
use crate::cli::render::{describe_outcome, render_turns};
use crate::core::{Config, HumanInputMode, Result};
use crate::llm::OllamaClient;

/// Interactive REPL (Read-Eval-Print Loop)
pub struct Repl {
    chat: ConversationLoop,
    config: Config,
    client: OllamaClient,
    library: RoleLibrary,
}

impl Repl {
    /// Create a REPL chatting with the given role
    pub fn new(config: Config, role: RoleSource) -> Result<Self> {
        let client = OllamaClient::from_config(&config)?;
        let library = RoleLibrary::builtin();
        cli_role(&library, &role)?;
        let workflow = Workflow::new(Arc::new(client.clone()), config.clone())
            .library(library.clone());

        let mut chat = workflow.single(role)?;
        if config.chat.human_input_mode != HumanInputMode::Never {
            chat = chat.human(Arc::new(StdinHuman));
        }

        Ok(Self {
            chat,
            config,
            client,
            library,
        })
    }

    /// Run the REPL
    pub async fn run(&mut self) -> Result<()> {
        self.print_banner();

        print!("Checking Ollama...");
        io::stdout().flush()?;

        let model = self.chat.participant().model().to_string();
        match self.client.is_model_available(&model).await {
            Ok(true) => println!(" Ready!\n"),
            Ok(false) => println!(" model '{}' not pulled, run: ollama pull {}\n", model, model),
            Err(e) => {
                println!("\n\nInitialization Error: {}\n", e);
                return Ok(());
            }
        }

        let stdin = io::stdin();
        let mut stdout = io::stdout();

        loop {
            print!("You: ");
            stdout.flush()?;

            let mut input = String::new();
            match stdin.lock().read_line(&mut input) {
                Ok(0) => {
                    // EOF (Ctrl+D)
                    println!("\nGoodbye!");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("Error reading input: {}", e);
                    continue;
                }
            }

            let input = input.trim();

            if input.is_empty() {
                continue;
            }

            let ctx = CommandContext {
                chat: &mut self.chat,
                config: &self.config,
                client: &self.client,
                library: &self.library,
            };
            match handle_command(input, ctx).await {
                Ok(CommandResult::Exit) => {
                    println!("\nGoodbye!");
                    break;
                }
                Ok(CommandResult::Clear) => {
                    println!("Conversation cleared.\n");
                    continue;
                }
                Ok(CommandResult::Handled(output)) => {
                    println!("{}\n", output);
                    continue;
                }
                Ok(CommandResult::Continue(input)) => self.send(input).await,
                Err(e) => {
                    eprintln!("Command error: {}\n", e);
                }
            }
        }

        Ok(())
    }

    /// Hand a message to the loop and print the turns it produced
    async fn send(&mut self, message: String) {
        let start = self.chat.transcript().len();
        let outcome = if start == 0 {
            self.chat.run(message).await
        } else {
            self.chat.continue_with(message).await
        };

        // Skip the user's own turn
        let produced = &self.chat.transcript().turns()[start + 1..];
        if !produced.is_empty() {
            println!("\n{}", render_turns(produced));
        }
        println!("\n({})\n", describe_outcome(&outcome));
    }

    /// Print the startup banner
    fn print_banner(&self) {
        let participant = self.chat.participant();

        println!(
            r#"
╔═══════════════════════════════════════════════╗
║                                               ║
║   CONCLAVE                                    ║
║   Multi-agent conversations on local models   ║
║                                               ║
╚═══════════════════════════════════════════════╝
"#
        );
        println!("Ollama:    {}", self.config.ollama_url());
        println!("Assistant: {}", participant.name());
        println!("Model:     {}", participant.model());
        println!("Tools:     {}", participant.tools().len());
        println!();
        println!("Commands: help, clear, status, transcript, roles, models, exit");
        println!("─────────────────────────────────────────────────");
    }
}
