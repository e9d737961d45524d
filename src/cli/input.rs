//! Human input from the terminal

use std::io::{self, BufRead, Write};

use async_trait::async_trait;

use crate::agent::HumanInput;

/// Asks on stdout and reads one line from stdin; EOF means "exit"
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinHuman;

#[async_trait]
impl HumanInput for StdinHuman {
    async fn ask(&self, prompt: &str) -> Option<String> {
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || {
            print!("\n{}\n> ", prompt);
            io::stdout().flush().ok()?;
            let mut line = String::new();
            match io::stdin().lock().read_line(&mut line) {
                Ok(0) | Err(_) => None,
                Ok(_) => Some(line.trim_end().to_string()),
            }
        })
        .await
        .ok()
        .flatten()
    }
}
