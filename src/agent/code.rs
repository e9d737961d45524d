//! Code execution for the proxy
//!
//! Fenced code blocks in a participant reply can be run by the proxy; the
//! combined exit code and output become the proxy's answer.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::core::{ConclaveError, Result};

/// A fenced code block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub language: String,
    pub code: String,
}

/// Result of running a batch of blocks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeResult {
    pub exit_code: i32,
    pub output: String,
}

impl CodeResult {
    /// Text the proxy replies with
    pub fn to_reply(&self) -> String {
        let status = if self.exit_code == 0 {
            "execution succeeded"
        } else {
            "execution failed"
        };
        format!(
            "exitcode: {} ({})\nCode output: {}",
            self.exit_code, status, self.output
        )
    }
}

/// Runs code blocks on behalf of the proxy
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    async fn execute(&self, blocks: &[CodeBlock]) -> Result<CodeResult>;
}

/// Extract ```lang fenced blocks from a reply
pub fn extract_code_blocks(text: &str) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in text.lines() {
        let trimmed = line.trim_start();
        match current.take() {
            None => {
                if let Some(lang) = trimmed.strip_prefix("```") {
                    current = Some((lang.trim().to_lowercase(), Vec::new()));
                }
            }
            Some((lang, lines)) if trimmed.starts_with("```") => {
                blocks.push(CodeBlock {
                    language: lang,
                    code: lines.join("\n"),
                });
            }
            Some((lang, mut lines)) => {
                lines.push(line);
                current = Some((lang, lines));
            }
        }
    }
    blocks
}

/// Executes blocks as local processes in a working directory
#[derive(Debug, Clone)]
pub struct LocalCommandExecutor {
    work_dir: PathBuf,
    timeout: Duration,
}

impl LocalCommandExecutor {
    pub fn new(work_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            work_dir: work_dir.into(),
            timeout,
        }
    }

    fn command_for(language: &str) -> Option<(&'static str, &'static str)> {
        match language {
            "" | "sh" | "bash" | "shell" | "console" => Some(("sh", "-c")),
            "python" | "py" | "python3" => Some(("python3", "-c")),
            _ => None,
        }
    }

    async fn run_block(&self, block: &CodeBlock) -> Result<CodeResult> {
        let Some((program, flag)) = Self::command_for(&block.language) else {
            return Ok(CodeResult {
                exit_code: 1,
                output: format!("unknown language {}", block.language),
            });
        };

        debug!(language = %block.language, dir = %self.work_dir.display(), "running code block");
        let child = Command::new(program)
            .arg(flag)
            .arg(&block.code)
            .current_dir(&self.work_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| ConclaveError::Timeout(self.timeout))??;

        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            text.push_str(&stderr);
        }

        Ok(CodeResult {
            exit_code: output.status.code().unwrap_or(-1),
            output: text,
        })
    }
}

#[async_trait]
impl CodeExecutor for LocalCommandExecutor {
    /// Run blocks in order, stopping at the first failure
    async fn execute(&self, blocks: &[CodeBlock]) -> Result<CodeResult> {
        tokio::fs::create_dir_all(&self.work_dir).await?;

        let mut combined = String::new();
        for block in blocks {
            let result = match self.run_block(block).await {
                Ok(result) => result,
                Err(ConclaveError::Timeout(limit)) => {
                    warn!(?limit, "code block timed out");
                    CodeResult {
                        exit_code: 124,
                        output: format!("Timeout after {:?}", limit),
                    }
                }
                Err(e) => return Err(e),
            };
            combined.push_str(&result.output);
            if result.exit_code != 0 {
                return Ok(CodeResult {
                    exit_code: result.exit_code,
                    output: combined,
                });
            }
        }

        Ok(CodeResult {
            exit_code: 0,
            output: combined,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_blocks() {
        let text = "Run this:\n```python\nprint(1)\nprint(2)\n```\nthen\n```\necho hi\n```";
        let blocks = extract_code_blocks(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].language, "python");
        assert_eq!(blocks[0].code, "print(1)\nprint(2)");
        assert_eq!(blocks[1].language, "");
    }

    #[test]
    fn test_unclosed_block_ignored() {
        assert!(extract_code_blocks("```sh\necho open").is_empty());
    }

    #[test]
    fn test_reply_format() {
        let ok = CodeResult {
            exit_code: 0,
            output: "42\n".into(),
        };
        assert_eq!(ok.to_reply(), "exitcode: 0 (execution succeeded)\nCode output: 42\n");
    }

    #[tokio::test]
    async fn test_shell_block_runs() {
        let dir = std::env::temp_dir().join("conclave-code-test");
        let executor = LocalCommandExecutor::new(&dir, Duration::from_secs(10));
        let result = executor
            .execute(&[CodeBlock {
                language: "sh".into(),
                code: "echo hello".into(),
            }])
            .await
            .unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.output.trim(), "hello");
    }

    #[tokio::test]
    async fn test_unknown_language_fails() {
        let executor = LocalCommandExecutor::new(std::env::temp_dir(), Duration::from_secs(1));
        let result = executor
            .execute(&[CodeBlock {
                language: "cobol".into(),
                code: "DISPLAY 'HI'".into(),
            }])
            .await
            .unwrap();
        assert_eq!(result.exit_code, 1);
        assert!(result.output.contains("unknown language"));
    }
}
