use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin};
use tokio::sync::Mutex;

use crate::errors::AgentResult;

/// Line-oriented user interaction: the menu, mode parameters and reports.
#[async_trait]
pub trait Console: Send + Sync {
    /// Shows `question` and returns the trimmed answer. End of input yields
    /// an empty string.
    async fn prompt(&self, question: &str) -> AgentResult<String>;
    async fn print(&self, text: &str);

    async fn wait_ack(&self, message: &str) {
        if let Err(e) = self.prompt(message).await {
            tracing::debug!(error = %e, "acknowledgement prompt failed");
        }
    }
}

pub struct StdConsole {
    stdin: Mutex<BufReader<Stdin>>,
}

impl StdConsole {
    pub fn new() -> Self {
        Self {
            stdin: Mutex::new(BufReader::new(tokio::io::stdin())),
        }
    }
}

impl Default for StdConsole {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Console for StdConsole {
    async fn prompt(&self, question: &str) -> AgentResult<String> {
        let mut out = tokio::io::stdout();
        out.write_all(question.as_bytes()).await?;
        out.flush().await?;
        let mut line = String::new();
        self.stdin.lock().await.read_line(&mut line).await?;
        Ok(line.trim().to_string())
    }

    async fn print(&self, text: &str) {
        let mut out = tokio::io::stdout();
        let _ = out.write_all(text.as_bytes()).await;
        let _ = out.write_all(b"\n").await;
        let _ = out.flush().await;
    }
}

/// Parses a number answer, falling back to `default` on blank or bad input.
pub fn parse_or<T: std::str::FromStr>(answer: &str, default: T) -> T {
    answer.trim().parse().unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_answer_uses_default() {
        assert_eq!(parse_or::<u8>("", 10), 10);
        assert_eq!(parse_or::<u8>(" 12 ", 10), 12);
        assert_eq!(parse_or::<u64>("abc", 0), 0);
    }
}
