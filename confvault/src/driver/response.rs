//! Response type for command execution results.

use std::time::Duration;

/// Output of one successful command.
#[derive(Debug, Clone)]
pub struct Response {
    /// The command that was executed.
    pub command: String,

    /// Normalized output: command echo and trailing prompt removed.
    pub result: String,

    /// The prompt that ended the read.
    pub prompt: String,

    /// Time taken to execute the command.
    pub elapsed: Duration,
}

impl Response {
    pub fn new(
        command: impl Into<String>,
        result: impl Into<String>,
        prompt: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            command: command.into(),
            result: result.into(),
            prompt: prompt.into(),
            elapsed,
        }
    }

    /// Session transcript for the connection log.
    pub fn transcript(&self, output: &str) -> String {
        format!("{} {}\n{}", self.prompt, self.command, output)
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.result)
    }
}
