//! Platform definition for vendor-specific CLI behavior.

use indexmap::IndexMap;
use regex::bytes::Regex;

use crate::channel::combine_prompt_patterns;
use crate::error::PlatformError;
use crate::model::CommandIntent;

/// Everything the SSH driver needs to know about one vendor family.
#[derive(Debug, Clone)]
pub struct PlatformDefinition {
    /// Platform name (e.g., "linux", "cisco_iosxe", "juniper_junos").
    pub name: String,

    /// Prompt patterns for every mode a session may land in.
    pub prompts: Vec<String>,

    /// Patterns that indicate command failure.
    pub failed_when_contains: Vec<String>,

    /// Commands to run when the session opens (paging, width).
    pub on_open_commands: Vec<String>,

    /// Commands to run before the session is closed.
    pub on_close_commands: Vec<String>,

    /// Intent key to vendor command.
    pub commands: IndexMap<String, String>,

    pub terminal_width: u32,
    pub terminal_height: u32,
}

impl PlatformDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prompts: vec![],
            failed_when_contains: vec![],
            on_open_commands: vec![],
            on_close_commands: vec![],
            commands: IndexMap::new(),
            terminal_width: 511,
            terminal_height: 24,
        }
    }

    pub fn with_prompt(mut self, pattern: impl Into<String>) -> Self {
        self.prompts.push(pattern.into());
        self
    }

    pub fn with_failure_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.failed_when_contains.push(pattern.into());
        self
    }

    pub fn with_on_open_command(mut self, command: impl Into<String>) -> Self {
        self.on_open_commands.push(command.into());
        self
    }

    pub fn with_on_close_command(mut self, command: impl Into<String>) -> Self {
        self.on_close_commands.push(command.into());
        self
    }

    /// Map an intent key (see [`CommandIntent::key`]) to a command.
    pub fn with_command(mut self, intent: &str, command: impl Into<String>) -> Self {
        self.commands.insert(intent.to_string(), command.into());
        self
    }

    pub fn with_terminal_size(mut self, width: u32, height: u32) -> Self {
        self.terminal_width = width;
        self.terminal_height = height;
        self
    }

    /// Command to issue for `intent`, if this platform supports it.
    pub fn command_for(&self, intent: &CommandIntent) -> Option<String> {
        match intent {
            CommandIntent::Custom(command) => Some(command.clone()),
            other => other.key().and_then(|k| self.commands.get(k).cloned()),
        }
    }

    /// Compile the prompts into a single end-anchored regex.
    pub fn prompt_pattern(&self) -> Result<Regex, PlatformError> {
        if self.prompts.is_empty() {
            return Err(PlatformError::InvalidDefinition {
                message: format!("platform '{}' has no prompt patterns", self.name),
            });
        }
        Ok(combine_prompt_patterns(&self.prompts)?)
    }

    /// First failure pattern found in `output`.
    pub fn detect_failure(&self, output: &str) -> Option<&str> {
        self.failed_when_contains
            .iter()
            .find(|pattern| output.contains(pattern.as_str()))
            .map(String::as_str)
    }

    /// Strip the command echo and the trailing prompt line.
    pub fn normalize_output(&self, raw: &str, command: &str) -> String {
        let output = raw.trim_start_matches(['\r', '\n']);
        let output = output
            .strip_prefix(command)
            .unwrap_or(output)
            .trim_start_matches(['\r', '\n']);

        let body = match output.rfind('\n') {
            Some(pos) => &output[..pos],
            None => "",
        };
        body.trim_end_matches(['\r', '\n']).replace("\r\n", "\n")
    }
}
