//! Linux platform definition.
//!
//! Standard Linux/Unix shells with `$` (user) and `#` (root) prompts. Useful for
//! servers and white-box switches that keep their configuration in files.

use crate::platform::PlatformDefinition;

pub fn platform() -> PlatformDefinition {
    PlatformDefinition::new("linux")
        .with_prompt(r"[$#]\s*$")
        .with_failure_pattern("command not found")
        .with_failure_pattern("No such file or directory")
        .with_failure_pattern("Permission denied")
        .with_failure_pattern("Operation not permitted")
        .with_command("running_config", "cat /etc/network/interfaces")
        .with_command("version", "uname -a")
        .with_terminal_size(511, 24)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_match() {
        let prompt = platform().prompt_pattern().unwrap();
        assert!(prompt.is_match(b"user@host:~$ "));
        assert!(prompt.is_match(b"root@host:~# "));
        assert!(!prompt.is_match(b"user@host:~> "));
    }

    #[test]
    fn test_failed_when_contains() {
        let platform = platform();
        assert!(
            platform
                .failed_when_contains
                .contains(&"command not found".to_string())
        );
    }
}
