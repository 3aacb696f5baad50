//! Cisco IOS-XE platform definition.
//!
//! Backups run from privileged EXEC (`#`); the `>` exec prompt is accepted so
//! a session that lands unprivileged still reaches a prompt and fails on the
//! command instead of timing out.
//!
//! ```text
//! router>            # exec
//! router#            # privilege_exec
//! router(config)#    # configuration
//! ```

use crate::platform::PlatformDefinition;

pub fn platform() -> PlatformDefinition {
    PlatformDefinition::new("cisco_iosxe")
        .with_prompt(r"(?mi)^[\w.\-@/:]{1,63}>\s?$")
        .with_prompt(r"(?mi)^[\w.\-@/:]{1,63}#\s?$")
        .with_prompt(r"(?mi)^[\w.\-@/:]{1,63}\(conf[\w.\-@/:+]{0,32}\)#\s?$")
        .with_failure_pattern("% Ambiguous command")
        .with_failure_pattern("% Incomplete command")
        .with_failure_pattern("% Invalid input detected")
        .with_failure_pattern("% Unknown command")
        .with_failure_pattern("% Authorization failed")
        .with_on_open_command("terminal length 0")
        .with_on_open_command("terminal width 512")
        .with_command("running_config", "show running-config")
        .with_command("startup_config", "show startup-config")
        .with_command("version", "show version")
        .with_terminal_size(512, 24)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_match() {
        let prompt = platform().prompt_pattern().unwrap();
        assert!(prompt.is_match(b"router>"));
        assert!(prompt.is_match(b"building config\r\nrouter#"));
        assert!(prompt.is_match(b"router(config-if)#"));
        assert!(!prompt.is_match(b"router$"));
    }

    #[test]
    fn test_unprivileged_command_fails() {
        let platform = platform();
        let output = "show running-config\n                 ^\n% Invalid input detected at '^' marker.";
        assert!(platform.detect_failure(output).is_some());
    }
}
