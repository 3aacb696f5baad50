//! Nokia SR OS platform definition (MD-CLI and classic CLI).
//!
//! ```text
//! [/]
//! A:admin@router#          # MD-CLI operational
//! *A:router#               # classic CLI
//! ```

use crate::platform::PlatformDefinition;

pub fn platform() -> PlatformDefinition {
    PlatformDefinition::new("nokia_sros")
        .with_prompt(r"(?mi)^\[.*\]\r?\n\*?[abcd]:[\w._-]+@[\w\s_.-]+#\s?$")
        .with_prompt(r"(?mi)^!?\*?\((?:ex|ex:bof|ro|gl|pr)\)\[.*\]\r?\n\*?[abcd]:[\w._-]+@[\w\s_.-]+#\s?$")
        .with_prompt(r"(?mi)^\*?[abcd]:[\w\s_.-]+#\s?$")
        .with_failure_pattern("MINOR:")
        .with_failure_pattern("MAJOR:")
        .with_failure_pattern("CRITICAL:")
        .with_failure_pattern("Error:")
        .with_failure_pattern("Bad Command:")
        .with_on_open_command("environment more false")
        .with_on_open_command("environment console width 512")
        .with_command("running_config", "admin show configuration")
        .with_command("startup_config", "file type cf3:/config.cfg")
        .with_command("version", "show version")
        .with_terminal_size(512, 24)
}
