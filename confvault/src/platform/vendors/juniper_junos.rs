//! Juniper JUNOS platform definition.
//!
//! ```text
//! user@router>              # operational mode
//! {master:0}[edit]
//! user@router#              # configuration mode
//! ```
//!
//! Configuration is retrieved in `set` form so snapshots diff line by line.

use crate::platform::PlatformDefinition;

pub fn platform() -> PlatformDefinition {
    PlatformDefinition::new("juniper_junos")
        .with_prompt(r"(?mi)^(\{\w+(:(\w+)?\d)?\}\n)?[\w\-@()/:\.]{1,63}>\s?$")
        .with_prompt(r"(?mi)^(\{\w+(:(\w+)?\d)?\}\[edit\]\n)?[\w\-@()/:\.]{1,63}#\s?$")
        .with_failure_pattern("unknown command")
        .with_failure_pattern("syntax error")
        .with_failure_pattern("error:")
        .with_failure_pattern("missing argument")
        .with_failure_pattern("is ambiguous")
        .with_on_open_command("set cli screen-length 0")
        .with_on_open_command("set cli screen-width 511")
        .with_command("running_config", "show configuration | display set | no-more")
        .with_command("startup_config", "file show /config/juniper.conf.gz | no-more")
        .with_command("version", "show version | no-more")
        .with_terminal_size(511, 24)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_match() {
        let prompt = platform().prompt_pattern().unwrap();
        assert!(prompt.is_match(b"user@router>"));
        assert!(prompt.is_match(b"user@router> "));
        assert!(prompt.is_match(b"user@router#"));
        assert!(!prompt.is_match(b"user@router%"));
    }
}
