//! Arrcus ArcOS platform definition.

use crate::platform::PlatformDefinition;

pub fn platform() -> PlatformDefinition {
    PlatformDefinition::new("arrcus_arcos")
        .with_prompt(r"(?mi)^[\w\-.@()/:]{1,63}#\s?$")
        .with_prompt(r"(?mi)^[\w\-.@()/:]{1,63}\(config[\w\-.@/:+]{0,63}\)#\s?$")
        .with_failure_pattern("is ambiguous")
        .with_failure_pattern("No valid completions")
        .with_failure_pattern("unknown command")
        .with_failure_pattern("syntax error")
        .with_on_open_command("screen-width 511")
        .with_on_open_command("screen-length 0")
        .with_command("running_config", "show running-config | nomore")
        .with_command("version", "show version | nomore")
}
