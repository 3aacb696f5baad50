//! Arista EOS platform definition.
//!
//! Prompt patterns are adapted from [scrapli](https://github.com/carlmontanari/scrapli).
//!
//! ```text
//! switch>                            # exec mode
//! switch#                            # privilege_exec mode
//! switch(config)#                    # configuration mode
//! switch(config-s-my_ses)#           # named config session
//! ```

use crate::platform::PlatformDefinition;

pub fn platform() -> PlatformDefinition {
    PlatformDefinition::new("arista_eos")
        .with_prompt(r"(?mi)^[\w.\-@()/: ]{1,63}>\s?$")
        .with_prompt(r"(?mi)^[\w.\-@()/: ]{1,63}#\s?$")
        .with_prompt(r"(?mi)^[\w.\-@()/: ]{1,63}\(config[\w.\-@/:+]{0,63}\)#\s?$")
        .with_failure_pattern("% Ambiguous command")
        .with_failure_pattern("% Error")
        .with_failure_pattern("% Incomplete command")
        .with_failure_pattern("% Invalid input")
        .with_failure_pattern("% Unavailable command")
        .with_on_open_command("terminal length 0")
        .with_on_open_command("terminal width 32767")
        .with_command("running_config", "show running-config")
        .with_command("startup_config", "show startup-config")
        .with_command("version", "show version")
        .with_terminal_size(32767, 24)
}
