//! Built-in vendor platform definitions.

pub mod arista_eos;
pub mod arrcus_arcos;
pub mod cisco_iosxe;
pub mod juniper_junos;
pub mod linux;
pub mod nokia_sros;

use super::PlatformDefinition;

/// All built-in platforms, in registration order.
pub fn builtin() -> Vec<PlatformDefinition> {
    vec![
        linux::platform(),
        cisco_iosxe::platform(),
        arista_eos::platform(),
        juniper_junos::platform(),
        nokia_sros::platform(),
        arrcus_arcos::platform(),
    ]
}
