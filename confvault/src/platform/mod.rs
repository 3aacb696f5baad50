//! Platform definitions for multi-vendor support.
//!
//! A platform describes how a vendor's CLI looks (prompts, failure markers),
//! how to prepare a session (paging off) and which command serves each intent.

mod definition;
pub mod vendors;

pub use definition::PlatformDefinition;
