//! CLI commands

pub mod apply;
pub mod diff;
pub mod fingerprint;
pub mod template;
pub mod validate;
