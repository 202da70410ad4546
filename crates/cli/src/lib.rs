//! earthfetch-cli: the `ef` command
//!
//! Exposed as a library so the command parsers and output helpers can be
//! tested without spawning the binary.

pub mod commands;
pub mod exit_code;
pub mod output;
