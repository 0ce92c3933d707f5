//! CLI subcommands.

pub mod common;
pub mod render;
pub mod resolve;
