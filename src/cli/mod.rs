//! CLI command handlers

pub mod commands;

pub use commands::{read, unmerge, write};
