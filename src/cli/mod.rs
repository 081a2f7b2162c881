//! Command-line interface
//!
//! Argument parsing for the `ledger-node` binary and the operator console
//! a running node reads from standard input.

pub mod commands;
pub mod console;

pub use commands::{Command, Opt};
pub use console::run_console;
