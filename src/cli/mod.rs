//! CLI module - command-line interface
//!
//! Contains the REPL, command parsing, terminal input and transcript rendering.

pub mod commands;
pub mod input;
pub mod render;
pub mod repl;

pub use input::StdinHuman;
pub use repl::Repl;
