//! CLI module for the `memberqa` binary
//!
//! - Command line argument parsing
//! - Command handlers
//! - Output formatting

pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::*;
pub use handlers::*;
