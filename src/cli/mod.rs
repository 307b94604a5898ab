//! CLI module
//!
//! Command-line interface for the handshake client and the demo server.
//!
//! # Commands
//!
//! - `serve` - Start the protected echo server
//! - `get` - GET a protected URL
//! - `post` - POST a body to a protected URL

mod commands;
mod runner;

pub use crate::server::serve;
pub use commands::{AuthArgs, Cli, Commands, SchemeArg};
pub use runner::Runner;
