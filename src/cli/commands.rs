//! CLI commands and argument parsing

use crate::types::AuthScheme;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Negotiate once, then reuse a signed session token
#[derive(Parser, Debug)]
#[command(name = "authtoken")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (YAML)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the protected echo server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// GET a protected URL
    Get {
        /// Target URL
        url: String,

        #[command(flatten)]
        auth: AuthArgs,
    },

    /// POST a body to a protected URL and print the response
    Post {
        /// Target URL
        url: String,

        /// Request body
        #[arg(short, long, default_value = "")]
        data: String,

        #[command(flatten)]
        auth: AuthArgs,
    },
}

/// Client credentials and token persistence
#[derive(Args, Debug, Clone)]
pub struct AuthArgs {
    /// Negotiation scheme
    #[arg(long, default_value = "negotiate")]
    pub scheme: SchemeArg,

    /// Principal / user name
    #[arg(short, long, env = "AUTHTOKEN_USER")]
    pub user: Option<String>,

    /// Password for the basic scheme
    #[arg(long, env = "AUTHTOKEN_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Shared key for the negotiate scheme
    #[arg(long, env = "AUTHTOKEN_KEY", hide_env_values = true)]
    pub key: Option<String>,

    /// File holding the session token between invocations
    #[arg(long)]
    pub token_file: Option<PathBuf>,
}

/// Scheme selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SchemeArg {
    /// Multi-round challenge negotiation
    Negotiate,
    /// HTTP Basic credentials
    Basic,
    /// Trusted user name
    Pseudo,
}

impl From<SchemeArg> for AuthScheme {
    fn from(arg: SchemeArg) -> Self {
        match arg {
            SchemeArg::Negotiate => AuthScheme::Negotiate,
            SchemeArg::Basic => AuthScheme::Basic,
            SchemeArg::Pseudo => AuthScheme::Pseudo,
        }
    }
}
