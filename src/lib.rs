// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # authtoken
//!
//! Pluggable HTTP negotiation that runs once per session. A successful
//! handshake is converted into a compact, signed, self-contained token which
//! the client reuses until it expires.
//!
//! ## Features
//!
//! - **Pluggable Schemes**: Negotiate (multi-round), Basic, Pseudo
//! - **Signed Tokens**: HMAC-SHA256, verified without server-side sessions
//! - **Token Reuse**: The client negotiates only when its token is unset or expired
//! - **Connection Hooks**: Timeouts and other settings on every request
//! - **Axum Middleware**: Drop-in server-side validation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use authtoken::auth::{NegotiateAuthenticator, SharedKeyMechanism};
//! use authtoken::http::AuthenticatedClient;
//! use authtoken::token::Token;
//!
//! #[tokio::main]
//! async fn main() -> authtoken::Result<()> {
//!     let mechanism = SharedKeyMechanism::new("alice", b"alice-key")?;
//!     let client = AuthenticatedClient::new(NegotiateAuthenticator::new(mechanism));
//!
//!     let url = "http://localhost:8080/foo/bar".parse()?;
//!     let mut token = Token::new();
//!
//!     // First open negotiates, later opens reuse the token
//!     for _ in 0..2 {
//!         let response = client.open(&url, &mut token).await?.get().send().await?;
//!         println!("{}", response.text().await?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//!  client                                         server
//! ┌──────────────────────────┐          ┌──────────────────────────────┐
//! │ AuthenticatedClient      │  OPTIONS │ require_auth (axum)          │
//! │   open(url, &mut Token)  │ ───────> │   ServerValidator            │
//! │     Authenticator        │ <─────── │     cookie → Signer::verify  │
//! │       Negotiate/Basic/   │  401/200 │     else AuthHandler         │
//! │       Pseudo             │          │       Negotiate/Basic/Pseudo │
//! │   Connection (+cookie)   │ ───────> │   downstream handler         │
//! └──────────────────────────┘          └──────────────────────────────┘
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and wire constants
pub mod types;

/// Session tokens and signing
pub mod token;

/// Client-side authenticators and negotiation mechanisms
pub mod auth;

/// Authenticated HTTP client
pub mod http;

/// Server-side validation and middleware
pub mod server;

/// YAML configuration
pub mod config;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

// Re-export commonly used types
pub use auth::Authenticator;
pub use config::{load_config, load_config_from_str, AppConfig};
pub use http::{AuthenticatedClient, ConnectionConfigurator};
pub use server::ServerValidator;
pub use token::{AuthToken, Signer, Token};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
