//! HTTP client module
//!
//! Provides the authenticated client and the connection configurator hook.
//!
//! # Features
//!
//! - **Token Reuse**: Negotiate once, then attach the cached session token
//! - **Pluggable Schemes**: Any [`Authenticator`](crate::auth::Authenticator)
//! - **Connection Hooks**: Timeouts and other transport settings via
//!   [`ConnectionConfigurator`]

mod client;
mod configurator;

pub use client::{AuthenticatedClient, Connection};
pub use configurator::{ConnectionConfigurator, NoopConfigurator, TimeoutConfigurator};
