//! Server-side validation
//!
//! The receiving half of the handshake:
//! - [`AuthHandler`] - one per scheme, runs only when no valid token is present
//! - [`ServerValidator`] - verifies, issues and refreshes session tokens
//! - [`require_auth`] - axum middleware applying the validator per request
//! - [`echo_router`] - small protected router used by `authtoken serve` and
//!   the end-to-end tests

mod handler;
mod middleware;
mod routes;
mod validator;

pub use handler::{
    AuthHandler, BasicHandler, HandlerOutcome, NegotiateHandler, PseudoHandler, ANONYMOUS,
};
pub use middleware::require_auth;
pub use routes::{echo_router, serve, serve_listener};
pub use validator::{Decision, ServerValidator, ValidatorConfig};

#[cfg(test)]
mod tests;
