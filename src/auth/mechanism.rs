//! Pluggable security mechanisms for challenge negotiation
//!
//! A mechanism supplies the opaque tokens exchanged inside
//! `Authorization: Negotiate <b64>` / `WWW-Authenticate: Negotiate <b64>`.
//! The HTTP side of the exchange lives in the negotiate authenticator and
//! handler; this module only defines the byte-level contract.

use crate::error::Result;

/// Client half of one negotiation
pub trait ClientContext: Send {
    /// Produce the next token
    ///
    /// `challenge` is `None` on the first step, otherwise the token from the
    /// server's last `WWW-Authenticate: Negotiate` header.
    fn step(&mut self, challenge: Option<&[u8]>) -> Result<Vec<u8>>;

    /// Check the server's final token for mutual authentication
    fn verify_final(&mut self, _token: &[u8]) -> Result<()> {
        Ok(())
    }
}

/// Client-side factory for negotiation contexts
pub trait Mechanism: Send + Sync {
    /// Mechanism name, for logging
    fn name(&self) -> &str;

    /// Start a new negotiation against the given service principal
    fn new_context(&self, spn: &str) -> Result<Box<dyn ClientContext>>;
}

/// Result of feeding one client token to the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// Another round is needed; send this token back as the challenge
    Continue(Vec<u8>),
    /// Negotiation finished
    Complete {
        /// Authenticated principal
        principal: String,
        /// Optional final token for mutual authentication
        output: Option<Vec<u8>>,
    },
    /// The token was not acceptable
    Rejected,
}

/// Server half of a mechanism
///
/// Must not keep per-handshake state between requests: everything needed to
/// continue a negotiation has to travel in the tokens themselves.
pub trait Acceptor: Send + Sync {
    /// Consume one client token
    fn accept(&self, input: &[u8]) -> AcceptOutcome;
}
