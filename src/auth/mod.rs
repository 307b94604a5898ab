//! Authentication module
//!
//! Supports: Negotiate (multi-round challenge/response), Basic, Pseudo
//!
//! Each scheme is an [`Authenticator`]. The negotiate scheme delegates the
//! token exchange itself to a pluggable [`Mechanism`]/[`Acceptor`] pair;
//! [`SharedKeyMechanism`] and [`SharedKeyAcceptor`] are the built-in one.

mod authenticator;
mod credential;
mod mechanism;
mod negotiate;
mod shared_key;

pub use authenticator::{extract_token, Authenticator};
pub use credential::{BasicAuthenticator, PseudoAuthenticator};
pub use mechanism::{AcceptOutcome, Acceptor, ClientContext, Mechanism};
pub use negotiate::{derive_spn, parse_challenge, Challenge, NegotiateAuthenticator};
pub use shared_key::{SharedKeyAcceptor, SharedKeyMechanism, DEFAULT_CHALLENGE_TTL};
