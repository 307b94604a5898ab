//! Common types used throughout authtoken
//!
//! Wire constants shared by the client and server halves, and the
//! scheme selector used by configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Wire Constants
// ============================================================================

/// Name of the cookie carrying the signed session token
pub const AUTH_COOKIE: &str = "authtoken";

/// `WWW-Authenticate` / `Authorization` scheme name for challenge negotiation
pub const NEGOTIATE: &str = "Negotiate";

/// `WWW-Authenticate` / `Authorization` scheme name for basic credentials
pub const BASIC: &str = "Basic";

/// `WWW-Authenticate` scheme name announced by the pseudo handler
pub const PSEUDO_AUTH: &str = "PseudoAuth";

/// Query parameter carrying the user name for pseudo authentication
pub const USER_NAME_PARAM: &str = "user.name";

/// Default bound on challenge/response rounds
pub const DEFAULT_MAX_ROUNDS: usize = 5;

// ============================================================================
// Scheme
// ============================================================================

/// Negotiation scheme
///
/// The lowercase name is embedded in every issued token, so a token minted
/// for one scheme is never accepted by a validator running another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    /// Multi-round challenge negotiation (`Negotiate`)
    #[default]
    Negotiate,
    /// Username/password in a single round trip (`Basic`)
    Basic,
    /// Trusted user name in the query string
    Pseudo,
}

impl AuthScheme {
    /// Token type string for this scheme
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthScheme::Negotiate => "negotiate",
            AuthScheme::Basic => "basic",
            AuthScheme::Pseudo => "pseudo",
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
