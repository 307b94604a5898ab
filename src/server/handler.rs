//! Per-scheme server handlers
//!
//! A handler runs only when the request carries no valid session token. It
//! inspects the request credentials and decides whether to admit, challenge
//! or reject.

use crate::auth::{AcceptOutcome, Acceptor};
use crate::error::{Error, Result};
use crate::types::{AuthScheme, BASIC, NEGOTIATE, PSEUDO_AUTH, USER_NAME_PARAM};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderValue;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ring::hmac;
use ring::rand::SystemRandom;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Result of running a scheme handler against a request
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    /// Handshake complete
    Authenticated {
        principal: String,
        /// Final `WWW-Authenticate` value for mutual authentication
        response_header: Option<HeaderValue>,
    },
    /// Send 401 with this `WWW-Authenticate` value
    Challenge(HeaderValue),
    /// Handshake failed; terminal for this request
    Rejected,
}

/// Server half of one negotiation scheme
pub trait AuthHandler: Send + Sync {
    /// Scheme this handler implements
    fn scheme(&self) -> AuthScheme;

    /// Inspect the request credentials
    fn authenticate(&self, parts: &Parts) -> HandlerOutcome;
}

/// Credentials following `scheme` in the `Authorization` header
fn authorization<'a>(parts: &'a Parts, scheme: &str) -> Option<&'a str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (name, rest) = value.split_once(' ').unwrap_or((value, ""));
    name.eq_ignore_ascii_case(scheme).then(|| rest.trim())
}

// ============================================================================
// Negotiate
// ============================================================================

/// Challenge negotiation backed by an [`Acceptor`]
pub struct NegotiateHandler {
    acceptor: Box<dyn Acceptor>,
}

impl NegotiateHandler {
    pub fn new(acceptor: impl Acceptor + 'static) -> Self {
        Self {
            acceptor: Box::new(acceptor),
        }
    }
}

impl fmt::Debug for NegotiateHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NegotiateHandler").finish_non_exhaustive()
    }
}

fn negotiate_header(token: &[u8]) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!("{NEGOTIATE} {}", STANDARD.encode(token))).ok()
}

impl AuthHandler for NegotiateHandler {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::Negotiate
    }

    fn authenticate(&self, parts: &Parts) -> HandlerOutcome {
        let Some(credentials) = authorization(parts, NEGOTIATE).filter(|c| !c.is_empty()) else {
            return HandlerOutcome::Challenge(HeaderValue::from_static(NEGOTIATE));
        };

        let Ok(input) = STANDARD.decode(credentials) else {
            debug!("negotiate token is not valid base64");
            return HandlerOutcome::Rejected;
        };

        match self.acceptor.accept(&input) {
            AcceptOutcome::Continue(output) => match negotiate_header(&output) {
                Some(header) => HandlerOutcome::Challenge(header),
                None => HandlerOutcome::Rejected,
            },
            AcceptOutcome::Complete { principal, output } => HandlerOutcome::Authenticated {
                principal,
                response_header: output.as_deref().and_then(negotiate_header),
            },
            AcceptOutcome::Rejected => HandlerOutcome::Rejected,
        }
    }
}

// ============================================================================
// Basic
// ============================================================================

/// Username/password table checked in a single round trip
///
/// Passwords are held as HMAC tags under a per-process random key so the
/// comparison runs in constant time.
pub struct BasicHandler {
    realm: String,
    key: hmac::Key,
    users: HashMap<String, hmac::Tag>,
}

impl BasicHandler {
    pub fn new(realm: impl Into<String>) -> Result<Self> {
        let key = hmac::Key::generate(hmac::HMAC_SHA256, &SystemRandom::new())
            .map_err(|_| Error::config("Failed to generate password key"))?;
        Ok(Self {
            realm: realm.into(),
            key,
            users: HashMap::new(),
        })
    }

    /// Register a user
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>, password: impl AsRef<[u8]>) -> Self {
        let tag = hmac::sign(&self.key, password.as_ref());
        self.users.insert(user.into(), tag);
        self
    }

    fn challenge(&self) -> HandlerOutcome {
        let value = format!("{BASIC} realm=\"{}\"", self.realm);
        HandlerOutcome::Challenge(
            HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static(BASIC)),
        )
    }

    fn check(&self, user: &str, password: &str) -> bool {
        match self.users.get(user) {
            Some(tag) => hmac::verify(&self.key, password.as_bytes(), tag.as_ref()).is_ok(),
            None => false,
        }
    }
}

impl fmt::Debug for BasicHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicHandler")
            .field("realm", &self.realm)
            .field("users", &self.users.len())
            .finish_non_exhaustive()
    }
}

impl AuthHandler for BasicHandler {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::Basic
    }

    fn authenticate(&self, parts: &Parts) -> HandlerOutcome {
        let Some(credentials) = authorization(parts, BASIC) else {
            return self.challenge();
        };

        let decoded = STANDARD
            .decode(credentials)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok());
        let Some((user, password)) = decoded.as_deref().and_then(|d| d.split_once(':')) else {
            debug!("malformed basic credentials");
            return HandlerOutcome::Rejected;
        };

        if self.check(user, password) {
            HandlerOutcome::Authenticated {
                principal: user.to_string(),
                response_header: None,
            }
        } else {
            HandlerOutcome::Rejected
        }
    }
}

// ============================================================================
// Pseudo
// ============================================================================

/// Trusts the `user.name` query parameter
#[derive(Debug, Clone, Default)]
pub struct PseudoHandler {
    allow_anonymous: bool,
}

/// Principal used for anonymous pseudo requests
pub const ANONYMOUS: &str = "anonymous";

impl PseudoHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit requests without `user.name` as [`ANONYMOUS`]
    #[must_use]
    pub fn allow_anonymous(mut self, allow: bool) -> Self {
        self.allow_anonymous = allow;
        self
    }
}

fn user_name(parts: &Parts) -> Option<String> {
    let query = parts.uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(name, _)| name == USER_NAME_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

impl AuthHandler for PseudoHandler {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::Pseudo
    }

    fn authenticate(&self, parts: &Parts) -> HandlerOutcome {
        match user_name(parts) {
            Some(principal) => HandlerOutcome::Authenticated {
                principal,
                response_header: None,
            },
            None if self.allow_anonymous => HandlerOutcome::Authenticated {
                principal: ANONYMOUS.to_string(),
                response_header: None,
            },
            None => HandlerOutcome::Challenge(HeaderValue::from_static(PSEUDO_AUTH)),
        }
    }
}
