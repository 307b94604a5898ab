//! Shared-key challenge/response mechanism
//!
//! Three messages, each carried base64-encoded in a `Negotiate` header:
//!
//! ```text
//! client  init|<principal>
//! server  chal|<principal>|<nonce>|<expiry millis>|<sig>
//!           sig   = HMAC(server secret, "challenge:" || principal|nonce|expiry)
//! client  resp|<principal>|<nonce>|<expiry>|<sig>|<proof>
//!           proof = HMAC(principal key, principal|nonce|expiry|sig)
//! server  done|<mutual>
//!           mutual = HMAC(principal key, "server:" || principal|nonce|expiry|sig)
//! ```
//!
//! The challenge is signed and self-expiring, so the acceptor keeps no
//! state between rounds. A captured `resp` can be replayed until the
//! challenge expires; keep the challenge TTL short.

use super::mechanism::{AcceptOutcome, Acceptor, ClientContext, Mechanism};
use crate::error::{Error, Result};
use crate::token::{AuthToken, Signer};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use ring::{hmac, rand};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::debug;

const FIELD: char = '|';
const INIT: &str = "init";
const CHALLENGE: &str = "chal";
const RESPONSE: &str = "resp";
const DONE: &str = "done";
const CHALLENGE_LABEL: &str = "challenge:";
const SERVER_LABEL: &str = "server:";
const NONCE_LEN: usize = 16;

/// Default lifetime of an issued challenge
pub const DEFAULT_CHALLENGE_TTL: Duration = Duration::from_secs(60);

/// Principals must fit both the message framing and an issued token
fn check_principal(principal: &str) -> Result<()> {
    if principal.contains(FIELD) || AuthToken::check_principal(principal).is_err() {
        return Err(Error::config(format!("invalid principal name: {principal:?}")));
    }
    Ok(())
}

// ============================================================================
// Client
// ============================================================================

/// Client side: a principal and the key it shares with the server
#[derive(Clone)]
pub struct SharedKeyMechanism {
    principal: String,
    key: hmac::Key,
}

impl SharedKeyMechanism {
    /// Create a mechanism for `principal` holding `key`
    pub fn new(principal: impl Into<String>, key: impl AsRef<[u8]>) -> Result<Self> {
        let principal = principal.into();
        check_principal(&principal)?;
        if key.as_ref().is_empty() {
            return Err(Error::config("shared key is empty"));
        }
        Ok(Self {
            principal,
            key: hmac::Key::new(hmac::HMAC_SHA256, key.as_ref()),
        })
    }
}

impl fmt::Debug for SharedKeyMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedKeyMechanism")
            .field("principal", &self.principal)
            .finish_non_exhaustive()
    }
}

impl Mechanism for SharedKeyMechanism {
    fn name(&self) -> &str {
        "shared-key"
    }

    fn new_context(&self, spn: &str) -> Result<Box<dyn ClientContext>> {
        debug!(spn, principal = %self.principal, "starting shared-key negotiation");
        Ok(Box::new(SharedKeyContext {
            principal: self.principal.clone(),
            key: self.key.clone(),
            answered: None,
        }))
    }
}

struct SharedKeyContext {
    principal: String,
    key: hmac::Key,
    /// Challenge body we answered, kept for the mutual check
    answered: Option<String>,
}

impl ClientContext for SharedKeyContext {
    fn step(&mut self, challenge: Option<&[u8]>) -> Result<Vec<u8>> {
        let Some(challenge) = challenge else {
            return Ok(format!("{INIT}{FIELD}{}", self.principal).into_bytes());
        };

        let text = std::str::from_utf8(challenge)
            .map_err(|_| Error::auth("challenge is not valid UTF-8"))?;
        let body = text
            .strip_prefix(CHALLENGE)
            .and_then(|rest| rest.strip_prefix(FIELD))
            .ok_or_else(|| Error::auth("unexpected challenge message"))?;

        let principal = body.split(FIELD).next().unwrap_or_default();
        if principal != self.principal {
            return Err(Error::auth("challenge issued for a different principal"));
        }
        if body.split(FIELD).count() != 4 {
            return Err(Error::auth("challenge has wrong number of fields"));
        }

        let proof = hmac::sign(&self.key, body.as_bytes());
        self.answered = Some(body.to_string());

        Ok(format!(
            "{RESPONSE}{FIELD}{body}{FIELD}{}",
            URL_SAFE_NO_PAD.encode(proof.as_ref())
        )
        .into_bytes())
    }

    fn verify_final(&mut self, token: &[u8]) -> Result<()> {
        let body = self
            .answered
            .as_deref()
            .ok_or_else(|| Error::auth("final token before any challenge"))?;

        let mutual = std::str::from_utf8(token)
            .ok()
            .and_then(|t| t.strip_prefix(DONE))
            .and_then(|t| t.strip_prefix(FIELD))
            .and_then(|t| URL_SAFE_NO_PAD.decode(t).ok())
            .ok_or_else(|| Error::auth("malformed final token"))?;

        let message = format!("{SERVER_LABEL}{body}");
        hmac::verify(&self.key, message.as_bytes(), &mutual)
            .map_err(|_| Error::auth("server failed mutual authentication"))
    }
}

// ============================================================================
// Server
// ============================================================================

/// Server side: verifies proofs against a table of principal keys
pub struct SharedKeyAcceptor {
    signer: Signer,
    keys: HashMap<String, hmac::Key>,
    challenge_ttl: Duration,
    rng: rand::SystemRandom,
}

impl SharedKeyAcceptor {
    /// Create an acceptor that signs challenges with `signer`
    pub fn new(signer: Signer) -> Self {
        Self {
            signer,
            keys: HashMap::new(),
            challenge_ttl: DEFAULT_CHALLENGE_TTL,
            rng: rand::SystemRandom::new(),
        }
    }

    /// Register a principal's shared key
    #[must_use]
    pub fn with_key(mut self, principal: impl Into<String>, key: impl AsRef<[u8]>) -> Self {
        self.keys.insert(
            principal.into(),
            hmac::Key::new(hmac::HMAC_SHA256, key.as_ref()),
        );
        self
    }

    /// Set how long an issued challenge stays answerable
    #[must_use]
    pub fn with_challenge_ttl(mut self, ttl: Duration) -> Self {
        self.challenge_ttl = ttl;
        self
    }

    fn issue_challenge(&self, principal: &str) -> AcceptOutcome {
        if check_principal(principal).is_err() {
            return AcceptOutcome::Rejected;
        }

        let mut nonce = [0u8; NONCE_LEN];
        if rand::SecureRandom::fill(&self.rng, &mut nonce).is_err() {
            tracing::error!("system random source failed");
            return AcceptOutcome::Rejected;
        }

        let ttl_ms = i64::try_from(self.challenge_ttl.as_millis()).unwrap_or(i64::MAX);
        let expires = Utc::now().timestamp_millis().saturating_add(ttl_ms);
        let unsigned = format!(
            "{principal}{FIELD}{}{FIELD}{expires}",
            URL_SAFE_NO_PAD.encode(nonce)
        );
        let sig = self
            .signer
            .sign_bytes(format!("{CHALLENGE_LABEL}{unsigned}").as_bytes());

        // Unknown principals get a challenge too, so probing reveals nothing
        AcceptOutcome::Continue(
            format!(
                "{CHALLENGE}{FIELD}{unsigned}{FIELD}{}",
                URL_SAFE_NO_PAD.encode(sig)
            )
            .into_bytes(),
        )
    }

    fn verify_response(&self, rest: &str) -> AcceptOutcome {
        let Some((body, proof)) = rest.rsplit_once(FIELD) else {
            return AcceptOutcome::Rejected;
        };
        let Some((unsigned, sig)) = body.rsplit_once(FIELD) else {
            return AcceptOutcome::Rejected;
        };

        let Ok(sig) = URL_SAFE_NO_PAD.decode(sig) else {
            return AcceptOutcome::Rejected;
        };
        let signed_message = format!("{CHALLENGE_LABEL}{unsigned}");
        if !self.signer.verify_bytes(signed_message.as_bytes(), &sig) {
            debug!("challenge signature mismatch");
            return AcceptOutcome::Rejected;
        }

        let fields: Vec<&str> = unsigned.split(FIELD).collect();
        let [principal, _nonce, expires] = fields.as_slice() else {
            return AcceptOutcome::Rejected;
        };
        let Ok(expires) = expires.parse::<i64>() else {
            return AcceptOutcome::Rejected;
        };
        if Utc::now().timestamp_millis() >= expires {
            debug!(principal, "challenge expired");
            return AcceptOutcome::Rejected;
        }

        let Some(key) = self.keys.get(*principal) else {
            return AcceptOutcome::Rejected;
        };
        let Ok(proof) = URL_SAFE_NO_PAD.decode(proof) else {
            return AcceptOutcome::Rejected;
        };
        if hmac::verify(key, body.as_bytes(), &proof).is_err() {
            return AcceptOutcome::Rejected;
        }

        let mutual = hmac::sign(key, format!("{SERVER_LABEL}{body}").as_bytes());
        AcceptOutcome::Complete {
            principal: (*principal).to_string(),
            output: Some(
                format!("{DONE}{FIELD}{}", URL_SAFE_NO_PAD.encode(mutual.as_ref())).into_bytes(),
            ),
        }
    }
}

impl fmt::Debug for SharedKeyAcceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedKeyAcceptor")
            .field("principals", &self.keys.len())
            .field("challenge_ttl", &self.challenge_ttl)
            .finish_non_exhaustive()
    }
}

impl Acceptor for SharedKeyAcceptor {
    fn accept(&self, input: &[u8]) -> AcceptOutcome {
        let Ok(text) = std::str::from_utf8(input) else {
            return AcceptOutcome::Rejected;
        };

        match text.split_once(FIELD) {
            Some((INIT, principal)) => self.issue_challenge(principal),
            Some((RESPONSE, rest)) => self.verify_response(rest),
            _ => AcceptOutcome::Rejected,
        }
    }
}
