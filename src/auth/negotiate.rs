//! HTTP Negotiate challenge/response authenticator
//!
//! Implements the `Negotiate` exchange of RFC 4559 on top of a pluggable
//! [`Mechanism`]:
//!
//! 1. Send an OPTIONS request without credentials
//! 2. Expect `401` with `WWW-Authenticate: Negotiate[ <token>]`
//! 3. Answer with `Authorization: Negotiate <token>` until the server
//!    returns 200 with a session cookie, or the round limit is hit

use super::authenticator::{adopt_session, handshake_request, send, Authenticator};
use super::mechanism::Mechanism;
use crate::error::{Error, Result};
use crate::http::ConnectionConfigurator;
use crate::token::Token;
use crate::types::{AuthScheme, DEFAULT_MAX_ROUNDS, NEGOTIATE};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Challenge found in a `WWW-Authenticate` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    /// Scheme offered with no token (`Negotiate`)
    Bare,
    /// Scheme offered with a decoded token (`Negotiate <b64>`)
    Token(Vec<u8>),
}

impl Challenge {
    fn into_token(self) -> Option<Vec<u8>> {
        match self {
            Challenge::Bare => None,
            Challenge::Token(token) => Some(token),
        }
    }
}

/// Derive the Service Principal Name (SPN) from a URL.
///
/// For HTTP authentication, the SPN format is "HTTP/<hostname>".
pub fn derive_spn(url: &Url) -> Result<String> {
    let host = url
        .host_str()
        .ok_or_else(|| Error::auth("URL has no host for SPN"))?;

    Ok(format!("HTTP/{host}"))
}

/// Find the challenge for `scheme` among the `WWW-Authenticate` headers.
///
/// Returns `Ok(None)` if the scheme is not offered, and an `Authentication`
/// error if it is offered with a token that is not valid base64.
pub fn parse_challenge(headers: &HeaderMap, scheme: &str) -> Result<Option<Challenge>> {
    for value in headers.get_all(WWW_AUTHENTICATE) {
        let Ok(value) = value.to_str() else {
            continue;
        };
        let trimmed = value.trim();

        if trimmed.eq_ignore_ascii_case(scheme) {
            return Ok(Some(Challenge::Bare));
        }

        let Some((name, token)) = trimmed.split_once(' ') else {
            continue;
        };
        if name.eq_ignore_ascii_case(scheme) {
            let decoded = STANDARD
                .decode(token.trim())
                .map_err(|_| Error::auth(format!("malformed {scheme} challenge")))?;
            return Ok(Some(Challenge::Token(decoded)));
        }
    }

    Ok(None)
}

/// Multi-round `Negotiate` authenticator
#[derive(Clone)]
pub struct NegotiateAuthenticator {
    mechanism: Arc<dyn Mechanism>,
    max_rounds: usize,
}

impl NegotiateAuthenticator {
    /// Create an authenticator driving `mechanism`
    pub fn new(mechanism: impl Mechanism + 'static) -> Self {
        Self {
            mechanism: Arc::new(mechanism),
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    /// Bound the number of `Authorization: Negotiate` requests
    #[must_use]
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Configured round limit
    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }
}

impl std::fmt::Debug for NegotiateAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NegotiateAuthenticator")
            .field("mechanism", &self.mechanism.name())
            .field("max_rounds", &self.max_rounds)
            .finish()
    }
}

#[async_trait]
impl Authenticator for NegotiateAuthenticator {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::Negotiate
    }

    async fn authenticate(
        &self,
        client: &Client,
        url: &Url,
        token: &mut Token,
        configurator: &dyn ConnectionConfigurator,
    ) -> Result<()> {
        let spn = derive_spn(url)?;

        // First request carries no credentials
        let response = send(handshake_request(client, url, configurator)).await?;
        let mut challenge = match response.status() {
            StatusCode::OK => {
                debug!(%url, "server issued a session without negotiation");
                return adopt_session(&response, token);
            }
            StatusCode::UNAUTHORIZED => parse_challenge(response.headers(), NEGOTIATE)?
                .ok_or_else(|| Error::auth("server did not offer Negotiate"))?
                .into_token(),
            status => {
                return Err(Error::auth(format!(
                    "unexpected status {status} on initial handshake request"
                )))
            }
        };

        let mut context = self.mechanism.new_context(&spn)?;

        for round in 1..=self.max_rounds {
            let output = context.step(challenge.as_deref())?;
            debug!(round, spn = %spn, mechanism = self.mechanism.name(), "sending Negotiate token");

            let header = HeaderValue::from_str(&format!("{NEGOTIATE} {}", STANDARD.encode(output)))
                .map_err(|_| Error::auth("invalid authorization header"))?;
            let request = handshake_request(client, url, configurator).header(AUTHORIZATION, header);
            let response = send(request).await?;

            match response.status() {
                StatusCode::OK => {
                    if let Some(Challenge::Token(final_token)) =
                        parse_challenge(response.headers(), NEGOTIATE)?
                    {
                        context.verify_final(&final_token)?;
                    }
                    debug!(round, "negotiation complete");
                    return adopt_session(&response, token);
                }
                StatusCode::UNAUTHORIZED => match parse_challenge(response.headers(), NEGOTIATE)? {
                    Some(Challenge::Token(next)) => challenge = Some(next),
                    _ => {
                        return Err(Error::auth(
                            "server returned 401 without new challenge token",
                        ))
                    }
                },
                status => {
                    return Err(Error::auth(format!(
                        "handshake rejected with status {status}"
                    )))
                }
            }
        }

        Err(Error::auth(format!(
            "too many authentication round-trips ({})",
            self.max_rounds
        )))
    }
}
