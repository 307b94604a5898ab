//! Per-request token validation and issuance
//!
//! Verification is a pure function of the request, the signing key and the
//! clock. No session state is kept between requests.

use super::handler::{AuthHandler, HandlerOutcome};
use crate::error::{Error, Result};
use crate::token::{AuthToken, Signer};
use crate::types::{AuthScheme, AUTH_COOKIE};
use axum::http::header::COOKIE;
use axum::http::request::Parts;
use axum::http::HeaderValue;
use chrono::{DateTime, Utc};
use cookie::Cookie;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Token lifetime and cookie attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorConfig {
    /// Lifetime of issued tokens
    pub validity: Duration,
    /// Re-issue admitted tokens with less than this much time left
    pub refresh_window: Option<Duration>,
    pub cookie_path: String,
    pub cookie_domain: Option<String>,
    pub secure_cookie: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            validity: Duration::from_secs(36_000),
            refresh_window: None,
            cookie_path: "/".to_string(),
            cookie_domain: None,
            secure_cookie: false,
        }
    }
}

/// What to do with a request
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Forward downstream as `token.principal()`
    Admit {
        token: AuthToken,
        /// `Set-Cookie` value when a token was issued or refreshed
        set_cookie: Option<HeaderValue>,
        /// Final `WWW-Authenticate` value from the handshake
        www_authenticate: Option<HeaderValue>,
        /// True when this request completed a handshake
        issued: bool,
    },
    /// Respond 401 with this `WWW-Authenticate` value
    Challenge(HeaderValue),
    /// Respond 403
    Reject,
}

/// Validates session tokens and falls back to a scheme handler
#[derive(Clone)]
pub struct ServerValidator {
    handler: Arc<dyn AuthHandler>,
    signer: Signer,
    config: ValidatorConfig,
}

impl ServerValidator {
    pub fn new(handler: impl AuthHandler + 'static, signer: Signer, config: ValidatorConfig) -> Self {
        Self {
            handler: Arc::new(handler),
            signer,
            config,
        }
    }

    /// Scheme demanded by this validator
    pub fn scheme(&self) -> AuthScheme {
        self.handler.scheme()
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate a request against the current time
    pub fn validate(&self, parts: &Parts) -> Decision {
        self.validate_at(parts, Utc::now())
    }

    /// Validate a request as of `now`
    ///
    /// 1. A cookie token that verifies, names this scheme and has not expired
    ///    admits the request without running the handler.
    /// 2. Anything else, including a tampered or expired token, is treated as
    ///    no token and the handler decides.
    pub fn validate_at(&self, parts: &Parts, now: DateTime<Utc>) -> Decision {
        if let Some(token) = self.session_token(parts, now) {
            let set_cookie = self.refresh(&token, now);
            let token = match &set_cookie {
                Some((refreshed, _)) => refreshed.clone(),
                None => token,
            };
            return Decision::Admit {
                token,
                set_cookie: set_cookie.map(|(_, header)| header),
                www_authenticate: None,
                issued: false,
            };
        }

        match self.handler.authenticate(parts) {
            HandlerOutcome::Authenticated {
                principal,
                response_header,
            } => match self.issue(&principal, now) {
                Ok((token, header)) => {
                    debug!(principal = %token.principal(), scheme = %self.scheme(), "issued session token");
                    Decision::Admit {
                        token,
                        set_cookie: Some(header),
                        www_authenticate: response_header,
                        issued: true,
                    }
                }
                Err(e) => {
                    warn!(error = %e, "cannot issue token for authenticated principal");
                    Decision::Reject
                }
            },
            HandlerOutcome::Challenge(header) => Decision::Challenge(header),
            HandlerOutcome::Rejected => {
                warn!(scheme = %self.scheme(), path = %parts.uri.path(), "handshake rejected");
                Decision::Reject
            }
        }
    }

    /// Sign a fresh token for `principal` and build its `Set-Cookie` value
    pub fn issue(&self, principal: &str, now: DateTime<Utc>) -> Result<(AuthToken, HeaderValue)> {
        let expires = chrono::Duration::from_std(self.config.validity)
            .ok()
            .and_then(|validity| now.checked_add_signed(validity))
            .ok_or_else(|| Error::config("token validity out of range"))?;
        let token = AuthToken::new(principal, self.scheme().as_str(), expires)?;
        let header = self.set_cookie(&self.signer.sign(&token))?;
        Ok((token, header))
    }

    fn refresh(&self, token: &AuthToken, now: DateTime<Utc>) -> Option<(AuthToken, HeaderValue)> {
        let window = chrono::Duration::from_std(self.config.refresh_window?).ok()?;
        if token.expires() - now > window {
            return None;
        }
        match self.issue(token.principal(), now) {
            Ok(refreshed) => {
                debug!(principal = %token.principal(), "refreshed session token");
                Some(refreshed)
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                None
            }
        }
    }

    fn session_token(&self, parts: &Parts, now: DateTime<Utc>) -> Option<AuthToken> {
        let value = parts
            .headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|header| header.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(|cookie| cookie.ok())
            .find(|cookie| cookie.name() == AUTH_COOKIE)?
            .value()
            .to_string();

        // Failure reasons stay at debug level and never reach the client
        let token = match self.signer.verify(&value) {
            Ok(token) => token,
            Err(e) => {
                debug!(error = %e, "ignoring invalid session token");
                return None;
            }
        };
        if token.scheme() != self.scheme().as_str() {
            debug!(scheme = %token.scheme(), "ignoring token for another scheme");
            return None;
        }
        if token.is_expired_at(now) {
            debug!(principal = %token.principal(), "ignoring expired session token");
            return None;
        }
        Some(token)
    }

    fn set_cookie(&self, signed: &str) -> Result<HeaderValue> {
        let max_age = i64::try_from(self.config.validity.as_secs()).unwrap_or(i64::MAX);
        let mut cookie = Cookie::build((AUTH_COOKIE, signed.to_string()))
            .path(self.config.cookie_path.clone())
            .http_only(true)
            .secure(self.config.secure_cookie)
            .max_age(cookie::time::Duration::seconds(max_age));
        if let Some(domain) = &self.config.cookie_domain {
            cookie = cookie.domain(domain.clone());
        }

        HeaderValue::from_str(&cookie.build().to_string())
            .map_err(|_| Error::malformed("token is not a valid header value"))
    }
}

impl std::fmt::Debug for ServerValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerValidator")
            .field("scheme", &self.scheme())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
