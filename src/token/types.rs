//! Token types
//!
//! `Token` is the client's opaque view of a session; `AuthToken` is the
//! server's structured view of the same string before it is signed.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::fmt;

/// Field separator in the serialized form
const SEPARATOR: char = '&';

/// Key/value separator inside a field
const ASSIGN: char = '=';

/// Borrowed view over the four ordered fields of a serialized token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawFields<'a> {
    pub principal: &'a str,
    pub scheme: &'a str,
    pub expires: DateTime<Utc>,
    pub signature: &'a str,
    /// The signed portion (`p=..&t=..&e=..`)
    pub payload: &'a str,
}

/// Split `p=<principal>&t=<scheme>&e=<millis>&s=<signature>` into its fields.
///
/// Any deviation from that exact shape, including reordered, repeated or
/// extra fields, is a `MalformedToken` error.
pub(crate) fn split_fields(s: &str) -> Result<RawFields<'_>> {
    let mut parts = s.split(SEPARATOR);

    let principal = take_field(parts.next(), "p")?;
    let scheme = take_field(parts.next(), "t")?;
    let expires = take_field(parts.next(), "e")?;
    let signature = take_field(parts.next(), "s")?;

    if parts.next().is_some() {
        return Err(Error::malformed("unexpected trailing field"));
    }

    let millis: i64 = expires
        .parse()
        .map_err(|_| Error::malformed(format!("expiry is not a timestamp: {expires}")))?;
    if millis < 0 {
        return Err(Error::malformed("expiry is negative"));
    }
    let expires = DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| Error::malformed("expiry out of range"))?;

    // "p=" + principal + "&t=" + scheme + "&e=" + expiry
    let payload_len = s.len() - signature.len() - "&s=".len();

    Ok(RawFields {
        principal,
        scheme,
        expires,
        signature,
        payload: &s[..payload_len],
    })
}

fn take_field<'a>(part: Option<&'a str>, key: &str) -> Result<&'a str> {
    let part = part.ok_or_else(|| Error::malformed(format!("missing field '{key}'")))?;

    let value = part
        .strip_prefix(key)
        .and_then(|rest| rest.strip_prefix(ASSIGN))
        .ok_or_else(|| Error::malformed(format!("expected field '{key}'")))?;

    if value.is_empty() {
        return Err(Error::malformed(format!("field '{key}' is empty")));
    }
    if !value.chars().all(is_value_char) {
        return Err(Error::malformed(format!(
            "field '{key}' contains a character outside cookie-octet"
        )));
    }

    Ok(value)
}

// ============================================================================
// Client Token
// ============================================================================

/// Caller-owned session token
///
/// Created unset. An [`Authenticator`](crate::auth::Authenticator) sets it
/// exactly once per negotiation; the client never resets it on its own.
/// Callers discard a stale token with [`Token::clear`].
///
/// The client treats the value as opaque: the signature is only meaningful
/// to the server that issued it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Token {
    value: Option<String>,
}

impl Token {
    /// Create an unset token
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff a negotiation has produced a value
    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    /// Serialized form of the token
    pub fn serialize(&self) -> Result<String> {
        self.value
            .clone()
            .ok_or_else(|| Error::invalid_state("token is not set"))
    }

    /// Parse a serialized token, checking its structure but not its signature
    pub fn parse(s: &str) -> Result<Self> {
        split_fields(s)?;
        Ok(Self {
            value: Some(s.to_string()),
        })
    }

    /// Replace the value with a freshly negotiated one
    pub fn set(&mut self, value: &str) -> Result<()> {
        *self = Self::parse(value)?;
        Ok(())
    }

    /// Explicitly discard the value
    pub fn clear(&mut self) {
        self.value = None;
    }

    /// Expiry carried in the token, if set
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let value = self.value.as_deref()?;
        split_fields(value).ok().map(|raw| raw.expires)
    }

    /// True when the token is set and its expiry has passed
    pub fn is_expired(&self) -> bool {
        self.expires_at().is_some_and(|expires| Utc::now() >= expires)
    }

}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value.as_deref().unwrap_or(""))
    }
}

// ============================================================================
// Server Token
// ============================================================================

/// Structured session issued by the server for an authenticated principal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    principal: String,
    scheme: String,
    expires: DateTime<Utc>,
}

impl AuthToken {
    /// Create a token; expiry is truncated to millisecond precision
    pub fn new(
        principal: impl Into<String>,
        scheme: impl Into<String>,
        expires: DateTime<Utc>,
    ) -> Result<Self> {
        let principal = principal.into();
        let scheme = scheme.into();
        check_value("principal", &principal)?;
        check_value("scheme", &scheme)?;

        Ok(Self {
            principal,
            scheme,
            expires: truncate_millis(expires)?,
        })
    }

    /// Check that `principal` can be carried in a token
    pub fn check_principal(principal: &str) -> Result<()> {
        check_value("principal", principal)
    }

    pub(crate) fn from_raw(raw: &RawFields<'_>) -> Result<Self> {
        Self::new(raw.principal, raw.scheme, raw.expires)
    }

    /// Authenticated principal name
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// Scheme that produced this token
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Expiry timestamp
    pub fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    /// Check expiry against a given instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires
    }

    /// Copy of this token with a new expiry
    pub fn with_expiry(&self, expires: DateTime<Utc>) -> Result<Self> {
        Self::new(self.principal.clone(), self.scheme.clone(), expires)
    }

    /// Unsigned payload (`p=..&t=..&e=..`)
    pub(crate) fn payload(&self) -> String {
        format!(
            "p={}&t={}&e={}",
            self.principal,
            self.scheme,
            self.expires.timestamp_millis()
        )
    }
}

fn check_value(name: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::malformed(format!("{name} is empty")));
    }
    if !value.chars().all(is_value_char) {
        return Err(Error::malformed(format!(
            "{name} must be cookie-octet characters other than '{SEPARATOR}' and '{ASSIGN}'"
        )));
    }
    Ok(())
}

/// RFC 6265 cookie-octet, minus the token's own separators
///
/// The serialized token travels unquoted as a cookie value, so anything
/// else (space, `"`, `,`, `;`, `\`, controls, non-ASCII) could not be read back.
fn is_value_char(c: char) -> bool {
    matches!(
        c,
        '\x21' | '\x23'..='\x2B' | '\x2D'..='\x3A' | '\x3C'..='\x5B' | '\x5D'..='\x7E'
    ) && c != SEPARATOR
        && c != ASSIGN
}

fn truncate_millis(at: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let millis = at.timestamp_millis();
    if millis < 0 {
        return Err(Error::malformed("expiry is negative"));
    }
    DateTime::from_timestamp_millis(millis).ok_or_else(|| Error::malformed("expiry out of range"))
}
