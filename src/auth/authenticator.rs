//! Authenticator trait and shared handshake plumbing

use crate::error::{Error, Result};
use crate::http::ConnectionConfigurator;
use crate::token::Token;
use crate::types::{AuthScheme, AUTH_COOKIE};
use async_trait::async_trait;
use cookie::Cookie;
use reqwest::header::{HeaderMap, SET_COOKIE};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use url::Url;

/// Performs a scheme-specific handshake and populates a [`Token`]
///
/// Implementations send every request through `configurator` exactly once,
/// and only touch `token` after the server has issued a session. A failed
/// handshake leaves the token as it was.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Scheme this authenticator speaks
    fn scheme(&self) -> AuthScheme;

    /// Run the handshake against `url`
    async fn authenticate(
        &self,
        client: &Client,
        url: &Url,
        token: &mut Token,
        configurator: &dyn ConnectionConfigurator,
    ) -> Result<()>;
}

/// Build a configured handshake request
///
/// Handshakes use `OPTIONS` so negotiation never triggers payload handling.
pub(crate) fn handshake_request(
    client: &Client,
    url: &Url,
    configurator: &dyn ConnectionConfigurator,
) -> RequestBuilder {
    configurator.configure(client.request(Method::OPTIONS, url.clone()))
}

/// Send a request, mapping connection failures to `Transport`
pub(crate) async fn send(request: RequestBuilder) -> Result<Response> {
    request.send().await.map_err(Error::Transport)
}

/// Session token value from `Set-Cookie` headers, if the server issued one
pub(crate) fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| Cookie::parse(value).ok())
        .find(|cookie| cookie.name() == AUTH_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

/// Finish a successful handshake by adopting the issued session token
pub(crate) fn adopt_session(response: &Response, token: &mut Token) -> Result<()> {
    let value = session_cookie(response.headers())
        .ok_or_else(|| Error::auth("server did not issue a session token"))?;
    token.set(&value)
}

/// Update `token` from a payload response
///
/// A 200 carrying a refreshed session cookie replaces the token. Any other
/// status is an `Authentication` error; the token is left untouched, so the
/// caller decides whether to [`clear`](Token::clear) it and renegotiate.
pub fn extract_token(response: &Response, token: &mut Token) -> Result<()> {
    let status = response.status();
    if status != StatusCode::OK {
        return Err(Error::auth(format!("unexpected status {status}")));
    }

    if let Some(value) = session_cookie(response.headers()) {
        token.set(&value)?;
    }
    Ok(())
}
