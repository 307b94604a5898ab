//! Credential-based authenticators
//!
//! Both send a pre-known credential on the first request: a single round
//! trip that either yields a session cookie or fails.

use super::authenticator::{adopt_session, handshake_request, send, Authenticator};
use crate::error::{Error, Result};
use crate::http::ConnectionConfigurator;
use crate::token::Token;
use crate::types::{AuthScheme, USER_NAME_PARAM};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::fmt;
use url::Url;

async fn single_round(request: RequestBuilder, token: &mut Token) -> Result<()> {
    let response: Response = send(request).await?;
    match response.status() {
        StatusCode::OK => adopt_session(&response, token),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(Error::auth("credentials rejected"))
        }
        status => Err(Error::auth(format!("unexpected status {status}"))),
    }
}

/// HTTP Basic credentials
#[derive(Clone)]
pub struct BasicAuthenticator {
    username: String,
    password: String,
}

impl BasicAuthenticator {
    /// Create an authenticator for the given user
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for BasicAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuthenticator")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Authenticator for BasicAuthenticator {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::Basic
    }

    async fn authenticate(
        &self,
        client: &Client,
        url: &Url,
        token: &mut Token,
        configurator: &dyn ConnectionConfigurator,
    ) -> Result<()> {
        let request = handshake_request(client, url, configurator)
            .basic_auth(&self.username, Some(&self.password));
        single_round(request, token).await
    }
}

/// Trusted user name passed as the `user.name` query parameter
#[derive(Debug, Clone)]
pub struct PseudoAuthenticator {
    user: String,
}

impl PseudoAuthenticator {
    /// Create an authenticator claiming to be `user`
    pub fn new(user: impl Into<String>) -> Self {
        Self { user: user.into() }
    }
}

#[async_trait]
impl Authenticator for PseudoAuthenticator {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::Pseudo
    }

    async fn authenticate(
        &self,
        client: &Client,
        url: &Url,
        token: &mut Token,
        configurator: &dyn ConnectionConfigurator,
    ) -> Result<()> {
        let mut url = url.clone();
        url.query_pairs_mut().append_pair(USER_NAME_PARAM, &self.user);
        single_round(handshake_request(client, &url, configurator), token).await
    }
}
