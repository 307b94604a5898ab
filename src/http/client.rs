//! Authenticated HTTP client
//!
//! Wraps a reqwest client, an [`Authenticator`] and a
//! [`ConnectionConfigurator`]. Opening a URL negotiates only when the
//! caller's token is unset or expired; otherwise the token is attached as
//! is and the handshake is skipped entirely.

use super::configurator::{ConnectionConfigurator, NoopConfigurator, TimeoutConfigurator};
use crate::auth::{extract_token, Authenticator};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::token::Token;
use crate::types::AUTH_COOKIE;
use reqwest::header::{HeaderValue, COOKIE};
use reqwest::{Client, Method, RequestBuilder, Response};
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Client that drives negotiation and attaches session tokens
///
/// `open` takes the token by `&mut` and may overwrite it after a successful
/// handshake. The client holds no lock: callers sharing one token across
/// tasks (e.g. behind a `tokio::sync::Mutex`) decide whether concurrent
/// opens may negotiate twice.
#[derive(Clone)]
pub struct AuthenticatedClient {
    client: Client,
    authenticator: Arc<dyn Authenticator>,
    configurator: Arc<dyn ConnectionConfigurator>,
}

impl AuthenticatedClient {
    /// Create a client with no connection customization
    pub fn new(authenticator: impl Authenticator + 'static) -> Self {
        Self {
            client: Client::new(),
            authenticator: Arc::new(authenticator),
            configurator: Arc::new(NoopConfigurator),
        }
    }

    /// Build a client from configuration
    ///
    /// The configured timeout is applied through a [`TimeoutConfigurator`].
    pub fn from_config(
        config: &ClientConfig,
        authenticator: impl Authenticator + 'static,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .build()
            .map_err(Error::Transport)?;

        Ok(Self {
            client,
            authenticator: Arc::new(authenticator),
            configurator: Arc::new(TimeoutConfigurator::new(config.timeout())),
        })
    }

    /// Replace the connection configurator
    #[must_use]
    pub fn with_configurator(mut self, configurator: impl ConnectionConfigurator + 'static) -> Self {
        self.configurator = Arc::new(configurator);
        self
    }

    /// Use an existing reqwest client
    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Get the underlying reqwest client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Open an authenticated connection to `url`
    ///
    /// 1. A set, unexpired token is reused without contacting the
    ///    authenticator.
    /// 2. Otherwise the authenticator runs and, on success, overwrites the
    ///    token in place. On failure the token is left as it was.
    pub async fn open(&self, url: &Url, token: &mut Token) -> Result<Connection> {
        if token.is_set() && !token.is_expired() {
            debug!(%url, "reusing session token");
        } else {
            debug!(%url, scheme = %self.authenticator.scheme(), "negotiating session");
            self.authenticator
                .authenticate(&self.client, url, token, self.configurator.as_ref())
                .await?;
        }

        let value = token.serialize()?;
        let cookie = HeaderValue::from_str(&format!("{AUTH_COOKIE}={value}"))
            .map_err(|_| Error::malformed("token is not a valid header value"))?;

        Ok(Connection {
            client: self.client.clone(),
            url: url.clone(),
            cookie,
            configurator: self.configurator.clone(),
        })
    }

    /// Adopt a refreshed token from a payload response
    ///
    /// See [`extract_token`]: non-200 responses are an error and leave the
    /// token untouched.
    pub fn refresh_token(response: &Response, token: &mut Token) -> Result<()> {
        extract_token(response, token)
    }
}

impl std::fmt::Debug for AuthenticatedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedClient")
            .field("scheme", &self.authenticator.scheme())
            .finish_non_exhaustive()
    }
}

/// A ready-to-use, authenticated connection to one URL
///
/// Each request built from it carries the session cookie and has been
/// through the configurator once. Issuing the request and reading the
/// response is up to the caller.
#[derive(Clone)]
pub struct Connection {
    client: Client,
    url: Url,
    cookie: HeaderValue,
    configurator: Arc<dyn ConnectionConfigurator>,
}

impl Connection {
    /// Target URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Build a request with the given method
    pub fn request(&self, method: Method) -> RequestBuilder {
        let request = self
            .client
            .request(method, self.url.clone())
            .header(COOKIE, self.cookie.clone());
        self.configurator.configure(request)
    }

    /// Build a GET request
    pub fn get(&self) -> RequestBuilder {
        self.request(Method::GET)
    }

    /// Build a POST request
    pub fn post(&self) -> RequestBuilder {
        self.request(Method::POST)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}
