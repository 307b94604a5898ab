//! CLI runner - executes commands

use crate::auth::{BasicAuthenticator, NegotiateAuthenticator, PseudoAuthenticator, SharedKeyMechanism};
use crate::cli::commands::{AuthArgs, Cli, Commands};
use crate::config::{load_config, AppConfig, ClientConfig};
use crate::error::{Error, Result};
use crate::http::AuthenticatedClient;
use crate::token::Token;
use crate::types::AuthScheme;
use reqwest::{Method, StatusCode};
use std::fs;
use std::path::Path;
use url::Url;

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        let config = self.load_config()?;

        match &self.cli.command {
            Commands::Serve { port } => {
                let validator = config.server.build_validator()?;
                crate::cli::serve(validator, *port).await
            }
            Commands::Get { url, auth } => {
                self.fetch(&config.client, Method::GET, url, None, auth)
                    .await
            }
            Commands::Post { url, data, auth } => {
                self.fetch(&config.client, Method::POST, url, Some(data), auth)
                    .await
            }
        }
    }

    /// Load the config file, or defaults when none was given
    fn load_config(&self) -> Result<AppConfig> {
        match &self.cli.config {
            Some(path) => load_config(path),
            None => Ok(AppConfig::default()),
        }
    }

    /// Open an authenticated connection, send one request and print the body
    ///
    /// A reused token that the server answers with 401 is discarded and the
    /// request retried once with a fresh handshake.
    async fn fetch(
        &self,
        config: &ClientConfig,
        method: Method,
        url: &str,
        body: Option<&str>,
        auth: &AuthArgs,
    ) -> Result<()> {
        let url = Url::parse(url)?;
        let client = build_client(config, auth)?;
        let mut token = match &auth.token_file {
            Some(path) => read_token(path),
            None => Token::new(),
        };

        let mut retried = false;
        let response = loop {
            let reused = token.is_set() && !token.is_expired();
            let connection = client.open(&url, &mut token).await?;

            let mut request = connection.request(method.clone());
            if let Some(body) = body {
                request = request.body(body.to_string());
            }
            let response = request.send().await?;

            if response.status() == StatusCode::UNAUTHORIZED && reused && !retried {
                tracing::info!("Session token refused, renegotiating");
                token.clear();
                retried = true;
                continue;
            }
            break response;
        };

        let status = response.status();
        if status == StatusCode::OK {
            AuthenticatedClient::refresh_token(&response, &mut token)?;
        }
        if let Some(path) = &auth.token_file {
            write_token(path, &token)?;
        }

        tracing::info!(%status, "{} {}", method, url);
        let text = response.text().await?;
        println!("{text}");

        if status.is_success() {
            Ok(())
        } else {
            Err(Error::Other(format!("Server responded with {status}")))
        }
    }
}

fn build_client(config: &ClientConfig, auth: &AuthArgs) -> Result<AuthenticatedClient> {
    let user = || {
        auth.user
            .clone()
            .ok_or_else(|| Error::config("--user is required for this scheme"))
    };

    match AuthScheme::from(auth.scheme) {
        AuthScheme::Negotiate => {
            let key = auth
                .key
                .as_ref()
                .ok_or_else(|| Error::config("--key is required for negotiate"))?;
            let mechanism = SharedKeyMechanism::new(user()?, key)?;
            let authenticator =
                NegotiateAuthenticator::new(mechanism).with_max_rounds(config.max_rounds);
            AuthenticatedClient::from_config(config, authenticator)
        }
        AuthScheme::Basic => {
            let password = auth
                .password
                .clone()
                .ok_or_else(|| Error::config("--password is required for basic"))?;
            AuthenticatedClient::from_config(config, BasicAuthenticator::new(user()?, password))
        }
        AuthScheme::Pseudo => {
            AuthenticatedClient::from_config(config, PseudoAuthenticator::new(user()?))
        }
    }
}

/// Read a persisted token; a missing or unreadable file starts unset
fn read_token(path: &Path) -> Token {
    let Ok(content) = fs::read_to_string(path) else {
        return Token::new();
    };
    let content = content.trim();
    if content.is_empty() {
        return Token::new();
    }

    match Token::parse(content) {
        Ok(token) => token,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring malformed token file");
            Token::new()
        }
    }
}

/// Persist a token, or remove the file when the token is unset
fn write_token(path: &Path, token: &Token) -> Result<()> {
    if !token.is_set() {
        if path.exists() {
            fs::remove_file(path)?;
        }
        return Ok(());
    }
    fs::write(path, token.serialize()?)?;
    Ok(())
}
