//! Configuration types for the server and client
//!
//! Loaded from YAML. Every field has a default, so an empty document is a
//! valid configuration.

use crate::auth::SharedKeyAcceptor;
use crate::error::{Error, Result};
use crate::server::{BasicHandler, NegotiateHandler, PseudoHandler, ServerValidator, ValidatorConfig};
use crate::token::{Signer, MIN_SECRET_LEN};
use crate::types::{AuthScheme, DEFAULT_MAX_ROUNDS};
use chrono::Utc;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Environment variable that overrides the configured signing secret
pub const SECRET_ENV: &str = "AUTHTOKEN_SECRET";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Complete configuration loaded from YAML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server-side validator settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Client settings
    #[serde(default)]
    pub client: ClientConfig,
}

// ============================================================================
// Server
// ============================================================================

/// Server-side validator settings
#[derive(Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Token signing secret, at least 32 bytes
    ///
    /// When neither this nor `AUTHTOKEN_SECRET` is set a random secret is
    /// generated at startup, and tokens do not survive a restart.
    #[serde(default)]
    pub secret: Option<String>,

    /// Authentication scheme the server demands
    #[serde(default)]
    pub scheme: AuthScheme,

    /// Lifetime of issued tokens in seconds
    #[serde(default = "default_token_validity")]
    pub token_validity_secs: u64,

    /// Re-issue tokens with less than this many seconds left
    #[serde(default)]
    pub refresh_window_secs: Option<u64>,

    /// Cookie path
    #[serde(default = "default_cookie_path")]
    pub cookie_path: String,

    /// Cookie domain
    #[serde(default)]
    pub cookie_domain: Option<String>,

    /// Mark the cookie `Secure`
    #[serde(default)]
    pub secure_cookie: bool,

    /// Lifetime of a negotiate challenge in seconds
    #[serde(default = "default_challenge_ttl")]
    pub challenge_ttl_secs: u64,

    /// Realm advertised by the basic scheme
    #[serde(default = "default_realm")]
    pub realm: String,

    /// Admit requests without `user.name` under the pseudo scheme
    #[serde(default)]
    pub allow_anonymous: bool,

    /// Principal to shared key (negotiate) or password (basic)
    #[serde(default)]
    pub credentials: HashMap<String, String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            secret: None,
            scheme: AuthScheme::default(),
            token_validity_secs: default_token_validity(),
            refresh_window_secs: None,
            cookie_path: default_cookie_path(),
            cookie_domain: None,
            secure_cookie: false,
            challenge_ttl_secs: default_challenge_ttl(),
            realm: default_realm(),
            allow_anonymous: false,
            credentials: HashMap::new(),
        }
    }
}

impl std::fmt::Debug for ServerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSettings")
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("scheme", &self.scheme)
            .field("token_validity_secs", &self.token_validity_secs)
            .field("refresh_window_secs", &self.refresh_window_secs)
            .field("cookie_path", &self.cookie_path)
            .field("cookie_domain", &self.cookie_domain)
            .field("secure_cookie", &self.secure_cookie)
            .field("challenge_ttl_secs", &self.challenge_ttl_secs)
            .field("realm", &self.realm)
            .field("allow_anonymous", &self.allow_anonymous)
            .field("credentials", &self.credentials.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn default_token_validity() -> u64 {
    36_000
}

fn default_cookie_path() -> String {
    "/".to_string()
}

fn default_challenge_ttl() -> u64 {
    60
}

fn default_realm() -> String {
    "authtoken".to_string()
}

impl ServerSettings {
    /// Resolve the signing secret
    ///
    /// `AUTHTOKEN_SECRET` wins over the configured value.
    pub fn signing_secret(&self) -> Result<Vec<u8>> {
        self.resolve_secret(std::env::var(SECRET_ENV).ok())
    }

    fn resolve_secret(&self, env: Option<String>) -> Result<Vec<u8>> {
        if let Some(secret) = env.or_else(|| self.secret.clone()) {
            return Ok(secret.into_bytes());
        }

        tracing::warn!("No signing secret configured, generating a random one");
        let mut secret = vec![0u8; MIN_SECRET_LEN];
        SystemRandom::new()
            .fill(&mut secret)
            .map_err(|_| Error::config("Failed to generate signing secret"))?;
        Ok(secret)
    }

    /// Token and cookie settings for the validator
    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig {
            validity: Duration::from_secs(self.token_validity_secs),
            refresh_window: self.refresh_window_secs.map(Duration::from_secs),
            cookie_path: self.cookie_path.clone(),
            cookie_domain: self.cookie_domain.clone(),
            secure_cookie: self.secure_cookie,
        }
    }

    /// Build the validator for the configured scheme
    pub fn build_validator(&self) -> Result<ServerValidator> {
        let signer = Signer::new(&self.signing_secret()?)?;
        self.build_validator_with(signer)
    }

    /// Build the validator with an explicit signer
    pub fn build_validator_with(&self, signer: Signer) -> Result<ServerValidator> {
        let config = self.validator_config();

        let validator = match self.scheme {
            AuthScheme::Negotiate => {
                let acceptor = self.credentials.iter().fold(
                    SharedKeyAcceptor::new(signer.clone())
                        .with_challenge_ttl(Duration::from_secs(self.challenge_ttl_secs)),
                    |acceptor, (principal, key)| acceptor.with_key(principal, key),
                );
                ServerValidator::new(NegotiateHandler::new(acceptor), signer, config)
            }
            AuthScheme::Basic => {
                let handler = self.credentials.iter().fold(
                    BasicHandler::new(&self.realm)?,
                    |handler, (user, password)| handler.with_user(user, password),
                );
                ServerValidator::new(handler, signer, config)
            }
            AuthScheme::Pseudo => ServerValidator::new(
                PseudoHandler::new().allow_anonymous(self.allow_anonymous),
                signer,
                config,
            ),
        };

        Ok(validator)
    }
}

// ============================================================================
// Client
// ============================================================================

/// Client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum negotiate rounds before giving up
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,

    /// User-Agent header
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_rounds: default_max_rounds(),
            user_agent: default_user_agent(),
        }
    }
}

impl ClientConfig {
    /// Per-request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_max_rounds() -> usize {
    DEFAULT_MAX_ROUNDS
}

fn default_user_agent() -> String {
    format!("{}/{}", crate::NAME, crate::VERSION)
}

// ============================================================================
// Loading
// ============================================================================

/// Load configuration from a YAML file
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        Error::config(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;
    load_config_from_str(&content)
}

/// Parse configuration from a YAML string
pub fn load_config_from_str(yaml: &str) -> Result<AppConfig> {
    let config: AppConfig = if yaml.trim().is_empty() {
        AppConfig::default()
    } else {
        serde_yaml::from_str(yaml)?
    };

    if let Some(secret) = &config.server.secret {
        if secret.len() < MIN_SECRET_LEN {
            return Err(Error::config(format!(
                "server.secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
    }
    if config.client.max_rounds == 0 {
        return Err(Error::config("client.max_rounds must be at least 1"));
    }
    check_token_validity(config.server.token_validity_secs)?;

    Ok(config)
}

/// Tokens must outlive the handshake that issues them and stay within
/// chrono's representable range
fn check_token_validity(secs: u64) -> Result<()> {
    if secs == 0 {
        return Err(Error::config("server.token_validity_secs must be at least 1"));
    }

    let representable = i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|validity| Utc::now().checked_add_signed(validity))
        .is_some();
    if !representable {
        return Err(Error::config(format!(
            "server.token_validity_secs is out of range: {secs}"
        )));
    }
    Ok(())
}
