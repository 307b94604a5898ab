//! Integration tests against a live server
//!
//! Tests the full end-to-end flow: client handshake → signed cookie → token
//! reuse, with the echo router bound to a local port.

use async_trait::async_trait;
use authtoken::auth::{
    Authenticator, BasicAuthenticator, NegotiateAuthenticator, PseudoAuthenticator,
    SharedKeyAcceptor, SharedKeyMechanism,
};
use authtoken::http::{AuthenticatedClient, ConnectionConfigurator};
use authtoken::server::{
    serve_listener, BasicHandler, NegotiateHandler, PseudoHandler, ServerValidator,
    ValidatorConfig,
};
use authtoken::token::{AuthToken, Signer, Token};
use authtoken::{AuthScheme, Error};
use chrono::{Duration, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use url::Url;

const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

// ============================================================================
// Helpers
// ============================================================================

fn signer() -> Signer {
    Signer::new(SECRET).unwrap()
}

fn negotiate_validator(config: ValidatorConfig) -> ServerValidator {
    let acceptor = SharedKeyAcceptor::new(signer()).with_key("alice", b"alice-key");
    ServerValidator::new(NegotiateHandler::new(acceptor), signer(), config)
}

/// Bind the echo router on an ephemeral port and return the protected URL
async fn start(validator: ServerValidator) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve_listener(listener, validator));
    Url::parse(&format!("http://{addr}/foo/bar")).unwrap()
}

/// Counts handshakes run by the wrapped authenticator
struct Counting<A> {
    inner: A,
    calls: Arc<AtomicUsize>,
}

impl<A> Counting<A> {
    fn new(inner: A) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner,
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl<A: Authenticator> Authenticator for Counting<A> {
    fn scheme(&self) -> AuthScheme {
        self.inner.scheme()
    }

    async fn authenticate(
        &self,
        client: &Client,
        url: &Url,
        token: &mut Token,
        configurator: &dyn ConnectionConfigurator,
    ) -> authtoken::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.authenticate(client, url, token, configurator).await
    }
}

/// Counts requests passing through the configurator
fn counting_configurator() -> (impl ConnectionConfigurator, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let configurator = move |request: RequestBuilder| {
        counter.fetch_add(1, Ordering::SeqCst);
        request.timeout(std::time::Duration::from_secs(5))
    };
    (configurator, calls)
}

fn negotiate_client(key: &[u8]) -> (AuthenticatedClient, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let mechanism = SharedKeyMechanism::new("alice", key).unwrap();
    let (authenticator, handshakes) = Counting::new(NegotiateAuthenticator::new(mechanism));
    let (configurator, requests) = counting_configurator();
    let client = AuthenticatedClient::new(authenticator).with_configurator(configurator);
    (client, handshakes, requests)
}

// ============================================================================
// Negotiate
// ============================================================================

#[tokio::test]
async fn test_negotiate_once_then_reuse() {
    let url = start(negotiate_validator(ValidatorConfig::default())).await;
    let (client, handshakes, requests) = negotiate_client(b"alice-key");

    let mut token = Token::new();
    assert!(!token.is_set());

    let response = client.open(&url, &mut token).await.unwrap().get().send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "hello alice");

    assert!(token.is_set());
    assert_eq!(Token::parse(&token.serialize().unwrap()).unwrap(), token);
    // initial OPTIONS, init, response, then the payload request
    assert_eq!(requests.load(Ordering::SeqCst), 4);

    let first = token.clone();
    for _ in 0..3 {
        let response = client.open(&url, &mut token).await.unwrap().get().send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(handshakes.load(Ordering::SeqCst), 1);
    assert_eq!(requests.load(Ordering::SeqCst), 7);
    assert_eq!(token, first);
}

#[tokio::test]
async fn test_post_is_echoed() {
    let url = start(negotiate_validator(ValidatorConfig::default())).await;
    let (client, _, _) = negotiate_client(b"alice-key");

    let mut token = Token::new();
    let response = client
        .open(&url, &mut token)
        .await
        .unwrap()
        .post()
        .body("test")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"test");
}

#[tokio::test]
async fn test_no_token_always_challenged() {
    let url = start(negotiate_validator(ValidatorConfig::default())).await;
    let client = Client::new();

    for _ in 0..3 {
        let response = client.get(url.clone()).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()["www-authenticate"], "Negotiate");
    }

    let response = client.post(url.clone()).body("test").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_wrong_key_fails_without_token() {
    let url = start(negotiate_validator(ValidatorConfig::default())).await;
    let (client, _, _) = negotiate_client(b"not-alice-key");

    let mut token = Token::new();
    let result = client.open(&url, &mut token).await;
    assert!(matches!(result, Err(Error::Authentication { .. })));
    assert!(!token.is_set());
}

#[tokio::test]
async fn test_tampered_token_forces_renegotiation() {
    let url = start(negotiate_validator(ValidatorConfig::default())).await;
    let (client, handshakes, _) = negotiate_client(b"alice-key");

    let mut token = Token::new();
    client.open(&url, &mut token).await.unwrap();

    // Claim another principal while keeping alice's signature
    let forged = token.serialize().unwrap().replacen("p=alice", "p=mallory", 1);
    let mut token = Token::parse(&forged).unwrap();

    let response = client.open(&url, &mut token).await.unwrap().get().send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    token.clear();
    let response = client.open(&url, &mut token).await.unwrap().get().send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "hello alice");
    assert_eq!(handshakes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_expired_token_rejected() {
    let url = start(negotiate_validator(ValidatorConfig::default())).await;

    // Validly signed, but expired
    let expired = signer().sign(
        &AuthToken::new("alice", "negotiate", Utc::now() - Duration::seconds(1)).unwrap(),
    );
    let response = Client::new()
        .get(url.clone())
        .header("Cookie", format!("authtoken={expired}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The client sees the expiry too and renegotiates on its own
    let (client, handshakes, _) = negotiate_client(b"alice-key");
    let mut token = Token::parse(&expired).unwrap();
    let response = client.open(&url, &mut token).await.unwrap().get().send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(handshakes.load(Ordering::SeqCst), 1);
    assert_ne!(token.serialize().unwrap(), expired);
}

#[tokio::test]
async fn test_server_refresh_adopted() {
    let config = ValidatorConfig {
        validity: std::time::Duration::from_secs(3600),
        refresh_window: Some(std::time::Duration::from_secs(3600)),
        ..Default::default()
    };
    let url = start(negotiate_validator(config)).await;
    let (client, handshakes, _) = negotiate_client(b"alice-key");

    let mut token = Token::new();
    client.open(&url, &mut token).await.unwrap();
    let issued = token.expires_at().unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let response = client.open(&url, &mut token).await.unwrap().get().send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    AuthenticatedClient::refresh_token(&response, &mut token).unwrap();

    assert!(token.expires_at().unwrap() > issued);
    assert_eq!(handshakes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_shared_token_negotiates_once_under_lock() {
    let url = start(negotiate_validator(ValidatorConfig::default())).await;
    let (client, handshakes, _) = negotiate_client(b"alice-key");
    let token = Arc::new(tokio::sync::Mutex::new(Token::new()));

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let client = client.clone();
            let token = token.clone();
            let url = url.clone();
            tokio::spawn(async move {
                let connection = {
                    let mut token = token.lock().await;
                    client.open(&url, &mut token).await.unwrap()
                };
                connection.get().send().await.unwrap().status()
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap(), StatusCode::OK);
    }
    assert_eq!(handshakes.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Credential schemes
// ============================================================================

#[tokio::test]
async fn test_basic_flow() {
    let handler = BasicHandler::new("test")
        .unwrap()
        .with_user("alice", "wonderland");
    let url = start(ServerValidator::new(handler, signer(), ValidatorConfig::default())).await;

    let (authenticator, handshakes) = Counting::new(BasicAuthenticator::new("alice", "wonderland"));
    let client = AuthenticatedClient::new(authenticator);
    let mut token = Token::new();

    for _ in 0..2 {
        let response = client.open(&url, &mut token).await.unwrap().get().send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "hello alice");
    }
    assert_eq!(handshakes.load(Ordering::SeqCst), 1);

    let client = AuthenticatedClient::new(BasicAuthenticator::new("alice", "looking-glass"));
    let mut token = Token::new();
    let result = client.open(&url, &mut token).await;
    assert!(matches!(result, Err(Error::Authentication { .. })));
    assert!(!token.is_set());
}

#[tokio::test]
async fn test_pseudo_flow() {
    let url = start(ServerValidator::new(
        PseudoHandler::new(),
        signer(),
        ValidatorConfig::default(),
    ))
    .await;

    let client = AuthenticatedClient::new(PseudoAuthenticator::new("carol"));
    let mut token = Token::new();
    let connection = client.open(&url, &mut token).await.unwrap();

    // The payload request carries only the cookie, not user.name
    assert_eq!(connection.url().query(), None);
    let response = connection.post().body("test").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "test");
}

#[tokio::test]
async fn test_principal_outside_cookie_octet_fails_cleanly() {
    let url = start(ServerValidator::new(
        PseudoHandler::new(),
        signer(),
        ValidatorConfig::default(),
    ))
    .await;

    for user in ["a;b", "josé", "a b"] {
        let client = AuthenticatedClient::new(PseudoAuthenticator::new(user));
        let mut token = Token::new();
        let result = client.open(&url, &mut token).await;
        assert!(
            matches!(result, Err(Error::Authentication { .. })),
            "{user}: {result:?}"
        );
        assert!(!token.is_set());
    }

    for user in ["alice", "HTTP/host@REALM"] {
        let client = AuthenticatedClient::new(PseudoAuthenticator::new(user));
        let mut token = Token::new();
        let connection = client.open(&url, &mut token).await.unwrap();
        assert_eq!(Token::parse(&token.serialize().unwrap()).unwrap(), token);

        let response = connection.get().send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), format!("hello {user}"));
    }
}

#[tokio::test]
async fn test_token_for_other_scheme_not_accepted() {
    let pseudo_url = start(ServerValidator::new(
        PseudoHandler::new(),
        signer(),
        ValidatorConfig::default(),
    ))
    .await;
    let negotiate_url = start(negotiate_validator(ValidatorConfig::default())).await;

    let client = AuthenticatedClient::new(PseudoAuthenticator::new("alice"));
    let mut token = Token::new();
    client.open(&pseudo_url, &mut token).await.unwrap();

    let response = Client::new()
        .get(negotiate_url)
        .header("Cookie", format!("authtoken={token}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_transport_error() {
    let (client, _, _) = negotiate_client(b"alice-key");
    let url = Url::parse("http://127.0.0.1:1/foo/bar").unwrap();

    let mut token = Token::new();
    let result = client.open(&url, &mut token).await;
    let err = result.unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
    assert!(err.is_retryable());
    assert!(!token.is_set());
}
