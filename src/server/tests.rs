//! Tests for the server module

use super::*;
use crate::auth::{Mechanism, SharedKeyAcceptor, SharedKeyMechanism};
use crate::token::{AuthToken, Signer};
use crate::types::AuthScheme;
use axum::body::{to_bytes, Body};
use axum::http::header::{AUTHORIZATION, COOKIE, SET_COOKIE, WWW_AUTHENTICATE};
use axum::http::request::Parts;
use axum::http::{HeaderValue, Method, Request, StatusCode};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{Duration, Utc};
use cookie::Cookie;
use pretty_assertions::assert_eq;
use tower::ServiceExt;

const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

fn signer() -> Signer {
    Signer::new(SECRET).unwrap()
}

fn negotiate_validator() -> ServerValidator {
    let acceptor = SharedKeyAcceptor::new(signer()).with_key("alice", b"alice-key");
    ServerValidator::new(
        NegotiateHandler::new(acceptor),
        signer(),
        ValidatorConfig::default(),
    )
}

fn basic_validator() -> ServerValidator {
    let handler = BasicHandler::new("test")
        .unwrap()
        .with_user("alice", "wonderland");
    ServerValidator::new(handler, signer(), ValidatorConfig::default())
}

fn pseudo_validator() -> ServerValidator {
    ServerValidator::new(PseudoHandler::new(), signer(), ValidatorConfig::default())
}

fn parts(uri: &str, headers: &[(&str, &str)]) -> Parts {
    let mut builder = Request::builder().uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(()).unwrap().into_parts().0
}

fn cookie_value(header: &HeaderValue) -> String {
    Cookie::parse(header.to_str().unwrap())
        .unwrap()
        .value()
        .to_string()
}

fn session(principal: &str, scheme: &str, expires_in: Duration) -> String {
    let token = AuthToken::new(principal, scheme, Utc::now() + expires_in).unwrap();
    signer().sign(&token)
}

fn with_cookie(signed: &str) -> Parts {
    parts("/foo/bar", &[("cookie", &format!("authtoken={signed}"))])
}

/// Drive the shared-key handshake against the validator until it decides
fn negotiate(validator: &ServerValidator, key: &[u8]) -> Decision {
    let mut context = SharedKeyMechanism::new("alice", key)
        .unwrap()
        .new_context("HTTP/localhost")
        .unwrap();
    let mut challenge: Option<Vec<u8>> = None;

    for _ in 0..5 {
        let output = context.step(challenge.as_deref()).unwrap();
        let auth = format!("Negotiate {}", STANDARD.encode(output));
        match validator.validate(&parts("/foo/bar", &[("authorization", &auth)])) {
            Decision::Challenge(header) => {
                let value = header.to_str().unwrap();
                let encoded = value.strip_prefix("Negotiate ").unwrap();
                challenge = Some(STANDARD.decode(encoded).unwrap());
            }
            decision => return decision,
        }
    }
    panic!("handshake did not finish");
}

// ============================================================================
// Validator
// ============================================================================

#[test]
fn test_no_token_is_challenged() {
    let decision = negotiate_validator().validate(&parts("/foo/bar", &[]));
    assert_eq!(
        decision,
        Decision::Challenge(HeaderValue::from_static("Negotiate"))
    );
}

#[test]
fn test_negotiate_handshake_issues_token() {
    let validator = negotiate_validator();

    let Decision::Admit {
        token,
        set_cookie,
        www_authenticate,
        issued,
    } = negotiate(&validator, b"alice-key")
    else {
        panic!("expected admit");
    };

    assert!(issued);
    assert_eq!(token.principal(), "alice");
    assert_eq!(token.scheme(), "negotiate");
    assert!(www_authenticate
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("Negotiate "));

    let signed = cookie_value(&set_cookie.unwrap());
    assert_eq!(signer().verify(&signed).unwrap(), token);

    // The issued token admits the next request without a handshake
    let decision = validator.validate(&with_cookie(&signed));
    assert!(matches!(
        decision,
        Decision::Admit {
            issued: false,
            set_cookie: None,
            ..
        }
    ));
}

#[test]
fn test_negotiate_wrong_key_rejected() {
    assert_eq!(
        negotiate(&negotiate_validator(), b"wrong-key"),
        Decision::Reject
    );
}

#[test]
fn test_negotiate_garbage_rejected() {
    let validator = negotiate_validator();
    let decision = validator.validate(&parts("/", &[("authorization", "Negotiate !!!")]));
    assert_eq!(decision, Decision::Reject);

    let decision = validator.validate(&parts(
        "/",
        &[("authorization", &format!("Negotiate {}", STANDARD.encode("junk")))],
    ));
    assert_eq!(decision, Decision::Reject);
}

#[test]
fn test_tampered_token_is_challenged() {
    let validator = negotiate_validator();
    let signed = session("alice", "negotiate", Duration::hours(1));

    for i in 0..signed.len() {
        let mut bytes = signed.clone().into_bytes();
        bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();

        let decision = validator.validate(&with_cookie(&tampered));
        assert!(
            matches!(decision, Decision::Challenge(_)),
            "byte {i} accepted: {tampered}"
        );
    }
}

#[test]
fn test_expired_token_is_challenged() {
    let validator = negotiate_validator();
    let signed = session("alice", "negotiate", Duration::minutes(5));
    let request = with_cookie(&signed);

    assert!(matches!(
        validator.validate_at(&request, Utc::now()),
        Decision::Admit { .. }
    ));
    assert!(matches!(
        validator.validate_at(&request, Utc::now() + Duration::minutes(10)),
        Decision::Challenge(_)
    ));
}

#[test]
fn test_token_for_other_scheme_is_challenged() {
    let signed = session("alice", "pseudo", Duration::hours(1));
    let decision = negotiate_validator().validate(&with_cookie(&signed));
    assert!(matches!(decision, Decision::Challenge(_)));
}

#[test]
fn test_malformed_cookie_is_challenged() {
    let decision = negotiate_validator().validate(&with_cookie("garbage"));
    assert!(matches!(decision, Decision::Challenge(_)));
}

#[test]
fn test_cookie_among_others() {
    let signed = session("alice", "negotiate", Duration::hours(1));
    let request = parts(
        "/foo/bar",
        &[("cookie", &format!("theme=dark; authtoken={signed}; lang=en"))],
    );
    let Decision::Admit { token, .. } = negotiate_validator().validate(&request) else {
        panic!("expected admit");
    };
    assert_eq!(token.principal(), "alice");
}

#[test]
fn test_refresh_window() {
    let config = ValidatorConfig {
        validity: std::time::Duration::from_secs(3600),
        refresh_window: Some(std::time::Duration::from_secs(600)),
        ..Default::default()
    };
    let validator = ServerValidator::new(PseudoHandler::new(), signer(), config);

    // Plenty of time left: no refresh
    let fresh = session("alice", "pseudo", Duration::minutes(50));
    let Decision::Admit { set_cookie, .. } = validator.validate(&with_cookie(&fresh)) else {
        panic!("expected admit");
    };
    assert!(set_cookie.is_none());

    // Inside the window: re-issued with full validity
    let stale = session("alice", "pseudo", Duration::minutes(5));
    let Decision::Admit {
        token,
        set_cookie,
        issued,
        ..
    } = validator.validate(&with_cookie(&stale))
    else {
        panic!("expected admit");
    };
    assert!(!issued);
    assert!(token.expires() > Utc::now() + Duration::minutes(55));
    assert_eq!(signer().verify(&cookie_value(&set_cookie.unwrap())).unwrap(), token);
}

#[test]
fn test_set_cookie_attributes() {
    let config = ValidatorConfig {
        validity: std::time::Duration::from_secs(600),
        cookie_path: "/api".to_string(),
        cookie_domain: Some("example.com".to_string()),
        secure_cookie: true,
        ..Default::default()
    };
    let validator = ServerValidator::new(PseudoHandler::new(), signer(), config);

    let (_, header) = validator.issue("alice", Utc::now()).unwrap();
    let cookie = Cookie::parse(header.to_str().unwrap().to_string()).unwrap();
    assert_eq!(cookie.name(), "authtoken");
    assert_eq!(cookie.path(), Some("/api"));
    assert_eq!(cookie.domain(), Some("example.com"));
    assert_eq!(cookie.secure(), Some(true));
    assert_eq!(cookie.http_only(), Some(true));
    assert_eq!(cookie.max_age(), Some(cookie::time::Duration::seconds(600)));
}

#[test]
fn test_issue_with_unrepresentable_validity_fails() {
    let config = ValidatorConfig {
        validity: std::time::Duration::from_secs(u64::MAX),
        ..Default::default()
    };
    let validator = ServerValidator::new(PseudoHandler::new(), signer(), config);

    assert!(matches!(
        validator.issue("alice", Utc::now()),
        Err(crate::error::Error::Config { .. })
    ));
}

#[test]
fn test_issue_rejects_bad_principal() {
    assert!(pseudo_validator().issue("a&b", Utc::now()).is_err());

    for query in ["a%26b", "a%3Bb", "jos%C3%A9"] {
        let decision = pseudo_validator().validate(&parts(&format!("/?user.name={query}"), &[]));
        assert_eq!(decision, Decision::Reject, "{query}");
    }
}

// ============================================================================
// Handlers
// ============================================================================

#[test]
fn test_basic_handler() {
    let validator = basic_validator();
    assert_eq!(validator.scheme(), AuthScheme::Basic);

    let decision = validator.validate(&parts("/", &[]));
    assert_eq!(
        decision,
        Decision::Challenge(HeaderValue::from_static("Basic realm=\"test\""))
    );

    let good = format!("Basic {}", STANDARD.encode("alice:wonderland"));
    let Decision::Admit { token, issued, .. } =
        validator.validate(&parts("/", &[("authorization", &good)]))
    else {
        panic!("expected admit");
    };
    assert!(issued);
    assert_eq!(token.principal(), "alice");
    assert_eq!(token.scheme(), "basic");

    for bad in [
        format!("Basic {}", STANDARD.encode("alice:looking-glass")),
        format!("Basic {}", STANDARD.encode("bob:wonderland")),
        format!("Basic {}", STANDARD.encode("no-colon")),
        "Basic %%%".to_string(),
    ] {
        let decision = validator.validate(&parts("/", &[("authorization", &bad)]));
        assert_eq!(decision, Decision::Reject, "{bad}");
    }
}

#[test]
fn test_basic_handler_ignores_other_schemes() {
    let decision = basic_validator().validate(&parts("/", &[("authorization", "Bearer abc")]));
    assert!(matches!(decision, Decision::Challenge(_)));
}

#[test]
fn test_pseudo_handler() {
    let validator = pseudo_validator();

    let Decision::Admit { token, .. } = validator.validate(&parts("/foo?user.name=alice", &[]))
    else {
        panic!("expected admit");
    };
    assert_eq!(token.principal(), "alice");

    assert_eq!(
        validator.validate(&parts("/foo", &[])),
        Decision::Challenge(HeaderValue::from_static("PseudoAuth"))
    );
    assert!(matches!(
        validator.validate(&parts("/foo?user.name=", &[])),
        Decision::Challenge(_)
    ));
}

#[test]
fn test_pseudo_handler_anonymous() {
    let validator = ServerValidator::new(
        PseudoHandler::new().allow_anonymous(true),
        signer(),
        ValidatorConfig::default(),
    );
    let Decision::Admit { token, .. } = validator.validate(&parts("/foo", &[])) else {
        panic!("expected admit");
    };
    assert_eq!(token.principal(), ANONYMOUS);
}

// ============================================================================
// Router
// ============================================================================

async fn call(validator: ServerValidator, request: Request<Body>) -> axum::response::Response {
    echo_router(validator).oneshot(request).await.unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_router_challenges_without_token() {
    let request = Request::get("/foo/bar").body(Body::empty()).unwrap();
    let response = call(negotiate_validator(), request).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[WWW_AUTHENTICATE], "Negotiate");
}

#[tokio::test]
async fn test_router_health_unprotected() {
    let request = Request::get("/health").body(Body::empty()).unwrap();
    let response = call(negotiate_validator(), request).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_router_options_handshake_short_circuits() {
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/foo/bar?user.name=alice")
        .body(Body::empty())
        .unwrap();
    let response = call(pseudo_validator(), request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let signed = cookie_value(&response.headers()[SET_COOKIE]);
    assert_eq!(signer().verify(&signed).unwrap().principal(), "alice");
}

#[tokio::test]
async fn test_router_admits_with_token() {
    let signed = session("alice", "pseudo", Duration::hours(1));

    let request = Request::get("/foo/bar")
        .header(COOKIE, format!("authtoken={signed}"))
        .body(Body::empty())
        .unwrap();
    let response = call(pseudo_validator(), request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(SET_COOKIE).is_none());
    assert_eq!(body_text(response).await, "hello alice");
}

#[tokio::test]
async fn test_router_echoes_post_body() {
    let signed = session("alice", "pseudo", Duration::hours(1));

    let request = Request::post("/foo/bar")
        .header(COOKIE, format!("authtoken={signed}"))
        .body(Body::from("test"))
        .unwrap();
    let response = call(pseudo_validator(), request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "test");
}

#[tokio::test]
async fn test_router_rejects_bad_credentials() {
    let request = Request::get("/foo/bar")
        .header(
            AUTHORIZATION,
            format!("Basic {}", STANDARD.encode("alice:nope")),
        )
        .body(Body::empty())
        .unwrap();
    let response = call(basic_validator(), request).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_router_whoami() {
    let request = Request::get("/whoami?user.name=carol")
        .body(Body::empty())
        .unwrap();
    let response = call(pseudo_validator(), request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(SET_COOKIE).is_some());

    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["principal"], "carol");
    assert_eq!(body["scheme"], "pseudo");
}
