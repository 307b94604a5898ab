//! Request-dispatch hook
//!
//! Runs the [`ServerValidator`] once per request and short-circuits anything
//! it does not admit.

use super::validator::{Decision, ServerValidator};
use axum::extract::{Request, State};
use axum::http::header::{SET_COOKIE, WWW_AUTHENTICATE};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

/// Axum middleware for [`axum::middleware::from_fn_with_state`]
///
/// - `Challenge` becomes 401 with `WWW-Authenticate`.
/// - `Reject` becomes 403.
/// - `Admit` forwards the request with the [`AuthToken`](crate::token::AuthToken)
///   in its extensions. An `OPTIONS` request that completed a handshake is
///   answered with 200 directly.
pub async fn require_auth(
    State(validator): State<Arc<ServerValidator>>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();

    match validator.validate(&parts) {
        Decision::Challenge(header) => {
            (StatusCode::UNAUTHORIZED, [(WWW_AUTHENTICATE, header)]).into_response()
        }
        Decision::Reject => StatusCode::FORBIDDEN.into_response(),
        Decision::Admit {
            token,
            set_cookie,
            www_authenticate,
            issued,
        } => {
            let mut response = if issued && parts.method == Method::OPTIONS {
                StatusCode::OK.into_response()
            } else {
                let mut request = Request::from_parts(parts, body);
                request.extensions_mut().insert(token);
                next.run(request).await
            };

            let headers = response.headers_mut();
            if let Some(cookie) = set_cookie {
                headers.append(SET_COOKIE, cookie);
            }
            if let Some(mutual) = www_authenticate {
                headers.insert(WWW_AUTHENTICATE, mutual);
            }
            response
        }
    }
}
