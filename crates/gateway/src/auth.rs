//! API authentication middleware.
//!
//! Reads the env vars named by `config.auth.api_token_env` /
//! `admin_token_env` **once at startup** and caches the SHA-256 digests in
//! [`AppState`]. If a token is unset or empty, the corresponding guard is a
//! no-op (dev mode).

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::state::AppState;

fn bearer_token(req: &Request<Body>) -> &str {
    req.headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("")
}

fn check(expected_hash: &Option<Vec<u8>>, req: &Request<Body>) -> bool {
    let Some(expected) = expected_hash else {
        return true;
    };
    let provided_hash = Sha256::digest(bearer_token(req).as_bytes());
    bool::from(provided_hash.ct_eq(expected.as_slice()))
}

fn unauthorized() -> Response {
    (
        axum::http::StatusCode::UNAUTHORIZED,
        axum::Json(serde_json::json!({ "error": "invalid or missing bearer token" })),
    )
        .into_response()
}

/// Guards the plugin-facing and session-mutating surface.
pub async fn require_api_token(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    if !check(&state.api_token_hash, &req) {
        return unauthorized();
    }
    next.run(req).await
}

/// Guards `/system/*` reset endpoints.
pub async fn require_admin_token(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    if !check(&state.admin_token_hash, &req) {
        return unauthorized();
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_bearer(token: &str) -> Request<Body> {
        Request::builder()
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn no_configured_hash_is_a_noop() {
        let req = Request::builder().body(Body::empty()).unwrap();
        assert!(check(&None, &req));
    }

    #[test]
    fn matching_token_passes() {
        let hash = Sha256::digest(b"s3cret").to_vec();
        assert!(check(&Some(hash), &request_with_bearer("s3cret")));
    }

    #[test]
    fn mismatched_token_fails() {
        let hash = Sha256::digest(b"s3cret").to_vec();
        assert!(!check(&Some(hash), &request_with_bearer("wrong")));
    }

    #[test]
    fn missing_header_fails_when_hash_configured() {
        let hash = Sha256::digest(b"s3cret").to_vec();
        let req = Request::builder().body(Body::empty()).unwrap();
        assert!(!check(&Some(hash), &req));
    }
}
