use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::main_lib::AppState;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Shared-secret check for the admin routes.
///
/// Only the SHA-256 digest of the token is kept; candidates are compared by
/// digest so the comparison does not depend on where the bytes differ.
pub struct AdminAuth {
    token_digest: Vec<u8>,
}

#[derive(Debug)]
pub enum AuthError {
    Unauthorized,
    NotConfigured,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthErrorBody {
    code: u16,
    kind: &'static str,
    message: String,
}

impl AdminAuth {
    pub fn new(token: &str) -> Self {
        Self {
            token_digest: digest(token),
        }
    }

    pub fn verify(&self, candidate: &str) -> Result<(), AuthError> {
        if digest(candidate) == self.token_digest {
            Ok(())
        } else {
            Err(AuthError::Unauthorized)
        }
    }
}

fn digest(value: &str) -> Vec<u8> {
    Sha256::digest(value.as_bytes()).to_vec()
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AuthError::NotConfigured => (StatusCode::NOT_FOUND, "Not Found".to_string()),
        };
        let kind = match status {
            StatusCode::UNAUTHORIZED => "Unauthorized",
            _ => "NotFound",
        };
        let body = Json(AuthErrorBody {
            code: status.as_u16(),
            kind,
            message,
        });
        (status, body).into_response()
    }
}

/// Token from `Authorization: Bearer <token>`, else from `x-admin-token`.
fn presented_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|header| {
            let mut parts = header.splitn(2, ' ');
            match (parts.next(), parts.next()) {
                (Some(scheme), Some(token)) if scheme.eq_ignore_ascii_case("Bearer") => {
                    Some(token.trim().to_string())
                }
                _ => None,
            }
        });

    bearer
        .or_else(|| {
            headers
                .get(ADMIN_TOKEN_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(|token| token.trim().to_string())
        })
        .filter(|token| !token.is_empty())
}

pub async fn require_admin_token(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    // Admin routes do not exist when no token is configured.
    let auth = state.admin_auth.as_ref().ok_or(AuthError::NotConfigured)?;

    let token = presented_token(request.headers()).ok_or(AuthError::Unauthorized)?;
    auth.verify(&token)?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_verify_matches_only_exact_token() {
        let auth = AdminAuth::new("s3cret");
        assert!(auth.verify("s3cret").is_ok());
        assert!(auth.verify("s3cret ").is_err());
        assert!(auth.verify("").is_err());
    }

    #[test]
    fn test_bearer_takes_precedence_over_header() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer from-bearer"));
        headers.insert(ADMIN_TOKEN_HEADER, HeaderValue::from_static("from-header"));
        assert_eq!(presented_token(&headers).as_deref(), Some("from-bearer"));

        headers.remove(AUTHORIZATION);
        assert_eq!(presented_token(&headers).as_deref(), Some("from-header"));
    }

    #[test]
    fn test_other_schemes_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(presented_token(&headers), None);
    }
}
