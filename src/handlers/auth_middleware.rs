use axum::{
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    body::Body,
    Json,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use crate::AppState;
use serde_json::json;

#[derive(Debug)]
pub struct AuthError {
    pub status: StatusCode,
    pub message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
        }));

        (self.status, body).into_response()
    }
}

type HmacSha256 = Hmac<Sha256>;

// Both sides are reduced to a fixed-length tag keyed on the configured
// token; verify_slice compares the tags in constant time.
fn tokens_match(provided: &str, expected: &str) -> bool {
    let keyed = match HmacSha256::new_from_slice(expected.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    let mut reference = keyed.clone();
    reference.update(expected.as_bytes());
    let tag = reference.finalize().into_bytes();

    let mut candidate = keyed;
    candidate.update(provided.as_bytes());
    candidate.verify_slice(&tag).is_ok()
}

pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let expected = state.settings.admin_token.as_deref().ok_or_else(|| {
        tracing::warn!("Admin route requested but ADMIN_TOKEN is not configured");
        AuthError {
            status: StatusCode::FORBIDDEN,
            message: "Admin access is disabled".to_string(),
        }
    })?;

    let token = request
        .headers()
        .get("Authorization")
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .ok_or(AuthError {
            status: StatusCode::UNAUTHORIZED,
            message: "No authorization token provided".to_string(),
        })?;

    if !tokens_match(token, expected) {
        tracing::warn!("Rejected admin request with invalid token");
        return Err(AuthError {
            status: StatusCode::UNAUTHORIZED,
            message: "Invalid token".to_string(),
        });
    }

    Ok(next.run(request).await)
}
