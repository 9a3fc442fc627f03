use std::sync::Arc;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use governor::{
    clock::Clock, middleware::NoOpMiddleware, state::keyed::DefaultKeyedStateStore, Quota, RateLimiter,
};
use nonzero_ext::nonzero;
use serde_json::{json, Value};

use crate::{
    AppState,
    config::ContactInfo,
    models::registration_models::{Outcome, RawRegistration, RegistrationRecord},
    utils::analytics::{FORM_ERROR, FORM_SUBMIT},
    utils::submission_guard::{DECODE_ERROR, EMPTY_RESPONSE},
};

/// Message for a database error code, in the page's words.
pub fn friendly_message(code: &str) -> &'static str {
    match code {
        "PGRST301" => "You do not have permission to access this data.",
        "PGRST202" => "The requested data could not be found.",
        "23505" => "This information is already registered.",
        "CONNECTION_ERROR" => "Please check your network connection.",
        // the row was written, only reading it back failed
        DECODE_ERROR | EMPTY_RESPONSE => {
            "Your registration may already have been received. Please contact us before submitting again."
        }
        _ => "A temporary error occurred. Please try again shortly.",
    }
}

fn contact_line(contact: &ContactInfo) -> String {
    format!(
        "If the problem persists, contact us directly: phone {}, email {}",
        contact.phone, contact.email
    )
}

/// Maps a submission outcome to the response the page renders. `staged`
/// says whether a transport failure was parked in the local staging area.
pub fn outcome_response(outcome: &Outcome, contact: &ContactInfo, staged: bool) -> (StatusCode, Json<Value>) {
    match outcome {
        Outcome::Success { stored_record } => (
            StatusCode::CREATED,
            Json(json!({
                "outcome": outcome.label(),
                "message": "Your pre-registration is complete. An expert will contact you soon.",
                "record": stored_record,
            })),
        ),
        Outcome::ValidationFailed { messages } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "outcome": outcome.label(),
                "error": "Please correct the highlighted fields.",
                "messages": messages,
            })),
        ),
        Outcome::ClientNotReady => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "outcome": outcome.label(),
                "error": "The system is initializing. Please try again in a moment.",
            })),
        ),
        Outcome::AlreadyInProgress => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "outcome": outcome.label(),
                "error": "A registration is already being processed. Please try again shortly.",
            })),
        ),
        Outcome::RemoteError { code, .. } => (
            StatusCode::BAD_GATEWAY,
            Json(json!({
                "outcome": outcome.label(),
                "error": friendly_message(code),
                "code": code,
                "contact": contact_line(contact),
            })),
        ),
        Outcome::TransportError { .. } => {
            let error = if staged {
                "We are having trouble reaching our server. Your information has been saved temporarily."
            } else {
                "We are having trouble reaching our server."
            };
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "outcome": outcome.label(),
                    "error": error,
                    "staged": staged,
                    "contact": contact_line(contact),
                })),
            )
        }
    }
}

/// 5 attempts per minute per phone number.
pub fn registration_quota() -> Quota {
    Quota::per_minute(nonzero!(5u32))
}

/// Forgets phone numbers whose allowance has fully refilled and returns how
/// many are still tracked.
pub fn prune_limiter<C: Clock>(
    limiter: &RateLimiter<String, DefaultKeyedStateStore<String>, C, NoOpMiddleware<C::Instant>>,
) -> usize {
    limiter.retain_recent();
    limiter.shrink_to_fit();
    limiter.len()
}

fn limiter_key(raw: &RawRegistration) -> String {
    raw.phone
        .as_deref()
        .map(|p| p.chars().filter(|c| c.is_ascii_digit()).collect::<String>())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| "anonymous".to_string())
}

pub async fn submit_pre_registration(
    State(state): State<Arc<AppState>>,
    Json(raw): Json<RawRegistration>,
) -> (StatusCode, Json<Value>) {
    let limiter_key = limiter_key(&raw);
    if state.registration_limiter.check_key(&limiter_key).is_err() {
        tracing::info!("Registration rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error": "Too many registration attempts. Please try again later."})),
        );
    }

    let outcome = state.submission_guard.submit(&raw).await;
    tracing::debug!("Registration submission finished: {}", outcome.label());

    let mut staged = false;
    match &outcome {
        Outcome::Success { .. } => {
            state.analytics.track(FORM_SUBMIT, json!({
                "event_category": "engagement",
                "event_label": "pre_registration",
                "value": 1,
            }));
        }
        Outcome::TransportError { message } => {
            // best effort: the record was valid, keep it for manual recovery
            if let Ok(record) = RegistrationRecord::parse(&raw) {
                match state.staging.append(record).await {
                    Ok(_) => staged = true,
                    Err(e) => tracing::error!("Failed to stage registration locally: {}", e),
                }
            }
            state.analytics.track(FORM_ERROR, json!({"kind": "transport", "message": message}));
        }
        Outcome::RemoteError { code, message } => {
            state.analytics.track(FORM_ERROR, json!({"kind": "remote", "code": code, "message": message}));
        }
        Outcome::ValidationFailed { .. } | Outcome::ClientNotReady | Outcome::AlreadyInProgress => {}
    }

    outcome_response(&outcome, &state.settings.contact, staged)
}
