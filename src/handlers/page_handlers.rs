use std::sync::Arc;
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header::USER_AGENT},
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    AppState,
    utils::{analytics::{generate_session_id, PAGE_VISIT}, countdown::{self, Countdown}},
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageVisitRequest {
    pub page_path: Option<String>,
    pub referrer: Option<String>,
    pub session_id: Option<String>,
}

pub async fn log_page_visit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(visit): Json<PageVisitRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let session_id = visit.session_id.unwrap_or_else(generate_session_id);

    state.analytics.track(PAGE_VISIT, json!({
        "page_path": visit.page_path.unwrap_or_else(|| "/".to_string()),
        "referrer": visit.referrer.filter(|r| !r.is_empty()),
        "user_agent": user_agent,
        "session_id": session_id,
    }));

    (StatusCode::ACCEPTED, Json(json!({"session_id": session_id})))
}

pub async fn get_countdown(
    State(state): State<Arc<AppState>>,
) -> Json<Countdown> {
    Json(countdown::remaining(state.settings.countdown_target, chrono::Utc::now()))
}
