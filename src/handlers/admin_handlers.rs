use std::sync::Arc;
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    AppState,
    error::{InitError, RepositoryError},
    models::market_models::{MarketPrices, MarketPricesUpdate},
    models::registration_models::PendingRegistration,
    repositories::registration_repository::{DatabaseStatus, RegistrationPage},
};

const MAX_PAGE_SIZE: usize = 500;

#[derive(Debug, Deserialize)]
pub struct PageParams {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

fn repository_error(e: RepositoryError) -> (StatusCode, Json<Value>) {
    let status = match &e {
        RepositoryError::Init(InitError::NotInitialized) => StatusCode::SERVICE_UNAVAILABLE,
        RepositoryError::Init(InitError::InitializationFailed { .. }) => StatusCode::SERVICE_UNAVAILABLE,
        RepositoryError::Db(db) if db.is_transport() => StatusCode::SERVICE_UNAVAILABLE,
        RepositoryError::Db(_) => StatusCode::BAD_GATEWAY,
    };
    tracing::error!("Admin request failed: {}", e);
    (status, Json(json!({"error": e.to_string()})))
}

pub async fn list_pre_registrations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PageParams>,
) -> Result<Json<RegistrationPage>, (StatusCode, Json<Value>)> {
    if params.limit == 0 || params.limit > MAX_PAGE_SIZE {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("limit must be between 1 and {}", MAX_PAGE_SIZE)}))
        ));
    }
    let page = state.registrations
        .list(params.limit, params.offset)
        .await
        .map_err(repository_error)?;
    Ok(Json(page))
}

pub async fn update_market_prices(
    State(state): State<Arc<AppState>>,
    Json(update): Json<MarketPricesUpdate>,
) -> Result<Json<MarketPrices>, (StatusCode, Json<Value>)> {
    update.validate().map_err(|message| {
        (StatusCode::BAD_REQUEST, Json(json!({"error": message})))
    })?;
    let prices = state.market
        .update_prices(&update)
        .await
        .map_err(repository_error)?;
    // the change feed will also pick this up; publish now so open pages
    // don't wait for the next poll
    let _ = state.price_updates.send(prices.clone());
    Ok(Json(prices))
}

pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Json<DatabaseStatus> {
    Json(state.registrations.status().await)
}

pub async fn reinit_client(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<Value>) {
    let gate_state = state.init_gate.retry().await;
    if gate_state.is_ready() {
        crate::spawn_price_feed(state.clone());
        (StatusCode::OK, Json(json!({"state": gate_state.label()})))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "state": gate_state.label(),
                "error": "Database client initialization failed",
                // a client that was already up keeps serving
                "serving": state.init_gate.is_ready(),
            })),
        )
    }
}

pub async fn list_pending(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PendingRegistration>>, (StatusCode, Json<Value>)> {
    state.staging.list_pending().await.map(Json).map_err(|e| {
        tracing::error!("Failed to read staged registrations: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()}))
        )
    })
}

pub async fn clear_pending(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let cleared = state.staging.clear().await.map_err(|e| {
        tracing::error!("Failed to clear staged registrations: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()}))
        )
    })?;
    Ok(Json(json!({"cleared": cleared})))
}
