use std::convert::Infallible;
use std::sync::Arc;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream};
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::{
    AppState,
    models::market_models::{CalculatorRequest, MarketPricesResponse, RevenueEstimate},
    utils::{analytics::CALCULATOR_USE, calculator},
};

pub async fn get_market_prices(
    State(state): State<Arc<AppState>>,
) -> Json<MarketPricesResponse> {
    Json(state.market.latest_or_default().await)
}

pub async fn calculate_revenue(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CalculatorRequest>,
) -> Result<Json<RevenueEstimate>, (StatusCode, Json<Value>)> {
    let prices = state.market.latest_or_default().await.prices;
    let estimate = calculator::calculate(request.generation_mwh, &prices).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": e.to_string()}))
        )
    })?;

    state.analytics.track(CALCULATOR_USE, json!({
        "generation_input": estimate.generation_mwh,
        "calculated_kcu": estimate.kcu,
        "estimated_revenue": estimate.estimated_revenue,
    }));

    Ok(Json(estimate))
}

/// Pushes every active price change to the page as a server-sent event.
pub async fn stream_market_prices(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.price_updates.subscribe();
    let updates = stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(prices) => {
                    let event = Event::default()
                        .event("market_prices")
                        .json_data(&prices)
                        .unwrap_or_else(|_| Event::default().event("market_prices"));
                    return Some((Ok(event), receiver));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Price stream client lagged, skipped {} updates", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(updates).keep_alive(KeepAlive::default())
}
