use std::sync::Arc;

use serde_json::{json, Value};

use crate::api::db_client::{Query, Subscription, MARKET_PRICES};
use crate::error::{DbError, RepositoryError};
use crate::models::market_models::{MarketPrices, MarketPricesResponse, MarketPricesUpdate};
use crate::utils::init_gate::InitGate;

pub struct MarketRepository {
    init_gate: Arc<InitGate>,
}

impl MarketRepository {
    pub fn new(init_gate: Arc<InitGate>) -> Self {
        Self { init_gate }
    }

    fn active() -> Query {
        Query::new().eq("is_active", true)
    }

    /// Newest active price row.
    pub async fn fetch_latest(&self) -> Result<Option<MarketPrices>, RepositoryError> {
        let client = self.init_gate.require_client()?;
        let rows = client
            .select(MARKET_PRICES, &Self::active().order("updated_at", false).limit(1))
            .await?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(
                serde_json::from_value(row).map_err(|e| DbError::Decode(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    /// The page always gets prices: the stored ones when available,
    /// defaults otherwise.
    pub async fn latest_or_default(&self) -> MarketPricesResponse {
        match self.fetch_latest().await {
            Ok(Some(prices)) => MarketPricesResponse {
                prices,
                from_database: true,
            },
            Ok(None) => MarketPricesResponse {
                prices: MarketPrices::default(),
                from_database: false,
            },
            Err(e) => {
                tracing::warn!("Failed to fetch market prices, serving defaults: {}", e);
                MarketPricesResponse {
                    prices: MarketPrices::default(),
                    from_database: false,
                }
            }
        }
    }

    /// Deactivates the current rows and inserts `update` as the new active row.
    pub async fn update_prices(&self, update: &MarketPricesUpdate) -> Result<MarketPrices, RepositoryError> {
        let client = self.init_gate.require_client()?;
        client
            .update(MARKET_PRICES, &Self::active(), json!({ "is_active": false }))
            .await?;

        let row = json!({
            "min_price": update.min_price,
            "avg_price": update.avg_price,
            "max_price": update.max_price,
            "recommended_price": update.recommended_price,
            "daily_change": update.daily_change.unwrap_or(0.0),
            "is_active": true,
        });
        let stored = client.insert(MARKET_PRICES, vec![row]).await?;
        let first = stored
            .into_iter()
            .next()
            .ok_or_else(|| DbError::Decode("insert returned no rows".to_string()))?;
        let prices: MarketPrices = serde_json::from_value(first).map_err(|e| DbError::Decode(e.to_string()))?;
        tracing::info!(
            "Market prices updated: {}-{} (recommended {})",
            prices.min_price,
            prices.max_price,
            prices.recommended_price
        );
        Ok(prices)
    }

    /// Calls `on_change` with every active price row that changes.
    pub fn subscribe<F>(&self, on_change: F) -> Result<Subscription, RepositoryError>
    where
        F: Fn(MarketPrices) + Send + Sync + 'static,
    {
        let client = self.init_gate.require_client()?;
        let subscription = client.subscribe(
            MARKET_PRICES,
            Self::active(),
            Box::new(move |row: Value| match serde_json::from_value::<MarketPrices>(row) {
                Ok(prices) => on_change(prices),
                Err(e) => tracing::warn!("Ignoring malformed market price change: {}", e),
            }),
        )?;
        tracing::info!("Subscribed to market price updates");
        Ok(subscription)
    }
}
