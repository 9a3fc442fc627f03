use serde::{Deserialize, Serialize};

pub const DEFAULT_MIN_PRICE: i64 = 3_000;
pub const DEFAULT_AVG_PRICE: i64 = 9_000;
pub const DEFAULT_MAX_PRICE: i64 = 15_000;
pub const DEFAULT_RECOMMENDED_PRICE: i64 = 12_500;

/// Carbon credit prices in KRW per KCU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketPrices {
    pub min_price: i64,
    pub avg_price: i64,
    pub max_price: i64,
    pub recommended_price: i64,
    #[serde(default)]
    pub daily_change: f64,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub updated_at: Option<String>,
}

fn default_active() -> bool {
    true
}

impl Default for MarketPrices {
    fn default() -> Self {
        Self {
            min_price: DEFAULT_MIN_PRICE,
            avg_price: DEFAULT_AVG_PRICE,
            max_price: DEFAULT_MAX_PRICE,
            recommended_price: DEFAULT_RECOMMENDED_PRICE,
            daily_change: 0.0,
            is_active: true,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketPricesResponse {
    #[serde(flatten)]
    pub prices: MarketPrices,
    /// false when the defaults were served because the database had nothing
    pub from_database: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketPricesUpdate {
    pub min_price: i64,
    pub avg_price: i64,
    pub max_price: i64,
    pub recommended_price: i64,
    #[serde(default)]
    pub daily_change: Option<f64>,
}

impl MarketPricesUpdate {
    pub fn validate(&self) -> Result<(), String> {
        if self.min_price < 0 || self.avg_price < 0 || self.max_price < 0 || self.recommended_price < 0 {
            return Err("Prices must not be negative".to_string());
        }
        if !(self.min_price <= self.avg_price && self.avg_price <= self.max_price) {
            return Err("Prices must satisfy min <= avg <= max".to_string());
        }
        if let Some(change) = self.daily_change {
            if !change.is_finite() {
                return Err("Daily change must be a finite number".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatorRequest {
    pub generation_mwh: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueEstimate {
    pub generation_mwh: f64,
    pub kcu: f64,
    pub min_revenue: f64,
    pub avg_revenue: f64,
    pub max_revenue: f64,
    pub estimated_revenue: i64,
    /// `estimated_revenue` as the page shows it, e.g. `₩4,131,000`
    pub formatted_revenue: String,
}
