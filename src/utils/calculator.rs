use thiserror::Error;

use crate::models::market_models::{MarketPrices, RevenueEstimate};

/// KCU issued per MWh of generation.
pub const KCU_CONVERSION_FACTOR: f64 = 0.459;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalculatorError {
    #[error("Generation must be a positive number of MWh")]
    InvalidGeneration,
}

pub fn calculate(generation_mwh: f64, prices: &MarketPrices) -> Result<RevenueEstimate, CalculatorError> {
    if !generation_mwh.is_finite() || generation_mwh <= 0.0 {
        return Err(CalculatorError::InvalidGeneration);
    }
    let kcu = generation_mwh * KCU_CONVERSION_FACTOR;
    let avg_revenue = kcu * prices.avg_price as f64;
    Ok(RevenueEstimate {
        generation_mwh,
        kcu,
        min_revenue: kcu * prices.min_price as f64,
        avg_revenue,
        max_revenue: kcu * prices.max_price as f64,
        estimated_revenue: avg_revenue.round() as i64,
        formatted_revenue: format_krw(avg_revenue),
    })
}

/// `₩1,234,567`, whole won.
pub fn format_krw(amount: f64) -> String {
    let whole = amount.round() as i64;
    let digits = whole.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if whole < 0 {
        format!("-₩{}", grouped)
    } else {
        format!("₩{}", grouped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revenue_uses_conversion_factor_and_prices() {
        let estimate = calculate(1000.0, &MarketPrices::default()).unwrap();
        assert!((estimate.kcu - 459.0).abs() < 1e-9);
        assert!((estimate.min_revenue - 1_377_000.0).abs() < 1e-6);
        assert!((estimate.avg_revenue - 4_131_000.0).abs() < 1e-6);
        assert!((estimate.max_revenue - 6_885_000.0).abs() < 1e-6);
        assert_eq!(estimate.estimated_revenue, 4_131_000);
        assert_eq!(estimate.formatted_revenue, "₩4,131,000");
    }

    #[test]
    fn non_positive_generation_is_rejected() {
        let prices = MarketPrices::default();
        assert_eq!(calculate(0.0, &prices), Err(CalculatorError::InvalidGeneration));
        assert_eq!(calculate(-5.0, &prices), Err(CalculatorError::InvalidGeneration));
        assert_eq!(calculate(f64::NAN, &prices), Err(CalculatorError::InvalidGeneration));
    }

    #[test]
    fn krw_formatting() {
        assert_eq!(format_krw(4_131_000.0), "₩4,131,000");
        assert_eq!(format_krw(999.4), "₩999");
        assert_eq!(format_krw(1000.0), "₩1,000");
        assert_eq!(format_krw(0.0), "₩0");
        assert_eq!(format_krw(-12_500.0), "-₩12,500");
    }
}
