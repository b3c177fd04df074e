use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::prices::AlignedPrices;

/// Daily fractional price changes of one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnSeries {
    pub symbol: String,
    pub returns: Vec<Decimal>,
}

/// Return series for every aligned symbol, all of equal length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnMatrix {
    pub series: Vec<ReturnSeries>,
}

impl ReturnMatrix {
    /// Derive daily returns from aligned prices.
    pub fn from_prices(prices: &AlignedPrices) -> Self {
        let series = prices
            .symbols
            .iter()
            .zip(prices.prices.iter())
            .map(|(symbol, p)| ReturnSeries {
                symbol: symbol.clone(),
                returns: daily_returns(p),
            })
            .collect();
        ReturnMatrix { series }
    }

    /// Number of return observations per symbol.
    pub fn observations(&self) -> usize {
        self.series.first().map(|s| s.returns.len()).unwrap_or(0)
    }
}

/// r_t = p_t / p_{t-1} - 1
pub fn daily_returns(prices: &[Decimal]) -> Vec<Decimal> {
    prices
        .windows(2)
        .map(|w| {
            if w[0].is_zero() {
                Decimal::ZERO
            } else {
                w[1] / w[0] - Decimal::ONE
            }
        })
        .collect()
}

pub fn sample_mean(xs: &[Decimal]) -> Decimal {
    if xs.is_empty() {
        return Decimal::ZERO;
    }
    let sum: Decimal = xs.iter().sum();
    sum / Decimal::from(xs.len() as i64)
}

/// Unbiased sample variance (divides by n - 1). Zero below two observations.
pub fn sample_variance(xs: &[Decimal], mean: Decimal) -> Decimal {
    sample_covariance(xs, mean, xs, mean)
}

/// Unbiased sample covariance (divides by n - 1). Zero below two observations.
pub fn sample_covariance(xs: &[Decimal], mean_x: Decimal, ys: &[Decimal], mean_y: Decimal) -> Decimal {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return Decimal::ZERO;
    }
    let sum: Decimal = xs
        .iter()
        .zip(ys.iter())
        .map(|(x, y)| (*x - mean_x) * (*y - mean_y))
        .sum();
    sum / Decimal::from((n - 1) as i64)
}
