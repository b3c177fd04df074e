use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::prices::{PriceField, PriceTable};
use super::returns::{sample_covariance, sample_mean, ReturnMatrix};
use crate::error::AllocationError;
use crate::linalg::sqrt;
use crate::types::{with_metadata, ComputationOutput, Rate};
use crate::AllocResult;

/// Trading days per year used for annualisation.
pub const TRADING_DAYS_PER_YEAR: Decimal = dec!(252);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Return and risk estimates for a single asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetStatistics {
    pub symbol: String,
    /// Number of daily return observations.
    pub observations: usize,
    pub mean_daily_return: Rate,
    /// mean_daily_return * 252
    pub annualized_return: Rate,
    /// Sample standard deviation of daily returns.
    pub daily_volatility: Rate,
    /// daily_volatility * sqrt(252)
    pub annualized_volatility: Rate,
}

/// Sample covariance of daily returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovarianceMatrix {
    pub symbols: Vec<String>,
    pub values: Vec<Vec<Decimal>>,
}

impl CovarianceMatrix {
    pub fn dimension(&self) -> usize {
        self.symbols.len()
    }

    pub fn get(&self, i: usize, j: usize) -> Decimal {
        self.values[i][j]
    }

    pub fn variance(&self, i: usize) -> Decimal {
        self.values[i][i]
    }

    /// Covariance scaled to annual terms (x 252).
    pub fn annualized(&self) -> Vec<Vec<Decimal>> {
        self.values
            .iter()
            .map(|row| row.iter().map(|v| *v * TRADING_DAYS_PER_YEAR).collect())
            .collect()
    }

    pub fn is_symmetric(&self, tolerance: Decimal) -> bool {
        let n = self.dimension();
        (0..n).all(|i| (0..n).all(|j| (self.values[i][j] - self.values[j][i]).abs() <= tolerance))
    }
}

/// Pairwise correlation of daily returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub symbols: Vec<String>,
    pub values: Vec<Vec<Decimal>>,
}

/// Output of the statistics engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsOutput {
    pub assets: Vec<AssetStatistics>,
    pub covariance: CovarianceMatrix,
    pub correlation: CorrelationMatrix,
    /// Daily return observations per asset.
    pub observations: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub price_field: PriceField,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Compute per-asset and pairwise return statistics from a price table.
///
/// Dates missing a price for any symbol are dropped before returns are
/// taken. Means are scaled by 252 and volatilities by sqrt(252).
pub fn compute_statistics(table: &PriceTable) -> AllocResult<ComputationOutput<StatisticsOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if let Some(w) = table.field_warning() {
        warnings.push(w);
    }

    let aligned = table.align()?;
    let returns = ReturnMatrix::from_prices(&aligned);
    let observations = returns.observations();

    if observations < 2 {
        warnings.push(format!(
            "Only {} daily return observation(s); volatility and covariance reported as zero",
            observations
        ));
    }

    let sqrt_days = sqrt(TRADING_DAYS_PER_YEAR);
    let means: Vec<Decimal> = returns.series.iter().map(|s| sample_mean(&s.returns)).collect();
    let covariance = covariance_matrix(&returns, &means);

    let assets: Vec<AssetStatistics> = returns
        .series
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let daily_volatility = sqrt(covariance.variance(i));
            AssetStatistics {
                symbol: s.symbol.clone(),
                observations: s.returns.len(),
                mean_daily_return: means[i],
                annualized_return: means[i] * TRADING_DAYS_PER_YEAR,
                daily_volatility,
                annualized_volatility: daily_volatility * sqrt_days,
            }
        })
        .collect();

    for a in &assets {
        if a.daily_volatility.is_zero() && observations >= 2 {
            warnings.push(format!(
                "{} has zero return variance (constant price over the window)",
                a.symbol
            ));
        }
    }

    let correlation = correlation_matrix(&covariance, &assets);

    let (Some(start_date), Some(end_date)) = (aligned.dates.first(), aligned.dates.last()) else {
        return Err(AllocationError::insufficient(
            "no shared trading days",
            aligned.symbols.clone(),
        ));
    };

    tracing::debug!(
        assets = assets.len(),
        observations,
        "statistics computed"
    );

    let output = StatisticsOutput {
        assets,
        covariance,
        correlation,
        observations,
        start_date: *start_date,
        end_date: *end_date,
        price_field: table.field,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Sample statistics of daily simple returns (252-day annualisation)",
        &serde_json::json!({
            "trading_days_per_year": TRADING_DAYS_PER_YEAR.to_string(),
            "covariance_estimator": "unbiased (n - 1)",
            "missing_data_policy": "inner join on date",
            "price_field": table.field,
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Upper triangle is computed and mirrored so the result is exactly symmetric.
fn covariance_matrix(returns: &ReturnMatrix, means: &[Decimal]) -> CovarianceMatrix {
    let n = returns.series.len();
    let mut values = vec![vec![Decimal::ZERO; n]; n];
    for i in 0..n {
        for j in i..n {
            let c = sample_covariance(
                &returns.series[i].returns,
                means[i],
                &returns.series[j].returns,
                means[j],
            );
            values[i][j] = c;
            values[j][i] = c;
        }
    }
    CovarianceMatrix {
        symbols: returns.series.iter().map(|s| s.symbol.clone()).collect(),
        values,
    }
}

/// Zero where either asset has zero volatility.
fn correlation_matrix(cov: &CovarianceMatrix, assets: &[AssetStatistics]) -> CorrelationMatrix {
    let n = cov.dimension();
    let values = (0..n)
        .map(|i| {
            (0..n)
                .map(|j| {
                    let denom = assets[i].daily_volatility * assets[j].daily_volatility;
                    if denom.is_zero() {
                        Decimal::ZERO
                    } else if i == j {
                        Decimal::ONE
                    } else {
                        cov.get(i, j) / denom
                    }
                })
                .collect()
        })
        .collect();
    CorrelationMatrix {
        symbols: cov.symbols.clone(),
        values,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
