//! End-to-end run: provider, statistics engine, allocation solver.

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::AllocationError;
use crate::optimization::{optimize, AllocationResult, OptimizationRequest, SolverConfig};
use crate::statistics::{compute_statistics, PriceProvider, PriceWindow, StatisticsOutput};
use crate::types::{with_metadata, ComputationOutput};
use crate::AllocResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub statistics: StatisticsOutput,
    pub allocation: AllocationResult,
}

/// Fetch prices, estimate statistics and solve one allocation request.
///
/// Warnings from every stage are collected, in order, on the returned
/// envelope. Any error aborts the run without a partial result.
pub fn run_allocation(
    provider: &dyn PriceProvider,
    symbols: &[String],
    window: &PriceWindow,
    request: &OptimizationRequest,
    config: &SolverConfig,
) -> AllocResult<ComputationOutput<PipelineOutput>> {
    let start = Instant::now();

    if symbols.is_empty() {
        return Err(AllocationError::invalid(
            "symbols",
            "at least one symbol is required",
        ));
    }
    request.validate()?;
    config.validate()?;

    let table = provider.fetch(symbols, window)?;
    table.require_symbols(symbols)?;
    tracing::info!(symbols = symbols.len(), field = ?table.field, "prices fetched");

    let stats = compute_statistics(&table)?;
    let allocation = optimize(
        request,
        &stats.result.assets,
        &stats.result.covariance,
        config,
    )?;

    let mut warnings = stats.warnings;
    warnings.extend(allocation.warnings);

    let output = PipelineOutput {
        statistics: stats.result,
        allocation: allocation.result,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        &allocation.methodology,
        &serde_json::json!({
            "lookback_years": window.lookback_years,
            "interval": window.interval,
            "statistics": stats.assumptions,
            "allocation": allocation.assumptions,
        }),
        warnings,
        elapsed,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::Objective;
    use crate::statistics::{InMemoryProvider, PriceField, PricePoint, PriceSeries, PriceTable};
    use chrono::{Days, NaiveDate};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn series(symbol: &str, returns: &[Decimal], days: usize) -> PriceSeries {
        let base = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let mut price = dec!(100);
        let mut points = vec![PricePoint { date: base, price }];
        for t in 1..days {
            price *= Decimal::ONE + returns[(t - 1) % returns.len()];
            points.push(PricePoint {
                date: base + Days::new(t as u64),
                price,
            });
        }
        PriceSeries::new(symbol, points)
    }

    fn provider(field: PriceField) -> InMemoryProvider {
        InMemoryProvider::new(PriceTable::new(
            field,
            vec![
                series("AAA", &[dec!(0.012), dec!(-0.004), dec!(0.008), dec!(-0.002)], 41),
                series("BBB", &[dec!(-0.003), dec!(0.009), dec!(0.001), dec!(0.005)], 41),
            ],
        ))
    }

    fn request() -> OptimizationRequest {
        OptimizationRequest {
            objective: Objective::MinimizeVolatility,
            bounds: Default::default(),
            risk_free_rate: dec!(0.02),
            budget: dec!(1000),
        }
    }

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_pipeline_runs_end_to_end() {
        let out = run_allocation(
            &provider(PriceField::AdjustedClose),
            &symbols(&["AAA", "BBB"]),
            &PriceWindow::default(),
            &request(),
            &SolverConfig::default(),
        )
        .unwrap();
        assert_eq!(out.result.statistics.assets.len(), 2);
        let total: Decimal = out.result.allocation.weights().iter().copied().sum();
        assert!((total - Decimal::ONE).abs() < dec!(0.000001));
    }

    #[test]
    fn test_close_fallback_warning_reaches_output() {
        let out = run_allocation(
            &provider(PriceField::Close),
            &symbols(&["AAA", "BBB"]),
            &PriceWindow::default(),
            &request(),
            &SolverConfig::default(),
        )
        .unwrap();
        assert!(out.warnings.iter().any(|w| w.contains("close prices")));
    }

    #[test]
    fn test_missing_symbol_is_insufficient_data() {
        let err = run_allocation(
            &provider(PriceField::AdjustedClose),
            &symbols(&["AAA", "ZZZ"]),
            &PriceWindow::default(),
            &request(),
            &SolverConfig::default(),
        )
        .unwrap_err();
        match err {
            AllocationError::InsufficientData { symbols, .. } => {
                assert_eq!(symbols, vec!["ZZZ".to_string()])
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_empty_symbol_list_rejected() {
        let err = run_allocation(
            &provider(PriceField::AdjustedClose),
            &[],
            &PriceWindow::default(),
            &request(),
            &SolverConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AllocationError::InvalidInput { .. }));
    }
}
