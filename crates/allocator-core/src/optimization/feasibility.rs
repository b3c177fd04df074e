//! Target-return guardrails and feasible-region helpers.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::request::AllocationBounds;
use crate::linalg::dot;
use crate::statistics::AssetStatistics;
use crate::types::{Rate, Weight};

/// Result of checking a requested target return against the asset range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetCheck {
    pub requested: Rate,
    pub used: Rate,
    /// Non-fatal description when the target was moved.
    pub warning: Option<String>,
}

/// Clamp a target return into [min, max] of the per-asset annualised returns.
///
/// The per-asset extremes only approximate the returns reachable under the
/// allocation bounds: a clamped target may still be unreachable, and some
/// reachable targets near the extremes are moved needlessly. The solver
/// detects the former and reports incompatible constraints.
pub fn clamp_target(target: Rate, assets: &[AssetStatistics]) -> TargetCheck {
    let max = assets.iter().map(|a| a.annualized_return).max();
    let min = assets.iter().map(|a| a.annualized_return).min();
    let (Some(max), Some(min)) = (max, min) else {
        return TargetCheck {
            requested: target,
            used: target,
            warning: None,
        };
    };

    if target > max {
        TargetCheck {
            requested: target,
            used: max,
            warning: Some(format!(
                "Target return {} exceeds the highest asset return {}; target clamped to {}",
                target.round_dp(6),
                max.round_dp(6),
                max.round_dp(6)
            )),
        }
    } else if target < min {
        TargetCheck {
            requested: target,
            used: min,
            warning: Some(format!(
                "Target return {} is below the lowest asset return {}; target clamped to {}",
                target.round_dp(6),
                min.round_dp(6),
                min.round_dp(6)
            )),
        }
    } else {
        TargetCheck {
            requested: target,
            used: target,
            warning: None,
        }
    }
}

/// Extreme portfolio returns over { bounds, sum(w) = 1 }.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnRange {
    pub min: Rate,
    pub max: Rate,
    pub min_weights: Vec<Weight>,
    pub max_weights: Vec<Weight>,
}

/// Exact return range over the bounded simplex.
///
/// Every asset starts at the lower bound and the remaining budget is
/// filled greedily in order of return (descending for the maximum,
/// ascending for the minimum). Returns `None` when the bounds admit no
/// fully invested portfolio.
pub fn return_range(mu: &[Decimal], bounds: &AllocationBounds) -> Option<ReturnRange> {
    if !simplex_feasible(mu.len(), bounds) {
        return None;
    }

    let mut order: Vec<usize> = (0..mu.len()).collect();
    order.sort_by(|a, b| mu[*b].cmp(&mu[*a]).then(a.cmp(b)));
    let max_weights = greedy_fill(mu.len(), bounds, &order);

    order.sort_by(|a, b| mu[*a].cmp(&mu[*b]).then(a.cmp(b)));
    let min_weights = greedy_fill(mu.len(), bounds, &order);

    Some(ReturnRange {
        min: dot(&min_weights, mu),
        max: dot(&max_weights, mu),
        min_weights,
        max_weights,
    })
}

/// Whether `n * min <= 1 <= n * max`.
pub fn simplex_feasible(n: usize, bounds: &AllocationBounds) -> bool {
    if n == 0 {
        return false;
    }
    let n_dec = Decimal::from(n as i64);
    n_dec * bounds.min <= Decimal::ONE && n_dec * bounds.max >= Decimal::ONE
}

pub(crate) fn greedy_fill(n: usize, bounds: &AllocationBounds, order: &[usize]) -> Vec<Weight> {
    let mut w = vec![bounds.min; n];
    let mut remaining = Decimal::ONE - Decimal::from(n as i64) * bounds.min;
    let room = bounds.max - bounds.min;
    for &i in order {
        if remaining <= Decimal::ZERO {
            break;
        }
        let add = room.min(remaining);
        w[i] += add;
        remaining -= add;
    }
    w
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn asset(symbol: &str, annual: Decimal) -> AssetStatistics {
        AssetStatistics {
            symbol: symbol.into(),
            observations: 10,
            mean_daily_return: annual / dec!(252),
            annualized_return: annual,
            daily_volatility: dec!(0.01),
            annualized_volatility: dec!(0.16),
        }
    }

    #[test]
    fn test_target_above_max_is_clamped() {
        let assets = vec![asset("A", dec!(0.08)), asset("B", dec!(0.12))];
        let check = clamp_target(dec!(0.30), &assets);
        assert_eq!(check.used, dec!(0.12));
        assert!(check.warning.unwrap().contains("clamped"));
    }

    #[test]
    fn test_target_below_min_is_clamped() {
        let assets = vec![asset("A", dec!(0.08)), asset("B", dec!(0.12))];
        let check = clamp_target(dec!(-0.05), &assets);
        assert_eq!(check.used, dec!(0.08));
        assert!(check.warning.is_some());
    }

    #[test]
    fn test_target_inside_range_unchanged() {
        let assets = vec![asset("A", dec!(0.08)), asset("B", dec!(0.12))];
        let check = clamp_target(dec!(0.10), &assets);
        assert_eq!(check.used, dec!(0.10));
        assert!(check.warning.is_none());
    }

    #[test]
    fn test_return_range_respects_bounds() {
        let mu = vec![dec!(0.05), dec!(0.10), dec!(0.20)];
        let bounds = AllocationBounds::new(dec!(0.1), dec!(0.5));
        let range = return_range(&mu, &bounds).unwrap();
        // Max: 0.5 in C, 0.4 in B, 0.1 in A
        assert_eq!(range.max_weights, vec![dec!(0.1), dec!(0.4), dec!(0.5)]);
        assert_eq!(range.max, dec!(0.145));
        // Min: 0.5 in A, 0.4 in B, 0.1 in C
        assert_eq!(range.min_weights, vec![dec!(0.5), dec!(0.4), dec!(0.1)]);
        assert_eq!(range.min, dec!(0.085));
    }

    #[test]
    fn test_infeasible_bounds_have_no_range() {
        let mu = vec![dec!(0.05); 5];
        assert!(return_range(&mu, &AllocationBounds::new(dec!(0.4), dec!(0.5))).is_none());
        assert!(return_range(&mu, &AllocationBounds::new(dec!(0), dec!(0.1))).is_none());
    }
}
