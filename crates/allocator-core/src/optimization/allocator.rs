use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::feasibility::clamp_target;
use super::objective::PortfolioObjective;
use super::request::{AllocationBounds, Objective, OptimizationRequest, SolverConfig};
use super::slsqp::{ConstrainedSolver, Problem, Slsqp, SolverOutcome};
use crate::error::AllocationError;
use crate::linalg::{dot, mat_vec, sqrt};
use crate::statistics::{AssetStatistics, CovarianceMatrix};
use crate::types::{with_metadata, ComputationOutput, Money, Rate, Weight};
use crate::AllocResult;

/// Weights above this share of the budget are flagged.
const CONCENTRATION_LIMIT: Weight = dec!(0.40);

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Lifecycle of one allocation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStage {
    Received,
    StatisticsComputed,
    Solving,
    RelaxedRetry,
    Succeeded,
    Failed,
}

impl SolveStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SolveStage::Succeeded | SolveStage::Failed)
    }
}

/// Transition function of the solve state machine.
///
/// `converged` is only consulted from `Solving` and `RelaxedRetry`.
/// `retry_allowed` decides whether a failed primary solve gets one relaxed
/// retry. Terminal stages map to themselves.
pub fn next_stage(current: SolveStage, converged: bool, retry_allowed: bool) -> SolveStage {
    match current {
        SolveStage::Received => SolveStage::StatisticsComputed,
        SolveStage::StatisticsComputed => SolveStage::Solving,
        SolveStage::Solving if converged => SolveStage::Succeeded,
        SolveStage::Solving if retry_allowed => SolveStage::RelaxedRetry,
        SolveStage::Solving => SolveStage::Failed,
        SolveStage::RelaxedRetry if converged => SolveStage::Succeeded,
        SolveStage::RelaxedRetry => SolveStage::Failed,
        SolveStage::Succeeded | SolveStage::Failed => current,
    }
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetAllocation {
    pub symbol: String,
    pub weight: Weight,
    /// weight * budget
    pub investment: Money,
    /// weight * annualised return
    pub contribution_to_return: Rate,
    /// Euler decomposition: w_i (Sigma w)_i / volatility. Sums to the
    /// portfolio volatility.
    pub contribution_to_risk: Rate,
}

/// Final allocation for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub allocations: Vec<AssetAllocation>,
    pub expected_return: Rate,
    pub expected_volatility: Rate,
    pub sharpe_ratio: Decimal,
    pub budget: Money,
    /// Bounds in force for the accepted solve (relaxed when `relaxed`).
    pub bounds_applied: AllocationBounds,
    pub relaxed: bool,
    /// Target actually passed to the solver, after clamping.
    pub target_return_used: Option<Rate>,
    /// Solver iterations of the accepted attempt.
    pub iterations: u32,
    pub stage_history: Vec<SolveStage>,
}

impl AllocationResult {
    pub fn weights(&self) -> Vec<Weight> {
        self.allocations.iter().map(|a| a.weight).collect()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Solve a mean-variance allocation with the built-in SQP solver.
pub fn optimize(
    request: &OptimizationRequest,
    assets: &[AssetStatistics],
    covariance: &CovarianceMatrix,
    config: &SolverConfig,
) -> AllocResult<ComputationOutput<AllocationResult>> {
    optimize_with(&Slsqp, request, assets, covariance, config)
}

/// Solve a mean-variance allocation with an injected solver.
///
/// The solver sees annualised returns and an annualised covariance. A
/// failed `TargetReturn` solve is retried once with relaxed bounds when
/// `config.relaxation_enabled`; every other failure is final.
pub fn optimize_with<S: ConstrainedSolver + ?Sized>(
    solver: &S,
    request: &OptimizationRequest,
    assets: &[AssetStatistics],
    covariance: &CovarianceMatrix,
    config: &SolverConfig,
) -> AllocResult<ComputationOutput<AllocationResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    request.validate()?;
    config.validate()?;
    validate_inputs(assets, covariance)?;

    let n = assets.len();
    let mut stage = SolveStage::Received;
    let mut stage_history = vec![stage];
    stage = next_stage(stage, false, false);
    stage_history.push(stage);

    let (objective, target_return_used) = match request.objective {
        Objective::TargetReturn { target } => {
            let check = clamp_target(target, assets);
            if let Some(w) = check.warning {
                tracing::warn!(requested = %check.requested, used = %check.used, "target return clamped");
                warnings.push(w);
            }
            (
                Objective::TargetReturn { target: check.used },
                Some(check.used),
            )
        }
        other => (other, None),
    };

    let mu: Vec<Decimal> = assets.iter().map(|a| a.annualized_return).collect();
    let sigma = covariance.annualized();
    let function = PortfolioObjective::new(
        objective,
        &mu,
        &sigma,
        request.risk_free_rate,
        config.volatility_floor,
    );
    let retry_allowed =
        matches!(objective, Objective::TargetReturn { .. }) && config.relaxation_enabled;

    let mut bounds = request.bounds;
    let mut attempts: u32 = 0;
    let mut last: Option<SolverOutcome> = None;

    stage = next_stage(stage, false, retry_allowed);
    stage_history.push(stage);

    while !stage.is_terminal() {
        if stage == SolveStage::RelaxedRetry {
            bounds = request.bounds.relaxed();
        }
        let problem = Problem {
            objective: &function,
            expected_returns: &mu,
            bounds,
            target_return: target_return_used,
        };
        let outcome = solver.solve(&problem, config);
        attempts += 1;

        let converged = outcome.converged() && outcome.weights.len() == n;
        let next = next_stage(stage, converged, retry_allowed);
        if next == SolveStage::RelaxedRetry {
            let relaxed = request.bounds.relaxed();
            tracing::warn!(
                exit = %outcome.exit,
                min = %relaxed.min,
                max = %relaxed.max,
                "primary solve failed, retrying with relaxed bounds"
            );
            warnings.push(format!(
                "Primary solve failed ({}); retried with relaxed bounds [{}, {}]",
                outcome.exit,
                relaxed.min,
                relaxed.max
            ));
        }
        tracing::info!(from = ?stage, to = ?next, attempt = attempts, "solve stage transition");
        stage = next;
        stage_history.push(stage);
        last = Some(outcome);
    }

    let outcome = match (stage, last) {
        (SolveStage::Succeeded, Some(outcome)) => outcome,
        (_, last) => {
            let message = last
                .map(|o| o.exit.to_string())
                .unwrap_or_else(|| "solver did not run".to_string());
            return Err(AllocationError::Optimization { message, attempts });
        }
    };

    let relaxed = stage_history.contains(&SolveStage::RelaxedRetry);
    let weights = normalize_weights(&outcome.weights, &bounds);

    let sigma_w = mat_vec(&sigma, &weights);
    let expected_return = dot(&weights, &mu);
    let expected_volatility = sqrt(dot(&weights, &sigma_w));
    let sharpe_ratio = if expected_volatility < config.volatility_floor {
        Decimal::ZERO
    } else {
        (expected_return - request.risk_free_rate) / expected_volatility
    };

    let allocations: Vec<AssetAllocation> = assets
        .iter()
        .enumerate()
        .map(|(i, a)| AssetAllocation {
            symbol: a.symbol.clone(),
            weight: weights[i],
            investment: weights[i] * request.budget,
            contribution_to_return: weights[i] * mu[i],
            contribution_to_risk: if expected_volatility.is_zero() {
                Decimal::ZERO
            } else {
                weights[i] * sigma_w[i] / expected_volatility
            },
        })
        .collect();

    for a in &allocations {
        if a.weight > CONCENTRATION_LIMIT {
            warnings.push(format!(
                "Concentrated position: {} has weight {:.4}",
                a.symbol, a.weight
            ));
        }
    }

    tracing::info!(
        objective = objective.label(),
        attempts,
        relaxed,
        expected_return = %expected_return,
        expected_volatility = %expected_volatility,
        "allocation solved"
    );

    let result = AllocationResult {
        allocations,
        expected_return,
        expected_volatility,
        sharpe_ratio,
        budget: request.budget,
        bounds_applied: bounds,
        relaxed,
        target_return_used,
        iterations: outcome.iterations,
        stage_history,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Mean-variance optimisation (SQP with damped BFGS, 252-day annualisation)",
        &serde_json::json!({
            "objective": objective.label(),
            "risk_free_rate": request.risk_free_rate.to_string(),
            "bounds_requested": request.bounds,
            "bounds_applied": bounds,
            "attempts": attempts,
            "solver_exit": outcome.exit,
            "annualisation": "mean x 252, covariance x 252",
        }),
        warnings,
        elapsed,
        result,
    ))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn validate_inputs(assets: &[AssetStatistics], covariance: &CovarianceMatrix) -> AllocResult<()> {
    if assets.is_empty() {
        return Err(AllocationError::invalid(
            "assets",
            "at least one asset is required",
        ));
    }
    let n = assets.len();
    if covariance.dimension() != n
        || covariance.values.len() != n
        || covariance.values.iter().any(|row| row.len() != n)
    {
        return Err(AllocationError::invalid(
            "covariance",
            format!("expected a {n}x{n} matrix"),
        ));
    }
    for (a, sym) in assets.iter().zip(covariance.symbols.iter()) {
        if &a.symbol != sym {
            return Err(AllocationError::invalid(
                "covariance.symbols",
                format!("{} does not match asset order ({})", sym, a.symbol),
            ));
        }
    }
    Ok(())
}

/// Clamp solver noise into `bounds`, then spread the residual `1 - sum(w)`
/// over the available room so the weights stay inside the bounds.
fn normalize_weights(raw: &[Weight], bounds: &AllocationBounds) -> Vec<Weight> {
    let mut w: Vec<Weight> = raw
        .iter()
        .map(|x| (*x).max(bounds.min).min(bounds.max))
        .collect();
    let residual = Decimal::ONE - w.iter().copied().sum::<Decimal>();
    if residual.is_zero() {
        return w;
    }

    let capacity: Vec<Decimal> = if residual > Decimal::ZERO {
        w.iter().map(|x| bounds.max - *x).collect()
    } else {
        w.iter().map(|x| *x - bounds.min).collect()
    };
    let total: Decimal = capacity.iter().copied().sum();

    if total.is_zero() {
        let sum: Decimal = w.iter().copied().sum();
        if !sum.is_zero() {
            for x in w.iter_mut() {
                *x /= sum;
            }
        }
        return w;
    }

    let share = (residual / total).max(dec!(-1)).min(Decimal::ONE);
    // share has the sign of the residual and |share| <= 1, so each weight
    // moves at most to the bound its capacity was measured against
    for (x, c) in w.iter_mut().zip(capacity.iter()) {
        *x += share * *c;
    }
    w
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
