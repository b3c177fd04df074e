//! Sequential quadratic programming for fully invested, bounded portfolios.
//!
//! Constraints are linear: `sum(w) = 1`, optionally `mu . w = target`, and a
//! uniform box `min <= w_i <= max`. Each iteration solves the quadratic
//! subproblem
//!
//!   min  0.5 d'Bd + g'd
//!   s.t. A d = 0,  min - w <= d <= max - w
//!
//! with a primal active-set method, then takes an Armijo step and refreshes
//! the Hessian approximation `B` with a damped BFGS update. Iterates stay
//! feasible throughout, so the line search only has to decrease the
//! objective.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::feasibility::{greedy_fill, return_range, simplex_feasible};
use super::objective::ObjectiveFn;
use super::request::{AllocationBounds, SolverConfig};
use crate::linalg::{dot, identity, mat_vec, norm_inf, solve_linear_system, sqrt};
use crate::types::{Rate, Weight};

/// Regularisation of the constraint block in KKT systems.
const KKT_RIDGE: Decimal = dec!(0.0000000000000001);
/// QP steps at or below this size count as zero.
const STEP_EPS: Decimal = dec!(0.000000000001);
const MULTIPLIER_EPS: Decimal = dec!(0.000000000001);
const BOUND_EPS: Decimal = dec!(0.000000000000001);
const TARGET_EPS: Decimal = dec!(0.0000000001);
const ARMIJO_C1: Decimal = dec!(0.0001);
const MAX_BACKTRACKS: u32 = 40;
const CURVATURE_EPS: Decimal = dec!(0.0000000000000001);
/// Hessian entries beyond this trigger a reset to the identity.
const HESSIAN_LIMIT: Decimal = dec!(1000000000000);
/// A failed line search along a step this small is treated as stationarity.
const STATIONARY_STEP: Decimal = dec!(0.000001);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Termination status, modelled on the SLSQP exit modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitMode {
    Converged,
    IncompatibleConstraints,
    SingularSubproblem,
    SubproblemIterationLimit,
    LineSearchFailed,
    IterationLimit,
}

impl ExitMode {
    pub fn is_success(&self) -> bool {
        matches!(self, ExitMode::Converged)
    }

    pub fn message(&self) -> &'static str {
        match self {
            ExitMode::Converged => "Optimization terminated successfully",
            ExitMode::IncompatibleConstraints => "Inequality constraints incompatible",
            ExitMode::SingularSubproblem => "Singular matrix in quadratic subproblem",
            ExitMode::SubproblemIterationLimit => "Iteration limit reached in quadratic subproblem",
            ExitMode::LineSearchFailed => "Positive directional derivative for linesearch",
            ExitMode::IterationLimit => "Iteration limit reached",
        }
    }
}

impl fmt::Display for ExitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// One constrained minimisation.
pub struct Problem<'a> {
    pub objective: &'a dyn ObjectiveFn,
    /// Annualised expected returns, one per asset.
    pub expected_returns: &'a [Rate],
    pub bounds: AllocationBounds,
    /// Adds `mu . w = target` when set.
    pub target_return: Option<Rate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverOutcome {
    /// Last iterate; empty when no feasible start exists.
    pub weights: Vec<Weight>,
    pub objective_value: Decimal,
    pub iterations: u32,
    pub exit: ExitMode,
}

impl SolverOutcome {
    pub fn converged(&self) -> bool {
        self.exit.is_success()
    }

    fn failed(exit: ExitMode) -> Self {
        SolverOutcome {
            weights: Vec::new(),
            objective_value: Decimal::ZERO,
            iterations: 0,
            exit,
        }
    }
}

/// Numeric method used by the allocator.
pub trait ConstrainedSolver {
    fn solve(&self, problem: &Problem<'_>, config: &SolverConfig) -> SolverOutcome;
}

/// Gradient-based SQP solver with bound and linear equality constraints.
#[derive(Debug, Clone, Copy, Default)]
pub struct Slsqp;

impl ConstrainedSolver for Slsqp {
    fn solve(&self, problem: &Problem<'_>, config: &SolverConfig) -> SolverOutcome {
        let start = match feasible_start(problem) {
            Ok(w) => w,
            Err(exit) => {
                tracing::debug!(%exit, "no feasible starting point");
                return SolverOutcome::failed(exit);
            }
        };
        let start = if problem.objective.is_penalized(&start) {
            leave_penalty(problem, start)
        } else {
            start
        };
        let rows = constraint_rows(problem);
        sqp(problem, &rows, start, config)
    }
}

// ---------------------------------------------------------------------------
// Outer SQP loop
// ---------------------------------------------------------------------------

fn sqp(
    problem: &Problem<'_>,
    rows: &[Vec<Decimal>],
    start: Vec<Weight>,
    config: &SolverConfig,
) -> SolverOutcome {
    let n = start.len();
    let lo = problem.bounds.min;
    let hi = problem.bounds.max;
    let objective = problem.objective;
    let step_tolerance = sqrt(config.tolerance);
    let qp_limit = 10 * (n + rows.len()) + 20;

    let mut w = start;
    let mut f = objective.value(&w);
    let mut g = objective.gradient(&w);
    let mut hessian = identity(n);

    let finish = |w: Vec<Weight>, f: Decimal, iterations: u32, exit: ExitMode| {
        // A stationary point on the penalty plateau is not a minimum.
        let exit = if exit.is_success() && objective.is_penalized(&w) {
            ExitMode::LineSearchFailed
        } else {
            exit
        };
        tracing::debug!(iterations, %exit, objective = %f, "sqp finished");
        SolverOutcome {
            weights: w,
            objective_value: f,
            iterations,
            exit,
        }
    };

    for iter in 1..=config.max_iterations {
        let lower: Vec<Decimal> = w.iter().map(|wi| lo - *wi).collect();
        let upper: Vec<Decimal> = w.iter().map(|wi| hi - *wi).collect();

        let d = match solve_qp(&hessian, &g, rows, &lower, &upper, qp_limit) {
            Ok(d) => d,
            Err(exit) => return finish(w, f, iter, exit),
        };

        let d_norm = norm_inf(&d);
        if d_norm <= config.tolerance {
            return finish(w, f, iter, ExitMode::Converged);
        }

        let slope = dot(&g, &d);
        if slope >= Decimal::ZERO {
            let exit = if d_norm <= STATIONARY_STEP {
                ExitMode::Converged
            } else {
                ExitMode::LineSearchFailed
            };
            return finish(w, f, iter, exit);
        }

        let mut alpha = Decimal::ONE;
        let mut accepted = None;
        for _ in 0..MAX_BACKTRACKS {
            let trial = step_within_bounds(&w, &d, alpha, lo, hi);
            let f_trial = objective.value(&trial);
            if f_trial <= f + ARMIJO_C1 * alpha * slope {
                accepted = Some((trial, f_trial));
                break;
            }
            alpha /= dec!(2);
        }

        let Some((w_new, f_new)) = accepted else {
            let exit = if d_norm <= STATIONARY_STEP {
                ExitMode::Converged
            } else {
                ExitMode::LineSearchFailed
            };
            return finish(w, f, iter, exit);
        };

        let g_new = objective.gradient(&w_new);
        let s: Vec<Decimal> = w_new.iter().zip(w.iter()).map(|(a, b)| *a - *b).collect();
        let y: Vec<Decimal> = g_new.iter().zip(g.iter()).map(|(a, b)| *a - *b).collect();
        let f_change = (f_new - f).abs();
        let step_size = norm_inf(&s);

        tracing::trace!(
            iteration = iter,
            objective = %f_new,
            step = %step_size,
            alpha = %alpha,
            "sqp step"
        );

        w = w_new;
        f = f_new;
        g = g_new;

        if f_change <= config.tolerance && step_size <= step_tolerance {
            return finish(w, f, iter, ExitMode::Converged);
        }

        damped_bfgs_update(&mut hessian, &s, &y);
    }

    finish(w, f, config.max_iterations, ExitMode::IterationLimit)
}

fn step_within_bounds(
    w: &[Decimal],
    d: &[Decimal],
    alpha: Decimal,
    lo: Decimal,
    hi: Decimal,
) -> Vec<Decimal> {
    w.iter()
        .zip(d.iter())
        .map(|(wi, di)| (*wi + alpha * *di).max(lo).min(hi))
        .collect()
}

/// Powell-damped BFGS update keeping the approximation positive definite.
#[allow(clippy::needless_range_loop)]
fn damped_bfgs_update(h: &mut Vec<Vec<Decimal>>, s: &[Decimal], y: &[Decimal]) {
    let n = s.len();
    let hs = mat_vec(h, s);
    let shs = dot(s, &hs);
    if shs <= CURVATURE_EPS {
        return;
    }

    let mut y = y.to_vec();
    let mut sy = dot(s, &y);
    if sy < dec!(0.2) * shs {
        let theta = dec!(0.8) * shs / (shs - sy);
        y = y
            .iter()
            .zip(hs.iter())
            .map(|(yi, hsi)| theta * *yi + (Decimal::ONE - theta) * *hsi)
            .collect();
        sy = dot(s, &y);
    }
    if sy <= CURVATURE_EPS {
        return;
    }

    // Rank-one terms this large would swamp the approximation.
    let term = |v: &[Decimal], denom: Decimal| {
        let m = norm_inf(v);
        m.checked_mul(m).and_then(|sq| sq.checked_div(denom))
    };
    match (term(&y, sy), term(&hs, shs)) {
        (Some(a), Some(b)) if a <= HESSIAN_LIMIT && b <= HESSIAN_LIMIT => {}
        _ => {
            *h = identity(n);
            return;
        }
    }

    for i in 0..n {
        for j in 0..n {
            h[i][j] += y[i] * y[j] / sy - hs[i] * hs[j] / shs;
        }
    }

    if h.iter().flatten().any(|v| v.abs() > HESSIAN_LIMIT) {
        *h = identity(n);
    }
}

// ---------------------------------------------------------------------------
// Starting point and constraints
// ---------------------------------------------------------------------------

/// Equality constraint rows: budget, then target return when requested.
fn constraint_rows(problem: &Problem<'_>) -> Vec<Vec<Decimal>> {
    let n = problem.expected_returns.len();
    let mut rows = vec![vec![Decimal::ONE; n]];
    if problem.target_return.is_some() {
        rows.push(problem.expected_returns.to_vec());
    }
    rows
}

/// Uniform allocation when feasible; otherwise the closest blend of the
/// uniform allocation and an extreme-return corner that hits the target.
fn feasible_start(problem: &Problem<'_>) -> Result<Vec<Weight>, ExitMode> {
    let mu = problem.expected_returns;
    let n = mu.len();
    if !simplex_feasible(n, &problem.bounds) {
        return Err(ExitMode::IncompatibleConstraints);
    }

    let uniform = vec![Decimal::ONE / Decimal::from(n as i64); n];
    let Some(target) = problem.target_return else {
        return Ok(uniform);
    };

    let uniform_ret = dot(&uniform, mu);
    if (uniform_ret - target).abs() <= TARGET_EPS {
        return Ok(uniform);
    }

    let range = return_range(mu, &problem.bounds).ok_or(ExitMode::IncompatibleConstraints)?;
    if target > range.max + TARGET_EPS || target < range.min - TARGET_EPS {
        return Err(ExitMode::IncompatibleConstraints);
    }

    let (corner, corner_ret) = if target > uniform_ret {
        (&range.max_weights, range.max)
    } else {
        (&range.min_weights, range.min)
    };
    let span = corner_ret - uniform_ret;
    if span.abs() <= TARGET_EPS {
        return Ok(corner.clone());
    }
    let lambda = ((target - uniform_ret) / span)
        .max(Decimal::ZERO)
        .min(Decimal::ONE);
    Ok(uniform
        .iter()
        .zip(corner.iter())
        .map(|(u, c)| *u + lambda * (*c - *u))
        .collect())
}

/// Best vertex of the bounded simplex off the penalty plateau.
///
/// Vertex `i` gives asset `i` as much weight as the bounds allow and fills
/// the rest by descending return. Keeps `start` when a target return is set,
/// since vertices need not meet it, or when every vertex is penalised.
fn leave_penalty(problem: &Problem<'_>, start: Vec<Weight>) -> Vec<Weight> {
    if problem.target_return.is_some() {
        return start;
    }
    let mu = problem.expected_returns;
    let n = mu.len();
    let mut by_return: Vec<usize> = (0..n).collect();
    by_return.sort_by(|a, b| mu[*b].cmp(&mu[*a]).then(a.cmp(b)));

    let mut best: Option<(Decimal, Vec<Weight>)> = None;
    for lead in 0..n {
        let order: Vec<usize> = std::iter::once(lead)
            .chain(by_return.iter().copied().filter(|i| *i != lead))
            .collect();
        let vertex = greedy_fill(n, &problem.bounds, &order);
        if problem.objective.is_penalized(&vertex) {
            continue;
        }
        let f = problem.objective.value(&vertex);
        if best.as_ref().map_or(true, |(bf, _)| f < *bf) {
            best = Some((f, vertex));
        }
    }

    match best {
        Some((f, vertex)) => {
            tracing::debug!(objective = %f, "start on penalty plateau, moved to vertex");
            vertex
        }
        None => start,
    }
}

// ---------------------------------------------------------------------------
// Quadratic subproblem
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoundState {
    Free,
    AtLower,
    AtUpper,
    /// Lower and upper bound coincide.
    Pinned,
}

/// Primal active-set method for
///   min 0.5 d'Hd + c'd  s.t.  rows * d = 0,  lower <= d <= upper
/// started from d = 0, which must satisfy the bounds.
#[allow(clippy::needless_range_loop)]
fn solve_qp(
    h: &[Vec<Decimal>],
    c: &[Decimal],
    rows: &[Vec<Decimal>],
    lower: &[Decimal],
    upper: &[Decimal],
    max_iter: usize,
) -> Result<Vec<Decimal>, ExitMode> {
    let n = c.len();
    let mut d = vec![Decimal::ZERO; n];
    let mut state = vec![BoundState::Free; n];

    for j in 0..n {
        if upper[j] - lower[j] <= BOUND_EPS {
            state[j] = BoundState::Pinned;
            d[j] = lower[j];
        } else if lower[j] >= -BOUND_EPS {
            state[j] = BoundState::AtLower;
            d[j] = lower[j];
        } else if upper[j] <= BOUND_EPS {
            state[j] = BoundState::AtUpper;
            d[j] = upper[j];
        }
    }

    for _ in 0..max_iter {
        let grad: Vec<Decimal> = mat_vec(h, &d)
            .iter()
            .zip(c.iter())
            .map(|(hd, ci)| *hd + *ci)
            .collect();
        let free: Vec<usize> = (0..n).filter(|j| state[*j] == BoundState::Free).collect();

        let (p, lambda) = kkt_step(h, &grad, rows, &free).ok_or(ExitMode::SingularSubproblem)?;

        if norm_inf(&p) <= STEP_EPS {
            // Stationary on the working set: release the bound with the
            // most negative multiplier, if any.
            let mut worst: Option<(usize, Decimal)> = None;
            for j in 0..n {
                let r = grad[j]
                    + rows
                        .iter()
                        .zip(lambda.iter())
                        .map(|(row, l)| row[j] * *l)
                        .sum::<Decimal>();
                let violation = match state[j] {
                    BoundState::AtLower => -r,
                    BoundState::AtUpper => r,
                    BoundState::Free | BoundState::Pinned => continue,
                };
                if violation > MULTIPLIER_EPS && worst.map_or(true, |(_, v)| violation > v) {
                    worst = Some((j, violation));
                }
            }
            match worst {
                None => return Ok(d),
                Some((j, _)) => state[j] = BoundState::Free,
            }
            continue;
        }

        let mut alpha = Decimal::ONE;
        let mut blocking: Option<(usize, BoundState)> = None;
        for (k, &j) in free.iter().enumerate() {
            let pj = p[k];
            if pj.is_zero() {
                continue;
            }
            let (ratio, side) = if pj < Decimal::ZERO {
                ((lower[j] - d[j]) / pj, BoundState::AtLower)
            } else {
                ((upper[j] - d[j]) / pj, BoundState::AtUpper)
            };
            let ratio = ratio.max(Decimal::ZERO);
            if ratio < alpha {
                alpha = ratio;
                blocking = Some((j, side));
            }
        }

        for (k, &j) in free.iter().enumerate() {
            d[j] += alpha * p[k];
        }
        if let Some((j, side)) = blocking {
            state[j] = side;
            d[j] = if side == BoundState::AtLower {
                lower[j]
            } else {
                upper[j]
            };
        }
    }

    Err(ExitMode::SubproblemIterationLimit)
}

/// Solve the equality-constrained step on the free variables:
///
///   [ H_FF  A_F' ] [ p      ]   [ -grad_F ]
///   [ A_F   -eI  ] [ lambda ] = [   0     ]
///
/// The small ridge keeps the system solvable when the free columns of A
/// are rank deficient; lambda then is the least-squares multiplier.
fn kkt_step(
    h: &[Vec<Decimal>],
    grad: &[Decimal],
    rows: &[Vec<Decimal>],
    free: &[usize],
) -> Option<(Vec<Decimal>, Vec<Decimal>)> {
    let k = free.len();
    let m = rows.len();
    let size = k + m;
    let mut a = vec![vec![Decimal::ZERO; size]; size];
    let mut b = vec![Decimal::ZERO; size];

    for (r, &i) in free.iter().enumerate() {
        for (c, &j) in free.iter().enumerate() {
            a[r][c] = h[i][j];
        }
        for (e, row) in rows.iter().enumerate() {
            a[r][k + e] = row[i];
            a[k + e][r] = row[i];
        }
        b[r] = -grad[i];
    }
    for e in 0..m {
        a[k + e][k + e] = -KKT_RIDGE;
    }

    let x = solve_linear_system(a, b)?;
    Some((x[..k].to_vec(), x[k..].to_vec()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::objective::PortfolioObjective;
    use crate::optimization::request::Objective;
    use pretty_assertions::assert_eq;

    fn two_asset() -> (Vec<Decimal>, Vec<Vec<Decimal>>) {
        // 20% and 10% vol, correlation 0.3
        let mu = vec![dec!(0.10), dec!(0.06)];
        let sigma = vec![vec![dec!(0.04), dec!(0.006)], vec![dec!(0.006), dec!(0.01)]];
        (mu, sigma)
    }

    fn three_asset() -> (Vec<Decimal>, Vec<Vec<Decimal>>) {
        let mu = vec![dec!(0.10), dec!(0.04), dec!(0.07)];
        let sigma = vec![
            vec![dec!(0.0225), dec!(0.009), dec!(0.00375)],
            vec![dec!(0.009), dec!(0.04), dec!(0.025)],
            vec![dec!(0.00375), dec!(0.025), dec!(0.0625)],
        ];
        (mu, sigma)
    }

    fn solve(
        objective: Objective,
        mu: &[Decimal],
        sigma: &[Vec<Decimal>],
        bounds: AllocationBounds,
    ) -> SolverOutcome {
        let f = PortfolioObjective::new(objective, mu, sigma, dec!(0.02), dec!(0.00000001));
        let problem = Problem {
            objective: &f,
            expected_returns: mu,
            bounds,
            target_return: objective.target(),
        };
        Slsqp.solve(&problem, &SolverConfig::default())
    }

    #[test]
    fn test_qp_box_and_budget() {
        // min 0.5|d|^2 + d1 - d2, d1 + d2 = 0, |d_i| <= 0.5
        let h = identity(2);
        let c = vec![dec!(1), dec!(-1)];
        let rows = vec![vec![dec!(1), dec!(1)]];
        let lower = vec![dec!(-0.5), dec!(-0.5)];
        let upper = vec![dec!(0.5), dec!(0.5)];
        let d = solve_qp(&h, &c, &rows, &lower, &upper, 50).unwrap();
        assert_eq!(d, vec![dec!(-0.5), dec!(0.5)]);
    }

    #[test]
    fn test_qp_interior_solution() {
        // min 0.5|d|^2 + 0.2 d1, d1 + d2 = 0 => d = (-0.1, 0.1)
        let h = identity(2);
        let c = vec![dec!(0.2), dec!(0)];
        let rows = vec![vec![dec!(1), dec!(1)]];
        let lower = vec![dec!(-1), dec!(-1)];
        let upper = vec![dec!(1), dec!(1)];
        let d = solve_qp(&h, &c, &rows, &lower, &upper, 50).unwrap();
        assert!((d[0] + dec!(0.1)).abs() < dec!(0.000000001));
        assert!((d[1] - dec!(0.1)).abs() < dec!(0.000000001));
    }

    #[test]
    fn test_two_asset_min_variance_matches_closed_form() {
        let (mu, sigma) = two_asset();
        let out = solve(
            Objective::MinimizeVolatility,
            &mu,
            &sigma,
            AllocationBounds::default(),
        );
        assert!(out.converged(), "exit: {}", out.exit);
        // w_A = (s_B^2 - s_AB) / (s_A^2 + s_B^2 - 2 s_AB) = 0.004 / 0.038
        let expected = dec!(0.004) / dec!(0.038);
        assert!(
            (out.weights[0] - expected).abs() < dec!(0.0001),
            "w_A = {}, expected {}",
            out.weights[0],
            expected
        );
        let total: Decimal = out.weights.iter().sum();
        assert!((total - Decimal::ONE).abs() < dec!(0.000001));
    }

    #[test]
    fn test_active_lower_bound() {
        let (mu, sigma) = two_asset();
        let out = solve(
            Objective::MinimizeVolatility,
            &mu,
            &sigma,
            AllocationBounds::new(dec!(0.2), dec!(1)),
        );
        assert!(out.converged(), "exit: {}", out.exit);
        assert!((out.weights[0] - dec!(0.2)).abs() < dec!(0.000001));
    }

    #[test]
    fn test_target_return_equality_holds() {
        let (mu, sigma) = three_asset();
        let target = dec!(0.08);
        let out = solve(
            Objective::TargetReturn { target },
            &mu,
            &sigma,
            AllocationBounds::default(),
        );
        assert!(out.converged(), "exit: {}", out.exit);
        let ret = dot(&out.weights, &mu);
        assert!((ret - target).abs() < dec!(0.00000001), "return {}", ret);
        let total: Decimal = out.weights.iter().sum();
        assert!((total - Decimal::ONE).abs() < dec!(0.000001));
        for w in &out.weights {
            assert!(*w >= -dec!(0.000000001));
        }
    }

    #[test]
    fn test_max_sharpe_beats_uniform() {
        let (mu, sigma) = three_asset();
        let out = solve(
            Objective::MaximizeSharpe,
            &mu,
            &sigma,
            AllocationBounds::default(),
        );
        assert!(out.converged(), "exit: {}", out.exit);
        let f = PortfolioObjective::new(
            Objective::MaximizeSharpe,
            &mu,
            &sigma,
            dec!(0.02),
            dec!(0.00000001),
        );
        let uniform = vec![Decimal::ONE / dec!(3); 3];
        assert!(out.objective_value < f.value(&uniform));
    }

    #[test]
    fn test_incompatible_bounds_detected() {
        let mu = vec![dec!(0.05), dec!(0.06), dec!(0.07), dec!(0.08), dec!(0.09)];
        let sigma: Vec<Vec<Decimal>> = (0..5)
            .map(|i| (0..5).map(|j| if i == j { dec!(0.04) } else { Decimal::ZERO }).collect())
            .collect();
        let out = solve(
            Objective::TargetReturn { target: dec!(0.09) },
            &mu,
            &sigma,
            AllocationBounds::new(dec!(0.40), dec!(0.50)),
        );
        assert_eq!(out.exit, ExitMode::IncompatibleConstraints);
        assert!(out.weights.is_empty());
    }

    #[test]
    fn test_unreachable_target_under_bounds() {
        // Every asset pinned at 0.2: only the average return is reachable.
        let mu = vec![dec!(0.05), dec!(0.06), dec!(0.07), dec!(0.08), dec!(0.09)];
        let sigma: Vec<Vec<Decimal>> = (0..5)
            .map(|i| (0..5).map(|j| if i == j { dec!(0.04) } else { Decimal::ZERO }).collect())
            .collect();
        let out = solve(
            Objective::TargetReturn { target: dec!(0.09) },
            &mu,
            &sigma,
            AllocationBounds::new(dec!(0.20), dec!(1)),
        );
        assert_eq!(out.exit, ExitMode::IncompatibleConstraints);
    }

    #[test]
    fn test_feasible_start_hits_target() {
        let (mu, sigma) = three_asset();
        let f = PortfolioObjective::new(
            Objective::MinimizeVolatility,
            &mu,
            &sigma,
            Decimal::ZERO,
            dec!(0.00000001),
        );
        let problem = Problem {
            objective: &f,
            expected_returns: &mu,
            bounds: AllocationBounds::new(dec!(0.1), dec!(0.6)),
            target_return: Some(dec!(0.09)),
        };
        let w = feasible_start(&problem).unwrap();
        assert!((dot(&w, &mu) - dec!(0.09)).abs() < dec!(0.0000000001));
        let total: Decimal = w.iter().sum();
        assert!((total - Decimal::ONE).abs() < dec!(0.0000000001));
        for wi in &w {
            assert!(*wi >= dec!(0.1) && *wi <= dec!(0.6));
        }
    }

    #[test]
    fn test_sharpe_leaves_zero_volatility_start() {
        // Mirror-image assets: the uniform mix has no risk at all.
        let mu = vec![dec!(0.10), dec!(-0.10)];
        let sigma = vec![vec![dec!(0.04), dec!(-0.04)], vec![dec!(-0.04), dec!(0.04)]];
        let out = solve(
            Objective::MaximizeSharpe,
            &mu,
            &sigma,
            AllocationBounds::default(),
        );
        assert!(out.converged(), "exit: {}", out.exit);
        assert!(out.weights[0] > dec!(0.999), "weights {:?}", out.weights);
        // (0.10 - 0.02) / 0.2
        assert!((out.objective_value + dec!(0.4)).abs() < dec!(0.000001));
    }

    #[test]
    fn test_sharpe_without_any_risk_is_not_converged() {
        let mu = vec![dec!(0.05), dec!(0.06)];
        let sigma = vec![vec![Decimal::ZERO; 2]; 2];
        let out = solve(
            Objective::MaximizeSharpe,
            &mu,
            &sigma,
            AllocationBounds::default(),
        );
        assert!(!out.converged());
        assert_eq!(out.exit, ExitMode::LineSearchFailed);
    }

    #[test]
    fn test_bfgs_update_keeps_positive_curvature() {
        let mut h = identity(2);
        // Negative curvature pair is damped rather than applied raw.
        damped_bfgs_update(&mut h, &[dec!(0.1), dec!(0)], &[dec!(-0.05), dec!(0)]);
        let s = [dec!(0.1), dec!(0)];
        assert!(dot(&s, &mat_vec(&h, &s)) > Decimal::ZERO);
    }
}
