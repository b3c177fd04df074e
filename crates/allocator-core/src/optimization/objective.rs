//! Objective functions and their analytic gradients.
//!
//! Inputs are annualised: `mu` is the vector of annualised mean returns and
//! `sigma` the annualised covariance matrix, so Sharpe ratios compare
//! directly with an annual risk-free rate.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::request::Objective;
use crate::linalg::{dot, mat_vec, quad_form, sqrt};
use crate::types::Rate;

/// Objective value returned for a Sharpe evaluation at (near) zero volatility.
pub const SHARPE_PENALTY: Decimal = dec!(1000000);

/// A differentiable function of the weight vector.
pub trait ObjectiveFn {
    fn value(&self, w: &[Decimal]) -> Decimal;
    fn gradient(&self, w: &[Decimal]) -> Vec<Decimal>;

    /// True when `value(w)` is a penalty rather than the objective itself.
    /// Such points are never optimal.
    fn is_penalized(&self, _w: &[Decimal]) -> bool {
        false
    }
}

/// Mean-variance objective selected by `Objective`.
#[derive(Debug, Clone)]
pub struct PortfolioObjective<'a> {
    objective: Objective,
    mu: &'a [Decimal],
    sigma: &'a [Vec<Decimal>],
    risk_free_rate: Rate,
    volatility_floor: Decimal,
}

impl<'a> PortfolioObjective<'a> {
    pub fn new(
        objective: Objective,
        mu: &'a [Decimal],
        sigma: &'a [Vec<Decimal>],
        risk_free_rate: Rate,
        volatility_floor: Decimal,
    ) -> Self {
        PortfolioObjective {
            objective,
            mu,
            sigma,
            risk_free_rate,
            volatility_floor,
        }
    }

    fn neg_sharpe(&self, w: &[Decimal]) -> Decimal {
        let sigma_w = mat_vec(self.sigma, w);
        let vol = sqrt(dot(w, &sigma_w));
        if vol < self.volatility_floor {
            return SHARPE_PENALTY;
        }
        -(dot(w, self.mu) - self.risk_free_rate) / vol
    }

    /// d(-S)/dw = -mu/vol + (ret - rf) * Sigma*w / vol^3
    fn neg_sharpe_gradient(&self, w: &[Decimal]) -> Vec<Decimal> {
        let sigma_w = mat_vec(self.sigma, w);
        let vol = sqrt(dot(w, &sigma_w));
        if vol < self.volatility_floor {
            return vec![Decimal::ZERO; w.len()];
        }
        let excess = dot(w, self.mu) - self.risk_free_rate;
        let vol_cubed = vol * vol * vol;
        self.mu
            .iter()
            .zip(sigma_w.iter())
            .map(|(m, sw)| -*m / vol + excess * *sw / vol_cubed)
            .collect()
    }

    fn volatility(&self, w: &[Decimal]) -> Decimal {
        sqrt(quad_form(w, self.sigma))
    }

    /// d(vol)/dw = Sigma*w / vol; zero at the volatility floor, where the
    /// minimum has been reached.
    fn volatility_gradient(&self, w: &[Decimal]) -> Vec<Decimal> {
        let sigma_w = mat_vec(self.sigma, w);
        let vol = sqrt(dot(w, &sigma_w));
        if vol < self.volatility_floor {
            return vec![Decimal::ZERO; w.len()];
        }
        sigma_w.iter().map(|sw| *sw / vol).collect()
    }
}

impl ObjectiveFn for PortfolioObjective<'_> {
    fn value(&self, w: &[Decimal]) -> Decimal {
        match self.objective {
            Objective::MaximizeSharpe => self.neg_sharpe(w),
            Objective::MinimizeVolatility => self.volatility(w),
            Objective::TargetReturn { .. } => self.volatility(w),
        }
    }

    fn gradient(&self, w: &[Decimal]) -> Vec<Decimal> {
        match self.objective {
            Objective::MaximizeSharpe => self.neg_sharpe_gradient(w),
            Objective::MinimizeVolatility => self.volatility_gradient(w),
            Objective::TargetReturn { .. } => self.volatility_gradient(w),
        }
    }
    fn is_penalized(&self, w: &[Decimal]) -> bool {
        match self.objective {
            Objective::MaximizeSharpe => self.volatility(w) < self.volatility_floor,
            Objective::MinimizeVolatility | Objective::TargetReturn { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_asset() -> (Vec<Decimal>, Vec<Vec<Decimal>>) {
        // 20% and 10% vol, correlation 0.3
        let mu = vec![dec!(0.10), dec!(0.06)];
        let sigma = vec![vec![dec!(0.04), dec!(0.006)], vec![dec!(0.006), dec!(0.01)]];
        (mu, sigma)
    }

    #[test]
    fn test_volatility_value() {
        let (mu, sigma) = two_asset();
        let obj = PortfolioObjective::new(
            Objective::MinimizeVolatility,
            &mu,
            &sigma,
            Decimal::ZERO,
            dec!(0.00000001),
        );
        // w'Sw = 0.25*0.04 + 2*0.25*0.006 + 0.25*0.01 = 0.0155
        let v = obj.value(&[dec!(0.5), dec!(0.5)]);
        assert!((v * v - dec!(0.0155)).abs() < dec!(0.0000000001));
    }

    #[test]
    fn test_sharpe_value_is_negated_ratio() {
        let (mu, sigma) = two_asset();
        let obj = PortfolioObjective::new(
            Objective::MaximizeSharpe,
            &mu,
            &sigma,
            dec!(0.02),
            dec!(0.00000001),
        );
        // All in asset B: (0.06 - 0.02) / 0.10 = 0.4
        let v = obj.value(&[dec!(0), dec!(1)]);
        assert!((v + dec!(0.4)).abs() < dec!(0.0000000001));
    }

    #[test]
    fn test_zero_volatility_sharpe_is_penalised() {
        let mu = vec![dec!(0.05)];
        let sigma = vec![vec![Decimal::ZERO]];
        let obj = PortfolioObjective::new(
            Objective::MaximizeSharpe,
            &mu,
            &sigma,
            dec!(0.01),
            dec!(0.00000001),
        );
        assert_eq!(obj.value(&[Decimal::ONE]), SHARPE_PENALTY);
        assert_eq!(obj.gradient(&[Decimal::ONE]), vec![Decimal::ZERO]);
        assert!(obj.is_penalized(&[Decimal::ONE]));
    }

    #[test]
    fn test_zero_volatility_is_not_penalised_for_min_volatility() {
        let mu = vec![dec!(0.05)];
        let sigma = vec![vec![Decimal::ZERO]];
        let obj = PortfolioObjective::new(
            Objective::MinimizeVolatility,
            &mu,
            &sigma,
            dec!(0.01),
            dec!(0.00000001),
        );
        assert!(!obj.is_penalized(&[Decimal::ONE]));
    }

    #[test]
    fn test_sharpe_gradient_matches_finite_difference() {
        let (mu, sigma) = two_asset();
        let obj = PortfolioObjective::new(
            Objective::MaximizeSharpe,
            &mu,
            &sigma,
            dec!(0.02),
            dec!(0.00000001),
        );
        let w = [dec!(0.4), dec!(0.6)];
        let g = obj.gradient(&w);
        let h = dec!(0.000001);
        for i in 0..2 {
            let mut up = w;
            let mut down = w;
            up[i] += h;
            down[i] -= h;
            let fd = (obj.value(&up) - obj.value(&down)) / (dec!(2) * h);
            assert!(
                (fd - g[i]).abs() < dec!(0.00001),
                "gradient[{}] = {} but finite difference = {}",
                i,
                g[i],
                fd
            );
        }
    }

    #[test]
    fn test_target_return_uses_volatility() {
        let (mu, sigma) = two_asset();
        let vol = PortfolioObjective::new(
            Objective::MinimizeVolatility,
            &mu,
            &sigma,
            Decimal::ZERO,
            dec!(0.00000001),
        );
        let target = PortfolioObjective::new(
            Objective::TargetReturn { target: dec!(0.08) },
            &mu,
            &sigma,
            Decimal::ZERO,
            dec!(0.00000001),
        );
        let w = [dec!(0.3), dec!(0.7)];
        assert_eq!(vol.value(&w), target.value(&w));
        assert_eq!(vol.gradient(&w), target.gradient(&w));
    }
}
