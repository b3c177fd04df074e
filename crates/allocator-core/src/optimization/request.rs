use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::AllocationError;
use crate::types::{Money, Rate, Weight};
use crate::AllocResult;

/// What the allocation should optimise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Objective {
    /// Maximise (return - risk_free_rate) / volatility.
    MaximizeSharpe,
    /// Minimise portfolio volatility.
    MinimizeVolatility,
    /// Minimise volatility at a given annualised return.
    TargetReturn { target: Rate },
}

impl Objective {
    pub fn label(&self) -> &'static str {
        match self {
            Objective::MaximizeSharpe => "maximize_sharpe",
            Objective::MinimizeVolatility => "minimize_volatility",
            Objective::TargetReturn { .. } => "target_return",
        }
    }

    pub fn target(&self) -> Option<Rate> {
        match self {
            Objective::TargetReturn { target } => Some(*target),
            _ => None,
        }
    }
}

/// Uniform per-asset weight bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AllocationBounds {
    pub min: Weight,
    pub max: Weight,
}

impl Default for AllocationBounds {
    fn default() -> Self {
        AllocationBounds {
            min: Decimal::ZERO,
            max: Decimal::ONE,
        }
    }
}

impl AllocationBounds {
    pub fn new(min: Weight, max: Weight) -> Self {
        AllocationBounds { min, max }
    }

    pub fn validate(&self) -> AllocResult<()> {
        if self.min < Decimal::ZERO || self.min > Decimal::ONE {
            return Err(AllocationError::invalid(
                "bounds.min",
                format!("{} is outside [0, 1]", self.min),
            ));
        }
        if self.max < Decimal::ZERO || self.max > Decimal::ONE {
            return Err(AllocationError::invalid(
                "bounds.max",
                format!("{} is outside [0, 1]", self.max),
            ));
        }
        if self.min > self.max {
            return Err(AllocationError::invalid(
                "bounds",
                format!("min {} exceeds max {}", self.min, self.max),
            ));
        }
        Ok(())
    }

    /// Bounds for the retry: lower bound halved, upper bound opened to 1.
    pub fn relaxed(&self) -> Self {
        AllocationBounds {
            min: self.min / dec!(2),
            max: Decimal::ONE,
        }
    }

    pub fn contains(&self, w: Weight, tolerance: Decimal) -> bool {
        w >= self.min - tolerance && w <= self.max + tolerance
    }
}

/// A single allocation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationRequest {
    pub objective: Objective,
    #[serde(default)]
    pub bounds: AllocationBounds,
    /// Annualised risk-free rate.
    #[serde(default)]
    pub risk_free_rate: Rate,
    /// Total amount to allocate.
    #[serde(default)]
    pub budget: Money,
}

impl OptimizationRequest {
    pub fn validate(&self) -> AllocResult<()> {
        self.bounds.validate()?;
        if self.budget < Decimal::ZERO {
            return Err(AllocationError::invalid(
                "budget",
                format!("{} is negative", self.budget),
            ));
        }
        if self.risk_free_rate <= dec!(-1) {
            return Err(AllocationError::invalid(
                "risk_free_rate",
                "must be greater than -100%",
            ));
        }
        Ok(())
    }
}

/// Numerical settings passed explicitly into every solve.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Outer SQP iteration cap.
    pub max_iterations: u32,
    /// Convergence tolerance on objective change and step size.
    pub tolerance: Decimal,
    /// Portfolio volatility below which a Sharpe evaluation is penalised
    /// instead of divided.
    pub volatility_floor: Decimal,
    /// Retry a failed target-return solve with relaxed bounds.
    pub relaxation_enabled: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            max_iterations: 200,
            tolerance: dec!(0.000000001),
            volatility_floor: dec!(0.00000001),
            relaxation_enabled: true,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> AllocResult<()> {
        if self.max_iterations == 0 {
            return Err(AllocationError::invalid(
                "solver.max_iterations",
                "must be at least 1",
            ));
        }
        if self.tolerance <= Decimal::ZERO {
            return Err(AllocationError::invalid(
                "solver.tolerance",
                "must be positive",
            ));
        }
        if self.volatility_floor <= Decimal::ZERO {
            return Err(AllocationError::invalid(
                "solver.volatility_floor",
                "must be positive",
            ));
        }
        Ok(())
    }
}
