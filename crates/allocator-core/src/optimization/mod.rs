//! Allocation solver: objective, constraints, the SQP method, and the
//! relaxation state machine around it.

pub mod allocator;
pub mod feasibility;
pub mod objective;
pub mod request;
pub mod slsqp;

pub use allocator::{
    next_stage, optimize, optimize_with, AllocationResult, AssetAllocation, SolveStage,
};
pub use feasibility::{clamp_target, return_range, ReturnRange, TargetCheck};
pub use objective::{ObjectiveFn, PortfolioObjective, SHARPE_PENALTY};
pub use request::{AllocationBounds, Objective, OptimizationRequest, SolverConfig};
pub use slsqp::{ConstrainedSolver, ExitMode, Problem, Slsqp, SolverOutcome};
