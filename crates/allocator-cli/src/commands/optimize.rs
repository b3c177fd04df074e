use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use portfolio_allocator_core::optimization::{
    AllocationBounds, Objective, OptimizationRequest, SolverConfig,
};
use portfolio_allocator_core::pipeline::run_allocation;
use portfolio_allocator_core::statistics::PriceWindow;

use crate::input;
use crate::input::prices::CsvPriceProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Method {
    /// Maximise the Sharpe ratio
    Sharpe,
    /// Minimise portfolio volatility
    MinVol,
    /// Minimise volatility at --target-return
    Target,
}

/// Arguments for an allocation run
#[derive(Args)]
pub struct OptimizeArgs {
    /// Long-format price CSV (date,symbol,adj_close,close)
    #[arg(long)]
    pub prices: String,

    /// Comma-separated ticker symbols (e.g. "AAPL,MSFT,GOOG")
    #[arg(long, value_delimiter = ',', required = true)]
    pub symbols: Vec<String>,

    /// Request file (JSON or YAML). Read from stdin when piped and omitted.
    #[arg(long)]
    pub request: Option<String>,

    /// Optimisation objective (overrides the request file)
    #[arg(long, value_enum)]
    pub method: Option<Method>,

    /// Annualised target return, e.g. 0.12 for 12%
    #[arg(long, allow_hyphen_values = true)]
    pub target_return: Option<Decimal>,

    /// Minimum weight per asset (0 to 1)
    #[arg(long)]
    pub min_alloc: Option<Decimal>,

    /// Maximum weight per asset (0 to 1)
    #[arg(long)]
    pub max_alloc: Option<Decimal>,

    /// Annualised risk-free rate
    #[arg(long, allow_hyphen_values = true)]
    pub risk_free_rate: Option<Decimal>,

    /// Amount to invest
    #[arg(long)]
    pub budget: Option<Decimal>,

    /// Years of daily history, measured back from the latest price
    #[arg(long, default_value = "5")]
    pub lookback_years: u32,

    /// Solver iteration cap
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Fail instead of retrying a target-return solve with relaxed bounds
    #[arg(long)]
    pub no_relax: bool,
}

/// Request document; every field may be overridden on the command line.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RequestDocument {
    objective: Option<Objective>,
    bounds: Option<AllocationBounds>,
    risk_free_rate: Option<Decimal>,
    budget: Option<Decimal>,
    solver: Option<SolverConfig>,
}

pub fn run_optimize(args: OptimizeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let symbols = super::parse_symbols(&args.symbols)?;

    let document: RequestDocument = if let Some(ref path) = args.request {
        input::file::read_document(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        RequestDocument::default()
    };
    let (request, config) = build_request(&args, document)?;

    let provider = CsvPriceProvider::new(input::file::resolve_path(&args.prices)?);
    let window = PriceWindow {
        lookback_years: args.lookback_years,
        ..PriceWindow::default()
    };

    let result = run_allocation(&provider, &symbols, &window, &request, &config)?;
    Ok(serde_json::to_value(result)?)
}

/// Merge the request document with command-line overrides.
fn build_request(
    args: &OptimizeArgs,
    document: RequestDocument,
) -> Result<(OptimizationRequest, SolverConfig), Box<dyn std::error::Error>> {
    let document_target = document.objective.and_then(|o| o.target());

    let objective = match (args.method, args.target_return) {
        (Some(Method::Sharpe), _) => Objective::MaximizeSharpe,
        (Some(Method::MinVol), _) => Objective::MinimizeVolatility,
        (Some(Method::Target), Some(target)) | (None, Some(target)) => {
            Objective::TargetReturn { target }
        }
        (Some(Method::Target), None) => match document_target {
            Some(target) => Objective::TargetReturn { target },
            None => return Err("--method target requires --target-return".into()),
        },
        (None, None) => document.objective.unwrap_or(Objective::MaximizeSharpe),
    };

    let mut bounds = document.bounds.unwrap_or_default();
    if let Some(min) = args.min_alloc {
        bounds.min = min;
    }
    if let Some(max) = args.max_alloc {
        bounds.max = max;
    }

    let request = OptimizationRequest {
        objective,
        bounds,
        risk_free_rate: args
            .risk_free_rate
            .or(document.risk_free_rate)
            .unwrap_or(Decimal::ZERO),
        budget: args.budget.or(document.budget).unwrap_or(Decimal::ZERO),
    };
    request.validate()?;

    let mut config = document.solver.unwrap_or_default();
    if let Some(max_iterations) = args.max_iterations {
        config.max_iterations = max_iterations;
    }
    if args.no_relax {
        config.relaxation_enabled = false;
    }
    config.validate()?;

    Ok((request, config))
}
