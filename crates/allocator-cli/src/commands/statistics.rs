use clap::Args;
use serde_json::Value;

use portfolio_allocator_core::statistics::{compute_statistics, PriceProvider, PriceWindow};

use crate::input;
use crate::input::prices::CsvPriceProvider;

/// Arguments for the statistics report
#[derive(Args)]
pub struct StatisticsArgs {
    /// Long-format price CSV (date,symbol,adj_close,close)
    #[arg(long)]
    pub prices: String,

    /// Comma-separated ticker symbols (e.g. "AAPL,MSFT,GOOG")
    #[arg(long, value_delimiter = ',', required = true)]
    pub symbols: Vec<String>,

    /// Years of daily history, measured back from the latest price
    #[arg(long, default_value = "5")]
    pub lookback_years: u32,
}

pub fn run_statistics(args: StatisticsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let symbols = super::parse_symbols(&args.symbols)?;
    let provider = CsvPriceProvider::new(input::file::resolve_path(&args.prices)?);
    let window = PriceWindow {
        lookback_years: args.lookback_years,
        ..PriceWindow::default()
    };

    let table = provider.fetch(&symbols, &window)?;
    table.require_symbols(&symbols)?;
    let result = compute_statistics(&table)?;
    Ok(serde_json::to_value(result)?)
}
