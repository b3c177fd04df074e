//! Statistics engine: price history in, annualised return and risk
//! estimates out.

pub mod engine;
pub mod prices;
pub mod provider;
pub mod returns;

pub use engine::{
    compute_statistics, AssetStatistics, CorrelationMatrix, CovarianceMatrix, StatisticsOutput,
    TRADING_DAYS_PER_YEAR,
};
pub use prices::{
    AlignedPrices, PriceField, PriceInterval, PricePoint, PriceSeries, PriceTable, PriceWindow,
};
pub use provider::{InMemoryProvider, PriceProvider};
pub use returns::{ReturnMatrix, ReturnSeries};
