//! Long-format CSV price files: `date,symbol,adj_close,close`.

use chrono::NaiveDate;
use portfolio_allocator_core::statistics::{
    PriceField, PricePoint, PriceProvider, PriceSeries, PriceTable, PriceWindow,
};
use portfolio_allocator_core::{AllocResult, AllocationError};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Deserialize)]
struct PriceRow {
    date: NaiveDate,
    symbol: String,
    #[serde(default)]
    adj_close: Option<String>,
    #[serde(default)]
    close: Option<String>,
}

impl PriceRow {
    fn field(&self, field: PriceField) -> Option<&str> {
        let raw = match field {
            PriceField::AdjustedClose => self.adj_close.as_deref(),
            PriceField::Close => self.close.as_deref(),
        };
        raw.map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Serves daily prices from a CSV file.
///
/// Adjusted close is used when every requested row carries one. Otherwise
/// the whole table falls back to `close` and is tagged `PriceField::Close`.
#[derive(Debug, Clone)]
pub struct CsvPriceProvider {
    path: PathBuf,
}

impl CsvPriceProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvPriceProvider { path: path.into() }
    }

    fn read_rows(&self, symbols: &[String]) -> AllocResult<Vec<PriceRow>> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|e| {
                AllocationError::DataSource(format!("{}: {}", self.path.display(), e))
            })?;

        let wanted: HashSet<&str> = symbols.iter().map(String::as_str).collect();
        let mut rows = Vec::new();
        for record in reader.deserialize::<PriceRow>() {
            let mut row = record.map_err(|e| {
                AllocationError::DataSource(format!("{}: {}", self.path.display(), e))
            })?;
            // Symbols compare upper-cased
            row.symbol = row.symbol.to_uppercase();
            if wanted.contains(row.symbol.as_str()) {
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

impl PriceProvider for CsvPriceProvider {
    fn fetch(&self, symbols: &[String], window: &PriceWindow) -> AllocResult<PriceTable> {
        let rows = self.read_rows(symbols)?;

        let field = if rows
            .iter()
            .all(|r| r.field(PriceField::AdjustedClose).is_some())
        {
            PriceField::AdjustedClose
        } else {
            tracing::warn!(path = %self.path.display(), "adj_close missing, using close prices");
            PriceField::Close
        };

        let mut points: HashMap<&str, Vec<PricePoint>> = HashMap::new();
        for row in &rows {
            // A blank price is a missing observation
            let Some(raw) = row.field(field) else {
                continue;
            };
            let price = Decimal::from_str(raw)
                .or_else(|_| Decimal::from_scientific(raw))
                .map_err(|e| {
                    AllocationError::DataSource(format!(
                        "invalid price '{}' for {} on {}: {}",
                        raw, row.symbol, row.date, e
                    ))
                })?;
            points.entry(row.symbol.as_str()).or_default().push(PricePoint {
                date: row.date,
                price,
            });
        }

        let series: Vec<PriceSeries> = symbols
            .iter()
            .filter_map(|sym| {
                points
                    .remove(sym.as_str())
                    .map(|pts| PriceSeries::new(sym.clone(), pts))
            })
            .collect();

        tracing::debug!(rows = rows.len(), series = series.len(), ?field, "price file loaded");
        Ok(PriceTable::new(field, series).restrict(window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use std::io::Write;

    fn csv_file(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_reads_adjusted_close() {
        let f = csv_file(
            "date,symbol,adj_close,close\n\
             2024-01-02,AAA,10.5,11\n\
             2024-01-03,AAA,10.7,11.2\n\
             2024-01-02,BBB,20,20\n\
             2024-01-03,BBB,21,21\n",
        );
        let table = CsvPriceProvider::new(f.path())
            .fetch(&symbols(&["BBB", "AAA"]), &PriceWindow::default())
            .unwrap();
        assert_eq!(table.field, PriceField::AdjustedClose);
        assert_eq!(table.symbols(), symbols(&["BBB", "AAA"]));
        assert_eq!(table.series[1].points[0].price, dec!(10.5));
    }

    #[test]
    fn test_blank_adjusted_close_falls_back_to_close() {
        let f = csv_file(
            "date,symbol,adj_close,close\n\
             2024-01-02,AAA,10.5,11\n\
             2024-01-03,AAA,,11.2\n",
        );
        let table = CsvPriceProvider::new(f.path())
            .fetch(&symbols(&["AAA"]), &PriceWindow::default())
            .unwrap();
        assert_eq!(table.field, PriceField::Close);
        let prices: Vec<Decimal> = table.series[0].points.iter().map(|p| p.price).collect();
        assert_eq!(prices, vec![dec!(11), dec!(11.2)]);
    }

    #[test]
    fn test_file_without_adjusted_column() {
        let f = csv_file(
            "date,symbol,close\n\
             2024-01-02,AAA,11\n\
             2024-01-03,AAA,12\n",
        );
        let table = CsvPriceProvider::new(f.path())
            .fetch(&symbols(&["AAA"]), &PriceWindow::default())
            .unwrap();
        assert_eq!(table.field, PriceField::Close);
        assert_eq!(table.series[0].points.len(), 2);
    }

    #[test]
    fn test_unknown_symbol_is_omitted() {
        let f = csv_file("date,symbol,adj_close,close\n2024-01-02,AAA,1,1\n");
        let table = CsvPriceProvider::new(f.path())
            .fetch(&symbols(&["AAA", "ZZZ"]), &PriceWindow::default())
            .unwrap();
        assert_eq!(table.symbols(), symbols(&["AAA"]));
        assert!(table.require_symbols(&symbols(&["AAA", "ZZZ"])).is_err());
    }

    #[test]
    fn test_lowercase_tickers_match_requested_symbols() {
        let f = csv_file(
            "date,symbol,adj_close,close\n\
             2024-01-02,aapl,10,10\n\
             2024-01-03,Aapl,11,11\n",
        );
        let table = CsvPriceProvider::new(f.path())
            .fetch(&symbols(&["AAPL"]), &PriceWindow::default())
            .unwrap();
        assert_eq!(table.symbols(), symbols(&["AAPL"]));
        assert_eq!(table.series[0].points.len(), 2);
        assert!(table.require_symbols(&symbols(&["AAPL"])).is_ok());
    }

    #[test]
    fn test_malformed_price_is_data_source_error() {
        let f = csv_file("date,symbol,adj_close,close\n2024-01-02,AAA,abc,1\n");
        let err = CsvPriceProvider::new(f.path())
            .fetch(&symbols(&["AAA"]), &PriceWindow::default())
            .unwrap_err();
        assert!(matches!(err, AllocationError::DataSource(_)));
    }
}
