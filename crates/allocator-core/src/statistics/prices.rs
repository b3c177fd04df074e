use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::error::AllocationError;
use crate::AllocResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which provider field the prices were read from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceField {
    /// Close adjusted for dividends and splits (canonical).
    #[default]
    AdjustedClose,
    /// Plain close, used when the provider has no adjusted field.
    Close,
}

/// Sampling interval of the price history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceInterval {
    #[default]
    Daily,
}

/// History window requested from a price provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceWindow {
    /// Years of history ending at the most recent observation (default 5).
    pub lookback_years: u32,
    pub interval: PriceInterval,
}

impl Default for PriceWindow {
    fn default() -> Self {
        PriceWindow {
            lookback_years: 5,
            interval: PriceInterval::Daily,
        }
    }
}

impl PriceWindow {
    /// First date included in the window ending at `end`.
    pub fn start_date(&self, end: NaiveDate) -> NaiveDate {
        self.lookback_years
            .checked_mul(12)
            .and_then(|months| end.checked_sub_months(Months::new(months)))
            .unwrap_or(NaiveDate::MIN)
    }
}

/// A single dated price observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: Decimal,
}

/// Price history of one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: String,
    pub points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>, points: Vec<PricePoint>) -> Self {
        PriceSeries {
            symbol: symbol.into(),
            points,
        }
    }
}

/// Raw price table as delivered by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTable {
    #[serde(default)]
    pub field: PriceField,
    pub series: Vec<PriceSeries>,
}

/// Prices after the inner join: every symbol has a price on every date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignedPrices {
    pub symbols: Vec<String>,
    /// Ascending trading dates shared by all symbols.
    pub dates: Vec<NaiveDate>,
    /// `prices[i][t]` is the price of `symbols[i]` on `dates[t]`.
    pub prices: Vec<Vec<Decimal>>,
}

// ---------------------------------------------------------------------------
// Table operations
// ---------------------------------------------------------------------------

impl PriceTable {
    pub fn new(field: PriceField, series: Vec<PriceSeries>) -> Self {
        PriceTable { field, series }
    }

    pub fn symbols(&self) -> Vec<String> {
        self.series.iter().map(|s| s.symbol.clone()).collect()
    }

    /// Warning text when prices did not come from the adjusted close.
    pub fn field_warning(&self) -> Option<String> {
        match self.field {
            PriceField::AdjustedClose => None,
            PriceField::Close => Some(
                "Adjusted close unavailable; plain close prices used (dividends and splits not reflected)"
                    .to_string(),
            ),
        }
    }

    /// Fail when any requested symbol is absent from the table.
    pub fn require_symbols(&self, requested: &[String]) -> AllocResult<()> {
        let present: HashSet<&str> = self.series.iter().map(|s| s.symbol.as_str()).collect();
        let missing: Vec<String> = requested
            .iter()
            .filter(|s| !present.contains(s.as_str()))
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AllocationError::insufficient(
                "symbol absent from price table",
                missing,
            ))
        }
    }

    /// Keep only the observations inside `window`, measured back from the
    /// latest date in the table.
    pub fn restrict(&self, window: &PriceWindow) -> PriceTable {
        let latest = self
            .series
            .iter()
            .flat_map(|s| s.points.iter().map(|p| p.date))
            .max();
        let Some(end) = latest else {
            return self.clone();
        };
        let start = window.start_date(end);
        let series = self
            .series
            .iter()
            .map(|s| PriceSeries {
                symbol: s.symbol.clone(),
                points: s
                    .points
                    .iter()
                    .filter(|p| p.date >= start && p.date <= end)
                    .copied()
                    .collect(),
            })
            .collect();
        PriceTable {
            field: self.field,
            series,
        }
    }

    /// Inner-join the series on date.
    ///
    /// Non-positive prices count as missing. Any date on which at least one
    /// symbol has no valid price is dropped for all symbols.
    pub fn align(&self) -> AllocResult<AlignedPrices> {
        if self.series.is_empty() {
            return Err(AllocationError::insufficient(
                "price table contains no symbols",
                Vec::new(),
            ));
        }

        let mut seen = HashSet::new();
        for s in &self.series {
            if !seen.insert(s.symbol.as_str()) {
                return Err(AllocationError::invalid(
                    "series",
                    format!("symbol '{}' appears more than once", s.symbol),
                ));
            }
        }

        let mut by_symbol: Vec<BTreeMap<NaiveDate, Decimal>> = Vec::with_capacity(self.series.len());
        let mut empty: Vec<String> = Vec::new();

        for s in &self.series {
            let mut map = BTreeMap::new();
            for p in &s.points {
                if map.insert(p.date, p.price).is_some() {
                    return Err(AllocationError::invalid(
                        format!("series[{}]", s.symbol),
                        format!("duplicate observation on {}", p.date),
                    ));
                }
            }
            map.retain(|_, price| *price > Decimal::ZERO);
            if map.is_empty() {
                empty.push(s.symbol.clone());
            }
            by_symbol.push(map);
        }

        if !empty.is_empty() {
            return Err(AllocationError::insufficient(
                "no valid price observations",
                empty,
            ));
        }

        let mut shared: BTreeSet<NaiveDate> = by_symbol[0].keys().copied().collect();
        for map in &by_symbol[1..] {
            shared.retain(|d| map.contains_key(d));
        }

        if shared.len() < 2 {
            return Err(AllocationError::insufficient(
                format!(
                    "{} trading day(s) shared by all symbols, at least 2 required",
                    shared.len()
                ),
                self.symbols(),
            ));
        }

        let dates: Vec<NaiveDate> = shared.into_iter().collect();
        let prices = by_symbol
            .iter()
            .map(|map| dates.iter().map(|d| map[d]).collect())
            .collect();

        Ok(AlignedPrices {
            symbols: self.symbols(),
            dates,
            prices,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
