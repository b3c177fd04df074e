use super::prices::{PriceSeries, PriceTable, PriceWindow};
use crate::AllocResult;

/// Source of daily close prices for a list of symbols.
///
/// Implementations report which field they served (`PriceField`) so a
/// fallback from adjusted close to close is never silent. Symbols the
/// source does not know are omitted from the table, or included with no
/// points; the statistics engine rejects both.
pub trait PriceProvider {
    fn fetch(&self, symbols: &[String], window: &PriceWindow) -> AllocResult<PriceTable>;
}

/// Serves a fixed table. Useful for embedding callers and tests.
#[derive(Debug, Clone)]
pub struct InMemoryProvider {
    table: PriceTable,
}

impl InMemoryProvider {
    pub fn new(table: PriceTable) -> Self {
        InMemoryProvider { table }
    }
}

impl PriceProvider for InMemoryProvider {
    fn fetch(&self, symbols: &[String], window: &PriceWindow) -> AllocResult<PriceTable> {
        let series: Vec<PriceSeries> = symbols
            .iter()
            .filter_map(|sym| self.table.series.iter().find(|s| &s.symbol == sym).cloned())
            .collect();
        let selected = PriceTable::new(self.table.field, series);
        Ok(selected.restrict(window))
    }
}
