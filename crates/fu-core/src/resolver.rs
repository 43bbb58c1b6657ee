//! Exemplar resolution: gather each exemplar country's rows for one year

use crate::index::TableIndex;
use crate::table::TidyRecord;
use tracing::{debug, warn};

/// The rows of one exemplar country for the year being completed
#[derive(Debug, Clone)]
pub struct ExemplarTable<'a, R> {
    /// Exemplar country code; becomes the source label of borrowed values
    pub country: String,
    /// Rows for that country and year (possibly empty)
    pub records: &'a [&'a R],
}

impl<R> ExemplarTable<'_, R> {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Resolve an exemplar sequence into row subsets, preserving priority order.
///
/// Each exemplar yields exactly one entry, even when it has no rows for the
/// year. The target country itself and repeated exemplars are skipped: the
/// target's own rows are always consulted first, and a repeat can never win.
pub fn resolve<'a, R: TidyRecord>(
    index: &'a TableIndex<'a, R>,
    country: &str,
    exemplars: &[String],
    year: i32,
) -> Vec<ExemplarTable<'a, R>> {
    let mut resolved: Vec<ExemplarTable<'a, R>> = Vec::with_capacity(exemplars.len());

    for exemplar in exemplars {
        let exemplar = exemplar.trim();
        if exemplar == country {
            warn!(country, year, "country listed as its own exemplar, skipping");
            continue;
        }
        if resolved.iter().any(|t| t.country == exemplar) {
            continue;
        }
        let table = ExemplarTable {
            country: exemplar.to_string(),
            records: index.lookup(exemplar, year),
        };
        if table.is_empty() {
            debug!(country, exemplar, year, "exemplar has no rows for year");
        }
        resolved.push(table);
    }

    resolved
}
