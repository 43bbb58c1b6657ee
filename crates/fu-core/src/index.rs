//! Keyed access to tidy tables by (country, year)

use crate::table::TidyRecord;
use std::collections::HashMap;

/// Lookup of a table's rows by (country, year)
///
/// Rows keep their table order within each key. Absence of a key is normal
/// and yields an empty slice.
#[derive(Debug)]
pub struct TableIndex<'a, R> {
    groups: HashMap<&'a str, HashMap<i32, Vec<&'a R>>>,
    row_count: usize,
}

impl<'a, R: TidyRecord> TableIndex<'a, R> {
    /// Index the given rows
    pub fn new(records: &'a [R]) -> Self {
        let mut groups: HashMap<&'a str, HashMap<i32, Vec<&'a R>>> = HashMap::new();
        for record in records {
            groups
                .entry(record.country())
                .or_default()
                .entry(record.year())
                .or_default()
                .push(record);
        }
        Self {
            groups,
            row_count: records.len(),
        }
    }

    /// Rows matching both keys exactly
    pub fn lookup(&self, country: &str, year: i32) -> &[&'a R] {
        self.groups
            .get(country)
            .and_then(|years| years.get(&year))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Rows whose country is in `countries` and whose year is in `years`.
    ///
    /// Results are grouped by country then year in the order given.
    pub fn select(&self, countries: &[&str], years: &[i32]) -> Vec<&'a R> {
        let mut rows = Vec::new();
        for country in dedup(countries) {
            for year in dedup(years) {
                rows.extend_from_slice(self.lookup(country, year));
            }
        }
        rows
    }

    /// Number of indexed rows
    pub fn row_count(&self) -> usize {
        self.row_count
    }
}

/// Filter a table to rows for one country and year
pub fn lookup<'a, R: TidyRecord>(records: &'a [R], country: &str, year: i32) -> Vec<&'a R> {
    records
        .iter()
        .filter(|r| r.country() == country && r.year() == year)
        .collect()
}

fn dedup<T: PartialEq + Copy>(items: &[T]) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for &item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
