//! Shared exemplar-substitution machinery
//!
//! Both table kinds follow the same procedure: take the target's own rows
//! where present, otherwise scan the exemplar tables in priority order and
//! borrow from the first one that has the key, otherwise mark the key
//! unresolved. The kind-specific parts live in [`crate::allocation`] and
//! [`crate::efficiency`].

use crate::error::{Error, Result};
use crate::resolver::ExemplarTable;
use crate::schema::{Quantity, Source};
use crate::table::{completed_from, CompletedRecord, KeyedRecord};
use std::fmt::Display;
use tracing::{debug, warn};

/// Rows borrowed from a single exemplar
#[derive(Debug)]
pub struct Borrowed<'a, R> {
    pub exemplar: String,
    pub records: Vec<&'a R>,
}

impl<R: KeyedRecord> Borrowed<'_, R> {
    /// Relabel the borrowed rows as rows of the target country
    pub fn into_completed(self, country: &str, year: i32) -> Vec<CompletedRecord<R::Key>> {
        let source = Source::Exemplar(self.exemplar);
        self.records
            .into_iter()
            .map(|r| completed_from(r, country, year, source.clone()))
            .collect()
    }
}

/// Scan exemplars in order; return the matching rows of the first exemplar
/// that has them all valued. Later exemplars are never consulted once one
/// matches.
///
/// An exemplar whose matching rows include a blank value is passed over as a
/// whole: borrowing only its valued rows would leave part of the key
/// uncovered.
pub fn first_exemplar_match<'a, R, F>(
    exemplars: &[ExemplarTable<'a, R>],
    matches: F,
) -> Option<Borrowed<'a, R>>
where
    R: KeyedRecord,
    F: Fn(&R) -> bool,
{
    exemplars.iter().find_map(|exemplar| {
        let records: Vec<&'a R> = exemplar
            .records
            .iter()
            .copied()
            .filter(|r| matches(*r))
            .collect();
        if records.is_empty() {
            return None;
        }
        if records.iter().any(|r| r.value().is_none()) {
            debug!(
                exemplar = %exemplar.country,
                blank = records.iter().filter(|r| r.value().is_none()).count(),
                "exemplar has blank values for key, skipping"
            );
            return None;
        }
        Some(Borrowed {
            exemplar: exemplar.country.clone(),
            records,
        })
    })
}

/// The marker record for a key no exemplar could supply
pub fn unresolved<K>(country: &str, year: i32, key: K, quantity: Quantity) -> CompletedRecord<K> {
    CompletedRecord {
        country: country.to_string(),
        year,
        key,
        quantity,
        value: None,
        unit: None,
        source: Source::Unresolved,
    }
}

/// Reject rows with empty key fields
pub fn check_key_fields(country: &str, year: i32, fields: &[(&str, &str)]) -> Result<()> {
    for (name, value) in fields {
        if value.trim().is_empty() {
            return Err(Error::MalformedKey {
                country: country.to_string(),
                year,
                detail: format!("empty {name}"),
            });
        }
    }
    Ok(())
}

/// Reject non-finite values and values outside `[min, max]`
pub fn check_value(
    country: &str,
    year: i32,
    key: &impl Display,
    quantity: Quantity,
    value: f64,
    min: f64,
    max: f64,
) -> Result<()> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(Error::InvalidValue {
            country: country.to_string(),
            year,
            key: key.to_string(),
            quantity: quantity.to_string(),
            value,
        })
    }
}

/// The single unit shared by a set of context rows, or an error if they mix
pub fn common_unit<'u>(
    country: &str,
    year: i32,
    units: impl IntoIterator<Item = &'u str>,
) -> Result<Option<String>> {
    let mut common: Option<&str> = None;
    for unit in units {
        match common {
            None => common = Some(unit),
            Some(expected) if expected != unit => {
                return Err(Error::InconsistentUnits {
                    country: country.to_string(),
                    year,
                    expected: expected.to_string(),
                    found: unit.to_string(),
                });
            }
            Some(_) => {}
        }
    }
    Ok(common.map(str::to_string))
}

/// Warn when a borrowed row's unit differs from the target's context unit.
///
/// The borrowed unit is kept as-is.
pub fn warn_on_unit_mismatch<K: Display>(
    borrowed: &[CompletedRecord<K>],
    context_unit: Option<&str>,
) {
    let Some(expected) = context_unit else {
        return;
    };
    for record in borrowed {
        if let Some(unit) = record.unit.as_deref() {
            if !unit.is_empty() && unit != expected {
                warn!(
                    country = %record.country,
                    year = record.year,
                    key = %record.key,
                    source = %record.source,
                    unit,
                    expected,
                    "borrowed unit differs from context unit"
                );
            }
        }
    }
}

/// Percentage of `part` in `total`, or `None` when the total is zero
pub fn percent_of(part: f64, total: f64) -> Option<f64> {
    if total == 0.0 {
        None
    } else {
        Some(100.0 * part / total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::TableIndex;
    use crate::io::parse_table_str;
    use crate::resolver::resolve;
    use crate::table::{AllocationRecord, EfficiencyRecord};

    const EFFICIENCIES: &str = "Country,Year,Machine,Eu.product,Quantity,.values,Unit\n\
ZAF,1971,Wood cookstoves,Heat,eta.fu,,\n\
ZAF,1971,Wood cookstoves,Heat,phi.u,0.2,\n\
USA,1971,Wood cookstoves,Heat,eta.fu,0.3,\n\
BRA,1971,Wood cookstoves,Heat,eta.fu,0.15,\n";

    #[test]
    fn test_first_match_skips_blank_values() {
        let table = parse_table_str::<EfficiencyRecord>(EFFICIENCIES, "eta.csv").unwrap();
        let index = TableIndex::new(&table.records);
        let exemplars = resolve(
            &index,
            "GHA",
            &["ZAF".to_string(), "USA".to_string(), "BRA".to_string()],
            1971,
        );

        let borrowed =
            first_exemplar_match(&exemplars, |r| r.quantity == Quantity::EtaFu).unwrap();
        assert_eq!(borrowed.exemplar, "USA");
        assert_eq!(borrowed.records.len(), 1);

        let completed = borrowed.into_completed("GHA", 1971);
        assert_eq!(completed[0].country, "GHA");
        assert_eq!(completed[0].value, Some(0.3));
        assert_eq!(completed[0].source, Source::Exemplar("USA".to_string()));
    }

    #[test]
    fn test_exemplar_with_partly_blank_group_is_passed_over() {
        let table = parse_table_str::<AllocationRecord>(
            "Country,Year,Ef.product,Destination,Machine,Eu.product,Quantity,.values,Unit\n\
ZAF,1971,Kerosene,Residential,Kerosene lamps,Light,C,0.7,ktoe\n\
ZAF,1971,Kerosene,Residential,Kerosene stoves,Heat,C,,ktoe\n\
USA,1971,Kerosene,Residential,Kerosene heaters,Heat,C,1,ktoe\n",
            "alloc.csv",
        )
        .unwrap();
        let index = TableIndex::new(&table.records);
        let exemplars = resolve(&index, "GHA", &["ZAF".to_string(), "USA".to_string()], 1971);

        let borrowed = first_exemplar_match(&exemplars, |r| {
            r.ef_product == "Kerosene" && r.destination == "Residential"
        })
        .unwrap();
        assert_eq!(borrowed.exemplar, "USA");
        assert_eq!(borrowed.records.len(), 1);
        assert_eq!(borrowed.records[0].machine, "Kerosene heaters");
    }

    #[test]
    fn test_first_match_none() {
        let table = parse_table_str::<EfficiencyRecord>(EFFICIENCIES, "eta.csv").unwrap();
        let index = TableIndex::new(&table.records);
        let exemplars = resolve(&index, "GHA", &["ZAF".to_string()], 1971);

        assert!(first_exemplar_match(&exemplars, |r| r.quantity == Quantity::EtaFu).is_none());
        assert!(first_exemplar_match(&[], |_: &EfficiencyRecord| true).is_none());
    }

    #[test]
    fn test_common_unit() {
        assert_eq!(common_unit("GHA", 1971, ["ktoe", "ktoe"]).unwrap(), Some("ktoe".to_string()));
        assert_eq!(common_unit("GHA", 1971, Vec::<&str>::new()).unwrap(), None);
        let err = common_unit("GHA", 1971, ["ktoe", "TJ"]).unwrap_err();
        assert!(matches!(err, Error::InconsistentUnits { .. }));
    }

    #[test]
    fn test_check_value_bounds() {
        let key = "Kerosene -> Residential";
        assert!(check_value("GHA", 1971, &key, Quantity::C, 0.5, 0.0, 1.0).is_ok());
        assert!(check_value("GHA", 1971, &key, Quantity::C, 1.5, 0.0, 1.0).is_err());
        assert!(check_value("GHA", 1971, &key, Quantity::C, f64::NAN, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_check_key_fields() {
        assert!(check_key_fields("GHA", 1971, &[("Machine", "Stoves")]).is_ok());
        let err = check_key_fields("GHA", 1971, &[("Machine", " ")]).unwrap_err();
        assert!(err.to_string().contains("empty Machine"));
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(25.0, 200.0), Some(12.5));
        assert_eq!(percent_of(1.0, 0.0), None);
    }
}
