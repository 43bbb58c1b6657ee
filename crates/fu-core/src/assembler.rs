//! Batch assembly of completed tables over many countries and years

use crate::allocation::complete_allocation_table;
use crate::efficiency::{check_allocation_context, complete_efficiency_table};
use crate::error::Result;
use crate::index::TableIndex;
use crate::resolver::resolve;
use crate::schema::{QuantitySelection, TableKind};
use crate::table::{
    AllocationKey, AllocationRecord, CompletedAllocation, CompletedRecord, EfficiencyRecord,
    ExemplarAssignment, IeaRecord, MachineKey,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span};

/// Options shared by both assemblers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembleOptions {
    /// Only complete years up to and including this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_year: Option<i32>,
    /// Quantity names to produce; all supported quantities when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantities: Option<Vec<String>>,
    /// Run work units on the rayon thread pool
    #[serde(default)]
    pub parallel: bool,
}

impl AssembleOptions {
    fn selection(&self, kind: TableKind) -> Result<QuantitySelection> {
        QuantitySelection::parse(kind, self.quantities.as_deref())
    }
}

/// Result of a batch: the concatenated completed rows, or nothing at all
#[derive(Debug, Clone, PartialEq)]
pub enum Assembled<K> {
    /// Rows of every work unit, grouped by country then assignment order
    Completed(Vec<CompletedRecord<K>>),
    /// No work unit produced any row
    Empty,
}

impl<K> Assembled<K> {
    fn from_rows(rows: Vec<CompletedRecord<K>>) -> Self {
        if rows.is_empty() {
            Assembled::Empty
        } else {
            Assembled::Completed(rows)
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Assembled::Empty)
    }

    pub fn records(&self) -> &[CompletedRecord<K>] {
        match self {
            Assembled::Completed(rows) => rows,
            Assembled::Empty => &[],
        }
    }

    pub fn into_records(self) -> Vec<CompletedRecord<K>> {
        match self {
            Assembled::Completed(rows) => rows,
            Assembled::Empty => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }
}

/// One (country, year) completion job
#[derive(Debug, Clone, Copy)]
struct WorkUnit<'a> {
    country: &'a str,
    year: i32,
    exemplars: &'a [String],
}

/// Work units for the requested countries, in country then assignment order
fn work_units<'a>(
    assignments: &'a [ExemplarAssignment],
    countries: &'a [String],
    max_year: Option<i32>,
) -> Vec<WorkUnit<'a>> {
    let mut units = Vec::new();
    for country in countries {
        let before = units.len();
        units.extend(
            assignments
                .iter()
                .filter(|a| a.country == *country)
                .filter(|a| max_year.map_or(true, |max| a.year <= max))
                .map(|a| WorkUnit {
                    country: country.as_str(),
                    year: a.year,
                    exemplars: &a.exemplars,
                }),
        );
        if units.len() == before {
            debug!(country = %country, "no exemplar assignments, skipping");
        }
    }
    units
}

/// Run every unit and concatenate the results in unit order
fn run_units<K, F>(units: &[WorkUnit<'_>], parallel: bool, complete: F) -> Result<Vec<CompletedRecord<K>>>
where
    K: Send,
    F: Fn(&WorkUnit<'_>) -> Result<Vec<CompletedRecord<K>>> + Sync,
{
    let attempt = |unit: &WorkUnit<'_>| {
        complete(unit).map_err(|e| e.in_unit(unit.country, unit.year))
    };

    let per_unit: Vec<Vec<CompletedRecord<K>>> = if parallel {
        units.par_iter().map(attempt).collect::<Result<_>>()?
    } else {
        units.iter().map(attempt).collect::<Result<_>>()?
    };

    Ok(per_unit.into_iter().flatten().collect())
}

/// Complete allocation tables for every country and assignment year.
///
/// `incomplete` holds the allocation rows of all countries; exemplar rows are
/// read from the same table. `iea` supplies each target's final energy flows.
/// An unsupported quantity in `options` is rejected before any unit runs.
pub fn assemble_allocation_tables(
    incomplete: &[AllocationRecord],
    assignments: &[ExemplarAssignment],
    iea: &[IeaRecord],
    countries: &[String],
    options: &AssembleOptions,
) -> Result<Assembled<AllocationKey>> {
    let selection = options.selection(TableKind::Allocation)?;
    let _span = info_span!("assemble", kind = %TableKind::Allocation).entered();

    let tables = TableIndex::new(incomplete);
    let context = TableIndex::new(iea);
    let units = work_units(assignments, countries, options.max_year);

    let rows = run_units(&units, options.parallel, |unit| {
        let exemplars = resolve(&tables, unit.country, unit.exemplars, unit.year);
        complete_allocation_table(
            unit.country,
            unit.year,
            tables.lookup(unit.country, unit.year),
            &exemplars,
            context.lookup(unit.country, unit.year),
            &selection,
        )
    })?;

    info!(
        countries = countries.len(),
        units = units.len(),
        rows = rows.len(),
        "assembled allocation tables"
    );
    Ok(Assembled::from_rows(rows))
}

/// Complete efficiency tables for every country and assignment year.
///
/// `allocation` is the completed allocation table covering the same
/// countries and years; it defines which machines need efficiencies and
/// supplies the machine energy flows.
pub fn assemble_efficiency_tables(
    incomplete: &[EfficiencyRecord],
    assignments: &[ExemplarAssignment],
    allocation: &[CompletedAllocation],
    countries: &[String],
    options: &AssembleOptions,
) -> Result<Assembled<MachineKey>> {
    let selection = options.selection(TableKind::Efficiency)?;
    check_allocation_context(&selection, allocation)?;
    let _span = info_span!("assemble", kind = %TableKind::Efficiency).entered();

    let tables = TableIndex::new(incomplete);
    let context = TableIndex::new(allocation);
    let units = work_units(assignments, countries, options.max_year);

    let rows = run_units(&units, options.parallel, |unit| {
        let exemplars = resolve(&tables, unit.country, unit.exemplars, unit.year);
        complete_efficiency_table(
            unit.country,
            unit.year,
            tables.lookup(unit.country, unit.year),
            &exemplars,
            context.lookup(unit.country, unit.year),
            &selection,
        )
    })?;

    info!(
        countries = countries.len(),
        units = units.len(),
        rows = rows.len(),
        "assembled efficiency tables"
    );
    Ok(Assembled::from_rows(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::io::{parse_exemplar_lists_str, parse_table_str};
    use crate::schema::{Quantity, Source};

    const ALLOCATIONS: &str = "Country,Year,Ef.product,Destination,Machine,Eu.product,Quantity,.values,Unit\n\
GHA,1971,Kerosene,Residential,Kerosene lamps,Light,C,1,ktoe\n\
ZAF,1971,Primary solid biofuels,Residential,Wood cookstoves,Heat,C,1,ktoe\n\
ZAF,1971,Kerosene,Residential,Kerosene stoves,Heat,C,1,ktoe\n\
ZAF,1972,Primary solid biofuels,Residential,Wood cookstoves,Heat,C,1,ktoe\n";

    const IEA: &str = "Country,Year,Product,Flow,E.dot,Unit\n\
GHA,1971,Primary solid biofuels,Residential,100,ktoe\n\
GHA,1971,Kerosene,Residential,50,ktoe\n\
GHA,1972,Primary solid biofuels,Residential,110,ktoe\n\
ZAF,1971,Kerosene,Residential,500,ktoe\n";

    const EXEMPLARS: &str = "Country,Year,Exemplars\n\
GHA,1971,ZAF\n\
GHA,1972,ZAF\n\
ZAF,1971,\n";

    struct Inputs {
        allocations: Vec<AllocationRecord>,
        iea: Vec<IeaRecord>,
        exemplars: Vec<ExemplarAssignment>,
    }

    fn inputs() -> Inputs {
        Inputs {
            allocations: parse_table_str(ALLOCATIONS, "alloc.csv").unwrap().records,
            iea: parse_table_str(IEA, "iea.csv").unwrap().records,
            exemplars: parse_exemplar_lists_str(EXEMPLARS, "exemplars.csv")
                .unwrap()
                .records,
        }
    }

    fn countries(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    fn fractions_only() -> AssembleOptions {
        AssembleOptions {
            quantities: Some(vec!["C".to_string()]),
            ..Default::default()
        }
    }

    #[test]
    fn test_assemble_groups_by_country_and_year() {
        let inputs = inputs();
        let assembled = assemble_allocation_tables(
            &inputs.allocations,
            &inputs.exemplars,
            &inputs.iea,
            &countries(&["GHA", "ZAF"]),
            &fractions_only(),
        )
        .unwrap();

        let keys: Vec<(&str, i32, &str)> = assembled
            .records()
            .iter()
            .map(|r| (r.country.as_str(), r.year, r.source.label()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("GHA", 1971, "own data"),
                ("GHA", 1971, "ZAF"),
                ("GHA", 1972, "ZAF"),
                ("ZAF", 1971, "own data"),
                ("ZAF", 1971, "own data"),
            ]
        );
    }

    #[test]
    fn test_max_year_filters_assignments() {
        let inputs = inputs();
        let options = AssembleOptions {
            max_year: Some(1971),
            ..fractions_only()
        };
        let assembled = assemble_allocation_tables(
            &inputs.allocations,
            &inputs.exemplars,
            &inputs.iea,
            &countries(&["GHA"]),
            &options,
        )
        .unwrap();

        assert_eq!(assembled.len(), 2);
        assert!(assembled.records().iter().all(|r| r.year == 1971));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let inputs = inputs();
        let all = countries(&["GHA", "ZAF"]);
        let sequential = assemble_allocation_tables(
            &inputs.allocations,
            &inputs.exemplars,
            &inputs.iea,
            &all,
            &AssembleOptions::default(),
        )
        .unwrap();
        let parallel = assemble_allocation_tables(
            &inputs.allocations,
            &inputs.exemplars,
            &inputs.iea,
            &all,
            &AssembleOptions {
                parallel: true,
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_no_assignments_is_empty() {
        let inputs = inputs();
        let assembled = assemble_allocation_tables(
            &inputs.allocations,
            &inputs.exemplars,
            &inputs.iea,
            &countries(&["USA", "BRA"]),
            &AssembleOptions::default(),
        )
        .unwrap();

        assert!(assembled.is_empty());
        assert_eq!(assembled, Assembled::Empty);
        assert!(assembled.into_records().is_empty());
    }

    #[test]
    fn test_unsupported_quantity_rejected_up_front() {
        let inputs = inputs();
        let options = AssembleOptions {
            quantities: Some(vec!["eta.fu".to_string()]),
            ..Default::default()
        };
        let err = assemble_allocation_tables(
            &inputs.allocations,
            &inputs.exemplars,
            &inputs.iea,
            &countries(&["GHA"]),
            &options,
        )
        .unwrap_err();

        assert!(matches!(err, Error::UnsupportedQuantity { .. }));
    }

    #[test]
    fn test_unit_failure_carries_country_and_year() {
        let mut inputs = inputs();
        inputs.iea.push(IeaRecord {
            country: "GHA".to_string(),
            year: 1972,
            product: "Electricity".to_string(),
            flow: "Residential".to_string(),
            e_dot: 5.0,
            unit: "TJ".to_string(),
        });
        let err = assemble_allocation_tables(
            &inputs.allocations,
            &inputs.exemplars,
            &inputs.iea,
            &countries(&["GHA"]),
            &AssembleOptions::default(),
        )
        .unwrap_err();

        match err {
            Error::Unit { country, year, source } => {
                assert_eq!(country, "GHA");
                assert_eq!(year, 1972);
                assert!(matches!(*source, Error::InconsistentUnits { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_efficiency_rejects_allocation_without_fractions() {
        let inputs = inputs();
        let flows_only = AssembleOptions {
            quantities: Some(vec!["E.dot".to_string()]),
            ..Default::default()
        };
        let allocation = assemble_allocation_tables(
            &inputs.allocations,
            &inputs.exemplars,
            &inputs.iea,
            &countries(&["GHA"]),
            &flows_only,
        )
        .unwrap()
        .into_records();
        assert!(!allocation.is_empty());

        let efficiencies: Vec<EfficiencyRecord> = parse_table_str(
            "Country,Year,Machine,Eu.product,Quantity,.values,Unit\n\
ZAF,1971,Kerosene lamps,Light,eta.fu,0.02,\n\
ZAF,1971,Kerosene lamps,Light,phi.u,0.95,\n",
            "eta.csv",
        )
        .unwrap()
        .records;
        let err = assemble_efficiency_tables(
            &efficiencies,
            &inputs.exemplars,
            &allocation,
            &countries(&["GHA"]),
            &AssembleOptions {
                quantities: Some(vec!["eta.fu".to_string(), "phi.u".to_string()]),
                ..Default::default()
            },
        )
        .unwrap_err();

        assert!(matches!(
            err,
            Error::MissingAllocationQuantity { quantity: Quantity::C, .. }
        ));
    }

    #[test]
    fn test_assemble_efficiency_from_completed_allocation() {
        let inputs = inputs();
        let allocation = assemble_allocation_tables(
            &inputs.allocations,
            &inputs.exemplars,
            &inputs.iea,
            &countries(&["GHA"]),
            &AssembleOptions::default(),
        )
        .unwrap()
        .into_records();

        let efficiencies: Vec<EfficiencyRecord> = parse_table_str(
            "Country,Year,Machine,Eu.product,Quantity,.values,Unit\n\
GHA,1971,Kerosene lamps,Light,eta.fu,0.02,\n\
ZAF,1971,Kerosene lamps,Light,phi.u,0.95,\n\
ZAF,1971,Wood cookstoves,Heat,eta.fu,0.15,\n\
ZAF,1971,Wood cookstoves,Heat,phi.u,0.2,\n",
            "eta.csv",
        )
        .unwrap()
        .records;

        let options = AssembleOptions {
            max_year: Some(1971),
            quantities: Some(vec!["eta.fu".to_string(), "phi.u".to_string()]),
            parallel: false,
        };
        let assembled = assemble_efficiency_tables(
            &efficiencies,
            &inputs.exemplars,
            &allocation,
            &countries(&["GHA"]),
            &options,
        )
        .unwrap();

        let rows = assembled.records();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].source, Source::Own);
        assert_eq!(rows[0].quantity, Quantity::EtaFu);
        assert!(rows[1..]
            .iter()
            .all(|r| r.source == Source::Exemplar("ZAF".to_string())));
    }
}
