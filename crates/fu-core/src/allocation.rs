//! Completion of final-to-useful allocation tables
//!
//! The unit of substitution is an (Ef.product, Destination) flow: all machine
//! rows of a flow come either from the target's own table or from a single
//! exemplar. Absolute flows are never copied; they are rebuilt from the
//! borrowed fractions and the target's own IEA data.

use crate::completer::{
    check_key_fields, check_value, common_unit, first_exemplar_match, percent_of, unresolved,
    warn_on_unit_mismatch,
};
use crate::error::Result;
use crate::resolver::ExemplarTable;
use crate::schema::{col, Quantity, QuantitySelection, Source, PERCENT_UNIT};
use crate::table::{
    completed_from, AllocationKey, AllocationRecord, CompletedAllocation, FlowKey, IeaRecord,
    KeyedRecord,
};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Tolerance on allocation fractions before they are rejected
const FRACTION_TOLERANCE: f64 = 1e-9;

/// Final energy flows of one country/year, in first-seen order
#[derive(Debug, Default)]
pub struct FlowTotals {
    flows: Vec<(FlowKey, f64)>,
    positions: HashMap<FlowKey, usize>,
    unit: Option<String>,
}

impl FlowTotals {
    /// Sum the IEA context rows by (Product, Flow), dropping zero flows.
    ///
    /// Fails when the rows mix units or carry non-finite values.
    pub fn from_context(country: &str, year: i32, iea: &[&IeaRecord]) -> Result<Self> {
        let unit = common_unit(country, year, iea.iter().map(|r| r.unit.as_str()))?;

        let mut totals = FlowTotals {
            unit,
            ..Default::default()
        };
        for record in iea {
            let key = record.flow_key();
            check_value(country, year, &key, Quantity::EDot, record.e_dot, f64::MIN, f64::MAX)?;
            match totals.positions.get(&key) {
                Some(&pos) => totals.flows[pos].1 += record.e_dot,
                None => {
                    totals.positions.insert(key.clone(), totals.flows.len());
                    totals.flows.push((key, record.e_dot));
                }
            }
        }
        totals.flows.retain(|(_, e_dot)| *e_dot != 0.0);
        totals.positions = totals
            .flows
            .iter()
            .enumerate()
            .map(|(i, (key, _))| (key.clone(), i))
            .collect();
        Ok(totals)
    }

    /// Flows that must be allocated, in context order
    pub fn keys(&self) -> impl Iterator<Item = &FlowKey> {
        self.flows.iter().map(|(key, _)| key)
    }

    pub fn get(&self, key: &FlowKey) -> Option<f64> {
        self.positions.get(key).map(|&i| self.flows[i].1)
    }

    /// Total final energy of the country/year
    pub fn total(&self) -> f64 {
        self.flows.iter().map(|(_, e_dot)| e_dot).sum()
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }
}

fn is_allocation_row(record: &AllocationRecord) -> bool {
    record.quantity == Quantity::C && record.value.is_some()
}

fn validate_row(country: &str, year: i32, record: &AllocationRecord) -> Result<()> {
    check_key_fields(
        country,
        year,
        &[
            (col::EF_PRODUCT, record.ef_product.as_str()),
            (col::DESTINATION, record.destination.as_str()),
            (col::MACHINE, record.machine.as_str()),
            (col::EU_PRODUCT, record.eu_product.as_str()),
        ],
    )?;
    if let Some(value) = record.value {
        check_value(
            country,
            year,
            &record.key(),
            Quantity::C,
            value,
            -FRACTION_TOLERANCE,
            1.0 + FRACTION_TOLERANCE,
        )?;
    }
    Ok(())
}

/// Complete one country/year allocation table.
///
/// `own` holds the target's rows for the year, `exemplars` the resolved
/// exemplar tables in priority order, and `iea` the target's final energy
/// context for the year. Rows of quantities other than `C` in the inputs are
/// ignored; derived quantities are recomputed.
pub fn complete_allocation_table(
    country: &str,
    year: i32,
    own: &[&AllocationRecord],
    exemplars: &[ExemplarTable<'_, AllocationRecord>],
    iea: &[&IeaRecord],
    selection: &QuantitySelection,
) -> Result<Vec<CompletedAllocation>> {
    let totals = FlowTotals::from_context(country, year, iea)?;

    // Flows with at least one valued own fraction are kept as the target's
    // own group; flows whose own rows are all blank are filled as a whole below
    let covered: HashSet<FlowKey> = own
        .iter()
        .filter(|r| is_allocation_row(r))
        .map(|r| r.key().flow_key())
        .collect();

    // Own data, in input order
    let mut fractions: Vec<CompletedAllocation> = Vec::new();
    let mut present: Vec<FlowKey> = Vec::new();
    let mut borrowed_count = 0usize;
    let mut unresolved_count = 0usize;
    for record in own.iter().copied().filter(|r| r.quantity == Quantity::C) {
        let flow = record.key().flow_key();
        if !covered.contains(&flow) {
            continue;
        }
        validate_row(country, year, record)?;
        if !present.contains(&flow) {
            present.push(flow);
        }
        if record.value.is_some() {
            fractions.push(completed_from(record, country, year, Source::Own));
            continue;
        }

        // A blank machine row inside an own group is filled on its full key
        let found = first_exemplar_match(exemplars, |r| {
            r.quantity == Quantity::C && r.key() == record.key()
        });
        match found {
            Some(mut borrowed) => {
                borrowed.records.truncate(1);
                for row in &borrowed.records {
                    validate_row(country, year, row)?;
                }
                debug!(
                    country,
                    year,
                    key = %record.key(),
                    exemplar = %borrowed.exemplar,
                    "borrowed blank allocation row"
                );
                let rows = borrowed.into_completed(country, year);
                warn_on_unit_mismatch(&rows, totals.unit());
                borrowed_count += rows.len();
                fractions.extend(rows);
            }
            None => {
                unresolved_count += 1;
                fractions.push(unresolved(country, year, record.key(), Quantity::C));
            }
        }
    }

    // Gaps, in context order
    for flow in totals.keys() {
        if present.contains(flow) {
            continue;
        }
        let found = first_exemplar_match(exemplars, |r| {
            r.quantity == Quantity::C
                && r.ef_product == flow.ef_product
                && r.destination == flow.destination
        });
        match found {
            Some(borrowed) => {
                for record in &borrowed.records {
                    validate_row(country, year, record)?;
                }
                debug!(
                    country,
                    year,
                    flow = %flow,
                    exemplar = %borrowed.exemplar,
                    rows = borrowed.records.len(),
                    "borrowed allocation"
                );
                let rows = borrowed.into_completed(country, year);
                warn_on_unit_mismatch(&rows, totals.unit());
                borrowed_count += rows.len();
                fractions.extend(rows);
            }
            None => {
                unresolved_count += 1;
                fractions.push(unresolved(
                    country,
                    year,
                    AllocationKey::flow(flow.ef_product.clone(), flow.destination.clone()),
                    Quantity::C,
                ));
            }
        }
    }

    debug!(
        country,
        year,
        own = fractions.len() - borrowed_count - unresolved_count,
        borrowed = borrowed_count,
        unresolved = unresolved_count,
        "completed allocation table"
    );

    let derived = derive_flows(&fractions, &totals, selection);
    let mut completed = Vec::with_capacity(fractions.len() + derived.len());
    if selection.contains(Quantity::C) {
        completed.extend(fractions);
    }
    completed.extend(derived);
    Ok(completed)
}

/// Rebuild machine-level flows from fractions and the target's own totals
fn derive_flows(
    fractions: &[CompletedAllocation],
    totals: &FlowTotals,
    selection: &QuantitySelection,
) -> Vec<CompletedAllocation> {
    let want_absolute = selection.contains(Quantity::EDot);
    let want_percent = selection.contains(Quantity::EDotPercent);
    if !want_absolute && !want_percent {
        return Vec::new();
    }

    let grand_total = totals.total();
    let mut absolute = Vec::new();
    let mut percent = Vec::new();

    for fraction in fractions {
        let Some(c) = fraction.value else {
            continue;
        };
        let Some(flow_total) = totals.get(&fraction.key.flow_key()) else {
            continue;
        };
        let e_dot = c * flow_total;

        if want_absolute {
            absolute.push(CompletedAllocation {
                quantity: Quantity::EDot,
                value: Some(e_dot),
                unit: totals.unit().map(str::to_string),
                ..fraction.clone()
            });
        }
        if want_percent {
            if let Some(share) = percent_of(e_dot, grand_total) {
                percent.push(CompletedAllocation {
                    quantity: Quantity::EDotPercent,
                    value: Some(share),
                    unit: Some(PERCENT_UNIT.to_string()),
                    ..fraction.clone()
                });
            }
        }
    }

    absolute.extend(percent);
    absolute
}
