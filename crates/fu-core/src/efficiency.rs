//! Completion of final-to-useful efficiency tables
//!
//! Each (Machine, Eu.product) used by the target's completed allocation table
//! needs an `eta.fu` and a `phi.u`. The two are resolved independently, so a
//! machine may keep its own efficiency and borrow its exergy ratio.

use crate::completer::{
    check_key_fields, check_value, common_unit, first_exemplar_match, percent_of, unresolved,
};
use crate::error::{Error, Result};
use crate::resolver::ExemplarTable;
use crate::schema::{col, Quantity, QuantitySelection, Source, PERCENT_UNIT};
use crate::table::{
    completed_from, CompletedAllocation, CompletedEfficiency, EfficiencyRecord, KeyedRecord,
    MachineKey,
};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Machines used by a completed allocation table and the energy they receive
#[derive(Debug, Default)]
pub struct MachineFlows {
    machines: Vec<MachineKey>,
    flows: HashMap<MachineKey, f64>,
    unit: Option<String>,
}

impl MachineFlows {
    /// Collect machines with an allocation fraction, and sum the `E.dot`
    /// rows reaching each of them.
    pub fn from_allocation(
        country: &str,
        year: i32,
        allocation: &[&CompletedAllocation],
    ) -> Result<Self> {
        let unit = common_unit(
            country,
            year,
            allocation
                .iter()
                .filter(|r| r.quantity == Quantity::EDot)
                .filter_map(|r| r.unit.as_deref()),
        )?;

        let mut machines = Vec::new();
        let mut seen = HashSet::new();
        let mut flows: HashMap<MachineKey, f64> = HashMap::new();
        for record in allocation {
            if record.key.machine.is_empty() {
                continue;
            }
            let Some(value) = record.value else {
                continue;
            };
            let key = record.key.machine_key();
            match record.quantity {
                Quantity::C => {
                    if seen.insert(key.clone()) {
                        machines.push(key);
                    }
                }
                Quantity::EDot => *flows.entry(key).or_insert(0.0) += value,
                _ => {}
            }
        }

        Ok(Self {
            machines,
            flows,
            unit,
        })
    }

    /// Machines needing efficiencies, in allocation order
    pub fn machines(&self) -> &[MachineKey] {
        &self.machines
    }

    pub fn flow(&self, key: &MachineKey) -> Option<f64> {
        self.flows.get(key).copied()
    }

    /// Energy into all machines
    pub fn total(&self) -> f64 {
        self.machines.iter().filter_map(|m| self.flow(m)).sum()
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }
}

/// Allocation quantities an efficiency completion with `selection` reads:
/// `C` for the machine list, `E.dot` for the machine flows
fn required_allocation_quantities(selection: &QuantitySelection) -> Vec<(Quantity, &'static str)> {
    let mut required = vec![(Quantity::C, "the machine list")];
    if selection.contains(Quantity::EDotMachine) || selection.contains(Quantity::EDotMachinePercent) {
        required.push((Quantity::EDot, "machine flows"));
    }
    required
}

fn missing(quantity: Quantity, needed_for: &str) -> Error {
    Error::MissingAllocationQuantity {
        quantity,
        needed_for: needed_for.to_string(),
    }
}

/// Reject an allocation selection that cannot feed the efficiency selection
pub fn check_selection_pair(
    allocation: &QuantitySelection,
    efficiency: &QuantitySelection,
) -> Result<()> {
    for (quantity, needed_for) in required_allocation_quantities(efficiency) {
        if !allocation.contains(quantity) {
            return Err(missing(quantity, needed_for));
        }
    }
    Ok(())
}

/// Reject a completed allocation table that lacks the quantities the
/// efficiency selection reads. An empty table passes.
pub fn check_allocation_context(
    selection: &QuantitySelection,
    allocation: &[CompletedAllocation],
) -> Result<()> {
    if allocation.is_empty() {
        return Ok(());
    }
    let has = |quantity: Quantity| allocation.iter().any(|r| r.quantity == quantity);
    let has_fractions = allocation
        .iter()
        .any(|r| r.quantity == Quantity::C && r.value.is_some());

    for (quantity, needed_for) in required_allocation_quantities(selection) {
        // Flows only exist for valued fractions
        let satisfied = match quantity {
            Quantity::EDot => has(quantity) || !has_fractions,
            _ => has(quantity),
        };
        if !satisfied {
            return Err(missing(quantity, needed_for));
        }
    }
    Ok(())
}

fn validate_row(country: &str, year: i32, record: &EfficiencyRecord) -> Result<()> {
    check_key_fields(
        country,
        year,
        &[
            (col::MACHINE, record.machine.as_str()),
            (col::EU_PRODUCT, record.eu_product.as_str()),
        ],
    )?;
    if let Some(value) = record.value {
        check_value(
            country,
            year,
            &record.key(),
            record.quantity,
            value,
            0.0,
            f64::MAX,
        )?;
    }
    Ok(())
}

/// Complete one country/year efficiency table.
///
/// `allocation` is the target's completed allocation table for the same year.
/// Only the completable quantities in `selection` (`eta.fu`, `phi.u`) are
/// looked up; `E.dot_machine` and its percentage are recomputed from
/// `allocation`.
pub fn complete_efficiency_table(
    country: &str,
    year: i32,
    own: &[&EfficiencyRecord],
    exemplars: &[ExemplarTable<'_, EfficiencyRecord>],
    allocation: &[&CompletedAllocation],
    selection: &QuantitySelection,
) -> Result<Vec<CompletedEfficiency>> {
    let context = MachineFlows::from_allocation(country, year, allocation)?;
    let wanted: Vec<Quantity> = selection.completable().collect();

    // Own data, in input order; first valued row per key and quantity wins
    let mut completed: Vec<CompletedEfficiency> = Vec::new();
    let mut present: HashSet<(MachineKey, Quantity)> = HashSet::new();
    for record in own.iter().copied() {
        if record.value.is_none() || !wanted.contains(&record.quantity) {
            continue;
        }
        validate_row(country, year, record)?;
        if present.insert((record.key(), record.quantity)) {
            completed.push(completed_from(record, country, year, Source::Own));
        }
    }

    let mut borrowed_count = 0usize;
    let mut unresolved_count = 0usize;
    for machine in context.machines() {
        for &quantity in &wanted {
            if present.contains(&(machine.clone(), quantity)) {
                continue;
            }
            let found = first_exemplar_match(exemplars, |r| {
                r.quantity == quantity
                    && r.machine == machine.machine
                    && r.eu_product == machine.eu_product
            });
            match found {
                Some(mut borrowed) => {
                    // One value per key: the first row of the winning exemplar
                    borrowed.records.truncate(1);
                    for record in &borrowed.records {
                        validate_row(country, year, record)?;
                    }
                    debug!(
                        country,
                        year,
                        machine = %machine,
                        %quantity,
                        exemplar = %borrowed.exemplar,
                        "borrowed efficiency"
                    );
                    borrowed_count += 1;
                    completed.extend(borrowed.into_completed(country, year));
                }
                None => {
                    unresolved_count += 1;
                    completed.push(unresolved(country, year, machine.clone(), quantity));
                }
            }
        }
    }

    debug!(
        country,
        year,
        own = present.len(),
        borrowed = borrowed_count,
        unresolved = unresolved_count,
        "completed efficiency table"
    );

    completed.extend(derive_machine_flows(country, year, &context, selection));
    Ok(completed)
}

/// Machine-level energy flows recomputed from the target's allocation
fn derive_machine_flows(
    country: &str,
    year: i32,
    context: &MachineFlows,
    selection: &QuantitySelection,
) -> Vec<CompletedEfficiency> {
    let want_absolute = selection.contains(Quantity::EDotMachine);
    let want_percent = selection.contains(Quantity::EDotMachinePercent);
    if !want_absolute && !want_percent {
        return Vec::new();
    }

    let total = context.total();
    let mut absolute = Vec::new();
    let mut percent = Vec::new();

    for machine in context.machines() {
        let Some(flow) = context.flow(machine) else {
            continue;
        };
        let record = |quantity, value, unit: Option<&str>| CompletedEfficiency {
            country: country.to_string(),
            year,
            key: machine.clone(),
            quantity,
            value: Some(value),
            unit: unit.map(str::to_string),
            source: Source::Own,
        };
        if want_absolute {
            absolute.push(record(Quantity::EDotMachine, flow, context.unit()));
        }
        if want_percent {
            if let Some(share) = percent_of(flow, total) {
                percent.push(record(Quantity::EDotMachinePercent, share, Some(PERCENT_UNIT)));
            }
        }
    }

    absolute.extend(percent);
    absolute
}
