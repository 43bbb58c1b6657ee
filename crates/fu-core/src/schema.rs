//! Shared schema definitions for tidy final-to-useful tables
//!
//! Column-role names and quantity names are the contract between the
//! completion engine and whatever reads or writes the tables. They are fixed
//! strings; nothing here is mutable.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Column names used in tidy tables
pub mod col {
    pub const COUNTRY: &str = "Country";
    pub const YEAR: &str = "Year";
    pub const EF_PRODUCT: &str = "Ef.product";
    pub const DESTINATION: &str = "Destination";
    pub const MACHINE: &str = "Machine";
    pub const EU_PRODUCT: &str = "Eu.product";
    pub const QUANTITY: &str = "Quantity";
    pub const VALUE: &str = ".values";
    pub const UNIT: &str = "Unit";
    pub const SOURCE: &str = "Source";
    pub const EXEMPLARS: &str = "Exemplars";

    // IEA context data
    pub const PRODUCT: &str = "Product";
    pub const FLOW: &str = "Flow";
    pub const E_DOT: &str = "E.dot";
}

/// Source label for values taken from the target country's own table
pub const OWN_DATA: &str = "own data";

/// Source label for keys that no exemplar could supply
pub const UNRESOLVED: &str = "unresolved";

/// Separator between country codes in the `Exemplars` column
pub const EXEMPLAR_SEPARATOR: char = ';';

/// Marker for a missing `.values` cell, as written by R
pub const MISSING_VALUE: &str = "NA";

/// Unit attached to percentage quantities
pub const PERCENT_UNIT: &str = "%";

/// The two kinds of final-to-useful tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    /// Final-to-useful allocation (share of each flow going to each machine)
    Allocation,
    /// Final-to-useful efficiency (machine efficiencies and exergy ratios)
    Efficiency,
}

impl TableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableKind::Allocation => "allocation",
            TableKind::Efficiency => "efficiency",
        }
    }

    /// Quantities that can be requested for this kind, in output order
    pub fn supported_quantities(&self) -> &'static [Quantity] {
        match self {
            TableKind::Allocation => &[Quantity::C, Quantity::EDot, Quantity::EDotPercent],
            TableKind::Efficiency => &[
                Quantity::EtaFu,
                Quantity::PhiU,
                Quantity::EDotMachine,
                Quantity::EDotMachinePercent,
            ],
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TableKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allocation" => Ok(TableKind::Allocation),
            "efficiency" => Ok(TableKind::Efficiency),
            other => Err(Error::UnknownTableKind(other.to_string())),
        }
    }
}

/// A quantity stored in the `Quantity` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quantity {
    /// Fraction of an (Ef.product, Destination) flow allocated to a machine
    #[serde(rename = "C")]
    C,
    /// Energy flow into a machine for one (Ef.product, Destination)
    #[serde(rename = "E.dot")]
    EDot,
    /// `EDot` as a percentage of the country's total final energy
    #[serde(rename = "E.dot [%]")]
    EDotPercent,
    /// Final-to-useful efficiency of a machine
    #[serde(rename = "eta.fu")]
    EtaFu,
    /// Exergy-to-energy ratio of the useful product
    #[serde(rename = "phi.u")]
    PhiU,
    /// Total energy flow into a machine
    #[serde(rename = "E.dot_machine")]
    EDotMachine,
    /// `EDotMachine` as a percentage of all machines
    #[serde(rename = "E.dot_machine [%]")]
    EDotMachinePercent,
}

impl Quantity {
    pub const ALL: [Quantity; 7] = [
        Quantity::C,
        Quantity::EDot,
        Quantity::EDotPercent,
        Quantity::EtaFu,
        Quantity::PhiU,
        Quantity::EDotMachine,
        Quantity::EDotMachinePercent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Quantity::C => "C",
            Quantity::EDot => "E.dot",
            Quantity::EDotPercent => "E.dot [%]",
            Quantity::EtaFu => "eta.fu",
            Quantity::PhiU => "phi.u",
            Quantity::EDotMachine => "E.dot_machine",
            Quantity::EDotMachinePercent => "E.dot_machine [%]",
        }
    }

    /// The table kind this quantity belongs to
    pub fn kind(&self) -> TableKind {
        match self {
            Quantity::C | Quantity::EDot | Quantity::EDotPercent => TableKind::Allocation,
            _ => TableKind::Efficiency,
        }
    }

    /// True for quantities borrowed from exemplars; false for quantities
    /// recomputed from context data
    pub fn is_completable(&self) -> bool {
        matches!(self, Quantity::C | Quantity::EtaFu | Quantity::PhiU)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quantity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        Quantity::ALL
            .into_iter()
            .find(|q| q.as_str() == trimmed)
            .ok_or_else(|| trimmed.to_string())
    }
}

/// The set of quantities a completion run produces for one table kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantitySelection {
    kind: TableKind,
    quantities: Vec<Quantity>,
}

impl QuantitySelection {
    /// Every quantity the kind supports
    pub fn all(kind: TableKind) -> Self {
        Self {
            kind,
            quantities: kind.supported_quantities().to_vec(),
        }
    }

    /// Validate requested quantity names against the kind.
    ///
    /// `None` or an empty list selects everything. Unknown names and names
    /// belonging to the other kind are rejected.
    pub fn parse<S: AsRef<str>>(kind: TableKind, requested: Option<&[S]>) -> Result<Self> {
        let requested = match requested {
            Some(names) if !names.is_empty() => names,
            _ => return Ok(Self::all(kind)),
        };

        let mut quantities = Vec::new();
        for name in requested {
            let quantity = name
                .as_ref()
                .parse::<Quantity>()
                .ok()
                .filter(|q| q.kind() == kind)
                .ok_or_else(|| Error::UnsupportedQuantity {
                    kind,
                    quantity: name.as_ref().trim().to_string(),
                })?;
            if !quantities.contains(&quantity) {
                quantities.push(quantity);
            }
        }

        // Keep the kind's canonical ordering regardless of request order
        quantities.sort_by_key(|q| {
            kind.supported_quantities()
                .iter()
                .position(|s| s == q)
                .unwrap_or(usize::MAX)
        });

        Ok(Self { kind, quantities })
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn contains(&self, quantity: Quantity) -> bool {
        self.quantities.contains(&quantity)
    }

    pub fn quantities(&self) -> &[Quantity] {
        &self.quantities
    }

    /// Completable quantities in the selection
    pub fn completable(&self) -> impl Iterator<Item = Quantity> + '_ {
        self.quantities.iter().copied().filter(Quantity::is_completable)
    }
}

/// Where a completed value came from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    /// The target country's own table
    Own,
    /// Borrowed from the named exemplar country
    Exemplar(String),
    /// No exemplar could supply the value
    Unresolved,
}

impl Source {
    pub fn label(&self) -> &str {
        match self {
            Source::Own => OWN_DATA,
            Source::Exemplar(country) => country,
            Source::Unresolved => UNRESOLVED,
        }
    }

    pub fn parse(label: &str) -> Result<Self> {
        match label.trim() {
            OWN_DATA => Ok(Source::Own),
            UNRESOLVED => Ok(Source::Unresolved),
            "" => Err(Error::InvalidSource(label.to_string())),
            country => Ok(Source::Exemplar(country.to_string())),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
