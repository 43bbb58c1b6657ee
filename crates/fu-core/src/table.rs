//! Core table types for tidy final-to-useful data

use crate::schema::{Quantity, Source, MISSING_VALUE};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A record that belongs to one country and year
pub trait TidyRecord {
    fn country(&self) -> &str;
    fn year(&self) -> i32;
}

/// A record of a final-to-useful table, addressable by a typed key
pub trait KeyedRecord: TidyRecord {
    /// Category key identifying the row within one country/year
    type Key: Clone + Eq + Ord + std::hash::Hash + fmt::Display;

    fn key(&self) -> Self::Key;
    fn quantity(&self) -> Quantity;
    /// `None` when the cell is blank, i.e. the entry is missing
    fn value(&self) -> Option<f64>;
    fn unit(&self) -> &str;
}

/// Read a `.values` cell. An empty cell or `NA` is a missing entry.
pub(crate) fn deserialize_value<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let cell: Option<String> = Option::deserialize(deserializer)?;
    match cell.as_deref().map(str::trim) {
        None | Some("") | Some(MISSING_VALUE) => Ok(None),
        Some(text) => text
            .parse::<f64>()
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid value '{text}': {e}"))),
    }
}

/// A parsed table of tidy records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table<R> {
    /// Row data
    pub records: Vec<R>,
    /// Source file path
    pub source_path: PathBuf,
}

impl<R> Table<R> {
    /// Create a table from records
    pub fn new(records: Vec<R>, source_path: impl Into<PathBuf>) -> Self {
        Self {
            records,
            source_path: source_path.into(),
        }
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.records.len()
    }
}

/// One row of a final-to-useful allocation table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationRecord {
    #[serde(rename = "Country")]
    pub country: String,
    #[serde(rename = "Year")]
    pub year: i32,
    #[serde(rename = "Ef.product")]
    pub ef_product: String,
    #[serde(rename = "Destination")]
    pub destination: String,
    #[serde(rename = "Machine", default)]
    pub machine: String,
    #[serde(rename = "Eu.product", default)]
    pub eu_product: String,
    #[serde(rename = "Quantity")]
    pub quantity: Quantity,
    #[serde(rename = ".values", deserialize_with = "crate::table::deserialize_value")]
    pub value: Option<f64>,
    #[serde(rename = "Unit", default)]
    pub unit: String,
}

/// Key of an allocation row within one country/year
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AllocationKey {
    pub ef_product: String,
    pub destination: String,
    /// Empty for a destination-level gap that no exemplar could fill
    pub machine: String,
    pub eu_product: String,
}

impl AllocationKey {
    pub fn new(
        ef_product: impl Into<String>,
        destination: impl Into<String>,
        machine: impl Into<String>,
        eu_product: impl Into<String>,
    ) -> Self {
        Self {
            ef_product: ef_product.into(),
            destination: destination.into(),
            machine: machine.into(),
            eu_product: eu_product.into(),
        }
    }

    /// Key for an (Ef.product, Destination) pair with no machine attached
    pub fn flow(ef_product: impl Into<String>, destination: impl Into<String>) -> Self {
        Self::new(ef_product, destination, "", "")
    }

    /// The (Ef.product, Destination) pair this key belongs to
    pub fn flow_key(&self) -> FlowKey {
        FlowKey::new(self.ef_product.clone(), self.destination.clone())
    }

    /// The (Machine, Eu.product) pair this key belongs to
    pub fn machine_key(&self) -> MachineKey {
        MachineKey::new(self.machine.clone(), self.eu_product.clone())
    }
}

impl fmt::Display for AllocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.ef_product, self.destination)?;
        if !self.machine.is_empty() {
            write!(f, " -> {} -> {}", self.machine, self.eu_product)?;
        }
        Ok(())
    }
}

impl TidyRecord for AllocationRecord {
    fn country(&self) -> &str {
        &self.country
    }

    fn year(&self) -> i32 {
        self.year
    }
}

impl KeyedRecord for AllocationRecord {
    type Key = AllocationKey;

    fn key(&self) -> AllocationKey {
        AllocationKey::new(
            self.ef_product.clone(),
            self.destination.clone(),
            self.machine.clone(),
            self.eu_product.clone(),
        )
    }

    fn quantity(&self) -> Quantity {
        self.quantity
    }

    fn value(&self) -> Option<f64> {
        self.value
    }

    fn unit(&self) -> &str {
        &self.unit
    }
}

/// One row of a final-to-useful efficiency table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyRecord {
    #[serde(rename = "Country")]
    pub country: String,
    #[serde(rename = "Year")]
    pub year: i32,
    #[serde(rename = "Machine")]
    pub machine: String,
    #[serde(rename = "Eu.product")]
    pub eu_product: String,
    #[serde(rename = "Quantity")]
    pub quantity: Quantity,
    #[serde(rename = ".values", deserialize_with = "crate::table::deserialize_value")]
    pub value: Option<f64>,
    #[serde(rename = "Unit", default)]
    pub unit: String,
}

/// Key of an efficiency row: the machine and the useful product it makes
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MachineKey {
    pub machine: String,
    pub eu_product: String,
}

impl MachineKey {
    pub fn new(machine: impl Into<String>, eu_product: impl Into<String>) -> Self {
        Self {
            machine: machine.into(),
            eu_product: eu_product.into(),
        }
    }
}

impl fmt::Display for MachineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.machine, self.eu_product)
    }
}

impl TidyRecord for EfficiencyRecord {
    fn country(&self) -> &str {
        &self.country
    }

    fn year(&self) -> i32 {
        self.year
    }
}

impl KeyedRecord for EfficiencyRecord {
    type Key = MachineKey;

    fn key(&self) -> MachineKey {
        MachineKey::new(self.machine.clone(), self.eu_product.clone())
    }

    fn quantity(&self) -> Quantity {
        self.quantity
    }

    fn value(&self) -> Option<f64> {
        self.value
    }

    fn unit(&self) -> &str {
        &self.unit
    }
}

/// One row of IEA final energy data used as completion context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IeaRecord {
    #[serde(rename = "Country")]
    pub country: String,
    #[serde(rename = "Year")]
    pub year: i32,
    #[serde(rename = "Product")]
    pub product: String,
    /// Final demand sector; matches `Destination` in allocation tables
    #[serde(rename = "Flow")]
    pub flow: String,
    #[serde(rename = "E.dot")]
    pub e_dot: f64,
    #[serde(rename = "Unit")]
    pub unit: String,
}

impl IeaRecord {
    pub fn flow_key(&self) -> FlowKey {
        FlowKey::new(self.product.clone(), self.flow.clone())
    }
}

impl TidyRecord for IeaRecord {
    fn country(&self) -> &str {
        &self.country
    }

    fn year(&self) -> i32 {
        self.year
    }
}

/// An (Ef.product, Destination) pair: the unit of allocation
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlowKey {
    pub ef_product: String,
    pub destination: String,
}

impl FlowKey {
    pub fn new(ef_product: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            ef_product: ef_product.into(),
            destination: destination.into(),
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.ef_product, self.destination)
    }
}

/// A record of a completed table with its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedRecord<K> {
    pub country: String,
    pub year: i32,
    pub key: K,
    pub quantity: Quantity,
    /// `None` only for unresolved gaps
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub source: Source,
}

impl<K> CompletedRecord<K> {
    pub fn is_unresolved(&self) -> bool {
        self.source == Source::Unresolved
    }
}

impl<K> TidyRecord for CompletedRecord<K> {
    fn country(&self) -> &str {
        &self.country
    }

    fn year(&self) -> i32 {
        self.year
    }
}

/// A completed record carried over from an input row, relabelled for the target
pub fn completed_from<R: KeyedRecord>(
    record: &R,
    country: &str,
    year: i32,
    source: Source,
) -> CompletedRecord<R::Key> {
    CompletedRecord {
        country: country.to_string(),
        year,
        key: record.key(),
        quantity: record.quantity(),
        value: record.value(),
        unit: Some(record.unit().to_string()),
        source,
    }
}

/// Completed allocation row
pub type CompletedAllocation = CompletedRecord<AllocationKey>;

/// Completed efficiency row
pub type CompletedEfficiency = CompletedRecord<MachineKey>;

/// An exemplar assignment: the ordered countries whose data may stand in for
/// a country's missing data in one year, highest priority first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExemplarAssignment {
    pub country: String,
    pub year: i32,
    pub exemplars: Vec<String>,
}

impl TidyRecord for ExemplarAssignment {
    fn country(&self) -> &str {
        &self.country
    }

    fn year(&self) -> i32 {
        self.year
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(machine: &str, value: Option<f64>) -> AllocationRecord {
        AllocationRecord {
            country: "GHA".to_string(),
            year: 1971,
            ef_product: "Primary solid biofuels".to_string(),
            destination: "Residential".to_string(),
            machine: machine.to_string(),
            eu_product: "Heat".to_string(),
            quantity: Quantity::C,
            value,
            unit: "ktoe".to_string(),
        }
    }

    #[test]
    fn test_allocation_key_display() {
        let key = record("Wood cookstoves", Some(1.0)).key();
        assert_eq!(
            key.to_string(),
            "Primary solid biofuels -> Residential -> Wood cookstoves -> Heat"
        );
        assert_eq!(
            AllocationKey::flow("Kerosene", "Residential").to_string(),
            "Kerosene -> Residential"
        );
    }

    #[test]
    fn test_flow_and_machine_keys() {
        let key = record("Wood cookstoves", Some(1.0)).key();
        assert_eq!(key.flow_key(), FlowKey::new("Primary solid biofuels", "Residential"));
        assert_eq!(key.machine_key(), MachineKey::new("Wood cookstoves", "Heat"));
    }

    #[test]
    fn test_completed_from_relabels_country() {
        let rec = record("Wood cookstoves", Some(0.4));
        let completed = completed_from(&rec, "TGO", 1980, Source::Exemplar("GHA".to_string()));
        assert_eq!(completed.country, "TGO");
        assert_eq!(completed.year, 1980);
        assert_eq!(completed.value, Some(0.4));
        assert_eq!(completed.unit.as_deref(), Some("ktoe"));
        assert!(!completed.is_unresolved());
    }

    #[test]
    fn test_table_counts() {
        let table = Table::new(vec![record("A", None), record("B", Some(1.0))], "alloc.csv");
        assert_eq!(table.row_count(), 2);
    }
}
