//! CSV reading and writing of tidy tables

use crate::error::{Error, Result};
use crate::schema::{col, Quantity, Source, EXEMPLAR_SEPARATOR};
use crate::table::{
    AllocationKey, CompletedAllocation, CompletedEfficiency, CompletedRecord, ExemplarAssignment,
    MachineKey, Table,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Load a tidy table from a CSV file
///
/// Columns not used by the record type are ignored. An empty `.values`
/// cell or `NA` is a missing entry.
pub fn load_table<R, P>(path: P) -> Result<Table<R>>
where
    R: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let records = read_records(BufReader::new(file), path)?;
    Ok(Table::new(records, path))
}

/// Parse a tidy table from a string (useful for testing)
pub fn parse_table_str<R: DeserializeOwned>(content: &str, source_name: &str) -> Result<Table<R>> {
    let path = PathBuf::from(source_name);
    let records = read_records(content.as_bytes(), &path)?;
    Ok(Table::new(records, path))
}

fn read_records<R: DeserializeOwned, T: Read>(reader: T, path: &Path) -> Result<Vec<R>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    csv_reader
        .deserialize()
        .collect::<std::result::Result<Vec<R>, csv::Error>>()
        .map_err(|e| Error::Csv {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Row of an exemplar list file: `Country,Year,Exemplars`
#[derive(Debug, Deserialize)]
struct ExemplarRow {
    #[serde(rename = "Country")]
    country: String,
    #[serde(rename = "Year")]
    year: i32,
    #[serde(rename = "Exemplars", default)]
    exemplars: Option<String>,
}

impl From<ExemplarRow> for ExemplarAssignment {
    fn from(row: ExemplarRow) -> Self {
        let exemplars = row
            .exemplars
            .unwrap_or_default()
            .split(EXEMPLAR_SEPARATOR)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        ExemplarAssignment {
            country: row.country.trim().to_string(),
            year: row.year,
            exemplars,
        }
    }
}

/// Load exemplar assignments; exemplars are `;`-separated, highest priority first
pub fn load_exemplar_lists<P: AsRef<Path>>(path: P) -> Result<Table<ExemplarAssignment>> {
    let table = load_table::<ExemplarRow, _>(path)?;
    Ok(Table::new(
        table.records.into_iter().map(Into::into).collect(),
        table.source_path,
    ))
}

/// Parse exemplar assignments from a string
pub fn parse_exemplar_lists_str(
    content: &str,
    source_name: &str,
) -> Result<Table<ExemplarAssignment>> {
    let table = parse_table_str::<ExemplarRow>(content, source_name)?;
    Ok(Table::new(
        table.records.into_iter().map(Into::into).collect(),
        table.source_path,
    ))
}

/// Row of a completed allocation file
#[derive(Debug, Deserialize)]
struct CompletedAllocationRow {
    #[serde(rename = "Country")]
    country: String,
    #[serde(rename = "Year")]
    year: i32,
    #[serde(rename = "Ef.product")]
    ef_product: String,
    #[serde(rename = "Destination")]
    destination: String,
    #[serde(rename = "Machine", default)]
    machine: String,
    #[serde(rename = "Eu.product", default)]
    eu_product: String,
    #[serde(rename = "Quantity")]
    quantity: Quantity,
    #[serde(rename = ".values", deserialize_with = "crate::table::deserialize_value")]
    value: Option<f64>,
    #[serde(rename = "Unit", default)]
    unit: Option<String>,
    #[serde(rename = "Source")]
    source: String,
}

impl CompletedAllocationRow {
    fn into_completed(self) -> Result<CompletedAllocation> {
        Ok(CompletedRecord {
            country: self.country,
            year: self.year,
            key: AllocationKey::new(
                self.ef_product,
                self.destination,
                self.machine,
                self.eu_product,
            ),
            quantity: self.quantity,
            value: self.value,
            unit: self.unit,
            source: Source::parse(&self.source)?,
        })
    }
}

/// Load a completed allocation table, e.g. as context for efficiency completion
pub fn load_completed_allocation<P: AsRef<Path>>(path: P) -> Result<Table<CompletedAllocation>> {
    let table = load_table::<CompletedAllocationRow, _>(path)?;
    let records = table
        .records
        .into_iter()
        .map(CompletedAllocationRow::into_completed)
        .collect::<Result<Vec<_>>>()?;
    Ok(Table::new(records, table.source_path))
}

/// Parse a completed allocation table from a string
pub fn parse_completed_allocation_str(
    content: &str,
    source_name: &str,
) -> Result<Table<CompletedAllocation>> {
    let table = parse_table_str::<CompletedAllocationRow>(content, source_name)?;
    let records = table
        .records
        .into_iter()
        .map(CompletedAllocationRow::into_completed)
        .collect::<Result<Vec<_>>>()?;
    Ok(Table::new(records, table.source_path))
}

/// Key columns of a completed table kind
pub trait KeyColumns {
    fn headers() -> &'static [&'static str];
    fn fields(&self) -> Vec<&str>;
}

impl KeyColumns for AllocationKey {
    fn headers() -> &'static [&'static str] {
        &[col::EF_PRODUCT, col::DESTINATION, col::MACHINE, col::EU_PRODUCT]
    }

    fn fields(&self) -> Vec<&str> {
        vec![
            self.ef_product.as_str(),
            self.destination.as_str(),
            self.machine.as_str(),
            self.eu_product.as_str(),
        ]
    }
}

impl KeyColumns for MachineKey {
    fn headers() -> &'static [&'static str] {
        &[col::MACHINE, col::EU_PRODUCT]
    }

    fn fields(&self) -> Vec<&str> {
        vec![self.machine.as_str(), self.eu_product.as_str()]
    }
}

/// Write completed rows as tidy CSV with a trailing `Source` column
pub fn write_completed<K, W>(writer: W, rows: &[CompletedRecord<K>]) -> csv::Result<()>
where
    K: KeyColumns,
    W: Write,
{
    let mut csv_writer = csv::Writer::from_writer(writer);

    let mut header = vec![col::COUNTRY, col::YEAR];
    header.extend_from_slice(K::headers());
    header.extend_from_slice(&[col::QUANTITY, col::VALUE, col::UNIT, col::SOURCE]);
    csv_writer.write_record(&header)?;

    for row in rows {
        let year = row.year.to_string();
        let value = row.value.map(|v| v.to_string()).unwrap_or_default();
        let mut fields: Vec<&str> = vec![row.country.as_str(), year.as_str()];
        fields.extend(row.key.fields());
        fields.push(row.quantity.as_str());
        fields.push(value.as_str());
        fields.push(row.unit.as_deref().unwrap_or(""));
        fields.push(row.source.label());
        csv_writer.write_record(&fields)?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// Save completed rows to a CSV file
pub fn save_completed<K, P>(path: P, rows: &[CompletedRecord<K>]) -> Result<()>
where
    K: KeyColumns,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::create(path)?;
    write_completed(BufWriter::new(file), rows).map_err(|e| Error::Csv {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Save a completed allocation table
pub fn save_completed_allocation<P: AsRef<Path>>(
    path: P,
    rows: &[CompletedAllocation],
) -> Result<()> {
    save_completed(path, rows)
}

/// Save a completed efficiency table
pub fn save_completed_efficiency<P: AsRef<Path>>(
    path: P,
    rows: &[CompletedEfficiency],
) -> Result<()> {
    save_completed(path, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{AllocationRecord, EfficiencyRecord, IeaRecord};

    #[test]
    fn test_parse_allocation_table() {
        let csv = "Country,Year,Ef.product,Destination,Machine,Eu.product,Quantity,.values,Unit\n\
GHA,1971,Kerosene,Residential,Kerosene lamps,Light,C,1,ktoe\n\
GHA,1971,Kerosene,Residential,Kerosene stoves,Heat,C,,ktoe\n";
        let table = parse_table_str::<AllocationRecord>(csv, "alloc.csv").unwrap();

        assert_eq!(table.row_count(), 2);
        assert_eq!(table.records[0].quantity, Quantity::C);
        assert_eq!(table.records[0].value, Some(1.0));
        assert_eq!(table.records[1].value, None);
        assert_eq!(table.source_path, PathBuf::from("alloc.csv"));
    }

    #[test]
    fn test_parse_na_as_missing() {
        let csv = "Country,Year,Machine,Eu.product,Quantity,.values,Unit\n\
GHA,1971,Wood cookstoves,Heat,eta.fu,NA,\n\
GHA,1971,Wood cookstoves,Heat,phi.u, 0.2 ,\n";
        let table = parse_table_str::<EfficiencyRecord>(csv, "eta.csv").unwrap();
        assert_eq!(table.records[0].value, None);
        assert_eq!(table.records[1].value, Some(0.2));

        let bad = "Country,Year,Machine,Eu.product,Quantity,.values,Unit\n\
GHA,1971,Wood cookstoves,Heat,eta.fu,n/a,\n";
        let err = parse_table_str::<EfficiencyRecord>(bad, "eta.csv").unwrap_err();
        assert!(matches!(err, Error::Csv { .. }));
    }

    #[test]
    fn test_parse_ignores_extra_columns() {
        let csv = "Country,Method,Year,Ledger.side,Product,Flow,E.dot,Unit\n\
GHA,PCM,1971,Consumption,Kerosene,Residential,20.5,ktoe\n";
        let table = parse_table_str::<IeaRecord>(csv, "iea.csv").unwrap();
        assert_eq!(table.records[0].e_dot, 20.5);
        assert_eq!(table.records[0].flow, "Residential");
    }

    #[test]
    fn test_parse_unknown_quantity_fails() {
        let csv = "Country,Year,Machine,Eu.product,Quantity,.values,Unit\n\
GHA,1971,Stoves,Heat,eta,0.2,\n";
        let err = parse_table_str::<EfficiencyRecord>(csv, "eta.csv").unwrap_err();
        assert!(matches!(err, Error::Csv { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_table::<AllocationRecord, _>("does/not/exist.csv").unwrap_err();
        match err {
            Error::FileRead { path, .. } => assert_eq!(path, PathBuf::from("does/not/exist.csv")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_exemplar_lists() {
        let csv = "Country,Year,Exemplars\nGHA,1971,ZAF; USA\nGHA,1972,\nZAF,1971,GHA\n";
        let table = parse_exemplar_lists_str(csv, "exemplars.csv").unwrap();

        assert_eq!(table.records[0].exemplars, vec!["ZAF", "USA"]);
        assert!(table.records[1].exemplars.is_empty());
        assert_eq!(table.records[2].country, "ZAF");
    }

    #[test]
    fn test_completed_allocation_written_and_read_back() {
        let rows = vec![
            CompletedRecord {
                country: "GHA".to_string(),
                year: 1971,
                key: AllocationKey::new("Kerosene", "Residential", "Kerosene lamps", "Light"),
                quantity: Quantity::C,
                value: Some(0.5),
                unit: Some("ktoe".to_string()),
                source: Source::Exemplar("ZAF".to_string()),
            },
            CompletedRecord {
                country: "GHA".to_string(),
                year: 1971,
                key: AllocationKey::flow("Primary solid biofuels", "Residential"),
                quantity: Quantity::C,
                value: None,
                unit: None,
                source: Source::Unresolved,
            },
        ];

        let mut buffer = Vec::new();
        write_completed(&mut buffer, &rows).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.starts_with(
            "Country,Year,Ef.product,Destination,Machine,Eu.product,Quantity,.values,Unit,Source\n"
        ));
        assert!(text.contains("GHA,1971,Kerosene,Residential,Kerosene lamps,Light,C,0.5,ktoe,ZAF"));
        assert!(text.contains("GHA,1971,Primary solid biofuels,Residential,,,C,,,unresolved"));

        let parsed = parse_completed_allocation_str(&text, "completed.csv").unwrap();
        assert_eq!(parsed.records, rows);
    }

    #[test]
    fn test_efficiency_header() {
        let rows: Vec<CompletedEfficiency> = vec![CompletedRecord {
            country: "GHA".to_string(),
            year: 1971,
            key: MachineKey::new("Wood cookstoves", "Heat"),
            quantity: Quantity::PhiU,
            value: Some(0.2),
            unit: Some(String::new()),
            source: Source::Own,
        }];

        let mut buffer = Vec::new();
        write_completed(&mut buffer, &rows).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("Country,Year,Machine,Eu.product,Quantity,.values,Unit,Source")
        );
        assert_eq!(lines.next(), Some("GHA,1971,Wood cookstoves,Heat,phi.u,0.2,,own data"));
    }
}
