//! Run configuration for a full completion run
//!
//! A run file (JSON) names the input tables, the countries to complete and
//! where the completed tables go. It is the batch counterpart of passing the
//! same settings on the command line.

use crate::assembler::AssembleOptions;
use crate::efficiency::check_selection_pair;
use crate::error::{Error, Result};
use crate::schema::{QuantitySelection, TableKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the completed allocation table inside the output directory
pub const ALLOCATION_OUTPUT: &str = "completed_allocation.csv";

/// File name of the completed efficiency table inside the output directory
pub const EFFICIENCY_OUTPUT: &str = "completed_efficiency.csv";

/// File name of the report history inside the output directory
pub const REPORT_OUTPUT: &str = "completion_reports.json";

/// A full completion run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Incomplete allocation table (all countries)
    pub allocation: PathBuf,
    /// Incomplete efficiency table (all countries); skipped when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub efficiency: Option<PathBuf>,
    /// Exemplar assignments
    pub exemplars: PathBuf,
    /// IEA final energy data
    pub iea: PathBuf,
    /// Directory for completed tables and reports
    pub output_dir: PathBuf,
    /// Countries to complete, in output order
    pub countries: Vec<String>,
    /// Only complete years up to and including this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_year: Option<i32>,
    /// Allocation quantities to produce (all when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocation_quantities: Option<Vec<String>>,
    /// Efficiency quantities to produce (all when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub efficiency_quantities: Option<Vec<String>>,
    /// Run work units in parallel
    #[serde(default)]
    pub parallel: bool,
}

impl RunConfig {
    /// A template with placeholder paths
    pub fn template(output_dir: impl Into<PathBuf>, countries: Vec<String>) -> Self {
        Self {
            allocation: PathBuf::from("fu_allocation.csv"),
            efficiency: Some(PathBuf::from("fu_efficiency.csv")),
            exemplars: PathBuf::from("exemplar_lists.csv"),
            iea: PathBuf::from("iea_final_energy.csv"),
            output_dir: output_dir.into(),
            countries,
            max_year: None,
            allocation_quantities: None,
            efficiency_quantities: None,
            parallel: false,
        }
    }

    /// Load a run file from JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| Error::FileRead {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        let config: RunConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the run file to JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Reject unsupported quantity names, and an allocation selection that
    /// cannot feed the efficiency run, before anything is loaded
    pub fn validate(&self) -> Result<()> {
        let allocation =
            QuantitySelection::parse(TableKind::Allocation, self.allocation_quantities.as_deref())?;
        let efficiency =
            QuantitySelection::parse(TableKind::Efficiency, self.efficiency_quantities.as_deref())?;
        if self.efficiency.is_some() {
            check_selection_pair(&allocation, &efficiency)?;
        }
        Ok(())
    }

    pub fn allocation_options(&self) -> AssembleOptions {
        AssembleOptions {
            max_year: self.max_year,
            quantities: self.allocation_quantities.clone(),
            parallel: self.parallel,
        }
    }

    pub fn efficiency_options(&self) -> AssembleOptions {
        AssembleOptions {
            max_year: self.max_year,
            quantities: self.efficiency_quantities.clone(),
            parallel: self.parallel,
        }
    }

    pub fn allocation_output(&self) -> PathBuf {
        self.output_dir.join(ALLOCATION_OUTPUT)
    }

    pub fn efficiency_output(&self) -> PathBuf {
        self.output_dir.join(EFFICIENCY_OUTPUT)
    }

    pub fn report_output(&self) -> PathBuf {
        self.output_dir.join(REPORT_OUTPUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Quantity;

    #[test]
    fn test_run_config_serialization() {
        let mut config = RunConfig::template("out", vec!["GHA".to_string()]);
        config.max_year = Some(2000);

        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(!json.contains("allocation_quantities"));
        let loaded: RunConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_run_config_minimal_json() {
        let json = r#"{
            "allocation": "a.csv",
            "exemplars": "e.csv",
            "iea": "i.csv",
            "output_dir": "out",
            "countries": ["GHA", "ZAF"]
        }"#;
        let config: RunConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.efficiency, None);
        assert!(!config.parallel);
        assert_eq!(config.allocation_output(), PathBuf::from("out").join(ALLOCATION_OUTPUT));
        assert_eq!(config.efficiency_options().quantities, None);
    }

    #[test]
    fn test_run_config_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        let mut config = RunConfig::template(dir.path(), vec!["GHA".to_string()]);
        config.efficiency_quantities = Some(vec!["eta.fu".to_string()]);

        config.save(&path).unwrap();
        let loaded = RunConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(
            loaded.efficiency_options().quantities,
            Some(vec!["eta.fu".to_string()])
        );
    }

    #[test]
    fn test_run_config_rejects_allocation_that_cannot_feed_efficiency() {
        let mut config = RunConfig::template("out", vec!["GHA".to_string()]);
        config.allocation_quantities = Some(vec!["E.dot".to_string()]);
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            Error::MissingAllocationQuantity { quantity: Quantity::C, .. }
        ));

        config.allocation_quantities = Some(vec!["C".to_string()]);
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            Error::MissingAllocationQuantity { quantity: Quantity::EDot, .. }
        ));

        config.efficiency_quantities = Some(vec!["eta.fu".to_string(), "phi.u".to_string()]);
        assert!(config.validate().is_ok());

        // Without an efficiency table any allocation selection is fine
        config.efficiency = None;
        config.allocation_quantities = Some(vec!["E.dot".to_string()]);
        config.efficiency_quantities = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_run_config_rejects_bad_quantity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        let mut config = RunConfig::template(dir.path(), vec!["GHA".to_string()]);
        config.allocation_quantities = Some(vec!["phi.u".to_string()]);
        config.save(&path).unwrap();

        let err = RunConfig::load(&path).unwrap_err();
        assert!(matches!(err, Error::UnsupportedQuantity { .. }));
    }
}
