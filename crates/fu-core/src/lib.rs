//! fu-core: Core library for completing final-to-useful energy tables
//!
//! This library provides functionality to:
//! - Load FU allocation, FU efficiency, exemplar and IEA tables from CSV
//! - Index tidy tables by (country, year)
//! - Resolve a country's ordered exemplar list into exemplar tables
//! - Fill missing allocation and efficiency values from exemplars with provenance tracking
//! - Assemble completed tables for many countries and years
//! - Write completed tables and completion reports

pub mod allocation;
pub mod assembler;
pub mod completer;
pub mod config;
pub mod efficiency;
pub mod error;
pub mod index;
pub mod io;
pub mod report;
pub mod resolver;
pub mod schema;
pub mod table;

pub use allocation::{complete_allocation_table, FlowTotals};
pub use assembler::{assemble_allocation_tables, assemble_efficiency_tables, AssembleOptions, Assembled};
pub use config::RunConfig;
pub use efficiency::{complete_efficiency_table, MachineFlows};
pub use error::{Error, Result};
pub use index::{lookup, TableIndex};
pub use io::{
    load_completed_allocation, load_exemplar_lists, load_table, parse_table_str, save_completed,
    save_completed_allocation, save_completed_efficiency, write_completed,
};
pub use report::{CompletionReport, ReportHistory};
pub use resolver::{resolve, ExemplarTable};
pub use schema::{Quantity, QuantitySelection, Source, TableKind};
pub use table::{
    AllocationKey, AllocationRecord, CompletedAllocation, CompletedEfficiency, CompletedRecord,
    EfficiencyRecord, ExemplarAssignment, IeaRecord, MachineKey, Table,
};
