//! FU completion CLI
//!
//! Command-line tool for filling gaps in final-to-useful allocation and
//! efficiency tables from exemplar countries.

mod logging;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use fu_core::table::TidyRecord;
use fu_core::{
    assemble_allocation_tables, assemble_efficiency_tables, load_completed_allocation,
    load_exemplar_lists, load_table, lookup, save_completed_allocation, save_completed_efficiency,
    AllocationRecord, AssembleOptions, Assembled, CompletedAllocation, CompletionReport,
    EfficiencyRecord, IeaRecord, Quantity, ReportHistory, RunConfig, TableIndex, TableKind,
};
use logging::{init_logging, LogConfig, LogFormat};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "fu-cli")]
#[command(about = "Complete final-to-useful tables from exemplar countries", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    /// Include module paths in log output
    #[arg(long, global = true)]
    log_target: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Settings shared by both completion commands
#[derive(Args)]
struct BatchArgs {
    /// Exemplar list file (Country,Year,Exemplars)
    #[arg(short, long)]
    exemplars: PathBuf,

    /// Countries to complete, in output order
    #[arg(short, long = "country", required = true)]
    countries: Vec<String>,

    /// Only complete years up to and including this one
    #[arg(long)]
    max_year: Option<i32>,

    /// Quantities to produce (default: all supported)
    #[arg(short, long = "quantity")]
    quantities: Vec<String>,

    /// Run work units in parallel
    #[arg(long)]
    parallel: bool,

    /// Output CSV file
    #[arg(short, long)]
    output: PathBuf,
}

impl BatchArgs {
    fn options(&self) -> AssembleOptions {
        AssembleOptions {
            max_year: self.max_year,
            quantities: (!self.quantities.is_empty()).then(|| self.quantities.clone()),
            parallel: self.parallel,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Complete FU allocation tables
    CompleteAllocation {
        /// Incomplete allocation table (all countries)
        #[arg(short, long)]
        allocation: PathBuf,

        /// IEA final energy data
        #[arg(short, long)]
        iea: PathBuf,

        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Complete FU efficiency tables
    CompleteEfficiency {
        /// Incomplete efficiency table (all countries)
        #[arg(long)]
        efficiency: PathBuf,

        /// Completed allocation table covering the same countries and years
        #[arg(short, long)]
        allocation: PathBuf,

        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Run allocation then efficiency completion from a run file
    Run {
        /// Path to run file (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Create a run file template
    CreateConfig {
        /// Output path for the run file
        #[arg(short, long)]
        output: PathBuf,

        /// Output directory for completed tables
        #[arg(long)]
        output_dir: PathBuf,

        /// Countries to include
        #[arg(short, long = "country")]
        countries: Vec<String>,
    },

    /// Print the rows of one country and year
    Lookup {
        /// Path to CSV file
        #[arg(short, long)]
        file: PathBuf,

        /// What the file holds
        #[arg(short, long, value_enum)]
        table: LookupTable,

        #[arg(short, long)]
        country: String,

        #[arg(short, long)]
        year: i32,
    },

    /// Explain where a completed allocation value came from
    Explain {
        /// Completed allocation table
        #[arg(short, long)]
        file: PathBuf,

        #[arg(short, long)]
        country: String,

        #[arg(short, long)]
        year: i32,

        #[arg(long)]
        ef_product: String,

        #[arg(long)]
        destination: String,

        /// Restrict to one machine
        #[arg(long)]
        machine: Option<String>,

        #[arg(short, long, default_value = "C")]
        quantity: String,

        /// Exemplar list file, to show the priority order
        #[arg(short, long)]
        exemplars: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LookupTable {
    Allocation,
    Efficiency,
    CompletedAllocation,
    Iea,
    Exemplars,
}

fn main() {
    let cli = Cli::parse();
    init_logging(
        &LogConfig::from_verbosity(cli.verbose)
            .with_format(cli.log_format)
            .with_target(cli.log_target),
    );

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands) -> fu_core::Result<()> {
    match command {
        Commands::CompleteAllocation {
            allocation,
            iea,
            batch,
        } => cmd_complete_allocation(&allocation, &iea, &batch),
        Commands::CompleteEfficiency {
            efficiency,
            allocation,
            batch,
        } => cmd_complete_efficiency(&efficiency, &allocation, &batch),
        Commands::Run { config } => cmd_run(&config),
        Commands::CreateConfig {
            output,
            output_dir,
            countries,
        } => cmd_create_config(&output, output_dir, countries),
        Commands::Lookup {
            file,
            table,
            country,
            year,
        } => cmd_lookup(&file, table, &country, year),
        Commands::Explain {
            file,
            country,
            year,
            ef_product,
            destination,
            machine,
            quantity,
            exemplars,
        } => cmd_explain(
            &file,
            &country,
            year,
            &ef_product,
            &destination,
            machine.as_deref(),
            &quantity,
            exemplars.as_deref(),
        ),
    }
}

fn cmd_complete_allocation(allocation: &Path, iea: &Path, batch: &BatchArgs) -> fu_core::Result<()> {
    let options = batch.options();
    let assignments = load_exemplar_lists(&batch.exemplars)?;
    let incomplete = load_table::<AllocationRecord, _>(allocation)?;
    let context = load_table::<IeaRecord, _>(iea)?;
    println!(
        "Loaded {} allocation rows, {} IEA rows, {} exemplar assignments",
        incomplete.row_count(),
        context.row_count(),
        assignments.row_count()
    );

    let assembled = assemble_allocation_tables(
        &incomplete.records,
        &assignments.records,
        &context.records,
        &batch.countries,
        &options,
    )?;

    match assembled {
        Assembled::Empty => println!("No allocation rows produced; nothing written"),
        Assembled::Completed(rows) => {
            save_completed_allocation(&batch.output, &rows)?;
            let report = CompletionReport::from_records(TableKind::Allocation, &batch.countries, &rows);
            print_report(&report);
            println!("Wrote {} rows to {}", rows.len(), batch.output.display());
        }
    }

    Ok(())
}

fn cmd_complete_efficiency(
    efficiency: &Path,
    allocation: &Path,
    batch: &BatchArgs,
) -> fu_core::Result<()> {
    let options = batch.options();
    let assignments = load_exemplar_lists(&batch.exemplars)?;
    let incomplete = load_table::<EfficiencyRecord, _>(efficiency)?;
    let completed_allocation = load_completed_allocation(allocation)?;
    println!(
        "Loaded {} efficiency rows, {} completed allocation rows, {} exemplar assignments",
        incomplete.row_count(),
        completed_allocation.row_count(),
        assignments.row_count()
    );

    let assembled = assemble_efficiency_tables(
        &incomplete.records,
        &assignments.records,
        &completed_allocation.records,
        &batch.countries,
        &options,
    )?;

    match assembled {
        Assembled::Empty => println!("No efficiency rows produced; nothing written"),
        Assembled::Completed(rows) => {
            save_completed_efficiency(&batch.output, &rows)?;
            let report = CompletionReport::from_records(TableKind::Efficiency, &batch.countries, &rows);
            print_report(&report);
            println!("Wrote {} rows to {}", rows.len(), batch.output.display());
        }
    }

    Ok(())
}

fn cmd_run(config_path: &Path) -> fu_core::Result<()> {
    let config = RunConfig::load(config_path)?;
    println!(
        "Loaded run file with {} countries, output to {}",
        config.countries.len(),
        config.output_dir.display()
    );
    fs::create_dir_all(&config.output_dir)?;

    let assignments = load_exemplar_lists(&config.exemplars)?;
    let incomplete = load_table::<AllocationRecord, _>(&config.allocation)?;
    let iea = load_table::<IeaRecord, _>(&config.iea)?;
    let mut history = ReportHistory::load(config.report_output())?;
    for kind in [TableKind::Allocation, TableKind::Efficiency] {
        if let Some(previous) = history.last(kind) {
            println!(
                "Previous {} run at {}: {} rows, {} unresolved",
                kind, previous.timestamp, previous.rows, previous.unresolved
            );
        }
    }

    // Allocation
    println!("\n=== Allocation ===");
    let allocation: Vec<CompletedAllocation> = match assemble_allocation_tables(
        &incomplete.records,
        &assignments.records,
        &iea.records,
        &config.countries,
        &config.allocation_options(),
    )? {
        Assembled::Empty => {
            println!("No allocation rows produced");
            Vec::new()
        }
        Assembled::Completed(rows) => {
            let output = config.allocation_output();
            save_completed_allocation(&output, &rows)?;
            let report = CompletionReport::from_records(TableKind::Allocation, &config.countries, &rows)
                .with_output(&output);
            print_report(&report);
            history.add_entry(report);
            println!("Wrote {}", output.display());
            rows
        }
    };

    // Efficiency
    if let Some(efficiency_path) = &config.efficiency {
        println!("\n=== Efficiency ===");
        let incomplete = load_table::<EfficiencyRecord, _>(efficiency_path)?;
        match assemble_efficiency_tables(
            &incomplete.records,
            &assignments.records,
            &allocation,
            &config.countries,
            &config.efficiency_options(),
        )? {
            Assembled::Empty => println!("No efficiency rows produced"),
            Assembled::Completed(rows) => {
                let output = config.efficiency_output();
                save_completed_efficiency(&output, &rows)?;
                let report =
                    CompletionReport::from_records(TableKind::Efficiency, &config.countries, &rows)
                        .with_output(&output);
                print_report(&report);
                history.add_entry(report);
                println!("Wrote {}", output.display());
            }
        }
    }

    history.save(config.report_output())?;
    info!(reports = history.total_entries(), "saved report history");
    println!("\nReports appended to {}", config.report_output().display());

    Ok(())
}

fn cmd_create_config(output: &Path, output_dir: PathBuf, countries: Vec<String>) -> fu_core::Result<()> {
    let config = RunConfig::template(output_dir, countries);
    config.save(output)?;

    println!("Created run file template: {}", output.display());
    println!("\nEdit the input paths and countries, then run with:");
    println!("  fu-cli run --config {}", output.display());

    Ok(())
}

fn cmd_lookup(file: &Path, table: LookupTable, country: &str, year: i32) -> fu_core::Result<()> {
    match table {
        LookupTable::Allocation => {
            print_matches(&load_table::<AllocationRecord, _>(file)?.records, country, year)
        }
        LookupTable::Efficiency => {
            print_matches(&load_table::<EfficiencyRecord, _>(file)?.records, country, year)
        }
        LookupTable::CompletedAllocation => {
            print_matches(&load_completed_allocation(file)?.records, country, year)
        }
        LookupTable::Iea => print_matches(&load_table::<IeaRecord, _>(file)?.records, country, year),
        LookupTable::Exemplars => print_matches(&load_exemplar_lists(file)?.records, country, year),
    }
}

/// Print matching rows as JSON lines on stdout, the count on stderr
fn print_matches<R: TidyRecord + Serialize>(records: &[R], country: &str, year: i32) -> fu_core::Result<()> {
    let index = TableIndex::new(records);
    let rows = index.lookup(country, year);
    for row in rows {
        println!("{}", serde_json::to_string(row)?);
    }
    eprintln!("{} row(s) for {}/{}", rows.len(), country, year);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_explain(
    file: &Path,
    country: &str,
    year: i32,
    ef_product: &str,
    destination: &str,
    machine: Option<&str>,
    quantity: &str,
    exemplars: Option<&Path>,
) -> fu_core::Result<()> {
    let quantity: Quantity = quantity
        .parse()
        .ok()
        .filter(|q: &Quantity| q.kind() == TableKind::Allocation)
        .ok_or_else(|| fu_core::Error::UnsupportedQuantity {
            kind: TableKind::Allocation,
            quantity: quantity.to_string(),
        })?;

    let table = load_completed_allocation(file)?;
    let index = TableIndex::new(&table.records);
    let matches: Vec<&CompletedAllocation> = index
        .lookup(country, year)
        .iter()
        .copied()
        .filter(|r| r.quantity == quantity)
        .filter(|r| r.key.ef_product == ef_product && r.key.destination == destination)
        .filter(|r| machine.map_or(true, |m| r.key.machine == m))
        .collect();

    println!("Country: {}", country);
    println!("Year: {}", year);
    println!("Flow: {} -> {}", ef_product, destination);
    println!("Quantity: {}", quantity);
    println!();

    if matches.is_empty() {
        println!("No matching rows in {}", file.display());
        return Ok(());
    }

    for row in &matches {
        let value = row
            .value
            .map(|v| v.to_string())
            .unwrap_or_else(|| "(missing)".to_string());
        let unit = row.unit.as_deref().unwrap_or("");
        println!("{}: {} {}  [{}]", row.key, value, unit, row.source);
    }

    if let Some(path) = exemplars {
        let assignments = load_exemplar_lists(path)?;
        let winner = matches[0].source.label();
        println!();
        match lookup(&assignments.records, country, year).first() {
            Some(assignment) if !assignment.exemplars.is_empty() => {
                println!("Exemplars (priority order):");
                for (i, code) in assignment.exemplars.iter().enumerate() {
                    let marker = if code == winner { " <-- supplied" } else { "" };
                    println!("  {}. {}{}", i + 1, code, marker);
                }
            }
            _ => println!("No exemplars assigned for {}/{}", country, year),
        }
    }

    Ok(())
}

fn print_report(report: &CompletionReport) {
    println!(
        "{} table: {} rows over {} country-years ({} borrowed, {} unresolved)",
        report.kind,
        report.rows,
        report.work_units,
        report.borrowed(),
        report.unresolved
    );
    for (source, count) in &report.rows_by_source {
        println!("  {:<12} {}", source, count);
    }
}
