//! Drillsheets CLI - trace where a spreadsheet number comes from

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use drillsheets::prelude::*;
use drillsheets::{DependencyInfo, DrillDownResponse, DuplicatePolicy};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "drill")]
#[command(
    author,
    version,
    about = "Drill down into spreadsheet formulas and their dependencies"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    tuning: Tuning,

    /// Log progress to stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Resolution limits shared by every command
#[derive(Args)]
struct Tuning {
    /// Cells expanded per range reference
    #[arg(long, global = true, env = "DRILL_RANGE_CAP", default_value = "50")]
    range_cap: usize,

    /// Range cells with a smaller absolute value are hidden
    #[arg(long, global = true, env = "DRILL_MATERIALITY", default_value = "0.01")]
    materiality: f64,

    /// Give up on a resolution after this many milliseconds
    #[arg(long, global = true, env = "DRILL_TIMEOUT_MS", default_value = "30000")]
    timeout_ms: u64,

    /// Show a cell referenced from several places only under its first parent
    #[arg(long, global = true)]
    dedupe: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the sheets of a workbook
    Sheets {
        /// Input workbook (xlsx, xlsm)
        input: PathBuf,
    },

    /// Show a cell's value, formula and complexity
    Inspect {
        /// Input workbook (xlsx, xlsm)
        input: PathBuf,

        /// Sheet name
        sheet: String,

        /// Cell address, e.g. B12
        cell: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the dependency tree of a cell
    #[command(alias = "tree")]
    Drill {
        /// Input workbook (xlsx, xlsm)
        input: PathBuf,

        /// Sheet name
        sheet: String,

        /// Cell address, e.g. B12
        cell: String,

        /// Levels to expand (1-5)
        #[arg(short, long, default_value = "2")]
        depth: usize,

        /// Label cells by a column of their sheet, as SHEET=COLUMN (repeatable)
        #[arg(short = 'n', long = "name-column", value_name = "SHEET=COLUMN")]
        name_columns: Vec<String>,

        /// Print JSON instead of an indented tree
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    let service = DrillService::with_parts(
        drillsheets::MemorySessionStore::new(),
        drillsheets::XlsxLoader,
        service_options(&cli.tuning),
    );

    match cli.command {
        Commands::Sheets { input } => list_sheets(&input),
        Commands::Inspect {
            input,
            sheet,
            cell,
            json,
        } => inspect(&service, &input, &sheet, &cell, json),
        Commands::Drill {
            input,
            sheet,
            cell,
            depth,
            name_columns,
            json,
        } => drill(&service, &input, &sheet, &cell, depth, &name_columns, json),
    }
}

fn service_options(tuning: &Tuning) -> ServiceOptions {
    let defaults = ServiceOptions::default();
    ServiceOptions {
        resolve: ResolveOptions {
            max_range_cells: tuning.range_cap,
            materiality_threshold: tuning.materiality,
            duplicates: if tuning.dedupe {
                DuplicatePolicy::FirstOccurrence
            } else {
                DuplicatePolicy::ResolveFresh
            },
            ..defaults.resolve
        },
        timeout: Duration::from_millis(tuning.timeout_ms),
        ..defaults
    }
}

fn list_sheets(input: &Path) -> Result<()> {
    let workbook = XlsxReader::read_file(input)
        .with_context(|| format!("Failed to open '{}'", input.display()))?;

    for (i, sheet) in workbook.sheets().enumerate() {
        println!(
            "{}\t{}\t{} formulas",
            i,
            sheet.name(),
            sheet.formula_cells().count()
        );
    }

    Ok(())
}

fn open(service: &DrillService, input: &Path) -> Result<String> {
    let upload = service
        .open_workbook(input)
        .with_context(|| format!("Failed to open '{}'", input.display()))?;
    Ok(upload.session_id)
}

fn inspect(
    service: &DrillService,
    input: &Path,
    sheet: &str,
    cell: &str,
    json: bool,
) -> Result<()> {
    let session = open(service, input)?;
    let info = service.analyze_cell(&session, sheet, cell)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Cell: {}!{}", info.sheet_name, info.cell_address);
    match info.value {
        Some(value) => println!("Value: {}", value),
        None => println!("Value: (not a number)"),
    }
    if let Some(formula) = &info.formula {
        println!("Formula: {}", formula);
    }

    let analysis = &info.analysis;
    println!("Complexity: {}", analysis.complexity);
    println!("References: {}", analysis.reference_count);
    if let Some(function) = &analysis.main_function {
        println!("Main function: {}", function);
    }
    if analysis.has_cross_sheet_refs {
        println!("Refers to other sheets");
    }
    if analysis.has_external_refs {
        println!("Links to another workbook");
    }

    Ok(())
}

fn drill(
    service: &DrillService,
    input: &Path,
    sheet: &str,
    cell: &str,
    depth: usize,
    name_columns: &[String],
    json: bool,
) -> Result<()> {
    let session = open(service, input)?;

    for pair in name_columns {
        let Some((naming_sheet, column)) = pair.rsplit_once('=') else {
            bail!("--name-column expects SHEET=COLUMN, got '{}'", pair);
        };
        service.configure_naming(&session, naming_sheet, column)?;
    }

    let response = service.drill_down(&session, sheet, cell, depth)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_tree(&response);
    }

    Ok(())
}

fn print_tree(response: &DrillDownResponse) {
    match &response.source_formula {
        Some(formula) => println!(
            "{} = {}  {}",
            response.source_cell, response.source_value, formula
        ),
        None => println!("{} = {}", response.source_cell, response.source_value),
    }

    if response.dependencies.is_empty() {
        println!("  (no dependencies)");
    }
    for dep in &response.dependencies {
        print_dependency(dep, 1);
    }

    let stats = &response.stats;
    if stats.cells_dropped > 0 {
        eprintln!(
            "Note: {} range cells beyond the cap of each range were not shown",
            stats.cells_dropped
        );
    }
    if stats.cycles_skipped > 0 {
        eprintln!("Note: {} circular references were cut", stats.cycles_skipped);
    }
}

fn print_dependency(dep: &DependencyInfo, level: usize) {
    let indent = "  ".repeat(level);
    let label = dep
        .naming
        .manual_name
        .as_deref()
        .or(dep.naming.resolved_name.as_deref());

    let mut line = format!("{}{} = {}", indent, dep.cell_reference, dep.value);
    if let Some(label) = label {
        line.push_str(&format!("  \"{}\"", label));
    }
    if let Some(formula) = &dep.formula {
        line.push_str(&format!("  {}", formula));
    }
    match dep.termination {
        Some(Termination::ExternalReference) => line.push_str("  [external]"),
        Some(Termination::DepthLimit) => line.push_str("  [+]"),
        None => {}
    }
    println!("{}", line);

    for child in &dep.children {
        print_dependency(child, level + 1);
    }
}

/// Plain stderr logger; level from `-v` or `DRILL_LOG`
mod logger {
    use log::{LevelFilter, Log, Metadata, Record};

    struct StderrLogger;

    impl Log for StderrLogger {
        fn enabled(&self, metadata: &Metadata<'_>) -> bool {
            metadata.level() <= log::max_level()
        }

        fn log(&self, record: &Record<'_>) {
            if self.enabled(record.metadata()) {
                eprintln!("[{} {}] {}", record.level(), record.target(), record.args());
            }
        }

        fn flush(&self) {}
    }

    static LOGGER: StderrLogger = StderrLogger;

    pub fn init(verbose: u8) {
        let level = match verbose {
            0 => std::env::var("DRILL_LOG")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(LevelFilter::Warn),
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        };

        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(level);
        }
    }
}
