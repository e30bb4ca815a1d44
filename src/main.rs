use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};

use sales_ledger::{
    format_brl, load_settings_with_fallback, read_grid_from_path, summarize_months,
    summarize_range, ColumnSelection, DedupIngestor, FileKind, IngestMode, ReconciliationEngine,
    SalesQueries, SalesSummary, Settings, SqliteStore,
};

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Mode {
    /// Insert only orders not yet persisted
    Append,
    /// Overwrite every order present in the file
    Replace,
}

impl From<Mode> for IngestMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Append => IngestMode::Append,
            Mode::Replace => IngestMode::Replace,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "sales-ledger", version, about = "Sales ledger reconciliation and ingestion")]
struct Cli {
    /// Settings file (default: ./settings.json when present)
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database and tables
    Init,

    /// Compare the system ledger with an external (processor) ledger day by day
    Reconcile {
        /// System export (.csv, .xlsx, .xls, .ods)
        #[arg(long)]
        system: PathBuf,

        /// External export (.csv, .xlsx, .xls, .ods)
        #[arg(long)]
        external: PathBuf,

        #[arg(long)]
        system_date: Option<String>,

        #[arg(long)]
        system_amount: Option<String>,

        #[arg(long)]
        external_date: Option<String>,

        #[arg(long)]
        external_amount: Option<String>,

        /// Overrides the configured per-day tolerance
        #[arg(long)]
        tolerance: Option<f64>,
    },

    /// Load an order export into the sales ledger
    Ingest {
        file: PathBuf,

        #[arg(long, value_enum, default_value = "append")]
        mode: Mode,
    },

    /// List months with orders, newest first
    Months,

    /// Sales figures for months (YYYY-MM) or a date range (YYYY-MM-DD)
    Summary {
        #[arg(long = "month")]
        months: Vec<String>,

        #[arg(long, requires = "end")]
        start: Option<NaiveDate>,

        #[arg(long, requires = "start")]
        end: Option<NaiveDate>,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let settings = load_settings_with_fallback(cli.config.as_deref())
        .context("Failed to load settings")?;

    match cli.command {
        Command::Init => run_init(&settings),
        Command::Reconcile {
            system,
            external,
            system_date,
            system_amount,
            external_date,
            external_amount,
            tolerance,
        } => {
            let selection = ColumnSelection {
                system_date,
                system_amount,
                external_date,
                external_amount,
            };
            run_reconcile(&settings, &system, &external, &selection, tolerance, cli.json)
        }
        Command::Ingest { file, mode } => run_ingest(&settings, &file, mode.into(), cli.json),
        Command::Months => run_months(&settings, cli.json),
        Command::Summary { months, start, end } => {
            run_summary(&settings, &months, start.zip(end), cli.json)
        }
    }
}

fn open_store(settings: &Settings) -> Result<SqliteStore> {
    SqliteStore::open(&settings.database).with_context(|| {
        format!(
            "Failed to open database {}",
            settings.database.path.display()
        )
    })
}

fn run_init(settings: &Settings) -> Result<()> {
    println!("🔧 Setting up database...");
    let store = open_store(settings)?;
    println!(
        "✓ {} ready (table '{}', WAL mode, {} orders)",
        settings.database.path.display(),
        store.table(),
        store.order_count()?
    );
    Ok(())
}

fn run_reconcile(
    settings: &Settings,
    system: &Path,
    external: &Path,
    selection: &ColumnSelection,
    tolerance: Option<f64>,
    json: bool,
) -> Result<()> {
    let delimiter = settings.parsing.csv_delimiter;
    let system_grid = read_grid_from_path(system, delimiter)
        .with_context(|| format!("Failed to read {}", system.display()))?;
    let external_grid = read_grid_from_path(external, delimiter)
        .with_context(|| format!("Failed to read {}", external.display()))?;

    let mut engine = ReconciliationEngine::from_settings(settings);
    if let Some(t) = tolerance {
        if !(t >= 0.0) {
            bail!("tolerance must be a non-negative number, got {}", t);
        }
        engine.tolerance = t;
    }

    let report = engine.reconcile(&system_grid, &external_grid, selection)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("⚖️  Reconciliation");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "{:<12} {:>16} {:>16} {:>14}",
        "Data", "Sistema", "Externo", "Diferença"
    );
    for row in &report.rows {
        println!(
            "{:<12} {:>16} {:>16} {:>14} {}",
            row.display_date(),
            format_brl(row.system_amount),
            format_brl(row.external_amount),
            format_brl(row.difference),
            if row.is_matched() { "✓" } else { "✗" }
        );
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "{:<12} {:>16} {:>16} {:>14}",
        "TOTAL",
        format_brl(report.totals.system_total),
        format_brl(report.totals.external_total),
        format_brl(report.totals.total_difference)
    );

    let dropped = report.skipped_total().rows_dropped();
    if dropped > 0 {
        println!("⚠️  {} rows without a readable date were skipped", dropped);
    }
    if report.is_balanced() {
        println!("\n✅ All {} days within tolerance", report.rows.len());
    } else {
        println!(
            "\n❌ {} of {} days outside tolerance ({})",
            report.mismatched().len(),
            report.rows.len(),
            format_brl(report.tolerance)
        );
    }
    Ok(())
}

fn run_ingest(settings: &Settings, file: &Path, mode: IngestMode, json: bool) -> Result<()> {
    let name = file.to_string_lossy();
    let kind = FileKind::from_filename_with_delimiter(&name, settings.parsing.csv_delimiter)?;
    let bytes = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;

    let mut store = open_store(settings)?;
    let ingestor = DedupIngestor::from_settings(settings);
    let report = ingestor.ingest_bytes(&mut store, &bytes, kind, mode)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("📥 Ingesting {} ({})", file.display(), mode);
    println!("✓ Rows read: {}", report.source_rows);
    println!("✓ Orders after consolidation: {}", report.consolidated_count);
    println!("✓ Already persisted: {}", report.already_persisted);
    if mode == IngestMode::Replace {
        println!("✓ Replaced: {}", report.replaced_count);
    }
    println!("💾 Written: {}", report.inserted_count);
    for (reason, n) in report.skipped.iter() {
        println!("⚠️  {} rows: {}", reason, n);
    }
    for warning in &report.warnings {
        println!("⚠️  {}", warning);
    }
    println!("✓ Database contains {} orders", store.order_count()?);
    Ok(())
}

fn run_months(settings: &Settings, json: bool) -> Result<()> {
    let store = open_store(settings)?;
    let months = store.available_months()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&months)?);
    } else if months.is_empty() {
        println!("No orders yet. Run: sales-ledger ingest <file>");
    } else {
        for month in months {
            println!("{}", month);
        }
    }
    Ok(())
}

fn run_summary(
    settings: &Settings,
    months: &[String],
    range: Option<(NaiveDate, NaiveDate)>,
    json: bool,
) -> Result<()> {
    let store = open_store(settings)?;
    let summary = match range {
        Some((start, end)) => summarize_range(&store, start, end)?,
        None => summarize_months(&store, months)?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &SalesSummary) {
    if summary.is_empty() {
        println!("No orders in the selected period");
        return;
    }

    println!("📊 Sales Summary");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Venda Líquida: {}", format_brl(summary.net_total));
    println!("Venda Bruta:   {}", format_brl(summary.gross_total));
    println!("Pedidos:       {}", summary.order_count);
    println!("Ticket Médio:  {}", format_brl(summary.average_ticket));

    println!("\nDaily");
    for day in &summary.daily {
        println!("  {}  {:>16}", day.date.format("%d/%m/%Y"), format_brl(day.total_amount));
    }

    println!("\nChannels");
    for channel in &summary.channels {
        println!(
            "  {:<20} {:>16} {:>6.1}%",
            channel.channel,
            format_brl(channel.net_total),
            channel.share * 100.0
        );
    }
}
