use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use commission_band::application::engine::{CommissionEngine, EnginePorts};
use commission_band::config::CommissionSettings;
use commission_band::domain::context::OperationContext;
use commission_band::domain::money::CurrencyCode;
use commission_band::domain::ports::{
    BandRepositoryBox, BatchRepositoryBox, CalculationRepositoryBox, DocumentRepositoryBox,
    RuleRepositoryBox, SalespersonConfigRepositoryBox,
};
use commission_band::domain::{CompanyId, UserId};
use commission_band::infrastructure::currency::RateTable;
use commission_band::infrastructure::in_memory::{
    InMemoryBandRepository, InMemoryBatchRepository, InMemoryCalculationRepository,
    InMemoryDirectory, InMemoryDocumentRepository, InMemoryLedger, InMemoryRuleRepository,
    InMemorySalespersonConfigRepository,
};
#[cfg(feature = "storage-rocksdb")]
use commission_band::infrastructure::rocksdb::RocksDBStore;
use commission_band::interfaces::csv::range_reader::RangeReader;
use commission_band::interfaces::csv::summary_writer::SummaryWriter;
use commission_band::interfaces::scenario::Scenario;
use miette::{miette, IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Company the operations run for.
    #[arg(long, global = true, default_value_t = 1)]
    company: CompanyId,

    /// User recorded as the actor of every change.
    #[arg(long, global = true, default_value_t = 1)]
    user: UserId,

    #[arg(long, global = true)]
    primary_currency: Option<CurrencyCode>,

    #[arg(long, global = true)]
    secondary_currency: Option<CurrencyCode>,

    /// Decimal places of computed amounts.
    #[arg(long, global = true)]
    amount_scale: Option<u32>,
}

#[derive(Subcommand)]
enum Command {
    /// Compute commissions for every settled payment of a scenario and print them as CSV.
    Process {
        /// Scenario JSON file
        scenario: PathBuf,
    },
    /// Compute commissions, run a batch over a period and print its payment lines as CSV.
    Batch {
        /// Scenario JSON file
        scenario: PathBuf,
        #[arg(long, requires = "to")]
        from: Option<NaiveDate>,
        #[arg(long, requires = "from")]
        to: Option<NaiveDate>,
        #[arg(long)]
        payment_date: Option<NaiveDate>,
        /// Without --from/--to, batch the month before this date (default: today).
        #[arg(long, conflicts_with = "from")]
        month_of: Option<NaiveDate>,
    },
    /// Check that a CSV of band ranges covers every day offset exactly once.
    CheckBands {
        /// Ranges CSV file
        input: PathBuf,
    },
}

/// The engine-owned repositories, either in memory or in one RocksDB store.
struct Repositories {
    bands: BandRepositoryBox,
    rules: RuleRepositoryBox,
    configs: SalespersonConfigRepositoryBox,
    calculations: CalculationRepositoryBox,
    batches: BatchRepositoryBox,
    documents: DocumentRepositoryBox,
}

impl Repositories {
    fn in_memory() -> Self {
        Self {
            bands: Box::new(InMemoryBandRepository::new()),
            rules: Box::new(InMemoryRuleRepository::new()),
            configs: Box::new(InMemorySalespersonConfigRepository::new()),
            calculations: Box::new(InMemoryCalculationRepository::new()),
            batches: Box::new(InMemoryBatchRepository::new()),
            documents: Box::new(InMemoryDocumentRepository::new()),
        }
    }

    #[cfg(feature = "storage-rocksdb")]
    fn rocksdb(path: PathBuf) -> Result<Self> {
        let store = RocksDBStore::open(path).into_diagnostic()?;
        Ok(Self {
            bands: Box::new(store.clone()),
            rules: Box::new(store.clone()),
            configs: Box::new(store.clone()),
            calculations: Box::new(store.clone()),
            batches: Box::new(store.clone()),
            documents: Box::new(store),
        })
    }

    fn open(db_path: Option<PathBuf>) -> Result<Self> {
        match db_path {
            #[cfg(feature = "storage-rocksdb")]
            Some(path) => Self::rocksdb(path),
            #[cfg(not(feature = "storage-rocksdb"))]
            Some(_) => {
                eprintln!(
                    "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
                );
                Ok(Self::in_memory())
            }
            None => Ok(Self::in_memory()),
        }
    }
}

fn settings(cli: &Cli) -> Result<CommissionSettings> {
    let mut settings = CommissionSettings::from_env().into_diagnostic()?;
    if let Some(code) = &cli.primary_currency {
        settings.primary_currency = code.clone();
    }
    if let Some(code) = &cli.secondary_currency {
        settings.secondary_currency = code.clone();
    }
    if let Some(scale) = cli.amount_scale {
        settings.amount_scale = scale;
    }
    settings.validate().into_diagnostic()?;
    Ok(settings)
}

/// Builds an engine over the scenario's host data and registers its setup.
async fn load_engine(cli: &Cli, scenario_path: &Path) -> Result<CommissionEngine> {
    let scenario = Scenario::from_reader(File::open(scenario_path).into_diagnostic()?).into_diagnostic()?;

    let ledger = InMemoryLedger::new();
    let directory = InMemoryDirectory::new();
    let rates = RateTable::new();
    scenario
        .load_host_data(&ledger, &directory, &rates)
        .await
        .into_diagnostic()?;

    let repositories = Repositories::open(cli.db_path.clone())?;
    let engine = CommissionEngine::new(
        settings(cli)?,
        EnginePorts {
            ledger: Box::new(ledger),
            directory: Box::new(directory),
            currency: Box::new(rates),
            bands: repositories.bands,
            rules: repositories.rules,
            configs: repositories.configs,
            calculations: repositories.calculations,
            batches: repositories.batches,
            documents: repositories.documents,
        },
    );
    scenario
        .register_setup(&engine, cli.user)
        .await
        .into_diagnostic()?;
    Ok(engine)
}

async fn compute(engine: &CommissionEngine, ctx: &OperationContext) -> Result<()> {
    let processed = engine.process_pending_payments(ctx).await.into_diagnostic()?;
    let validated = engine.auto_validate_calculated(ctx).await.into_diagnostic()?;
    for failure in processed.failures.iter().chain(&validated.failures) {
        eprintln!("Error processing record {}: {}", failure.id, failure.error);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("commission_band=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = OperationContext::new(cli.company, cli.user);

    match &cli.command {
        Command::Process { scenario } => {
            let engine = load_engine(&cli, scenario).await?;
            compute(&engine, &ctx).await?;

            let mut calculations = engine.calculations(&ctx).await.into_diagnostic()?;
            calculations.sort_by_key(|c| c.id);
            let stdout = io::stdout();
            let mut writer = SummaryWriter::new(stdout.lock());
            writer
                .write_calculations(calculations.iter().map(|c| c.summary()))
                .into_diagnostic()?;
        }
        Command::Batch {
            scenario,
            from,
            to,
            payment_date,
            month_of,
        } => {
            let engine = load_engine(&cli, scenario).await?;
            compute(&engine, &ctx).await?;

            let batch = match (from, to) {
                (Some(from), Some(to)) => engine
                    .create_batch(&ctx, format!("Commissions {} to {}", from, to), *from, *to, *payment_date)
                    .await
                    .into_diagnostic()?,
                _ => {
                    let date = month_of.unwrap_or_else(|| Utc::now().date_naive());
                    let batch = engine.create_monthly_batch(&ctx, date).await.into_diagnostic()?;
                    match payment_date {
                        Some(day) => engine
                            .set_batch_payment_date(&ctx, batch.id, *day)
                            .await
                            .into_diagnostic()?,
                        None => batch,
                    }
                }
            };
            engine.calculate_batch(&ctx, batch.id).await.into_diagnostic()?;
            engine.review_batch(&ctx, batch.id).await.into_diagnostic()?;
            let document = engine
                .generate_payment_document(&ctx, batch.id)
                .await
                .into_diagnostic()?;
            let summary = engine.batch_summary(&ctx, batch.id).await.into_diagnostic()?;
            info!(
                batch = %summary.name,
                document = %document.number,
                calculations = summary.calculation_count,
                total_primary = %summary.total_primary,
                "batch ready for payment"
            );

            let stdout = io::stdout();
            let mut writer = SummaryWriter::new(stdout.lock());
            writer.write_payment_lines(&document.lines).into_diagnostic()?;
        }
        Command::CheckBands { input } => {
            let file = File::open(input).into_diagnostic()?;
            let (ranges, report) = RangeReader::new(file).coverage().into_diagnostic()?;
            println!("ranges: {}", ranges.len());
            for (first, second) in &report.overlaps {
                println!("overlap: ranges {} and {}", first, second);
            }
            for (from, to) in &report.gaps {
                println!("gap: days {} to {}", from, to);
            }
            if !report.covers_lower {
                println!("missing: lower bound");
            }
            if !report.covers_upper {
                println!("missing: upper bound");
            }
            if !report.is_partition() {
                return Err(miette!("ranges do not partition the day axis"));
            }
            println!("ok");
        }
    }

    Ok(())
}
