//! Command-line entry point for the cosponsorship pipeline.
//!
//! ```bash
//! cosign parse --bills-dir data/bills --db cosign.db
//! cosign parse --cells --topics
//! cosign clean --cells
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use cosign_core::{run_pipeline, Collections, CosignError, Database, PipelineConfig, Stages};

#[derive(Parser, Debug)]
#[command(name = "cosign")]
#[command(about = "Build a bipartisan cosponsorship matrix from bill status XML")]
struct Cli {
    /// SQLite database holding every collection
    #[arg(long, global = true, env = "COSIGN_DB", default_value = "cosign.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run pipeline stages. With no stage flag, every stage runs.
    Parse(ParseArgs),
    /// Drop and recreate collections. With no flag, every collection.
    Clean(CollectionFlags),
}

#[derive(Args, Debug)]
struct ParseArgs {
    /// Directory of bill status XML documents
    #[arg(long, env = "COSIGN_BILLS_DIR", default_value = "bills")]
    bills_dir: PathBuf,

    /// Maximum concurrently running units per stage
    #[arg(long, short = 'j')]
    workers: Option<usize>,

    /// Congress number used in bill links
    #[arg(long)]
    congress: Option<u32>,

    #[command(flatten)]
    stages: CollectionFlags,
}

#[derive(Args, Debug, Clone, Copy)]
struct CollectionFlags {
    #[arg(long)]
    bills: bool,
    #[arg(long)]
    members: bool,
    /// Cells, plus member counts when running stages
    #[arg(long)]
    cells: bool,
    #[arg(long)]
    topics: bool,
}

impl CollectionFlags {
    fn stages(self) -> Stages {
        Stages {
            bills: self.bills,
            members: self.members,
            cells: self.cells,
            topics: self.topics,
        }
        .or_all()
    }

    fn collections(self) -> Collections {
        let selected = Collections {
            bills: self.bills,
            members: self.members,
            cells: self.cells,
            topics: self.topics,
        };
        if selected.is_empty() {
            Collections::ALL
        } else {
            selected
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cosign=info,cosign_core=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn parse(db_path: PathBuf, args: ParseArgs) -> Result<()> {
    let mut config = PipelineConfig::from_env(&args.bills_dir, db_path);
    if let Some(workers) = args.workers {
        config = config.with_workers(workers);
    }
    if let Some(congress) = args.congress {
        config.congress = congress;
    }

    let report = run_pipeline(&config, args.stages.stages())
        .with_context(|| format!("pipeline failed for {}", config.bills_dir.display()))?;
    for stage in &report.stages {
        info!(
            "{:>18}: {} units in {} ms",
            stage.stage, stage.units, stage.elapsed_ms
        );
    }
    info!("Done in {} ms", report.elapsed_ms);
    Ok(())
}

fn clean(db_path: PathBuf, flags: CollectionFlags) -> Result<()> {
    let which = flags.collections();
    let db = Database::new(&db_path)
        .with_context(|| format!("cannot open {}", db_path.display()))?;
    db.init_schema()?;
    db.reset(which)?;
    info!("Cleaned {:?} in {}", which, db_path.display());
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let outcome = match cli.command {
        Command::Parse(args) => parse(cli.db, args),
        Command::Clean(flags) => clean(cli.db, flags),
    };
    if let Err(e) = &outcome {
        if let Some(cause) = e.downcast_ref::<CosignError>() {
            error!("{:?} error: {cause}", cause.category());
        }
    }
    outcome
}
