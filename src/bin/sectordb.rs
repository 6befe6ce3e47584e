//! sectordb - run a reduction job against the sector database
//!
//! Usage:
//!   sectordb run --config run.toml --job job.toml [--rules rules.json]
//!   sectordb sectors --job job.toml
//!
//! `run` reduces the job's points with the rule table (or treats every
//! needed point as a master without one), consolidates and publishes the
//! table. `sectors` only lists the sectors a job would touch.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use sectordb::needed::Direct;
use sectordb::pipeline::sector_listing;
use sectordb::{Coefficient, Job, PrimeField, Rational, Run, RunConfig, TableEngine};

#[derive(Parser)]
#[command(name = "sectordb")]
#[command(version)]
#[command(about = "Sector-partitioned reduction database")]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(long, global = true)]
    silent: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reduce a job and publish the table
    Run(RunArgs),
    /// List the sectors a job needs, with point counts
    Sectors {
        #[arg(long)]
        job: PathBuf,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Run configuration (TOML)
    #[arg(long)]
    config: PathBuf,

    /// Job description (TOML)
    #[arg(long)]
    job: PathBuf,

    /// Precomputed rule table (JSON)
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Coefficient backend
    #[arg(long, value_enum, default_value_t = Backend::Rational)]
    backend: Backend,

    /// Override the configured suffix
    #[arg(long)]
    suffix: Option<String>,

    /// Skip the run if the output already exists
    #[arg(long)]
    skip: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Backend {
    /// Exact rationals
    Rational,
    /// Residues modulo 2^61 - 1
    Prime,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match (cli.silent, cli.verbose) {
        (true, _) => EnvFilter::new("error"),
        (false, 0) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        (false, 1) => EnvFilter::new("info"),
        (false, 2) => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Run(args) => match args.backend {
            Backend::Rational => run::<Rational>(args),
            Backend::Prime => run::<PrimeField>(args),
        },
        Commands::Sectors { job } => Job::load(&job).map(|job| {
            println!("{}", sector_listing(&job, &Direct));
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run<C: Coefficient>(args: RunArgs) -> sectordb::Result<()> {
    let mut config = RunConfig::load(&args.config)?;
    if args.suffix.is_some() {
        config.suffix = args.suffix;
    }
    config.skip_if_exists |= args.skip;

    let job = Job::load(&args.job)?;
    let mut engine = match &args.rules {
        Some(path) => TableEngine::<C>::load(path)?,
        None => TableEngine::<C>::new(),
    };

    let mut run = Run::<C>::new(config)?;
    let summary = run.execute(&job, &mut engine)?;
    if summary.skipped() {
        info!(path = %summary.output.display(), "nothing to do");
    } else {
        info!(
            path = %summary.output.display(),
            masters = summary.masters,
            rows = summary.published,
            "done"
        );
    }
    Ok(())
}
