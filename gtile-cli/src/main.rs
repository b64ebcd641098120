use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

mod commands;
mod config;
mod error;

use config::Config;
use error::{format_error_with_suggestions, CliError};
use gtile_core::Engine;

#[derive(Parser)]
#[command(name = "gtile")]
#[command(about = "gtile - tiles and fragments from genomic datasets")]
#[command(version)]
#[command(long_about = "
gtile serves fixed-size tiles from cooler contact matrices, hitile and bigWig
tracks, multivec profiles and SQLite interval databases, and cuts normalized
sub-matrices (fragments) around pairs of genomic loci.

Examples:
  gtile datasets
  gtile info hic-mcool genes
  gtile tiles hic-mcool.4.10.12 hic-mcool.4.11.12.KR genes.3.5
  gtile fragments loops.json --dims 22 --ignore-diags 2
  gtile config --example > gtile.toml
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Number of threads to use
    #[arg(short, long, global = true)]
    pub threads: Option<usize>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the configured datasets
    Datasets,

    /// Print tileset info for dataset uids
    Info {
        /// Dataset uids
        #[arg(required = true)]
        uids: Vec<String>,
    },

    /// Render tiles: `uid.zoom.x` for tracks, `uid.zoom.x.y[.transform]` for matrices
    Tiles {
        /// Tile ids
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Extract fixed-size matrix fragments around pairs of loci
    Fragments {
        /// JSON file with `[[chrom1, start1, end1, chrom2, start2, end2, uid, zoomout], ...]`
        /// or `{"loci": [...]}`; `-` reads standard input
        loci: PathBuf,

        /// Side length of each fragment, in bins
        #[arg(long)]
        dims: Option<usize>,

        /// Percent of each interval's half-width added on both sides
        #[arg(long, default_value = "0")]
        padding: u32,

        /// Percentile used as the normalization ceiling
        #[arg(long, default_value = "100")]
        percentile: f64,

        /// Number of diagonals to mask
        #[arg(long, default_value = "0")]
        ignore_diags: usize,

        /// Decimals to round to (0 disables rounding)
        #[arg(long, default_value = "0")]
        precision: u32,

        /// Use raw counts instead of balanced values
        #[arg(long)]
        no_balance: bool,

        /// Skip percentile normalization
        #[arg(long)]
        no_normalize: bool,

        /// Bypass the result cache
        #[arg(long)]
        no_cache: bool,
    },

    /// Print or write a configuration file
    Config {
        /// Print an example configuration
        #[arg(long)]
        example: bool,

        /// Write the configuration to this path instead of printing it
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn setup_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .target(env_logger::Target::Stderr)
        .init();
}

fn build_engine(config: &Config) -> Result<Engine, CliError> {
    let registry = config.registry()?;
    let catalog = config.catalog()?;
    log::debug!(
        "Registered {} datasets and {} coordinate systems",
        config.datasets.len(),
        config.chromsizes.len()
    );
    Ok(Engine::builder(Arc::new(registry))
        .catalog(Arc::new(catalog))
        .config(config.engine.clone())
        .build())
}

async fn run(cli: Cli, config: Config) -> Result<(), CliError> {
    if let Commands::Config { example, out } = &cli.command {
        return commands::config::execute(&config, *example, out.as_deref());
    }

    let engine = build_engine(&config)?;
    let output = commands::Output { pretty: cli.pretty };
    let result = match cli.command {
        Commands::Datasets => commands::datasets::execute(&engine, output).await,
        Commands::Info { uids } => commands::info::execute(&engine, output, &uids).await,
        Commands::Tiles { ids } => commands::tiles::execute(&engine, output, &ids).await,
        Commands::Fragments {
            loci,
            dims,
            padding,
            percentile,
            ignore_diags,
            precision,
            no_balance,
            no_normalize,
            no_cache,
        } => {
            let options = gtile_core::FragmentOptions {
                dims: dims.unwrap_or(config.engine.default_fragment_dims),
                padding,
                balance: !no_balance,
                percentile,
                ignore_diags,
                normalize: !no_normalize,
                precision,
                no_cache,
            };
            commands::fragments::execute(&engine, output, &loci, &options).await
        }
        Commands::Config { .. } => Ok(()),
    };
    engine.shutdown();
    result
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = Config::load(cli.config.as_deref())?;

    let threads = cli.threads.unwrap_or(config.general.threads).max(1);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .context("Failed to set thread count")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(threads)
        .max_blocking_threads(threads * 4)
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    if let Err(e) = runtime.block_on(run(cli, config)) {
        eprintln!("Error: {}", format_error_with_suggestions(&e));
        std::process::exit(1);
    }

    Ok(())
}
