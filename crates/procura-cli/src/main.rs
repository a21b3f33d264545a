//! CLI application for procurement document field extraction.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use commands::{config, detect, extract, merge};

/// Procura - extract structured fields from procurement PDFs
#[derive(Parser)]
#[command(name = "procura")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to engine config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the document type of PDF files
    Detect(detect::DetectArgs),

    /// Extract fields from a single document
    Extract(extract::ExtractArgs),

    /// Extract and merge fields from several documents
    Merge(merge::MergeArgs),

    /// Inspect and validate configuration
    Config(config::ConfigArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    // RUST_LOG directives refine the -v level
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Detect(args) => detect::run(args, config),
        Commands::Extract(args) => extract::run(args, config),
        Commands::Merge(args) => merge::run(args, config),
        Commands::Config(args) => config::run(args, config),
    }
}
