//! Extract command - fields of a single document.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use tracing::{debug, info};

use super::{format_result, load_engine, start_spinner, write_output, OutputFormat};

/// Arguments for the extract command.
#[derive(Args)]
pub struct ExtractArgs {
    /// Input PDF file
    #[arg(required = true)]
    input: PathBuf,

    /// Document type (detected when omitted)
    #[arg(short = 't', long = "type")]
    doc_type: Option<String>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,
}

pub fn run(args: ExtractArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let start = Instant::now();
    let engine = load_engine(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let doc_type = match args.doc_type {
        Some(doc_type) => doc_type,
        None => {
            let detection = engine.detect(&args.input)?;
            if detection.is_unknown() {
                anyhow::bail!(
                    "Cannot detect the type of {}. Pass --type explicitly.",
                    args.input.display()
                );
            }
            eprintln!(
                "{} Detected {} ({:.2}, {})",
                style("ℹ").blue(),
                detection.document_type,
                detection.confidence,
                detection.method
            );
            detection.document_type
        }
    };

    info!("Extracting {} as {}", args.input.display(), doc_type);
    let spinner = start_spinner(format!("Extracting {}...", doc_type));

    let result = engine.extract(&args.input, &doc_type)?;
    spinner.finish_and_clear();

    let output = format_result(&result, args.format)?;
    write_output(&output, args.output.as_deref())?;

    debug!("Total processing time: {:?}", start.elapsed());
    Ok(())
}
