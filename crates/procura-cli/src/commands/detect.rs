//! Detect command - classify PDF files by document type.

use clap::Args;
use console::style;
use serde::Serialize;

use procura_core::Detection;

use super::{expand_inputs, load_engine};

/// Arguments for the detect command.
#[derive(Args)]
pub struct DetectArgs {
    /// Input files or glob patterns
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct DetectionRow<'a> {
    file: &'a str,
    #[serde(flatten)]
    detection: &'a Detection,
}

pub fn run(args: DetectArgs, config_path: Option<&std::path::Path>) -> anyhow::Result<()> {
    let engine = load_engine(config_path)?;
    let files = expand_inputs(&args.inputs)?;
    let batch = engine.detect_batch(&files)?;

    if args.json {
        let rows: Vec<DetectionRow> = batch
            .groups
            .values()
            .flatten()
            .map(|(file, detection)| DetectionRow { file, detection })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for (doc_type, members) in &batch.groups {
            println!("{} ({})", style(doc_type).bold(), members.len());
            for (file, detection) in members {
                println!(
                    "  {}  {:.2}  {}",
                    file, detection.confidence, detection.method
                );
            }
        }
    }

    for (file, error) in &batch.failures {
        eprintln!("{} {}: {}", style("✗").red(), file, error);
    }

    Ok(())
}
