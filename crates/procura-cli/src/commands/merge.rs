//! Merge command - extract several documents of one procurement and merge them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use tracing::debug;

use super::{expand_inputs, format_result, load_engine, start_spinner, write_output, OutputFormat};

/// Arguments for the merge command.
#[derive(Args)]
pub struct MergeArgs {
    /// Tagged document, as TYPE=PATH (repeatable)
    #[arg(short, long = "doc", value_parser = parse_tagged)]
    docs: Vec<(String, PathBuf)>,

    /// Untagged files or glob patterns, classified before merging
    inputs: Vec<String>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,
}

fn parse_tagged(s: &str) -> Result<(String, PathBuf), String> {
    let (doc_type, path) = s
        .split_once('=')
        .ok_or_else(|| format!("expected TYPE=PATH, got '{}'", s))?;
    if doc_type.trim().is_empty() || path.trim().is_empty() {
        return Err(format!("expected TYPE=PATH, got '{}'", s));
    }
    Ok((doc_type.trim().to_string(), PathBuf::from(path.trim())))
}

pub fn run(args: MergeArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let start = Instant::now();
    let engine = load_engine(config_path)?;

    if args.docs.is_empty() && args.inputs.is_empty() {
        anyhow::bail!("Nothing to merge. Pass --doc TYPE=PATH or input files.");
    }

    let spinner = start_spinner("Extracting documents...");

    let result = if args.inputs.is_empty() {
        let mut documents: BTreeMap<String, PathBuf> = BTreeMap::new();
        for (doc_type, path) in args.docs {
            if let Some(previous) = documents.insert(doc_type.clone(), path) {
                eprintln!(
                    "{} {} given twice, ignoring {}",
                    style("!").yellow(),
                    doc_type,
                    previous.display()
                );
            }
        }
        engine.extract_all_from_pdfs(&documents)?
    } else {
        if !args.docs.is_empty() {
            anyhow::bail!("Pass either tagged --doc arguments or untagged files, not both.");
        }
        let files = expand_inputs(&args.inputs)?;
        engine.extract_detected(&files)?
    };
    spinner.finish_and_clear();

    let output = format_result(&result, args.format)?;
    write_output(&output, args.output.as_deref())?;

    if !result.requires_confirmation.is_empty() {
        eprintln!(
            "{} {} value(s) require confirmation",
            style("ℹ").blue(),
            result.requires_confirmation.len()
        );
    }

    debug!("Total processing time: {:?}", start.elapsed());
    Ok(())
}
