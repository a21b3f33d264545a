//! CLI commands.

pub mod config;
pub mod detect;
pub mod extract;
pub mod merge;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use console::style;
use glob::glob;
use indicatif::ProgressBar;
use tracing::debug;

use procura_core::{Engine, EngineConfig, ExtractionResult};

/// Output format for extraction results.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output, one row per field
    Csv,
    /// Plain text summary
    Text,
}

/// Per-user engine config location.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("procura")
        .join("engine.json")
}

/// Engine config from `--config`, the per-user file, or defaults.
///
/// Relative document paths resolve against the config file's directory.
pub fn load_config(config_path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => {
            let path = default_config_path();
            if !path.exists() {
                debug!("No engine config, using defaults");
                return Ok(EngineConfig::default());
            }
            path
        }
    };

    let base = path.parent().unwrap_or(Path::new(".")).to_path_buf();
    Ok(EngineConfig::from_file(&path)?.resolve_paths(&base))
}

pub fn load_engine(config_path: Option<&Path>) -> anyhow::Result<Engine> {
    let engine = Engine::new(load_config(config_path)?);
    engine.validate()?;
    Ok(engine)
}

/// Expand file arguments and glob patterns, keeping argument order.
pub fn expand_inputs(inputs: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        let matches: Vec<PathBuf> = glob(input)?.filter_map(|r| r.ok()).collect();
        if matches.is_empty() {
            // Not a pattern, or nothing matched: pass it on as a path
            files.push(PathBuf::from(input));
        } else {
            files.extend(matches);
        }
    }
    Ok(files)
}

pub fn format_result(result: &ExtractionResult, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(result)?),
        OutputFormat::Csv => format_csv(result),
        OutputFormat::Text => Ok(format_text(result)),
    }
}

fn format_csv(result: &ExtractionResult) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record(["field", "value", "source", "requires_confirmation"])?;
    for (field, value) in &result.values {
        let value = value.as_ref().map(ToString::to_string).unwrap_or_default();
        let source = result.source_of(field).unwrap_or_default();
        let confirm = if result.needs_confirmation(field) { "yes" } else { "no" };
        wtr.write_record([field.as_str(), value.as_str(), source, confirm])?;
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn format_text(result: &ExtractionResult) -> String {
    let mut output = String::new();

    let width = result.values.keys().map(|k| k.chars().count()).max().unwrap_or(0);
    for (field, value) in &result.values {
        let line = match value {
            Some(value) => {
                let source = result.source_of(field).unwrap_or("-");
                let mark = if result.needs_confirmation(field) { " *" } else { "" };
                format!("{:width$}  {}  [{}]{}", field, value, source, mark, width = width)
            }
            None => format!("{:width$}  {}", field, style("-").dim(), width = width),
        };
        output.push_str(&line);
        output.push('\n');
    }

    if !result.requires_confirmation.is_empty() {
        output.push_str(&format!("\n{}\n", style("Requires confirmation:").yellow()));
        for item in &result.requires_confirmation {
            let mapped = item
                .mapped_value
                .as_deref()
                .map(|m| format!(" -> {}", m))
                .unwrap_or_default();
            output.push_str(&format!(
                "  {} ({}, {}): {}{}\n",
                item.field, item.reason, item.source_document, item.extracted_value, mapped
            ));
        }
    }

    if !result.failed_documents.is_empty() {
        output.push_str(&format!("\n{}\n", style("Unreadable documents:").red()));
        for failure in &result.failed_documents {
            output.push_str(&format!(
                "  {} ({}): {}\n",
                failure.document, failure.document_type, failure.error
            ));
        }
    }

    output
}

/// Self-ticking spinner shown while documents are read.
pub fn start_spinner(message: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_message(message.into());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Print `output`, or write it to `path`.
pub fn write_output(output: &str, path: Option<&Path>) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            fs::write(path, output)?;
            eprintln!("{} Output written to {}", style("✓").green(), path.display());
        }
        None => println!("{}", output),
    }
    Ok(())
}
