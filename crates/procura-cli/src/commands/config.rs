//! Config command - inspect and validate configuration.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use console::style;

use procura_core::models::field::FieldSource;
use procura_core::{ConfigStore, EngineConfig};

use super::{default_config_path, load_config};

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Show the engine configuration and a summary of fields and document types
    Show,

    /// Load and validate the field mapping and document patterns
    Validate,

    /// Initialize a new engine configuration file
    Init(InitArgs),

    /// Show configuration file paths
    Path,
}

#[derive(Args)]
struct InitArgs {
    /// Output path for configuration file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Overwrite existing file
    #[arg(long)]
    force: bool,
}

pub fn run(args: ConfigArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show => show_config(config_path),
        ConfigCommand::Validate => validate_config(config_path),
        ConfigCommand::Init(init_args) => init_config(init_args),
        ConfigCommand::Path => show_path(config_path),
    }
}

fn show_config(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);

    let store = ConfigStore::from_config(&config);
    let mapping = store.load_field_mapping()?;
    let types = store.load_document_patterns()?;

    println!();
    println!("{} ({})", style("Document types").bold(), types.len());
    for doc_type in types {
        println!("  {}", doc_type);
    }

    println!();
    println!("{} ({})", style("Fields").bold(), mapping.fields.len());
    for (name, field) in &mapping.fields {
        let source = match &field.source {
            FieldSource::Manual => "manual".to_string(),
            FieldSource::Document(binding) => {
                format!("{} / {}", binding.pdf_type, binding.extraction.spec.method_name())
            }
        };
        let fallback = field
            .fallback_source
            .as_ref()
            .map(|b| format!("  fallback: {}", b.pdf_type))
            .unwrap_or_default();
        println!(
            "  {}  {}  {}  {}{}",
            name,
            field.label,
            field.data_type.as_str(),
            source,
            fallback
        );
    }

    Ok(())
}

fn validate_config(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let store = ConfigStore::from_config(&config);
    store.validate()?;

    let fields = store.load_field_mapping()?.fields.len();
    let manual = store.manual_fields()?.len();
    let types = store.document_type_names()?;

    println!(
        "{} {} fields ({} manual), {} document types: {}",
        style("✓").green(),
        fields,
        manual,
        types.len(),
        types.join(", ")
    );
    Ok(())
}

fn init_config(args: InitArgs) -> anyhow::Result<()> {
    let output_path = args.output.unwrap_or_else(default_config_path);

    if output_path.exists() && !args.force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            output_path.display()
        );
    }

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let config = EngineConfig::default();
    config.save(&output_path)?;

    println!(
        "{} Created configuration file at {}",
        style("✓").green(),
        output_path.display()
    );

    Ok(())
}

fn show_path(config_path: Option<&Path>) -> anyhow::Result<()> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(default_config_path);

    println!("Configuration file: {}", path.display());
    if path.exists() {
        println!("Status: {}", style("exists").green());
    } else {
        println!("Status: {}", style("not created").yellow());
        println!();
        println!("Run 'procura config init' to create a configuration file.");
    }

    if let Ok(config) = load_config(config_path) {
        println!("Field mapping: {}", config.paths.field_mapping.display());
        println!("Document patterns: {}", config.paths.document_patterns.display());
    }

    Ok(())
}
