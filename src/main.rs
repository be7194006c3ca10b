use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::warn;

mod config;
mod dataset;
mod error;
mod layout;
mod logging;
mod normalize;

use config::{Config, ReferenceConfig, RemoteUrlConfig};
use dataset::assemble::{Assembler, Assembly};
use normalize::batch::{NormalizeReport, Normalizer};

#[derive(Parser, Debug)]
#[command(name = "birads-prep")]
#[command(about = "Prepare BIRADS mammogram folders for vision fine-tuning")]
#[command(long_about = r#"
Prepare BIRADS mammogram folders for vision fine-tuning

Expects <root>/birads<label>/*.png category folders.

Examples:
  # Convert every image to 8-bit RGB/RGBA into a mirrored tree
  birads-prep normalize --source data/İnbreast --output data_rgb/İnbreast

  # Build training_data.jsonl with raw GitHub URLs (30 images per category)
  birads-prep assemble --data-dir data_rgb/İnbreast

  # Same, embedding each image as a base64 data URI
  birads-prep assemble --mode inline-data

  # Both steps using the configured paths
  birads-prep all
"#)]
struct Cli {
    /// JSON configuration file (defaults to <config dir>/birads-prep/config.json if present)
    #[arg(long, global = true, env = "BIRADS_PREP_CONFIG")]
    config: Option<PathBuf>,

    /// Directory that relative paths and remote URLs are resolved against
    #[arg(long, global = true)]
    project_root: Option<PathBuf>,

    #[arg(long, global = true, default_value = "info", value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    /// Print the effective configuration as JSON before running
    #[arg(long, global = true, default_value_t = false)]
    print_config: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert images to 8-bit RGB/RGBA into a mirrored output tree
    Normalize(NormalizeArgs),
    /// Build the JSONL fine-tuning dataset
    Assemble(AssembleArgs),
    /// Normalize, then assemble from the normalized tree
    All {
        #[command(flatten)]
        normalize: NormalizeArgs,
        #[command(flatten)]
        assemble: AssembleArgs,
    },
}

#[derive(Args, Debug, Default)]
struct NormalizeArgs {
    /// Source tree of category folders
    #[arg(long)]
    source: Option<PathBuf>,

    /// Destination tree (must differ from the source)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write PNGs with default instead of best compression
    #[arg(long, default_value_t = false)]
    no_optimize: bool,
}

#[derive(Args, Debug, Default)]
struct AssembleArgs {
    /// Tree of category folders to read images from
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// JSONL file to write (overwritten)
    #[arg(long = "jsonl")]
    output_file: Option<PathBuf>,

    #[arg(long)]
    max_per_category: Option<usize>,

    /// How each image is referenced in the dataset
    #[arg(long, value_enum)]
    mode: Option<ReferenceMode>,

    #[arg(long)]
    system_message: Option<String>,

    #[arg(long)]
    user_text: Option<String>,

    #[arg(long)]
    github_user: Option<String>,

    #[arg(long)]
    github_repo: Option<String>,

    #[arg(long)]
    branch: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum ReferenceMode {
    RemoteUrl,
    InlineData,
}

impl NormalizeArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(source) = &self.source {
            config.normalize.source_dir = source.clone();
        }
        if let Some(output) = &self.output {
            config.normalize.output_dir = output.clone();
        }
        if self.no_optimize {
            config.normalize.optimize = false;
        }
    }
}

impl AssembleArgs {
    fn apply(&self, config: &mut Config) {
        let dataset = &mut config.dataset;
        if let Some(data_dir) = &self.data_dir {
            dataset.data_dir = data_dir.clone();
        }
        if let Some(output_file) = &self.output_file {
            dataset.output_file = output_file.clone();
        }
        if let Some(max) = self.max_per_category {
            dataset.max_per_category = max;
        }
        if let Some(system_message) = &self.system_message {
            dataset.system_message = system_message.clone();
        }
        if let Some(user_text) = &self.user_text {
            dataset.user_text = user_text.clone();
        }

        match self.mode {
            Some(ReferenceMode::InlineData) => dataset.reference = ReferenceConfig::InlineData,
            Some(ReferenceMode::RemoteUrl) => {
                if !matches!(dataset.reference, ReferenceConfig::RemoteUrl(_)) {
                    dataset.reference = ReferenceConfig::RemoteUrl(RemoteUrlConfig::default());
                }
            }
            None => {}
        }

        if let ReferenceConfig::RemoteUrl(remote) = &mut dataset.reference {
            if let Some(user) = &self.github_user {
                remote.user = user.clone();
            }
            if let Some(repo) = &self.github_repo {
                remote.repo = repo.clone();
            }
            if let Some(branch) = &self.branch {
                remote.branch = branch.clone();
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init_logging(logging::LoggingConfig {
        level: logging::parse_level(&cli.log_level),
        json_format: cli.log_json,
        ..Default::default()
    });

    let mut config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    apply_overrides(&cli, &mut config);
    config.project_root = absolute_root(&config.project_root);

    if cli.print_config {
        println!("{}", config.to_json()?);
    }

    match &cli.command {
        Commands::Normalize(_) => {
            let report = run_normalize(&config)?;
            print_normalize_summary(&report);
        }
        Commands::Assemble(_) => {
            let output = config.resolve(&config.dataset.output_file);
            let assembly = run_assemble(&config, &output)?;
            print_assembly_summary(&assembly, &output);
        }
        Commands::All { .. } => {
            let report = run_normalize(&config)?;
            print_normalize_summary(&report);
            let output = config.resolve(&config.dataset.output_file);
            let assembly = run_assemble(&config, &output)?;
            print_assembly_summary(&assembly, &output);
        }
    }

    Ok(())
}

/// Layer command-line flags over the loaded configuration
fn apply_overrides(cli: &Cli, config: &mut Config) {
    if let Some(root) = &cli.project_root {
        config.project_root = root.clone();
    }

    match &cli.command {
        Commands::Normalize(args) => args.apply(config),
        Commands::Assemble(args) => args.apply(config),
        Commands::All { normalize, assemble } => {
            normalize.apply(config);
            // Assemble from what was just normalized unless told otherwise
            if assemble.data_dir.is_none() {
                config.dataset.data_dir = config.normalize.output_dir.clone();
            }
            assemble.apply(config);
        }
    }
}

/// Canonicalize the project root when it exists so URL relativization is stable
fn absolute_root(root: &Path) -> PathBuf {
    std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf())
}

fn run_normalize(config: &Config) -> anyhow::Result<NormalizeReport> {
    let normalizer = Normalizer::from_config(config);
    normalizer.run().context("normalization failed")
}

fn run_assemble(config: &Config, output: &Path) -> anyhow::Result<Assembly> {
    let assembler = Assembler::from_config(config);
    assembler.run(output).context("dataset assembly failed")
}

fn print_normalize_summary(report: &NormalizeReport) {
    println!("{}", "=".repeat(60));
    println!("✅ Conversion complete!");
    for folder in &report.folders {
        println!(
            "  {}: {} converted, {} copied, {} errors",
            folder.name, folder.tally.converted, folder.tally.copied, folder.tally.errors
        );
    }
    println!("  Processed: {} images", report.totals.total());
    println!("  Converted: {} images", report.totals.converted);
    println!("  Copied (already RGB/RGBA): {} images", report.totals.copied);
    if report.totals.errors > 0 {
        println!("  Errors: {} images", report.totals.errors);
        for failure in &report.failures {
            println!("    ✗ {}: {}", failure.path.display(), failure.reason);
        }
    }
    println!("\nConverted images saved to: {}", report.output_dir.display());
    println!(
        "Finished at {} ({:.1}s)",
        report.finished_at.format("%Y-%m-%d %H:%M:%S UTC"),
        report.elapsed_secs()
    );
}

fn print_assembly_summary(assembly: &Assembly, output: &Path) {
    println!("✅ Successfully created {}", output.display());
    println!("  Total examples: {}", assembly.examples.len());
    println!("\nSummary by category:");
    for category in &assembly.categories {
        if category.truncated() > 0 {
            println!(
                "  BIRADS {} ({}): {} images (capped, {} available)",
                category.label, category.folder, category.included, category.available
            );
        } else {
            println!("  BIRADS {} ({}): {} images", category.label, category.folder, category.included);
        }
    }
    if assembly.fallbacks > 0 {
        warn!(
            "{} image URLs were built from paths outside the project root and may not resolve",
            assembly.fallbacks
        );
    }
}
