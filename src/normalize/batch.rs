/// Tree-level normalization
///
/// Mirrors `<source>/<category>/*.png` into `<output>/<category>/*.png`,
/// normalizing each image and tallying what happened. A failing image is
/// logged and counted; it never stops the batch.

use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use super::convert;
use crate::config::Config;
use crate::error::{PipelineError, PipelineResult};
use crate::layout;

/// Counts for one folder or the whole run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub converted: usize,
    pub copied: usize,
    pub errors: usize,
}

impl Tally {
    pub fn total(&self) -> usize {
        self.converted + self.copied + self.errors
    }

    fn add(&mut self, other: &Tally) {
        self.converted += other.converted;
        self.copied += other.copied;
        self.errors += other.errors;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderReport {
    pub name: String,
    pub tally: Tally,
}

/// One image that could not be normalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeReport {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub folders: Vec<FolderReport>,
    pub totals: Tally,
    pub failures: Vec<Failure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl NormalizeReport {
    /// Wall-clock duration of the run in seconds
    pub fn elapsed_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

/// Normalizes a whole category tree
#[derive(Debug, Clone)]
pub struct Normalizer {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub category_prefix: String,
    pub image_extension: String,
    pub optimize: bool,
}

impl Normalizer {
    pub fn from_config(config: &Config) -> Self {
        Self {
            source_dir: config.resolve(&config.normalize.source_dir),
            output_dir: config.resolve(&config.normalize.output_dir),
            category_prefix: config.category_prefix.clone(),
            image_extension: config.image_extension.clone(),
            optimize: config.normalize.optimize,
        }
    }

    /// Check the source exists and the output is a different tree
    pub fn validate(&self) -> PipelineResult<()> {
        if !self.source_dir.is_dir() {
            return Err(PipelineError::MissingDirectory(self.source_dir.clone()));
        }
        if same_directory(&self.source_dir, &self.output_dir) {
            return Err(PipelineError::SameDirectory(self.output_dir.clone()));
        }
        Ok(())
    }

    pub fn run(&self) -> PipelineResult<NormalizeReport> {
        self.validate()?;
        let started_at = Utc::now();

        info!("Original images are preserved in {}", self.source_dir.display());
        info!("Source directory: {}", self.source_dir.display());
        info!("Output directory: {}", self.output_dir.display());

        let mut report = NormalizeReport {
            source_dir: self.source_dir.clone(),
            output_dir: self.output_dir.clone(),
            folders: Vec::new(),
            totals: Tally::default(),
            failures: Vec::new(),
            started_at,
            finished_at: started_at,
        };

        for category in layout::category_folders(&self.source_dir, &self.category_prefix)? {
            let output_folder = self.output_dir.join(&category.name);
            fs::create_dir_all(&output_folder)
                .map_err(|e| PipelineError::io(&output_folder, e))?;

            info!("Processing {}...", category.name);
            let mut tally = Tally::default();

            for image_path in layout::image_files(&category.path, &self.image_extension)? {
                let Some(file_name) = image_path.file_name() else {
                    continue;
                };
                let dest = output_folder.join(file_name);

                match convert::normalize_image(&image_path, &dest, self.optimize) {
                    Ok(conversion) if conversion.was_transformed() => {
                        tally.converted += 1;
                        info!(
                            "  Converted: {} ({} -> {})",
                            file_name.to_string_lossy(),
                            conversion.original(),
                            conversion.result()
                        );
                    }
                    Ok(conversion) => {
                        tally.copied += 1;
                        debug!("  Copied: {} ({})", file_name.to_string_lossy(), conversion.original());
                    }
                    Err(e) => {
                        tally.errors += 1;
                        error!("  Error with {}: {}", image_path.display(), e);
                        report.failures.push(Failure {
                            path: e.path().clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }

            info!(
                "  Summary: {} converted, {} copied (already canonical), {} errors",
                tally.converted, tally.copied, tally.errors
            );

            report.totals.add(&tally);
            report.folders.push(FolderReport {
                name: category.name,
                tally,
            });
        }

        report.finished_at = Utc::now();
        Ok(report)
    }
}

fn same_directory(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
