/// Error types for both pipelines
///
/// `ConvertError` is scoped to a single image and never stops a batch.
/// `PipelineError` is fatal and ends the run with a non-zero exit status.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure while normalizing one image
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unreadable PNG header in {}: {source}", .path.display())]
    Header {
        path: PathBuf,
        #[source]
        source: png::DecodingError,
    },

    #[error("image codec failed on {}: {source}", .path.display())]
    Codec {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl ConvertError {
    /// Path of the image that failed
    pub fn path(&self) -> &PathBuf {
        match self {
            ConvertError::Io { path, .. } => path,
            ConvertError::Header { path, .. } => path,
            ConvertError::Codec { path, .. } => path,
        }
    }
}

/// Fatal error for a whole run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("directory not found: {}", .0.display())]
    MissingDirectory(PathBuf),

    #[error("output directory must differ from the source directory: {}", .0.display())]
    SameDirectory(PathBuf),

    #[error("no category folders with prefix '{prefix}' found in {}", .dir.display())]
    NoCategories { dir: PathBuf, prefix: String },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration file {}: {reason}", .path.display())]
    Config { path: PathBuf, reason: String },
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
