/// On-disk dataset layout
///
/// A dataset root holds category folders named `<prefix><label>`, each
/// containing image files. Everything here returns entries in byte-wise
/// file name order so runs are reproducible.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::PipelineResult;

/// One classification class on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryFolder {
    /// Full path to the folder
    pub path: PathBuf,
    /// Folder name, e.g. "birads3"
    pub name: String,
    /// Label derived from the name, e.g. "3"
    pub label: String,
}

impl CategoryFolder {
    /// Build a category from a folder path if its name carries the prefix
    pub fn from_path(path: &Path, prefix: &str) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let label = name.strip_prefix(prefix)?;
        Some(Self {
            path: path.to_path_buf(),
            name: name.to_string(),
            label: label.to_string(),
        })
    }
}

/// List the category folders directly under `root`, sorted by name
pub fn category_folders(root: &Path, prefix: &str) -> PipelineResult<Vec<CategoryFolder>> {
    let mut folders = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }
        if let Some(folder) = CategoryFolder::from_path(entry.path(), prefix) {
            folders.push(folder);
        }
    }

    Ok(folders)
}

/// List the image files directly inside `folder`, sorted by file name.
///
/// The extension match is case-insensitive.
pub fn image_files(folder: &Path, extension: &str) -> PipelineResult<Vec<PathBuf>> {
    let mut images = Vec::new();

    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
            .unwrap_or(false);
        if matches {
            images.push(entry.into_path());
        }
    }

    Ok(images)
}
