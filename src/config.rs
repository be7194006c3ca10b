/// Run configuration
///
/// Every field has a default matching the conventional project layout,
/// so an empty or partial JSON file is valid. Relative paths are resolved
/// against `project_root`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, PipelineResult};

/// Name of the directory used under the user's config dir
pub const APP_DIR: &str = "birads-prep";

/// File name looked up in the user's config dir
pub const CONFIG_FILE: &str = "config.json";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Root that remote URLs are made relative to
    pub project_root: PathBuf,
    /// Literal folder-name prefix of a category folder ("birads3" -> label "3")
    pub category_prefix: String,
    /// Extension of image files inside category folders
    pub image_extension: String,
    pub normalize: NormalizeConfig,
    pub dataset: DatasetConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct NormalizeConfig {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Spend more time compressing rewritten PNGs
    pub optimize: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DatasetConfig {
    pub data_dir: PathBuf,
    pub output_file: PathBuf,
    pub max_per_category: usize,
    pub system_message: String,
    pub user_text: String,
    pub reference: ReferenceConfig,
}

/// How image references are written into training examples
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReferenceConfig {
    RemoteUrl(RemoteUrlConfig),
    InlineData,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RemoteUrlConfig {
    /// Raw-content URL template with `{user}`, `{repo}`, `{branch}` and `{path}` placeholders
    pub template: String,
    pub user: String,
    pub repo: String,
    pub branch: String,
    /// Local directory name replaced in path segments, e.g. "data_rgb"
    pub rewrite_from: Option<String>,
    /// Published directory name it is replaced with, e.g. "data"
    pub rewrite_to: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            category_prefix: "birads".to_string(),
            image_extension: "png".to_string(),
            normalize: NormalizeConfig::default(),
            dataset: DatasetConfig::default(),
        }
    }
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            source_dir: Path::new("data").join("İnbreast"),
            output_dir: Path::new("data_rgb").join("İnbreast"),
            optimize: true,
        }
    }
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            data_dir: Path::new("data_rgb").join("İnbreast"),
            output_file: PathBuf::from("training_data.jsonl"),
            max_per_category: 30,
            system_message: "You are a medical imaging assistant that classifies breast mammograms using BIRADS categories.".to_string(),
            user_text: "What is the BIRADS classification for this mammogram?".to_string(),
            reference: ReferenceConfig::default(),
        }
    }
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        ReferenceConfig::RemoteUrl(RemoteUrlConfig::default())
    }
}

impl Default for RemoteUrlConfig {
    fn default() -> Self {
        Self {
            template: "https://raw.githubusercontent.com/{user}/{repo}/{branch}/{path}".to_string(),
            user: "thiessen2003".to_string(),
            repo: "finetuning".to_string(),
            branch: "main".to_string(),
            rewrite_from: Some("data_rgb".to_string()),
            rewrite_to: "data".to_string(),
        }
    }
}

impl Config {
    /// Convert to pretty JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse from JSON text; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load from an explicit file, or from the user config dir when present,
    /// falling back to defaults
    pub fn load(explicit: Option<&Path>) -> PipelineResult<Self> {
        Self::load_from(explicit, user_config_path().as_deref())
    }

    /// `load` with the user config location passed in
    pub fn load_from(explicit: Option<&Path>, user_config: Option<&Path>) -> PipelineResult<Self> {
        match (explicit, user_config) {
            (Some(path), _) => Self::from_file(path),
            (None, Some(path)) if path.is_file() => Self::from_file(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> PipelineResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| PipelineError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_json(&text).map_err(|e| PipelineError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Resolve a configured path against the project root
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }
}

/// `<config dir>/birads-prep/config.json`, if the platform has a config dir
pub fn user_config_path() -> Option<PathBuf> {
    let mut path = dirs::config_dir()?;
    path.push(APP_DIR);
    path.push(CONFIG_FILE);
    Some(path)
}
