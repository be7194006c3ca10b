/// Image reference resolution
///
/// A dataset uses one mode for every image:
/// - Remote URL: path relative to the project root, each segment
///   percent-encoded, placed into a raw-content URL template
/// - Inline data: the file's bytes as a base64 `data:` URI

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use image::ImageFormat;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::config::{Config, ReferenceConfig, RemoteUrlConfig};
use crate::error::{PipelineError, PipelineResult};

/// Everything except unreserved characters is encoded, including '/'
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Used when the extension does not name a known image format
const FALLBACK_MIME: &str = "image/png";

/// A resolved reference and whether it came from the degraded path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedReference {
    pub url: String,
    /// The image was not under the project root; the URL was built from
    /// the path as-is and may not point at the published file
    pub fallback: bool,
}

#[derive(Debug, Clone)]
pub enum ReferenceResolver {
    RemoteUrl(RemoteUrlResolver),
    InlineData,
}

impl ReferenceResolver {
    pub fn from_config(config: &Config) -> Self {
        match &config.dataset.reference {
            ReferenceConfig::RemoteUrl(remote) => ReferenceResolver::RemoteUrl(RemoteUrlResolver {
                project_root: config.project_root.clone(),
                settings: remote.clone(),
            }),
            ReferenceConfig::InlineData => ReferenceResolver::InlineData,
        }
    }

    pub fn resolve(&self, image_path: &Path) -> PipelineResult<ResolvedReference> {
        match self {
            ReferenceResolver::RemoteUrl(remote) => Ok(remote.resolve(image_path)),
            ReferenceResolver::InlineData => Ok(ResolvedReference {
                url: inline_data_uri(image_path)?,
                fallback: false,
            }),
        }
    }

    pub fn mode_name(&self) -> &'static str {
        match self {
            ReferenceResolver::RemoteUrl(_) => "remote-url",
            ReferenceResolver::InlineData => "inline-data",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoteUrlResolver {
    pub project_root: PathBuf,
    pub settings: RemoteUrlConfig,
}

impl RemoteUrlResolver {
    pub fn resolve(&self, image_path: &Path) -> ResolvedReference {
        let (relative, fallback) = match image_path.strip_prefix(&self.project_root) {
            Ok(relative) => (relative, false),
            Err(_) => {
                warn!(
                    "{} is not under project root {}; using the path as-is",
                    image_path.display(),
                    self.project_root.display()
                );
                (image_path, true)
            }
        };

        let path = relative
            .to_string_lossy()
            .replace('\\', "/")
            .split('/')
            .map(|segment| {
                let segment = self.rewrite_segment(segment);
                utf8_percent_encode(&segment, SEGMENT).to_string()
            })
            .collect::<Vec<_>>()
            .join("/");

        let url = self
            .settings
            .template
            .replace("{user}", &self.settings.user)
            .replace("{repo}", &self.settings.repo)
            .replace("{branch}", &self.settings.branch)
            .replace("{path}", &path);

        ResolvedReference { url, fallback }
    }

    /// Map the local output directory name onto the published one
    fn rewrite_segment(&self, segment: &str) -> String {
        match &self.settings.rewrite_from {
            Some(from) if !from.is_empty() && segment.contains(from.as_str()) => {
                segment.replace(from.as_str(), &self.settings.rewrite_to)
            }
            _ => segment.to_string(),
        }
    }
}

/// Read the whole file and wrap it as `data:<mime>;base64,<payload>`
pub fn inline_data_uri(image_path: &Path) -> PipelineResult<String> {
    let bytes = fs::read(image_path).map_err(|e| PipelineError::io(image_path, e))?;
    let mime = ImageFormat::from_path(image_path)
        .map(|format| format.to_mime_type())
        .unwrap_or(FALLBACK_MIME);

    Ok(format!("data:{};base64,{}", mime, BASE64_STANDARD.encode(bytes)))
}
