/// Dataset assembly
///
/// Walks category folders in name order, takes at most `max_per_category`
/// images from each (in file name order), and emits one training example
/// per image. The concatenation in folder order is the output order.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::example::{answer_for, TrainingExample};
use super::reference::ReferenceResolver;
use crate::config::Config;
use crate::error::{PipelineError, PipelineResult};
use crate::layout;

/// Per-category counts for the run summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySummary {
    pub folder: String,
    pub label: String,
    /// Images found in the folder
    pub available: usize,
    /// Images that made it into the dataset
    pub included: usize,
}

impl CategorySummary {
    pub fn truncated(&self) -> usize {
        self.available - self.included
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assembly {
    pub examples: Vec<TrainingExample>,
    pub categories: Vec<CategorySummary>,
    /// Remote URLs built from paths outside the project root
    pub fallbacks: usize,
}

#[derive(Debug, Clone)]
pub struct Assembler {
    pub data_dir: PathBuf,
    pub category_prefix: String,
    pub image_extension: String,
    pub max_per_category: usize,
    pub system_message: String,
    pub user_text: String,
    pub resolver: ReferenceResolver,
}

impl Assembler {
    pub fn from_config(config: &Config) -> Self {
        Self {
            data_dir: config.resolve(&config.dataset.data_dir),
            category_prefix: config.category_prefix.clone(),
            image_extension: config.image_extension.clone(),
            max_per_category: config.dataset.max_per_category,
            system_message: config.dataset.system_message.clone(),
            user_text: config.dataset.user_text.clone(),
            resolver: ReferenceResolver::from_config(config),
        }
    }

    /// Build the example for one image; the flag reports a degraded reference
    pub fn build_example(&self, image_path: &Path, label: &str) -> PipelineResult<(TrainingExample, bool)> {
        let reference = self.resolver.resolve(image_path)?;
        let example = TrainingExample::new(reference.url, label, &self.system_message, &self.user_text);
        Ok((example, reference.fallback))
    }

    pub fn assemble(&self) -> PipelineResult<Assembly> {
        if !self.data_dir.is_dir() {
            return Err(PipelineError::MissingDirectory(self.data_dir.clone()));
        }

        let folders = layout::category_folders(&self.data_dir, &self.category_prefix)?;
        if folders.is_empty() {
            return Err(PipelineError::NoCategories {
                dir: self.data_dir.clone(),
                prefix: self.category_prefix.clone(),
            });
        }

        info!(
            "Processing images from {} categories ({} references)...",
            folders.len(),
            self.resolver.mode_name()
        );

        let mut assembly = Assembly {
            examples: Vec::new(),
            categories: Vec::with_capacity(folders.len()),
            fallbacks: 0,
        };

        for folder in folders {
            let mut images = layout::image_files(&folder.path, &self.image_extension)?;
            let available = images.len();
            images.truncate(self.max_per_category);

            info!(
                "  Processing {} images from {} ({})...",
                images.len(),
                folder.name,
                answer_for(&folder.label)
            );

            for image_path in &images {
                let (example, fallback) = self.build_example(image_path, &folder.label)?;
                if fallback {
                    assembly.fallbacks += 1;
                }
                debug!(
                    "  {} -> {}",
                    image_path.display(),
                    example.answer().unwrap_or_default()
                );
                assembly.examples.push(example);
            }

            assembly.categories.push(CategorySummary {
                folder: folder.name,
                label: folder.label,
                available,
                included: images.len(),
            });
        }

        Ok(assembly)
    }

    /// Assemble and write the JSONL file; nothing is written if assembly fails
    pub fn run(&self, output_path: &Path) -> PipelineResult<Assembly> {
        let assembly = self.assemble()?;
        info!(
            "Writing {} training examples to {}...",
            assembly.examples.len(),
            output_path.display()
        );
        serialize(&assembly.examples, output_path)?;
        Ok(assembly)
    }
}

/// Write one compact JSON object per line, replacing any existing file
pub fn serialize(examples: &[TrainingExample], output_path: &Path) -> PipelineResult<usize> {
    let file = File::create(output_path).map_err(|e| PipelineError::io(output_path, e))?;
    let mut writer = BufWriter::new(file);

    for example in examples {
        let line = example.to_json_line()?;
        writeln!(writer, "{}", line).map_err(|e| PipelineError::io(output_path, e))?;
    }
    writer.flush().map_err(|e| PipelineError::io(output_path, e))?;

    Ok(examples.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteUrlConfig;
    use crate::dataset::example::{Content, Role};
    use crate::dataset::reference::RemoteUrlResolver;
    use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
    use serde_json::Value;
    use std::fs;

    fn make_category(root: &Path, name: &str, count: usize) {
        let folder = root.join(name);
        fs::create_dir_all(&folder).unwrap();
        for i in 0..count {
            fs::write(folder.join(format!("img_{:02}.png", i)), format!("image {}", i)).unwrap();
        }
    }

    fn assembler(project_root: &Path, data_dir: &Path, max: usize) -> Assembler {
        Assembler {
            data_dir: data_dir.to_path_buf(),
            category_prefix: "birads".to_string(),
            image_extension: "png".to_string(),
            max_per_category: max,
            system_message: "system".to_string(),
            user_text: "question".to_string(),
            resolver: ReferenceResolver::RemoteUrl(RemoteUrlResolver {
                project_root: project_root.to_path_buf(),
                settings: RemoteUrlConfig::default(),
            }),
        }
    }

    #[test]
    fn test_caps_each_category_in_sorted_order() {
        let root = tempfile::tempdir().unwrap();
        let data = root.path().join("data_rgb");
        make_category(&data, "birads2", 45);
        make_category(&data, "birads1", 5);

        let assembly = assembler(root.path(), &data, 30).assemble().unwrap();

        assert_eq!(assembly.examples.len(), 35);
        assert_eq!(
            assembly.categories,
            vec![
                CategorySummary { folder: "birads1".into(), label: "1".into(), available: 5, included: 5 },
                CategorySummary { folder: "birads2".into(), label: "2".into(), available: 45, included: 30 },
            ]
        );
        assert_eq!(assembly.categories[1].truncated(), 15);
        assert_eq!(assembly.fallbacks, 0);

        // birads1 first, then the first 30 of birads2 by file name
        assert!(assembly.examples[0].image_reference().unwrap().ends_with("/data/birads1/img_00.png"));
        assert_eq!(assembly.examples[4].answer(), Some("BIRADS 1"));
        assert!(assembly.examples[5].image_reference().unwrap().ends_with("/data/birads2/img_00.png"));
        assert!(assembly.examples[34].image_reference().unwrap().ends_with("/data/birads2/img_29.png"));
        assert_eq!(assembly.examples[34].answer(), Some("BIRADS 2"));
    }

    #[test]
    fn test_label_comes_from_folder_name() {
        let root = tempfile::tempdir().unwrap();
        make_category(root.path(), "birads4", 2);

        let assembly = assembler(root.path(), root.path(), 30).assemble().unwrap();

        for example in &assembly.examples {
            assert_eq!(example.answer(), Some("BIRADS 4"));
        }
    }

    #[test]
    fn test_no_categories_fails_without_output() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("other")).unwrap();
        let output = root.path().join("training_data.jsonl");

        let err = assembler(root.path(), root.path(), 30).run(&output).unwrap_err();

        assert!(matches!(err, PipelineError::NoCategories { .. }));
        assert!(!output.exists());
    }

    #[test]
    fn test_missing_data_dir_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        let err = assembler(root.path(), &root.path().join("missing"), 30)
            .assemble()
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingDirectory(_)));
    }

    #[test]
    fn test_jsonl_output_lines() {
        let root = tempfile::tempdir().unwrap();
        make_category(root.path(), "birads1", 3);
        make_category(root.path(), "birads3", 2);
        let output = root.path().join("out.jsonl");
        fs::write(&output, "stale content\n".repeat(50)).unwrap();

        let assembly = assembler(root.path(), root.path(), 30).run(&output).unwrap();

        let text = fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), assembly.examples.len());
        assert_eq!(lines.len(), 5);

        for line in lines {
            let value: Value = serde_json::from_str(line).unwrap();
            let messages = value["messages"].as_array().unwrap();
            assert_eq!(messages.len(), 4);
            let roles: Vec<&str> = messages.iter().map(|m| m["role"].as_str().unwrap()).collect();
            assert_eq!(roles, vec!["system", "user", "user", "assistant"]);
            assert_eq!(messages[2]["content"][0]["type"], "image_url");
        }
    }

    #[test]
    fn test_outside_root_counts_fallbacks() {
        let root = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        make_category(data.path(), "birads1", 2);

        let assembly = assembler(root.path(), data.path(), 30).assemble().unwrap();

        assert_eq!(assembly.fallbacks, 2);
        assert_eq!(assembly.examples.len(), 2);
    }

    #[test]
    fn test_inline_mode_embeds_bytes() {
        let root = tempfile::tempdir().unwrap();
        make_category(root.path(), "birads5", 1);
        let mut assembler = assembler(root.path(), root.path(), 30);
        assembler.resolver = ReferenceResolver::InlineData;

        let assembly = assembler.assemble().unwrap();
        let example = &assembly.examples[0];

        assert_eq!(example.messages[2].role, Role::User);
        assert!(matches!(example.messages[2].content, Content::Parts(_)));
        let uri = example.image_reference().unwrap();
        let payload = uri.strip_prefix("data:image/png;base64,").unwrap();
        assert_eq!(
            BASE64_STANDARD.decode(payload).unwrap(),
            fs::read(root.path().join("birads5/img_00.png")).unwrap()
        );
    }
}
