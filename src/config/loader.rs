use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::{validate_descriptor, PipelineDescriptor};
use crate::errors::ConfigError;

/// Registry of named pipeline descriptors, loaded from a directory of
/// `*.json` files at process start.
///
/// One invalid file never aborts the scan: it is logged and skipped while
/// the remaining files continue to load. The registry is a plain value meant
/// to be constructed once and injected into the dispatcher; `reload` exists
/// for operational refreshes and per-test overrides.
#[derive(Debug)]
pub struct PipelineRegistry {
    dir: PathBuf,
    pipelines: HashMap<String, PipelineDescriptor>,
}

impl PipelineRegistry {
    /// Scan `dir` for pipeline config files and load every valid one.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref().to_path_buf();
        let mut registry = Self {
            dir,
            pipelines: HashMap::new(),
        };
        registry.reload()?;
        Ok(registry)
    }

    /// Re-scan the configured directory, replacing the loaded set.
    pub fn reload(&mut self) -> Result<(), ConfigError> {
        if !self.dir.is_dir() {
            return Err(ConfigError::Io {
                path: self.dir.display().to_string(),
                source: io::Error::new(
                    io::ErrorKind::NotFound,
                    "pipeline configuration directory not found",
                ),
            });
        }

        let mut entries: Vec<PathBuf> = fs::read_dir(&self.dir)
            .map_err(|source| ConfigError::Io {
                path: self.dir.display().to_string(),
                source,
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        entries.sort();

        let mut pipelines = HashMap::new();
        for path in entries {
            match Self::load_file(&path) {
                Ok(descriptor) => {
                    tracing::info!(
                        pipeline = %descriptor.name,
                        path = %path.display(),
                        "pipeline configuration loaded"
                    );
                    pipelines.insert(descriptor.name.clone(), descriptor);
                }
                Err(error) => {
                    tracing::warn!(
                        path = %path.display(),
                        %error,
                        "skipping invalid pipeline configuration"
                    );
                }
            }
        }

        if pipelines.is_empty() {
            tracing::warn!(
                dir = %self.dir.display(),
                "no valid pipeline configurations were loaded"
            );
        }

        self.pipelines = pipelines;
        Ok(())
    }

    fn load_file(path: &Path) -> Result<PipelineDescriptor, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let descriptor: PipelineDescriptor =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        validate_descriptor(&descriptor).map_err(|errors| {
            // The first error is enough to point at the broken file.
            ConfigError::Validation(errors.into_iter().next().expect("non-empty error list"))
        })?;
        Ok(descriptor)
    }

    pub fn get(&self, name: &str) -> Option<&PipelineDescriptor> {
        self.pipelines.get(name)
    }

    /// Loaded pipeline names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.pipelines.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_LINEAR: &str = r#"{
        "name": "basic_ocr",
        "description": "preprocess then ocr",
        "execution_mode": "linear",
        "pipeline": [
            { "name": "image_preprocessor", "params": { "steps": [] } },
            { "name": "ocr_processor" }
        ]
    }"#;

    const CYCLIC_DAG: &str = r#"{
        "name": "broken",
        "description": "a <-> b",
        "execution_mode": "dag",
        "pipeline": {
            "nodes": [
                { "id": "a", "processor": "ocr_processor", "dependencies": ["b"] },
                { "id": "b", "processor": "ocr_processor", "dependencies": ["a"] }
            ]
        }
    }"#;

    #[test]
    fn loads_valid_files_and_skips_invalid_ones() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ocr.json"), VALID_LINEAR).unwrap();
        fs::write(dir.path().join("cyclic.json"), CYCLIC_DAG).unwrap();
        fs::write(dir.path().join("garbage.json"), "{ not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let registry = PipelineRegistry::load_dir(dir.path()).unwrap();
        assert_eq!(registry.names(), vec!["basic_ocr"]);
        assert!(registry.get("basic_ocr").is_some());
        assert!(registry.get("broken").is_none());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(PipelineRegistry::load_dir(&missing).is_err());
    }

    #[test]
    fn reload_picks_up_new_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = PipelineRegistry::load_dir(dir.path()).unwrap();
        assert!(registry.is_empty());

        fs::write(dir.path().join("ocr.json"), VALID_LINEAR).unwrap();
        registry.reload().unwrap();
        assert_eq!(registry.len(), 1);
    }
}
