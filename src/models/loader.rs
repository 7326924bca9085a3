//! File-backed model loader.

use super::{Model, ModelLoader};
use anyhow::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Loads `<directory>/<name>.<extension>` as a raw artifact
pub struct FileModelLoader {
    directory: PathBuf,
    extension: String,
}

impl FileModelLoader {
    pub fn new(directory: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            extension: extension.into(),
        }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.directory.join(format!("{}.{}", name, self.extension))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

#[async_trait]
impl ModelLoader for FileModelLoader {
    async fn load(&self, name: &str) -> anyhow::Result<Model> {
        if name.is_empty() || name.contains('/') || name.contains("..") {
            anyhow::bail!("invalid model name '{}'", name);
        }
        let path = self.path_for(name);
        let artifact = tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        if artifact.is_empty() {
            anyhow::bail!("model file {} is empty", path.display());
        }
        Ok(Model::new(name, artifact))
    }
}
