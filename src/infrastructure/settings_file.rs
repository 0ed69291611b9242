// TOML file backed settings repository
use crate::application::settings_repository::{SettingsRepository, StoredSettings};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct TomlSettingsFile {
    path: PathBuf,
}

impl TomlSettingsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SettingsRepository for TomlSettingsFile {
    async fn load(&self) -> Result<StoredSettings> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No settings file at {:?}", self.path);
                return Ok(StoredSettings::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {:?}", self.path));
            }
        };

        toml::from_str(&content).with_context(|| format!("Failed to parse {:?}", self.path))
    }

    async fn save(&self, settings: &StoredSettings) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create {:?}", dir))?;
        }

        let content = toml::to_string(settings).context("Failed to serialize settings")?;
        tokio::fs::write(&self.path, content)
            .await
            .with_context(|| format!("Failed to write {:?}", self.path))
    }
}
