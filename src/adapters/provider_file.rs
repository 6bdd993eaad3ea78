//! JSON file persistence for the LLM provider registry.

use crate::domain::error::StockpickError;
use crate::domain::llm::ProviderRegistry;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct ProviderFile {
    path: PathBuf,
}

impl ProviderFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is an empty registry. A file that is not valid JSON
    /// is logged and also treated as empty.
    pub fn load(&self) -> Result<ProviderRegistry, StockpickError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no provider registry yet");
                return Ok(ProviderRegistry::default());
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&content) {
            Ok(registry) => Ok(registry),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "invalid provider registry, using empty");
                Ok(ProviderRegistry::default())
            }
        }
    }

    pub fn save(&self, registry: &ProviderRegistry) -> Result<(), StockpickError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(registry)?;
        fs::write(&self.path, json)?;
        debug!(
            path = %self.path.display(),
            providers = registry.providers.len(),
            "provider registry saved"
        );
        Ok(())
    }
}
