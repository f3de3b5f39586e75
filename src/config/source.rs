use crate::config::projector;
use crate::config::types::{ConfigError, Configuration};
use log::{error, info};
use std::path::{Path, PathBuf};

/// Where a supervision cycle reads its configuration from.
///
/// The file is read again on every [`ConfigSource::load`], which is what
/// makes a reload pick up edits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSource {
    file: Option<PathBuf>,
    selector: String,
}

impl ConfigSource {
    pub fn new(file: Option<PathBuf>, selector: Option<&str>) -> Self {
        Self {
            file,
            selector: projector::normalize_selector(selector.unwrap_or("")),
        }
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn try_load(&self) -> Result<Configuration, ConfigError> {
        let Some(path) = &self.file else {
            return Ok(Configuration::empty());
        };
        let document = std::fs::read(path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        projector::try_project(&document, &self.selector)
    }

    /// Read and project the configuration. Failures degrade to an empty
    /// configuration after logging.
    pub fn load(&self) -> Configuration {
        if self.file.is_none() {
            info!("no config file given, supervising nothing");
            return Configuration::empty();
        }
        match self.try_load() {
            Ok(config) => {
                info!(
                    "loaded {} application(s) from {} (selector '{}')",
                    config.len(),
                    self.file.as_deref().unwrap_or(Path::new("-")).display(),
                    self.selector
                );
                config
            }
            Err(err) => {
                error!("{} ({}); using empty configuration", err, err.class());
                Configuration::empty()
            }
        }
    }
}
