use anyhow::{ensure, Context, Result};
use clio::ClioPath;
use std::{ops::Deref, path::Path};

/// A user supplied path, kept as a [`ClioPath`] so that CLI and config file arguments go through
/// the same checks
#[derive(Clone, Debug)]
pub(crate) struct ConfigPath(pub(crate) ClioPath);

impl std::fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.to_string_lossy().fmt(f)
    }
}

impl Deref for ConfigPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        self.0.path()
    }
}

impl From<ClioPath> for ConfigPath {
    fn from(clio_path: ClioPath) -> Self {
        Self(clio_path)
    }
}

impl ConfigPath {
    pub(crate) fn new(path: &str) -> Result<Self> {
        Ok(Self(ClioPath::new(path).context(format!("path {:?}", path))?))
    }

    pub(crate) fn existing_dir(key: &str, path: &str) -> Result<Self> {
        let config_path = Self::new(path).context(key.to_string())?;
        ensure!(config_path.0.try_exists()?, "{} must exist: {}", key, config_path);
        ensure!(config_path.0.is_dir(), "{} must be a directory: {}", key, config_path);
        Ok(config_path)
    }

    pub(crate) fn existing_file(key: &str, path: &str) -> Result<Self> {
        let config_path = Self::new(path).context(key.to_string())?;
        ensure!(config_path.0.try_exists()?, "{} must exist: {}", key, config_path);
        ensure!(config_path.0.is_file(), "{} must be a file: {}", key, config_path);
        Ok(config_path)
    }
}

impl serde::Serialize for ConfigPath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.to_string_lossy().as_ref())
    }
}
