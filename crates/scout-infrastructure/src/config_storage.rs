//! TOML configuration storage with atomic writes.
//!
//! Saves go through a temporary file, fsync, and an atomic rename, so a
//! crash mid-save never leaves a half-written config behind.

use scout_core::config::ScoutConfig;
use scout_core::error::{Result, ScoutError};
use std::fs::{self, File};
use std::io::Write as IoWrite;
use std::path::PathBuf;

/// Handle to the engine's TOML configuration file.
pub struct ConfigStorage {
    path: PathBuf,
}

impl ConfigStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Resolves the per-user default location (`<config dir>/scout/config.toml`).
    pub fn default_location() -> Result<Self> {
        let base = dirs::config_dir()
            .ok_or_else(|| ScoutError::config("no config directory available on this platform"))?;
        Ok(Self::new(base.join("scout").join("config.toml")))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Loads the configuration, falling back to defaults when the file does
    /// not exist yet. A present-but-invalid file is an error: silently
    /// running with defaults would mask an operator mistake.
    pub fn load(&self) -> Result<ScoutConfig> {
        if !self.path.exists() {
            return Ok(ScoutConfig::default());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(ScoutConfig::default());
        }
        let config: ScoutConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration atomically (tmp file + fsync + rename).
    pub fn save(&self, config: &ScoutConfig) -> Result<()> {
        config.validate()?;

        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let rendered = toml::to_string_pretty(config)?;
        let tmp_path = self.tmp_path()?;

        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(rendered.as_bytes())?;
        tmp.sync_all()?;
        drop(tmp);

        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Loads, applies `f`, validates, and saves back atomically.
    pub fn update<F>(&self, f: F) -> Result<ScoutConfig>
    where
        F: FnOnce(&mut ScoutConfig),
    {
        let mut config = self.load()?;
        f(&mut config);
        self.save(&config)?;
        Ok(config)
    }

    fn tmp_path(&self) -> Result<PathBuf> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| ScoutError::config("config path has no parent directory"))?;
        let name = self
            .path
            .file_name()
            .ok_or_else(|| ScoutError::config("config path has no file name"))?;
        Ok(parent.join(format!(".{}.tmp", name.to_string_lossy())))
    }
}
