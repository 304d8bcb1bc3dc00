//! # Configuration
//!
//! `NesConfig` is read from an optional `nesdb.toml`, then overridden by
//! environment variables. Command-line flags are applied last by the binary.
//!
//! ```toml
//! data_root = "nes-db"
//! migrations_dir = "migrations"
//! type_index = true
//! commit_batch_size = 1000
//! query_cache_ttl_secs = 300
//! author_prefix = "migration"
//! ```

use crate::primitives::{DEFAULT_COMMIT_BATCH_SIZE, validate_author_slug};
use crate::types::NesError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "nesdb.toml";

pub const ENV_DATA_ROOT: &str = "NESDB_DATA_ROOT";
pub const ENV_MIGRATIONS_DIR: &str = "NESDB_MIGRATIONS_DIR";
pub const ENV_TYPE_INDEX: &str = "NESDB_TYPE_INDEX";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NesConfig {
    /// Root of the record tree (usually a git working tree).
    pub data_root: PathBuf,
    /// Directory holding `NNN-name` migration units.
    pub migrations_dir: PathBuf,
    /// Maintain the redb by-kind index under `<data_root>/_indexes`.
    pub type_index: bool,
    /// Changed-path count at which a migration commit is split into batches.
    pub commit_batch_size: usize,
    pub query_cache_ttl_secs: u64,
    /// Migration writes are attributed to `<author_prefix>-<unit full name>`.
    pub author_prefix: String,
}

impl Default for NesConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("nes-db"),
            migrations_dir: PathBuf::from("migrations"),
            type_index: false,
            commit_batch_size: DEFAULT_COMMIT_BATCH_SIZE,
            query_cache_ttl_secs: 300,
            author_prefix: "migration".to_string(),
        }
    }
}

impl NesConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, NesError> {
        let config: Self =
            toml::from_str(text).map_err(|e| NesError::SerializationError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read `path`. A missing file is an error here; see `load`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, NesError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| NesError::IoError(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Resolve configuration the way the binary does.
    ///
    /// An explicit path must exist. Without one, `nesdb.toml` in the working
    /// directory is used when present, otherwise defaults. Environment
    /// overrides apply in both cases.
    pub fn load(explicit: Option<&Path>) -> Result<Self, NesError> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Self::from_file(DEFAULT_CONFIG_FILE)?,
            None => Self::default(),
        };
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `NESDB_*` overrides using `lookup` to read variables.
    pub fn apply_env_with(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), NesError> {
        if let Some(root) = lookup(ENV_DATA_ROOT).filter(|v| !v.is_empty()) {
            self.data_root = PathBuf::from(root);
        }
        if let Some(dir) = lookup(ENV_MIGRATIONS_DIR).filter(|v| !v.is_empty()) {
            self.migrations_dir = PathBuf::from(dir);
        }
        if let Some(flag) = lookup(ENV_TYPE_INDEX) {
            self.type_index = parse_flag(ENV_TYPE_INDEX, &flag)?;
        }
        Ok(())
    }

    pub fn query_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.query_cache_ttl_secs)
    }

    fn validate(&self) -> Result<(), NesError> {
        if self.commit_batch_size == 0 {
            return Err(NesError::ValidationError(
                "commit_batch_size must be at least 1".to_string(),
            ));
        }
        // Migration writes are attributed to `<author_prefix>-<unit>`.
        validate_author_slug(&self.author_prefix)
            .map_err(|e| NesError::ValidationError(format!("author_prefix: {}", e)))
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool, NesError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(NesError::ValidationError(format!(
            "{} must be a boolean, got '{}'",
            name, other
        ))),
    }
}
