//! Session configuration and seed sifters.
//!
//! # Storage layout
//!
//! ```text
//! ~/.sifter/
//!   config.yaml    (optional: every field has a default)
//!   sifters.yaml   (optional: read-only seed list, never written back)
//! ```
//!
//! # API pattern
//!
//! Every loader has two forms:
//! - `fn_at(home: &Path)`: explicit home; used in tests with `TempDir`
//! - `fn()`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};

pub const CONFIG_FILE: &str = "config.yaml";
pub const SEED_FILE: &str = "sifters.yaml";

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.sifter/`
pub fn sifter_root(home: &Path) -> PathBuf {
    home.join(".sifter")
}

/// `<home>/.sifter/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    sifter_root(home).join(CONFIG_FILE)
}

/// `<home>/.sifter/sifters.yaml`: pure, no I/O.
pub fn seed_path_at(home: &Path) -> PathBuf {
    sifter_root(home).join(SEED_FILE)
}

// ---------------------------------------------------------------------------
// 2. Session config
// ---------------------------------------------------------------------------

/// Tunables for one host session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Upper bound on concurrently running transfer workers.
    pub transfer_workers: usize,
    /// Capacity of the session event queue.
    pub event_queue: usize,
    /// Device titles longer than this are truncated (in characters).
    pub title_max_chars: usize,
    /// Tera template for control labels; sees `id`, `name`, `synced`.
    pub label_template: String,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            transfer_workers: 1,
            event_queue: 64,
            title_max_chars: 32,
            label_template: "{{ name }}".to_string(),
            log_filter: "info".to_string(),
        }
    }
}

impl SessionConfig {
    /// Load `<home>/.sifter/config.yaml`, falling back to defaults if absent.
    ///
    /// Returns `ConfigError::Parse` (with path + line context) if malformed and
    /// `ConfigError::Invalid` for out-of-range values.
    pub fn load_at(home: &Path) -> Result<Self, ConfigError> {
        let path = config_path_at(home);
        let Some(contents) = read_optional(&path)? else {
            return Ok(Self::default());
        };
        let config: SessionConfig = serde_yaml::from_str(&contents)
            .map_err(|source| ConfigError::Parse { path: path.clone(), source })?;
        config.validate(&path)?;
        Ok(config)
    }

    /// `load_at` convenience wrapper.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_at(&home()?)
    }

    fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        if self.transfer_workers == 0 {
            return Err(invalid("transfer_workers must be at least 1"));
        }
        if self.event_queue == 0 {
            return Err(invalid("event_queue must be at least 1"));
        }
        if self.title_max_chars == 0 {
            return Err(invalid("title_max_chars must be at least 1"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 3. Seed sifters
// ---------------------------------------------------------------------------

/// One entry of `sifters.yaml`. Identifiers are assigned when the seed is
/// loaded into a registry, not stored in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedSifter {
    pub name: String,
    #[serde(default)]
    pub rule: String,
}

/// Load `<home>/.sifter/sifters.yaml`; empty list if absent.
pub fn load_seed_at(home: &Path) -> Result<Vec<SeedSifter>, ConfigError> {
    let path = seed_path_at(home);
    let Some(contents) = read_optional(&path)? else {
        return Ok(vec![]);
    };
    if contents.trim().is_empty() {
        return Ok(vec![]);
    }
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })
}

/// `load_seed_at` convenience wrapper.
pub fn load_seed() -> Result<Vec<SeedSifter>, ConfigError> {
    load_seed_at(&home()?)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

fn read_optional(path: &Path) -> Result<Option<String>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(path, err)),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn config_path_is_correct() {
        let home = TempDir::new().expect("tempdir");
        assert!(config_path_at(home.path()).ends_with(".sifter/config.yaml"));
        assert!(seed_path_at(home.path()).ends_with(".sifter/sifters.yaml"));
    }

    #[test]
    fn missing_config_yields_defaults() {
        let home = TempDir::new().expect("tempdir");
        let config = SessionConfig::load_at(home.path()).expect("load");
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn missing_seed_yields_empty_list() {
        let home = TempDir::new().expect("tempdir");
        assert!(load_seed_at(home.path()).expect("load").is_empty());
    }

    #[test]
    fn home_not_found_error_message() {
        assert!(ConfigError::HomeNotFound.to_string().contains("home directory"));
    }
}
