//! Optional TOML configuration layer.
//!
//! Nothing in spec.md's Non-goals excludes a config layer; the ambient-stack
//! rule (SPEC_FULL.md §4.5) requires one regardless of what the distilled
//! spec covers. Precedence is CLI flags > config file > built-in defaults,
//! matching `faxt`'s `Config` (`examples/Luvion1-Fax/faxt/src/config.rs`).

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::LalgError;

/// On-disk configuration, every field optional so a config file can set as
/// few or as many defaults as it likes.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Config {
    /// Bytecode buffer capacity, in bytes (spec.md §3: "5000 bytes in the
    /// source; implementers SHOULD make this configurable").
    #[serde(default)]
    pub capacity: Option<usize>,

    /// Path to a reserved-word list overriding the built-in default.
    #[serde(default)]
    pub keywords_path: Option<PathBuf>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, LalgError> {
        let text = std::fs::read_to_string(path).map_err(|e| LalgError::io(path.display().to_string(), e))?;
        toml::from_str(&text).map_err(|e| LalgError::io(path.display().to_string(), e))
    }
}
