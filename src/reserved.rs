//! Reserved-word classification table.
//!
//! Built once (either from a file or the built-in default list) and handed
//! to the scanner by reference. Never mutated after construction — see
//! spec's "Global mutable state" design note.

use std::collections::HashSet;
use std::path::Path;

use crate::error::LalgError;

/// The keywords LALG ships with when no `--keywords` file is given.
pub const BUILTIN_KEYWORDS: &[&str] = &[
    "program", "var", "begin", "end", "procedure", "if", "then", "else", "while", "do", "repeat",
    "until", "for", "to", "case", "of", "not", "div", "or", "true", "false", "array", "read",
    "write", "writeln", "integer", "real", "char", "boolean",
];

/// An immutable set of lowercase keyword strings.
#[derive(Debug, Clone)]
pub struct ReservedWords {
    words: HashSet<String>,
}

impl ReservedWords {
    /// The default set, matching `BUILTIN_KEYWORDS`.
    pub fn builtin() -> Self {
        Self {
            words: BUILTIN_KEYWORDS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Load a newline-delimited lowercase keyword list, one per line, blank
    /// lines ignored.
    pub fn load_from_file(path: &Path) -> Result<Self, LalgError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| LalgError::io(path.display().to_string(), e))?;
        let words = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| l.to_ascii_lowercase())
            .collect();
        Ok(Self { words })
    }

    pub fn contains(&self, lowercase_word: &str) -> bool {
        self.words.contains(lowercase_word)
    }
}

impl Default for ReservedWords {
    fn default() -> Self {
        Self::builtin()
    }
}
