//! Key pattern matching for pattern deletion.
//!
//! Patterns follow the shared backend's glob dialect: `*` matches zero or more
//! characters, `?` exactly one, `[...]` a character class. Separators carry
//! no meaning and a run of `*` behaves like a single `*`, so `user**` is the
//! same pattern as `user*`.

use glob::{MatchOptions, Pattern};

use crate::error::{CacheError, Result};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// A validated glob over cache keys.
#[derive(Debug, Clone)]
pub struct KeyPattern {
    raw: String,
    compiled: Pattern,
}

impl KeyPattern {
    /// Compiles a glob, rejecting empty or malformed patterns.
    pub fn new(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(CacheError::InvalidPattern {
                pattern: raw.to_string(),
                message: "pattern cannot be empty".to_string(),
            });
        }
        let compiled = Pattern::new(&collapse_stars(raw)).map_err(|e| CacheError::InvalidPattern {
            pattern: raw.to_string(),
            message: e.msg.to_string(),
        })?;
        Ok(Self {
            raw: raw.to_string(),
            compiled,
        })
    }

    pub fn matches(&self, key: &str) -> bool {
        self.compiled.matches_with(key, MATCH_OPTIONS)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// Folds each run of `*` outside a character class into one `*`.
fn collapse_stars(raw: &str) -> String {
    let mut folded = String::with_capacity(raw.len());
    let mut in_class = false;
    for c in raw.chars() {
        match c {
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            '*' if !in_class && folded.ends_with('*') => continue,
            _ => {}
        }
        folded.push(c);
    }
    folded
}
