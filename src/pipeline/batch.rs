// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 sqlstage contributors

//! SQL batch splitting
//!
//! A script is split on lines holding only the batch separator (`GO` by
//! default, matched case-insensitively). Blank batches are dropped.

use regex::Regex;

use crate::errors::{SqlstageError, SqlstageResult};

/// Splits script text into executable batches
#[derive(Debug, Clone)]
pub struct BatchSplitter {
    separator: String,
    pattern: Regex,
}

impl BatchSplitter {
    /// Create a splitter for a separator keyword
    pub fn new(separator: &str) -> SqlstageResult<Self> {
        let trimmed = separator.trim();
        if trimmed.is_empty() || trimmed.contains('\n') {
            return Err(SqlstageError::InvalidSeparator {
                separator: separator.to_string(),
                reason: "separator must be a single non-empty line".into(),
            });
        }

        let pattern = Regex::new(&format!(r"(?im)^[ \t]*{}[ \t]*\r?$", regex::escape(trimmed)))
            .map_err(|e| SqlstageError::InvalidSeparator {
                separator: separator.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            separator: trimmed.to_string(),
            pattern,
        })
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Split text into trimmed, non-blank batches in source order
    pub fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        self.pattern
            .split(text)
            .map(str::trim)
            .filter(|batch| !batch.is_empty())
            .collect()
    }
}

/// Split text on a separator keyword
pub fn split_batches<'a>(text: &'a str, separator: &str) -> SqlstageResult<Vec<&'a str>> {
    Ok(BatchSplitter::new(separator)?.split(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_drops_blank_batches() {
        let batches = split_batches("SELECT 1\nGO\n\nSELECT 2", "GO").unwrap();
        assert_eq!(batches, vec!["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn test_separator_is_case_insensitive_and_line_bound() {
        let text = "CREATE TABLE go_live (id int)\n  go  \nINSERT INTO go_live VALUES (1)\r\nGo\r\n";
        let batches = split_batches(text, "GO").unwrap();
        assert_eq!(
            batches,
            vec!["CREATE TABLE go_live (id int)", "INSERT INTO go_live VALUES (1)"]
        );
    }

    #[test]
    fn test_only_separators_yields_nothing() {
        assert!(split_batches("GO\nGO\n   \nGO", "GO").unwrap().is_empty());
        assert!(split_batches("", "GO").unwrap().is_empty());
    }

    #[test]
    fn test_no_separator_is_one_batch() {
        let batches = split_batches("SELECT 1;\nSELECT 2;", "GO").unwrap();
        assert_eq!(batches, vec!["SELECT 1;\nSELECT 2;"]);
    }

    #[test]
    fn test_custom_separator_is_escaped() {
        let batches = split_batches("a\n$$\nb", "$$").unwrap();
        assert_eq!(batches, vec!["a", "b"]);
    }

    #[test]
    fn test_invalid_separator() {
        assert!(matches!(
            BatchSplitter::new("  "),
            Err(SqlstageError::InvalidSeparator { .. })
        ));
    }
}
