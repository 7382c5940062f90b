//! Survey question guide response codes
//!
//! The guide stores each variable's answer scale as a single string of
//! "code = label" pairs, e.g. `"1 = Excellent; 2 = Very good; 3 = Good"`.
//! A mis-parsed pair would silently mislabel categories, so every entry must
//! parse and every lookup must hit.

use std::collections::BTreeMap;

use crate::error::{PipelineError, Result};

/// Parsed code → label table for one survey variable
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponseCodes {
    variable: String,
    labels: BTreeMap<i64, String>,
}

impl ResponseCodes {
    /// Parse a "code = label" string
    ///
    /// Entries are separated by `;` or newlines. Blank entries are skipped.
    ///
    /// # Errors
    /// `MalformedResponseCode` when an entry has no `=`, a non-integer code,
    /// an empty label, or repeats a code.
    pub fn parse(variable: &str, raw: &str) -> Result<Self> {
        let mut labels = BTreeMap::new();

        for entry in raw.split(|c| c == ';' || c == '\n') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }

            let malformed = || PipelineError::MalformedResponseCode {
                entry: entry.to_string(),
            };

            let (code, label) = entry.split_once('=').ok_or_else(malformed)?;
            let code: i64 = code.trim().parse().map_err(|_| malformed())?;
            let label = label.trim();
            if label.is_empty() {
                return Err(malformed());
            }
            if labels.insert(code, label.to_string()).is_some() {
                return Err(malformed());
            }
        }

        Ok(Self {
            variable: variable.to_string(),
            labels,
        })
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// Label for an observed code; never falls back to a default
    pub fn label(&self, code: i64) -> Result<&str> {
        self.labels
            .get(&code)
            .map(String::as_str)
            .ok_or_else(|| PipelineError::UnknownResponseCode {
                variable: self.variable.clone(),
                code,
            })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_semicolon_pairs() {
        let codes = ResponseCodes::parse("K2Q01", "1 = Excellent; 2 = Very good; 3 = Good").unwrap();
        assert_eq!(codes.len(), 3);
        assert_eq!(codes.label(2).unwrap(), "Very good");
    }

    #[test]
    fn test_parse_newline_pairs_and_blank_entries() {
        let codes = ResponseCodes::parse("K4Q01", "1 = Yes\n\n2 = No;").unwrap();
        assert_eq!(codes.len(), 2);
        assert_eq!(codes.label(1).unwrap(), "Yes");
    }

    #[test]
    fn test_label_containing_equals_sign() {
        let codes = ResponseCodes::parse("X", "1 = a = b").unwrap();
        assert_eq!(codes.label(1).unwrap(), "a = b");
    }

    #[test]
    fn test_malformed_entries_rejected() {
        assert!(matches!(
            ResponseCodes::parse("X", "1 = Yes; No"),
            Err(PipelineError::MalformedResponseCode { .. })
        ));
        assert!(ResponseCodes::parse("X", "one = Yes").is_err());
        assert!(ResponseCodes::parse("X", "1 = ").is_err());
        assert!(ResponseCodes::parse("X", "1 = Yes; 1 = No").is_err());
    }

    #[test]
    fn test_unknown_code_fails_loudly() {
        let codes = ResponseCodes::parse("K4Q01", "1 = Yes; 2 = No").unwrap();
        let err = codes.label(99).unwrap_err();
        assert!(err.to_string().contains("K4Q01"));
        assert!(err.to_string().contains("99"));
    }
}
