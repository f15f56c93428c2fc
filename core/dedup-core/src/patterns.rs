//! Compiled regex patterns for URL classification and whitelist matching.
//!
//! Static patterns are compiled once on first use. Whitelist patterns come from
//! user options and are compiled whenever a new options snapshot is built.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{DedupError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// URL Classification Regexes
// ═══════════════════════════════════════════════════════════════════════════════

pub static RE_VALID_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(f|ht)tps?://").unwrap());
pub static RE_HTTPS_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^https://").unwrap());
pub static RE_HTTP_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^http://").unwrap());

// ═══════════════════════════════════════════════════════════════════════════════
// Whitelist
// ═══════════════════════════════════════════════════════════════════════════════

/// URLs that are never treated as duplicates.
///
/// Source text is newline separated; each non-blank line is a glob where `*`
/// matches any run of characters and must match the whole URL.
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    source: String,
    patterns: Vec<Regex>,
}

impl Whitelist {
    pub fn parse(source: &str) -> Result<Self> {
        let mut patterns: Vec<Regex> = Vec::new();
        for line in source.lines().map(str::trim).filter(|line| !line.is_empty()) {
            let compiled =
                Regex::new(&glob_to_regex(line)).map_err(|err| DedupError::InvalidWhitelistPattern {
                    pattern: line.to_string(),
                    source: err,
                })?;
            if patterns.iter().all(|existing| existing.as_str() != compiled.as_str()) {
                patterns.push(compiled);
            }
        }
        Ok(Self {
            source: source.to_string(),
            patterns,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn matches(&self, url: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(url))
    }
}

impl PartialEq for Whitelist {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

pub(crate) fn glob_to_regex(glob: &str) -> String {
    let body = glob
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    format!("^{}$", body)
}
