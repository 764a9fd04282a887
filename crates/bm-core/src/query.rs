//! Query Engine
//!
//! Two ways of searching the bypass dataset:
//!
//! - plain mode: case-insensitive substring match against domain or code
//! - directive mode: a query mentioning `script-src` or `default-src` is cut
//!   down to that directive's value, normalized into suffix tokens, and any
//!   row containing any token matches
//!
//! Matching is substring containment in both modes. Suffix tokens such as
//! `.example.com` are not anchored to the end of the row's domain.

use crate::normalize::normalize_directive;
use crate::types::DatasetRecord;

/// Directives that switch a query into directive mode, in priority order.
pub const SCOPED_DIRECTIVES: [&str; 2] = ["script-src", "default-src"];

// =============================================================================
// Query
// =============================================================================

/// A classified search query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Lower-cased, trimmed free text
    Plain(String),
    /// Normalized tokens from a directive value
    Directive {
        directive: &'static str,
        tokens: Vec<String>,
    },
}

impl Query {
    /// Classify a raw query. Returns `None` for an empty or blank query.
    pub fn parse(input: &str) -> Option<Self> {
        let query = input.trim().to_lowercase();
        if query.is_empty() {
            return None;
        }

        if let Some(directive) = SCOPED_DIRECTIVES.iter().copied().find(|d| query.contains(d)) {
            let value = directive_value(&query, directive);
            if !value.is_empty() {
                return Some(Self::Directive {
                    directive,
                    tokens: normalize_directive(value),
                });
            }
        }

        Some(Self::Plain(query))
    }

    /// Does a record match this query?
    pub fn matches(&self, record: &DatasetRecord) -> bool {
        match self {
            Self::Plain(needle) => {
                record.domain.to_lowercase().contains(needle.as_str())
                    || record.code.to_lowercase().contains(needle.as_str())
            }
            Self::Directive { tokens, .. } => tokens.iter().any(|token| {
                record.domain.contains(token.as_str()) || record.code.contains(token.as_str())
            }),
        }
    }
}

/// Text after the first occurrence of `directive`, up to the next `;`.
fn directive_value<'q>(query: &'q str, directive: &str) -> &'q str {
    let Some(pos) = query.find(directive) else {
        return "";
    };
    let rest = &query[pos + directive.len()..];
    let end = rest.find(';').unwrap_or(rest.len());
    rest[..end].trim()
}

// =============================================================================
// Search
// =============================================================================

/// Search records by domain or code.
pub fn search<'a>(query: &str, dataset: &'a [DatasetRecord]) -> Vec<&'a DatasetRecord> {
    match Query::parse(query) {
        Some(query) => dataset.iter().filter(|record| query.matches(record)).collect(),
        None => Vec::new(),
    }
}

/// Plain substring search against the domain column only.
pub fn search_domain_only<'a>(query: &str, dataset: &'a [DatasetRecord]) -> Vec<&'a DatasetRecord> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    dataset
        .iter()
        .filter(|record| record.domain.to_lowercase().contains(&needle))
        .collect()
}

/// Search front-end over a parsed dataset.
pub struct QueryEngine<'a> {
    records: &'a [DatasetRecord],
}

impl<'a> QueryEngine<'a> {
    pub fn new(records: &'a [DatasetRecord]) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn search(&self, query: &str) -> Vec<&'a DatasetRecord> {
        search(query, self.records)
    }

    pub fn search_domain_only(&self, query: &str) -> Vec<&'a DatasetRecord> {
        search_domain_only(query, self.records)
    }
}
