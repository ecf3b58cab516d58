use serde::{Deserialize, Serialize};
use std::fmt;

/// A search-interest query term. Treated as an opaque key and never parsed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchTerm(String);

impl SearchTerm {
    pub fn new(term: impl Into<String>) -> Self {
        SearchTerm(term.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SearchTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SearchTerm {
    fn from(value: &str) -> Self {
        SearchTerm::new(value)
    }
}

/// The fishing queries tracked by default.
pub fn default_search_terms() -> Vec<SearchTerm> {
    [
        "Fishing",
        "Bass Fishing",
        "Trout Fishing",
        "Fly Fishing",
        "Ice Fishing",
    ]
    .into_iter()
    .map(SearchTerm::from)
    .collect()
}
