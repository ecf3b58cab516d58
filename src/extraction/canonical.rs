use crate::catalog::location_catalog::LocationCatalog;
use crate::types::search_term::SearchTerm;
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Catalog order × configured term order × week.
///
/// Locations or terms unknown to the current run (e.g. rows kept from an older
/// table) sort after known ones, alphabetically.
#[derive(Debug, Clone, Default)]
pub struct CanonicalOrder {
    locations: HashMap<String, usize>,
    terms: HashMap<SearchTerm, usize>,
}

impl CanonicalOrder {
    pub fn new(catalog: &LocationCatalog, terms: &[SearchTerm]) -> Self {
        Self {
            locations: catalog
                .iter()
                .enumerate()
                .map(|(idx, location)| (location.id.clone(), idx))
                .collect(),
            terms: terms
                .iter()
                .enumerate()
                .map(|(idx, term)| (term.clone(), idx))
                .collect(),
        }
    }

    fn location_rank(&self, id: &str) -> usize {
        self.locations.get(id).copied().unwrap_or(usize::MAX)
    }

    fn term_rank(&self, term: &SearchTerm) -> usize {
        self.terms.get(term).copied().unwrap_or(usize::MAX)
    }

    pub fn compare_pairs(
        &self,
        a: (&str, &SearchTerm),
        b: (&str, &SearchTerm),
    ) -> Ordering {
        self.location_rank(a.0)
            .cmp(&self.location_rank(b.0))
            .then_with(|| a.0.cmp(b.0))
            .then_with(|| self.term_rank(a.1).cmp(&self.term_rank(b.1)))
            .then_with(|| a.1.cmp(b.1))
    }

    pub fn compare(
        &self,
        a: (&str, &SearchTerm, NaiveDate),
        b: (&str, &SearchTerm, NaiveDate),
    ) -> Ordering {
        self.compare_pairs((a.0, a.1), (b.0, b.1))
            .then_with(|| a.2.cmp(&b.2))
    }
}
