//! Suggestion engine: append-only set of confirmed names answering
//! anchored prefix queries for autocomplete.

use std::collections::HashSet;

/// Previously confirmed names in first-seen order.
///
/// Grows only. Matching is case-sensitive and anchored at the start; when
/// several names share a prefix the one acquired first wins.
#[derive(Debug, Clone, Default)]
pub struct SuggestionSet {
    ordered: Vec<String>,
    seen: HashSet<String>,
}

impl SuggestionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// First known name starting with `prefix`, or `""` when `prefix` is
    /// empty or nothing matches.
    pub fn query(&self, prefix: &str) -> &str {
        if prefix.is_empty() {
            return "";
        }
        self.ordered
            .iter()
            .find(|name| name.starts_with(prefix))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Merge `names` into the set. Returns the names that were not known
    /// before, in the order they were added.
    pub fn record<I, S>(&mut self, names: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = Vec::new();
        for name in names {
            let name = name.as_ref();
            if name.is_empty() || self.seen.contains(name) {
                continue;
            }
            self.seen.insert(name.to_string());
            self.ordered.push(name.to_string());
            added.push(name.to_string());
        }
        added
    }

    pub fn contains(&self, name: &str) -> bool {
        self.seen.contains(name)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// All names in acquisition order.
    pub fn names(&self) -> &[String] {
        &self.ordered
    }
}
