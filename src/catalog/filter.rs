use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::record::CatalogRecord;

/// Operator selection of categories and authors. An empty dimension
/// matches every value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSet {
    categories: BTreeSet<String>,
    authors: BTreeSet<String>,
}

impl FilterSet {
    pub fn new<C, A>(categories: C, authors: A) -> Self
    where
        C: IntoIterator,
        C::Item: AsRef<str>,
        A: IntoIterator,
        A::Item: AsRef<str>,
    {
        Self {
            categories: normalize(categories),
            authors: normalize(authors),
        }
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(String::as_str)
    }

    pub fn authors(&self) -> impl Iterator<Item = &str> {
        self.authors.iter().map(String::as_str)
    }

    pub fn matches(&self, record: &CatalogRecord) -> bool {
        dimension_matches(&self.categories, &record.category)
            && dimension_matches(&self.authors, &record.author)
    }
}

fn dimension_matches(selected: &BTreeSet<String>, value: &str) -> bool {
    selected.is_empty() || selected.contains(value.trim())
}

fn normalize<I>(values: I) -> BTreeSet<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    values
        .into_iter()
        .map(|value| value.as_ref().trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(category: &str, author: &str) -> CatalogRecord {
        CatalogRecord {
            id: "1".into(),
            title: "t".into(),
            description: String::new(),
            category: category.into(),
            author: author.into(),
            price: 0.0,
            product_url: String::new(),
            image_url: String::new(),
        }
    }

    const NONE: [&str; 0] = [];

    #[test]
    fn empty_filter_matches_everything() {
        let filters = FilterSet::default();
        assert!(filters.matches(&record("Fiction", "A")));
        assert!(filters.matches(&record("", "")));
    }

    #[test]
    fn empty_category_dimension_depends_only_on_author() {
        let filters = FilterSet::new(NONE, ["X"]);
        assert!(filters.matches(&record("Fiction", "X")));
        assert!(filters.matches(&record("Poetry", "X")));
        assert!(!filters.matches(&record("Fiction", "Y")));
        assert!(!filters.matches(&record("Fiction", "")));
    }

    #[test]
    fn both_dimensions_must_pass() {
        let filters = FilterSet::new(["Fiction", "Drama"], ["X"]);
        assert!(filters.matches(&record("Drama", "X")));
        assert!(!filters.matches(&record("Poetry", "X")));
        assert!(!filters.matches(&record("Drama", "Z")));
    }

    #[test]
    fn matching_is_exact_and_case_sensitive() {
        let filters = FilterSet::new(["Fiction"], NONE);
        assert!(filters.matches(&record(" Fiction ", "")));
        assert!(!filters.matches(&record("fiction", "")));
        assert!(!filters.matches(&record("Science Fiction", "")));
    }

    #[test]
    fn blank_selections_are_ignored() {
        let filters = FilterSet::new(["  ", ""], NONE);
        assert_eq!(filters, FilterSet::default());
        assert!(filters.matches(&record("Anything", "")));
    }
}
