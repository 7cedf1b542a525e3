use std::collections::HashSet;
use std::path::Path;

use anyhow::Result;
use async_graphql::SimpleObject;
use serde::Serialize;
use tracing::info;

use super::reader::CatalogReader;

/// Distinct categories and authors in order of first appearance.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, SimpleObject)]
pub struct Facets {
    pub categories: Vec<String>,
    pub authors: Vec<String>,
}

#[derive(Default)]
struct Distinct {
    seen: HashSet<String>,
    values: Vec<String>,
}

impl Distinct {
    fn push(&mut self, value: &str) {
        if !value.is_empty() && !self.seen.contains(value) {
            self.seen.insert(value.to_string());
            self.values.push(value.to_string());
        }
    }
}

/// Scans at most `cap` data rows, malformed ones included (all of them when
/// `None`). A capped scan is a prefix sample of the file, not its full value
/// set.
pub async fn scan_facets(path: &Path, cap: Option<usize>) -> Result<Facets> {
    let start = std::time::Instant::now();
    let mut reader = CatalogReader::open(path).await?;
    let mut categories = Distinct::default();
    let mut authors = Distinct::default();
    let mut scanned = 0usize;

    while cap.map_or(true, |cap| scanned < cap) {
        let Some(row) = reader.next_row().await else {
            break;
        };
        scanned += 1;
        if let Some(record) = row {
            categories.push(&record.category);
            authors.push(&record.author);
        }
    }

    info!(
        path = ?path,
        scanned,
        categories = categories.values.len(),
        authors = authors.values.len(),
        "scanned facets in {:?}",
        start.elapsed()
    );

    Ok(Facets {
        categories: categories.values,
        authors: authors.values,
    })
}
