use std::future::ready;
use std::path::Path;

use futures::StreamExt;
use tracing::warn;

use super::{filter::FilterSet, reader::CatalogReader, record::CatalogRecord};

/// Number of records in the file matching `filters`. An unreadable source
/// counts as having no matches.
pub async fn count_matches(path: &Path, filters: &FilterSet) -> u64 {
    let reader = match CatalogReader::open(path).await {
        Ok(reader) => reader,
        Err(err) => {
            warn!(path = ?path, "cannot count matches: {}", err);
            return 0;
        }
    };

    reader
        .into_stream()
        .filter(|record| ready(filters.matches(record)))
        .count()
        .await as u64
}

/// Reads the page of matches that starts after the first `offset` matches.
///
/// Every call scans from the start of the file; no cursor is kept between
/// pages. An empty page means the offset is past the last match.
pub async fn read_page(
    path: &Path,
    filters: &FilterSet,
    offset: u64,
    page_size: usize,
) -> Vec<CatalogRecord> {
    let reader = match CatalogReader::open(path).await {
        Ok(reader) => reader,
        Err(err) => {
            warn!(path = ?path, offset, "cannot read page: {}", err);
            return Vec::new();
        }
    };

    let offset = usize::try_from(offset).unwrap_or(usize::MAX);
    reader
        .into_stream()
        .filter(|record| ready(filters.matches(record)))
        .skip(offset)
        .take(page_size)
        .collect()
        .await
}
