use std::collections::{HashMap, HashSet};

use anyhow::Result;
use itertools::Itertools;
use tracing::{debug, warn};

use crate::catalog::CatalogRecord;
use crate::markup::{excerpt, sanitize, strip_all_tags, EXCERPT_WORDS};
use crate::store::{ContentStore, EntryId, NewEntry, Taxonomy, TermId};

pub const PUBLISHED: &str = "publish";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Entries actually created.
    pub imported: u64,
    /// Records whose id was already in the store.
    pub skipped: u64,
    /// Records the store rejected.
    pub failed: u64,
}

/// Term ids resolved while importing one batch.
#[derive(Default)]
struct TermCache {
    terms: HashMap<(Taxonomy, String), TermId>,
}

impl TermCache {
    async fn resolve(
        &mut self,
        store: &dyn ContentStore,
        taxonomy: Taxonomy,
        name: &str,
    ) -> Result<TermId> {
        let key = (taxonomy, name.to_string());
        if let Some(id) = self.terms.get(&key) {
            return Ok(*id);
        }

        let id = match store.find_term(taxonomy, name).await? {
            Some(id) => id,
            None => store.create_term(taxonomy, name).await?,
        };
        self.terms.insert(key, id);
        Ok(id)
    }
}

/// Imports one page of records, skipping ids the store already has.
///
/// A record the store rejects is logged and counted as failed; the rest of
/// the page still goes through. Only the bulk id lookup can fail the batch.
pub async fn import_batch(
    store: &dyn ContentStore,
    records: Vec<CatalogRecord>,
) -> Result<BatchOutcome> {
    let ids = records.iter().map(|record| record.id.clone()).collect_vec();
    let mut existing: HashSet<String> = store.existing_ids(&ids).await?;
    let mut terms = TermCache::default();
    let mut outcome = BatchOutcome::default();

    for record in records {
        if record.id.is_empty() {
            warn!(title = %record.title, "skipping record without id");
            outcome.failed += 1;
            continue;
        }
        if existing.contains(&record.id) {
            outcome.skipped += 1;
            continue;
        }

        let entry = match store.create_entry(&new_entry(&record)).await {
            Ok(entry) => entry,
            Err(err) => {
                warn!(id = %record.id, "store rejected record: {:#}", err);
                outcome.failed += 1;
                continue;
            }
        };
        existing.insert(record.id.clone());

        tag(store, &mut terms, entry, Taxonomy::Genre, &record.category).await;
        tag(store, &mut terms, entry, Taxonomy::Author, &record.author).await;
        outcome.imported += 1;
    }

    store.flush_cache().await?;
    debug!(
        imported = outcome.imported,
        skipped = outcome.skipped,
        failed = outcome.failed,
        terms = terms.terms.len(),
        "batch written"
    );
    Ok(outcome)
}

fn new_entry(record: &CatalogRecord) -> NewEntry {
    NewEntry {
        external_id: record.id.clone(),
        title: strip_all_tags(&record.title),
        content: sanitize(&record.description),
        excerpt: excerpt(&record.description, EXCERPT_WORDS),
        status: PUBLISHED,
        meta: vec![
            ("price", record.price.to_string()),
            ("url", record.product_url.clone()),
            ("image", record.image_url.clone()),
        ],
    }
}

async fn tag(
    store: &dyn ContentStore,
    terms: &mut TermCache,
    entry: EntryId,
    taxonomy: Taxonomy,
    name: &str,
) {
    if name.is_empty() {
        return;
    }

    let attached = match terms.resolve(store, taxonomy, name).await {
        Ok(term) => store.attach_term(entry, term).await,
        Err(err) => Err(err),
    };
    if let Err(err) = attached {
        warn!(entry, taxonomy = taxonomy.as_str(), name, "failed to tag entry: {:#}", err);
    }
}
