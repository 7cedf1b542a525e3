use std::collections::HashSet;

use anyhow::Result;

mod sqlite;

pub use sqlite::SqliteContentStore;

pub type EntryId = i64;
pub type TermId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Taxonomy {
    Genre,
    Author,
}

impl Taxonomy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Taxonomy::Genre => "genre",
            Taxonomy::Author => "author",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub external_id: String,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub status: &'static str,
    pub meta: Vec<(&'static str, String)>,
}

/// Document store the importer writes into.
#[async_trait::async_trait]
pub trait ContentStore: Send + Sync {
    /// Which of `external_ids` already have an entry, in one round trip.
    async fn existing_ids(&self, external_ids: &[String]) -> Result<HashSet<String>>;

    async fn create_entry(&self, entry: &NewEntry) -> Result<EntryId>;

    async fn find_term(&self, taxonomy: Taxonomy, name: &str) -> Result<Option<TermId>>;

    async fn create_term(&self, taxonomy: Taxonomy, name: &str) -> Result<TermId>;

    async fn attach_term(&self, entry: EntryId, term: TermId) -> Result<()>;

    /// Drops any read-through caching so the next batch sees this one's writes.
    async fn flush_cache(&self) -> Result<()> {
        Ok(())
    }
}
