use std::collections::HashSet;

use anyhow::Result;
use sqlx::{QueryBuilder, SqlitePool};

use super::{ContentStore, EntryId, NewEntry, Taxonomy, TermId};

#[derive(Clone)]
pub struct SqliteContentStore {
    pool: SqlitePool,
}

impl SqliteContentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ContentStore for SqliteContentStore {
    async fn existing_ids(&self, external_ids: &[String]) -> Result<HashSet<String>> {
        if external_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let mut qb = QueryBuilder::new("SELECT external_id FROM entries WHERE external_id IN (");
        let mut separated = qb.separated(", ");
        for id in external_ids {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(")");

        let found = qb
            .build_query_scalar::<String>()
            .fetch_all(&self.pool)
            .await?;
        Ok(found.into_iter().collect())
    }

    async fn create_entry(&self, entry: &NewEntry) -> Result<EntryId> {
        let mut tx = self.pool.begin().await?;

        let id: EntryId = sqlx::query_scalar(
            "INSERT INTO entries (external_id, title, content, excerpt, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id",
        )
        .bind(&entry.external_id)
        .bind(&entry.title)
        .bind(&entry.content)
        .bind(&entry.excerpt)
        .bind(entry.status)
        .bind(chrono::Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        if !entry.meta.is_empty() {
            let mut qb = QueryBuilder::new("INSERT INTO entry_meta (entry_id, key, value) ");
            qb.push_values(&entry.meta, |mut qb, (key, value)| {
                qb.push_bind(id).push_bind(*key).push_bind(value.clone());
            });
            qb.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(id)
    }

    async fn find_term(&self, taxonomy: Taxonomy, name: &str) -> Result<Option<TermId>> {
        let id = sqlx::query_scalar("SELECT id FROM terms WHERE taxonomy = ? AND name = ?")
            .bind(taxonomy.as_str())
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn create_term(&self, taxonomy: Taxonomy, name: &str) -> Result<TermId> {
        // a concurrent insert of the same name resolves to the existing row
        let id = sqlx::query_scalar(
            "INSERT INTO terms (taxonomy, name) VALUES (?, ?)
            ON CONFLICT(taxonomy, name) DO UPDATE SET name = excluded.name
            RETURNING id",
        )
        .bind(taxonomy.as_str())
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn attach_term(&self, entry: EntryId, term: TermId) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO entry_terms (entry_id, term_id) VALUES (?, ?)")
            .bind(entry)
            .bind(term)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn entry(external_id: &str) -> NewEntry {
        NewEntry {
            external_id: external_id.into(),
            title: "Title".into(),
            content: "<p>Body</p>".into(),
            excerpt: "Body".into(),
            status: "publish",
            meta: vec![("price", "9.5".into()), ("url", "https://shop".into())],
        }
    }

    #[tokio::test]
    async fn existing_ids_reports_only_stored_entries() {
        let pool = test_pool().await;
        let store = SqliteContentStore::new(pool);
        store.create_entry(&entry("a")).await.unwrap();
        store.create_entry(&entry("c")).await.unwrap();

        let ids = ["a", "b", "c"].map(String::from);
        let found = store.existing_ids(&ids).await.unwrap();
        assert_eq!(found, HashSet::from(["a".to_string(), "c".to_string()]));
        assert!(store.existing_ids(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_external_id_is_rejected() {
        let store = SqliteContentStore::new(test_pool().await);
        store.create_entry(&entry("a")).await.unwrap();
        assert!(store.create_entry(&entry("a")).await.is_err());
    }

    #[tokio::test]
    async fn entry_meta_is_stored() {
        let pool = test_pool().await;
        let store = SqliteContentStore::new(pool.clone());
        let id = store.create_entry(&entry("a")).await.unwrap();

        let price: String =
            sqlx::query_scalar("SELECT value FROM entry_meta WHERE entry_id = ? AND key = 'price'")
                .bind(id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(price, "9.5");
    }

    #[tokio::test]
    async fn terms_are_scoped_by_taxonomy() {
        let store = SqliteContentStore::new(test_pool().await);
        assert_eq!(store.find_term(Taxonomy::Genre, "Poe").await.unwrap(), None);

        let genre = store.create_term(Taxonomy::Genre, "Poe").await.unwrap();
        let author = store.create_term(Taxonomy::Author, "Poe").await.unwrap();
        assert_ne!(genre, author);
        assert_eq!(store.find_term(Taxonomy::Genre, "Poe").await.unwrap(), Some(genre));
        assert_eq!(store.create_term(Taxonomy::Genre, "Poe").await.unwrap(), genre);
    }
}
