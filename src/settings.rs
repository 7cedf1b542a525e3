use std::collections::HashMap;

use anyhow::Result;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use sqlx::{QueryBuilder, SqlitePool};

/// Host key/value settings table. Values are stored as JSON.
#[derive(Clone)]
pub struct Settings {
    pool: SqlitePool,
}

impl Settings {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let raw: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Every setting whose key starts with `prefix`.
    pub async fn get_prefixed(&self, prefix: &str) -> Result<HashMap<String, Value>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM settings WHERE substr(key, 1, length(?1)) = ?1")
                .bind(prefix)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|(key, raw)| -> Result<(String, Value)> { Ok((key, serde_json::from_str(&raw)?)) })
            .collect()
    }

    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.set_many(&[(key, serde_json::to_value(value)?)]).await
    }

    /// Writes all values in one transaction.
    pub async fn set_many(&self, values: &[(&str, Value)]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        let mut qb = QueryBuilder::new("INSERT INTO settings (key, value) ");
        qb.push_values(values, |mut qb, (key, value)| {
            qb.push_bind(key.to_string()).push_bind(value.to_string());
        });
        qb.push(" ON CONFLICT(key) DO UPDATE SET value = excluded.value");
        qb.build().execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use serde_json::json;

    #[tokio::test]
    async fn round_trips_json_values() {
        let settings = Settings::new(test_pool().await);
        assert_eq!(settings.get::<u64>("missing").await.unwrap(), None);

        settings.set("import.offset", &500u64).await.unwrap();
        settings.set("import.offset", &1000u64).await.unwrap();
        assert_eq!(settings.get::<u64>("import.offset").await.unwrap(), Some(1000));

        settings.delete("import.offset").await.unwrap();
        assert_eq!(settings.get::<u64>("import.offset").await.unwrap(), None);
    }

    #[tokio::test]
    async fn prefixed_lookup_returns_only_matching_keys() {
        let settings = Settings::new(test_pool().await);
        settings
            .set_many(&[
                ("import.status", json!("running")),
                ("import.authors", json!(["Ann"])),
                ("importer", json!(1)),
                ("sources.current", json!("/tmp/a.csv")),
            ])
            .await
            .unwrap();

        let values = settings.get_prefixed("import.").await.unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values["import.status"], json!("running"));
        assert_eq!(values["import.authors"], json!(["Ann"]));
    }
}
