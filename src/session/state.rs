use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Result;
use async_graphql::{Enum, SimpleObject};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};

use crate::catalog::FilterSet;
use crate::settings::Settings;

const PREFIX: &str = "import.";
const SOURCE_PATH: &str = "import.source_path";
const CATEGORIES: &str = "import.categories";
const AUTHORS: &str = "import.authors";
const OFFSET: &str = "import.offset";
const PROCESSED: &str = "import.processed";
const FAILED: &str = "import.failed";
const TOTAL: &str = "import.total";
const STATUS: &str = "import.status";
const LAST_ERROR: &str = "import.last_error";
const STARTED_AT: &str = "import.started_at";
const UPDATED_AT: &str = "import.updated_at";

#[derive(Enum, Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Stopped,
    Error,
}

/// The single persisted import run. Each field lives under its own
/// settings key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportSession {
    pub source_path: Option<PathBuf>,
    pub filters: FilterSet,
    /// Matches consumed so far, not a byte or row position.
    pub offset: u64,
    pub processed_count: u64,
    pub failed_count: u64,
    pub total_count: Option<u64>,
    pub status: SessionStatus,
    pub last_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(SimpleObject, Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub status: SessionStatus,
    pub processed: u64,
    pub total: Option<u64>,
    pub failed: u64,
    pub last_error: Option<String>,
    /// `None` while the total is unknown.
    pub percent: Option<f64>,
    pub source_path: Option<String>,
}

impl ImportSession {
    pub fn start(source_path: PathBuf, filters: FilterSet, total_count: Option<u64>) -> Self {
        Self {
            source_path: Some(source_path),
            filters,
            total_count,
            status: SessionStatus::Running,
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub async fn load(settings: &Settings) -> Result<Self> {
        let values = settings.get_prefixed(PREFIX).await?;
        let categories: Vec<String> = field(&values, CATEGORIES)?.unwrap_or_default();
        let authors: Vec<String> = field(&values, AUTHORS)?.unwrap_or_default();

        Ok(Self {
            source_path: field(&values, SOURCE_PATH)?,
            filters: FilterSet::new(categories, authors),
            offset: field(&values, OFFSET)?.unwrap_or_default(),
            processed_count: field(&values, PROCESSED)?.unwrap_or_default(),
            failed_count: field(&values, FAILED)?.unwrap_or_default(),
            total_count: field(&values, TOTAL)?,
            status: field(&values, STATUS)?.unwrap_or_default(),
            last_error: field(&values, LAST_ERROR)?,
            started_at: field(&values, STARTED_AT)?,
            updated_at: field(&values, UPDATED_AT)?,
        })
    }

    /// Persists every field in one write, stamping `updated_at`.
    pub async fn save(&mut self, settings: &Settings) -> Result<()> {
        self.updated_at = Some(Utc::now());
        let categories: Vec<&str> = self.filters.categories().collect();
        let authors: Vec<&str> = self.filters.authors().collect();

        settings
            .set_many(&[
                (
                    SOURCE_PATH,
                    json!(self.source_path.as_ref().map(|path| path.to_string_lossy())),
                ),
                (CATEGORIES, json!(categories)),
                (AUTHORS, json!(authors)),
                (OFFSET, json!(self.offset)),
                (PROCESSED, json!(self.processed_count)),
                (FAILED, json!(self.failed_count)),
                (TOTAL, json!(self.total_count)),
                (STATUS, json!(self.status)),
                (LAST_ERROR, json!(self.last_error)),
                (STARTED_AT, json!(self.started_at)),
                (UPDATED_AT, json!(self.updated_at)),
            ])
            .await
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let percent = match self.total_count {
            // skipped duplicates never reach `processed`
            Some(_) if self.status == SessionStatus::Completed => Some(100.0),
            Some(total) if total > 0 => {
                Some((self.processed_count as f64 / total as f64 * 100.0).min(100.0))
            }
            _ => None,
        };

        StatusSnapshot {
            status: self.status,
            processed: self.processed_count,
            total: self.total_count,
            failed: self.failed_count,
            last_error: self.last_error.clone(),
            percent,
            source_path: self
                .source_path
                .as_ref()
                .map(|path| path.display().to_string()),
        }
    }
}

fn field<T: DeserializeOwned>(values: &HashMap<String, Value>, key: &str) -> Result<Option<T>> {
    match values.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(T::deserialize(value)?)),
    }
}
