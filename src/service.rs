use std::path::PathBuf;

use tokio::io::AsyncRead;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::catalog::{scan_facets, Facets, FilterSet};
use crate::error::ImportError;
use crate::session::state::ImportSession;
use crate::session::{SessionController, StatusSnapshot};
use crate::settings::Settings;
use crate::sources::{SourceFile, SourceStore};

const CURRENT_SOURCE: &str = "sources.current";

/// Entry point for every client operation. Mutations of the one import
/// session run one at a time; reads do not wait for them.
pub struct ImportService {
    controller: Mutex<SessionController>,
    settings: Settings,
    sources: SourceStore,
    scan_cap: Option<usize>,
}

impl ImportService {
    pub fn new(
        controller: SessionController,
        settings: Settings,
        sources: SourceStore,
        scan_cap: Option<usize>,
    ) -> Self {
        Self {
            controller: Mutex::new(controller),
            settings,
            sources,
            scan_cap,
        }
    }

    pub async fn list_sources(&self) -> Result<Vec<SourceFile>, ImportError> {
        Ok(self.sources.list().await?)
    }

    pub async fn upload_source<R>(
        &self,
        content_type: Option<&str>,
        content: R,
    ) -> Result<PathBuf, ImportError>
    where
        R: AsyncRead + Unpin,
    {
        let path = self.sources.upload(content_type, content).await?;
        self.remember(&path).await?;
        Ok(path)
    }

    pub async fn delete_source(&self, path: &str) -> Result<PathBuf, ImportError> {
        let deleted = self.sources.delete(path).await?;
        if self.current_path().await? == Some(deleted.clone()) {
            self.settings.delete(CURRENT_SOURCE).await?;
        }
        Ok(deleted)
    }

    /// The last uploaded or imported source, if it still exists.
    pub async fn current_source(&self) -> Result<Option<String>, ImportError> {
        let Some(path) = self.current_path().await? else {
            return Ok(None);
        };
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!(path = ?path, "current source is gone");
            return Ok(None);
        }
        Ok(Some(path.display().to_string()))
    }

    /// Distinct categories and authors of a source; the current source when
    /// no path is given.
    pub async fn scan_source(&self, path: Option<&str>) -> Result<Facets, ImportError> {
        let path = self.source_for(path).await?;
        Ok(scan_facets(&path, self.scan_cap).await?)
    }

    /// Starts a fresh session over the source, superseding any previous
    /// one. Returns the number of matching records when it was counted.
    pub async fn start_import(
        &self,
        path: Option<&str>,
        categories: Vec<String>,
        authors: Vec<String>,
    ) -> Result<Option<u64>, ImportError> {
        let path = self.source_for(path).await?;
        let filters = FilterSet::new(categories, authors);
        if filters.categories().next().is_none() {
            return Err(ImportError::NoGenreSelected);
        }

        let total = self.controller.lock().await.start(&path, filters).await?;
        self.remember(&path).await?;
        Ok(total)
    }

    pub async fn step_once(&self) -> Result<StatusSnapshot, ImportError> {
        self.controller.lock().await.step().await
    }

    /// Reads the persisted session without waiting for a step in flight.
    pub async fn status(&self) -> Result<StatusSnapshot, ImportError> {
        Ok(ImportSession::load(&self.settings).await?.snapshot())
    }

    pub async fn stop_import(&self) -> Result<StatusSnapshot, ImportError> {
        self.controller.lock().await.stop().await
    }

    pub async fn resume(&self) -> Result<bool, ImportError> {
        self.controller.lock().await.resume().await
    }

    async fn source_for(&self, path: Option<&str>) -> Result<PathBuf, ImportError> {
        let path = match path {
            Some(path) => path.to_string(),
            None => self
                .current_path()
                .await?
                .map(|path| path.display().to_string())
                .ok_or_else(|| ImportError::SourceNotFound("no source selected".to_string()))?,
        };
        match self.sources.resolve(&path).await {
            Err(ImportError::NotFound(path)) => Err(ImportError::SourceNotFound(path)),
            other => other,
        }
    }

    async fn current_path(&self) -> Result<Option<PathBuf>, ImportError> {
        Ok(self.settings.get::<PathBuf>(CURRENT_SOURCE).await?)
    }

    async fn remember(&self, path: &std::path::Path) -> Result<(), ImportError> {
        self.settings
            .set(CURRENT_SOURCE, &path.to_string_lossy())
            .await?;
        info!(path = ?path, "current source set");
        Ok(())
    }
}
