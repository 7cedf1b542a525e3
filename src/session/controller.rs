use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::importer::import_batch;
use super::scheduler::StepScheduler;
use super::state::{ImportSession, SessionStatus, StatusSnapshot};
use crate::catalog::{count_matches, read_page, FilterSet};
use crate::error::ImportError;
use crate::settings::Settings;
use crate::store::ContentStore;

pub const PAGE_SIZE: usize = 500;
pub const FILE_NOT_FOUND: &str = "file not found";

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub page_size: usize,
    /// Pause between a finished step and the next scheduled one.
    pub step_delay: Duration,
    /// Count matches up front so progress can be reported as a percentage.
    pub count_on_start: bool,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            step_delay: Duration::from_secs(2),
            count_on_start: true,
        }
    }
}

/// Drives the persisted import session through
/// `Idle -> Running -> Completed | Stopped | Error`.
///
/// Holds no lock of its own: callers must not run two operations at once.
pub struct SessionController {
    settings: Settings,
    store: Arc<dyn ContentStore>,
    scheduler: Arc<dyn StepScheduler>,
    options: ControllerOptions,
}

impl SessionController {
    pub fn new(
        settings: Settings,
        store: Arc<dyn ContentStore>,
        scheduler: Arc<dyn StepScheduler>,
        options: ControllerOptions,
    ) -> Self {
        Self {
            settings,
            store,
            scheduler,
            options,
        }
    }

    /// Replaces whatever session exists with a fresh running one and
    /// schedules its first step. Returns the number of matches, if counted.
    pub async fn start(
        &mut self,
        path: &Path,
        filters: FilterSet,
    ) -> Result<Option<u64>, ImportError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(ImportError::SourceNotFound(path.display().to_string()));
        }

        let total = if self.options.count_on_start {
            let start = Instant::now();
            let total = count_matches(path, &filters).await;
            info!(path = ?path, total, "counted matches in {:?}", start.elapsed());
            Some(total)
        } else {
            None
        };

        let mut session = ImportSession::start(path.to_path_buf(), filters, total);
        session.save(&self.settings).await?;
        info!(path = ?path, "import started");

        self.scheduler.schedule(Duration::ZERO);
        Ok(total)
    }

    /// Imports the next page of the running session. Does nothing unless the
    /// session is running.
    pub async fn step(&mut self) -> Result<StatusSnapshot, ImportError> {
        let mut session = ImportSession::load(&self.settings).await?;
        if session.status != SessionStatus::Running {
            return Ok(session.snapshot());
        }

        let path = match &session.source_path {
            Some(path) if tokio::fs::try_exists(path).await.unwrap_or(false) => path.clone(),
            _ => {
                warn!(path = ?session.source_path, "import source disappeared");
                session.status = SessionStatus::Error;
                session.last_error = Some(FILE_NOT_FOUND.to_string());
                session.save(&self.settings).await?;
                return Ok(session.snapshot());
            }
        };

        let start = Instant::now();
        let page = read_page(&path, &session.filters, session.offset, self.options.page_size).await;
        if page.is_empty() {
            session.status = SessionStatus::Completed;
            session.save(&self.settings).await?;
            info!(
                processed = session.processed_count,
                failed = session.failed_count,
                "import completed"
            );
            return Ok(session.snapshot());
        }

        let read = page.len();
        let outcome = import_batch(self.store.as_ref(), page).await?;

        // the offset counts matches consumed, so skipped and failed records
        // are never read again
        session.offset += self.options.page_size as u64;
        session.processed_count += outcome.imported;
        session.failed_count += outcome.failed;
        // a short page means the stream ran out
        let exhausted = read < self.options.page_size;
        if exhausted {
            session.status = SessionStatus::Completed;
        }
        session.save(&self.settings).await?;

        info!(
            offset = session.offset,
            read,
            imported = outcome.imported,
            skipped = outcome.skipped,
            failed = outcome.failed,
            "step finished in {:?}",
            start.elapsed()
        );

        if exhausted {
            info!(
                processed = session.processed_count,
                failed = session.failed_count,
                "import completed"
            );
        } else {
            self.scheduler.schedule(self.options.step_delay);
        }
        Ok(session.snapshot())
    }

    /// Cancels the pending step and marks the session stopped, keeping its
    /// counters for inspection.
    pub async fn stop(&mut self) -> Result<StatusSnapshot, ImportError> {
        self.scheduler.cancel();
        let mut session = ImportSession::load(&self.settings).await?;
        session.status = SessionStatus::Stopped;
        session.save(&self.settings).await?;
        info!(processed = session.processed_count, "import stopped");
        Ok(session.snapshot())
    }

    /// Re-arms the scheduler for a session left running by a previous process.
    pub async fn resume(&self) -> Result<bool, ImportError> {
        let session = ImportSession::load(&self.settings).await?;
        if session.status != SessionStatus::Running {
            return Ok(false);
        }
        info!(
            offset = session.offset,
            processed = session.processed_count,
            "resuming interrupted import"
        );
        self.scheduler.schedule(Duration::ZERO);
        Ok(true)
    }
}
