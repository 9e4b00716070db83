use std::sync::Arc;

use storage::repository::Storage;

use crate::config::TrackerConfig;
use crate::course_progress_service::CourseProgressService;
use crate::error::AppServicesError;
use crate::tracker::ProgressTracker;
use crate::Clock;

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    storage: Storage,
    progress: Arc<CourseProgressService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        config: TrackerConfig,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(storage, clock, config))
    }

    /// Build services backed by in-memory storage.
    #[must_use]
    pub fn in_memory(clock: Clock, config: TrackerConfig) -> Self {
        Self::from_storage(Storage::in_memory(), clock, config)
    }

    #[must_use]
    pub fn from_storage(storage: Storage, clock: Clock, config: TrackerConfig) -> Self {
        let tracker = Arc::new(
            ProgressTracker::new(clock, Arc::clone(&storage.progress)).with_config(config),
        );
        let progress = Arc::new(CourseProgressService::new(
            tracker,
            Arc::clone(&storage.courses),
        ));
        Self { storage, progress }
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn progress(&self) -> Arc<CourseProgressService> {
        Arc::clone(&self.progress)
    }
}
