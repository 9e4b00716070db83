use async_trait::async_trait;
use chrono::{DateTime, Utc};
use course_core::model::{CourseId, CourseStructure, ProgressRecord, ProgressSummary, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("storage operation timed out")]
    Timeout,

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Repository contract for per-user course progress.
///
/// Writes are conditional on [`ProgressRecord::version`]; an adapter must
/// reject a write whose version does not match the stored row.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch the record for a user/course pair.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn get_progress(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Option<ProgressRecord>, StorageError>;

    /// Insert a new record unless one already exists for the pair.
    ///
    /// Returns whichever record is stored afterwards, so concurrent creators
    /// converge on one row.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the insert fails.
    async fn insert_progress(&self, record: &ProgressRecord) -> Result<ProgressRecord, StorageError>;

    /// Replace a stored record if its version still matches `record.version()`.
    ///
    /// Returns the new version.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the row is gone and
    /// `StorageError::Conflict` if another writer got there first.
    async fn update_progress(&self, record: &ProgressRecord) -> Result<u64, StorageError>;

    /// Advance the last-access time without touching completion state. An
    /// `at` earlier than the stored time leaves it unchanged.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no record exists.
    async fn touch_progress(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Cached summaries of every record owned by `user_id`, most recently
    /// accessed first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn list_summaries(&self, user_id: &UserId) -> Result<Vec<ProgressSummary>, StorageError>;

    /// Remove all progress for a course. Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the delete fails.
    async fn delete_course_progress(&self, course_id: &CourseId) -> Result<u64, StorageError>;

    /// Remove all progress owned by a user. Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the delete fails.
    async fn delete_user_progress(&self, user_id: &UserId) -> Result<u64, StorageError>;
}

/// Read side of the course catalog, plus the writes the seed tool needs.
#[async_trait]
pub trait CourseCatalog: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn get_course_structure(
        &self,
        course_id: &CourseId,
    ) -> Result<Option<CourseStructure>, StorageError>;

    /// Store or replace a course's sections and chapters. Existing progress
    /// is left alone.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn upsert_course_structure(&self, course: &CourseStructure) -> Result<(), StorageError>;

    /// Delete a course and, with it, every progress record referencing it.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the course does not exist.
    async fn delete_course(&self, course_id: &CourseId) -> Result<(), StorageError>;
}

type ProgressKey = (UserId, CourseId);

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    progress: Arc<Mutex<HashMap<ProgressKey, ProgressRecord>>>,
    courses: Arc<Mutex<HashMap<CourseId, CourseStructure>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn progress_guard(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<ProgressKey, ProgressRecord>>, StorageError> {
        self.progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    fn courses_guard(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<CourseId, CourseStructure>>, StorageError> {
        self.courses
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn get_progress(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let guard = self.progress_guard()?;
        Ok(guard.get(&(user_id.clone(), course_id.clone())).cloned())
    }

    async fn insert_progress(&self, record: &ProgressRecord) -> Result<ProgressRecord, StorageError> {
        let mut guard = self.progress_guard()?;
        let key = (record.user_id().clone(), record.course_id().clone());
        let stored = guard.entry(key).or_insert_with(|| {
            let mut fresh = record.clone();
            fresh.set_version(1);
            fresh
        });
        Ok(stored.clone())
    }

    async fn update_progress(&self, record: &ProgressRecord) -> Result<u64, StorageError> {
        let mut guard = self.progress_guard()?;
        let key = (record.user_id().clone(), record.course_id().clone());
        let stored = guard.get_mut(&key).ok_or(StorageError::NotFound)?;
        if stored.version() != record.version() {
            return Err(StorageError::Conflict);
        }
        let next = record.version() + 1;
        let mut updated = record.clone();
        updated.set_version(next);
        *stored = updated;
        Ok(next)
    }

    async fn touch_progress(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self.progress_guard()?;
        let stored = guard
            .get_mut(&(user_id.clone(), course_id.clone()))
            .ok_or(StorageError::NotFound)?;
        stored.touch(at);
        Ok(())
    }

    async fn list_summaries(&self, user_id: &UserId) -> Result<Vec<ProgressSummary>, StorageError> {
        let guard = self.progress_guard()?;
        let mut out: Vec<ProgressSummary> = guard
            .values()
            .filter(|r| r.user_id() == user_id)
            .map(ProgressRecord::summary)
            .collect();
        out.sort_by(|a, b| {
            b.last_accessed_timestamp
                .cmp(&a.last_accessed_timestamp)
                .then_with(|| a.course_id.cmp(&b.course_id))
        });
        Ok(out)
    }

    async fn delete_course_progress(&self, course_id: &CourseId) -> Result<u64, StorageError> {
        let mut guard = self.progress_guard()?;
        let before = guard.len();
        guard.retain(|(_, c), _| c != course_id);
        Ok((before - guard.len()) as u64)
    }

    async fn delete_user_progress(&self, user_id: &UserId) -> Result<u64, StorageError> {
        let mut guard = self.progress_guard()?;
        let before = guard.len();
        guard.retain(|(u, _), _| u != user_id);
        Ok((before - guard.len()) as u64)
    }
}

#[async_trait]
impl CourseCatalog for InMemoryRepository {
    async fn get_course_structure(
        &self,
        course_id: &CourseId,
    ) -> Result<Option<CourseStructure>, StorageError> {
        let guard = self.courses_guard()?;
        Ok(guard.get(course_id).cloned())
    }

    async fn upsert_course_structure(&self, course: &CourseStructure) -> Result<(), StorageError> {
        let mut guard = self.courses_guard()?;
        guard.insert(course.course_id().clone(), course.clone());
        Ok(())
    }

    async fn delete_course(&self, course_id: &CourseId) -> Result<(), StorageError> {
        {
            let mut guard = self.courses_guard()?;
            guard.remove(course_id).ok_or(StorageError::NotFound)?;
        }
        self.delete_course_progress(course_id).await?;
        Ok(())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
    pub courses: Arc<dyn CourseCatalog>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
        let courses: Arc<dyn CourseCatalog> = Arc::new(repo);
        Self { progress, courses }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::{ChapterDef, ChapterId, ChapterType, SectionDef, SectionId};
    use course_core::time::fixed_now;

    fn course(id: &str) -> CourseStructure {
        CourseStructure::new(
            CourseId::parse(id).unwrap(),
            vec![SectionDef::new(
                SectionId::parse("s1").unwrap(),
                "Intro",
                vec![ChapterDef::new(
                    ChapterId::parse("c1").unwrap(),
                    "Welcome",
                    ChapterType::Video,
                )],
            )],
        )
        .unwrap()
    }

    fn user(id: &str) -> UserId {
        UserId::parse(id).unwrap()
    }

    #[tokio::test]
    async fn insert_is_idempotent() {
        let repo = InMemoryRepository::new();
        let first = ProgressRecord::seeded(user("u1"), &course("c"), fixed_now());
        let stored = repo.insert_progress(&first).await.unwrap();
        assert_eq!(stored.version(), 1);

        let later = ProgressRecord::seeded(
            user("u1"),
            &course("c"),
            fixed_now() + chrono::Duration::days(1),
        );
        let again = repo.insert_progress(&later).await.unwrap();
        assert_eq!(again.enrollment_date(), fixed_now());
    }

    #[tokio::test]
    async fn stale_update_conflicts() {
        let repo = InMemoryRepository::new();
        let record = ProgressRecord::seeded(user("u1"), &course("c"), fixed_now());
        let stored = repo.insert_progress(&record).await.unwrap();

        let next = repo.update_progress(&stored).await.unwrap();
        assert_eq!(next, 2);
        assert!(matches!(
            repo.update_progress(&stored).await,
            Err(StorageError::Conflict)
        ));
    }

    #[tokio::test]
    async fn deleting_course_cascades_to_progress() {
        let repo = InMemoryRepository::new();
        let c = course("c");
        repo.upsert_course_structure(&c).await.unwrap();
        repo.insert_progress(&ProgressRecord::seeded(user("u1"), &c, fixed_now()))
            .await
            .unwrap();
        repo.insert_progress(&ProgressRecord::seeded(user("u2"), &c, fixed_now()))
            .await
            .unwrap();

        repo.delete_course(c.course_id()).await.unwrap();
        assert!(repo.get_course_structure(c.course_id()).await.unwrap().is_none());
        assert!(repo.list_summaries(&user("u1")).await.unwrap().is_empty());
        assert!(matches!(
            repo.delete_course(c.course_id()).await,
            Err(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn summaries_are_scoped_to_user() {
        let repo = InMemoryRepository::new();
        for (u, c) in [("u1", "a"), ("u1", "b"), ("u2", "a")] {
            repo.insert_progress(&ProgressRecord::seeded(user(u), &course(c), fixed_now()))
                .await
                .unwrap();
        }
        let summaries = repo.list_summaries(&user("u1")).await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(repo.delete_user_progress(&user("u1")).await.unwrap(), 2);
        assert_eq!(repo.list_summaries(&user("u2")).await.unwrap().len(), 1);
    }
}
