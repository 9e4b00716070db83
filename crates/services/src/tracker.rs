use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use course_core::model::{
    ChapterId, CourseId, CourseStructure, ProgressRecord, ProgressSummary, ProgressUpdate,
    SectionId, UserId,
};
use storage::repository::ProgressRepository;

use crate::config::TrackerConfig;
use crate::error::ProgressError;
use crate::locks::KeyedLocks;
use crate::Clock;

//
// ─── SUMMARIES ─────────────────────────────────────────────────────────────────
//

/// Cached summaries of every course a user is enrolled in.
///
/// Iterating does not consume the listing, so callers can walk it more than
/// once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EnrolledSummaries {
    items: Vec<ProgressSummary>,
}

impl EnrolledSummaries {
    pub fn iter(&self) -> std::slice::Iter<'_, ProgressSummary> {
        self.items.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<ProgressSummary> {
        self.items
    }
}

impl<'a> IntoIterator for &'a EnrolledSummaries {
    type Item = &'a ProgressSummary;
    type IntoIter = std::slice::Iter<'a, ProgressSummary>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl IntoIterator for EnrolledSummaries {
    type Item = ProgressSummary;
    type IntoIter = std::vec::IntoIter<ProgressSummary>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

//
// ─── TRACKER ───────────────────────────────────────────────────────────────────
//

/// Owns per-user, per-course progress records.
///
/// Every write for a `(user, course)` pair runs as one read-mutate-recompute-write
/// cycle under that pair's lock. The store's version check catches writers in
/// other processes; a conflicting cycle is replayed up to
/// `TrackerConfig::conflict_retries` times.
pub struct ProgressTracker {
    clock: Clock,
    config: TrackerConfig,
    progress: Arc<dyn ProgressRepository>,
    locks: KeyedLocks<(UserId, CourseId)>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(clock: Clock, progress: Arc<dyn ProgressRepository>) -> Self {
        Self {
            clock,
            config: TrackerConfig::default(),
            progress,
            locks: KeyedLocks::new(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn config(&self) -> TrackerConfig {
        self.config
    }

    /// Return the user's record for `course`, enrolling them if none exists.
    ///
    /// An existing record comes back unchanged apart from its last-access
    /// time. A new one starts at 0% with every chapter of `course` pending.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::CourseNotFound` if the store does not know the
    /// course, and `PersistenceUnavailable`/`Corrupt` for store failures.
    #[tracing::instrument(skip_all, fields(user = %user_id, course = %course.course_id()))]
    pub async fn get_or_create(
        &self,
        user_id: &UserId,
        course: &CourseStructure,
    ) -> Result<ProgressRecord, ProgressError> {
        let course_id = course.course_id();
        let _guard = self.locks.lock((user_id.clone(), course_id.clone())).await;
        let now = self.clock.now();

        if let Some(mut record) = self
            .config
            .bounded(self.progress.get_progress(user_id, course_id))
            .await?
        {
            self.config
                .bounded(self.progress.touch_progress(user_id, course_id, now))
                .await?;
            record.touch(now);
            debug!(version = record.version(), "returning existing progress");
            return Ok(record);
        }

        let seeded = ProgressRecord::seeded(user_id.clone(), course, now);
        let stored = self
            .config
            .bounded(self.progress.insert_progress(&seeded))
            .await
            .map_err(|err| match err {
                ProgressError::RecordGone => ProgressError::CourseNotFound(course_id.clone()),
                other => other,
            })?;
        info!(
            chapters = course.total_chapters(),
            version = stored.version(),
            "enrolled user in course"
        );
        Ok(stored)
    }

    /// Authoritative read: the stored record with its percentage recomputed
    /// against `course`. Bumps the last-access time.
    ///
    /// The recomputed percentage is not written back; summaries keep the
    /// value cached by the last write.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::ProgressNotFound` if the user is not enrolled.
    #[tracing::instrument(skip_all, fields(user = %user_id, course = %course.course_id()))]
    pub async fn get_progress(
        &self,
        user_id: &UserId,
        course: &CourseStructure,
    ) -> Result<ProgressRecord, ProgressError> {
        let course_id = course.course_id();
        let _guard = self.locks.lock((user_id.clone(), course_id.clone())).await;

        let mut record = self
            .config
            .bounded(self.progress.get_progress(user_id, course_id))
            .await?
            .ok_or_else(|| not_enrolled(user_id, course_id))?;

        let now = self.clock.now();
        self.config
            .bounded(self.progress.touch_progress(user_id, course_id, now))
            .await?;
        record.touch(now);
        record.recompute(course);
        Ok(record)
    }

    /// Mark a single chapter complete or incomplete.
    ///
    /// Idempotent. Section and chapter entries missing from the record are
    /// created on the way.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::ProgressNotFound` if the user is not enrolled,
    /// `ProgressError::ChapterNotFound` if the chapter is not part of `course`,
    /// and `ProgressError::Conflict` once the retry budget is spent.
    pub async fn set_chapter_completion(
        &self,
        user_id: &UserId,
        course: &CourseStructure,
        section_id: &SectionId,
        chapter_id: &ChapterId,
        completed: bool,
    ) -> Result<ProgressRecord, ProgressError> {
        let update = ProgressUpdate::single(section_id.clone(), chapter_id.clone(), completed);
        self.apply_update(user_id, course, &update).await
    }

    /// Add `seconds` to a chapter's time spent without changing its
    /// completion flag.
    ///
    /// # Errors
    ///
    /// Same as [`ProgressTracker::set_chapter_completion`].
    #[tracing::instrument(
        skip_all,
        fields(user = %user_id, course = %course.course_id(), section = %section_id, chapter = %chapter_id)
    )]
    pub async fn record_chapter_time(
        &self,
        user_id: &UserId,
        course: &CourseStructure,
        section_id: &SectionId,
        chapter_id: &ChapterId,
        seconds: u64,
    ) -> Result<ProgressRecord, ProgressError> {
        ensure_in_course(course, section_id, chapter_id)?;
        self.mutate(user_id, course, |record, now| {
            record.add_time_spent(section_id, chapter_id, seconds, now);
        })
        .await
    }

    /// Apply a validated batch of chapter changes in one cycle.
    ///
    /// Every change is checked against `course` before anything is read or
    /// written, so a rejected batch leaves the record untouched.
    ///
    /// # Errors
    ///
    /// Same as [`ProgressTracker::set_chapter_completion`].
    #[tracing::instrument(
        skip_all,
        fields(user = %user_id, course = %course.course_id(), changes = update.changes().len())
    )]
    pub async fn apply_update(
        &self,
        user_id: &UserId,
        course: &CourseStructure,
        update: &ProgressUpdate,
    ) -> Result<ProgressRecord, ProgressError> {
        for change in update.changes() {
            ensure_in_course(course, &change.section_id, &change.chapter_id)?;
        }

        self.mutate(user_id, course, |record, now| {
            for change in update.changes() {
                record.set_chapter_completion(
                    &change.section_id,
                    &change.chapter_id,
                    change.completed,
                    now,
                );
                if let Some(seconds) = change.time_spent {
                    record.add_time_spent(&change.section_id, &change.chapter_id, seconds, now);
                }
            }
        })
        .await
    }

    /// Cached summaries for every course `user_id` is enrolled in, most
    /// recently accessed first.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceUnavailable`/`Corrupt` for store failures.
    #[tracing::instrument(skip_all, fields(user = %user_id))]
    pub async fn list_enrolled_summaries(
        &self,
        user_id: &UserId,
    ) -> Result<EnrolledSummaries, ProgressError> {
        let items = self
            .config
            .bounded(self.progress.list_summaries(user_id))
            .await?;
        debug!(count = items.len(), "listed enrolled courses");
        Ok(EnrolledSummaries { items })
    }

    async fn mutate<F>(
        &self,
        user_id: &UserId,
        course: &CourseStructure,
        apply: F,
    ) -> Result<ProgressRecord, ProgressError>
    where
        F: Fn(&mut ProgressRecord, DateTime<Utc>) + Send,
    {
        let course_id = course.course_id();
        let _guard = self.locks.lock((user_id.clone(), course_id.clone())).await;
        let mut attempt = 0_u32;

        loop {
            let mut record = self
                .config
                .bounded(self.progress.get_progress(user_id, course_id))
                .await?
                .ok_or_else(|| not_enrolled(user_id, course_id))?;

            apply(&mut record, self.clock.now());
            let percent = record.recompute(course);

            match self
                .config
                .bounded(self.progress.update_progress(&record))
                .await
            {
                Ok(version) => {
                    record.set_version(version);
                    debug!(version, percent, "progress written");
                    return Ok(record);
                }
                Err(ProgressError::Conflict) if attempt < self.config.conflict_retries => {
                    attempt += 1;
                    warn!(attempt, "stale progress version, replaying update");
                }
                Err(ProgressError::RecordGone) => return Err(not_enrolled(user_id, course_id)),
                Err(err) => return Err(err),
            }
        }
    }
}

fn not_enrolled(user_id: &UserId, course_id: &CourseId) -> ProgressError {
    ProgressError::ProgressNotFound {
        user: user_id.clone(),
        course: course_id.clone(),
    }
}

fn ensure_in_course(
    course: &CourseStructure,
    section_id: &SectionId,
    chapter_id: &ChapterId,
) -> Result<(), ProgressError> {
    if course.contains_chapter(section_id, chapter_id) {
        Ok(())
    } else {
        Err(ProgressError::ChapterNotFound {
            section: section_id.clone(),
            chapter: chapter_id.clone(),
        })
    }
}
