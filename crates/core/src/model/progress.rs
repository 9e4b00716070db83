use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::aggregate::compute_overall_progress;
use crate::model::course::CourseStructure;
use crate::model::ids::{ChapterId, CourseId, SectionId, UserId};

/// Largest per-chapter time total, in seconds, that storage can represent.
pub const MAX_TIME_SPENT_SECS: u64 = i64::MAX.unsigned_abs();

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressRecordError {
    #[error("overall progress must be within 0..=100, got {0}")]
    InvalidPercentage(u8),

    #[error("last access {last_accessed} precedes enrollment {enrolled}")]
    InvalidTimeRange {
        enrolled: DateTime<Utc>,
        last_accessed: DateTime<Utc>,
    },
}

//
// ─── CHAPTER / SECTION PROGRESS ────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterProgress {
    pub chapter_id: ChapterId,
    pub completed: bool,
    pub last_accessed_at: Option<DateTime<Utc>>,
    /// Seconds spent in the chapter, when the client reports it.
    pub time_spent: Option<u64>,
}

impl ChapterProgress {
    /// Untouched, not-completed entry.
    #[must_use]
    pub fn pending(chapter_id: ChapterId) -> Self {
        Self {
            chapter_id,
            completed: false,
            last_accessed_at: None,
            time_spent: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionProgress {
    pub section_id: SectionId,
    pub chapters: BTreeMap<ChapterId, ChapterProgress>,
}

impl SectionProgress {
    #[must_use]
    pub fn empty(section_id: SectionId) -> Self {
        Self {
            section_id,
            chapters: BTreeMap::new(),
        }
    }

    /// Returns the chapter entry, inserting a pending one if absent.
    pub fn chapter_mut(&mut self, chapter_id: &ChapterId) -> &mut ChapterProgress {
        self.chapters
            .entry(chapter_id.clone())
            .or_insert_with(|| ChapterProgress::pending(chapter_id.clone()))
    }
}

/// Sparse mirror of a course's sections keyed by id.
pub type SectionMap = BTreeMap<SectionId, SectionProgress>;

//
// ─── PROGRESS RECORD ───────────────────────────────────────────────────────────
//

/// Completion ledger for one user in one course.
///
/// `overall_progress` is a cached value. It is only trustworthy right after
/// [`ProgressRecord::recompute`] ran against the current course structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    user_id: UserId,
    course_id: CourseId,
    enrollment_date: DateTime<Utc>,
    last_accessed_timestamp: DateTime<Utc>,
    overall_progress: u8,
    sections: SectionMap,
    version: u64,
}

impl ProgressRecord {
    /// Fresh record with every chapter of `course` pending.
    ///
    /// Seeding up front keeps the section map aligned with the denominator
    /// used by the percentage.
    #[must_use]
    pub fn seeded(user_id: UserId, course: &CourseStructure, now: DateTime<Utc>) -> Self {
        let sections = course
            .sections()
            .iter()
            .map(|section| {
                let chapters = section
                    .chapters
                    .iter()
                    .map(|c| (c.chapter_id.clone(), ChapterProgress::pending(c.chapter_id.clone())))
                    .collect();
                (
                    section.section_id.clone(),
                    SectionProgress {
                        section_id: section.section_id.clone(),
                        chapters,
                    },
                )
            })
            .collect();

        Self {
            user_id,
            course_id: course.course_id().clone(),
            enrollment_date: now,
            last_accessed_timestamp: now,
            overall_progress: 0,
            sections,
            version: 0,
        }
    }

    /// Rehydrate a record from storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressRecordError` if the percentage is out of range or the
    /// timestamps are inverted.
    pub fn from_persisted(
        user_id: UserId,
        course_id: CourseId,
        enrollment_date: DateTime<Utc>,
        last_accessed_timestamp: DateTime<Utc>,
        overall_progress: u8,
        sections: SectionMap,
        version: u64,
    ) -> Result<Self, ProgressRecordError> {
        if overall_progress > 100 {
            return Err(ProgressRecordError::InvalidPercentage(overall_progress));
        }
        if last_accessed_timestamp < enrollment_date {
            return Err(ProgressRecordError::InvalidTimeRange {
                enrolled: enrollment_date,
                last_accessed: last_accessed_timestamp,
            });
        }
        Ok(Self {
            user_id,
            course_id,
            enrollment_date,
            last_accessed_timestamp,
            overall_progress,
            sections,
            version,
        })
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn course_id(&self) -> &CourseId {
        &self.course_id
    }

    #[must_use]
    pub fn enrollment_date(&self) -> DateTime<Utc> {
        self.enrollment_date
    }

    #[must_use]
    pub fn last_accessed_timestamp(&self) -> DateTime<Utc> {
        self.last_accessed_timestamp
    }

    #[must_use]
    pub fn overall_progress(&self) -> u8 {
        self.overall_progress
    }

    #[must_use]
    pub fn sections(&self) -> &SectionMap {
        &self.sections
    }

    /// Optimistic-concurrency version of the stored row this was read from.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Storage adapters call this after a successful conditional write.
    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    #[must_use]
    pub fn chapter(&self, section_id: &SectionId, chapter_id: &ChapterId) -> Option<&ChapterProgress> {
        self.sections
            .get(section_id)
            .and_then(|s| s.chapters.get(chapter_id))
    }

    /// Bump the last-access time. Never moves it backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_accessed_timestamp {
            self.last_accessed_timestamp = now;
        }
    }

    fn chapter_entry(&mut self, section_id: &SectionId, chapter_id: &ChapterId) -> &mut ChapterProgress {
        self.sections
            .entry(section_id.clone())
            .or_insert_with(|| SectionProgress::empty(section_id.clone()))
            .chapter_mut(chapter_id)
    }

    /// Set a chapter's completion flag, inserting missing section/chapter
    /// entries first.
    ///
    /// Does not recompute the percentage; call [`ProgressRecord::recompute`].
    pub fn set_chapter_completion(
        &mut self,
        section_id: &SectionId,
        chapter_id: &ChapterId,
        completed: bool,
        now: DateTime<Utc>,
    ) {
        let chapter = self.chapter_entry(section_id, chapter_id);
        chapter.completed = completed;
        chapter.last_accessed_at = Some(now);
        self.touch(now);
    }

    /// Add `seconds` to a chapter's time spent, inserting missing entries.
    ///
    /// The running total stops at [`MAX_TIME_SPENT_SECS`].
    pub fn add_time_spent(
        &mut self,
        section_id: &SectionId,
        chapter_id: &ChapterId,
        seconds: u64,
        now: DateTime<Utc>,
    ) {
        let chapter = self.chapter_entry(section_id, chapter_id);
        chapter.time_spent = Some(
            chapter
                .time_spent
                .unwrap_or(0)
                .saturating_add(seconds)
                .min(MAX_TIME_SPENT_SECS),
        );
        chapter.last_accessed_at = Some(now);
        self.touch(now);
    }

    /// Recompute and cache `overall_progress` against `course`.
    pub fn recompute(&mut self, course: &CourseStructure) -> u8 {
        self.overall_progress = compute_overall_progress(course, &self.sections).percent();
        self.overall_progress
    }

    #[must_use]
    pub fn summary(&self) -> ProgressSummary {
        ProgressSummary {
            course_id: self.course_id.clone(),
            overall_progress: self.overall_progress,
            last_accessed_timestamp: self.last_accessed_timestamp,
        }
    }
}

/// Cached listing projection of a [`ProgressRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub course_id: CourseId,
    pub overall_progress: u8,
    pub last_accessed_timestamp: DateTime<Utc>,
}
