//! Shared error types for the services crate.

use thiserror::Error;

use course_core::model::{ChapterId, CourseId, IdError, SectionId, UpdateError, UserId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `ProgressTracker` and `CourseProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("course {0} not found")]
    CourseNotFound(CourseId),

    #[error("no progress recorded for user {user} in course {course}")]
    ProgressNotFound { user: UserId, course: CourseId },

    #[error("chapter {chapter} not found in section {section}")]
    ChapterNotFound {
        section: SectionId,
        chapter: ChapterId,
    },

    /// The store no longer holds the row a write was aimed at.
    #[error("progress record vanished during update")]
    RecordGone,

    #[error("progress record was modified concurrently")]
    Conflict,

    #[error(transparent)]
    Validation(#[from] course_core::Error),

    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(String),

    #[error("stored progress is corrupt: {0}")]
    Corrupt(String),
}

/// Coarse category of a [`ProgressError`], used by outer surfaces to pick a
/// status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Validation,
    PersistenceUnavailable,
    Corrupt,
}

impl ProgressError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CourseNotFound(_)
            | Self::ProgressNotFound { .. }
            | Self::ChapterNotFound { .. }
            | Self::RecordGone => ErrorKind::NotFound,
            Self::Conflict => ErrorKind::Conflict,
            Self::Validation(_) => ErrorKind::Validation,
            Self::PersistenceUnavailable(_) => ErrorKind::PersistenceUnavailable,
            Self::Corrupt(_) => ErrorKind::Corrupt,
        }
    }
}

impl From<StorageError> for ProgressError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => Self::RecordGone,
            StorageError::Conflict => Self::Conflict,
            StorageError::Timeout => Self::PersistenceUnavailable(err.to_string()),
            StorageError::Serialization(msg) => Self::Corrupt(msg),
            other => Self::PersistenceUnavailable(other.to_string()),
        }
    }
}

impl From<IdError> for ProgressError {
    fn from(err: IdError) -> Self {
        Self::Validation(err.into())
    }
}

impl From<UpdateError> for ProgressError {
    fn from(err: UpdateError) -> Self {
        Self::Validation(err.into())
    }
}

/// Errors emitted while assembling `AppServices`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    SqliteInit(#[from] SqliteInitError),
}
