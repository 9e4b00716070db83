use course_core::model::{
    ChapterId, ChapterProgress, ChapterType, CourseId, ProgressSummary, SectionId, UserId,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn u64_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn percent_from_i64(v: i64) -> Result<u8, StorageError> {
    u8::try_from(v)
        .ok()
        .filter(|p| *p <= 100)
        .ok_or_else(|| StorageError::Serialization(format!("invalid overall_progress: {v}")))
}

pub(crate) fn user_id_col(row: &SqliteRow, col: &str) -> Result<UserId, StorageError> {
    UserId::parse(row.try_get::<String, _>(col).map_err(ser)?).map_err(ser)
}

pub(crate) fn course_id_col(row: &SqliteRow, col: &str) -> Result<CourseId, StorageError> {
    CourseId::parse(row.try_get::<String, _>(col).map_err(ser)?).map_err(ser)
}

pub(crate) fn section_id_col(row: &SqliteRow, col: &str) -> Result<SectionId, StorageError> {
    SectionId::parse(row.try_get::<String, _>(col).map_err(ser)?).map_err(ser)
}

pub(crate) fn chapter_id_col(row: &SqliteRow, col: &str) -> Result<ChapterId, StorageError> {
    ChapterId::parse(row.try_get::<String, _>(col).map_err(ser)?).map_err(ser)
}

pub(crate) fn parse_chapter_type(s: &str) -> Result<ChapterType, StorageError> {
    ChapterType::parse(s)
        .ok_or_else(|| StorageError::Serialization(format!("invalid chapter_type: {s}")))
}

pub(crate) fn map_chapter_progress_row(row: &SqliteRow) -> Result<ChapterProgress, StorageError> {
    let completed: i64 = row.try_get("completed").map_err(ser)?;
    let time_spent = row
        .try_get::<Option<i64>, _>("time_spent")
        .map_err(ser)?
        .map(|v| i64_to_u64("time_spent", v))
        .transpose()?;
    Ok(ChapterProgress {
        chapter_id: chapter_id_col(row, "chapter_id")?,
        completed: completed != 0,
        last_accessed_at: row.try_get("last_accessed_at").map_err(ser)?,
        time_spent,
    })
}

pub(crate) fn map_summary_row(row: &SqliteRow) -> Result<ProgressSummary, StorageError> {
    Ok(ProgressSummary {
        course_id: course_id_col(row, "course_id")?,
        overall_progress: percent_from_i64(row.try_get("overall_progress").map_err(ser)?)?,
        last_accessed_timestamp: row.try_get("last_accessed_at").map_err(ser)?,
    })
}
