use chrono::{DateTime, Utc};
use course_core::model::{
    CourseId, ProgressRecord, ProgressSummary, SectionMap, SectionProgress, UserId,
};
use sqlx::{Row, Sqlite, Transaction};

use super::SqliteRepository;
use super::mapping::{
    conn, course_id_col, i64_to_u64, map_chapter_progress_row, map_summary_row, percent_from_i64,
    section_id_col, ser, u64_to_i64, user_id_col,
};
use crate::repository::{ProgressRepository, StorageError};

async fn load_sections(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: &UserId,
    course_id: &CourseId,
) -> Result<SectionMap, StorageError> {
    let section_rows = sqlx::query(
        r"
            SELECT section_id
            FROM section_progress
            WHERE user_id = ?1 AND course_id = ?2
        ",
    )
    .bind(user_id.as_str())
    .bind(course_id.as_str())
    .fetch_all(&mut **tx)
    .await
    .map_err(conn)?;

    let mut sections = SectionMap::new();
    for row in section_rows {
        let section_id = section_id_col(&row, "section_id")?;
        sections.insert(section_id.clone(), SectionProgress::empty(section_id));
    }

    let chapter_rows = sqlx::query(
        r"
            SELECT section_id, chapter_id, completed, last_accessed_at, time_spent
            FROM chapter_progress
            WHERE user_id = ?1 AND course_id = ?2
        ",
    )
    .bind(user_id.as_str())
    .bind(course_id.as_str())
    .fetch_all(&mut **tx)
    .await
    .map_err(conn)?;

    for row in chapter_rows {
        let section_id = section_id_col(&row, "section_id")?;
        let chapter = map_chapter_progress_row(&row)?;
        sections
            .entry(section_id.clone())
            .or_insert_with(|| SectionProgress::empty(section_id))
            .chapters
            .insert(chapter.chapter_id.clone(), chapter);
    }

    Ok(sections)
}

async fn load_record(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: &UserId,
    course_id: &CourseId,
) -> Result<Option<ProgressRecord>, StorageError> {
    let row = sqlx::query(
        r"
            SELECT user_id, course_id, enrollment_date, last_accessed_at, overall_progress, version
            FROM user_course_progress
            WHERE user_id = ?1 AND course_id = ?2
        ",
    )
    .bind(user_id.as_str())
    .bind(course_id.as_str())
    .fetch_optional(&mut **tx)
    .await
    .map_err(conn)?;

    let Some(row) = row else {
        return Ok(None);
    };

    let sections = load_sections(tx, user_id, course_id).await?;
    let record = ProgressRecord::from_persisted(
        user_id_col(&row, "user_id")?,
        course_id_col(&row, "course_id")?,
        row.try_get("enrollment_date").map_err(ser)?,
        row.try_get("last_accessed_at").map_err(ser)?,
        percent_from_i64(row.try_get("overall_progress").map_err(ser)?)?,
        sections,
        i64_to_u64("version", row.try_get("version").map_err(ser)?)?,
    )
    .map_err(ser)?;
    Ok(Some(record))
}

/// Upsert every section and chapter of `record`. Rows for chapters the record
/// no longer holds are left in place; they are never read as completion for
/// chapters outside the course structure.
async fn write_sections(
    tx: &mut Transaction<'_, Sqlite>,
    record: &ProgressRecord,
) -> Result<(), StorageError> {
    let user_id = record.user_id().as_str();
    let course_id = record.course_id().as_str();

    for (section_id, section) in record.sections() {
        sqlx::query(
            r"
                INSERT INTO section_progress (user_id, course_id, section_id)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(user_id, course_id, section_id) DO NOTHING
            ",
        )
        .bind(user_id)
        .bind(course_id)
        .bind(section_id.as_str())
        .execute(&mut **tx)
        .await
        .map_err(conn)?;

        for (chapter_id, chapter) in &section.chapters {
            let time_spent = chapter
                .time_spent
                .map(|v| u64_to_i64("time_spent", v))
                .transpose()?;
            sqlx::query(
                r"
                    INSERT INTO chapter_progress (
                        user_id, course_id, section_id, chapter_id,
                        completed, last_accessed_at, time_spent
                    )
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    ON CONFLICT(user_id, course_id, section_id, chapter_id) DO UPDATE SET
                        completed = excluded.completed,
                        last_accessed_at = excluded.last_accessed_at,
                        time_spent = excluded.time_spent
                ",
            )
            .bind(user_id)
            .bind(course_id)
            .bind(section_id.as_str())
            .bind(chapter_id.as_str())
            .bind(i64::from(chapter.completed))
            .bind(chapter.last_accessed_at)
            .bind(time_spent)
            .execute(&mut **tx)
            .await
            .map_err(conn)?;
        }
    }
    Ok(())
}

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn get_progress(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        // Read the record and its children from one snapshot.
        let mut tx = self.pool.begin().await.map_err(conn)?;
        let record = load_record(&mut tx, user_id, course_id).await?;
        tx.commit().await.map_err(conn)?;
        Ok(record)
    }

    async fn insert_progress(&self, record: &ProgressRecord) -> Result<ProgressRecord, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let res = sqlx::query(
            r"
                INSERT INTO user_course_progress (
                    user_id, course_id, enrollment_date, last_accessed_at,
                    overall_progress, version
                )
                VALUES (?1, ?2, ?3, ?4, ?5, 1)
                ON CONFLICT(user_id, course_id) DO NOTHING
            ",
        )
        .bind(record.user_id().as_str())
        .bind(record.course_id().as_str())
        .bind(record.enrollment_date())
        .bind(record.last_accessed_timestamp())
        .bind(i64::from(record.overall_progress()))
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => StorageError::NotFound,
            other => conn(other),
        })?;

        if res.rows_affected() == 1 {
            write_sections(&mut tx, record).await?;
        }

        let stored = load_record(&mut tx, record.user_id(), record.course_id())
            .await?
            .ok_or(StorageError::NotFound)?;
        tx.commit().await.map_err(conn)?;
        Ok(stored)
    }

    async fn update_progress(&self, record: &ProgressRecord) -> Result<u64, StorageError> {
        let expected = u64_to_i64("version", record.version())?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let res = sqlx::query(
            r"
                UPDATE user_course_progress
                SET last_accessed_at = ?3,
                    overall_progress = ?4,
                    version = version + 1
                WHERE user_id = ?1 AND course_id = ?2 AND version = ?5
            ",
        )
        .bind(record.user_id().as_str())
        .bind(record.course_id().as_str())
        .bind(record.last_accessed_timestamp())
        .bind(i64::from(record.overall_progress()))
        .bind(expected)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            let exists = sqlx::query(
                "SELECT 1 FROM user_course_progress WHERE user_id = ?1 AND course_id = ?2",
            )
            .bind(record.user_id().as_str())
            .bind(record.course_id().as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?
            .is_some();
            return Err(if exists {
                StorageError::Conflict
            } else {
                StorageError::NotFound
            });
        }

        write_sections(&mut tx, record).await?;
        tx.commit().await.map_err(conn)?;
        Ok(record.version() + 1)
    }

    async fn touch_progress(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
                UPDATE user_course_progress
                SET last_accessed_at = MAX(last_accessed_at, ?3)
                WHERE user_id = ?1 AND course_id = ?2
            ",
        )
        .bind(user_id.as_str())
        .bind(course_id.as_str())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn list_summaries(&self, user_id: &UserId) -> Result<Vec<ProgressSummary>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT course_id, overall_progress, last_accessed_at
                FROM user_course_progress
                WHERE user_id = ?1
                ORDER BY last_accessed_at DESC, course_id ASC
            ",
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_summary_row(&row)?);
        }
        Ok(out)
    }

    async fn delete_course_progress(&self, course_id: &CourseId) -> Result<u64, StorageError> {
        let res = sqlx::query("DELETE FROM user_course_progress WHERE course_id = ?1")
            .bind(course_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(res.rows_affected())
    }

    async fn delete_user_progress(&self, user_id: &UserId) -> Result<u64, StorageError> {
        let res = sqlx::query("DELETE FROM user_course_progress WHERE user_id = ?1")
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(res.rows_affected())
    }
}
