use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs the versioned schema migrations.
///
/// Version 1 creates the course catalog tables and the normalized progress
/// tables (record, section, chapter) with cascades from course to progress.
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS courses (
                    course_id TEXT PRIMARY KEY
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS course_sections (
                    course_id TEXT NOT NULL,
                    section_id TEXT NOT NULL,
                    position INTEGER NOT NULL CHECK (position >= 0),
                    title TEXT NOT NULL,
                    PRIMARY KEY (course_id, section_id),
                    FOREIGN KEY (course_id) REFERENCES courses(course_id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS course_chapters (
                    course_id TEXT NOT NULL,
                    section_id TEXT NOT NULL,
                    chapter_id TEXT NOT NULL,
                    position INTEGER NOT NULL CHECK (position >= 0),
                    title TEXT NOT NULL,
                    chapter_type TEXT NOT NULL CHECK (chapter_type IN ('Text', 'Quiz', 'Video')),
                    PRIMARY KEY (course_id, section_id, chapter_id),
                    FOREIGN KEY (course_id, section_id)
                        REFERENCES course_sections(course_id, section_id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS user_course_progress (
                    user_id TEXT NOT NULL,
                    course_id TEXT NOT NULL,
                    enrollment_date TEXT NOT NULL,
                    last_accessed_at TEXT NOT NULL,
                    overall_progress INTEGER NOT NULL
                        CHECK (overall_progress BETWEEN 0 AND 100),
                    version INTEGER NOT NULL CHECK (version >= 0),
                    PRIMARY KEY (user_id, course_id),
                    FOREIGN KEY (course_id) REFERENCES courses(course_id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS section_progress (
                    user_id TEXT NOT NULL,
                    course_id TEXT NOT NULL,
                    section_id TEXT NOT NULL,
                    PRIMARY KEY (user_id, course_id, section_id),
                    FOREIGN KEY (user_id, course_id)
                        REFERENCES user_course_progress(user_id, course_id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS chapter_progress (
                    user_id TEXT NOT NULL,
                    course_id TEXT NOT NULL,
                    section_id TEXT NOT NULL,
                    chapter_id TEXT NOT NULL,
                    completed INTEGER NOT NULL CHECK (completed IN (0, 1)),
                    last_accessed_at TEXT,
                    time_spent INTEGER CHECK (time_spent >= 0),
                    PRIMARY KEY (user_id, course_id, section_id, chapter_id),
                    FOREIGN KEY (user_id, course_id, section_id)
                        REFERENCES section_progress(user_id, course_id, section_id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_user_course_progress_course
                    ON user_course_progress (course_id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_user_course_progress_user_accessed
                    ON user_course_progress (user_id, last_accessed_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
