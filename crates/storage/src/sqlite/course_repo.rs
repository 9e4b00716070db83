use course_core::model::{ChapterDef, CourseId, CourseStructure, SectionDef};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{chapter_id_col, conn, parse_chapter_type, section_id_col, ser};
use crate::repository::{CourseCatalog, StorageError};

fn position_i64(v: usize) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization("position overflow".into()))
}

#[async_trait::async_trait]
impl CourseCatalog for SqliteRepository {
    async fn get_course_structure(
        &self,
        course_id: &CourseId,
    ) -> Result<Option<CourseStructure>, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let exists = sqlx::query("SELECT 1 FROM courses WHERE course_id = ?1")
            .bind(course_id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?
            .is_some();
        if !exists {
            return Ok(None);
        }

        let section_rows = sqlx::query(
            r"
                SELECT section_id, title
                FROM course_sections
                WHERE course_id = ?1
                ORDER BY position ASC
            ",
        )
        .bind(course_id.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(conn)?;

        let chapter_rows = sqlx::query(
            r"
                SELECT section_id, chapter_id, title, chapter_type
                FROM course_chapters
                WHERE course_id = ?1
                ORDER BY position ASC
            ",
        )
        .bind(course_id.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(conn)?;

        tx.commit().await.map_err(conn)?;

        let mut sections = Vec::with_capacity(section_rows.len());
        for row in &section_rows {
            sections.push(SectionDef::new(
                section_id_col(row, "section_id")?,
                row.try_get::<String, _>("title").map_err(ser)?,
                Vec::new(),
            ));
        }

        for row in &chapter_rows {
            let section_id = section_id_col(row, "section_id")?;
            let chapter_type: String = row.try_get("chapter_type").map_err(ser)?;
            let chapter = ChapterDef::new(
                chapter_id_col(row, "chapter_id")?,
                row.try_get::<String, _>("title").map_err(ser)?,
                parse_chapter_type(&chapter_type)?,
            );
            let section = sections
                .iter_mut()
                .find(|s| s.section_id == section_id)
                .ok_or_else(|| {
                    StorageError::Serialization(format!("chapter references missing section {section_id}"))
                })?;
            section.chapters.push(chapter);
        }

        CourseStructure::new(course_id.clone(), sections)
            .map(Some)
            .map_err(ser)
    }

    async fn upsert_course_structure(&self, course: &CourseStructure) -> Result<(), StorageError> {
        let course_id = course.course_id().as_str();
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
                INSERT INTO courses (course_id) VALUES (?1)
                ON CONFLICT(course_id) DO NOTHING
            ",
        )
        .bind(course_id)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        // Replace the layout wholesale; chapters cascade from their section.
        sqlx::query("DELETE FROM course_sections WHERE course_id = ?1")
            .bind(course_id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for (s_pos, section) in course.sections().iter().enumerate() {
            sqlx::query(
                r"
                    INSERT INTO course_sections (course_id, section_id, position, title)
                    VALUES (?1, ?2, ?3, ?4)
                ",
            )
            .bind(course_id)
            .bind(section.section_id.as_str())
            .bind(position_i64(s_pos)?)
            .bind(section.section_title.as_str())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

            for (c_pos, chapter) in section.chapters.iter().enumerate() {
                sqlx::query(
                    r"
                        INSERT INTO course_chapters (
                            course_id, section_id, chapter_id, position, title, chapter_type
                        )
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    ",
                )
                .bind(course_id)
                .bind(section.section_id.as_str())
                .bind(chapter.chapter_id.as_str())
                .bind(position_i64(c_pos)?)
                .bind(chapter.title.as_str())
                .bind(chapter.chapter_type.as_str())
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
            }
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn delete_course(&self, course_id: &CourseId) -> Result<(), StorageError> {
        // Progress rows go with the course via ON DELETE CASCADE.
        let res = sqlx::query("DELETE FROM courses WHERE course_id = ?1")
            .bind(course_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
