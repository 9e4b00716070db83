use std::sync::Arc;

use course_core::model::{
    ChapterId, CourseId, CourseStructure, ProgressRecord, ProgressUpdate, ProgressUpdateRequest,
    SectionId, UserId,
};
use storage::repository::CourseCatalog;

use crate::error::ProgressError;
use crate::tracker::{EnrolledSummaries, ProgressTracker};

/// Resolves course structures from the catalog and forwards to the tracker.
///
/// Callers speak in ids; the structure is looked up fresh on every call so
/// recomputed percentages follow the catalog's current layout.
#[derive(Clone)]
pub struct CourseProgressService {
    tracker: Arc<ProgressTracker>,
    courses: Arc<dyn CourseCatalog>,
}

impl CourseProgressService {
    #[must_use]
    pub fn new(tracker: Arc<ProgressTracker>, courses: Arc<dyn CourseCatalog>) -> Self {
        Self { tracker, courses }
    }

    async fn course(&self, course_id: &CourseId) -> Result<CourseStructure, ProgressError> {
        self.tracker
            .config()
            .bounded(self.courses.get_course_structure(course_id))
            .await?
            .ok_or_else(|| ProgressError::CourseNotFound(course_id.clone()))
    }

    /// Enroll `user_id` in `course_id`, or return the existing record.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::CourseNotFound` if the catalog has no such course.
    pub async fn enroll(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<ProgressRecord, ProgressError> {
        let course = self.course(course_id).await?;
        self.tracker.get_or_create(user_id, &course).await
    }

    /// # Errors
    ///
    /// Returns `ProgressError::CourseNotFound` or `ProgressError::ProgressNotFound`.
    pub async fn get_progress(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<ProgressRecord, ProgressError> {
        let course = self.course(course_id).await?;
        self.tracker.get_progress(user_id, &course).await
    }

    /// # Errors
    ///
    /// See [`ProgressTracker::set_chapter_completion`].
    pub async fn set_chapter_completion(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        section_id: &SectionId,
        chapter_id: &ChapterId,
        completed: bool,
    ) -> Result<ProgressRecord, ProgressError> {
        let course = self.course(course_id).await?;
        self.tracker
            .set_chapter_completion(user_id, &course, section_id, chapter_id, completed)
            .await
    }

    /// Validate a client payload and apply it.
    ///
    /// The payload is validated before the catalog or store is consulted.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Validation` for malformed payloads, otherwise
    /// see [`ProgressTracker::apply_update`].
    pub async fn apply_update(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        request: ProgressUpdateRequest,
    ) -> Result<ProgressRecord, ProgressError> {
        let update = ProgressUpdate::try_from(request)?;
        let course = self.course(course_id).await?;
        self.tracker.apply_update(user_id, &course, &update).await
    }

    /// # Errors
    ///
    /// Returns `PersistenceUnavailable`/`Corrupt` for store failures.
    pub async fn list_enrolled_summaries(
        &self,
        user_id: &UserId,
    ) -> Result<EnrolledSummaries, ProgressError> {
        self.tracker.list_enrolled_summaries(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::{ChapterDef, ChapterType, SectionDef};
    use course_core::time::fixed_clock;
    use storage::repository::Storage;

    use crate::error::ErrorKind;

    fn service_with_course() -> (CourseProgressService, Storage, CourseId) {
        let storage = Storage::in_memory();
        let tracker = Arc::new(ProgressTracker::new(
            fixed_clock(),
            Arc::clone(&storage.progress),
        ));
        let service = CourseProgressService::new(tracker, Arc::clone(&storage.courses));
        let course_id = CourseId::parse("c1").unwrap();
        (service, storage, course_id)
    }

    async fn publish(storage: &Storage, course_id: &CourseId) {
        let course = CourseStructure::new(
            course_id.clone(),
            vec![SectionDef::new(
                SectionId::parse("s1").unwrap(),
                "Intro",
                vec![
                    ChapterDef::new(ChapterId::parse("c1").unwrap(), "One", ChapterType::Video),
                    ChapterDef::new(ChapterId::parse("c2").unwrap(), "Two", ChapterType::Quiz),
                ],
            )],
        )
        .unwrap();
        storage.courses.upsert_course_structure(&course).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_course_is_not_found() {
        let (service, _storage, course_id) = service_with_course();
        let err = service
            .enroll(&UserId::parse("u1").unwrap(), &course_id)
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::CourseNotFound(_)));
    }

    #[tokio::test]
    async fn enroll_then_complete_through_catalog() {
        let (service, storage, course_id) = service_with_course();
        publish(&storage, &course_id).await;
        let user = UserId::parse("u1").unwrap();

        service.enroll(&user, &course_id).await.unwrap();
        let record = service
            .set_chapter_completion(
                &user,
                &course_id,
                &SectionId::parse("s1").unwrap(),
                &ChapterId::parse("c2").unwrap(),
                true,
            )
            .await
            .unwrap();
        assert_eq!(record.overall_progress(), 50);

        let summaries = service.list_enrolled_summaries(&user).await.unwrap();
        assert_eq!(summaries.into_vec()[0].overall_progress, 50);
    }

    #[tokio::test]
    async fn malformed_payload_leaves_state_untouched() {
        let (service, storage, course_id) = service_with_course();
        publish(&storage, &course_id).await;
        let user = UserId::parse("u1").unwrap();
        let before = service.enroll(&user, &course_id).await.unwrap();

        let request: ProgressUpdateRequest = serde_json::from_value(serde_json::json!({
            "sections": [{
                "sectionId": "s1",
                "chapters": [
                    { "chapterId": "c1", "completed": true },
                    { "chapterId": "c2", "completed": true, "timeSpent": -5 }
                ]
            }]
        }))
        .unwrap();
        let err = service.apply_update(&user, &course_id, request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let after = storage
            .progress
            .get_progress(&user, &course_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.version(), before.version());
        assert_eq!(after.overall_progress(), 0);
    }
}
