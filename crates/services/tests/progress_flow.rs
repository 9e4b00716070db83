use chrono::Duration;
use course_core::model::{
    ChapterDef, ChapterId, ChapterType, CourseId, CourseStructure, ProgressUpdateRequest,
    SectionDef, SectionId, UserId, MAX_TIME_SPENT_SECS,
};
use course_core::time::fixed_now;
use services::{AppServices, Clock, ErrorKind, ProgressError, TrackerConfig};

fn demo_course() -> CourseStructure {
    let chapter = |id: &str, ty| ChapterDef::new(ChapterId::parse(id).unwrap(), id, ty);
    CourseStructure::new(
        CourseId::parse("rust-101").unwrap(),
        vec![
            SectionDef::new(
                SectionId::parse("basics").unwrap(),
                "Basics",
                vec![
                    chapter("intro", ChapterType::Video),
                    chapter("syntax", ChapterType::Text),
                    chapter("basics-quiz", ChapterType::Quiz),
                ],
            ),
            SectionDef::new(
                SectionId::parse("ownership").unwrap(),
                "Ownership",
                vec![
                    chapter("moves", ChapterType::Text),
                    chapter("borrows", ChapterType::Text),
                ],
            ),
        ],
    )
    .unwrap()
}

async fn sqlite_services(name: &str, clock: Clock) -> AppServices {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let services = AppServices::new_sqlite(&url, clock, TrackerConfig::default())
        .await
        .expect("sqlite services");
    services
        .storage()
        .courses
        .upsert_course_structure(&demo_course())
        .await
        .unwrap();
    services
}

#[tokio::test]
async fn enrollment_and_updates_persist_through_sqlite() {
    let services = sqlite_services("memdb_services_flow", Clock::fixed(fixed_now())).await;
    let progress = services.progress();
    let user = UserId::parse("learner-7").unwrap();
    let course_id = CourseId::parse("rust-101").unwrap();

    let enrolled = progress.enroll(&user, &course_id).await.unwrap();
    assert_eq!(enrolled.overall_progress(), 0);

    let request: ProgressUpdateRequest = serde_json::from_str(
        r#"{
            "sections": [
                { "sectionId": "basics", "chapters": [ { "chapterId": "intro", "completed": true, "timeSpent": 300 } ] },
                { "sectionId": "ownership", "chapters": [ { "chapterId": "moves", "completed": true } ] }
            ]
        }"#,
    )
    .unwrap();
    let updated = progress.apply_update(&user, &course_id, request).await.unwrap();
    assert_eq!(updated.overall_progress(), 40);
    assert_eq!(updated.version(), 2);

    let read = progress.get_progress(&user, &course_id).await.unwrap();
    assert_eq!(read.overall_progress(), 40);
    assert_eq!(
        read.chapter(
            &SectionId::parse("basics").unwrap(),
            &ChapterId::parse("intro").unwrap()
        )
        .unwrap()
        .time_spent,
        Some(300)
    );

    let summaries = progress.list_enrolled_summaries(&user).await.unwrap();
    let listed: Vec<_> = summaries.iter().map(|s| s.course_id.as_str()).collect();
    assert_eq!(listed, vec!["rust-101"]);
}

#[tokio::test]
async fn two_services_on_one_database_converge() {
    let name = "memdb_services_two_writers";
    let first = sqlite_services(name, Clock::fixed(fixed_now())).await;
    let second = AppServices::new_sqlite(
        &format!("sqlite:file:{name}?mode=memory&cache=shared"),
        Clock::fixed(fixed_now() + Duration::minutes(1)),
        TrackerConfig::default(),
    )
    .await
    .unwrap();

    let user = UserId::parse("learner-7").unwrap();
    let course_id = CourseId::parse("rust-101").unwrap();
    let a = first.progress().enroll(&user, &course_id).await.unwrap();
    let b = second.progress().enroll(&user, &course_id).await.unwrap();
    assert_eq!(a.enrollment_date(), b.enrollment_date());

    second
        .progress()
        .set_chapter_completion(
            &user,
            &course_id,
            &SectionId::parse("ownership").unwrap(),
            &ChapterId::parse("borrows").unwrap(),
            true,
        )
        .await
        .unwrap();
    let seen = first.progress().get_progress(&user, &course_id).await.unwrap();
    assert_eq!(seen.overall_progress(), 20);
}

#[tokio::test]
async fn deleted_course_reads_as_not_found() {
    let services = sqlite_services("memdb_services_deleted", Clock::fixed(fixed_now())).await;
    let progress = services.progress();
    let user = UserId::parse("learner-7").unwrap();
    let course_id = CourseId::parse("rust-101").unwrap();
    progress.enroll(&user, &course_id).await.unwrap();

    services.storage().courses.delete_course(&course_id).await.unwrap();

    let err = progress.get_progress(&user, &course_id).await.unwrap_err();
    assert!(matches!(err, ProgressError::CourseNotFound(_)));
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(progress.list_enrolled_summaries(&user).await.unwrap().is_empty());
}

#[tokio::test]
async fn instance_with_lagging_clock_does_not_break_reads() {
    let name = "memdb_services_clock_skew";
    let ahead = sqlite_services(name, Clock::fixed(fixed_now() + Duration::minutes(1))).await;
    let behind = AppServices::new_sqlite(
        &format!("sqlite:file:{name}?mode=memory&cache=shared"),
        Clock::fixed(fixed_now()),
        TrackerConfig::default(),
    )
    .await
    .unwrap();

    let user = UserId::parse("learner-7").unwrap();
    let course_id = CourseId::parse("rust-101").unwrap();
    let enrolled = ahead.progress().enroll(&user, &course_id).await.unwrap();
    behind.progress().enroll(&user, &course_id).await.unwrap();

    let read = behind.progress().get_progress(&user, &course_id).await.unwrap();
    assert_eq!(read.last_accessed_timestamp(), enrolled.enrollment_date());

    let updated = behind
        .progress()
        .set_chapter_completion(
            &user,
            &course_id,
            &SectionId::parse("basics").unwrap(),
            &ChapterId::parse("intro").unwrap(),
            true,
        )
        .await
        .unwrap();
    assert_eq!(updated.overall_progress(), 20);
}

#[tokio::test]
async fn repeated_maximal_time_spent_stays_valid() {
    let services = sqlite_services("memdb_services_time_cap", Clock::fixed(fixed_now())).await;
    let progress = services.progress();
    let user = UserId::parse("learner-7").unwrap();
    let course_id = CourseId::parse("rust-101").unwrap();
    progress.enroll(&user, &course_id).await.unwrap();

    for _ in 0..2 {
        let request: ProgressUpdateRequest = serde_json::from_value(serde_json::json!({
            "sections": [{
                "sectionId": "basics",
                "chapters": [{ "chapterId": "intro", "completed": true, "timeSpent": i64::MAX }]
            }]
        }))
        .unwrap();
        progress.apply_update(&user, &course_id, request).await.unwrap();
    }

    let read = progress.get_progress(&user, &course_id).await.unwrap();
    let intro = read
        .chapter(
            &SectionId::parse("basics").unwrap(),
            &ChapterId::parse("intro").unwrap(),
        )
        .unwrap();
    assert_eq!(intro.time_spent, Some(MAX_TIME_SPENT_SECS));
}
