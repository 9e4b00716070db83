use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use course_core::model::{CourseId, ProgressRecord, ProgressUpdateRequest, UserId};
use services::EnrolledSummaries;

use crate::error::ApiError;
use crate::state::AppState;

type ApiResult<T> = Result<Json<T>, ApiError>;

fn ids(user_id: String, course_id: String) -> Result<(UserId, CourseId), ApiError> {
    Ok((UserId::parse(user_id)?, CourseId::parse(course_id)?))
}

pub async fn enroll(
    State(state): State<AppState>,
    Path((user_id, course_id)): Path<(String, String)>,
) -> ApiResult<ProgressRecord> {
    let (user_id, course_id) = ids(user_id, course_id)?;
    let record = state.progress.enroll(&user_id, &course_id).await?;
    Ok(Json(record))
}

pub async fn get_progress(
    State(state): State<AppState>,
    Path((user_id, course_id)): Path<(String, String)>,
) -> ApiResult<ProgressRecord> {
    let (user_id, course_id) = ids(user_id, course_id)?;
    let record = state.progress.get_progress(&user_id, &course_id).await?;
    Ok(Json(record))
}

pub async fn update_progress(
    State(state): State<AppState>,
    Path((user_id, course_id)): Path<(String, String)>,
    payload: Result<Json<ProgressUpdateRequest>, JsonRejection>,
) -> ApiResult<ProgressRecord> {
    let (user_id, course_id) = ids(user_id, course_id)?;
    let Json(request) = payload?;
    let record = state
        .progress
        .apply_update(&user_id, &course_id, request)
        .await?;
    Ok(Json(record))
}

pub async fn list_courses(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<EnrolledSummaries> {
    let user_id = UserId::parse(user_id)?;
    let summaries = state.progress.list_enrolled_summaries(&user_id).await?;
    Ok(Json(summaries))
}

pub async fn health() -> &'static str {
    "ok"
}
