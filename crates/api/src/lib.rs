#![forbid(unsafe_code)]

//! HTTP surface for course progress.
//!
//! - `POST /users/{user_id}/courses/{course_id}/progress`: enroll or first visit
//! - `GET /users/{user_id}/courses/{course_id}/progress`: authoritative read
//! - `PUT /users/{user_id}/courses/{course_id}/progress`: nested partial update
//! - `GET /users/{user_id}/courses`: enrolled summaries
//! - `GET /health`: liveness

pub mod error;
pub mod routes;
pub mod state;

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use state::AppState;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/users/{user_id}/courses/{course_id}/progress",
            get(routes::get_progress)
                .post(routes::enroll)
                .put(routes::update_progress),
        )
        .route("/users/{user_id}/courses", get(routes::list_courses))
        .route("/health", get(routes::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
