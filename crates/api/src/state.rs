use std::sync::Arc;

use services::{AppServices, CourseProgressService};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub progress: Arc<CourseProgressService>,
}

impl AppState {
    #[must_use]
    pub fn new(services: &AppServices) -> Self {
        Self {
            progress: services.progress(),
        }
    }
}
