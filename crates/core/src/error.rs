use thiserror::Error;

use crate::model::{CourseError, IdError, UpdateError};

/// Umbrella error for callers that validate several domain inputs in one go.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Id(#[from] IdError),
    #[error(transparent)]
    Course(#[from] CourseError),
    #[error(transparent)]
    Update(#[from] UpdateError),
}
