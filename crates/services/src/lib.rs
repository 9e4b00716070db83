#![forbid(unsafe_code)]

pub mod app_services;
pub mod config;
pub mod course_progress_service;
pub mod error;
pub mod locks;
pub mod tracker;

pub use course_core::Clock;

pub use app_services::AppServices;
pub use config::TrackerConfig;
pub use course_progress_service::CourseProgressService;
pub use error::{AppServicesError, ErrorKind, ProgressError};
pub use tracker::{EnrolledSummaries, ProgressTracker};
