#![forbid(unsafe_code)]

pub mod aggregate;
pub mod error;
pub mod model;
pub mod time;

pub use aggregate::{compute_overall_progress, ProgressTally};
pub use error::Error;
pub use time::Clock;
