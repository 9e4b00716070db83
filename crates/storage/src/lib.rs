#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{CourseCatalog, InMemoryRepository, ProgressRepository, Storage, StorageError};
