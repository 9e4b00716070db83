use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use thiserror::Error;

use crate::repository::{CourseCatalog, ProgressRepository, Storage};

mod course_repo;
mod mapping;
mod migrate;
mod progress_repo;

/// Catalog and progress tables behind one connection pool.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Pool sizing and lock-wait knobs.
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// How long a writer waits on `SQLITE_BUSY` before failing.
    pub busy_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl SqliteRepository {
    /// Connect with default [`PoolSettings`].
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the URL is invalid or the pool cannot
    /// open a connection.
    pub async fn connect(database_url: &str) -> Result<Self, SqliteInitError> {
        Self::connect_with(database_url, PoolSettings::default()).await
    }

    /// Connect with foreign keys enforced on every connection; course
    /// deletion relies on them to cascade into progress rows.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the URL is invalid or the pool cannot
    /// open a connection.
    pub async fn connect_with(
        database_url: &str,
        settings: PoolSettings,
    ) -> Result<Self, SqliteInitError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(settings.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Bring the schema up to the latest version.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if migration queries fail.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool).await
    }
}

impl Storage {
    /// Open, migrate and wrap a `SQLite` database.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if connection or migrations cannot be
    /// completed.
    pub async fn sqlite(database_url: &str) -> Result<Self, SqliteInitError> {
        let repo = SqliteRepository::connect(database_url).await?;
        repo.migrate().await?;
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
        let courses: Arc<dyn CourseCatalog> = Arc::new(repo);
        Ok(Self { progress, courses })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    #[tokio::test]
    async fn migrations_are_idempotent_and_enforce_foreign_keys() {
        let repo = SqliteRepository::connect("sqlite:file:memdb_sqlite_mod?mode=memory&cache=shared")
            .await
            .unwrap();
        repo.migrate().await.unwrap();
        repo.migrate().await.unwrap();

        let row = sqlx::query("PRAGMA foreign_keys")
            .fetch_one(repo.pool())
            .await
            .unwrap();
        assert_eq!(row.get::<i64, _>(0), 1);

        let applied: i64 = sqlx::query("SELECT COUNT(*) AS n FROM schema_migrations")
            .fetch_one(repo.pool())
            .await
            .unwrap()
            .get("n");
        assert_eq!(applied, 1);
    }
}
