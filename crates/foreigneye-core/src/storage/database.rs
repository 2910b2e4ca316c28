//! SQLite pool for the store of record

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};

use crate::config::DatabaseSettings;
use crate::storage::migrations::{self, MigrationStatus};

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Writers wait this long on a locked file before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const MEMORY_PATH: &str = ":memory:";

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
    pub auto_migrate: bool,
}

impl DatabaseConfig {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            auto_migrate: true,
        }
    }

    /// From the `[database]` section; a missing path means the platform data dir
    pub fn from_settings(settings: &DatabaseSettings) -> Self {
        let path = settings.path.clone().unwrap_or_else(default_database_path);
        Self::with_path(path).max_connections(settings.max_connections)
    }

    /// Private in-memory database. Pinned to one connection, since every
    /// connection would otherwise see its own empty database.
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::from(MEMORY_PATH),
            max_connections: 1,
            auto_migrate: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = if self.is_in_memory() { 1 } else { max.max(1) };
        self
    }

    pub fn no_migrate(mut self) -> Self {
        self.auto_migrate = false;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == MEMORY_PATH
    }

    fn connect_options(&self) -> Result<SqliteConnectOptions> {
        let options = if self.is_in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")?.journal_mode(SqliteJournalMode::Memory)
        } else {
            SqliteConnectOptions::new()
                .filename(&self.path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
        };

        Ok(options
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true))
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::with_path(default_database_path())
    }
}

/// `<data dir>/foreigneye/foreigneye.db`, or the working directory without one
pub fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("foreigneye"))
        .unwrap_or_default()
        .join("foreigneye.db")
}

#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    config: DatabaseConfig,
}

impl Database {
    pub async fn new(config: DatabaseConfig) -> Result<Self> {
        if !config.is_in_memory() {
            if let Some(dir) = config.path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Cannot create database directory {}", dir.display()))?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(config.connect_options()?)
            .await
            .with_context(|| format!("Cannot open database {}", config.path.display()))?;

        let db = Self { pool, config };
        if db.config.auto_migrate {
            db.migrate().await?;
        }
        Ok(db)
    }

    pub async fn in_memory() -> Result<Self> {
        Self::new(DatabaseConfig::in_memory()).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub async fn migrate(&self) -> Result<()> {
        migrations::run_migrations(&self.pool)
            .await
            .context("Schema migration failed")
    }

    pub async fn migration_status(&self) -> Result<MigrationStatus> {
        migrations::migration_status(&self.pool).await
    }

    pub async fn health_check(&self) -> Result<()> {
        let (one,): (i64,) = sqlx::query_as("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Database did not answer")?;
        anyhow::ensure!(one == 1, "Database returned {} for SELECT 1", one);
        Ok(())
    }

    /// Wait for checked-out connections and close the pool
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_is_migrated_with_foreign_keys() {
        let db = Database::in_memory().await.unwrap();
        db.health_check().await.unwrap();
        assert!(!db.migration_status().await.unwrap().needs_migration);

        let (fk,): (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn test_config_clamps_connections() {
        assert_eq!(DatabaseConfig::in_memory().max_connections(8).max_connections, 1);
        assert_eq!(DatabaseConfig::with_path("a.db").max_connections(0).max_connections, 1);

        let settings = DatabaseSettings {
            path: Some(PathBuf::from("/var/lib/foreigneye/ledger.db")),
            max_connections: 12,
        };
        let config = DatabaseConfig::from_settings(&settings).no_migrate();
        assert_eq!(config.path, PathBuf::from("/var/lib/foreigneye/ledger.db"));
        assert_eq!(config.max_connections, 12);
        assert!(!config.auto_migrate);
    }

    #[tokio::test]
    async fn test_file_database_in_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.db");

        let db = Database::new(DatabaseConfig::with_path(&path)).await.unwrap();
        db.health_check().await.unwrap();
        assert!(path.exists());
        assert_eq!(db.path(), path.as_path());
        db.close().await;
    }

    #[tokio::test]
    async fn test_no_migrate_leaves_schema_empty() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DatabaseConfig::with_path(dir.path().join("raw.db")).no_migrate())
            .await
            .unwrap();

        let status = db.migration_status().await.unwrap();
        assert_eq!(status.current_version, 0);
        assert!(status.needs_migration);
    }

    #[tokio::test]
    async fn test_deleting_article_drops_its_links() {
        let db = Database::in_memory().await.unwrap();
        let pool = db.pool();

        sqlx::query("INSERT INTO articles (id, title, original_url) VALUES (1, 'T', 'https://e.com/a')")
            .execute(pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO concepts (id, name, name_key) VALUES (1, 'GPU', 'gpu')")
            .execute(pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO article_concepts (article_id, concept_id) VALUES (1, 1)")
            .execute(pool)
            .await
            .unwrap();
        sqlx::query("DELETE FROM articles WHERE id = 1")
            .execute(pool)
            .await
            .unwrap();

        let (links,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM article_concepts")
            .fetch_one(pool)
            .await
            .unwrap();
        assert_eq!(links, 0);
    }
}
