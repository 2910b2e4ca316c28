//! Versioned schema for the store of record
//!
//! Each step runs in its own transaction together with its `_migrations`
//! row, so a failed step leaves the previous version intact.

use anyhow::Context;
use sqlx::SqlitePool;

struct Migration {
    version: i32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "ledger",
        sql: r#"
            CREATE TABLE users (
                id INTEGER PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                title_ko TEXT NOT NULL DEFAULT '',
                original_url TEXT NOT NULL UNIQUE,
                summary_ko TEXT NOT NULL DEFAULT '',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX idx_articles_created_at ON articles(created_at);

            -- name_key = lower(trim(name)); uniqueness lives here
            CREATE TABLE concepts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                name_key TEXT NOT NULL UNIQUE,
                description_ko TEXT NOT NULL DEFAULT '',
                real_world_examples_ko TEXT NOT NULL DEFAULT '[]',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE article_concepts (
                article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
                concept_id INTEGER NOT NULL REFERENCES concepts(id) ON DELETE CASCADE,
                PRIMARY KEY (article_id, concept_id)
            );
            CREATE INDEX idx_article_concepts_concept ON article_concepts(concept_id);

            CREATE TABLE concept_relations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                from_concept_id INTEGER NOT NULL REFERENCES concepts(id) ON DELETE CASCADE,
                to_concept_id INTEGER NOT NULL REFERENCES concepts(id) ON DELETE CASCADE,
                relation_type TEXT NOT NULL
                    CHECK (relation_type IN ('IS_A_TYPE_OF', 'USED_IN', 'RELATED_TO', 'ENABLES', 'PART_OF')),
                strength INTEGER NOT NULL DEFAULT 5 CHECK (strength > 0),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (from_concept_id, to_concept_id),
                CHECK (from_concept_id <> to_concept_id)
            );
            CREATE INDEX idx_concept_relations_to ON concept_relations(to_concept_id);
            CREATE INDEX idx_concept_relations_strength
                ON concept_relations(from_concept_id, strength DESC);

            CREATE TABLE user_collections (
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                concept_id INTEGER NOT NULL REFERENCES concepts(id) ON DELETE CASCADE,
                collected_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (user_id, concept_id)
            );
            CREATE INDEX idx_user_collections_concept ON user_collections(concept_id);
        "#,
    },
    Migration {
        version: 2,
        name: "job queue",
        sql: r#"
            CREATE TABLE jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending', 'running', 'done', 'dead')),
                attempts INTEGER NOT NULL DEFAULT 0,
                max_attempts INTEGER NOT NULL DEFAULT 5,
                last_error TEXT,
                run_after TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX idx_jobs_claim ON jobs(status, run_after, id);
        "#,
    },
];

/// Latest schema version this build knows about
pub const CURRENT_VERSION: i32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub current_version: i32,
    pub target_version: i32,
    pub needs_migration: bool,
}

async fn applied_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    sqlx::raw_sql(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY NOT NULL,
            name TEXT NOT NULL DEFAULT '',
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await?;

    let (version,): (Option<i32>,) = sqlx::query_as("SELECT MAX(version) FROM _migrations")
        .fetch_one(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

/// Apply every step newer than the recorded version
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let current = applied_version(pool).await?;

    for step in MIGRATIONS.iter().filter(|m| m.version > current) {
        tracing::info!(version = step.version, name = step.name, "Applying migration");

        let mut tx = pool.begin().await?;
        sqlx::raw_sql(step.sql)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("migration v{} ({}) failed", step.version, step.name))?;
        sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
            .bind(step.version)
            .bind(step.name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    Ok(())
}

pub async fn migration_status(pool: &SqlitePool) -> anyhow::Result<MigrationStatus> {
    let current_version = applied_version(pool).await?;
    Ok(MigrationStatus {
        current_version,
        target_version: CURRENT_VERSION,
        needs_migration: current_version < CURRENT_VERSION,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn blank_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[test]
    fn test_steps_are_ordered_up_to_current() {
        let versions: Vec<i32> = MIGRATIONS.iter().map(|m| m.version).collect();
        assert_eq!(versions, (1..=CURRENT_VERSION).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_fresh_database_reaches_current_version() {
        let pool = blank_pool().await;
        assert!(migration_status(&pool).await.unwrap().needs_migration);

        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, CURRENT_VERSION);
        assert!(!status.needs_migration);

        let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM _migrations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, i64::from(CURRENT_VERSION));
    }

    #[tokio::test]
    async fn test_resumes_from_partial_schema() {
        let pool = blank_pool().await;
        applied_version(&pool).await.unwrap();
        sqlx::raw_sql(MIGRATIONS[0].sql).execute(&pool).await.unwrap();
        sqlx::query("INSERT INTO _migrations (version, name) VALUES (1, 'ledger')")
            .execute(&pool)
            .await
            .unwrap();

        run_migrations(&pool).await.unwrap();

        let (jobs,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM jobs")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(jobs, 0);
    }

    #[tokio::test]
    async fn test_schema_rejects_self_loop_and_unknown_type() {
        let pool = blank_pool().await;
        run_migrations(&pool).await.unwrap();

        sqlx::query("INSERT INTO concepts (id, name, name_key) VALUES (1, 'A', 'a'), (2, 'B', 'b')")
            .execute(&pool)
            .await
            .unwrap();

        for (from, to, kind) in [(1, 1, "USED_IN"), (1, 2, "LOVES")] {
            let insert = sqlx::query(
                "INSERT INTO concept_relations (from_concept_id, to_concept_id, relation_type) VALUES (?, ?, ?)",
            )
            .bind(from)
            .bind(to)
            .bind(kind)
            .execute(&pool)
            .await;
            assert!(insert.is_err(), "{} -> {} ({}) should be rejected", from, to, kind);
        }
    }

    #[tokio::test]
    async fn test_concept_name_key_is_unique() {
        let pool = blank_pool().await;
        run_migrations(&pool).await.unwrap();

        sqlx::query("INSERT INTO concepts (name, name_key) VALUES ('GPU', 'gpu')")
            .execute(&pool)
            .await
            .unwrap();
        let again = sqlx::query("INSERT INTO concepts (name, name_key) VALUES ('gpu', 'gpu')")
            .execute(&pool)
            .await;
        assert!(again.is_err());
    }
}
