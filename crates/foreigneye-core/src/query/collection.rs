//! User collections
//!
//! Collecting writes to the store of record first; the graph view catches up
//! through a queued sync job.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use tracing::{error, info};

use crate::domain::entity::ConceptRow;
use crate::domain::{Collection, Concept, DEFAULT_STRENGTH, RelationType};
use crate::error::{Error, Result};
use crate::jobs::{JobQueue, Task};
use crate::ledger::queries::{find_concept_by_name, get_concept, user_exists};

/// A strong relation between a newly collected concept and one the user
/// already had
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewConnection {
    pub relation_id: i64,
    pub concept_id: i64,
    pub name: String,
    pub relation_type: RelationType,
    pub strength: i64,
    /// True when the edge points from the new concept to `concept_id`
    pub outgoing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectOutcome {
    pub collection: Collection,
    pub concept_name: String,
    pub new_connections: Vec<NewConnection>,
    /// Id of the queued graph sync, if enqueueing succeeded
    pub sync_job_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectedConcept {
    #[serde(flatten)]
    pub concept: Concept,
    pub collected_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct ConnectionRow {
    relation_id: i64,
    concept_id: i64,
    name: String,
    relation_type: String,
    strength: i64,
    outgoing: bool,
}

#[derive(Debug, FromRow)]
struct CollectedRow {
    #[sqlx(flatten)]
    concept: ConceptRow,
    collected_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct CollectionService {
    pool: SqlitePool,
    queue: Option<JobQueue>,
}

impl CollectionService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, queue: None }
    }

    /// Queue a graph sync after every successful collect
    pub fn with_queue(mut self, queue: JobQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Add a concept to a user's collection.
    ///
    /// Collecting the same concept twice is [`Error::DuplicateEntry`].
    pub async fn collect_concept(&self, user_id: i64, concept_id: i64) -> Result<CollectOutcome> {
        if !user_exists(&self.pool, user_id).await? {
            return Err(Error::UserNotFound(user_id.to_string()));
        }
        let concept = get_concept(&self.pool, concept_id)
            .await?
            .ok_or_else(|| Error::ConceptNotFound(concept_id.to_string()))?;

        let collection: Option<Collection> = sqlx::query_as(
            "INSERT INTO user_collections (user_id, concept_id, collected_at)
             VALUES (?, ?, ?)
             ON CONFLICT(user_id, concept_id) DO NOTHING
             RETURNING user_id, concept_id, collected_at",
        )
        .bind(user_id)
        .bind(concept_id)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        let Some(collection) = collection else {
            return Err(Error::DuplicateEntry(format!(
                "user {} already collected '{}'",
                user_id, concept.name
            )));
        };

        let new_connections = self.new_connections(user_id, concept_id).await?;
        info!(
            user_id,
            concept_id,
            connections = new_connections.len(),
            "Concept collected"
        );

        let sync_job_id = self.enqueue_sync(user_id).await;

        Ok(CollectOutcome {
            collection,
            concept_name: concept.name,
            new_connections,
            sync_job_id,
        })
    }

    /// Collect by case-insensitive concept name
    pub async fn collect_by_name(&self, user_id: i64, name: &str) -> Result<CollectOutcome> {
        let concept = find_concept_by_name(&self.pool, name)
            .await?
            .ok_or_else(|| Error::ConceptNotFound(name.trim().to_string()))?;
        self.collect_concept(user_id, concept.id).await
    }

    /// The user's concepts, most recently collected first
    pub async fn list_collections(&self, user_id: i64) -> Result<Vec<CollectedConcept>> {
        if !user_exists(&self.pool, user_id).await? {
            return Err(Error::UserNotFound(user_id.to_string()));
        }

        let rows: Vec<CollectedRow> = sqlx::query_as(
            "SELECT c.id, c.name, c.description_ko, c.real_world_examples_ko, uc.collected_at
             FROM user_collections uc
             JOIN concepts c ON c.id = uc.concept_id
             WHERE uc.user_id = ?
             ORDER BY uc.collected_at DESC, c.id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| CollectedConcept {
                concept: row.concept.into_entity(),
                collected_at: row.collected_at,
            })
            .collect())
    }

    async fn new_connections(&self, user_id: i64, concept_id: i64) -> Result<Vec<NewConnection>> {
        let rows: Vec<ConnectionRow> = sqlx::query_as(
            "SELECT r.id AS relation_id,
                    c.id AS concept_id,
                    c.name,
                    r.relation_type,
                    r.strength,
                    (r.from_concept_id = ?1) AS outgoing
             FROM concept_relations r
             JOIN concepts c
               ON c.id = CASE WHEN r.from_concept_id = ?1 THEN r.to_concept_id ELSE r.from_concept_id END
             JOIN user_collections uc ON uc.concept_id = c.id AND uc.user_id = ?2
             WHERE (r.from_concept_id = ?1 OR r.to_concept_id = ?1)
               AND r.strength >= ?3
             ORDER BY r.strength DESC, r.id",
        )
        .bind(concept_id)
        .bind(user_id)
        .bind(DEFAULT_STRENGTH)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                Some(NewConnection {
                    relation_type: RelationType::parse(&row.relation_type)?,
                    relation_id: row.relation_id,
                    concept_id: row.concept_id,
                    name: row.name,
                    strength: row.strength,
                    outgoing: row.outgoing,
                })
            })
            .collect())
    }

    async fn enqueue_sync(&self, user_id: i64) -> Option<i64> {
        let queue = self.queue.as_ref()?;
        match queue.enqueue(&Task::SyncUserGraph { user_id }).await {
            Ok(job_id) => Some(job_id),
            Err(e) => {
                // The collection stays; the next collect or a manual sync catches up.
                error!(user_id, error = %e, "Failed to enqueue graph sync");
                None
            }
        }
    }
}
