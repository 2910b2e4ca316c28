//! Shared store-of-record reads
//!
//! Every call goes straight to the database; nothing here caches, so a
//! concept created by a concurrent writer is visible on the next lookup.

use sqlx::{SqliteConnection, SqlitePool};

use crate::domain::entity::{ConceptRow, RelationRow};
use crate::domain::{Concept, ConceptRelation, concept_key};
use crate::error::Result;

const CONCEPT_COLUMNS: &str = "c.id, c.name, c.description_ko, c.real_world_examples_ko";

/// Case-insensitive exact lookup of a concept id by name
pub async fn find_concept_id(conn: &mut SqliteConnection, name: &str) -> Result<Option<i64>> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM concepts WHERE name_key = ?")
        .bind(concept_key(name))
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(|(id,)| id))
}

pub async fn find_concept_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Concept>> {
    let row: Option<ConceptRow> = sqlx::query_as(&format!(
        "SELECT {CONCEPT_COLUMNS} FROM concepts c WHERE c.name_key = ?"
    ))
    .bind(concept_key(name))
    .fetch_optional(pool)
    .await?;
    Ok(row.map(ConceptRow::into_entity))
}

pub async fn get_concept(pool: &SqlitePool, id: i64) -> Result<Option<Concept>> {
    let row: Option<ConceptRow> = sqlx::query_as(&format!(
        "SELECT {CONCEPT_COLUMNS} FROM concepts c WHERE c.id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(ConceptRow::into_entity))
}

/// Every stored concept name, oldest first
pub async fn all_concept_names(pool: &SqlitePool) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM concepts ORDER BY id")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|(name,)| name).collect())
}

/// Concepts the user collected, in collection order (ties broken by id)
pub async fn collected_concepts(pool: &SqlitePool, user_id: i64) -> Result<Vec<Concept>> {
    let rows: Vec<ConceptRow> = sqlx::query_as(&format!(
        "SELECT {CONCEPT_COLUMNS}
         FROM concepts c
         JOIN user_collections uc ON uc.concept_id = c.id
         WHERE uc.user_id = ?
         ORDER BY uc.collected_at, c.id"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(ConceptRow::into_entity).collect())
}

/// Relations whose both endpoints the user collected, ordered by id
pub async fn induced_relations(pool: &SqlitePool, user_id: i64) -> Result<Vec<ConceptRelation>> {
    let rows: Vec<RelationRow> = sqlx::query_as(
        "SELECT r.id, r.from_concept_id, r.to_concept_id, r.relation_type, r.strength
         FROM concept_relations r
         JOIN user_collections src ON src.concept_id = r.from_concept_id AND src.user_id = ?
         JOIN user_collections dst ON dst.concept_id = r.to_concept_id AND dst.user_id = ?
         ORDER BY r.id",
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().filter_map(RelationRow::into_entity).collect())
}

pub async fn article_id_by_url(pool: &SqlitePool, url: &str) -> Result<Option<i64>> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM articles WHERE original_url = ?")
        .bind(url.trim())
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(id,)| id))
}

pub async fn user_exists(pool: &SqlitePool, user_id: i64) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}
