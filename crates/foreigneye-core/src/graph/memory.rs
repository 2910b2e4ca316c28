//! In-process graph store

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::store::{ConceptNode, GraphStore, ProjectionBatch, RelationEdge};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct GraphState {
    concepts: BTreeMap<i64, ConceptNode>,
    relations: BTreeMap<(i64, i64), RelationEdge>,
    collected: BTreeSet<(i64, i64)>,
}

/// Graph view kept in memory, keyed exactly like the Neo4j projection
///
/// Edges whose endpoints are unknown create bare endpoint nodes, matching
/// `MERGE` semantics.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    state: RwLock<GraphState>,
    fail_writes: AtomicBool,
    applied_batches: AtomicUsize,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `apply` fail (outage simulation).
    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    /// Number of batches committed so far
    pub fn applied_batches(&self) -> usize {
        self.applied_batches.load(Ordering::SeqCst)
    }

    pub async fn concept(&self, id: i64) -> Option<ConceptNode> {
        self.state.read().await.concepts.get(&id).cloned()
    }

    pub async fn concepts(&self) -> Vec<ConceptNode> {
        self.state.read().await.concepts.values().cloned().collect()
    }

    pub async fn relations(&self) -> Vec<RelationEdge> {
        self.state.read().await.relations.values().cloned().collect()
    }

    /// Concept ids linked to the user by a `COLLECTED` edge
    pub async fn collected_by(&self, user_id: i64) -> Vec<i64> {
        self.state
            .read()
            .await
            .collected
            .iter()
            .filter(|(user, _)| *user == user_id)
            .map(|(_, concept)| *concept)
            .collect()
    }
}

fn bare_node(id: i64) -> ConceptNode {
    ConceptNode {
        id,
        name: String::new(),
        description: String::new(),
        examples: Vec::new(),
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn apply(&self, batch: &ProjectionBatch) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::GraphStoreError(
                "in-memory graph store is failing writes".to_string(),
            ));
        }

        let mut state = self.state.write().await;

        for node in &batch.concepts {
            state.concepts.insert(node.id, node.clone());
            if let Some(user_id) = batch.user_id {
                state.collected.insert((user_id, node.id));
            }
        }

        for edge in &batch.relations {
            for id in [edge.from_id, edge.to_id] {
                state.concepts.entry(id).or_insert_with(|| bare_node(id));
            }
            state.relations.insert((edge.from_id, edge.to_id), edge.clone());
        }

        self.applied_batches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RelationType;

    fn node(id: i64, name: &str) -> ConceptNode {
        ConceptNode {
            id,
            name: name.to_string(),
            description: String::new(),
            examples: vec![],
        }
    }

    fn edge(from_id: i64, to_id: i64) -> RelationEdge {
        RelationEdge {
            from_id,
            to_id,
            relation_type: RelationType::UsedIn,
            strength: 5,
        }
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let store = InMemoryGraphStore::new();
        let batch = ProjectionBatch::for_user(7, vec![node(1, "GPU"), node(2, "CUDA")], vec![edge(2, 1)]);

        store.apply(&batch).await.unwrap();
        store.apply(&batch).await.unwrap();

        assert_eq!(store.concepts().await.len(), 2);
        assert_eq!(store.relations().await.len(), 1);
        assert_eq!(store.collected_by(7).await, vec![1, 2]);
        assert_eq!(store.applied_batches(), 2);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_attributes() {
        let store = InMemoryGraphStore::new();
        store
            .apply(&ProjectionBatch::concepts(vec![node(1, "gpu")]))
            .await
            .unwrap();
        store
            .apply(&ProjectionBatch::concepts(vec![node(1, "GPU")]))
            .await
            .unwrap();

        assert_eq!(store.concept(1).await.unwrap().name, "GPU");
    }

    #[tokio::test]
    async fn test_edge_merges_missing_endpoints() {
        let store = InMemoryGraphStore::new();
        store.apply(&ProjectionBatch::relation(edge(3, 4))).await.unwrap();

        assert!(store.concept(3).await.is_some());
        assert!(store.concept(4).await.is_some());
    }

    #[tokio::test]
    async fn test_failing_store_rejects_writes() {
        let store = InMemoryGraphStore::new();
        store.set_failing(true);

        let err = store
            .apply(&ProjectionBatch::concepts(vec![node(1, "GPU")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::GraphStoreError(_)));
        assert!(store.concepts().await.is_empty());
    }
}
