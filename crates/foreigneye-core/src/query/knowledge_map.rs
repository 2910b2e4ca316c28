//! Knowledge map: a user's collected concepts and the relations among them
//!
//! Rendered for a flow-chart front end: nodes on a five-wide grid, edges
//! labelled with the relation type in title case.

use serde::Serialize;
use sqlx::SqlitePool;

use crate::domain::{Concept, ConceptRelation};
use crate::error::Result;
use crate::ledger::queries::{collected_concepts, induced_relations};

pub const NODES_PER_ROW: usize = 5;
pub const COLUMN_SPACING: i64 = 200;
pub const ROW_SPACING: i64 = 150;

const NODE_TYPE: &str = "myConceptNode";
const EDGE_STROKE: &str = "#4299E1";
const EDGE_STROKE_WIDTH: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    pub x: i64,
    pub y: i64,
}

impl Position {
    /// Grid slot for the `index`-th node
    pub fn for_index(index: usize) -> Self {
        Self {
            x: (index % NODES_PER_ROW) as i64 * COLUMN_SPACING,
            y: (index / NODES_PER_ROW) as i64 * ROW_SPACING,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeData {
    #[serde(rename = "type")]
    pub node_type: String,
    pub concept: Concept,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub position: Position,
    pub data: NodeData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeStyle {
    pub stroke: String,
    pub stroke_width: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub label: String,
    pub animated: bool,
    pub style: EdgeStyle,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KnowledgeMap {
    pub nodes: Vec<MapNode>,
    pub edges: Vec<MapEdge>,
}

impl KnowledgeMap {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Render concepts and relations into map form.
///
/// Relations with an endpoint outside `concepts` are dropped, so the result
/// is always an induced subgraph.
pub fn render_map(concepts: &[Concept], relations: &[ConceptRelation]) -> KnowledgeMap {
    if concepts.is_empty() {
        return KnowledgeMap::default();
    }

    let nodes = concepts
        .iter()
        .enumerate()
        .map(|(index, concept)| MapNode {
            id: concept.id.to_string(),
            node_type: NODE_TYPE.to_string(),
            position: Position::for_index(index),
            data: NodeData {
                node_type: NODE_TYPE.to_string(),
                concept: concept.clone(),
            },
        })
        .collect();

    let contains = |id: i64| concepts.iter().any(|c| c.id == id);
    let edges = relations
        .iter()
        .filter(|r| contains(r.from_concept_id) && contains(r.to_concept_id))
        .map(|relation| MapEdge {
            id: format!("rel-{}", relation.id),
            source: relation.from_concept_id.to_string(),
            target: relation.to_concept_id.to_string(),
            label: relation.relation_type.label(),
            animated: true,
            style: EdgeStyle {
                stroke: EDGE_STROKE.to_string(),
                stroke_width: EDGE_STROKE_WIDTH,
            },
        })
        .collect();

    KnowledgeMap { nodes, edges }
}

/// Builds knowledge maps from the store of record. Read-only.
#[derive(Clone)]
pub struct KnowledgeMapBuilder {
    pool: SqlitePool,
}

impl KnowledgeMapBuilder {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn build_map(&self, user_id: i64) -> Result<KnowledgeMap> {
        let concepts = collected_concepts(&self.pool, user_id).await?;
        if concepts.is_empty() {
            return Ok(KnowledgeMap::default());
        }

        let relations = induced_relations(&self.pool, user_id).await?;
        Ok(render_map(&concepts, &relations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RelationType;

    fn concept(id: i64, name: &str) -> Concept {
        Concept {
            id,
            name: name.to_string(),
            description_ko: String::new(),
            real_world_examples_ko: Vec::new(),
        }
    }

    fn relation(id: i64, from: i64, to: i64, relation_type: RelationType) -> ConceptRelation {
        ConceptRelation {
            id,
            from_concept_id: from,
            to_concept_id: to,
            relation_type,
            strength: 5,
        }
    }

    #[test]
    fn test_grid_positions() {
        assert_eq!(Position::for_index(0), Position { x: 0, y: 0 });
        assert_eq!(Position::for_index(4), Position { x: 800, y: 0 });
        assert_eq!(Position::for_index(5), Position { x: 0, y: 150 });
        assert_eq!(Position::for_index(12), Position { x: 400, y: 300 });
    }

    #[test]
    fn test_empty_collection_renders_empty_map() {
        let map = render_map(&[], &[relation(1, 1, 2, RelationType::UsedIn)]);
        assert!(map.nodes.is_empty());
        assert!(map.edges.is_empty());
    }

    #[test]
    fn test_edges_outside_collection_are_dropped() {
        let concepts = vec![concept(1, "GPU"), concept(2, "CUDA")];
        let relations = vec![
            relation(7, 2, 1, RelationType::UsedIn),
            relation(8, 1, 3, RelationType::Enables),
        ];

        let map = render_map(&concepts, &relations);
        assert_eq!(map.nodes.len(), 2);
        assert_eq!(map.edges.len(), 1);
        assert_eq!(map.edges[0].id, "rel-7");
        assert_eq!(map.edges[0].label, "Used In");
    }

    #[test]
    fn test_map_json_shape() {
        let map = render_map(
            &[concept(1, "GPU"), concept(2, "CUDA")],
            &[relation(3, 1, 2, RelationType::IsATypeOf)],
        );
        let json = serde_json::to_value(&map).unwrap();

        assert_eq!(json["nodes"][1]["id"], "2");
        assert_eq!(json["nodes"][1]["type"], "myConceptNode");
        assert_eq!(json["nodes"][1]["position"]["x"], 200);
        assert_eq!(json["nodes"][1]["data"]["concept"]["name"], "CUDA");
        assert_eq!(json["edges"][0]["source"], "1");
        assert_eq!(json["edges"][0]["label"], "Is A Type Of");
        assert_eq!(json["edges"][0]["animated"], true);
        assert_eq!(json["edges"][0]["style"]["strokeWidth"], 2);
    }
}
