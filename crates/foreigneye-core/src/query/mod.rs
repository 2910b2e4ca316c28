//! Read paths and user-facing services
//!
//! Everything here reads the store of record directly. None of it waits on
//! the model or on the graph view.

pub mod collection;
pub mod knowledge_map;
pub mod relatives;
pub mod search;
pub mod users;

pub use collection::{CollectOutcome, CollectedConcept, CollectionService, NewConnection};
pub use knowledge_map::{KnowledgeMap, KnowledgeMapBuilder, MapEdge, MapNode, render_map};
pub use relatives::{RELATIVE_LIMIT, RelativeConcept, RelativeSelector, select_relatives};
pub use search::{ArticleSearchResult, ConceptPreview, SearchService};
pub use users::{DEFAULT_USER_ID, DEFAULT_USERNAME, UserService};
