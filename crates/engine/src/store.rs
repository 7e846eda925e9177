//! PatternStore: the single owner of the pattern graph
//!
//! All mutation goes through one `RwLock` write guard, so inserts and prunes
//! are serialized. Searches and snapshot captures share the read guard and
//! always observe a state between two mutations.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use patternstore_core::limits::clamp_k;
use patternstore_core::{
    IndexParams, NodeId, PatternMetadata, PatternResult, SearchHit,
};
use patternstore_durability::GraphImage;

use crate::index::{HnswGraph, RemovalReport};

/// On-demand index statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Live nodes
    pub node_count: usize,
    /// Parameters the index was built with
    pub parameters: IndexParams,
    /// Approximate heap usage in bytes
    pub memory_estimate: usize,
    /// Highest layer
    pub max_level: usize,
    /// Entry point, `None` when empty
    pub entry_point: Option<NodeId>,
}

/// Result of an insert that honors fingerprint uniqueness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new node was created
    Inserted(NodeId),
    /// A live node already carries this fingerprint
    Duplicate(NodeId),
}

/// Thread-safe pattern index
pub struct PatternStore {
    graph: RwLock<HnswGraph>,
}

impl PatternStore {
    /// Create an empty store
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when `params` fail validation.
    pub fn new(params: IndexParams) -> PatternResult<Self> {
        Ok(PatternStore {
            graph: RwLock::new(HnswGraph::new(params)?),
        })
    }

    /// Index parameters
    pub fn params(&self) -> IndexParams {
        self.graph.read().params().clone()
    }

    /// Embedding dimensionality
    pub fn dimension(&self) -> usize {
        self.graph.read().params().dimension
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.graph.read().len()
    }

    /// Whether the store holds no nodes
    pub fn is_empty(&self) -> bool {
        self.graph.read().is_empty()
    }

    /// Insert a pattern
    ///
    /// # Errors
    ///
    /// `DimensionMismatch`, `InvalidVector`, or `InvalidState` when a live
    /// node already carries the fingerprint; the graph is unchanged.
    pub fn insert(&self, vector: Vec<f32>, metadata: PatternMetadata) -> PatternResult<NodeId> {
        self.graph.write().insert(vector, metadata)
    }

    /// Insert a pattern unless a live node already carries its fingerprint
    ///
    /// The lookup and the insert happen under the same write guard.
    pub fn insert_unique(
        &self,
        vector: Vec<f32>,
        metadata: PatternMetadata,
    ) -> PatternResult<InsertOutcome> {
        let mut graph = self.graph.write();
        if let Some(existing) = metadata
            .fingerprint
            .and_then(|fp| graph.lookup_fingerprint(fp))
        {
            return Ok(InsertOutcome::Duplicate(existing));
        }
        graph.insert(vector, metadata).map(InsertOutcome::Inserted)
    }

    /// k nearest patterns using the configured search width
    pub fn search(&self, query: &[f32], k: usize) -> PatternResult<Vec<SearchHit>> {
        let graph = self.graph.read();
        let width = graph.params().ef_search;
        Self::search_locked(&graph, query, k, width)
    }

    /// k nearest patterns with an explicit beam width
    pub fn search_with_width(
        &self,
        query: &[f32],
        k: usize,
        search_width: usize,
    ) -> PatternResult<Vec<SearchHit>> {
        let graph = self.graph.read();
        Self::search_locked(&graph, query, k, search_width)
    }

    fn search_locked(
        graph: &HnswGraph,
        query: &[f32],
        k: usize,
        search_width: usize,
    ) -> PatternResult<Vec<SearchHit>> {
        let hits = graph.search(query, clamp_k(k), search_width)?;
        Ok(hits
            .into_iter()
            .map(|(id, score)| SearchHit {
                id,
                score,
                pattern_id: graph
                    .node(id)
                    .and_then(|n| n.metadata.pattern_id.clone()),
            })
            .collect())
    }

    /// Metadata of a live node
    pub fn metadata(&self, id: NodeId) -> Option<PatternMetadata> {
        self.graph.read().node(id).map(|n| n.metadata.clone())
    }

    /// Node carrying `fingerprint`, if any
    pub fn lookup_fingerprint(&self, fingerprint: u64) -> Option<NodeId> {
        self.graph.read().lookup_fingerprint(fingerprint)
    }

    /// Current statistics
    pub fn stats(&self) -> IndexStats {
        let graph = self.graph.read();
        IndexStats {
            node_count: graph.len(),
            parameters: graph.params().clone(),
            memory_estimate: graph.memory_usage(),
            max_level: graph.max_level(),
            entry_point: graph.entry_point(),
        }
    }

    /// Point-in-time image of the graph (read guard held while copying)
    pub fn image(&self) -> GraphImage {
        self.graph.read().to_image()
    }

    /// Capture an image together with the parameters it was built with
    pub(crate) fn capture(&self) -> (IndexParams, GraphImage) {
        let graph = self.graph.read();
        (graph.params().clone(), graph.to_image())
    }

    /// Replace the whole graph with a persisted image
    ///
    /// The image is validated before the swap; on error the current graph
    /// stays in place.
    pub fn load_image(&self, image: GraphImage) -> PatternResult<()> {
        let params = self.params();
        let restored = HnswGraph::from_image(params, image)?;
        let count = restored.len();
        *self.graph.write() = restored;
        info!(target: "patternstore::index", nodes = count, "Graph loaded from image");
        Ok(())
    }

    /// Remove nodes and repair the graph
    pub fn remove_nodes(&self, ids: &[NodeId]) -> RemovalReport {
        self.graph.write().remove_nodes(ids)
    }

    /// Run `f` with exclusive access to the graph
    pub(crate) fn with_graph_mut<R>(&self, f: impl FnOnce(&mut HnswGraph) -> R) -> R {
        f(&mut self.graph.write())
    }

    /// Check every structural invariant of the graph
    pub fn verify_integrity(&self) -> Result<(), String> {
        self.graph.read().verify_integrity()
    }
}
