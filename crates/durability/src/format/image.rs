//! Serializable image of the pattern graph
//!
//! The index converts its in-memory graph to a `GraphImage` under a read
//! lock; the writer encodes it as the MessagePack snapshot body. Restore goes
//! the other way, after `GraphImage::validate` has checked every structural
//! invariant the index relies on.

use patternstore_core::{NodeId, PatternMetadata};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// One node of the graph image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeImage {
    /// Node id
    pub id: NodeId,
    /// Embedding
    pub vector: Vec<f32>,
    /// Pattern metadata
    pub metadata: PatternMetadata,
    /// Neighbor ids per layer; `neighbors.len() - 1` is the node's level
    pub neighbors: Vec<Vec<NodeId>>,
}

impl NodeImage {
    /// Top layer this node appears in
    pub fn level(&self) -> usize {
        self.neighbors.len().saturating_sub(1)
    }
}

/// The complete graph state captured by a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphImage {
    /// Entry-point node, `None` for an empty graph
    pub entry_point: Option<NodeId>,
    /// Highest layer present in the graph
    pub max_layer: usize,
    /// Layer-assignment RNG seed
    pub rng_seed: u64,
    /// Layer-assignment RNG counter
    pub rng_counter: u64,
    /// Next id to assign
    pub next_id: u64,
    /// Node table in id order
    pub nodes: Vec<NodeImage>,
}

impl GraphImage {
    /// An image with no nodes
    pub fn empty(rng_seed: u64) -> Self {
        GraphImage {
            entry_point: None,
            max_layer: 0,
            rng_seed,
            rng_counter: 0,
            next_id: 0,
            nodes: Vec::new(),
        }
    }

    /// Check the structural invariants of the image.
    ///
    /// Verifies vector dimensionality, per-layer degree caps, that every
    /// node owns at least one layer, that neighbor ids exist at the layer
    /// they are referenced on, id uniqueness, and that the entry point is a
    /// live node on the top layer.
    pub fn validate(&self, dimension: usize, max_degree: usize) -> Result<(), String> {
        let mut levels =
            FxHashMap::with_capacity_and_hasher(self.nodes.len(), Default::default());
        for node in &self.nodes {
            if node.vector.len() != dimension {
                return Err(format!(
                    "node {} has dimension {}, expected {}",
                    node.id,
                    node.vector.len(),
                    dimension
                ));
            }
            if node.neighbors.is_empty() {
                return Err(format!("node {} has no layers", node.id));
            }
            if node.id.as_u64() >= self.next_id {
                return Err(format!(
                    "node {} is not below next_id {}",
                    node.id, self.next_id
                ));
            }
            if levels.insert(node.id, node.level()).is_some() {
                return Err(format!("duplicate node id {}", node.id));
            }
        }

        for node in &self.nodes {
            for (layer, list) in node.neighbors.iter().enumerate() {
                let cap = if layer == 0 { max_degree * 2 } else { max_degree };
                if list.len() > cap {
                    return Err(format!(
                        "node {} has {} neighbors on layer {}, cap is {}",
                        node.id,
                        list.len(),
                        layer,
                        cap
                    ));
                }
                let mut seen =
                    FxHashSet::with_capacity_and_hasher(list.len(), Default::default());
                for neighbor in list {
                    match levels.get(neighbor) {
                        Some(&level) if level >= layer => {}
                        Some(_) => {
                            return Err(format!(
                                "node {} links {} on layer {} above its level",
                                node.id, neighbor, layer
                            ))
                        }
                        None => {
                            return Err(format!(
                                "node {} links missing node {}",
                                node.id, neighbor
                            ))
                        }
                    }
                    if *neighbor == node.id || !seen.insert(*neighbor) {
                        return Err(format!(
                            "node {} has a self or duplicate link on layer {}",
                            node.id, layer
                        ));
                    }
                }
            }
        }

        match self.entry_point {
            None if self.nodes.is_empty() => Ok(()),
            None => Err("non-empty graph without entry point".to_string()),
            Some(ep) => match levels.get(&ep) {
                Some(&level) if level == self.max_layer => Ok(()),
                Some(&level) => Err(format!(
                    "entry point {} has level {}, graph max layer is {}",
                    ep, level, self.max_layer
                )),
                None => Err(format!("entry point {} is not a node", ep)),
            },
        }
    }
}
