//! Node removal with graph repair
//!
//! Removing a node leaves three kinds of damage: directed edges pointing at
//! it from other nodes, neighbors that lose their connection into that part
//! of the graph, and possibly a dead entry point. `remove_nodes` fixes all
//! three in one pass under the caller's write lock.

use std::collections::BTreeSet;

use patternstore_core::NodeId;
use rustc_hash::{FxHashMap, FxHashSet};

use super::distance::compute_distance;
use super::hnsw::{sort_ascending, Candidate, HnswGraph};

/// Outcome of a removal pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalReport {
    /// Nodes actually removed (unknown ids are ignored)
    pub removed: usize,
    /// Neighbor lists re-selected after losing an edge
    pub repaired_lists: usize,
    /// Whether the entry point moved
    pub entry_point_changed: bool,
}

impl HnswGraph {
    /// Remove `ids` from the graph and repair it
    ///
    /// Every surviving list that pointed at a removed node is re-selected
    /// with the diversity heuristic from its surviving neighbors plus the
    /// surviving neighbors the removed node held on that layer. If the entry
    /// point is removed, the surviving node with the highest level (lowest
    /// id on ties) takes over.
    pub fn remove_nodes(&mut self, ids: &[NodeId]) -> RemovalReport {
        let doomed: FxHashSet<NodeId> = ids
            .iter()
            .copied()
            .filter(|id| self.nodes.contains_key(id))
            .collect();
        if doomed.is_empty() {
            return RemovalReport::default();
        }

        // Detach removed nodes, keeping their lists for reconnection
        let mut lost_lists: FxHashMap<NodeId, Vec<BTreeSet<NodeId>>> = FxHashMap::default();
        for id in &doomed {
            if let Some(node) = self.nodes.remove(id) {
                if let Some(fp) = node.metadata.fingerprint {
                    if self.fingerprints.get(&fp) == Some(id) {
                        self.fingerprints.remove(&fp);
                    }
                }
                lost_lists.insert(*id, node.neighbors);
            }
        }

        // Edges are directed: every survivor must be scanned
        let mut damaged: Vec<(NodeId, usize, BTreeSet<NodeId>)> = Vec::new();
        for (&id, node) in self.nodes.iter_mut() {
            for (layer, list) in node.neighbors.iter_mut().enumerate() {
                let lost: Vec<NodeId> = list.iter().filter(|n| doomed.contains(n)).copied().collect();
                if lost.is_empty() {
                    continue;
                }
                for n in &lost {
                    list.remove(n);
                }
                let mut pool: BTreeSet<NodeId> = list.clone();
                for gone in lost {
                    if let Some(layers) = lost_lists.get(&gone) {
                        if let Some(their) = layers.get(layer) {
                            pool.extend(their.iter().copied());
                        }
                    }
                }
                damaged.push((id, layer, pool));
            }
        }

        let repaired_lists = damaged.len();
        for (id, layer, pool) in damaged {
            self.reconnect(id, layer, pool);
        }

        let entry_point_changed = match self.entry_point {
            Some(ep) => doomed.contains(&ep),
            None => false,
        };
        if entry_point_changed {
            self.repair_entry_point();
        }

        RemovalReport {
            removed: doomed.len(),
            repaired_lists,
            entry_point_changed,
        }
    }

    /// Re-select one list from a candidate pool of surviving ids
    fn reconnect(&mut self, id: NodeId, layer: usize, pool: BTreeSet<NodeId>) {
        let selected: BTreeSet<NodeId> = {
            let base = match self.nodes.get(&id) {
                Some(n) => &n.vector,
                None => return,
            };
            let mut scored: Vec<Candidate> = pool
                .into_iter()
                .filter(|&nid| nid != id)
                .filter_map(|nid| {
                    self.nodes
                        .get(&nid)
                        // A removed node's neighbors on `layer` all reach `layer`
                        .filter(|n| n.level() >= layer)
                        .map(|n| Candidate {
                            distance: compute_distance(base, &n.vector, self.params.metric),
                            id: nid,
                        })
                })
                .collect();
            sort_ascending(&mut scored);
            self.select_neighbors_heuristic(&scored, self.params.degree_cap(layer))
                .into_iter()
                .map(|c| c.id)
                .collect()
        };

        if let Some(node) = self.nodes.get_mut(&id) {
            node.neighbors[layer] = selected;
        }
    }

    /// Pick the surviving node with the highest level, lowest id on ties
    fn repair_entry_point(&mut self) {
        let mut best: Option<(usize, NodeId)> = None;
        for (&id, node) in &self.nodes {
            // BTreeMap iterates ids ascending, so strict > keeps the lowest id
            if best.map_or(true, |(level, _)| node.level() > level) {
                best = Some((node.level(), id));
            }
        }
        match best {
            Some((level, id)) => {
                self.entry_point = Some(id);
                self.max_level = level;
            }
            None => {
                self.entry_point = None;
                self.max_level = 0;
            }
        }
    }
}
