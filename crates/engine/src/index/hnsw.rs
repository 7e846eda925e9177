//! HNSW (Hierarchical Navigable Small World) pattern graph
//!
//! O(log n) approximate nearest neighbor search over pattern vectors.
//!
//! ## Algorithm
//!
//! HNSW builds a multi-layer graph where:
//! - Layer 0 contains all nodes with up to 2*M connections each
//! - Higher layers contain a subset of nodes with up to M connections each
//! - Search starts from the top layer and greedily descends to layer 0
//! - At each layer, a beam search finds the ef closest neighbors
//! - Neighbors are chosen with the diversity heuristic (paper Algorithm 4)
//!
//! ## Determinism
//!
//! - Seeded SplitMix64 + monotonic counter for level assignment
//! - BTreeMap for node storage (deterministic iteration)
//! - BTreeSet for neighbor lists (sorted)
//! - Tie-breaking: (distance asc, NodeId asc); NodeId order is insertion order
//!
//! ## Atomicity
//!
//! `insert` validates its input and computes every neighbor selection with
//! read-only searches before touching the node table, so a rejected insert
//! leaves the graph exactly as it was.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use patternstore_core::{IndexParams, NodeId, PatternError, PatternMetadata, PatternResult};
use patternstore_durability::{GraphImage, NodeImage};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::index::distance::compute_distance;

/// A node in the pattern graph
#[derive(Debug, Clone)]
pub(crate) struct HnswNode {
    pub(crate) vector: Vec<f32>,
    pub(crate) metadata: PatternMetadata,
    /// Neighbors per layer: neighbors[layer] = set of neighbor ids.
    /// `neighbors.len() - 1` is the node's level, so a node present on layer
    /// L owns a list on every layer below L.
    pub(crate) neighbors: Vec<BTreeSet<NodeId>>,
}

impl HnswNode {
    fn new(vector: Vec<f32>, metadata: PatternMetadata, level: usize) -> Self {
        HnswNode {
            vector,
            metadata,
            neighbors: (0..=level).map(|_| BTreeSet::new()).collect(),
        }
    }

    pub(crate) fn level(&self) -> usize {
        self.neighbors.len() - 1
    }
}

/// Scored candidate
///
/// Ordered so that the NEAREST candidate is the greatest:
/// `BinaryHeap<Candidate>` pops nearest first, `BinaryHeap<Reverse<Candidate>>`
/// keeps the worst result on top for O(1) eviction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Candidate {
    pub(crate) distance: f32,
    pub(crate) id: NodeId,
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .distance
            .partial_cmp(&self.distance)
            .unwrap_or(Ordering::Equal)
            // Tie-break: lower NodeId = Greater (earlier insert preferred)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Sort candidates ascending by (distance, id)
pub(crate) fn sort_ascending(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Read-only view of one node, for stats and tests
#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'a> {
    /// Node id
    pub id: NodeId,
    /// Embedding
    pub vector: &'a [f32],
    /// Metadata
    pub metadata: &'a PatternMetadata,
    /// Neighbor lists per layer
    pub neighbors: &'a [BTreeSet<NodeId>],
}

impl NodeRef<'_> {
    /// Top layer this node appears in
    pub fn level(&self) -> usize {
        self.neighbors.len() - 1
    }
}

/// The pattern graph: node table, entry point and layer-assignment state.
pub struct HnswGraph {
    pub(crate) params: IndexParams,
    /// BTreeMap for deterministic iteration
    pub(crate) nodes: BTreeMap<NodeId, HnswNode>,
    pub(crate) entry_point: Option<NodeId>,
    pub(crate) max_level: usize,
    rng_seed: u64,
    rng_counter: u64,
    next_id: u64,
    /// Fingerprint -> live node carrying it
    pub(crate) fingerprints: FxHashMap<u64, NodeId>,
}

impl HnswGraph {
    /// Create a new empty graph
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when `params` fail validation (e.g. `max_degree < 2`,
    /// which would make the level multiplier infinite).
    pub fn new(params: IndexParams) -> PatternResult<Self> {
        params.validate()?;
        let rng_seed = params.seed;
        Ok(HnswGraph {
            params,
            nodes: BTreeMap::new(),
            entry_point: None,
            max_level: 0,
            rng_seed,
            rng_counter: 0,
            next_id: 0,
            fingerprints: FxHashMap::default(),
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Index parameters
    pub fn params(&self) -> &IndexParams {
        &self.params
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph holds no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Entry-point node
    pub fn entry_point(&self) -> Option<NodeId> {
        self.entry_point
    }

    /// Highest layer in the graph
    pub fn max_level(&self) -> usize {
        self.max_level
    }

    /// Look up a node
    pub fn node(&self, id: NodeId) -> Option<NodeRef<'_>> {
        self.nodes.get(&id).map(|n| NodeRef {
            id,
            vector: &n.vector,
            metadata: &n.metadata,
            neighbors: &n.neighbors,
        })
    }

    /// Iterate nodes in id order
    pub fn iter(&self) -> impl Iterator<Item = NodeRef<'_>> {
        self.nodes.iter().map(|(&id, n)| NodeRef {
            id,
            vector: &n.vector,
            metadata: &n.metadata,
            neighbors: &n.neighbors,
        })
    }

    /// Node currently carrying `fingerprint`, if any
    pub fn lookup_fingerprint(&self, fingerprint: u64) -> Option<NodeId> {
        self.fingerprints.get(&fingerprint).copied()
    }

    // ========================================================================
    // Internal: Level Assignment
    // ========================================================================

    /// Assign a random level: floor(-ln(U) * mL), mL = 1/ln(M)
    ///
    /// Uses a hash-based PRNG seeded with `IndexParams::seed` and a monotonic
    /// counter, so identical insert sequences produce identical graphs.
    fn assign_level(&mut self) -> usize {
        self.rng_counter += 1;
        let hash = splitmix64(self.rng_seed.wrapping_add(self.rng_counter));

        // Convert to uniform (0, 1] and apply exponential distribution
        let uniform = (hash as f64) / (u64::MAX as f64);
        let uniform = uniform.max(1e-15);
        (-uniform.ln() * self.params.level_multiplier()) as usize
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Reject vectors the index cannot hold
    pub fn validate_vector(&self, vector: &[f32]) -> PatternResult<()> {
        if vector.len() != self.params.dimension {
            return Err(PatternError::DimensionMismatch {
                expected: self.params.dimension,
                got: vector.len(),
            });
        }
        if let Some(pos) = vector.iter().position(|x| !x.is_finite()) {
            return Err(PatternError::InvalidVector {
                reason: format!("non-finite value at position {}", pos),
            });
        }
        Ok(())
    }

    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        compute_distance(a, b, self.params.metric)
    }

    fn distance_to(&self, query: &[f32], id: NodeId) -> Option<f32> {
        self.nodes.get(&id).map(|n| self.distance(query, &n.vector))
    }

    // ========================================================================
    // Internal: Graph Traversal
    // ========================================================================

    /// Beam search at a single layer (paper Algorithm 2: SEARCH-LAYER)
    ///
    /// Returns up to `ef` closest nodes sorted by (distance asc, NodeId asc).
    pub(crate) fn search_layer(
        &self,
        query: &[f32],
        entries: &[NodeId],
        ef: usize,
        layer: usize,
    ) -> Vec<Candidate> {
        let mut visited: FxHashSet<NodeId> = FxHashSet::default();
        // C: candidates, nearest popped first
        let mut candidates: BinaryHeap<Candidate> = BinaryHeap::new();
        // W: results, worst on top
        let mut results: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();

        for &entry in entries {
            if !visited.insert(entry) {
                continue;
            }
            if let Some(distance) = self.distance_to(query, entry) {
                let c = Candidate { distance, id: entry };
                candidates.push(c);
                results.push(Reverse(c));
                if results.len() > ef {
                    results.pop();
                }
            }
        }

        while let Some(nearest) = candidates.pop() {
            // Paper line 7: nearest candidate is worse than the worst result
            if let Some(Reverse(worst)) = results.peek() {
                if results.len() >= ef && nearest.distance > worst.distance {
                    break;
                }
            }

            let neighbors = match self.nodes.get(&nearest.id) {
                Some(node) if layer < node.neighbors.len() => &node.neighbors[layer],
                _ => continue,
            };

            for &neighbor_id in neighbors {
                if !visited.insert(neighbor_id) {
                    continue;
                }
                let distance = match self.distance_to(query, neighbor_id) {
                    Some(d) => d,
                    None => continue,
                };
                let c = Candidate {
                    distance,
                    id: neighbor_id,
                };
                let improves = match results.peek() {
                    Some(Reverse(worst)) => results.len() < ef || c > *worst,
                    None => true,
                };
                if improves {
                    candidates.push(c);
                    results.push(Reverse(c));
                    // Paper line 15: evict worst if over capacity
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut out: Vec<Candidate> = results.into_iter().map(|r| r.0).collect();
        sort_ascending(&mut out);
        out
    }

    /// Greedy single-candidate descent from `from_layer` down to `to_layer`
    ///
    /// At each layer, evaluates ALL neighbors and moves to the best one until
    /// no neighbor improves. Equivalent to SEARCH-LAYER with ef=1.
    fn greedy_search_to_layer(
        &self,
        query: &[f32],
        entry_id: NodeId,
        from_layer: usize,
        to_layer: usize,
    ) -> NodeId {
        let mut current = entry_id;
        let mut current_distance = match self.distance_to(query, current) {
            Some(d) => d,
            None => return current,
        };

        for layer in (to_layer..=from_layer).rev() {
            loop {
                let mut best = Candidate {
                    distance: current_distance,
                    id: current,
                };
                if let Some(node) = self.nodes.get(&current) {
                    if layer < node.neighbors.len() {
                        for &neighbor_id in &node.neighbors[layer] {
                            if let Some(distance) = self.distance_to(query, neighbor_id) {
                                let c = Candidate {
                                    distance,
                                    id: neighbor_id,
                                };
                                if c > best {
                                    best = c;
                                }
                            }
                        }
                    }
                }
                if best.id == current {
                    break;
                }
                current = best.id;
                current_distance = best.distance;
            }
        }

        current
    }

    /// Select up to `m` neighbors with the diversity heuristic
    /// (paper Algorithm 4, with keepPrunedConnections).
    ///
    /// `candidates` must be sorted ascending by distance to the base node. A
    /// candidate is kept when it is closer to the base than to every
    /// already-kept neighbor; remaining slots are filled with the closest
    /// discarded candidates.
    pub(crate) fn select_neighbors_heuristic(
        &self,
        candidates: &[Candidate],
        m: usize,
    ) -> Vec<Candidate> {
        let mut selected: Vec<Candidate> = Vec::with_capacity(m);
        let mut discarded: Vec<Candidate> = Vec::new();

        for &candidate in candidates {
            if selected.len() >= m {
                break;
            }
            let cand_vec = match self.nodes.get(&candidate.id) {
                Some(n) => &n.vector,
                None => continue,
            };
            let is_diverse = selected.iter().all(|s| {
                self.nodes
                    .get(&s.id)
                    .map(|sn| candidate.distance < self.distance(cand_vec, &sn.vector))
                    .unwrap_or(true)
            });
            if is_diverse {
                selected.push(candidate);
            } else {
                discarded.push(candidate);
            }
        }

        for candidate in discarded {
            if selected.len() >= m {
                break;
            }
            selected.push(candidate);
        }

        selected
    }

    /// Re-select a node's list on one layer down to `cap` with the heuristic
    pub(crate) fn shrink_neighbors(&mut self, id: NodeId, layer: usize, cap: usize) {
        let keep: BTreeSet<NodeId> = {
            let node = match self.nodes.get(&id) {
                Some(n) if layer < n.neighbors.len() => n,
                _ => return,
            };
            if node.neighbors[layer].len() <= cap {
                return;
            }
            let mut scored: Vec<Candidate> = node.neighbors[layer]
                .iter()
                .filter_map(|&nid| {
                    self.distance_to(&node.vector, nid)
                        .map(|distance| Candidate { distance, id: nid })
                })
                .collect();
            sort_ascending(&mut scored);
            self.select_neighbors_heuristic(&scored, cap)
                .into_iter()
                .map(|c| c.id)
                .collect()
        };

        if let Some(node) = self.nodes.get_mut(&id) {
            node.neighbors[layer] = keep;
        }
    }

    // ========================================================================
    // Insert
    // ========================================================================

    /// Insert a vector (paper Algorithm 1: INSERT)
    ///
    /// Returns the new node's id. Fails with `DimensionMismatch` or
    /// `InvalidVector` before any mutation, and with `InvalidState` when a
    /// live node already carries the metadata's fingerprint.
    pub fn insert(&mut self, vector: Vec<f32>, metadata: PatternMetadata) -> PatternResult<NodeId> {
        self.validate_vector(&vector)?;
        if let Some(existing) = metadata.fingerprint.and_then(|fp| self.lookup_fingerprint(fp)) {
            return Err(PatternError::InvalidState(format!(
                "fingerprint already carried by live node {}",
                existing
            )));
        }

        let id = NodeId::new(self.next_id);
        let level = self.assign_level();

        // Phase 1 (read-only): find neighbors on every layer the node joins
        let mut selections: Vec<(usize, Vec<NodeId>)> = Vec::new();
        if let Some(entry_id) = self.entry_point {
            // Paper lines 4-6: greedy search from top to level+1
            let mut entries = vec![entry_id];
            if self.max_level > level {
                entries = vec![self.greedy_search_to_layer(
                    &vector,
                    entry_id,
                    self.max_level,
                    level + 1,
                )];
            }

            // Paper lines 7-16
            let start_layer = level.min(self.max_level);
            for layer in (0..=start_layer).rev() {
                let candidates =
                    self.search_layer(&vector, &entries, self.params.ef_construction, layer);
                let selected = self.select_neighbors_heuristic(&candidates, self.params.max_degree);
                selections.push((layer, selected.iter().map(|c| c.id).collect()));
                // Paper line 16: the whole beam seeds the next layer
                if !candidates.is_empty() {
                    entries = candidates.iter().map(|c| c.id).collect();
                }
            }
        }

        // Phase 2: link
        let fingerprint = metadata.fingerprint;
        let mut node = HnswNode::new(vector, metadata, level);
        for (layer, selected) in &selections {
            node.neighbors[*layer] = selected.iter().copied().collect();
        }
        self.nodes.insert(id, node);
        self.next_id += 1;
        if let Some(fp) = fingerprint {
            self.fingerprints.insert(fp, id);
        }

        // Paper lines 11-15: reverse edges, shrinking lists over their cap
        for (layer, selected) in selections {
            let cap = self.params.degree_cap(layer);
            for neighbor_id in selected {
                let over_cap = match self.nodes.get_mut(&neighbor_id) {
                    Some(n) if layer < n.neighbors.len() => {
                        n.neighbors[layer].insert(id);
                        n.neighbors[layer].len() > cap
                    }
                    _ => false,
                };
                if over_cap {
                    self.shrink_neighbors(neighbor_id, layer, cap);
                }
            }
        }

        // Paper line 17: new top level -> new entry point
        if self.entry_point.is_none() || level > self.max_level {
            self.entry_point = Some(id);
            self.max_level = level;
        }

        Ok(id)
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// k nearest neighbors of `query`, ascending by distance
    ///
    /// Beam width at layer 0 is `max(search_width, k)`. Returns an empty list
    /// for an empty graph or k == 0.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        search_width: usize,
    ) -> PatternResult<Vec<(NodeId, f32)>> {
        self.validate_vector(query)?;

        let entry_id = match self.entry_point {
            Some(id) if k > 0 => id,
            _ => return Ok(Vec::new()),
        };

        let mut current = entry_id;
        if self.max_level > 0 {
            current = self.greedy_search_to_layer(query, entry_id, self.max_level, 1);
        }

        let ef = search_width.max(k);
        let results = self.search_layer(query, &[current], ef, 0);
        Ok(results
            .into_iter()
            .take(k)
            .map(|c| (c.id, c.distance))
            .collect())
    }

    // ========================================================================
    // Snapshot Image
    // ========================================================================

    /// Capture the full graph state
    pub fn to_image(&self) -> GraphImage {
        GraphImage {
            entry_point: self.entry_point,
            max_layer: self.max_level,
            rng_seed: self.rng_seed,
            rng_counter: self.rng_counter,
            next_id: self.next_id,
            nodes: self
                .nodes
                .iter()
                .map(|(&id, n)| NodeImage {
                    id,
                    vector: n.vector.clone(),
                    metadata: n.metadata.clone(),
                    neighbors: n
                        .neighbors
                        .iter()
                        .map(|l| l.iter().copied().collect())
                        .collect(),
                })
                .collect(),
        }
    }

    /// Rebuild a graph from an image exactly as persisted (levels are not
    /// recomputed).
    pub fn from_image(params: IndexParams, image: GraphImage) -> PatternResult<Self> {
        image
            .validate(params.dimension, params.max_degree)
            .map_err(PatternError::Snapshot)?;

        let mut graph = HnswGraph::new(params)?;
        graph.entry_point = image.entry_point;
        graph.max_level = image.max_layer;
        graph.rng_seed = image.rng_seed;
        graph.rng_counter = image.rng_counter;
        graph.next_id = image.next_id;

        for node in image.nodes {
            if let Some(fp) = node.metadata.fingerprint {
                if let Some(first) = graph.fingerprints.insert(fp, node.id) {
                    return Err(PatternError::Snapshot(format!(
                        "fingerprint {:#x} carried by both {} and {}",
                        fp, first, node.id
                    )));
                }
            }
            graph.nodes.insert(
                node.id,
                HnswNode {
                    vector: node.vector,
                    metadata: node.metadata,
                    neighbors: node
                        .neighbors
                        .into_iter()
                        .map(|l| l.into_iter().collect())
                        .collect(),
                },
            );
        }

        Ok(graph)
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// Approximate heap usage of the graph in bytes
    pub fn memory_usage(&self) -> usize {
        self.nodes
            .values()
            .map(|node| {
                node.vector.len() * std::mem::size_of::<f32>()
                    + node
                        .neighbors
                        .iter()
                        // BTreeSet overhead per neighbor
                        .map(|ns| ns.len() * 16 + 64)
                        .sum::<usize>()
                    + node.metadata.source.len()
                    + node.metadata.context_type.len()
                    + node.metadata.pattern_id.as_ref().map_or(0, |p| p.len())
                    + std::mem::size_of::<HnswNode>()
                    + 64 // node table overhead
            })
            .sum::<usize>()
            + self.fingerprints.len() * 24
    }

    /// Check every structural invariant.
    ///
    /// Degree bound, hierarchical inclusion (no link to a node absent from
    /// the layer), no dangling or self links, entry-point validity and
    /// fingerprint index consistency.
    pub fn verify_integrity(&self) -> Result<(), String> {
        for (&id, node) in &self.nodes {
            if node.vector.len() != self.params.dimension {
                return Err(format!("node {} has wrong dimension", id));
            }
            for (layer, list) in node.neighbors.iter().enumerate() {
                let cap = self.params.degree_cap(layer);
                if list.len() > cap {
                    return Err(format!(
                        "node {} layer {} has {} neighbors, cap {}",
                        id,
                        layer,
                        list.len(),
                        cap
                    ));
                }
                for neighbor in list {
                    if *neighbor == id {
                        return Err(format!("node {} links itself on layer {}", id, layer));
                    }
                    match self.nodes.get(neighbor) {
                        None => {
                            return Err(format!("node {} links missing {}", id, neighbor))
                        }
                        Some(n) if n.level() < layer => {
                            return Err(format!(
                                "node {} links {} on layer {} above its level {}",
                                id,
                                neighbor,
                                layer,
                                n.level()
                            ))
                        }
                        Some(_) => {}
                    }
                }
            }
        }

        match self.entry_point {
            None if self.nodes.is_empty() => {}
            None => return Err("non-empty graph without entry point".to_string()),
            Some(ep) => match self.nodes.get(&ep) {
                None => return Err(format!("entry point {} is not live", ep)),
                Some(n) if n.level() != self.max_level => {
                    return Err(format!(
                        "entry point level {} != max level {}",
                        n.level(),
                        self.max_level
                    ))
                }
                Some(_) => {}
            },
        }
        if self.nodes.values().any(|n| n.level() > self.max_level) {
            return Err("node above max level".to_string());
        }

        for (fp, id) in &self.fingerprints {
            match self.nodes.get(id) {
                Some(n) if n.metadata.fingerprint == Some(*fp) => {}
                _ => return Err(format!("fingerprint {:#x} maps to stale node {}", fp, id)),
            }
        }
        for (id, node) in &self.nodes {
            if let Some(fp) = node.metadata.fingerprint {
                if self.fingerprints.get(&fp) != Some(id) {
                    return Err(format!("node {} carries unindexed fingerprint {:#x}", id, fp));
                }
            }
        }

        Ok(())
    }
}

/// SplitMix64 hash function for deterministic PRNG
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e3779b97f4a7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d049bb133111eb);
    x ^ (x >> 31)
}
