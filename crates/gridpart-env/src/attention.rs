//! Attention-to-node embedding augmentation.
//!
//! The graph encoder exports edge-level attention scores keyed by the
//! textual form of the edge type. This module fuses those scores into
//! the static node features: for every node, the mean attention it
//! receives over its incoming edges becomes one extra feature column
//! appended to the raw embedding.
//!
//! Encoder exports are treated as untrusted: keys may be mangled, heads
//! may or may not be collapsed, tensors may be misaligned or non-finite.
//! Every anomaly degrades to "no contribution" and is logged; nothing in
//! this module returns an error.

use std::collections::BTreeMap;

use faer::Mat;
use tracing::{debug, warn};

use gridpart_core::sanitize::{sanitize_mat, sanitize_slice};
use gridpart_core::state::EmbeddingTable;
use gridpart_core::topology::{EdgeTypeKey, GridTopology};

/// Stored key that matches any edge type, used by encoders that could
/// not recover the typed key for an attention tensor.
pub const CATCH_ALL_KEY: &str = "unknown_edge_type";

/// Which lookup strategy produced a match, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMatch {
    /// Stored key equals the composed `src__relation__dst` form
    Exact,
    /// Stored key textually contains all three key tokens
    Partial,
    /// Designated catch-all entry
    CatchAll,
}

/// Edge-level attention scores as exported by the encoder.
///
/// Keys are kept verbatim (they come from an external tool); lookup is
/// typed, going through the ordered strategy list exact -> partial ->
/// catch-all. Each tensor is edges x heads; a single-head export is a
/// one-column matrix.
#[derive(Debug, Clone, Default)]
pub struct AttentionTable {
    entries: BTreeMap<String, Mat<f64>>,
}

impl AttentionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, scores: Mat<f64>) {
        self.entries.insert(key.into(), scores);
    }

    /// Convenience for single-head score vectors.
    pub fn insert_single_head(&mut self, key: impl Into<String>, scores: &[f64]) {
        let mut mat = Mat::zeros(scores.len(), 1);
        for (i, &s) in scores.iter().enumerate() {
            mat.write(i, 0, s);
        }
        self.insert(key, mat);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Resolve the tensor for an edge type, trying exact, then partial,
    /// then catch-all matching. Returns the strategy that fired so the
    /// precedence is observable in diagnostics and tests.
    pub fn lookup(&self, key: &EdgeTypeKey) -> Option<(&Mat<f64>, KeyMatch)> {
        if let Some(mat) = self.entries.get(&key.composed()) {
            return Some((mat, KeyMatch::Exact));
        }
        for (stored, mat) in &self.entries {
            if stored.contains(&key.src) && stored.contains(&key.relation) && stored.contains(&key.dst)
            {
                return Some((mat, KeyMatch::Partial));
            }
        }
        for (stored, mat) in &self.entries {
            if stored.contains(CATCH_ALL_KEY) {
                return Some((mat, KeyMatch::CatchAll));
            }
        }
        None
    }
}

/// Collapse a (edges x heads) tensor to one score per edge by averaging
/// across heads. A single column is passed through.
fn collapse_heads(scores: &Mat<f64>) -> Vec<f64> {
    let heads = scores.ncols().max(1);
    (0..scores.nrows())
        .map(|i| {
            let mut sum = 0.0;
            for h in 0..scores.ncols() {
                sum += scores.read(i, h);
            }
            sum / heads as f64
        })
        .collect()
}

/// Mean received attention per node, keyed by node type. Only node types
/// that actually received at least one edge contribution appear.
pub fn aggregate_attention(
    topology: &GridTopology,
    attention: &AttentionTable,
) -> BTreeMap<String, Vec<f64>> {
    let mut accumulator: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    let mut degree: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for node_type in topology.node_types() {
        let count = topology.node_count(node_type).unwrap_or(0);
        accumulator.insert(node_type.to_string(), vec![0.0; count]);
        degree.insert(node_type.to_string(), vec![0.0; count]);
    }

    for list in topology.edge_lists() {
        let Some((tensor, strategy)) = attention.lookup(&list.key) else {
            debug!(edge_type = %list.key, "no attention entry for edge type, skipping");
            continue;
        };
        debug!(edge_type = %list.key, ?strategy, "matched attention entry");

        let mut scores = collapse_heads(tensor);
        if sanitize_slice(&mut scores) {
            warn!(edge_type = %list.key, "non-finite attention scores scrubbed");
        }

        if scores.len() != list.num_edges() {
            warn!(
                edge_type = %list.key,
                scores = scores.len(),
                edges = list.num_edges(),
                "attention tensor does not match edge count, dropping contribution"
            );
            continue;
        }

        let Some(acc) = accumulator.get_mut(&list.key.dst) else {
            warn!(edge_type = %list.key, "destination type missing from topology, dropping contribution");
            continue;
        };
        let deg = degree.entry(list.key.dst.clone()).or_default();
        for (&(_, dst_local), &score) in list.endpoints.iter().zip(scores.iter()) {
            acc[dst_local] += score;
            deg[dst_local] += 1.0;
        }
    }

    // Keep only node types that received something; per-node mean, zero
    // where the node itself has no scored incoming edges.
    let mut result = BTreeMap::new();
    for (node_type, acc) in accumulator {
        let deg = &degree[&node_type];
        if deg.iter().all(|&d| d == 0.0) {
            continue;
        }
        let means = acc
            .iter()
            .zip(deg.iter())
            .map(|(&a, &d)| if d > 0.0 { a / d } else { 0.0 })
            .collect();
        result.insert(node_type, means);
    }
    result
}

/// Produce the augmented embedding table: raw embeddings with the mean
/// received-attention column appended for node types that received any
/// attention; other node types keep their raw embedding.
///
/// All inputs are sanitized on the way in and the concatenated output is
/// sanitized again, so the returned table is always finite. If no edge
/// type contributed (empty table, unmatched keys, or every tensor
/// malformed) the raw table is returned unchanged apart from sanitation.
pub fn augment_embeddings(
    topology: &GridTopology,
    mut raw: EmbeddingTable,
    attention: &AttentionTable,
) -> EmbeddingTable {
    for (node_type, mat) in raw.iter_mut() {
        if sanitize_mat(mat) {
            warn!(node_type = %node_type, "non-finite raw embedding values scrubbed");
        }
    }

    let scores = aggregate_attention(topology, attention);
    if scores.is_empty() {
        debug!("no attention available for any edge type, keeping raw embeddings");
        return raw;
    }

    let mut augmented = EmbeddingTable::new();
    for (node_type, mat) in raw {
        let Some(column) = scores.get(&node_type) else {
            augmented.insert(node_type, mat);
            continue;
        };

        let n = mat.nrows();
        let d = mat.ncols();
        let mut out = Mat::zeros(n, d + 1);
        for i in 0..n {
            for j in 0..d {
                out.write(i, j, mat.read(i, j));
            }
            out.write(i, d, column.get(i).copied().unwrap_or(0.0));
        }
        if sanitize_mat(&mut out) {
            warn!(node_type = %node_type, "non-finite augmented embedding values scrubbed");
        }
        augmented.insert(node_type, out);
    }
    augmented
}
