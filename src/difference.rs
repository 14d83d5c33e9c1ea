//! Difference engine
//!
//! This module compares two aligned landmark sets:
//! - Per-landmark displacement, normalized by face scale
//! - Thresholding into a binary change vector
//! - Proximity graph among changed landmarks in the target pose

use crate::error::AnalysisError;
use crate::geometry::{bounding_box, face_scale, SCALE_EPSILON};
use crate::types::{
    ChangeGraph, DiffMeta, DiffSummary, DifferenceResult, GraphEdge, GraphNode, LandmarkSet,
    RegionMap,
};

/// Proximity limit for graph edges in normalized mode, as a fraction of face scale
pub const PROXIMITY_SCALE_FRACTION: f64 = 0.15;

/// Proximity limit for graph edges in raw pixel mode
pub const PROXIMITY_PIXELS: f64 = 50.0;

/// Default number of entries in a diff summary's top changes
pub const DEFAULT_SUMMARY_TOP_K: usize = 8;

/// Compare `neutral` against `target`.
///
/// With `normalize`, a threshold <= 1.0 is a fraction of face scale and a
/// larger one is taken as pixels and converted. Without it, displacements and
/// threshold are both raw pixels.
pub fn difference(
    neutral: &LandmarkSet,
    target: &LandmarkSet,
    threshold: f64,
    normalize: bool,
) -> Result<DifferenceResult, AnalysisError> {
    if neutral.len() != target.len() {
        return Err(AnalysisError::ShapeMismatch {
            neutral: neutral.len(),
            target: target.len(),
        });
    }

    let scale = face_scale(&bounding_box(neutral)?);

    let (applied_threshold, divisor) = if normalize {
        let fraction = if threshold > 1.0 {
            threshold / (scale + SCALE_EPSILON)
        } else {
            threshold
        };
        (fraction, scale + SCALE_EPSILON)
    } else {
        (threshold, 1.0)
    };

    let displacements: Vec<f64> = neutral
        .iter()
        .zip(target.iter())
        .map(|(n, t)| n.distance(t) / divisor)
        .collect();

    let changed: Vec<u8> = displacements
        .iter()
        .map(|&d| u8::from(d >= applied_threshold))
        .collect();

    let proximity_limit = if normalize {
        PROXIMITY_SCALE_FRACTION * scale
    } else {
        PROXIMITY_PIXELS
    };
    let graph = build_change_graph(target, &changed, &displacements, proximity_limit);

    tracing::debug!(
        landmarks = neutral.len(),
        scale,
        threshold = applied_threshold,
        changed = graph.nodes.len(),
        edges = graph.edges.len(),
        "computed landmark difference"
    );

    Ok(DifferenceResult {
        displacements,
        changed,
        graph,
        scale,
        threshold: applied_threshold,
        normalized: normalize,
    })
}

/// Connect every pair of changed landmarks closer than `limit` in the target pose
fn build_change_graph(
    target: &LandmarkSet,
    changed: &[u8],
    displacements: &[f64],
    limit: f64,
) -> ChangeGraph {
    let nodes: Vec<GraphNode> = changed
        .iter()
        .enumerate()
        .filter(|(_, &c)| c == 1)
        .map(|(id, _)| GraphNode {
            id,
            change: displacements[id],
        })
        .collect();

    let mut edges = Vec::new();
    for (k, a) in nodes.iter().enumerate() {
        for b in &nodes[k + 1..] {
            let dist = target[a.id].distance(&target[b.id]);
            if dist < limit {
                edges.push(GraphEdge {
                    source: a.id,
                    target: b.id,
                    weight: dist,
                });
                edges.push(GraphEdge {
                    source: b.id,
                    target: a.id,
                    weight: dist,
                });
            }
        }
    }

    ChangeGraph { nodes, edges }
}

/// Indices of the `k` largest displacements, largest first. Ties keep the
/// lower index first.
pub fn top_k_indices(displacements: &[f64], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..displacements.len()).collect();
    order.sort_by(|&a, &b| displacements[b].total_cmp(&displacements[a]).then(a.cmp(&b)));
    order.truncate(k);
    order
}

/// Summarize a difference result against a region map
pub fn summarize(result: &DifferenceResult, regions: &RegionMap, top_k: usize) -> DiffSummary {
    summarize_vectors(&result.changed, &result.displacements, regions, top_k)
}

/// Summarize vectors read back from a `diff_*_meta.json` file
pub fn summarize_meta(meta: &DiffMeta, regions: &RegionMap, top_k: usize) -> DiffSummary {
    summarize_vectors(&meta.binary, &meta.difs, regions, top_k)
}

fn summarize_vectors(
    changed: &[u8],
    displacements: &[f64],
    regions: &RegionMap,
    top_k: usize,
) -> DiffSummary {
    let top_changes = top_k_indices(displacements, top_k)
        .into_iter()
        .filter(|&i| displacements[i] > 0.0)
        .map(|i| (i, displacements[i]))
        .collect();

    let changed_indices: Vec<usize> = changed
        .iter()
        .enumerate()
        .filter(|(_, &c)| c == 1)
        .map(|(i, _)| i)
        .collect();

    DiffSummary {
        total_changed: changed_indices.len(),
        changed_indices,
        top_changes,
        region_counts: regions.count_changed(changed),
    }
}
