//! Core types for the facial-state pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: landmark sets, region maps, difference results, classification
//! results and the final analysis outcome.

use crate::error::AnalysisError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A 2D landmark coordinate in image pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl std::ops::Add for Point {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Mul<f64> for Point {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self::Output {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}

/// Ordered landmark positions for one face.
///
/// Index `i` denotes the same anatomical point in every set produced by the
/// same extractor, so two sets are only comparable when their lengths match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkSet {
    pub points: Vec<Point>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Build a set from `(x, y)` tuples.
    pub fn from_xy(coords: &[(f64, f64)]) -> Self {
        Self {
            points: coords.iter().map(|&(x, y)| Point::new(x, y)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Point> {
        self.points.iter()
    }

    /// Return a copy with every coordinate multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            points: self.points.iter().map(|&p| p * factor).collect(),
        }
    }
}

impl std::ops::Index<usize> for LandmarkSet {
    type Output = Point;

    fn index(&self, idx: usize) -> &Self::Output {
        &self.points[idx]
    }
}

impl std::ops::IndexMut<usize> for LandmarkSet {
    fn index_mut(&mut self, idx: usize) -> &mut Self::Output {
        &mut self.points[idx]
    }
}

/// Axis-aligned bounds of a landmark set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl BoundingBox {
    pub const fn new(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    /// Euclidean length of the box diagonal
    pub fn diagonal(&self) -> f64 {
        let w = self.width();
        let h = self.height();
        (w * w + h * h).sqrt()
    }
}

/// Anatomical landmark grouping used by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Mouth,
    Eyes,
    Brows,
}

impl Region {
    /// All regions in classifier order
    pub const ALL: [Region; 3] = [Region::Mouth, Region::Eyes, Region::Brows];

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Mouth => "mouth",
            Region::Eyes => "eyes",
            Region::Brows => "brows",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mapping from region to the landmark indices it contains.
///
/// Regions are disjoint. Every region key is always present, possibly with an
/// empty index list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionMap {
    regions: BTreeMap<Region, Vec<usize>>,
}

impl RegionMap {
    pub fn new(mouth: Vec<usize>, eyes: Vec<usize>, brows: Vec<usize>) -> Self {
        let mut regions = BTreeMap::new();
        regions.insert(Region::Mouth, mouth);
        regions.insert(Region::Eyes, eyes);
        regions.insert(Region::Brows, brows);
        Self { regions }
    }

    pub fn indices(&self, region: Region) -> &[usize] {
        self.regions.get(&region).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn size(&self, region: Region) -> usize {
        self.indices(region).len()
    }

    pub fn contains(&self, region: Region, index: usize) -> bool {
        self.indices(region).contains(&index)
    }

    /// Region the index belongs to, if any
    pub fn region_of(&self, index: usize) -> Option<Region> {
        Region::ALL
            .into_iter()
            .find(|&region| self.contains(region, index))
    }

    /// Count of set entries of `binary` inside each region.
    ///
    /// Indices beyond the end of `binary` count as unchanged.
    pub fn count_changed(&self, binary: &[u8]) -> BTreeMap<Region, usize> {
        Region::ALL
            .into_iter()
            .map(|region| {
                let count = self
                    .indices(region)
                    .iter()
                    .filter(|&&i| binary.get(i).copied() == Some(1))
                    .count();
                (region, count)
            })
            .collect()
    }

    pub fn sizes(&self) -> BTreeMap<Region, usize> {
        Region::ALL
            .into_iter()
            .map(|region| (region, self.size(region)))
            .collect()
    }
}

/// Node of a change graph: a landmark that moved past the threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: usize,
    /// Displacement magnitude of the landmark
    pub change: f64,
}

/// Directed weighted edge between two changed landmarks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: usize,
    pub target: usize,
    /// Target-pose Euclidean distance between the two landmarks (pixels)
    pub weight: f64,
}

/// Adjacency among changed landmarks that lie close together in the target pose.
///
/// Serializes directly to the `{nodes, edges}` graph document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeGraph {
    /// Nodes sorted by id
    pub nodes: Vec<GraphNode>,
    /// Each undirected proximity pair appears once per direction
    pub edges: Vec<GraphEdge>,
}

impl ChangeGraph {
    pub fn node_ids(&self) -> Vec<usize> {
        self.nodes.iter().map(|n| n.id).collect()
    }

    pub fn contains_node(&self, id: usize) -> bool {
        self.nodes.binary_search_by_key(&id, |n| n.id).is_ok()
    }

    pub fn has_edge(&self, source: usize, target: usize) -> bool {
        self.edges
            .iter()
            .any(|e| e.source == source && e.target == target)
    }

    /// Outgoing neighbours of `id`
    pub fn neighbors(&self, id: usize) -> Vec<usize> {
        self.edges
            .iter()
            .filter(|e| e.source == id)
            .map(|e| e.target)
            .collect()
    }
}

/// Binary and magnitude vectors as written to `diff_*_meta.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffMeta {
    pub binary: Vec<u8>,
    pub difs: Vec<f64>,
}

/// A `diff_*_meta.json` file as read back from disk.
///
/// `binary` is kept as raw JSON so that out-of-alphabet entries reach the
/// vector decision instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDiffMeta {
    pub binary: Vec<Value>,
    #[serde(default)]
    pub difs: Vec<f64>,
}

impl RawDiffMeta {
    /// Check every entry of `binary` is 0 or 1
    pub fn into_meta(self) -> Result<DiffMeta, AnalysisError> {
        let binary = self
            .binary
            .iter()
            .enumerate()
            .map(|(index, v)| match v.as_f64() {
                Some(x) if x == 0.0 || x == 1.0 => Ok(x as u8),
                other => Err(AnalysisError::InvalidSymbol {
                    index,
                    value: other.unwrap_or(f64::NAN),
                }),
            })
            .collect::<Result<Vec<u8>, _>>()?;
        Ok(DiffMeta {
            binary,
            difs: self.difs,
        })
    }
}

/// Output of the difference engine for one (neutral, target) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferenceResult {
    /// Per-landmark displacement, normalized by face scale unless `normalized` is false
    pub displacements: Vec<f64>,
    /// 1 where the displacement reached the threshold, 0 otherwise
    pub changed: Vec<u8>,
    pub graph: ChangeGraph,
    /// Face scale of the neutral landmarks
    pub scale: f64,
    /// Threshold actually applied, after any pixel-to-fraction conversion
    pub threshold: f64,
    pub normalized: bool,
}

impl DifferenceResult {
    pub fn changed_indices(&self) -> Vec<usize> {
        self.changed
            .iter()
            .enumerate()
            .filter(|(_, &c)| c == 1)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn total_changed(&self) -> usize {
        self.changed.iter().filter(|&&c| c == 1).count()
    }

    pub fn diff_meta(&self) -> DiffMeta {
        DiffMeta {
            binary: self.changed.clone(),
            difs: self.displacements.clone(),
        }
    }
}

/// Human-readable summary of a difference result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub total_changed: usize,
    pub changed_indices: Vec<usize>,
    /// `(index, magnitude)` pairs, largest first, zero magnitudes omitted
    pub top_changes: Vec<(usize, f64)>,
    pub region_counts: BTreeMap<Region, usize>,
}

/// Coarse emotion label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Happy,
    Sad,
    Neutral,
    Reject,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Happy => "happy",
            Label::Sad => "sad",
            Label::Neutral => "neutral",
            Label::Reject => "reject",
        }
    }

    /// Numeric code used in the automaton table
    pub fn code(&self) -> f64 {
        match self {
            Label::Happy => 1.0,
            Label::Sad => 0.0,
            Label::Neutral => 0.5,
            Label::Reject => -1.0,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a comparison ended in a reject without being classified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    NoFace,
    LandmarkCountMismatch,
    InvalidSymbols,
    FileNotReadable,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::NoFace => "no_face",
            RejectReason::LandmarkCountMismatch => "landmark_count_mismatch",
            RejectReason::InvalidSymbols => "invalid_symbols",
            RejectReason::FileNotReadable => "file_not_readable",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Changed counts and sizes per region
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionStats {
    pub counts: BTreeMap<Region, usize>,
    pub sizes: BTreeMap<Region, usize>,
}

impl RegionStats {
    pub fn new(counts: BTreeMap<Region, usize>, sizes: BTreeMap<Region, usize>) -> Self {
        Self { counts, sizes }
    }

    /// Derive stats by counting `binary` over each region of `regions`
    pub fn from_vector(binary: &[u8], regions: &RegionMap) -> Self {
        Self {
            counts: regions.count_changed(binary),
            sizes: regions.sizes(),
        }
    }

    pub fn count(&self, region: Region) -> usize {
        self.counts.get(&region).copied().unwrap_or(0)
    }

    pub fn size(&self, region: Region) -> usize {
        self.sizes.get(&region).copied().unwrap_or(0)
    }

    /// Changed fraction of a region; an empty region divides by one
    pub fn proportion(&self, region: Region) -> f64 {
        self.count(region) as f64 / self.size(region).max(1) as f64
    }

    pub fn total_changed(&self) -> usize {
        Region::ALL.iter().map(|&r| self.count(r)).sum()
    }

    pub fn total_size(&self) -> usize {
        Region::ALL.iter().map(|&r| self.size(r)).sum()
    }
}

/// Everything the region classifier can use.
///
/// Region stats are mandatory; the full binary vector, displacement magnitudes
/// and mouth indices enable the secondary rules when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassifierInput {
    pub stats: RegionStats,
    pub binary: Option<Vec<u8>>,
    pub displacements: Option<Vec<f64>>,
    pub mouth_indices: Option<Vec<usize>>,
}

impl ClassifierInput {
    pub fn from_stats(stats: RegionStats) -> Self {
        Self {
            stats,
            ..Default::default()
        }
    }

    /// Counts derived from a binary vector; the vector is retained for the
    /// noise-floor rule.
    pub fn from_vector(binary: &[u8], regions: &RegionMap) -> Self {
        Self {
            stats: RegionStats::from_vector(binary, regions),
            binary: Some(binary.to_vec()),
            displacements: None,
            mouth_indices: Some(regions.indices(Region::Mouth).to_vec()),
        }
    }

    pub fn with_binary(mut self, binary: Vec<u8>) -> Self {
        self.binary = Some(binary);
        self
    }

    pub fn with_displacements(mut self, displacements: Vec<f64>, regions: &RegionMap) -> Self {
        self.displacements = Some(displacements);
        self.mouth_indices = Some(regions.indices(Region::Mouth).to_vec());
        self
    }
}

/// Classification of one (neutral, target) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: Label,
    #[serde(rename = "binary")]
    pub changed: Vec<u8>,
    #[serde(rename = "difs")]
    pub displacements: Vec<f64>,
    pub counts: BTreeMap<Region, usize>,
    pub sizes: BTreeMap<Region, usize>,
}

/// Classified pair plus the change graph it was derived from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairAnalysis {
    #[serde(flatten)]
    pub result: ClassificationResult,
    pub diff_graph: ChangeGraph,
}

/// Pair that could not be classified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub label: Label,
    pub reason: RejectReason,
    pub detail: String,
}

impl Rejection {
    pub fn new(reason: RejectReason, detail: impl Into<String>) -> Self {
        Self {
            label: Label::Reject,
            reason,
            detail: detail.into(),
        }
    }
}

/// Final outcome of comparing two faces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalysisOutcome {
    Classified(Box<PairAnalysis>),
    Rejected(Rejection),
}

impl AnalysisOutcome {
    pub fn rejected(reason: RejectReason, detail: impl Into<String>) -> Self {
        AnalysisOutcome::Rejected(Rejection::new(reason, detail))
    }

    pub fn label(&self) -> Label {
        match self {
            AnalysisOutcome::Classified(pair) => pair.result.label,
            AnalysisOutcome::Rejected(r) => r.label,
        }
    }

    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            AnalysisOutcome::Classified(_) => None,
            AnalysisOutcome::Rejected(r) => Some(r.reason),
        }
    }

    pub fn classification(&self) -> Option<&ClassificationResult> {
        match self {
            AnalysisOutcome::Classified(pair) => Some(&pair.result),
            AnalysisOutcome::Rejected(_) => None,
        }
    }

    pub fn graph(&self) -> Option<&ChangeGraph> {
        match self {
            AnalysisOutcome::Classified(pair) => Some(&pair.diff_graph),
            AnalysisOutcome::Rejected(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance(&b) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_bbox_diagonal() {
        let bbox = BoundingBox::new(10.0, 20.0, 40.0, 60.0);
        assert_eq!(bbox.width(), 30.0);
        assert_eq!(bbox.height(), 40.0);
        assert!((bbox.diagonal() - 50.0).abs() < 1e-12);
    }

    #[test]
    fn test_region_map_lookup() {
        let regions = RegionMap::new(vec![4, 5], vec![2, 3], vec![0, 1]);
        assert_eq!(regions.region_of(5), Some(Region::Mouth));
        assert_eq!(regions.region_of(0), Some(Region::Brows));
        assert_eq!(regions.region_of(9), None);

        let counts = regions.count_changed(&[1, 0, 0, 0, 1, 1]);
        assert_eq!(counts[&Region::Mouth], 2);
        assert_eq!(counts[&Region::Eyes], 0);
        assert_eq!(counts[&Region::Brows], 1);
    }

    #[test]
    fn test_region_map_serializes_lowercase_keys() {
        let regions = RegionMap::new(vec![2], vec![1], vec![0]);
        let json = serde_json::to_value(&regions).unwrap();
        assert_eq!(json["mouth"], serde_json::json!([2]));
        assert_eq!(json["brows"], serde_json::json!([0]));
    }

    #[test]
    fn test_proportion_of_empty_region() {
        let stats = RegionStats::default();
        assert_eq!(stats.proportion(Region::Eyes), 0.0);
    }

    #[test]
    fn test_label_codes() {
        assert_eq!(Label::Happy.code(), 1.0);
        assert_eq!(Label::Sad.code(), 0.0);
        assert_eq!(Label::Neutral.code(), 0.5);
        assert_eq!(Label::Reject.code(), -1.0);
    }

    #[test]
    fn test_rejected_outcome_json() {
        let outcome = AnalysisOutcome::rejected(RejectReason::NoFace, "neutral image");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["label"], "reject");
        assert_eq!(json["reason"], "no_face");

        let back: AnalysisOutcome = serde_json::from_value(json).unwrap();
        assert_eq!(back, outcome);
    }
}
