//! Pipeline orchestration
//!
//! This module provides the public API for facial-state.
//! It runs a (neutral, target) pair from landmark extraction to a label:
//!
//! 1. LandmarkExtractor - Locate the face and its landmarks
//! 2. map_regions - Partition neutral landmarks into mouth, eyes and brows
//! 3. difference - Per-landmark displacement, changed vector, change graph
//! 4. RegionClassifier - Region proportions to a label
//!
//! Failures the caller cannot fix per pair (no face, count mismatch, unreadable
//! input) come back as `Rejected` outcomes rather than errors.

use crate::automaton::{decision_machine, AutomatonTable, TransitionLabels, TuringMachineDocument};
use crate::classifier::RegionClassifier;
use crate::config::PipelineConfig;
use crate::difference::difference;
use crate::error::AnalysisError;
use crate::extractor::LandmarkExtractor;
use crate::geometry::map_regions;
use crate::types::{
    AnalysisOutcome, ChangeGraph, ClassificationResult, ClassifierInput, DiffMeta,
    DifferenceResult, LandmarkSet, PairAnalysis, Region, RejectReason,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Changed vector and graph of one transition in a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionDiff {
    pub meta: DiffMeta,
    pub graph: ChangeGraph,
}

impl From<DifferenceResult> for TransitionDiff {
    fn from(result: DifferenceResult) -> Self {
        Self {
            meta: DiffMeta {
                binary: result.changed,
                difs: result.displacements,
            },
            graph: result.graph,
        }
    }
}

/// Everything derived from one (neutral, sad, happy) triple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub threshold: f64,
    pub landmark_count: usize,
    pub diff_neutral_sad: TransitionDiff,
    pub diff_neutral_happy: TransitionDiff,
    pub automaton: AutomatonTable,
    pub turing_machine: TuringMachineDocument,
}

/// Short description of a report, written next to the artifacts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub producer: String,
    pub version: String,
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub threshold: f64,
    pub landmark_count: usize,
    pub decisions: TransitionLabels,
    pub sad_changed: usize,
    pub happy_changed: usize,
}

impl ExpressionReport {
    pub fn summary(&self) -> ReportSummary {
        let ones = |diff: &TransitionDiff| diff.meta.binary.iter().filter(|&&b| b == 1).count();
        ReportSummary {
            producer: crate::PRODUCER_NAME.to_string(),
            version: crate::VERSION.to_string(),
            run_id: self.run_id,
            generated_at: self.generated_at,
            threshold: self.threshold,
            landmark_count: self.landmark_count,
            decisions: self.automaton.labels(),
            sad_changed: ones(&self.diff_neutral_sad),
            happy_changed: ones(&self.diff_neutral_happy),
        }
    }
}

/// Compares faces with a fixed extractor and configuration.
pub struct FacialStatePipeline<E> {
    extractor: E,
    config: PipelineConfig,
    classifier: RegionClassifier,
}

impl<E: LandmarkExtractor> FacialStatePipeline<E> {
    /// Create a pipeline with default settings
    pub fn new(extractor: E) -> Self {
        Self {
            extractor,
            config: PipelineConfig::default(),
            classifier: RegionClassifier::default(),
        }
    }

    /// Create a pipeline with a validated configuration
    pub fn with_config(extractor: E, config: PipelineConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        Ok(Self {
            extractor,
            config,
            classifier: RegionClassifier::new(config.classifier),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Extract both faces and compare them
    pub fn analyze(&self, neutral: &E::Image, target: &E::Image) -> AnalysisOutcome {
        let neutral = match self.extract_or_reject("neutral", neutral) {
            Ok(landmarks) => landmarks,
            Err(outcome) => return outcome,
        };
        let target = match self.extract_or_reject("target", target) {
            Ok(landmarks) => landmarks,
            Err(outcome) => return outcome,
        };
        self.analyze_landmarks(&neutral, &target)
    }

    /// Compare two landmark sets that are already extracted
    pub fn analyze_landmarks(&self, neutral: &LandmarkSet, target: &LandmarkSet) -> AnalysisOutcome {
        if neutral.len() != target.len() {
            return reject(
                RejectReason::LandmarkCountMismatch,
                format!("neutral has {} landmarks, target has {}", neutral.len(), target.len()),
            );
        }
        if neutral.is_empty() {
            return reject(RejectReason::NoFace, "no landmarks");
        }

        let regions = match map_regions(neutral, None, self.config.banding) {
            Ok(regions) => regions,
            Err(e) => return reject_error(e),
        };
        tracing::debug!(
            mouth = regions.indices(Region::Mouth).len(),
            eyes = regions.indices(Region::Eyes).len(),
            brows = regions.indices(Region::Brows).len(),
            "mapped regions"
        );

        let diff = match difference(neutral, target, self.config.threshold, true) {
            Ok(diff) => diff,
            Err(e) => return reject_error(e),
        };

        let input = ClassifierInput::from_vector(&diff.changed, &regions)
            .with_displacements(diff.displacements.clone(), &regions);
        let label = self.classifier.classify(&input);
        tracing::info!(%label, changed = diff.total_changed(), "classified face pair");

        AnalysisOutcome::Classified(Box::new(PairAnalysis {
            result: ClassificationResult {
                label,
                changed: diff.changed,
                displacements: diff.displacements,
                counts: input.stats.counts,
                sizes: input.stats.sizes,
            },
            diff_graph: diff.graph,
        }))
    }

    /// Build the automaton and decision machine for a (neutral, sad, happy) triple.
    ///
    /// A missing face is an error naming the image role.
    pub fn generate_report(
        &self,
        neutral: &E::Image,
        sad: &E::Image,
        happy: &E::Image,
    ) -> Result<ExpressionReport, AnalysisError> {
        let neutral = self.extract_required("neutral", neutral)?;
        let sad = self.extract_required("sad", sad)?;
        let happy = self.extract_required("happy", happy)?;

        let threshold = self.config.threshold;
        let sad_diff = difference(&neutral, &sad, threshold, true)?;
        let happy_diff = difference(&neutral, &happy, threshold, true)?;

        let automaton = AutomatonTable::from_vectors(&sad_diff.changed, &happy_diff.changed, threshold);
        let labels = automaton.labels();
        let machine = decision_machine(labels)?;
        let turing_machine = TuringMachineDocument::new(&machine, labels, threshold);

        tracing::info!(sad = %labels.sad, happy = %labels.happy, "generated expression report");

        Ok(ExpressionReport {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            threshold,
            landmark_count: neutral.len(),
            diff_neutral_sad: sad_diff.into(),
            diff_neutral_happy: happy_diff.into(),
            automaton,
            turing_machine,
        })
    }

    fn extract_or_reject(&self, role: &str, image: &E::Image) -> Result<LandmarkSet, AnalysisOutcome> {
        match self.extractor.extract(image) {
            Ok(Some(landmarks)) => Ok(landmarks),
            Ok(None) => Err(reject(RejectReason::NoFace, format!("no face in {role} image"))),
            Err(e) => Err(reject(RejectReason::FileNotReadable, format!("{role}: {e}"))),
        }
    }

    fn extract_required(&self, role: &str, image: &E::Image) -> Result<LandmarkSet, AnalysisError> {
        self.extractor
            .extract(image)?
            .ok_or_else(|| AnalysisError::NoFaceDetected(role.to_string()))
    }
}

fn reject(reason: RejectReason, detail: impl Into<String>) -> AnalysisOutcome {
    let detail = detail.into();
    tracing::warn!(%reason, %detail, "rejected face pair");
    AnalysisOutcome::rejected(reason, detail)
}

fn reject_error(err: AnalysisError) -> AnalysisOutcome {
    let reason = match err {
        AnalysisError::ShapeMismatch { .. } => RejectReason::LandmarkCountMismatch,
        AnalysisError::FileNotReadable(_) => RejectReason::FileNotReadable,
        AnalysisError::InvalidSymbol { .. } => RejectReason::InvalidSymbols,
        AnalysisError::NoFaceDetected(_) | AnalysisError::EmptyLandmarks => RejectReason::NoFace,
        AnalysisError::ParseError(_) | AnalysisError::JsonError(_) => RejectReason::FileNotReadable,
        // not produced by region mapping or the difference engine
        AnalysisError::InvalidConfig(_) | AnalysisError::MachineError(_) => RejectReason::NoFace,
    };
    reject(reason, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{LandmarkFileExtractor, StaticExtractor};
    use crate::types::{Label, Point, RegionMap};
    use pretty_assertions::assert_eq;
    use std::path::Path;

    /// 20 colinear points spanning a 95 x 171 box (face scale ~195.6)
    fn line_face() -> LandmarkSet {
        LandmarkSet::new((0..20).map(|i| Point::new(i as f64 * 5.0, i as f64 * 9.0)).collect())
    }

    fn shifted(base: &LandmarkSet, indices: impl IntoIterator<Item = usize>) -> LandmarkSet {
        let mut out = base.clone();
        for i in indices {
            out[i] = out[i] + Point::new(0.0, 30.0);
        }
        out
    }

    fn pipeline() -> FacialStatePipeline<StaticExtractor> {
        FacialStatePipeline::new(StaticExtractor)
    }

    #[test]
    fn test_end_to_end_line_face() {
        let neutral = line_face();
        let target = shifted(&neutral, 15..20);

        let outcome = pipeline().analyze(&Some(neutral), &Some(target));
        let result = outcome.classification().unwrap();

        let expected: Vec<u8> = (0..20).map(|i| u8::from(i >= 15)).collect();
        assert_eq!(result.changed, expected);
        // lower-face banding puts indices 12..20 in the mouth
        assert_eq!(result.label, Label::Happy);

        let graph = outcome.graph().unwrap();
        assert_eq!(graph.node_ids(), vec![15, 16, 17, 18, 19]);
        assert!(graph.has_edge(15, 16) && graph.has_edge(16, 15));
        assert!(!graph.has_edge(15, 18));
    }

    #[test]
    fn test_end_to_end_with_mouth_region_map() {
        let neutral = line_face();
        let target = shifted(&neutral, 15..20);
        let diff = difference(&neutral, &target, 0.05, true).unwrap();

        let regions = RegionMap::new((15..20).collect(), (5..15).collect(), (0..5).collect());
        let input = ClassifierInput::from_vector(&diff.changed, &regions)
            .with_displacements(diff.displacements, &regions);
        assert_eq!(RegionClassifier::default().classify(&input), Label::Happy);
    }

    #[test]
    fn test_brow_movement_is_sad() {
        let neutral = line_face();
        let target = shifted(&neutral, 0..3);
        let outcome = pipeline().analyze_landmarks(&neutral, &target);
        assert_eq!(outcome.label(), Label::Sad);
    }

    #[test]
    fn test_no_movement_is_neutral() {
        let neutral = line_face();
        let outcome = pipeline().analyze_landmarks(&neutral, &neutral.clone());
        assert_eq!(outcome.label(), Label::Neutral);
        assert_eq!(outcome.classification().unwrap().changed, vec![0; 20]);
        assert!(outcome.graph().unwrap().nodes.is_empty());
    }

    #[test]
    fn test_68_point_layout_uses_fixed_table() {
        let neutral = LandmarkSet::new((0..68).map(|i| Point::new(i as f64, (i % 10) as f64 * 10.0)).collect());
        let target = shifted(&neutral, 48..56);

        let outcome = pipeline().analyze_landmarks(&neutral, &target);
        let result = outcome.classification().unwrap();
        assert_eq!(result.counts[&Region::Mouth], 8);
        assert_eq!(result.sizes[&Region::Mouth], 20);
        assert_eq!(result.label, Label::Happy);
    }

    #[test]
    fn test_count_mismatch_rejects() {
        let neutral = line_face();
        let target = LandmarkSet::new(neutral.points[..19].to_vec());
        let outcome = pipeline().analyze_landmarks(&neutral, &target);
        assert_eq!(outcome.label(), Label::Reject);
        assert_eq!(outcome.reject_reason(), Some(RejectReason::LandmarkCountMismatch));
    }

    #[test]
    fn test_missing_face_rejects() {
        let outcome = pipeline().analyze(&Some(line_face()), &None);
        assert_eq!(outcome.reject_reason(), Some(RejectReason::NoFace));

        let empty = LandmarkSet::default();
        let outcome = pipeline().analyze_landmarks(&empty, &empty);
        assert_eq!(outcome.reject_reason(), Some(RejectReason::NoFace));
    }

    #[test]
    fn test_unreadable_file_rejects() {
        let pipeline = FacialStatePipeline::new(LandmarkFileExtractor);
        let outcome = pipeline.analyze(
            Path::new("/nonexistent/neutral.json"),
            Path::new("/nonexistent/target.json"),
        );
        assert_eq!(outcome.reject_reason(), Some(RejectReason::FileNotReadable));
    }

    #[test]
    fn test_rejection_serializes_flat() {
        let outcome = pipeline().analyze(&None, &None);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["label"], "reject");
        assert_eq!(json["reason"], "no_face");
    }

    #[test]
    fn test_invalid_config_is_refused() {
        let config = PipelineConfig::default().with_threshold(-1.0);
        assert!(FacialStatePipeline::with_config(StaticExtractor, config).is_err());
    }

    #[test]
    fn test_pixel_threshold_from_config() {
        let neutral = line_face();
        let target = shifted(&neutral, 15..20);
        // 40 px exceeds the 30 px shift
        let config = PipelineConfig::default().with_threshold(40.0);
        let pipeline = FacialStatePipeline::with_config(StaticExtractor, config).unwrap();
        let outcome = pipeline.analyze_landmarks(&neutral, &target);
        assert_eq!(outcome.label(), Label::Neutral);
    }

    #[test]
    fn test_generate_report() {
        let neutral = line_face();
        let sad = shifted(&neutral, 0..3);
        let happy = shifted(&neutral, 8..20);

        let report = pipeline()
            .generate_report(&Some(neutral), &Some(sad), &Some(happy))
            .unwrap();

        assert_eq!(report.landmark_count, 20);
        assert_eq!(report.automaton.neutral_to_sad, Label::Sad.code());
        assert_eq!(report.automaton.neutral_to_happy, Label::Happy.code());

        let summary = report.summary();
        assert_eq!(summary.sad_changed, 3);
        assert_eq!(summary.happy_changed, 12);
        assert_eq!(summary.producer, "facial-state");

        let mut machine = report.turing_machine.to_machine().unwrap();
        assert!(machine.accepts("0", 10));
        assert!(machine.accepts("1", 10));
    }

    #[test]
    fn test_generate_report_names_missing_face() {
        let err = pipeline()
            .generate_report(&Some(line_face()), &None, &Some(line_face()))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::NoFaceDetected(ref role) if role == "sad"));
    }

    #[test]
    fn test_report_json_keys() {
        let neutral = line_face();
        let report = pipeline()
            .generate_report(&Some(neutral.clone()), &Some(neutral.clone()), &Some(neutral))
            .unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert!(json["automaton"]["neutral->sad"].is_number());
        assert!(json["turing_machine"]["delta"]["q_start,0"].is_object());
        assert_eq!(json["diff_neutral_sad"]["meta"]["binary"].as_array().unwrap().len(), 20);
    }

    #[test]
    fn test_error_reject_reasons() {
        let reason = |err| reject_error(err).reject_reason();
        assert_eq!(reason(AnalysisError::EmptyLandmarks), Some(RejectReason::NoFace));
        assert_eq!(
            reason(AnalysisError::ShapeMismatch { neutral: 68, target: 20 }),
            Some(RejectReason::LandmarkCountMismatch)
        );
        assert_eq!(
            reason(AnalysisError::ParseError("bad row".to_string())),
            Some(RejectReason::FileNotReadable)
        );
        assert_eq!(
            reason(AnalysisError::InvalidSymbol { index: 0, value: 2.0 }),
            Some(RejectReason::InvalidSymbols)
        );
    }
}
