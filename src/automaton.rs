//! Automaton encoding
//!
//! This module re-expresses binary change vectors as formal decisions:
//! - Vector decisions read by first symbol and by majority
//! - A two-transition automaton table with numeric label codes
//! - A small Turing machine whose branches accept exactly when the computed
//!   majority decision matches the branch's expected label
//!
//! A tied vector decides reject (code -1), so the table never carries the
//! neutral code 0.5.

use crate::error::AnalysisError;
use crate::turing::{Direction, MachineSpec, Transition, TransitionTable, TuringMachine, BLANK};
use crate::types::{Label, RejectReason};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Decision for one binary vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorDecision {
    /// Final decision, equal to `by_majority` for valid vectors
    pub decision: Label,
    /// Reading of the first symbol only
    pub by_first: Option<Label>,
    pub by_majority: Option<Label>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<RejectReason>,
}

fn symbol<T: Copy + Into<f64>>(v: T) -> f64 {
    v.into()
}

/// Check that every entry is exactly 0 or 1
pub fn validate_symbols<T: Copy + Into<f64>>(vector: &[T]) -> Result<(), AnalysisError> {
    match vector
        .iter()
        .map(|&v| symbol(v))
        .enumerate()
        .find(|&(_, v)| v != 0.0 && v != 1.0)
    {
        Some((index, value)) => Err(AnalysisError::InvalidSymbol { index, value }),
        None => Ok(()),
    }
}

/// Decide a binary vector.
///
/// Any entry outside {0, 1} rejects the whole vector with `invalid_symbols`.
pub fn decide_vector<T: Copy + Into<f64>>(vector: &[T]) -> VectorDecision {
    if let Err(err) = validate_symbols(vector) {
        tracing::warn!(error = %err, "rejecting vector");
        return invalid_symbols();
    }

    let by_first = match vector.first().map(|&v| symbol(v)) {
        Some(v) if v == 1.0 => Label::Happy,
        Some(_) => Label::Sad,
        None => Label::Reject,
    };
    let by_majority = majority_label(vector);

    VectorDecision {
        decision: by_majority,
        by_first: Some(by_first),
        by_majority: Some(by_majority),
        reason: None,
    }
}

/// Decide a vector of raw JSON values.
///
/// Entries that are not numbers reject the vector the same way as numbers
/// outside {0, 1}.
pub fn decide_values(values: &[Value]) -> VectorDecision {
    match values.iter().map(Value::as_f64).collect::<Option<Vec<f64>>>() {
        Some(vector) => decide_vector(&vector),
        None => {
            tracing::warn!("rejecting vector with non-numeric entries");
            invalid_symbols()
        }
    }
}

fn invalid_symbols() -> VectorDecision {
    VectorDecision {
        decision: Label::Reject,
        by_first: None,
        by_majority: None,
        reason: Some(RejectReason::InvalidSymbols),
    }
}

/// More ones is happy, more zeros is sad, a tie is reject
fn majority_label<T: Copy + Into<f64>>(vector: &[T]) -> Label {
    let ones = count_ones(vector);
    let zeros = vector.len() - ones;
    match ones.cmp(&zeros) {
        std::cmp::Ordering::Greater => Label::Happy,
        std::cmp::Ordering::Less => Label::Sad,
        std::cmp::Ordering::Equal => Label::Reject,
    }
}

fn count_ones<T: Copy + Into<f64>>(vector: &[T]) -> usize {
    vector.iter().filter(|&&v| symbol(v) == 1.0).count()
}

/// Labels of the two expression transitions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransitionLabels {
    #[serde(rename = "neutral->sad")]
    pub sad: Label,
    #[serde(rename = "neutral->happy")]
    pub happy: Label,
}

/// Ones and vector length for one transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnesCount {
    pub ones: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionCounts {
    #[serde(rename = "neutral->sad")]
    pub sad: OnesCount,
    #[serde(rename = "neutral->happy")]
    pub happy: OnesCount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomatonMetadata {
    pub labels: TransitionLabels,
    pub counts: TransitionCounts,
    pub threshold: f64,
}

/// Two-state automaton table written to `automaton.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomatonTable {
    #[serde(rename = "neutral->sad")]
    pub neutral_to_sad: f64,
    #[serde(rename = "neutral->happy")]
    pub neutral_to_happy: f64,
    #[serde(rename = "_metadata")]
    pub metadata: AutomatonMetadata,
}

impl AutomatonTable {
    /// Build the table from the change vectors of both transitions, using
    /// their majority decisions
    pub fn from_vectors(sad_binary: &[u8], happy_binary: &[u8], threshold: f64) -> Self {
        let labels = TransitionLabels {
            sad: decide_vector(sad_binary).decision,
            happy: decide_vector(happy_binary).decision,
        };
        let counts = TransitionCounts {
            sad: OnesCount {
                ones: count_ones(sad_binary),
                total: sad_binary.len(),
            },
            happy: OnesCount {
                ones: count_ones(happy_binary),
                total: happy_binary.len(),
            },
        };

        Self {
            neutral_to_sad: labels.sad.code(),
            neutral_to_happy: labels.happy.code(),
            metadata: AutomatonMetadata {
                labels,
                counts,
                threshold,
            },
        }
    }

    pub fn labels(&self) -> TransitionLabels {
        self.metadata.labels
    }
}

/// Machine reading one symbol: `0` checks the sad transition, `1` the happy one.
///
/// Each check state accepts at the following blank iff the stored decision
/// matches the label that branch expects.
pub fn decision_machine(labels: TransitionLabels) -> Result<TuringMachine, AnalysisError> {
    let verdict = |matches: bool| if matches { "q_accept" } else { "q_reject" };

    let mut transitions = TransitionTable::new();
    let mut add = |from: &str, read: char, to: &str, write: char, dir: Direction| {
        transitions.insert((from.to_string(), read), Transition::new(to, write, dir));
    };
    add("q_start", '0', "q_check_sad", '0', Direction::R);
    add("q_start", '1', "q_check_happy", '1', Direction::R);
    add("q_start", BLANK, "q_reject", BLANK, Direction::N);
    add(
        "q_check_sad",
        BLANK,
        verdict(labels.sad == Label::Sad),
        BLANK,
        Direction::N,
    );
    add(
        "q_check_happy",
        BLANK,
        verdict(labels.happy == Label::Happy),
        BLANK,
        Direction::N,
    );

    let states = ["q_start", "q_check_sad", "q_check_happy", "q_accept", "q_reject"]
        .map(String::from);
    let spec = MachineSpec::binary(
        states,
        transitions,
        "q_start",
        ["q_accept".to_string()],
        ["q_reject".to_string()],
    );
    TuringMachine::new(spec)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineMetadata {
    pub decisions: TransitionLabels,
    pub threshold: f64,
    /// Plain-language reading of each input symbol
    pub logic: BTreeMap<String, String>,
}

/// Machine spec plus metadata, written to `turing_machine.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuringMachineDocument {
    #[serde(flatten)]
    pub spec: MachineSpec,
    #[serde(rename = "_metadata")]
    pub metadata: MachineMetadata,
}

impl TuringMachineDocument {
    pub fn new(machine: &TuringMachine, labels: TransitionLabels, threshold: f64) -> Self {
        let describe = |symbol: char, branch: &str, expected: Label, actual: Label| {
            let verdict = if expected == actual { "ACCEPT" } else { "REJECT" };
            format!("reads {symbol} ({expected}) -> {branch} -> {verdict} (analysis decided: {actual})")
        };

        let mut logic = BTreeMap::new();
        logic.insert(
            "input_0".to_string(),
            describe('0', "q_check_sad", Label::Sad, labels.sad),
        );
        logic.insert(
            "input_1".to_string(),
            describe('1', "q_check_happy", Label::Happy, labels.happy),
        );

        Self {
            spec: machine.spec().clone(),
            metadata: MachineMetadata {
                decisions: labels,
                threshold,
                logic,
            },
        }
    }

    pub fn to_machine(&self) -> Result<TuringMachine, AnalysisError> {
        TuringMachine::new(self.spec.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawDiffMeta;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_majority_decisions() {
        assert_eq!(decide_vector(&[1u8, 1, 0]).decision, Label::Happy);
        assert_eq!(decide_vector(&[0u8, 1, 0]).decision, Label::Sad);
        assert_eq!(decide_vector(&[0u8, 1, 1, 0]).decision, Label::Reject);
        assert_eq!(decide_vector::<u8>(&[]).decision, Label::Reject);
    }

    #[test]
    fn test_first_symbol_reading() {
        let d = decide_vector(&[1u8, 0, 0, 0]);
        assert_eq!(d.by_first, Some(Label::Happy));
        assert_eq!(d.by_majority, Some(Label::Sad));
        assert_eq!(d.decision, Label::Sad);

        let d = decide_vector(&[0u8, 1, 1]);
        assert_eq!(d.by_first, Some(Label::Sad));
        assert_eq!(decide_vector::<u8>(&[]).by_first, Some(Label::Reject));
    }

    #[test]
    fn test_invalid_symbols_reject() {
        for vector in [vec![1.0, 2.0, 1.0], vec![0.5], vec![1.0, 1.0, 1.0, -1.0]] {
            let d = decide_vector(&vector);
            assert_eq!(d.decision, Label::Reject);
            assert_eq!(d.reason, Some(RejectReason::InvalidSymbols));
            assert_eq!(d.by_first, None);
            assert_eq!(d.by_majority, None);
        }
    }

    #[test]
    fn test_validate_symbols_reports_position() {
        let err = validate_symbols(&[0u8, 1, 3]).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::InvalidSymbol { index: 2, value } if value == 3.0
        ));
    }

    #[test]
    fn test_automaton_table_json() {
        let table = AutomatonTable::from_vectors(&[0, 0, 1], &[1, 1, 1, 0], 0.05);
        assert_eq!(table.neutral_to_sad, 0.0);
        assert_eq!(table.neutral_to_happy, 1.0);

        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json["neutral->sad"], 0.0);
        assert_eq!(json["neutral->happy"], 1.0);
        assert_eq!(json["_metadata"]["labels"]["neutral->happy"], "happy");
        assert_eq!(json["_metadata"]["counts"]["neutral->happy"]["ones"], 3);
        assert_eq!(json["_metadata"]["counts"]["neutral->sad"]["total"], 3);
        assert_eq!(json["_metadata"]["threshold"], 0.05);
    }

    #[test]
    fn test_automaton_tie_is_reject_code() {
        let table = AutomatonTable::from_vectors(&[0, 1], &[], 0.05);
        assert_eq!(table.neutral_to_sad, -1.0);
        assert_eq!(table.neutral_to_happy, -1.0);
    }

    #[test]
    fn test_decision_machine_matches_labels() {
        let labels = TransitionLabels {
            sad: Label::Sad,
            happy: Label::Sad,
        };
        let mut tm = decision_machine(labels).unwrap();
        assert!(tm.accepts("0", 10));
        assert!(!tm.accepts("1", 10));
        assert!(tm.is_rejected());
        assert!(!tm.accepts("", 10));
    }

    #[test]
    fn test_decision_machine_both_accept() {
        let labels = TransitionLabels {
            sad: Label::Sad,
            happy: Label::Happy,
        };
        let mut tm = decision_machine(labels).unwrap();
        assert!(tm.accepts("0", 10));
        assert!(tm.accepts("1", 10));
    }

    #[test]
    fn test_machine_document_round_trip() {
        let labels = TransitionLabels {
            sad: Label::Reject,
            happy: Label::Happy,
        };
        let tm = decision_machine(labels).unwrap();
        let doc = TuringMachineDocument::new(&tm, labels, 0.05);

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["q0"], "q_start");
        assert_eq!(json["delta"]["q_check_sad,_"]["next"], "q_reject");
        assert_eq!(json["delta"]["q_check_happy,_"]["next"], "q_accept");
        assert_eq!(json["_metadata"]["decisions"]["neutral->sad"], "reject");
        assert!(json["_metadata"]["logic"]["input_1"]
            .as_str()
            .unwrap()
            .contains("ACCEPT"));

        let back: TuringMachineDocument = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(back, doc);

        let loaded = TuringMachine::from_spec_json(&json.to_string()).unwrap();
        assert_eq!(loaded.spec(), tm.spec());
    }

    #[test]
    fn test_meta_file_with_bad_symbols_rejects() {
        for json in [
            r#"{"binary": [1, -1, 1], "difs": [0.2, 0.0, 0.3]}"#,
            r#"{"binary": [1, 0.5, 1], "difs": []}"#,
            r#"{"binary": [1, "a"]}"#,
        ] {
            let meta: RawDiffMeta = serde_json::from_str(json).unwrap();
            let d = decide_values(&meta.binary);
            assert_eq!(d.decision, Label::Reject);
            assert_eq!(d.reason, Some(RejectReason::InvalidSymbols));
            assert!(meta.into_meta().is_err());
        }
    }

    #[test]
    fn test_meta_file_with_valid_symbols_decides() {
        let meta: RawDiffMeta =
            serde_json::from_str(r#"{"binary": [1, 1, 0], "difs": [0.3, 0.2, 0.0]}"#).unwrap();
        assert_eq!(decide_values(&meta.binary).decision, Label::Happy);

        let meta = meta.into_meta().unwrap();
        assert_eq!(meta.binary, vec![1, 1, 0]);
        assert_eq!(meta.difs, vec![0.3, 0.2, 0.0]);
    }
}
