//! facial-state - Landmark difference analysis for coarse facial expressions
//!
//! Compares a neutral face against a target face through a deterministic
//! pipeline: landmark extraction → region mapping → difference engine →
//! region-rule classification. Binary change vectors can then be formalized
//! as an automaton table and a small decision Turing machine.
//!
//! ## Modules
//!
//! - **Pair Analysis**: Classify a (neutral, target) pair as happy, sad, neutral or reject
//! - **Formalization**: Vector decisions, automaton table and Turing machine simulation

pub mod automaton;
pub mod classifier;
pub mod config;
pub mod difference;
pub mod error;
pub mod extractor;
pub mod geometry;
pub mod pipeline;
pub mod turing;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use automaton::{decide_values, decide_vector, decision_machine, AutomatonTable, TuringMachineDocument, VectorDecision};
pub use classifier::RegionClassifier;
pub use config::{BandingScheme, ClassifierConfig, PipelineConfig};
pub use difference::{difference, summarize};
pub use error::AnalysisError;
pub use extractor::{LandmarkExtractor, LandmarkFileExtractor, StaticExtractor};
pub use geometry::map_regions;
pub use pipeline::{ExpressionReport, FacialStatePipeline};
pub use turing::{majority_machine, MachineSpec, TuringMachine};
pub use types::{AnalysisOutcome, Label, LandmarkSet, Point, RegionMap};

/// Library version recorded in generated reports
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name recorded in generated reports
pub const PRODUCER_NAME: &str = "facial-state";
