//! Error types for facial-state

use thiserror::Error;

/// Errors that can occur during landmark comparison and automaton construction
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("No face detected: {0}")]
    NoFaceDetected(String),

    #[error("Landmark count mismatch: neutral has {neutral}, target has {target}")]
    ShapeMismatch { neutral: usize, target: usize },

    #[error("Invalid symbol {value} at index {index}")]
    InvalidSymbol { index: usize, value: f64 },

    #[error("File not readable: {0}")]
    FileNotReadable(String),

    #[error("Landmark set is empty")]
    EmptyLandmarks,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse landmarks: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid machine: {0}")]
    MachineError(String),
}
