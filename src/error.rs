//! Error types for the consensus-reaching process.

use thiserror::Error;

/// Coarse classification of a [`CrpError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The preference data itself is missing or inconsistently shaped.
    MalformedInput,
    /// A model parameter lies outside its valid numeric domain.
    ParameterDomain,
}

#[derive(Debug, Error, PartialEq)]
pub enum CrpError {
    // -- Malformed input ----------------------------------------------------
    #[error("no expert preference data supplied")]
    NoExperts,
    #[error("expert {expert_id} supplied no criterion matrices")]
    NoCriteria { expert_id: String },
    #[error("expert {expert_id} criterion {criterion_id}: matrix is not square ({rows}x{cols})")]
    NonSquareMatrix {
        expert_id: String,
        criterion_id: String,
        rows: usize,
        cols: usize,
    },
    #[error("expert {expert_id} criterion {criterion_id}: expected {expected} alternatives, got {got}")]
    DimensionMismatch {
        expert_id: String,
        criterion_id: String,
        expected: usize,
        got: usize,
    },
    #[error("expert {expert_id} criterion set {got:?} differs from {expected:?}")]
    CriteriaMismatch {
        expert_id: String,
        expected: Vec<String>,
        got: Vec<String>,
    },
    #[error("expert {expert_id} has {got} criterion matrices, expected {expected}")]
    CriterionCountMismatch {
        expert_id: String,
        expected: usize,
        got: usize,
    },
    #[error("criterion weight count {got} does not match criterion count {expected}")]
    CriterionWeightMismatch { expected: usize, got: usize },
    #[error("expert {expert_id} criterion {criterion_id}: entry [{row}][{col}] = {value} is outside [0,1]")]
    EntryOutOfRange {
        expert_id: String,
        criterion_id: String,
        row: usize,
        col: usize,
        value: f64,
    },
    #[error("preference set has {got} slots, expected {expected}")]
    SlotCountMismatch { expected: usize, got: usize },

    // -- Parameter domain ---------------------------------------------------
    #[error("linguistic quantifier ({a}, {b}) requires a < b")]
    DegenerateQuantifier { a: f64, b: f64 },
    #[error("OWA weight count must be at least 1")]
    EmptyWeightVector,
    #[error("at least 2 alternatives are required, got {got}")]
    TooFewAlternatives { got: usize },
    #[error("consensus rigor b must be finite and > 0, got {b}")]
    InvalidRigor { b: f64 },
    #[error("beta must be in [0,1], got {beta}")]
    InvalidBeta { beta: f64 },
    #[error("consensus threshold must be in [0,1], got {cl}")]
    InvalidThreshold { cl: f64 },
    #[error("invalid criterion weight {weight} at index {index}")]
    InvalidCriterionWeight { index: usize, weight: f64 },
    #[error("max_rounds must be >= 1")]
    ZeroRounds,
    #[error("acceptance probability must be in [0,1], got {p}")]
    InvalidAcceptanceProbability { p: f64 },
    #[error("change scale must be finite and >= 0, got {scale}")]
    InvalidChangeScale { scale: f64 },
}

impl CrpError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CrpError::NoExperts
            | CrpError::NoCriteria { .. }
            | CrpError::NonSquareMatrix { .. }
            | CrpError::DimensionMismatch { .. }
            | CrpError::CriteriaMismatch { .. }
            | CrpError::CriterionCountMismatch { .. }
            | CrpError::CriterionWeightMismatch { .. }
            | CrpError::EntryOutOfRange { .. }
            | CrpError::SlotCountMismatch { .. } => ErrorKind::MalformedInput,
            CrpError::DegenerateQuantifier { .. }
            | CrpError::EmptyWeightVector
            | CrpError::TooFewAlternatives { .. }
            | CrpError::InvalidRigor { .. }
            | CrpError::InvalidBeta { .. }
            | CrpError::InvalidThreshold { .. }
            | CrpError::InvalidCriterionWeight { .. }
            | CrpError::ZeroRounds
            | CrpError::InvalidAcceptanceProbability { .. }
            | CrpError::InvalidChangeScale { .. } => ErrorKind::ParameterDomain,
        }
    }
}
