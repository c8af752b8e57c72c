use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    /// An operation was attempted outside its legal lifecycle state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },
    #[error("parse error: {0}")]
    Parse(String),
    /// User-facing problem with the inputs as a whole (missing tracks, wrong lead-in).
    #[error("{0}")]
    StructuralMismatch(String),
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
