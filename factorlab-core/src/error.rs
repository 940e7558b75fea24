//! Error taxonomy shared by every research stage.
//!
//! `DataUnavailable`, `Schema` and `UnsupportedConfiguration` abort the
//! current request. `InsufficientData` and `NumericalDegenerate` are the
//! locally recoverable classes: callers turn them into an undefined value
//! (`None` / NaN) or shrink a window instead of failing the whole request.

use thiserror::Error;

/// Errors produced by the research engine.
#[derive(Debug, Error)]
pub enum ResearchError {
    #[error("no data available: {0}")]
    DataUnavailable(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("insufficient data for {what}: need {needed}, have {available}")]
    InsufficientData {
        what: String,
        needed: usize,
        available: usize,
    },

    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("numerically degenerate: {0}")]
    NumericalDegenerate(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parquet/csv I/O error: {0}")]
    Frame(String),
}

impl ResearchError {
    /// True for the error classes that are recovered locally rather than
    /// aborting the request.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ResearchError::InsufficientData { .. } | ResearchError::NumericalDegenerate(_)
        )
    }

    pub(crate) fn insufficient(what: impl Into<String>, needed: usize, available: usize) -> Self {
        ResearchError::InsufficientData {
            what: what.into(),
            needed,
            available,
        }
    }
}

impl From<polars::prelude::PolarsError> for ResearchError {
    fn from(e: polars::prelude::PolarsError) -> Self {
        ResearchError::Frame(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ResearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_classes() {
        assert!(ResearchError::insufficient("fold", 250, 10).is_recoverable());
        assert!(ResearchError::NumericalDegenerate("zero variance".into()).is_recoverable());
        assert!(!ResearchError::Schema("no close".into()).is_recoverable());
        assert!(!ResearchError::DataUnavailable("SPY".into()).is_recoverable());
        assert!(!ResearchError::UnsupportedConfiguration("horizon 2d".into()).is_recoverable());
    }

    #[test]
    fn messages_name_the_problem() {
        let e = ResearchError::insufficient("correlation", 5, 3);
        assert_eq!(
            e.to_string(),
            "insufficient data for correlation: need 5, have 3"
        );
    }
}
