//! Error types for geostat

use thiserror::Error;

/// Main error type for geostat operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid observation at index {index}: {reason}")]
    InvalidObservation { index: usize, reason: String },

    #[error("Insufficient data for {context}: need {required}, got {available}")]
    InsufficientData {
        required: usize,
        available: usize,
        context: String,
    },

    #[error("Variogram fit did not converge after {iterations} iterations: {reason}")]
    FitDivergence { iterations: usize, reason: String },

    #[error("Insufficient neighbors: need {required}, found {available}")]
    InsufficientNeighbors { required: usize, available: usize },

    #[error("Singular kriging system of size {size}")]
    SingularSystem { size: usize },

    #[error("Invalid variogram model: {0}")]
    InvalidModel(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Cancelled during {stage}")]
    Cancelled { stage: &'static str },

    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("Target {index}: {source}")]
    Target {
        index: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("Realization {index}: {source}")]
    Realization {
        index: usize,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Attach the index of the prediction target that raised this error.
    pub fn at_target(self, index: usize) -> Self {
        Error::Target {
            index,
            source: Box::new(self),
        }
    }

    /// Attach the index of the simulation realization that raised this error.
    pub fn in_realization(self, index: usize) -> Self {
        Error::Realization {
            index,
            source: Box::new(self),
        }
    }

    /// The underlying error with all target/realization context stripped.
    pub fn root(&self) -> &Error {
        match self {
            Error::Target { source, .. } | Error::Realization { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type alias for geostat operations
pub type Result<T> = std::result::Result<T, Error>;
