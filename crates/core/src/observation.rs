//! Point observations delivered by the data-ingestion collaborator

use crate::error::{Error, Result};

/// A measured value at a location, with optional auxiliary covariates.
///
/// The location is an opaque handle understood by a
/// [`GeometryProvider`](crate::geometry::GeometryProvider); the engine only
/// ever asks the provider for distances involving it.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation<L> {
    pub location: L,
    pub value: f64,
    /// Auxiliary covariates in a caller-defined order. The intercept is not
    /// stored here; trends add it themselves.
    pub covariates: Vec<f64>,
}

impl<L> Observation<L> {
    pub fn new(location: L, value: f64) -> Self {
        Self {
            location,
            value,
            covariates: Vec::new(),
        }
    }

    pub fn with_covariates(location: L, value: f64, covariates: Vec<f64>) -> Self {
        Self {
            location,
            value,
            covariates,
        }
    }

    /// Same location and covariates, different value.
    pub fn with_value(&self, value: f64) -> Self
    where
        L: Clone,
    {
        Self {
            location: self.location.clone(),
            value,
            covariates: self.covariates.clone(),
        }
    }
}

/// Reject empty input and any non-finite value or covariate.
pub fn validate_observations<L>(observations: &[Observation<L>]) -> Result<()> {
    if observations.is_empty() {
        return Err(Error::InsufficientData {
            required: 1,
            available: 0,
            context: "observation set".into(),
        });
    }

    for (index, obs) in observations.iter().enumerate() {
        if !obs.value.is_finite() {
            return Err(Error::InvalidObservation {
                index,
                reason: format!("non-finite value {}", obs.value),
            });
        }
        if let Some(pos) = obs.covariates.iter().position(|c| !c.is_finite()) {
            return Err(Error::InvalidObservation {
                index,
                reason: format!("non-finite covariate at position {pos}"),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_ok() {
        let obs = vec![Observation::new(0usize, 1.0), Observation::new(1usize, 2.0)];
        assert!(validate_observations(&obs).is_ok());
    }

    #[test]
    fn test_validate_empty() {
        let obs: Vec<Observation<usize>> = Vec::new();
        assert!(matches!(
            validate_observations(&obs),
            Err(Error::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_validate_nan_value() {
        let obs = vec![Observation::new(0usize, 1.0), Observation::new(1usize, f64::NAN)];
        match validate_observations(&obs) {
            Err(Error::InvalidObservation { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected InvalidObservation, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_infinite_covariate() {
        let obs = vec![Observation::with_covariates(0usize, 1.0, vec![0.5, f64::INFINITY])];
        assert!(matches!(
            validate_observations(&obs),
            Err(Error::InvalidObservation { index: 0, .. })
        ));
    }
}
