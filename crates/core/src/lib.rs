//! # geostat core
//!
//! Core types shared by the geostat spatial-prediction engine.
//!
//! This crate provides:
//! - `Observation<L>`: a value measured at an opaque location
//! - `GeometryProvider`: the geometry collaborator interface, with a
//!   Euclidean `PlanarGeometry` implementation and a space-time wrapper
//! - `GridSpec`: regular raster prediction targets
//! - `CancelToken`: cooperative cancellation
//! - The error taxonomy shared by every operation

pub mod cancel;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod observation;
pub mod spacetime;

pub use cancel::{CancelToken, check_cancelled};
pub use error::{Error, Result};
pub use geometry::{GeometryProvider, Planar, PlanarGeometry, validate_locations};
pub use grid::GridSpec;
pub use observation::{Observation, validate_observations};
pub use spacetime::{SpaceTime, SpaceTimeGeometry, SpaceTimeRegion};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::cancel::CancelToken;
    pub use crate::error::{Error, Result};
    pub use crate::geometry::{GeometryProvider, Planar, PlanarGeometry};
    pub use crate::grid::GridSpec;
    pub use crate::observation::Observation;
    pub use crate::spacetime::{SpaceTime, SpaceTimeGeometry, SpaceTimeRegion};
    pub use geo::{Point, Polygon};
}
