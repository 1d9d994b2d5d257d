//! # geostat algorithms
//!
//! Statistical spatial prediction over the core geometry abstraction.
//!
//! ## Algorithm Categories
//!
//! - **variogram**: empirical (semi)variograms, variogram clouds, parametric
//!   models and their weighted least-squares fit, space-time variograms
//! - **kriging**: ordinary, simple and universal kriging at points and over
//!   blocks, including whole-grid prediction
//! - **simulation**: sequential Gaussian simulation with reproducible streams
//! - **index**: k-nearest-neighbour search over conditioning data

pub mod index;
pub mod kriging;
pub(crate) mod linalg;
pub mod maybe_rayon;
pub mod simulation;
pub mod variogram;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::index::{BruteForceIndex, EntryId, KdTree, Neighbor, SpatialIndex};
    pub use crate::kriging::{
        CovarianceFunction, DriftOrder, GridKrigingParams, GridPrediction, KrigingEngine,
        KrigingOptions, PredictionResult, SpaceTimeCovariance, SpatialCovariance, Target, Trend,
        fit_trend, krige, krige_grid,
    };
    pub use crate::simulation::{
        RNG_STREAM_VERSION, Realization, SequentialSimulator, SimulationParams,
    };
    pub use crate::variogram::{
        AnisotropySource, EmpiricalVariogram, Estimator, FitParams, SpaceTimeModel,
        StVariogramParams, StructureKind, VariogramModel, VariogramParams, WeightScheme,
        empirical_st_variogram, empirical_variogram, fit_best_variogram, fit_space_time,
        fit_variogram, initial_model, variogram_cloud,
    };
    pub use geostat_core::prelude::*;
}
