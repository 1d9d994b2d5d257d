//! Variogram estimation and modelling
//!
//! - [`empirical`]: binned semivariance from point observations
//! - [`model`]: nested parametric models (nugget, exponential, spherical, ...)
//! - [`fit`]: weighted least-squares fitting of models to bins
//! - [`spacetime`]: spatiotemporal bins, product-sum / metric models

pub mod empirical;
pub mod fit;
pub mod model;
pub mod spacetime;

pub use empirical::{
    CloudPair, DistanceBin, EmpiricalVariogram, Estimator, VariogramParams, empirical_variogram,
    variogram_cloud,
};
pub use fit::{
    FitParams, FittedVariogram, ParamRole, Parametric, RANGE_CAP, WeightScheme,
    fit_best_variogram, fit_variogram, initial_model,
};
pub use model::{ModelRecord, Structure, StructureKind, StructureRecord, VariogramModel};
pub use spacetime::{
    AnisotropySource, FittedSpaceTime, SpaceTimeKind, SpaceTimeModel, SpaceTimeRecord, StBin,
    StEmpiricalVariogram, StVariogramParams, empirical_st_variogram, estimate_anisotropy,
    fit_space_time,
};
