//! Conditional stochastic simulation

mod sequential;

pub use sequential::{
    RNG_STREAM_VERSION, Realization, SequentialSimulator, SimulationParams, SimulationState,
};
