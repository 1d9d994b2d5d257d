//! Sequential Gaussian simulation
//!
//! One realization visits the targets in a random order. At each target it
//! kriges from the conditioning data plus every value simulated so far,
//! draws from N(estimate, variance), and inserts the draw as new
//! conditioning data:
//! ```text
//! z*(xₜ) ~ N( Z_K(xₜ | data ∪ {z*(x₁..xₜ₋₁)}),  σ²_K(xₜ | ...) )
//! ```
//! Steps within a realization are strictly sequential; realizations are
//! independent and run in parallel.
//!
//! Randomness: realization `k` uses a Xoshiro256++ stream seeded from the
//! user seed (SplitMix64 expansion) and advanced by `k` jumps of 2¹²⁸ draws,
//! so realization `k` is the same whatever the realization count or thread
//! count. [`RNG_STREAM_VERSION`] identifies this scheme.
//!
//! Reference:
//! Deutsch, C.V. & Journel, A.G. (1998). GSLIB: Geostatistical Software
//! Library and User's Guide, §V.2.3.

use geostat_core::{CancelToken, Error, GeometryProvider, Observation, Result, check_cancelled};
use rand::{RngCore, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::debug;

use crate::index::{EntryId, SpatialIndex};
use crate::kriging::{CovarianceFunction, KrigingEngine, Target};
use crate::maybe_rayon::*;

/// Version of the seed → stream mapping. Bumped whenever the same seed would
/// produce different realizations.
pub const RNG_STREAM_VERSION: u32 = 1;

/// Parameters for [`SequentialSimulator`]
#[derive(Debug, Clone)]
pub struct SimulationParams {
    pub n_realizations: usize,
    pub seed: u64,
    /// Checked before every simulation step
    pub cancel: Option<CancelToken>,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            n_realizations: 1,
            seed: 0,
            cancel: None,
        }
    }
}

/// One conditional realization; `values[t]` belongs to target `t`.
#[derive(Debug, Clone, PartialEq)]
pub struct Realization {
    pub index: usize,
    pub values: Vec<f64>,
}

impl Realization {
    /// Upscale point values to region means. `locations[t]` is the location
    /// of target `t`; regions containing no target yield `None`.
    pub fn region_means<G: GeometryProvider>(
        &self,
        geometry: &G,
        locations: &[G::Location],
        regions: &[G::Region],
    ) -> Vec<Option<f64>> {
        geometry
            .incidence(locations, regions)
            .into_iter()
            .map(|members| {
                let values: Vec<f64> = members
                    .iter()
                    .filter_map(|&t| self.values.get(t).copied())
                    .collect();
                (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
            })
            .collect()
    }
}

/// Random stream of realization `k`.
pub(crate) fn realization_rng(seed: u64, k: usize) -> Xoshiro256PlusPlus {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    for _ in 0..k {
        rng.jump();
    }
    rng
}

/// Uniform integer in `0..n` by 64×64→128-bit multiply-shift.
#[inline]
pub(crate) fn bounded(rng: &mut Xoshiro256PlusPlus, n: usize) -> usize {
    ((u128::from(rng.next_u64()) * n as u128) >> 64) as usize
}

/// Fisher–Yates permutation of `0..n`.
pub(crate) fn visiting_order(rng: &mut Xoshiro256PlusPlus, n: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n).collect();
    for i in (1..n).rev() {
        let j = bounded(rng, i + 1);
        order.swap(i, j);
    }
    order
}

/// Mutable state of one realization: a private copy of the conditioning
/// index, the ids of simulated entries, the shuffled queue and the stream.
#[derive(Debug)]
pub struct SimulationState<I> {
    index: I,
    simulated: Vec<EntryId>,
    queue: Vec<usize>,
    cursor: usize,
    rng: Xoshiro256PlusPlus,
    values: Vec<f64>,
    cancel: Option<CancelToken>,
}

impl<I> SimulationState<I> {
    /// Fresh state for realization `realization` over `n_targets` targets.
    pub fn new(
        template: &I,
        n_targets: usize,
        seed: u64,
        realization: usize,
        cancel: Option<CancelToken>,
    ) -> Self
    where
        I: Clone,
    {
        let mut rng = realization_rng(seed, realization);
        let queue = visiting_order(&mut rng, n_targets);
        Self {
            index: template.clone(),
            simulated: Vec::with_capacity(n_targets),
            queue,
            cursor: 0,
            rng,
            values: vec![f64::NAN; n_targets],
            cancel,
        }
    }

    /// Order in which targets are visited.
    pub fn queue(&self) -> &[usize] {
        &self.queue
    }

    pub fn remaining(&self) -> usize {
        self.queue.len() - self.cursor
    }

    /// Whether an index entry was produced by this realization rather than
    /// being input conditioning data.
    pub fn is_simulated(&self, id: EntryId) -> bool {
        self.simulated.binary_search(&id).is_ok()
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    /// Simulate the next queued target; `Ok(None)` once the queue is empty.
    ///
    /// # Errors
    /// Kriging failures wrapped in [`Error::Target`], or
    /// [`Error::Cancelled`].
    pub fn step<G, C>(
        &mut self,
        engine: &KrigingEngine<G, C>,
        targets: &[Target<G::Location, G::Region>],
    ) -> Result<Option<usize>>
    where
        G: GeometryProvider,
        C: CovarianceFunction<G::Location>,
        I: SpatialIndex<G::Location>,
    {
        let Some(&t) = self.queue.get(self.cursor) else {
            return Ok(None);
        };
        check_cancelled(self.cancel.as_ref(), "simulation")?;

        let Target::Point {
            location,
            covariates,
        } = &targets[t]
        else {
            return Err(Error::InvalidParameter {
                name: "target",
                value: "block".into(),
                reason: "simulate points, then upscale with region_means".into(),
            }
            .at_target(t));
        };

        let prediction = engine
            .predict(&self.index, &targets[t])
            .map_err(|e| e.at_target(t))?;
        let z: f64 = StandardNormal.sample(&mut self.rng);
        let value = prediction.predicted_value + prediction.prediction_variance.sqrt() * z;

        let id = self.index.insert(Observation::with_covariates(
            location.clone(),
            value,
            covariates.clone(),
        ));
        self.simulated.push(id);
        self.values[t] = value;
        self.cursor += 1;
        Ok(Some(t))
    }

    /// Simulated values in target order.
    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}

/// Sequential Gaussian simulator over a kriging engine.
pub struct SequentialSimulator<'e, G: GeometryProvider, C> {
    engine: &'e KrigingEngine<G, C>,
    params: SimulationParams,
}

impl<'e, G, C> SequentialSimulator<'e, G, C>
where
    G: GeometryProvider,
    C: CovarianceFunction<G::Location>,
{
    pub fn new(engine: &'e KrigingEngine<G, C>, params: SimulationParams) -> Self {
        Self { engine, params }
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    /// Conditioning data and point targets must sit at measurable locations
    /// with finite values.
    fn check_inputs<I>(
        &self,
        conditioning: &I,
        targets: &[Target<G::Location, G::Region>],
    ) -> Result<()>
    where
        I: SpatialIndex<G::Location>,
    {
        let geometry = self.engine.geometry();
        for (id, obs) in conditioning.entries() {
            if !obs.value.is_finite() || !geometry.is_valid_location(&obs.location) {
                return Err(Error::InvalidObservation {
                    index: id.0,
                    reason: format!("non-finite datum {} at {:?}", obs.value, obs.location),
                });
            }
        }
        for (t, target) in targets.iter().enumerate() {
            if let Target::Point { location, .. } = target
                && !geometry.is_valid_location(location)
            {
                return Err(Error::InvalidParameter {
                    name: "target",
                    value: format!("{location:?}"),
                    reason: "non-finite location".into(),
                }
                .at_target(t));
            }
        }
        Ok(())
    }

    /// Run realization `k` to completion on a private copy of `conditioning`.
    ///
    /// # Errors
    /// Any step failure, wrapped in [`Error::Realization`]; no partial
    /// output is returned.
    pub fn realize<I>(
        &self,
        conditioning: &I,
        targets: &[Target<G::Location, G::Region>],
        k: usize,
    ) -> Result<Realization>
    where
        I: SpatialIndex<G::Location> + Clone,
    {
        self.check_inputs(conditioning, targets)?;
        let mut state = SimulationState::new(
            conditioning,
            targets.len(),
            self.params.seed,
            k,
            self.params.cancel.clone(),
        );
        while state
            .step(self.engine, targets)
            .map_err(|e| e.in_realization(k))?
            .is_some()
        {}
        debug!(realization = k, targets = targets.len(), "realization finished");
        Ok(Realization {
            index: k,
            values: state.into_values(),
        })
    }

    /// All realizations in parallel, ordered by realization index. A failed
    /// realization is reported in place without affecting the others.
    pub fn simulate<I>(
        &self,
        conditioning: &I,
        targets: &[Target<G::Location, G::Region>],
    ) -> Vec<Result<Realization>>
    where
        I: SpatialIndex<G::Location> + Clone + Sync,
    {
        (0..self.params.n_realizations)
            .into_par_iter()
            .map(|k| self.realize(conditioning, targets, k))
            .collect()
    }

    /// Fail-fast variant of [`simulate`](Self::simulate).
    pub fn simulate_all<I>(
        &self,
        conditioning: &I,
        targets: &[Target<G::Location, G::Region>],
    ) -> Result<Vec<Realization>>
    where
        I: SpatialIndex<G::Location> + Clone + Sync,
    {
        (0..self.params.n_realizations)
            .into_par_iter()
            .map(|k| self.realize(conditioning, targets, k))
            .collect()
    }
}
