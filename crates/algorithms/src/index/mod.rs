//! Spatial indexing of conditioning observations
//!
//! Two implementations of [`SpatialIndex`]:
//! - [`KdTree`]: 2-D k-d tree for planar locations, O(log n) amortized
//!   insertion and O(log n + k) neighbour queries on well-spread data
//! - [`BruteForceIndex`]: O(n) scan through any [`GeometryProvider`],
//!   the fallback for small sets and for non-planar (e.g. space-time) locations
//!
//! Both break distance ties by insertion order, so neighbour selection is
//! deterministic for a fixed insertion sequence.
//!
//! [`GeometryProvider`]: geostat_core::GeometryProvider

mod brute_force;
mod kdtree;

pub use brute_force::BruteForceIndex;
pub use kdtree::KdTree;

use std::cmp::Ordering;

use geostat_core::Observation;

/// Handle returned by [`SpatialIndex::insert`]. Ids grow with every
/// insertion and are never reused, so they double as the tie-break key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(pub usize);

/// Result of a neighbour query
#[derive(Debug, Clone, Copy)]
pub struct Neighbor<'a, L> {
    pub id: EntryId,
    pub distance: f64,
    pub observation: &'a Observation<L>,
}

/// Point index over observations, queried by k-nearest-neighbour search.
pub trait SpatialIndex<L> {
    /// Add an observation; returns its id.
    fn insert(&mut self, observation: Observation<L>) -> EntryId;

    /// Remove a previously inserted observation.
    fn remove(&mut self, id: EntryId) -> Option<Observation<L>>;

    fn get(&self, id: EntryId) -> Option<&Observation<L>>;

    /// Up to `k` observations nearest to `target`, nearest first, optionally
    /// restricted to `distance <= max_radius`.
    fn k_nearest(&self, target: &L, k: usize, max_radius: Option<f64>) -> Vec<Neighbor<'_, L>>;

    /// Live observations in insertion order.
    fn entries(&self) -> Vec<(EntryId, &Observation<L>)>;

    /// Number of live observations.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert every observation in order.
    fn extend<I>(&mut self, observations: I)
    where
        I: IntoIterator<Item = Observation<L>>,
        Self: Sized,
    {
        for obs in observations {
            self.insert(obs);
        }
    }
}

/// Order by distance, then by insertion id.
#[inline]
pub(crate) fn neighbor_order<L>(a: &Neighbor<'_, L>, b: &Neighbor<'_, L>) -> Ordering {
    a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id))
}
