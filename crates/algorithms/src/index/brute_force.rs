//! Linear-scan index
//!
//! Every query measures the distance to every live observation through the
//! geometry provider: O(n) per query. Adequate for a few thousand points and
//! the only option for locations without planar coordinates.

use geostat_core::{GeometryProvider, Observation};

use super::{EntryId, Neighbor, SpatialIndex, neighbor_order};

#[derive(Debug, Clone)]
pub struct BruteForceIndex<G: GeometryProvider> {
    geometry: G,
    entries: Vec<Option<Observation<G::Location>>>,
    live: usize,
}

impl<G: GeometryProvider> BruteForceIndex<G> {
    pub fn new(geometry: G) -> Self {
        Self {
            geometry,
            entries: Vec::new(),
            live: 0,
        }
    }

    /// Index the observations in order; ids follow slice positions.
    pub fn build(geometry: G, observations: &[Observation<G::Location>]) -> Self {
        let mut index = Self::new(geometry);
        index.entries.reserve(observations.len());
        for obs in observations {
            index.insert(obs.clone());
        }
        index
    }

    pub fn geometry(&self) -> &G {
        &self.geometry
    }
}

impl<G: GeometryProvider> SpatialIndex<G::Location> for BruteForceIndex<G> {
    fn insert(&mut self, observation: Observation<G::Location>) -> EntryId {
        self.entries.push(Some(observation));
        self.live += 1;
        EntryId(self.entries.len() - 1)
    }

    fn remove(&mut self, id: EntryId) -> Option<Observation<G::Location>> {
        let removed = self.entries.get_mut(id.0).and_then(Option::take);
        if removed.is_some() {
            self.live -= 1;
        }
        removed
    }

    fn get(&self, id: EntryId) -> Option<&Observation<G::Location>> {
        self.entries.get(id.0).and_then(Option::as_ref)
    }

    fn entries(&self) -> Vec<(EntryId, &Observation<G::Location>)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| Some((EntryId(i), slot.as_ref()?)))
            .collect()
    }

    fn k_nearest(
        &self,
        target: &G::Location,
        k: usize,
        max_radius: Option<f64>,
    ) -> Vec<Neighbor<'_, G::Location>> {
        if k == 0 {
            return Vec::new();
        }

        let mut found: Vec<Neighbor<'_, G::Location>> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| {
                let observation = slot.as_ref()?;
                let distance = self.geometry.distance(target, &observation.location);
                if max_radius.is_some_and(|r| distance > r) {
                    return None;
                }
                Some(Neighbor {
                    id: EntryId(i),
                    distance,
                    observation,
                })
            })
            .collect();

        if found.len() > k {
            found.select_nth_unstable_by(k - 1, neighbor_order);
            found.truncate(k);
        }
        found.sort_by(neighbor_order);
        found
    }

    fn len(&self) -> usize {
        self.live
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Point;
    use geostat_core::PlanarGeometry;

    fn obs(x: f64, y: f64, v: f64) -> Observation<Point<f64>> {
        Observation::new(Point::new(x, y), v)
    }

    #[test]
    fn test_k_nearest_sorted() {
        let index = BruteForceIndex::build(
            PlanarGeometry::default(),
            &[obs(0.0, 0.0, 1.0), obs(5.0, 0.0, 2.0), obs(1.0, 0.0, 3.0), obs(9.0, 0.0, 4.0)],
        );
        let nn = index.k_nearest(&Point::new(0.2, 0.0), 3, None);
        let values: Vec<f64> = nn.iter().map(|n| n.observation.value).collect();
        assert_eq!(values, vec![1.0, 3.0, 2.0]);
    }

    #[test]
    fn test_ties_by_insertion_order() {
        let index = BruteForceIndex::build(
            PlanarGeometry::default(),
            &[obs(1.0, 0.0, 1.0), obs(-1.0, 0.0, 2.0), obs(0.0, 1.0, 3.0), obs(0.0, -1.0, 4.0)],
        );
        let nn = index.k_nearest(&Point::new(0.0, 0.0), 2, None);
        assert_eq!(nn[0].id, EntryId(0));
        assert_eq!(nn[1].id, EntryId(1));
    }

    #[test]
    fn test_radius_and_remove() {
        let mut index = BruteForceIndex::build(
            PlanarGeometry::default(),
            &[obs(0.0, 0.0, 1.0), obs(3.0, 0.0, 2.0), obs(10.0, 0.0, 3.0)],
        );
        assert_eq!(index.k_nearest(&Point::new(0.0, 0.0), 10, Some(5.0)).len(), 2);

        let removed = index.remove(EntryId(1)).unwrap();
        assert_eq!(removed.value, 2.0);
        assert!(index.remove(EntryId(1)).is_none());
        assert_eq!(index.len(), 2);
        assert_eq!(index.k_nearest(&Point::new(0.0, 0.0), 10, Some(5.0)).len(), 1);
        let ids: Vec<EntryId> = index.entries().iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![EntryId(0), EntryId(2)]);
    }

    #[test]
    fn test_duplicates_and_zero_k() {
        let index = BruteForceIndex::build(
            PlanarGeometry::default(),
            &[obs(2.0, 2.0, 1.0), obs(2.0, 2.0, 5.0)],
        );
        let nn = index.k_nearest(&Point::new(2.0, 2.0), 5, None);
        assert_eq!(nn.len(), 2);
        assert_eq!(nn[0].distance, 0.0);
        assert_eq!(nn[0].id, EntryId(0));
        assert!(index.k_nearest(&Point::new(2.0, 2.0), 0, None).is_empty());
    }
}
