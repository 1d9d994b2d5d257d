//! 2D k-d tree for spatial indexing
//!
//! Bulk construction splits on the median of alternating coordinates, giving
//! a balanced tree in O(n log n). Later insertions descend to a leaf and hang
//! the new node there (O(log n) amortized for points arriving in random
//! order, which is how sequential simulation inserts them). Removal marks the
//! node as a tombstone; once tombstones outnumber live nodes the tree is
//! rebuilt from the survivors.
//!
//! Reference:
//! Bentley, J.L. (1975). Multidimensional binary search trees used
//! for associative searching. CACM, 18(9).

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use geostat_core::{Observation, Planar};

use super::{EntryId, Neighbor, SpatialIndex};

/// A 2D k-d tree over observations at planar locations.
#[derive(Debug, Clone)]
pub struct KdTree<L> {
    nodes: Vec<KdNode>,
    /// One slot per insertion, indexed by `EntryId`
    entries: Vec<Entry<L>>,
    live: usize,
    tombstones: usize,
}

#[derive(Debug, Clone)]
struct Entry<L> {
    x: f64,
    y: f64,
    observation: Option<Observation<L>>,
}

#[derive(Debug, Clone)]
struct KdNode {
    /// Index into `entries`
    entry: usize,
    /// Split dimension: 0 = x, 1 = y
    split_dim: u8,
    left: Option<usize>,
    right: Option<usize>,
}

/// Heap item ordered by squared distance, then insertion id.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    dist_sq: f64,
    entry: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist_sq
            .total_cmp(&other.dist_sq)
            .then(self.entry.cmp(&other.entry))
    }
}

impl<L: Planar + Clone> KdTree<L> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            entries: Vec::new(),
            live: 0,
            tombstones: 0,
        }
    }

    /// Build a balanced tree; ids follow slice positions.
    pub fn build(observations: &[Observation<L>]) -> Self {
        let entries: Vec<Entry<L>> = observations
            .iter()
            .map(|obs| {
                let (x, y) = obs.location.xy();
                Entry {
                    x,
                    y,
                    observation: Some(obs.clone()),
                }
            })
            .collect();

        let mut tree = Self {
            nodes: Vec::with_capacity(entries.len()),
            live: entries.len(),
            entries,
            tombstones: 0,
        };
        let mut indices: Vec<usize> = (0..tree.entries.len()).collect();
        if !indices.is_empty() {
            build_recursive(&tree.entries, &mut indices, 0, &mut tree.nodes);
        }
        tree
    }

    /// Depth of the deepest leaf (0 for an empty tree).
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[KdNode], idx: Option<usize>) -> usize {
            match idx {
                None => 0,
                Some(i) => 1 + walk(nodes, nodes[i].left).max(walk(nodes, nodes[i].right)),
            }
        }
        if self.nodes.is_empty() { 0 } else { walk(&self.nodes, Some(0)) }
    }

    fn rebuild(&mut self) {
        self.nodes.clear();
        self.tombstones = 0;
        let mut indices: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.observation.is_some())
            .map(|(i, _)| i)
            .collect();
        if !indices.is_empty() {
            build_recursive(&self.entries, &mut indices, 0, &mut self.nodes);
        }
    }

    fn knn_recursive(
        &self,
        node_idx: usize,
        qx: f64,
        qy: f64,
        k: usize,
        radius_sq: f64,
        heap: &mut BinaryHeap<Candidate>,
    ) {
        let node = &self.nodes[node_idx];
        let e = &self.entries[node.entry];

        let dx = qx - e.x;
        let dy = qy - e.y;
        let dist_sq = dx * dx + dy * dy;

        if e.observation.is_some() && dist_sq <= radius_sq {
            let cand = Candidate {
                dist_sq,
                entry: node.entry,
            };
            if heap.len() < k {
                heap.push(cand);
            } else if heap.peek().is_some_and(|worst| cand < *worst) {
                heap.pop();
                heap.push(cand);
            }
        }

        let diff = if node.split_dim == 0 { dx } else { dy };
        let (first, second) = if diff < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        if let Some(child) = first {
            self.knn_recursive(child, qx, qy, k, radius_sq, heap);
        }

        let threshold = if heap.len() >= k {
            heap.peek().map_or(radius_sq, |worst| worst.dist_sq)
        } else {
            radius_sq
        };

        // `<=` keeps equal-distance points on the far side reachable for the
        // insertion-order tie-break.
        if diff * diff <= threshold
            && let Some(child) = second
        {
            self.knn_recursive(child, qx, qy, k, radius_sq, heap);
        }
    }
}

impl<L: Planar + Clone> Default for KdTree<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: Planar + Clone> SpatialIndex<L> for KdTree<L> {
    fn insert(&mut self, observation: Observation<L>) -> EntryId {
        let (x, y) = observation.location.xy();
        let entry = self.entries.len();
        self.entries.push(Entry {
            x,
            y,
            observation: Some(observation),
        });
        self.live += 1;

        if self.nodes.is_empty() {
            self.nodes.push(KdNode {
                entry,
                split_dim: 0,
                left: None,
                right: None,
            });
            return EntryId(entry);
        }

        let mut current = 0;
        loop {
            let node = &self.nodes[current];
            let e = &self.entries[node.entry];
            let go_left = if node.split_dim == 0 { x < e.x } else { y < e.y };
            let child = if go_left { node.left } else { node.right };
            match child {
                Some(next) => current = next,
                None => {
                    let split_dim = 1 - node.split_dim;
                    let new_idx = self.nodes.len();
                    self.nodes.push(KdNode {
                        entry,
                        split_dim,
                        left: None,
                        right: None,
                    });
                    if go_left {
                        self.nodes[current].left = Some(new_idx);
                    } else {
                        self.nodes[current].right = Some(new_idx);
                    }
                    break;
                }
            }
        }

        EntryId(entry)
    }

    fn remove(&mut self, id: EntryId) -> Option<Observation<L>> {
        let removed = self.entries.get_mut(id.0)?.observation.take()?;
        self.live -= 1;
        self.tombstones += 1;
        if self.tombstones * 2 > self.nodes.len() {
            self.rebuild();
        }
        Some(removed)
    }

    fn get(&self, id: EntryId) -> Option<&Observation<L>> {
        self.entries.get(id.0)?.observation.as_ref()
    }

    fn entries(&self) -> Vec<(EntryId, &Observation<L>)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| Some((EntryId(i), e.observation.as_ref()?)))
            .collect()
    }

    fn k_nearest(&self, target: &L, k: usize, max_radius: Option<f64>) -> Vec<Neighbor<'_, L>> {
        if self.nodes.is_empty() || k == 0 {
            return Vec::new();
        }
        let radius_sq = max_radius.map_or(f64::INFINITY, |r| r * r);
        let (qx, qy) = target.xy();

        let mut heap = BinaryHeap::with_capacity(k + 1);
        self.knn_recursive(0, qx, qy, k, radius_sq, &mut heap);

        heap.into_sorted_vec()
            .into_iter()
            .filter_map(|c| {
                let observation = self.entries[c.entry].observation.as_ref()?;
                Some(Neighbor {
                    id: EntryId(c.entry),
                    distance: c.dist_sq.sqrt(),
                    observation,
                })
            })
            .collect()
    }

    fn len(&self) -> usize {
        self.live
    }
}

/// Recursively build the k-d tree over `indices` into `entries`.
fn build_recursive<L>(
    entries: &[Entry<L>],
    indices: &mut [usize],
    depth: usize,
    nodes: &mut Vec<KdNode>,
) -> usize {
    let n = indices.len();
    let split_dim = (depth % 2) as u8;

    // Sort by split dimension; the index tie-break keeps builds reproducible.
    indices.sort_by(|&a, &b| {
        let (va, vb) = if split_dim == 0 {
            (entries[a].x, entries[b].x)
        } else {
            (entries[a].y, entries[b].y)
        };
        va.total_cmp(&vb).then(a.cmp(&b))
    });

    let median = n / 2;
    let node_idx = nodes.len();
    nodes.push(KdNode {
        entry: indices[median],
        split_dim,
        left: None,
        right: None,
    });

    if median > 0 {
        let left_idx = build_recursive(entries, &mut indices[..median], depth + 1, nodes);
        nodes[node_idx].left = Some(left_idx);
    }

    if median + 1 < n {
        let right_idx = build_recursive(entries, &mut indices[median + 1..], depth + 1, nodes);
        nodes[node_idx].right = Some(right_idx);
    }

    node_idx
}
