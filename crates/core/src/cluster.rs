//! Geographic batch partitioning.
//!
//! The OSM API rejects a changeset whose bounding box grows past a size
//! limit, so a country-wide set of edits can never travel in one changeset.
//! This module partitions an arbitrary set of located payloads into clusters
//! whose bounding-box diagonal stays within a configured limit, while keeping
//! the cluster count low and guaranteeing that no payload is lost or
//! duplicated.
//!
//! The algorithm is two-phase:
//!
//! 1. **Grid binning** - each point lands in a coarse grid cell sized at
//!    `max_diagonal * cell_ratio`. With the default ratio of 0.5 a single
//!    cell can never exceed the limit, so this phase alone usually settles
//!    the partition.
//! 2. **Bounded k-means refinement** - a cell whose extent still exceeds the
//!    limit is re-split into `ceil(diagonal / max_diagonal) + 1` groups by
//!    centroid assignment, iterated to convergence under a fixed round cap.
//!
//! Everything here is pure and deterministic: no randomness in seeding, grid
//! cells are visited in key order, and distance ties resolve to the lowest
//! centroid index. Refined clusters are *not* re-checked against the limit -
//! with a heavily skewed point density the k estimate can fall short, and
//! such a cluster is returned as-is. Callers that need a hard guarantee can
//! test each cluster with [`Cluster::is_within`] and feed oversized ones back
//! through [`partition_with`].

use std::collections::BTreeMap;

use crate::coord::{centroid, haversine_distance, BoundingBox, Coord};

/// Default changeset bounding-box diagonal limit, in degrees.
///
/// Roughly 28 km at the equator - conservatively below what the OSM API
/// tolerates.
pub const DEFAULT_MAX_DIAGONAL: f64 = 0.25;

/// Tuning knobs for the partitioner.
///
/// The defaults reproduce the behavior the changeset size limit was tuned
/// against; the knobs exist for experimentation, not for routine use.
#[derive(Debug, Clone)]
pub struct PartitionConfig {
    /// Maximum allowed bounding-box diagonal per cluster, in degrees.
    pub max_diagonal: f64,
    /// Grid cell size as a fraction of `max_diagonal`.
    pub cell_ratio: f64,
    /// Hard cap on k-means rounds during refinement.
    pub max_rounds: usize,
    /// Centroid movement (km) below which refinement counts as converged.
    pub convergence_km: f64,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            max_diagonal: DEFAULT_MAX_DIAGONAL,
            cell_ratio: 0.5,
            max_rounds: 10,
            convergence_km: 0.001,
        }
    }
}

impl PartitionConfig {
    /// Config with a custom diagonal limit and default tuning.
    pub fn new(max_diagonal: f64) -> Self {
        Self {
            max_diagonal,
            ..Default::default()
        }
    }

    /// Set the grid cell size as a fraction of the diagonal limit.
    pub fn with_cell_ratio(mut self, ratio: f64) -> Self {
        self.cell_ratio = ratio;
        self
    }

    /// Set the k-means round cap.
    pub fn with_max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = rounds;
        self
    }
}

/// A group of payloads destined for one changeset.
#[derive(Debug, Clone)]
pub struct Cluster<T> {
    pub members: Vec<T>,
    pub bbox: BoundingBox,
    pub centroid: Coord,
}

impl<T> Cluster<T> {
    fn from_members(members: Vec<(T, Coord)>) -> Self {
        let coords: Vec<Coord> = members.iter().map(|(_, c)| *c).collect();
        Self {
            bbox: BoundingBox::from_coords(&coords),
            centroid: centroid(&coords),
            members: members.into_iter().map(|(t, _)| t).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Planar diagonal of the cluster's bounding box, in degrees.
    pub fn diagonal(&self) -> f64 {
        self.bbox.diagonal()
    }

    /// Whether the cluster respects the given diagonal limit.
    ///
    /// Clusters that went through refinement are not re-verified on the way
    /// out, so this is the hook for callers that want a hard guarantee.
    pub fn is_within(&self, max_diagonal: f64) -> bool {
        self.diagonal() <= max_diagonal
    }
}

/// Partition payloads into clusters with the default tuning.
///
/// `locate` extracts each payload's coordinate; payloads for which it
/// returns `None` (or an invalid (0, 0) coordinate) are silently excluded.
/// The union of all cluster members is exactly the set of locatable inputs.
/// Empty input yields an empty partition.
pub fn partition<T, F>(items: impl IntoIterator<Item = T>, locate: F, max_diagonal: f64) -> Vec<Cluster<T>>
where
    F: Fn(&T) -> Option<Coord>,
{
    partition_with(items, locate, &PartitionConfig::new(max_diagonal))
}

/// Partition payloads into clusters with explicit tuning.
pub fn partition_with<T, F>(
    items: impl IntoIterator<Item = T>,
    locate: F,
    config: &PartitionConfig,
) -> Vec<Cluster<T>>
where
    F: Fn(&T) -> Option<Coord>,
{
    let located: Vec<(T, Coord)> = items
        .into_iter()
        .filter_map(|item| {
            let coord = locate(&item).filter(Coord::is_valid)?;
            Some((item, coord))
        })
        .collect();

    if located.is_empty() {
        return Vec::new();
    }

    let cell_size = config.max_diagonal * config.cell_ratio;

    // BTreeMap keeps cell visit order stable across runs.
    let mut grid: BTreeMap<(i64, i64), Vec<(T, Coord)>> = BTreeMap::new();
    for (item, coord) in located {
        let key = (
            (coord.lat / cell_size).floor() as i64,
            (coord.lon / cell_size).floor() as i64,
        );
        grid.entry(key).or_default().push((item, coord));
    }

    let mut clusters = Vec::new();
    for (_, cell) in grid {
        let coords: Vec<Coord> = cell.iter().map(|(_, c)| *c).collect();
        let bbox = BoundingBox::from_coords(&coords);

        if bbox.diagonal() <= config.max_diagonal {
            clusters.push(Cluster::from_members(cell));
        } else {
            clusters.extend(refine(cell, config));
        }
    }

    log::debug!(
        "Partitioned input into {} clusters (limit {} degrees)",
        clusters.len(),
        config.max_diagonal
    );

    clusters
}

/// Split an oversized group into clusters that should respect the limit.
fn refine<T>(group: Vec<(T, Coord)>, config: &PartitionConfig) -> Vec<Cluster<T>> {
    // Two points or fewer can always be spread into singleton clusters;
    // clustering would be meaningless at this size.
    if group.len() <= 2 {
        return singletons(group);
    }

    let coords: Vec<Coord> = group.iter().map(|(_, c)| *c).collect();
    let diagonal = BoundingBox::from_coords(&coords).diagonal();

    // Heuristic cluster count, assuming roughly uniform density. The +1 is
    // the safety margin for the cases where the assumption is off.
    let k = ((diagonal / config.max_diagonal).ceil() as usize + 1).max(2);

    k_means(group, k, config)
}

/// Centroid-based iterative assignment of a group into at most `k` clusters.
fn k_means<T>(group: Vec<(T, Coord)>, k: usize, config: &PartitionConfig) -> Vec<Cluster<T>> {
    if group.len() <= k {
        return singletons(group);
    }

    let coords: Vec<Coord> = group.iter().map(|(_, c)| *c).collect();
    let bbox = BoundingBox::from_coords(&coords);

    // Seed centroids evenly along the bounding box from corner to corner.
    // Weaker than k-means++ seeding but fully deterministic; k is at least
    // 2 here so the divisor never hits zero.
    let mut centroids: Vec<Coord> = (0..k)
        .map(|i| {
            let t = i as f64 / (k - 1) as f64;
            Coord::new(
                bbox.min_lat + t * bbox.height(),
                bbox.min_lon + t * bbox.width(),
            )
        })
        .collect();

    let mut assignments: Vec<usize> = vec![0; group.len()];

    for _ in 0..config.max_rounds {
        // Assignment step: nearest centroid, ties to the lowest index.
        for (slot, (_, coord)) in assignments.iter_mut().zip(&group) {
            let mut nearest = 0;
            let mut min_dist = haversine_distance(*coord, centroids[0]);
            for (i, candidate) in centroids.iter().enumerate().skip(1) {
                let dist = haversine_distance(*coord, *candidate);
                if dist < min_dist {
                    min_dist = dist;
                    nearest = i;
                }
            }
            *slot = nearest;
        }

        // Update step: move each centroid to the mean of its members. A
        // centroid with no members keeps its position; its cluster simply
        // ends up empty and is dropped at the end.
        let mut converged = true;
        for (i, current) in centroids.iter_mut().enumerate() {
            let member_coords: Vec<Coord> = group
                .iter()
                .zip(&assignments)
                .filter(|(_, assigned)| **assigned == i)
                .map(|((_, c), _)| *c)
                .collect();
            if member_coords.is_empty() {
                continue;
            }

            let updated = centroid(&member_coords);
            if haversine_distance(*current, updated) > config.convergence_km {
                converged = false;
            }
            *current = updated;
        }

        if converged {
            break;
        }
    }

    let mut buckets: Vec<Vec<(T, Coord)>> = (0..k).map(|_| Vec::new()).collect();
    for (member, assigned) in group.into_iter().zip(assignments) {
        buckets[assigned].push(member);
    }

    buckets
        .into_iter()
        .filter(|bucket| !bucket.is_empty())
        .map(Cluster::from_members)
        .collect()
}

fn singletons<T>(group: Vec<(T, Coord)>) -> Vec<Cluster<T>> {
    group
        .into_iter()
        .map(|(item, coord)| Cluster {
            members: vec![item],
            bbox: BoundingBox::from_coords(&[coord]),
            centroid: coord,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(coords: &[(f64, f64)]) -> Vec<Coord> {
        coords.iter().map(|&(lat, lon)| Coord::new(lat, lon)).collect()
    }

    fn coord_of(c: &Coord) -> Option<Coord> {
        Some(*c)
    }

    // ========== Degenerate Inputs ==========

    #[test]
    fn test_empty_input() {
        let clusters = partition(Vec::<Coord>::new(), coord_of, 0.25);
        assert!(clusters.is_empty());
    }

    #[test]
    fn test_single_point() {
        let clusters = partition(points(&[(44.0, 25.0)]), coord_of, 0.25);

        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 1);
        assert_eq!(clusters[0].diagonal(), 0.0);
        assert_eq!(clusters[0].centroid, Coord::new(44.0, 25.0));
    }

    #[test]
    fn test_invalid_points_excluded() {
        let input = points(&[(44.0, 25.0), (0.0, 0.0), (0.0, 25.0), (44.0, 0.0)]);
        let clusters = partition(input, coord_of, 0.25);

        let total: usize = clusters.iter().map(Cluster::len).sum();
        assert_eq!(total, 1);
    }

    #[test]
    fn test_unlocatable_payloads_excluded() {
        // locate returning None drops the payload without error
        let clusters = partition(vec![1, 2, 3], |_| None::<Coord>, 0.25);
        assert!(clusters.is_empty());
    }

    // ========== Grid Path ==========

    #[test]
    fn test_two_near_points_cluster_together() {
        let input = points(&[(44.0, 25.0), (44.01, 25.01)]);
        let clusters = partition(input, coord_of, 0.5);

        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 2);
        assert!(clusters[0].is_within(0.5));
    }

    #[test]
    fn test_two_far_points_split() {
        let input = points(&[(44.0, 25.0), (48.0, 28.0)]);
        let clusters = partition(input, coord_of, 0.5);

        assert_eq!(clusters.len(), 2);
        for cluster in &clusters {
            assert_eq!(cluster.len(), 1);
            assert_eq!(cluster.diagonal(), 0.0);
        }
    }

    #[test]
    fn test_grid_path_respects_limit() {
        // A tight blob plus a handful of outliers; with the default cell
        // ratio every cell is at most cell_size * sqrt(2) < max_diagonal
        // across, so no cluster can exceed the limit.
        let mut coords = Vec::new();
        for i in 0..20 {
            coords.push(Coord::new(45.0 + 0.001 * i as f64, 25.0 + 0.001 * i as f64));
        }
        coords.push(Coord::new(46.5, 25.0));
        coords.push(Coord::new(45.0, 27.5));

        let clusters = partition(coords, coord_of, 0.25);

        let total: usize = clusters.iter().map(Cluster::len).sum();
        assert_eq!(total, 22);
        for cluster in &clusters {
            assert!(cluster.is_within(0.25), "diagonal {}", cluster.diagonal());
        }
    }

    #[test]
    fn test_completeness_no_loss_no_duplication() {
        let mut input = Vec::new();
        for i in 0..50 {
            // ids as payloads, spread over a few degrees
            input.push((i, Coord::new(44.0 + (i % 7) as f64 * 0.3, 25.0 + (i % 5) as f64 * 0.4)));
        }

        let clusters = partition(input.clone(), |p: &(i32, Coord)| Some(p.1), 0.25);

        let mut seen: Vec<i32> = clusters
            .iter()
            .flat_map(|c| c.members.iter().map(|(id, _)| *id))
            .collect();
        seen.sort_unstable();
        let expected: Vec<i32> = (0..50).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_determinism() {
        let input = points(&[
            (44.4268, 26.1025),
            (46.7712, 23.6236),
            (47.1585, 27.6014),
            (45.7489, 21.2087),
            (44.1598, 28.6348),
            (44.4368, 26.1125),
        ]);

        let a = partition(input.clone(), coord_of, 0.25);
        let b = partition(input, coord_of, 0.25);

        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.members, y.members);
            assert_eq!(x.bbox, y.bbox);
            assert_eq!(x.centroid, y.centroid);
        }
    }

    // ========== Refinement Path ==========

    #[test]
    fn test_refine_two_points_become_singletons() {
        let group: Vec<(Coord, Coord)> = points(&[(44.0, 25.0), (47.0, 28.0)])
            .into_iter()
            .map(|c| (c, c))
            .collect();

        let clusters = refine(group, &PartitionConfig::new(0.25));

        assert_eq!(clusters.len(), 2);
        assert!(clusters.iter().all(|c| c.len() == 1 && c.diagonal() == 0.0));
    }

    #[test]
    fn test_refine_splits_oversized_group() {
        // Two tight blobs 2 degrees apart, plus a straggler between them:
        // one group with a diagonal well over the limit, but few enough
        // target clusters that real k-means assignment happens.
        let mut group = Vec::new();
        for i in 0..5 {
            group.push(Coord::new(44.0 + 0.01 * i as f64, 25.0));
        }
        for i in 0..5 {
            group.push(Coord::new(46.0 + 0.01 * i as f64, 27.0));
        }
        group.push(Coord::new(45.0, 26.0));
        let group: Vec<(Coord, Coord)> = group.into_iter().map(|c| (c, c)).collect();

        let config = PartitionConfig::new(1.0);
        let clusters = refine(group, &config);

        assert!(clusters.len() >= 2);
        let total: usize = clusters.iter().map(Cluster::len).sum();
        assert_eq!(total, 11);
        // The blobs must survive as real multi-member clusters
        assert!(clusters.iter().any(|c| c.len() == 5));
        for cluster in &clusters {
            assert!(
                cluster.is_within(1.0),
                "refined cluster diagonal {}",
                cluster.diagonal()
            );
        }
    }

    #[test]
    fn test_refinement_reached_through_driver() {
        // Blow the cell size up past the limit so the grid phase emits an
        // oversized bucket and the driver has to refine it.
        let config = PartitionConfig::new(0.25).with_cell_ratio(8.0);

        let input = points(&[
            (44.90, 25.10),
            (44.91, 25.11),
            (45.40, 25.60),
            (45.41, 25.61),
            (45.90, 25.95),
        ]);

        let clusters = partition_with(input, coord_of, &config);

        assert!(clusters.len() > 1, "expected the oversized cell to split");
        let total: usize = clusters.iter().map(Cluster::len).sum();
        assert_eq!(total, 5);
    }

    #[test]
    fn test_fewer_points_than_k_become_singletons() {
        // Diagonal of ~4.2 degrees at a 0.25 limit asks for k = 18, far
        // more than the 3 points available.
        let group: Vec<(Coord, Coord)> = points(&[(44.0, 25.0), (46.0, 27.0), (47.0, 28.0)])
            .into_iter()
            .map(|c| (c, c))
            .collect();

        let clusters = refine(group, &PartitionConfig::new(0.25));

        assert_eq!(clusters.len(), 3);
        assert!(clusters.iter().all(|c| c.len() == 1));
    }

    #[test]
    fn test_empty_kmeans_clusters_dropped() {
        // 4 collinear points with an inflated k: some seeds never win a
        // point and their clusters must not surface in the output.
        let group: Vec<(Coord, Coord)> = points(&[
            (44.0, 25.0),
            (44.01, 25.01),
            (45.0, 26.0),
            (45.01, 26.01),
            (44.02, 25.02),
        ])
        .into_iter()
        .map(|c| (c, c))
        .collect();

        let clusters = k_means(group, 4, &PartitionConfig::new(0.25));

        let total: usize = clusters.iter().map(Cluster::len).sum();
        assert_eq!(total, 5);
        assert!(clusters.iter().all(|c| !c.is_empty()));
        assert!(clusters.len() <= 4);
    }

    // ========== Config ==========

    #[test]
    fn test_config_defaults() {
        let config = PartitionConfig::default();
        assert_eq!(config.max_diagonal, DEFAULT_MAX_DIAGONAL);
        assert_eq!(config.cell_ratio, 0.5);
        assert_eq!(config.max_rounds, 10);
        assert_eq!(config.convergence_km, 0.001);
    }

    #[test]
    fn test_config_builder() {
        let config = PartitionConfig::new(0.5)
            .with_cell_ratio(0.75)
            .with_max_rounds(5);
        assert_eq!(config.max_diagonal, 0.5);
        assert_eq!(config.cell_ratio, 0.75);
        assert_eq!(config.max_rounds, 5);
    }
}
