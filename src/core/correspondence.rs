// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Back-projection correspondence search between two point clouds.
//!
//! For each source point the target index is queried at three points
//! offset along the direction from a reference center to the source point,
//! with widening neighbor counts. Candidates are scored by their squared
//! distance weighted by the angle between source and target normals, which
//! favors matches on similarly-oriented surface patches. The multi-scale
//! offsets compensate for viewpoint-dependent sampling density differences
//! between the two clouds.

use itertools::izip;

use crate::core::cloud::{PointCloud, SpatialIndex};
use crate::misc::type_aliases::{Float, Point3, Vec3};

/// A match between a source point and a target point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Correspondence {
    /// Index of the point in the source cloud.
    pub source_index: usize,
    /// Index of the matched point in the target cloud.
    pub target_index: usize,
    /// Raw squared distance of the match, before normal weighting.
    pub distance: Float,
}

/// Configuration of the back-projection search.
#[derive(Clone, Debug)]
pub struct MatcherConfig {
    /// Base neighbor count per index query.
    pub k: usize,
    /// Maximum accepted raw squared distance for a correspondence.
    pub max_distance: Float,
    /// Offsets along the center-to-point direction, one per query scale.
    pub offset_gains: [Float; 3],
    /// Neighbor count multipliers, one per query scale.
    pub k_multipliers: [usize; 3],
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            k: 10,
            max_distance: 1.0,
            offset_gains: [-0.2, 0.0, 0.2],
            k_multipliers: [1, 2, 3],
        }
    }
}

/// Find for each source point its best match in the target cloud.
///
/// Both clouds must carry a normal channel consistent with their positions,
/// otherwise no search is performed and the configuration failure is
/// returned. Source points whose best raw squared distance exceeds
/// `max_distance` leave no entry; the result stays in source-index order.
///
/// The index must have been built over the target cloud positions. Inputs
/// are read-only; each source point is processed independently.
pub fn determine_correspondences(
    config: &MatcherConfig,
    source: &PointCloud,
    target: &PointCloud,
    index: &dyn SpatialIndex,
    center: Point3,
) -> Result<Vec<Correspondence>, String> {
    let source_normals = source.checked_normals("source")?;
    let target_normals = target.checked_normals("target")?;

    let mut correspondences = Vec::with_capacity(source.len());
    for (source_index, (position, normal)) in izip!(&source.positions, source_normals).enumerate() {
        // Back-projection direction. Collapses to zero when the point
        // coincides with the reference center, so all three queries then
        // land on the point itself.
        let direction = (position - center)
            .try_normalize(Float::EPSILON)
            .unwrap_or_else(Vec3::zeros);

        // (target index, weighted score, raw squared distance)
        let mut best: Option<(usize, Float, Float)> = None;
        for (&gain, &multiplier) in izip!(&config.offset_gains, &config.k_multipliers) {
            let query = position + gain * direction;
            for (target_index, raw_distance) in index.knn(&query, config.k * multiplier) {
                let cos_angle = normal.dot(&target_normals[target_index]);
                let weighted = raw_distance * (2.0 - cos_angle * cos_angle);
                if best.map_or(true, |(_, best_weighted, _)| weighted < best_weighted) {
                    best = Some((target_index, weighted, raw_distance));
                }
            }
        }

        if let Some((target_index, _, distance)) = best {
            if distance <= config.max_distance {
                correspondences.push(Correspondence {
                    source_index,
                    target_index,
                    distance,
                });
            }
        }
    }
    Ok(correspondences)
}

// TESTS #############################################################
