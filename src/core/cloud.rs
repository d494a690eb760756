// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Point clouds with normals and the nearest-neighbor query contract.
//!
//! Construction and maintenance of the spatial index over a cloud is an
//! external capability; this crate only consumes it through the
//! [`SpatialIndex`] trait.

use crate::misc::type_aliases::{Float, Point3, Vec3};

/// A point cloud with an optional per-point unit normal channel.
///
/// Adapters of concrete sensor cloud types are expected to convert into
/// this shape; the correspondence search is provided once over it.
#[derive(Clone, Debug, Default)]
pub struct PointCloud {
    /// Point positions.
    pub positions: Vec<Point3>,
    /// Unit normals, one per position, if the channel is present.
    pub normals: Option<Vec<Vec3>>,
}

impl PointCloud {
    /// A cloud without a normal channel.
    pub fn new(positions: Vec<Point3>) -> Self {
        Self {
            positions,
            normals: None,
        }
    }

    /// A cloud with a normal channel.
    pub fn with_normals(positions: Vec<Point3>, normals: Vec<Vec3>) -> Self {
        Self {
            positions,
            normals: Some(normals),
        }
    }

    /// Number of points in the cloud.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// True if the cloud holds no point.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// The normal channel, or an error naming the cloud role if it is
    /// absent or does not line up with the positions.
    pub fn checked_normals(&self, role: &str) -> Result<&[Vec3], String> {
        let normals = self
            .normals
            .as_deref()
            .ok_or_else(|| format!("{} cloud has no normal channel", role))?;
        if normals.len() != self.positions.len() {
            return Err(format!(
                "{} cloud has {} normals for {} points",
                role,
                normals.len(),
                self.positions.len()
            ));
        }
        Ok(normals)
    }
}

/// Nearest-neighbor query capability over an indexed target cloud.
///
/// Implementations return at most `k` pairs of (target index, squared
/// distance), ordered nearest first. Queries are read-only; whether they
/// may run concurrently is a property of the implementation.
pub trait SpatialIndex {
    /// The `k` nearest indexed points to `query`.
    fn knn(&self, query: &Point3, k: usize) -> Vec<(usize, Float)>;
}
