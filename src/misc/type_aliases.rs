// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Type aliases for common types used all over the code base.

use nalgebra as na;

/// At the moment, the library is focused on f32 computation.
pub type Float = f32;

/// A point with three Float coordinates.
pub type Point3 = na::Point3<Float>;

/// A vector with three Float coordinates.
pub type Vec3 = na::Vector3<Float>;
/// A vector with seven Float coordinates (translation + quaternion).
pub type Vec7 = na::SVector<Float, 7>;
/// A vector with nine Float coordinates (filter error state).
pub type Vec9 = na::SVector<Float, 9>;

/// A 3x3 matrix of Floats.
pub type Mat3 = na::Matrix3<Float>;
/// A 4x4 matrix of Floats.
pub type Mat4 = na::Matrix4<Float>;
/// A 4x3 matrix of Floats (quaternion-derivative block).
pub type Mat4x3 = na::Matrix4x3<Float>;
/// A 7x7 matrix of Floats (innovation covariance).
pub type Mat7 = na::SMatrix<Float, 7, 7>;
/// A 9x9 matrix of Floats (error-state covariance).
pub type Mat9 = na::SMatrix<Float, 9, 9>;
/// A 7x9 matrix of Floats (observation jacobian).
pub type Mat7x9 = na::SMatrix<Float, 7, 9>;
/// A 9x7 matrix of Floats (Kalman gain).
pub type Mat9x7 = na::SMatrix<Float, 9, 7>;

/// A unit quaternion over Floats.
pub type Quat = na::UnitQuaternion<Float>;
