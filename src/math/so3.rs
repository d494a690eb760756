// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Lie algebra/group functions for 3D rotations.
//!
//! Interesting reads:
//! - Sophus c++ library: <https://github.com/strasdat/Sophus>
//! - Joan Solà, Quaternion kinematics for the error-state Kalman filter:
//!   <https://arxiv.org/abs/1711.02508>

use nalgebra::Quaternion;
use std::f32::consts::PI;

use crate::misc::type_aliases::{Float, Mat3, Quat, Vec3};

/// Threshold for using Taylor series in computations.
const EPSILON_TAYLOR_SERIES: Float = 1e-2;
const EPSILON_TAYLOR_SERIES_2: Float = EPSILON_TAYLOR_SERIES * EPSILON_TAYLOR_SERIES;
const _1_8: Float = 0.125;
const _1_48: Float = 1.0 / 48.0;

/// Hat operator.
/// Goes from so3 parameterization to so3 element (skew-symmetric matrix).
#[rustfmt::skip]
pub fn hat(w: Vec3) -> Mat3 {
    Mat3::new(
         0.0,  -w.z,   w.y,
         w.z,   0.0,  -w.x,
        -w.y,   w.x,   0.0,
    )
}

/// Compute the exponential map from a rotation vector to a unit quaternion:
/// `exp(v) = ( cos(‖v‖/2), sin(‖v‖/2) * v/‖v‖ )`.
///
/// The Taylor branch makes the map degenerate gracefully to the identity
/// quaternion as `‖v‖ -> 0` (no division by the vanishing norm).
#[allow(clippy::useless_let_if_seq)]
pub fn exp(w: Vec3) -> Quat {
    let theta_2 = w.norm_squared();
    let real_factor;
    let imag_factor;
    if theta_2 < EPSILON_TAYLOR_SERIES_2 {
        real_factor = 1.0 - _1_8 * theta_2;
        imag_factor = 0.5 - _1_48 * theta_2;
    } else {
        let theta = theta_2.sqrt();
        let half_theta = 0.5 * theta;
        real_factor = half_theta.cos();
        imag_factor = half_theta.sin() / theta;
    }
    Quat::from_quaternion(Quaternion::from_parts(real_factor, imag_factor * w))
}

/// Compute the logarithm map from a unit quaternion back to a rotation
/// vector. Inverse of the exponential map.
pub fn log(rotation: Quat) -> Vec3 {
    let imag_vector = rotation.vector();
    let imag_norm_2 = imag_vector.norm_squared();
    let real_factor = rotation.scalar();
    if imag_norm_2 < EPSILON_TAYLOR_SERIES_2 {
        let theta_by_imag_norm = 2.0 / real_factor; // TAYLOR
        theta_by_imag_norm * imag_vector
    } else if real_factor.abs() < EPSILON_TAYLOR_SERIES {
        let imag_norm = imag_norm_2.sqrt();
        let alpha = real_factor.abs() / imag_norm;
        let theta = real_factor.signum() * (PI - 2.0 * alpha); // TAYLOR
        (theta / imag_norm) * imag_vector
    } else {
        let imag_norm = imag_norm_2.sqrt();
        let theta = 2.0 * (imag_norm / real_factor).atan();
        (theta / imag_norm) * imag_vector
    }
}

// TESTS #############################################################
