// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Helpers for 4x4 rigid-plus-uniform-scale transforms.
//!
//! The pose convention of the surrounding pipeline is a homogeneous matrix
//! whose top-left 3x3 block is `scale * R` for a rotation R and a positive
//! uniform scale, with the translation in the last column.

use crate::misc::type_aliases::{Float, Mat3, Mat4, Quat, Vec3};

/// Extract the uniform scale of a transform as the mean norm of the three
/// columns of its rotation block. For an exact `scale * R` block all three
/// norms agree; averaging keeps the estimate stable under small
/// non-orthogonality.
pub fn scale_of(transform: &Mat4) -> Float {
    let block = transform.fixed_view::<3, 3>(0, 0);
    (block.column(0).norm() + block.column(1).norm() + block.column(2).norm()) / 3.0
}

/// Extract the rotation of a transform as a unit quaternion.
///
/// The rotation block is descaled first, then projected onto the nearest
/// rotation. Never trust the raw block to be orthogonal.
pub fn rotation_of(transform: &Mat4) -> Quat {
    let block: Mat3 = transform.fixed_view::<3, 3>(0, 0).into_owned() / scale_of(transform);
    Quat::from_matrix(&block)
}

/// Extract the translation of a transform.
pub fn translation_of(transform: &Mat4) -> Vec3 {
    Vec3::new(transform.m14, transform.m24, transform.m34)
}

/// Build a transform from a uniform scale, a rotation and a translation.
pub fn from_parts(scale: Float, rotation: Quat, translation: Vec3) -> Mat4 {
    let mut transform = Mat4::identity();
    transform
        .fixed_view_mut::<3, 3>(0, 0)
        .copy_from(&(scale * rotation.to_rotation_matrix().into_inner()));
    transform
        .fixed_view_mut::<3, 1>(0, 3)
        .copy_from(&translation);
    transform
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use approx::assert_relative_eq;
    use quickcheck_macros;

    const EPSILON_APPROX: Float = 1e-5;

    #[test]
    fn identity_parts() {
        let transform = Mat4::identity();
        assert_relative_eq!(scale_of(&transform), 1.0);
        assert_relative_eq!(rotation_of(&transform).angle(), 0.0, epsilon = EPSILON_APPROX);
        assert_eq!(translation_of(&transform), Vec3::zeros());
    }

    // PROPERTY TESTS ################################################

    #[quickcheck_macros::quickcheck]
    fn parts_round_trip(roll: Float, pitch: Float, yaw: Float, scale: Float) -> bool {
        if !(roll.is_finite() && pitch.is_finite() && yaw.is_finite() && scale.is_finite()) {
            return true;
        }
        let scale = 0.1 + scale.abs() % 10.0;
        let rotation = Quat::from_euler_angles(roll % 1.0, pitch % 1.0, yaw % 1.0);
        let translation = Vec3::new(1.0, -2.0, 3.0);
        let transform = from_parts(scale, rotation, translation);
        approx::relative_eq!(scale_of(&transform), scale, epsilon = EPSILON_APPROX)
            && approx::relative_eq!(
                rotation_of(&transform).to_rotation_matrix(),
                rotation.to_rotation_matrix(),
                epsilon = EPSILON_APPROX
            )
            && translation_of(&transform) == translation
    }
}
