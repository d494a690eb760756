// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error-state Kalman filter over position, velocity, orientation and a
//! global scale.
//!
//! The filter propagates its state with strapdown inertial integration on
//! every `predict` and corrects it with an absolute pose observation on
//! every `observe`. The 9-dimensional error state stacks position error,
//! velocity error and a small-angle orientation error; the nominal
//! orientation is kept as a unit quaternion and renormalized after every
//! multiplicative update.
//!
//! All calls on one filter instance must be serialized by the caller; the
//! filter performs no locking and never blocks.

use crate::math::{so3, transform};
use crate::misc::type_aliases::{
    Float, Mat3, Mat4, Mat4x3, Mat7, Mat7x9, Mat9, Mat9x7, Quat, Vec3, Vec7, Vec9,
};

/// Constant configuration of the filter, set once at construction.
#[derive(Clone, Debug)]
pub struct FilterConfig {
    /// Process noise over the error state, scaled by dt at propagation.
    pub process_noise: Mat9,
    /// Noise of the pose observation (3 translation + 4 quaternion rows).
    pub observation_noise: Mat7,
    /// Gravity in the world frame.
    pub gravity: Vec3,
    /// Use the Joseph form for the covariance update in `observe`.
    /// Slower, but keeps the covariance positive semi-definite under
    /// numerical error. Off by default to preserve the behavior of the
    /// simplified update.
    pub joseph_update: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        let mut process_noise = Mat9::zeros();
        process_noise
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&(1e-4 * Mat3::identity()));
        process_noise
            .fixed_view_mut::<3, 3>(3, 3)
            .copy_from(&(1e-2 * Mat3::identity()));
        process_noise
            .fixed_view_mut::<3, 3>(6, 6)
            .copy_from(&(1e-4 * Mat3::identity()));
        let mut observation_noise = Mat7::zeros();
        observation_noise
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&(1e-2 * Mat3::identity()));
        observation_noise
            .fixed_view_mut::<4, 4>(3, 3)
            .copy_from(&(1e-4 * Mat4::identity()));
        Self {
            process_noise,
            observation_noise,
            gravity: Vec3::new(0.0, 0.0, 9.80665),
            joseph_update: false,
        }
    }
}

/// Error-state Kalman filter fusing inertial samples with absolute pose
/// observations.
///
/// The filter starts uninitialized; `init` is the only transition into
/// tracking. State is mutated exclusively through `init`, `predict` and
/// `observe`, and read through `state`.
pub struct Ekf {
    config: FilterConfig,
    position: Vec3,
    velocity: Vec3,
    orientation: Quat,
    scale: Float,
    covariance: Mat9,
    last_ns: Option<u64>,
    tracking: bool,
}

impl Ekf {
    /// An uninitialized filter with the given configuration.
    pub fn new(config: FilterConfig) -> Self {
        Self {
            config,
            position: Vec3::zeros(),
            velocity: Vec3::zeros(),
            orientation: Quat::identity(),
            scale: 1.0,
            covariance: Mat9::zeros(),
            last_ns: None,
            tracking: false,
        }
    }

    /// Start tracking from an initial pose and velocity.
    ///
    /// The orientation is re-extracted from the transform through
    /// nearest-orthogonal normalization, the covariance is reset to the
    /// diagonal prior and the scale to 1. The timestamp reference is
    /// cleared so the next `predict` is a warm-up sample.
    pub fn init(&mut self, pose: &Mat4, velocity: Vec3) {
        self.position = transform::translation_of(pose);
        self.orientation = transform::rotation_of(pose);
        self.velocity = velocity;
        self.scale = 1.0;
        self.covariance = 0.5 * Mat9::identity();
        self.last_ns = None;
        self.tracking = true;
    }

    /// Propagate the state with one inertial sample (body-frame
    /// acceleration and angular velocity, timestamp in nanoseconds).
    ///
    /// Warm-up semantics: before `init`, before any reference timestamp
    /// exists, or when `stamp_ns` does not strictly exceed the reference
    /// (repeated or decreasing clocks), the timestamp is recorded and the
    /// state is left untouched.
    pub fn predict(&mut self, acceleration: Vec3, angular_velocity: Vec3, stamp_ns: u64) {
        let dt = match self.last_ns {
            Some(last) if self.tracking && stamp_ns > last => (stamp_ns - last) as Float * 1e-9,
            _ => {
                self.last_ns = Some(stamp_ns);
                return;
            }
        };
        self.last_ns = Some(stamp_ns);

        let rotation = self.orientation.to_rotation_matrix();
        let world_acceleration = rotation * acceleration;
        let nominal_acceleration = world_acceleration - self.config.gravity;

        self.position += self.velocity * dt + (0.5 * dt * dt) * nominal_acceleration;
        self.velocity += nominal_acceleration * dt;
        self.orientation = renormalized(self.orientation * so3::exp(angular_velocity * dt));

        let f = transition_jacobian(world_acceleration, dt);
        self.covariance = f * self.covariance * f.transpose() + self.config.process_noise * dt;
    }

    /// Correct the state with an absolute pose observation.
    ///
    /// The observation is a 4x4 transform whose rotation block may carry a
    /// uniform scale; the scale estimate is refreshed from it first. The
    /// correction is applied to the current state regardless of inertial
    /// staleness. Fails without touching the state when the filter is not
    /// initialized or when the innovation covariance is not positive
    /// definite (near-singular gain).
    pub fn observe(&mut self, observed_pose: &Mat4, _stamp_ns: u64) -> Result<(), String> {
        if !self.tracking {
            return Err("filter has not been initialized".to_string());
        }
        let scale = transform::scale_of(observed_pose);
        let observed_rotation = transform::rotation_of(observed_pose);
        let observed_translation = transform::translation_of(observed_pose);

        let h = self.observation_jacobian();
        let s = h * self.covariance * h.transpose() + self.config.observation_noise;
        let s_inverse = s
            .cholesky()
            .ok_or("Error at Cholesky decomposition of the innovation covariance")?
            .inverse();
        let gain: Mat9x7 = self.covariance * h.transpose() * s_inverse;

        // Linearized residual: raw quaternion components, not a geodesic
        // difference. Valid while corrections stay small between
        // observations.
        let error = pose_vector(&observed_translation, &observed_rotation)
            - pose_vector(&self.position, &self.orientation);
        let dx: Vec9 = gain * error;

        self.scale = scale;
        self.position += dx.fixed_rows::<3>(0);
        self.velocity += dx.fixed_rows::<3>(3);
        self.orientation =
            renormalized(self.orientation * so3::exp(dx.fixed_rows::<3>(6).into_owned()));

        if self.config.joseph_update {
            let identity_kh = Mat9::identity() - gain * h;
            self.covariance = identity_kh * self.covariance * identity_kh.transpose()
                + gain * self.config.observation_noise * gain.transpose();
        } else {
            // Simplified update. Known to lose positive semi-definiteness
            // under numerical error over long runs; `joseph_update` is the
            // provided mitigation.
            self.covariance -= gain * h * self.covariance;
        }
        Ok(())
    }

    /// The current pose as a rigid-plus-scale transform: `scale * R` in
    /// the rotation block, position in the last column. Pure read.
    pub fn state(&self) -> Mat4 {
        transform::from_parts(self.scale, self.orientation, self.position)
    }

    /// Observation jacobian (7x9): translation observed directly, the
    /// quaternion rows through the quaternion-derivative matrix of the
    /// current orientation, velocity unobserved.
    #[rustfmt::skip]
    fn observation_jacobian(&self) -> Mat7x9 {
        let q = self.orientation.quaternion();
        let q_quat = 0.5 * Mat4x3::new(
            -q.i, -q.j, -q.k,
             q.w, -q.k,  q.j,
             q.k,  q.w, -q.i,
            -q.j,  q.i,  q.w,
        );
        let mut h = Mat7x9::zeros();
        h.fixed_view_mut::<3, 3>(0, 0).fill_with_identity();
        h.fixed_view_mut::<4, 3>(3, 6).copy_from(&q_quat);
        h
    }
}

/// State-transition jacobian of the error state. The orientation block
/// couples through the hat of the rotated (not gravity-compensated)
/// acceleration; the constant gravity term contributes nothing.
fn transition_jacobian(world_acceleration: Vec3, dt: Float) -> Mat9 {
    let mut f = Mat9::identity();
    f.fixed_view_mut::<3, 3>(0, 3)
        .copy_from(&(dt * Mat3::identity()));
    f.fixed_view_mut::<3, 3>(3, 6)
        .copy_from(&(-dt * so3::hat(world_acceleration)));
    f
}

/// Stack a translation and the quaternion components (w, x, y, z) into
/// the 7-dimensional observation space.
fn pose_vector(position: &Vec3, orientation: &Quat) -> Vec7 {
    let q = orientation.quaternion();
    Vec7::from([position.x, position.y, position.z, q.w, q.i, q.j, q.k])
}

fn renormalized(orientation: Quat) -> Quat {
    Quat::from_quaternion(orientation.into_inner())
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use approx::assert_relative_eq;

    const EPSILON_APPROX: Float = 1e-5;

    fn tracking_filter() -> Ekf {
        let mut ekf = Ekf::new(FilterConfig::default());
        let pose = transform::from_parts(
            1.0,
            Quat::from_euler_angles(0.1, -0.2, 0.3),
            Vec3::new(1.0, 2.0, -3.0),
        );
        ekf.init(&pose, Vec3::new(0.1, 0.0, -0.1));
        ekf
    }

    #[test]
    fn state_after_init_reproduces_the_pose() {
        let rotation = Quat::from_euler_angles(0.4, 0.5, -0.6);
        let translation = Vec3::new(-1.0, 0.5, 2.0);
        let pose = transform::from_parts(1.0, rotation, translation);
        let mut ekf = Ekf::new(FilterConfig::default());
        ekf.init(&pose, Vec3::zeros());
        assert_relative_eq!(ekf.state(), pose, epsilon = EPSILON_APPROX);
    }

    #[test]
    fn warm_up_and_non_monotone_stamps_leave_the_state_untouched() {
        let mut ekf = tracking_filter();
        let before = ekf.state();
        let sample = Vec3::new(3.0, 2.0, 1.0);

        // First sample only records the reference.
        ekf.predict(sample, sample, 100);
        assert_eq!(ekf.state(), before);
        assert_eq!(ekf.last_ns, Some(100));

        // Repeated stamp.
        ekf.predict(sample, sample, 100);
        assert_eq!(ekf.state(), before);

        // Decreasing stamp.
        ekf.predict(sample, sample, 50);
        assert_eq!(ekf.state(), before);
        assert_eq!(ekf.last_ns, Some(50));
    }

    #[test]
    fn coasting_predict_advances_position_without_rotation_drift() {
        let mut ekf = Ekf::new(FilterConfig::default());
        let velocity = Vec3::new(1.0, -2.0, 0.5);
        ekf.init(&Mat4::identity(), velocity);

        // With identity orientation, feeding gravity itself as the body
        // acceleration makes the nominal acceleration vanish.
        let gravity = ekf.config.gravity;
        ekf.predict(gravity, Vec3::zeros(), 0);
        ekf.predict(gravity, Vec3::zeros(), 10_000_000); // dt = 0.01 s

        assert_relative_eq!(ekf.position, 0.01 * velocity, epsilon = EPSILON_APPROX);
        assert_relative_eq!(ekf.velocity, velocity, epsilon = EPSILON_APPROX);
        assert_relative_eq!(ekf.orientation.angle(), 0.0, epsilon = EPSILON_APPROX);
    }

    #[test]
    fn ten_step_constant_acceleration_matches_closed_form() {
        let mut ekf = Ekf::new(FilterConfig::default());
        ekf.init(&Mat4::identity(), Vec3::zeros());

        let body_acceleration = ekf.config.gravity + Vec3::new(1.0, 0.0, 0.0);
        ekf.predict(body_acceleration, Vec3::zeros(), 0);
        for step in 1..=10u64 {
            ekf.predict(body_acceleration, Vec3::zeros(), step * 10_000_000);
        }

        // x(t) = a t^2 / 2 with a = 1 m/s^2 and t = 0.1 s; the second-order
        // integrator is exact for constant acceleration.
        assert_relative_eq!(
            ekf.position,
            Vec3::new(0.005, 0.0, 0.0),
            epsilon = EPSILON_APPROX
        );
        assert_relative_eq!(
            ekf.velocity,
            Vec3::new(0.1, 0.0, 0.0),
            epsilon = EPSILON_APPROX
        );
    }

    #[test]
    fn covariance_stays_symmetric_through_predict_and_observe() {
        let mut ekf = tracking_filter();
        ekf.predict(Vec3::new(0.5, 9.5, 0.1), Vec3::new(0.02, -0.01, 0.03), 0);
        for step in 1..=50u64 {
            ekf.predict(
                Vec3::new(0.5, 9.5, 0.1),
                Vec3::new(0.02, -0.01, 0.03),
                step * 5_000_000,
            );
        }
        let observation = ekf.state();
        ekf.observe(&observation, 255_000_000).expect("update");

        assert_relative_eq!(
            ekf.covariance,
            ekf.covariance.transpose(),
            epsilon = 1e-4
        );
    }

    #[test]
    fn observing_the_current_estimate_changes_nothing() {
        let mut ekf = tracking_filter();
        ekf.predict(Vec3::new(0.0, 9.8, 0.0), Vec3::zeros(), 0);
        ekf.predict(Vec3::new(0.0, 9.8, 0.0), Vec3::zeros(), 10_000_000);

        let position = ekf.position;
        let velocity = ekf.velocity;
        let orientation = ekf.orientation;
        let observation = ekf.state();
        ekf.observe(&observation, 10_000_000).expect("update");

        assert_relative_eq!(ekf.position, position, epsilon = 1e-4);
        assert_relative_eq!(ekf.velocity, velocity, epsilon = 1e-4);
        assert_relative_eq!(ekf.orientation.angle_to(&orientation), 0.0, epsilon = 1e-4);
    }

    #[test]
    fn observation_scale_is_adopted_by_the_state() {
        let mut ekf = tracking_filter();
        let scaled = transform::from_parts(
            2.0,
            ekf.orientation,
            ekf.position,
        );
        ekf.observe(&scaled, 0).expect("update");
        assert_relative_eq!(transform::scale_of(&ekf.state()), 2.0, epsilon = 1e-4);
        assert_relative_eq!(ekf.position, transform::translation_of(&scaled), epsilon = 1e-4);
    }

    #[test]
    fn indefinite_innovation_covariance_is_rejected() {
        let config = FilterConfig {
            observation_noise: -10.0 * Mat7::identity(),
            ..FilterConfig::default()
        };
        let mut ekf = Ekf::new(config);
        ekf.init(&Mat4::identity(), Vec3::zeros());
        let before = ekf.state();
        let covariance = ekf.covariance;

        let observation = transform::from_parts(1.0, Quat::identity(), Vec3::new(1.0, 0.0, 0.0));
        assert!(ekf.observe(&observation, 0).is_err());
        assert_eq!(ekf.state(), before);
        assert_eq!(ekf.covariance, covariance);
    }

    #[test]
    fn observe_before_init_is_an_error() {
        let mut ekf = Ekf::new(FilterConfig::default());
        assert!(ekf.observe(&Mat4::identity(), 0).is_err());
    }

    #[test]
    fn joseph_update_agrees_with_the_simplified_form() {
        let mut simplified = tracking_filter();
        let mut joseph = Ekf::new(FilterConfig {
            joseph_update: true,
            ..FilterConfig::default()
        });
        joseph.init(&simplified.state(), simplified.velocity);

        let observation = transform::from_parts(
            1.0,
            Quat::from_euler_angles(0.11, -0.19, 0.31),
            Vec3::new(1.05, 1.95, -3.05),
        );
        simplified.observe(&observation, 0).expect("update");
        joseph.observe(&observation, 0).expect("update");

        assert_relative_eq!(simplified.position, joseph.position, epsilon = 1e-4);
        assert_relative_eq!(simplified.covariance, joseph.covariance, epsilon = 1e-3);
    }
}
