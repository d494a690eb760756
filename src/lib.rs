// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! # Pose Fusion in Rust
//!
//! Numerical core of a visual-inertial localization pipeline:
//! an error-state Kalman filter fusing high-rate inertial samples with
//! lower-rate external pose observations, and a back-projection
//! correspondence search between point clouds with normals.
//!
//! Spatial-index construction, point cloud I/O and the visual front end
//! producing the pose observations are collaborators, not part of this
//! crate. The two components here do not call each other; the surrounding
//! pipeline composes them.

pub mod core;
pub mod math;
pub mod misc;
