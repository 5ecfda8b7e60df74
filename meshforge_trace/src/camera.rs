// Copyright (C) 2023 meshforge contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A pinhole camera: a world-to-camera `view` matrix plus the field of view,
//! aspect ratio, and sensor distance needed to turn a pair of normalized
//! screen coordinates into a world-space [`Ray`].

use glam::{Mat4, Vec3};

use crate::geometry::Ray;

#[derive(Debug, Clone, Copy)]
pub struct Camera {
    /// World-to-camera transform, the same convention as a GL view matrix.
    pub view: Mat4,
    /// Vertical field of view, in radians.
    pub vfov: f32,
    pub aspect: f32,
    pub focal_dist: f32,
}

impl Camera {
    pub fn new(view: Mat4, vfov: f32, aspect: f32, focal_dist: f32) -> Self {
        Self {
            view,
            vfov,
            aspect,
            focal_dist,
        }
    }

    /// Convenience constructor mirroring the eye/target/up parameterization
    /// most ray tracers expose, built on `glam::Mat4::look_at_rh` rather
    /// than a hand-rolled basis.
    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3, vfov: f32, aspect: f32, focal_dist: f32) -> Self {
        Self::new(Mat4::look_at_rh(eye, target, up), vfov, aspect, focal_dist)
    }

    /// Builds a ray through normalized screen coordinates `u, v`, each in
    /// `[-1, 1]`, with `(0, 0)` at the center of the sensor. Constructed by
    /// placing a point on the sensor plane in camera space and mapping both
    /// it and the camera's origin through `view`'s inverse back into world
    /// space — the `view⁻¹ · sensor` step that gives the method its name.
    pub fn ray(&self, u: f32, v: f32) -> Ray {
        let half_height = (self.vfov * 0.5).tan() * self.focal_dist;
        let half_width = half_height * self.aspect;

        let sensor_point_cam = Vec3::new(u * half_width, v * half_height, -self.focal_dist);

        let inv_view = self.view.inverse();
        let origin = inv_view.transform_point3(Vec3::ZERO);
        let sensor_point = inv_view.transform_point3(sensor_point_cam);

        Ray::new(origin, (sensor_point - origin).normalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn ray_through_center_points_at_the_target() {
        let camera = Camera::look_at(
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::ZERO,
            Vec3::Y,
            FRAC_PI_2,
            1.0,
            1.0,
        );
        let ray = camera.ray(0.0, 0.0);
        assert!((ray.origin - Vec3::new(0.0, 0.0, 5.0)).length() < 1e-4);
        assert!((ray.dir - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-4);
    }

    #[test]
    fn wider_aspect_widens_the_horizontal_spread() {
        let narrow = Camera::look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y, FRAC_PI_2, 1.0, 1.0);
        let wide = Camera::look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y, FRAC_PI_2, 2.0, 1.0);

        let narrow_edge = narrow.ray(1.0, 0.0);
        let wide_edge = wide.ray(1.0, 0.0);

        assert!(wide_edge.dir.x.abs() > narrow_edge.dir.x.abs());
    }
}
