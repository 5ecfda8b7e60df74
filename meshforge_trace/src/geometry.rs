// Copyright (C) 2023 meshforge contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Rays, bounding boxes, and the per-primitive intersection routines the BVH
//! is built over.

use glam::Vec3;

/// A ray's mutable distance interval. Tightened to `[t_min, hit_t]` as
/// closer hits are discovered so later intersection tests can reject
/// anything farther away without computing a full hit.
#[derive(Debug, Clone, Copy)]
pub struct DistBounds {
    pub t_min: f32,
    pub t_max: f32,
}

impl DistBounds {
    pub fn new(t_min: f32, t_max: f32) -> Self {
        Self { t_min, t_max }
    }

    pub fn contains(&self, t: f32) -> bool {
        t >= self.t_min && t <= self.t_max
    }
}

impl Default for DistBounds {
    fn default() -> Self {
        Self::new(0.0, f32::INFINITY)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Vec3,
    pub dir: Vec3,
    pub dist_bounds: DistBounds,
}

impl Ray {
    pub fn new(origin: Vec3, dir: Vec3) -> Self {
        Self {
            origin,
            dir,
            dist_bounds: DistBounds::default(),
        }
    }

    pub fn with_bounds(origin: Vec3, dir: Vec3, t_min: f32, t_max: f32) -> Self {
        Self {
            origin,
            dir,
            dist_bounds: DistBounds::new(t_min, t_max),
        }
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.dir * t
    }
}

/// An axis-aligned bounding box. The empty box (`min > max` componentwise)
/// is the identity for [`BBox::enclose_box`].
#[derive(Debug, Clone, Copy)]
pub struct BBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BBox {
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    pub fn enclose_point(&self, p: Vec3) -> Self {
        Self {
            min: self.min.min(p),
            max: self.max.max(p),
        }
    }

    pub fn enclose_box(&self, other: &BBox) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn centroid(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn surface_area(&self) -> f32 {
        let d = self.max - self.min;
        if d.x < 0.0 || d.y < 0.0 || d.z < 0.0 {
            return 0.0;
        }
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    /// Slab test against `ray.dist_bounds`. Returns the intersected
    /// `[t_enter, t_exit]` on a hit, or `None` on a miss. Doesn't mutate the
    /// ray: the caller decides whether to descend.
    pub fn hit(&self, ray: &Ray) -> Option<(f32, f32)> {
        let mut t_min = ray.dist_bounds.t_min;
        let mut t_max = ray.dist_bounds.t_max;

        for axis in 0..3 {
            let origin = ray.origin[axis];
            let dir = ray.dir[axis];
            let lo = self.min[axis];
            let hi = self.max[axis];

            if dir == 0.0 {
                if origin < lo || origin > hi {
                    return None;
                }
                continue;
            }

            let inv_dir = 1.0 / dir;
            let mut t0 = (lo - origin) * inv_dir;
            let mut t1 = (hi - origin) * inv_dir;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }

            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }

        Some((t_min, t_max))
    }
}

/// The result of intersecting a ray with a single primitive.
#[derive(Debug, Clone, Copy)]
pub struct Trace {
    pub hit: bool,
    pub distance: f32,
    pub position: Vec3,
    pub normal: Vec3,
    pub origin: Vec3,
}

impl Trace {
    pub fn miss(origin: Vec3) -> Self {
        Self {
            hit: false,
            distance: f32::INFINITY,
            position: Vec3::ZERO,
            normal: Vec3::ZERO,
            origin,
        }
    }

    /// Keeps whichever of `self`/`other` is the closer positive hit; if only
    /// one is a hit, that one wins regardless of distance.
    pub fn min(self, other: Trace) -> Trace {
        match (self.hit, other.hit) {
            (true, true) => {
                if self.distance <= other.distance {
                    self
                } else {
                    other
                }
            }
            (true, false) => self,
            (false, true) => other,
            (false, false) => self,
        }
    }
}

/// The contract every BVH leaf element must satisfy: a conservative bounding
/// box and a ray test that may tighten `ray.dist_bounds.t_max` on a hit.
pub trait Primitive {
    fn bbox(&self) -> BBox;
    fn hit(&self, ray: &mut Ray) -> Trace;
}

#[derive(Debug, Clone, Copy)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Primitive for Sphere {
    fn bbox(&self) -> BBox {
        let r = Vec3::splat(self.radius);
        BBox {
            min: self.center - r,
            max: self.center + r,
        }
    }

    fn hit(&self, ray: &mut Ray) -> Trace {
        let oc = ray.origin - self.center;
        let a = ray.dir.dot(ray.dir);
        let b = 2.0 * oc.dot(ray.dir);
        let c = oc.dot(oc) - self.radius * self.radius;

        let discriminant = b * b - 4.0 * a * c;
        if discriminant < 0.0 {
            return Trace::miss(ray.origin);
        }

        let sqrt_d = discriminant.sqrt();
        let t_near = (-b - sqrt_d) / (2.0 * a);
        let t_far = (-b + sqrt_d) / (2.0 * a);

        let t = if ray.dist_bounds.contains(t_near) {
            t_near
        } else if ray.dist_bounds.contains(t_far) {
            t_far
        } else {
            return Trace::miss(ray.origin);
        };

        let position = ray.at(t);
        ray.dist_bounds.t_max = t;

        Trace {
            hit: true,
            distance: t,
            position,
            normal: (position - self.center) / self.radius,
            origin: ray.origin,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    pub v0: Vec3,
    pub v1: Vec3,
    pub v2: Vec3,
    pub n0: Vec3,
    pub n1: Vec3,
    pub n2: Vec3,
}

impl Triangle {
    const EPSILON: f32 = 1e-6;
}

impl Primitive for Triangle {
    fn bbox(&self) -> BBox {
        BBox::empty()
            .enclose_point(self.v0)
            .enclose_point(self.v1)
            .enclose_point(self.v2)
    }

    fn hit(&self, ray: &mut Ray) -> Trace {
        let e1 = self.v1 - self.v0;
        let e2 = self.v2 - self.v0;
        let s = ray.origin - self.v0;

        let p = ray.dir.cross(e2);
        let d = e1.dot(p);
        if d.abs() <= Self::EPSILON {
            return Trace::miss(ray.origin);
        }
        let inv_d = 1.0 / d;

        let u = s.dot(p) * inv_d;
        if !(0.0..=1.0).contains(&u) {
            return Trace::miss(ray.origin);
        }

        let q = s.cross(e1);
        let v = ray.dir.dot(q) * inv_d;
        if v < 0.0 || u + v > 1.0 {
            return Trace::miss(ray.origin);
        }

        let t = e2.dot(q) * inv_d;
        if !ray.dist_bounds.contains(t) {
            return Trace::miss(ray.origin);
        }

        let w = 1.0 - u - v;
        let normal = (w * self.n0 + u * self.n1 + v * self.n2).normalize();
        let position = ray.at(t);
        ray.dist_bounds.t_max = t;

        Trace {
            hit: true,
            distance: t,
            position,
            normal,
            origin: ray.origin,
        }
    }
}

/// A BVH leaf element tagged by its kind: the same `Bvh` template is
/// instantiated once over triangles and once over whole scene objects, as a
/// tagged variant of mesh/sphere rather than a `dyn Primitive`.
#[derive(Debug, Clone, Copy)]
pub enum SceneObject {
    Mesh(Triangle),
    Sphere(Sphere),
}

impl Primitive for SceneObject {
    fn bbox(&self) -> BBox {
        match self {
            SceneObject::Mesh(t) => t.bbox(),
            SceneObject::Sphere(s) => s.bbox(),
        }
    }

    fn hit(&self, ray: &mut Ray) -> Trace {
        match self {
            SceneObject::Mesh(t) => t.hit(ray),
            SceneObject::Sphere(s) => s.hit(ray),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_hit_from_outside() {
        let sphere = Sphere {
            center: Vec3::ZERO,
            radius: 1.0,
        };
        let mut ray = Ray::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
        let trace = sphere.hit(&mut ray);
        assert!(trace.hit);
        assert!((trace.distance - 1.0).abs() < 1e-5);
        assert!((trace.normal - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn sphere_hit_from_inside_returns_exit_point() {
        let sphere = Sphere {
            center: Vec3::ZERO,
            radius: 1.0,
        };
        let mut ray = Ray::new(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0));
        let trace = sphere.hit(&mut ray);
        assert!(trace.hit);
        assert!(trace.distance > 0.0);
        assert!((trace.distance - 1.0).abs() < 1e-5);
    }

    #[test]
    fn triangle_hit_matches_scenario() {
        let tri = Triangle {
            v0: Vec3::new(0.0, 0.0, 0.0),
            v1: Vec3::new(1.0, 0.0, 0.0),
            v2: Vec3::new(0.0, 1.0, 0.0),
            n0: Vec3::Z,
            n1: Vec3::Z,
            n2: Vec3::Z,
        };
        let mut ray = Ray::new(Vec3::new(0.25, 0.25, 1.0), Vec3::new(0.0, 0.0, -1.0));
        let trace = tri.hit(&mut ray);
        assert!(trace.hit);
        assert!((trace.distance - 1.0).abs() < 1e-5);
        assert!((trace.position - Vec3::new(0.25, 0.25, 0.0)).length() < 1e-5);
    }

    #[test]
    fn triangle_miss_outside_edges() {
        let tri = Triangle {
            v0: Vec3::new(0.0, 0.0, 0.0),
            v1: Vec3::new(1.0, 0.0, 0.0),
            v2: Vec3::new(0.0, 1.0, 0.0),
            n0: Vec3::Z,
            n1: Vec3::Z,
            n2: Vec3::Z,
        };
        let mut ray = Ray::new(Vec3::new(2.0, 2.0, 1.0), Vec3::new(0.0, 0.0, -1.0));
        let trace = tri.hit(&mut ray);
        assert!(!trace.hit);
    }

    #[test]
    fn bbox_hit_composes_with_bounded_ray() {
        let bbox = BBox {
            min: Vec3::splat(-1.0),
            max: Vec3::splat(1.0),
        };
        let unbounded = Ray::new(Vec3::new(-5.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
        let (t0, t1) = bbox.hit(&unbounded).unwrap();
        assert!((t0 - 4.0).abs() < 1e-5);
        assert!((t1 - 6.0).abs() < 1e-5);

        let bounded = Ray::with_bounds(Vec3::new(-5.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), 0.0, 5.0);
        let (t0_b, t1_b) = bbox.hit(&bounded).unwrap();
        assert!((t0_b - 4.0).abs() < 1e-5);
        assert!((t1_b - 5.0).abs() < 1e-5);
    }
}
