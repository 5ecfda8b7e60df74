// Copyright (C) 2023 meshforge contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end walks through the worked scenarios: single-primitive hits
//! and a BVH cross-checked against a brute-force linear scan.

use glam::Vec3;
use meshforge_trace::{Bvh, BvhBuildConfig, Primitive, Ray, Sphere, Trace, Triangle};

fn linear_scan_hit(spheres: &[Sphere], ray: &mut Ray) -> Trace {
    let mut best = Trace::miss(ray.origin);
    for s in spheres {
        best = best.min(s.hit(ray));
    }
    best
}

/// A ray straight down the +X axis hits a unit sphere at the origin at
/// distance 1, with the surface normal pointing back along -X.
#[test]
fn a_ray_hits_a_single_sphere_at_its_near_point() {
    let sphere = Sphere {
        center: Vec3::ZERO,
        radius: 1.0,
    };
    let mut ray = Ray::new(Vec3::new(-5.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0));

    let trace = sphere.hit(&mut ray);

    assert!(trace.hit);
    assert!((trace.distance - 4.0).abs() < 1e-5);
    assert!((trace.position - Vec3::new(-1.0, 0.0, 0.0)).length() < 1e-5);
    assert!((trace.normal - Vec3::new(-1.0, 0.0, 0.0)).length() < 1e-5);
}

/// A ray through a triangle's interior hits it at the expected barycentric
/// position; the same ray offset past the triangle's edges misses.
#[test]
fn a_ray_hits_a_single_triangle_and_misses_past_its_edges() {
    let tri = Triangle {
        v0: Vec3::new(0.0, 0.0, 0.0),
        v1: Vec3::new(1.0, 0.0, 0.0),
        v2: Vec3::new(0.0, 1.0, 0.0),
        n0: Vec3::Z,
        n1: Vec3::Z,
        n2: Vec3::Z,
    };

    let mut inside = Ray::new(Vec3::new(0.25, 0.25, 1.0), Vec3::new(0.0, 0.0, -1.0));
    let hit = tri.hit(&mut inside);
    assert!(hit.hit);
    assert!((hit.distance - 1.0).abs() < 1e-5);
    assert!((hit.normal - Vec3::Z).length() < 1e-5);

    let mut outside = Ray::new(Vec3::new(5.0, 5.0, 1.0), Vec3::new(0.0, 0.0, -1.0));
    let miss = tri.hit(&mut outside);
    assert!(!miss.hit);
}

/// Building a BVH over a thousand spheres and firing a batch of rays
/// through it produces exactly the same hit/miss verdicts and distances a
/// brute-force linear scan over the same spheres would.
#[test]
fn bvh_hits_over_a_thousand_spheres_match_a_linear_scan() {
    let mut spheres = Vec::new();
    for x in 0..10 {
        for y in 0..10 {
            for z in 0..10 {
                spheres.push(Sphere {
                    center: Vec3::new(x as f32, y as f32, z as f32) * 3.0,
                    radius: 0.6,
                });
            }
        }
    }
    assert_eq!(spheres.len(), 1000);

    let bvh = Bvh::build(spheres.clone(), BvhBuildConfig::default());

    let rays: Vec<Ray> = (0..40)
        .map(|i| {
            let offset = i as f32 * 0.75;
            Ray::new(Vec3::new(-5.0, offset, offset * 0.5), Vec3::new(1.0, 0.0, 0.0))
        })
        .collect();

    for ray in &rays {
        let mut bvh_ray = *ray;
        let mut linear_ray = *ray;

        let bvh_trace = bvh.hit(&mut bvh_ray);
        let linear_trace = linear_scan_hit(&spheres, &mut linear_ray);

        assert_eq!(bvh_trace.hit, linear_trace.hit);
        if bvh_trace.hit {
            assert!((bvh_trace.distance - linear_trace.distance).abs() < 1e-3);
            assert!((bvh_trace.position - linear_trace.position).length() < 1e-3);
        }
    }
}

/// The same cross-check in parallel: `par_hit` over the whole ray batch
/// must agree with tracing each ray sequentially.
#[test]
fn parallel_bvh_hits_match_sequential_hits_over_many_spheres() {
    let mut spheres = Vec::new();
    for x in 0..10 {
        for y in 0..10 {
            for z in 0..10 {
                spheres.push(Sphere {
                    center: Vec3::new(x as f32, y as f32, z as f32) * 3.0,
                    radius: 0.6,
                });
            }
        }
    }

    let bvh = Bvh::build(spheres, BvhBuildConfig::default());

    let mut par_rays: Vec<Ray> = (0..40)
        .map(|i| Ray::new(Vec3::new(-5.0, i as f32 * 0.75, 0.0), Vec3::new(1.0, 0.0, 0.0)))
        .collect();
    let mut seq_rays = par_rays.clone();

    let par_traces = bvh.par_hit(&mut par_rays);
    let seq_traces: Vec<Trace> = seq_rays.iter_mut().map(|r| bvh.hit(r)).collect();

    for (p, s) in par_traces.iter().zip(seq_traces.iter()) {
        assert_eq!(p.hit, s.hit);
        if p.hit {
            assert!((p.distance - s.distance).abs() < 1e-4);
        }
    }
}
