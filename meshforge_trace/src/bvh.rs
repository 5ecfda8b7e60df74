// Copyright (C) 2023 meshforge contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A binned-SAH bounding volume hierarchy over a fixed set of [`Primitive`]s.
//!
//! The tree is built once, serially, and is immutable afterwards: [`Bvh::hit`]
//! only ever reads `nodes`/`primitives`, which is what lets [`Bvh::par_hit`]
//! fan a batch of rays out across threads with nothing but `&self`.

use glam::Vec3;
use log::debug;
use rayon::prelude::*;

use crate::geometry::{BBox, Primitive, Ray, Trace};

#[derive(Debug, Clone, Copy)]
pub struct BvhBuildConfig {
    pub max_leaf_size: usize,
    pub n_bins: usize,
}

impl Default for BvhBuildConfig {
    fn default() -> Self {
        Self {
            max_leaf_size: 4,
            n_bins: 16,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Node {
    bbox: BBox,
    start: usize,
    count: usize,
    left: usize,
    right: usize,
}

impl Node {
    fn is_leaf(&self) -> bool {
        self.left == usize::MAX
    }
}

#[derive(Debug, Clone, Copy)]
struct Bin {
    bbox: BBox,
    count: usize,
}

pub struct Bvh<P: Primitive> {
    nodes: Vec<Node>,
    primitives: Vec<P>,
    root: usize,
}

impl<P: Primitive> Bvh<P> {
    pub fn build(mut primitives: Vec<P>, config: BvhBuildConfig) -> Self {
        let mut infos: Vec<(BBox, Vec3)> = primitives
            .iter()
            .map(|p| {
                let bbox = p.bbox();
                (bbox, bbox.centroid())
            })
            .collect();

        let mut nodes = Vec::new();

        let root = if primitives.is_empty() {
            nodes.push(Node {
                bbox: BBox::empty(),
                start: 0,
                count: 0,
                left: usize::MAX,
                right: usize::MAX,
            });
            0
        } else {
            let len = primitives.len();
            Self::build_range(&mut primitives, &mut infos, 0, len, &config, &mut nodes)
        };

        let bvh = Self {
            nodes,
            primitives,
            root,
        };
        debug!(
            "bvh: built {} nodes, max depth {} over {} primitives",
            bvh.nodes.len(),
            bvh.max_depth(),
            bvh.primitives.len()
        );
        bvh
    }

    fn max_depth(&self) -> usize {
        fn depth(nodes: &[Node], idx: usize) -> usize {
            let node = &nodes[idx];
            if node.left == usize::MAX {
                1
            } else {
                1 + depth(nodes, node.left).max(depth(nodes, node.right))
            }
        }
        depth(&self.nodes, self.root)
    }

    fn build_range(
        primitives: &mut [P],
        infos: &mut [(BBox, Vec3)],
        start: usize,
        end: usize,
        config: &BvhBuildConfig,
        nodes: &mut Vec<Node>,
    ) -> usize {
        let count = end - start;
        let bbox = infos[start..end]
            .iter()
            .fold(BBox::empty(), |acc, (b, _)| acc.enclose_box(b));

        let make_leaf = |nodes: &mut Vec<Node>| {
            nodes.push(Node {
                bbox,
                start,
                count,
                left: usize::MAX,
                right: usize::MAX,
            });
            nodes.len() - 1
        };

        if count <= config.max_leaf_size {
            return make_leaf(nodes);
        }

        let centroid_bounds = infos[start..end]
            .iter()
            .fold(BBox::empty(), |acc, (_, c)| acc.enclose_point(*c));
        let extent = centroid_bounds.max - centroid_bounds.min;
        let axis = if extent.x >= extent.y && extent.x >= extent.z {
            0usize
        } else if extent.y >= extent.z {
            1
        } else {
            2
        };

        if extent[axis] < 1e-6 {
            return make_leaf(nodes);
        }

        let n_bins = config.n_bins.max(2);
        let bin_of = |c: f32| -> usize {
            let t = (c - centroid_bounds.min[axis]) / extent[axis];
            ((t * n_bins as f32) as usize).min(n_bins - 1)
        };

        let mut bins = vec![
            Bin {
                bbox: BBox::empty(),
                count: 0
            };
            n_bins
        ];
        for info in infos[start..end].iter() {
            let b = bin_of(info.1[axis]);
            bins[b].count += 1;
            bins[b].bbox = bins[b].bbox.enclose_box(&info.0);
        }

        let mut left_area = vec![0.0f32; n_bins];
        let mut left_count = vec![0usize; n_bins];
        {
            let mut running_box = BBox::empty();
            let mut running_count = 0usize;
            for i in 0..n_bins {
                running_box = running_box.enclose_box(&bins[i].bbox);
                running_count += bins[i].count;
                left_area[i] = running_box.surface_area();
                left_count[i] = running_count;
            }
        }

        let mut right_area = vec![0.0f32; n_bins];
        let mut right_count = vec![0usize; n_bins];
        {
            let mut running_box = BBox::empty();
            let mut running_count = 0usize;
            for i in (0..n_bins).rev() {
                running_box = running_box.enclose_box(&bins[i].bbox);
                running_count += bins[i].count;
                right_area[i] = running_box.surface_area();
                right_count[i] = running_count;
            }
        }

        let mut best_cost = f32::INFINITY;
        let mut best_split = None;
        for i in 0..n_bins - 1 {
            if left_count[i] == 0 || right_count[i + 1] == 0 {
                continue;
            }
            let cost = left_area[i] * left_count[i] as f32
                + right_area[i + 1] * right_count[i + 1] as f32;
            if cost < best_cost {
                best_cost = cost;
                best_split = Some(i);
            }
        }

        let Some(split_bin) = best_split else {
            return make_leaf(nodes);
        };

        let mut i = start;
        let mut j = end;
        while i < j {
            if bin_of(infos[i].1[axis]) <= split_bin {
                i += 1;
            } else {
                j -= 1;
                primitives.swap(i, j);
                infos.swap(i, j);
            }
        }
        let mut mid = i;
        if mid == start || mid == end {
            mid = (start + end) / 2;
        }

        let left = Self::build_range(primitives, infos, start, mid, config, nodes);
        let right = Self::build_range(primitives, infos, mid, end, config, nodes);
        nodes.push(Node {
            bbox,
            start,
            count: 0,
            left,
            right,
        });
        nodes.len() - 1
    }

    /// Near-first traversal: at each interior node, descends into whichever
    /// child's bbox the ray enters first, and only visits the other child if
    /// its entry point is still within the ray's (possibly already
    /// tightened) distance bounds.
    pub fn hit(&self, ray: &mut Ray) -> Trace {
        self.hit_node(self.root, ray)
    }

    fn hit_node(&self, node_idx: usize, ray: &mut Ray) -> Trace {
        let node = self.nodes[node_idx];
        if node.bbox.hit(ray).is_none() {
            return Trace::miss(ray.origin);
        }

        if node.is_leaf() {
            let mut best = Trace::miss(ray.origin);
            for p in &self.primitives[node.start..node.start + node.count] {
                best = best.min(p.hit(ray));
            }
            return best;
        }

        let left_enter = self.nodes[node.left].bbox.hit(ray).map(|(t0, _)| t0);
        let right_enter = self.nodes[node.right].bbox.hit(ray).map(|(t0, _)| t0);

        let (first, second) = match (left_enter, right_enter) {
            (Some(l), Some(r)) if l <= r => (node.left, Some(node.right)),
            (Some(_), Some(_)) => (node.right, Some(node.left)),
            (Some(_), None) => (node.left, None),
            (None, Some(_)) => (node.right, None),
            (None, None) => return Trace::miss(ray.origin),
        };

        let mut best = self.hit_node(first, ray);
        if let Some(second_idx) = second {
            if self.nodes[second_idx].bbox.hit(ray).is_some() {
                best = best.min(self.hit_node(second_idx, ray));
            }
        }
        best
    }

    /// Traces a batch of rays in parallel. Each ray carries its own distance
    /// bounds, so there's no shared mutable state across the threads besides
    /// the (read-only) tree itself.
    pub fn par_hit(&self, rays: &mut [Ray]) -> Vec<Trace>
    where
        P: Sync,
    {
        rays.par_iter_mut().map(|ray| self.hit(ray)).collect()
    }

    pub fn bbox(&self) -> BBox {
        self.nodes[self.root].bbox
    }

    pub fn primitives(&self) -> &[P] {
        &self.primitives
    }

    /// Gives the primitives back to the caller, consuming the tree.
    pub fn destructure(self) -> Vec<P> {
        self.primitives
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Sphere;

    fn grid_of_spheres(n_per_axis: i32) -> Vec<Sphere> {
        let mut spheres = Vec::new();
        for x in 0..n_per_axis {
            for y in 0..n_per_axis {
                for z in 0..n_per_axis {
                    spheres.push(Sphere {
                        center: Vec3::new(x as f32, y as f32, z as f32) * 4.0,
                        radius: 0.4,
                    });
                }
            }
        }
        spheres
    }

    fn linear_hit(spheres: &[Sphere], ray: &mut Ray) -> Trace {
        let mut best = Trace::miss(ray.origin);
        for s in spheres {
            best = best.min(s.hit(ray));
        }
        best
    }

    #[test]
    fn bvh_matches_linear_scan_over_many_spheres() {
        let spheres = grid_of_spheres(10);
        let bvh = Bvh::build(spheres.clone(), BvhBuildConfig::default());

        let mut ray_bvh = Ray::new(Vec3::new(-5.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
        let mut ray_linear = ray_bvh;

        let bvh_trace = bvh.hit(&mut ray_bvh);
        let linear_trace = linear_hit(&spheres, &mut ray_linear);

        assert_eq!(bvh_trace.hit, linear_trace.hit);
        if bvh_trace.hit {
            assert!((bvh_trace.distance - linear_trace.distance).abs() < 1e-4);
        }
    }

    #[test]
    fn empty_bvh_always_misses() {
        let bvh: Bvh<Sphere> = Bvh::build(Vec::new(), BvhBuildConfig::default());
        let mut axis_ray = Ray::new(Vec3::ZERO, Vec3::X);
        assert!(!bvh.hit(&mut axis_ray).hit);

        let mut diagonal_ray = Ray::new(Vec3::ZERO, Vec3::new(1.0, 1.0, 1.0).normalize());
        assert!(!bvh.hit(&mut diagonal_ray).hit);
    }

    #[test]
    fn destructure_returns_all_primitives() {
        let spheres = grid_of_spheres(3);
        let count = spheres.len();
        let bvh = Bvh::build(spheres, BvhBuildConfig::default());
        assert_eq!(bvh.destructure().len(), count);
    }

    #[test]
    fn par_hit_matches_sequential_hit() {
        let spheres = grid_of_spheres(6);
        let bvh = Bvh::build(spheres, BvhBuildConfig::default());

        let mut rays: Vec<Ray> = (0..20)
            .map(|i| Ray::new(Vec3::new(-5.0, i as f32 * 0.3, 0.0), Vec3::new(1.0, 0.0, 0.0)))
            .collect();
        let mut rays_seq = rays.clone();

        let par_traces = bvh.par_hit(&mut rays);
        let seq_traces: Vec<Trace> = rays_seq.iter_mut().map(|r| bvh.hit(r)).collect();

        for (a, b) in par_traces.iter().zip(seq_traces.iter()) {
            assert_eq!(a.hit, b.hit);
            if a.hit {
                assert!((a.distance - b.distance).abs() < 1e-4);
            }
        }
    }
}
