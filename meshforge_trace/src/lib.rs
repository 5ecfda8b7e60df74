// Copyright (C) 2023 meshforge contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ray/primitive/BVH geometry kernels, the BSDF family, and the pinhole
//! camera used to drive a path tracer over meshforge scenes.

pub mod bsdf;
pub mod bvh;
pub mod camera;
pub mod geometry;

pub use bsdf::{Bsdf, BsdfRng, BsdfSample};
pub use bvh::{Bvh, BvhBuildConfig};
pub use camera::Camera;
pub use geometry::{BBox, DistBounds, Primitive, Ray, SceneObject, Sphere, Trace, Triangle};
