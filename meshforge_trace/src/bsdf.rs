// Copyright (C) 2023 meshforge contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Surface scattering models. Directions are always expressed in the local
//! shading frame where the surface normal is `(0, 1, 0)`; it's the caller's
//! job to transform in and out of that frame.

use std::f32::consts::PI;

use glam::Vec3;

/// Decouples the BSDF family from any particular RNG so tests can supply
/// deterministic sequences instead of a real source of randomness.
pub trait BsdfRng {
    fn next_f32(&mut self) -> f32;

    fn next_bool_weighted(&mut self, p: f32) -> bool {
        self.next_f32() < p
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BsdfSample {
    pub in_dir: Vec3,
    pub attenuation: Vec3,
    pub pdf: f32,
    pub emitted: Vec3,
    /// True when the sampled ray continues inside the surface (e.g. a
    /// refracted ray entering a dielectric), for callers that need to track
    /// medium changes.
    pub entering: bool,
}

#[derive(Debug, Clone, Copy)]
pub enum Bsdf {
    Lambertian { albedo: Vec3 },
    Mirror,
    Refract { eta: f32 },
    Glass { eta: f32 },
    Emissive { radiance: Vec3 },
}

fn cosine_sample_hemisphere(rng: &mut dyn BsdfRng) -> Vec3 {
    let u1 = rng.next_f32();
    let u2 = rng.next_f32();
    let r = u1.sqrt();
    let theta = 2.0 * PI * u2;
    let x = r * theta.cos();
    let z = r * theta.sin();
    let y = (1.0 - u1).max(0.0).sqrt();
    Vec3::new(x, y, z)
}

fn mirror_reflect(out_dir: Vec3) -> Vec3 {
    Vec3::new(-out_dir.x, out_dir.y, -out_dir.z)
}

/// Snell's law in the local frame, where the normal is `(0, 1, 0)`. Returns
/// `None` on total internal reflection.
fn refract(out_dir: Vec3, eta: f32) -> Option<Vec3> {
    let cos_i = out_dir.y.abs();
    let sin2_i = (1.0 - cos_i * cos_i).max(0.0);
    let sin2_t = sin2_i / (eta * eta);
    if sin2_t >= 1.0 {
        return None;
    }
    let cos_t = (1.0 - sin2_t).sqrt();
    let sign = if out_dir.y > 0.0 { -1.0 } else { 1.0 };
    Some(Vec3::new(-out_dir.x / eta, sign * cos_t, -out_dir.z / eta))
}

/// Fresnel reflectance for unpolarized light at a dielectric interface.
fn fresnel_dielectric(cos_i: f32, cos_t: f32, eta_i: f32, eta_t: f32) -> f32 {
    let r_parallel = (eta_t * cos_i - eta_i * cos_t) / (eta_t * cos_i + eta_i * cos_t);
    let r_perp = (eta_i * cos_i - eta_t * cos_t) / (eta_i * cos_i + eta_t * cos_t);
    (r_parallel * r_parallel + r_perp * r_perp) * 0.5
}

impl Bsdf {
    pub fn sample(&self, out_dir: Vec3, rng: &mut dyn BsdfRng) -> BsdfSample {
        match self {
            Bsdf::Lambertian { albedo } => {
                let in_dir = cosine_sample_hemisphere(rng);
                let pdf = in_dir.y / PI;
                BsdfSample {
                    in_dir,
                    attenuation: *albedo / PI,
                    pdf,
                    emitted: Vec3::ZERO,
                    entering: false,
                }
            }
            Bsdf::Mirror => BsdfSample {
                in_dir: mirror_reflect(out_dir),
                attenuation: if out_dir.y > 0.0 { Vec3::ONE } else { Vec3::ZERO },
                pdf: 1.0,
                emitted: Vec3::ZERO,
                entering: false,
            },
            Bsdf::Refract { eta } => {
                let entering = out_dir.y > 0.0;
                let eta = if entering { *eta } else { 1.0 / eta };
                match refract(out_dir, eta) {
                    Some(in_dir) => BsdfSample {
                        in_dir,
                        attenuation: Vec3::ONE,
                        pdf: 1.0,
                        emitted: Vec3::ZERO,
                        entering,
                    },
                    None => BsdfSample {
                        in_dir: mirror_reflect(out_dir),
                        attenuation: Vec3::ONE,
                        pdf: 1.0,
                        emitted: Vec3::ZERO,
                        entering: false,
                    },
                }
            }
            Bsdf::Glass { eta } => {
                let entering = out_dir.y > 0.0;
                let relative_eta = if entering { *eta } else { 1.0 / eta };
                let cos_i = out_dir.y.abs();

                let refracted = refract(out_dir, relative_eta);
                let reflectance = match refracted {
                    None => 1.0,
                    Some(in_dir) => {
                        let cos_t = in_dir.y.abs();
                        if entering {
                            fresnel_dielectric(cos_i, cos_t, 1.0, *eta)
                        } else {
                            fresnel_dielectric(cos_i, cos_t, *eta, 1.0)
                        }
                    }
                };

                if refracted.is_none() || rng.next_bool_weighted(reflectance) {
                    BsdfSample {
                        in_dir: mirror_reflect(out_dir),
                        attenuation: Vec3::ONE,
                        pdf: 1.0,
                        emitted: Vec3::ZERO,
                        entering: false,
                    }
                } else {
                    BsdfSample {
                        in_dir: refracted.unwrap(),
                        attenuation: Vec3::ONE,
                        pdf: 1.0,
                        emitted: Vec3::ZERO,
                        entering,
                    }
                }
            }
            Bsdf::Emissive { radiance } => BsdfSample {
                in_dir: cosine_sample_hemisphere(rng),
                attenuation: Vec3::ZERO,
                pdf: 1.0,
                emitted: *radiance,
                entering: false,
            },
        }
    }

    /// Evaluates the BSDF for an explicit pair of directions, used by
    /// next-event-estimation style integrators that don't go through
    /// `sample`. Delta distributions (mirror, the specular lobes of
    /// refract/glass) have no finite value and evaluate to zero.
    pub fn evaluate(&self, _out_dir: Vec3, in_dir: Vec3) -> Vec3 {
        match self {
            Bsdf::Lambertian { albedo } => {
                if in_dir.y > 0.0 {
                    *albedo / PI
                } else {
                    Vec3::ZERO
                }
            }
            Bsdf::Mirror | Bsdf::Refract { .. } | Bsdf::Glass { .. } => Vec3::ZERO,
            Bsdf::Emissive { .. } => Vec3::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SequenceRng {
        values: Vec<f32>,
        cursor: usize,
    }
    impl SequenceRng {
        fn new(values: Vec<f32>) -> Self {
            Self { values, cursor: 0 }
        }
    }
    impl BsdfRng for SequenceRng {
        fn next_f32(&mut self) -> f32 {
            let v = self.values[self.cursor % self.values.len()];
            self.cursor += 1;
            v
        }
    }

    #[test]
    fn lambertian_sample_stays_in_upper_hemisphere() {
        let bsdf = Bsdf::Lambertian {
            albedo: Vec3::splat(0.8),
        };
        let mut rng = SequenceRng::new(vec![0.3, 0.7]);
        let sample = bsdf.sample(Vec3::Y, &mut rng);
        assert!(sample.in_dir.y >= 0.0);
        assert!(sample.pdf > 0.0);
    }

    #[test]
    fn mirror_reflects_about_the_normal() {
        let out_dir = Vec3::new(0.5, 0.7, -0.2).normalize();
        let mut rng = SequenceRng::new(vec![0.5]);
        let sample = Bsdf::Mirror.sample(out_dir, &mut rng);
        assert!((sample.in_dir.x + out_dir.x).abs() < 1e-6);
        assert!((sample.in_dir.y - out_dir.y).abs() < 1e-6);
        assert!((sample.in_dir.z + out_dir.z).abs() < 1e-6);
    }

    #[test]
    fn refract_straight_through_normal_incidence_is_unbent() {
        let mut rng = SequenceRng::new(vec![0.5]);
        let sample = Bsdf::Refract { eta: 1.5 }.sample(Vec3::Y, &mut rng);
        assert!((sample.in_dir - Vec3::NEG_Y).length() < 1e-5);
    }

    #[test]
    fn refract_total_internal_reflection_falls_back_to_mirror() {
        // A grazing angle exiting into an optically thinner medium (eta < 1)
        // exceeds the critical angle and triggers TIR.
        let out_dir = Vec3::new(0.95, 0.05, 0.0).normalize();
        let mut rng = SequenceRng::new(vec![0.5]);
        let sample = Bsdf::Refract { eta: 1.0 / 1.5 }.sample(out_dir, &mut rng);
        assert!((sample.in_dir.y - out_dir.y).abs() < 1e-6);
    }

    #[test]
    fn emissive_returns_its_radiance() {
        let radiance = Vec3::new(5.0, 5.0, 5.0);
        let bsdf = Bsdf::Emissive { radiance };
        let mut rng = SequenceRng::new(vec![0.2, 0.4]);
        let sample = bsdf.sample(Vec3::Y, &mut rng);
        assert_eq!(sample.emitted, radiance);
        assert_eq!(sample.attenuation, Vec3::ZERO);
    }

    #[test]
    fn glass_is_either_reflection_or_refraction() {
        let mut rng = SequenceRng::new(vec![0.01]);
        let sample = Bsdf::Glass { eta: 1.5 }.sample(Vec3::Y, &mut rng);
        assert!(sample.in_dir.length() > 0.0);
    }
}
