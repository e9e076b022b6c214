use nalgebra::{Matrix4, Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::io::{ElectrodeCatalog, ElectrodeModel, Trajectory};

/// Pure translation as a homogeneous 4x4.
pub fn translation(x: f64, y: f64, z: f64) -> Matrix4<f64> {
    Matrix4::new_translation(&Vector3::new(x, y, z))
}

/// Points along `base + dir * t` for `t` from `t0` to `t1` (inclusive) every `step`.
/// `dir` is normalized first.
pub fn line_points(
    base: &Point3<f64>,
    dir: &Vector3<f64>,
    t0: f64,
    t1: f64,
    step: f64,
) -> Vec<Point3<f64>> {
    let dir = dir.normalize();
    let count = ((t1 - t0) / step + 1e-9).floor() as usize + 1;
    (0..count)
        .map(|k| base + dir * (t0 + k as f64 * step))
        .collect()
}

/// Uniform points inside a ball, reproducible for a given seed.
pub fn seeded_noise_cloud(
    center: &Point3<f64>,
    radius: f64,
    n: usize,
    seed: u64,
) -> Vec<Point3<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut points = Vec::with_capacity(n);
    while points.len() < n {
        let offset = Vector3::new(
            rng.random_range(-radius..radius),
            rng.random_range(-radius..radius),
            rng.random_range(-radius..radius),
        );
        if offset.norm() <= radius {
            points.push(center + offset);
        }
    }
    points
}

pub fn dummy_model(id: &str, exploration_length_mm: f64, offsets: &[f64]) -> ElectrodeModel {
    ElectrodeModel {
        id: id.to_string(),
        model_type: "depth".to_string(),
        contact_count: offsets.len(),
        contact_length_mm: 2.0,
        diameter_mm: 0.8,
        total_exploration_length_mm: exploration_length_mm,
        contact_center_offsets_from_tip_mm: offsets.to_vec(),
    }
}

pub fn dummy_catalog(models: Vec<ElectrodeModel>) -> ElectrodeCatalog {
    ElectrodeCatalog::new(models).expect("dummy models must be valid")
}

/// `n` contact centers starting 1 mm from the tip.
pub fn evenly_spaced_offsets(n: usize, pitch: f64) -> Vec<f64> {
    (0..n).map(|i| 1.0 + i as f64 * pitch).collect()
}

/// Entry at the origin, target `length` mm down +z.
pub fn straight_trajectory(name: &str, length: f64) -> Trajectory {
    Trajectory::new(name, Point3::origin(), Point3::new(0.0, 0.0, length))
}

#[cfg(test)]
mod test_utils_tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_line_points_inclusive_and_normalized() {
        let points = line_points(&Point3::origin(), &Vector3::new(0.0, 0.0, 2.0), 5.0, 40.0, 0.1);
        assert_eq!(points.len(), 351);
        assert_relative_eq!(points[0].z, 5.0, epsilon = 1e-12);
        assert_relative_eq!(points[350].z, 40.0, epsilon = 1e-9);
    }

    #[test]
    fn test_noise_cloud_is_seeded_and_bounded() {
        let center = Point3::new(1.0, 2.0, 3.0);
        let a = seeded_noise_cloud(&center, 3.0, 50, 7);
        let b = seeded_noise_cloud(&center, 3.0, 50, 7);
        assert_eq!(a, b);
        assert!(a.iter().all(|p| (p - center).norm() <= 3.0));
    }
}
