use nalgebra::{Point3, Unit, Vector3};

use crate::error::GeometryError;
use crate::geometry::{axial_position, centroid, unit};

/// Keeps points within `radius_mm` of the finite segment `seg_start -> seg_end`,
/// extended by `margin_mm` past both ends along the segment axis.
pub fn filter_points_in_segment_cylinder(
    points: &[Point3<f64>],
    seg_start: &Point3<f64>,
    seg_end: &Point3<f64>,
    radius_mm: f64,
    margin_mm: f64,
) -> Result<Vec<Point3<f64>>, GeometryError> {
    if points.is_empty() {
        return Ok(Vec::new());
    }
    let axis = unit(&(seg_end - seg_start))?;
    let length = (seg_end - seg_start).norm();

    Ok(points
        .iter()
        .filter(|p| {
            let rel = *p - seg_start;
            let t = axis.dot(&rel);
            let radial = (rel - axis.into_inner() * t).norm();
            radial <= radius_mm && t >= -margin_mm && t <= length + margin_mm
        })
        .copied()
        .collect())
}

/// Denoised "spine" of a point cloud: one centroid per populated depth slab.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlabSamples {
    pub centroids: Vec<Point3<f64>>,
    /// Signed depth of each centroid along the sampling axis.
    pub depths: Vec<f64>,
}

impl SlabSamples {
    pub fn len(&self) -> usize {
        self.centroids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }
}

/// Slab settings for [`build_slab_centroids`].
#[derive(Debug, Clone, Copy)]
pub struct SlabLayout {
    pub t_min: f64,
    pub t_max: f64,
    pub step_mm: f64,
    pub half_thickness_mm: f64,
    pub min_points: usize,
}

/// Slab centers run from `t_min` to `t_max` (inclusive) every `step_mm`.
pub fn slab_centers(t_min: f64, t_max: f64, step_mm: f64) -> Vec<f64> {
    if step_mm <= 0.0 || t_max < t_min {
        return Vec::new();
    }
    let count = ((t_max - t_min) / step_mm + 0.5).ceil() as usize;
    (0..count).map(|k| t_min + k as f64 * step_mm).collect()
}

/// Samples the centroid of the points falling in each depth slab along `axis`.
/// Slabs holding fewer than `layout.min_points` points are skipped.
pub fn build_slab_centroids(
    points: &[Point3<f64>],
    origin: &Point3<f64>,
    axis: &Unit<Vector3<f64>>,
    layout: &SlabLayout,
) -> SlabSamples {
    if points.is_empty() {
        return SlabSamples::default();
    }
    let depths: Vec<f64> = points.iter().map(|p| axial_position(p, origin, axis)).collect();

    let mut samples = SlabSamples::default();
    let mut members = Vec::new();
    for tc in slab_centers(layout.t_min, layout.t_max, layout.step_mm) {
        members.clear();
        members.extend(
            points
                .iter()
                .zip(&depths)
                .filter(|(_, t)| (**t - tc).abs() <= layout.half_thickness_mm)
                .map(|(p, _)| *p),
        );
        if members.len() < layout.min_points {
            continue;
        }
        if let Some(c) = centroid(&members) {
            samples.depths.push(axial_position(&c, origin, axis));
            samples.centroids.push(c);
        }
    }
    samples
}
