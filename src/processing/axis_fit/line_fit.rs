use nalgebra::{Matrix3, Point3, SymmetricEigen, Unit, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::GeometryError;
use crate::geometry::{centroid, point_line_distance, unit, ZERO_LENGTH_EPS};

/// Principal axis of a point set: center plus the eigenvector of the largest
/// eigenvalue of the centered covariance.
pub fn fit_axis_pca(
    points: &[Point3<f64>],
) -> Result<(Point3<f64>, Unit<Vector3<f64>>), GeometryError> {
    if points.len() < 3 {
        return Err(GeometryError::TooFewPoints {
            needed: 3,
            got: points.len(),
        });
    }
    let center = centroid(points).ok_or(GeometryError::TooFewPoints {
        needed: 3,
        got: 0,
    })?;

    let mut cov = Matrix3::<f64>::zeros();
    for p in points {
        let d = p - center;
        cov += d * d.transpose();
    }
    cov /= (points.len() - 1).max(1) as f64;

    let eigen = SymmetricEigen::new(cov);
    let (largest, _) = eigen
        .eigenvalues
        .iter()
        .enumerate()
        .fold((0usize, f64::NEG_INFINITY), |best, (i, &v)| {
            if v > best.1 {
                (i, v)
            } else {
                best
            }
        });
    let axis = unit(&eigen.eigenvectors.column(largest).into_owned())?;
    Ok((center, axis))
}

/// RMS perpendicular distance of `points` to a line.
pub fn line_rms(points: &[Point3<f64>], center: &Point3<f64>, axis: &Unit<Vector3<f64>>) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = points
        .iter()
        .map(|p| point_line_distance(p, center, axis).powi(2))
        .sum();
    (sum_sq / points.len() as f64).sqrt()
}

/// RANSAC configuration for line fitting over slab centroids.
#[derive(Debug, Clone, Copy)]
pub struct RansacLineConfig {
    pub max_iterations: usize,
    pub inlier_threshold_mm: f64,
    pub min_inliers: usize,
    pub seed: u64,
}

/// Robust line estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct LineFit {
    pub center: Point3<f64>,
    pub axis: Unit<Vector3<f64>>,
    pub inlier_mask: Vec<bool>,
    pub n_inliers: usize,
    /// RMS perpendicular residual of the inliers to the refined line.
    pub rms_mm: f64,
    /// False when no sample reached `min_inliers` and the line is a plain PCA over all points.
    pub consensus: bool,
}

impl LineFit {
    /// Inlier fraction when consensus was reached, zero for the PCA fallback.
    pub fn confidence(&self) -> f64 {
        if !self.consensus || self.inlier_mask.is_empty() {
            return 0.0;
        }
        self.n_inliers as f64 / self.inlier_mask.len() as f64
    }

    pub fn inliers(&self, points: &[Point3<f64>]) -> Vec<Point3<f64>> {
        points
            .iter()
            .zip(&self.inlier_mask)
            .filter(|(_, keep)| **keep)
            .map(|(p, _)| *p)
            .collect()
    }
}

/// More inliers wins; equal counts go to the smaller mean inlier distance.
fn beats_best(count: usize, score: f64, best_count: usize, best_score: f64) -> bool {
    count > best_count || (count == best_count && score < best_score)
}

/// Fits a 3D line with RANSAC over 2-point samples, then refines it by PCA on the inliers.
///
/// The best sample maximizes the inlier count, ties broken by smaller mean inlier distance.
/// When no sample reaches `min_inliers` the result falls back to PCA over every point
/// with `consensus = false`; this never fails for data-quality reasons.
pub fn ransac_fit_line(
    points: &[Point3<f64>],
    config: &RansacLineConfig,
) -> Result<LineFit, GeometryError> {
    let n = points.len();
    if n < 2 {
        return Err(GeometryError::TooFewPoints { needed: 2, got: n });
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best_mask: Option<Vec<bool>> = None;
    let mut best_count = 0usize;
    let mut best_score = f64::INFINITY;

    for _ in 0..config.max_iterations {
        let sample = rand::seq::index::sample(&mut rng, n, 2);
        let p0 = points[sample.index(0)];
        let Some(dir) = Unit::try_new(points[sample.index(1)] - p0, ZERO_LENGTH_EPS) else {
            continue;
        };

        let mut mask = vec![false; n];
        let mut count = 0usize;
        let mut dist_sum = 0.0;
        for (i, p) in points.iter().enumerate() {
            let d = point_line_distance(p, &p0, &dir);
            if d <= config.inlier_threshold_mm {
                mask[i] = true;
                count += 1;
                dist_sum += d;
            }
        }
        if count == 0 {
            continue;
        }
        let score = dist_sum / count as f64;
        if beats_best(count, score, best_count, best_score) {
            best_count = count;
            best_score = score;
            best_mask = Some(mask);
        }
    }

    match best_mask {
        Some(mask) if best_count >= config.min_inliers => {
            let inliers: Vec<Point3<f64>> = points
                .iter()
                .zip(&mask)
                .filter(|(_, keep)| **keep)
                .map(|(p, _)| *p)
                .collect();
            let (center, axis) = fit_axis_pca(&inliers)?;
            let rms_mm = line_rms(&inliers, &center, &axis);
            Ok(LineFit {
                center,
                axis,
                inlier_mask: mask,
                n_inliers: best_count,
                rms_mm,
                consensus: true,
            })
        }
        _ => {
            let (center, axis) = fit_axis_pca(points)?;
            Ok(LineFit {
                center,
                axis,
                inlier_mask: vec![true; n],
                n_inliers: n,
                rms_mm: line_rms(points, &center, &axis),
                consensus: false,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::line_points;
    use approx::assert_relative_eq;

    fn config(min_inliers: usize) -> RansacLineConfig {
        RansacLineConfig {
            max_iterations: 220,
            inlier_threshold_mm: 0.9,
            min_inliers,
            seed: 0,
        }
    }

    #[test]
    fn test_pca_recovers_line_direction() {
        let dir = Vector3::new(1.0, 2.0, 2.0) / 3.0;
        let points = line_points(&Point3::new(5.0, 0.0, -1.0), &dir, -10.0, 10.0, 0.5);
        let (center, axis) = fit_axis_pca(&points).unwrap();
        assert_relative_eq!(axis.dot(&dir).abs(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(center, Point3::new(5.0, 0.0, -1.0), epsilon = 1e-9);
    }

    #[test]
    fn test_pca_requires_three_points() {
        let pts = [Point3::origin(), Point3::new(1.0, 0.0, 0.0)];
        assert_eq!(
            fit_axis_pca(&pts),
            Err(GeometryError::TooFewPoints { needed: 3, got: 2 })
        );
    }

    #[test]
    fn test_ransac_ignores_outliers() {
        let mut points = line_points(&Point3::origin(), &Vector3::z(), 0.0, 30.0, 1.0);
        points.push(Point3::new(6.0, 0.0, 4.0));
        points.push(Point3::new(-5.0, 7.0, 12.0));
        points.push(Point3::new(4.0, 4.0, 25.0));

        let fit = ransac_fit_line(&points, &config(6)).unwrap();
        assert!(fit.consensus);
        assert_eq!(fit.n_inliers, 31);
        assert!(!fit.inlier_mask[31] && !fit.inlier_mask[32] && !fit.inlier_mask[33]);
        assert_relative_eq!(fit.axis.z.abs(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(fit.rms_mm, 0.0, epsilon = 1e-9);
        assert_relative_eq!(fit.confidence(), 31.0 / 34.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ransac_falls_back_to_pca_without_consensus() {
        let points = line_points(&Point3::origin(), &Vector3::x(), 0.0, 9.0, 1.0);
        let fit = ransac_fit_line(&points, &config(50)).unwrap();
        assert!(!fit.consensus);
        assert_eq!(fit.confidence(), 0.0);
        assert!(fit.inlier_mask.iter().all(|m| *m));
        assert_relative_eq!(fit.axis.x.abs(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_ransac_is_reproducible_for_a_seed() {
        let mut points = line_points(&Point3::origin(), &Vector3::y(), 0.0, 20.0, 1.0);
        points.extend(line_points(&Point3::new(3.0, 0.0, 0.0), &Vector3::z(), 0.0, 6.0, 1.0));
        let a = ransac_fit_line(&points, &config(6)).unwrap();
        let b = ransac_fit_line(&points, &config(6)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_sample_ordering_prefers_tighter_on_equal_counts() {
        assert!(beats_best(5, 0.1, 5, 0.3));
        assert!(!beats_best(5, 0.3, 5, 0.1));
        assert!(!beats_best(5, 0.2, 5, 0.2));
        assert!(beats_best(6, 0.8, 5, 0.0));
        assert!(!beats_best(4, 0.0, 5, 0.8));
    }

    #[test]
    fn test_ransac_tie_goes_to_tighter_line() {
        // two lines of five points each; the far one zigzags by 0.8 mm
        let mut points = line_points(&Point3::origin(), &Vector3::z(), 0.0, 4.0, 1.0);
        for k in 0..5 {
            let x = if k % 2 == 0 { 50.4 } else { 49.6 };
            points.push(Point3::new(x, 0.0, k as f64));
        }
        let fit = ransac_fit_line(&points, &config(5)).unwrap();
        assert!(fit.consensus);
        assert_eq!(fit.n_inliers, 5);
        assert!(fit.inlier_mask[..5].iter().all(|m| *m));
        assert!(fit.inlier_mask[5..].iter().all(|m| !*m));
        assert_relative_eq!(fit.rms_mm, 0.0, epsilon = 1e-9);
        assert_relative_eq!(fit.center, Point3::new(0.0, 0.0, 2.0), epsilon = 1e-9);
    }

    #[test]
    fn test_ransac_needs_two_points() {
        assert!(ransac_fit_line(&[Point3::origin()], &config(1)).is_err());
    }
}
