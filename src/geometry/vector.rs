use nalgebra::{Point3, Unit, Vector3};

use crate::error::GeometryError;

/// Norms at or below this are treated as zero-length.
pub const ZERO_LENGTH_EPS: f64 = 1e-9;

pub fn unit(v: &Vector3<f64>) -> Result<Unit<Vector3<f64>>, GeometryError> {
    Unit::try_new(*v, ZERO_LENGTH_EPS).ok_or(GeometryError::ZeroLength)
}

/// Unsigned angle in degrees between two vectors.
pub fn angle_deg(u: &Vector3<f64>, v: &Vector3<f64>) -> Result<f64, GeometryError> {
    let u = unit(u)?;
    let v = unit(v)?;
    let dot = u.dot(&v).clamp(-1.0, 1.0);
    Ok(dot.acos().to_degrees())
}

/// Perpendicular distance from `point` to the infinite line through `line_point` along `dir`.
pub fn point_line_distance(
    point: &Point3<f64>,
    line_point: &Point3<f64>,
    dir: &Unit<Vector3<f64>>,
) -> f64 {
    let rel = point - line_point;
    let along = dir.dot(&rel);
    (rel - dir.into_inner() * along).norm()
}

/// Signed position of `point` along `axis`, measured from `origin`.
pub fn axial_position(point: &Point3<f64>, origin: &Point3<f64>, axis: &Unit<Vector3<f64>>) -> f64 {
    axis.dot(&(point - origin))
}

/// Component of `delta` perpendicular to `axis`.
pub fn radial_component(delta: &Vector3<f64>, axis: &Unit<Vector3<f64>>) -> Vector3<f64> {
    delta - axis.into_inner() * axis.dot(delta)
}

pub fn centroid(points: &[Point3<f64>]) -> Option<Point3<f64>> {
    if points.is_empty() {
        return None;
    }
    let sum = points
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + p.coords);
    Some(Point3::from(sum / points.len() as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_unit_rejects_zero_vector() {
        assert_eq!(unit(&Vector3::zeros()), Err(GeometryError::ZeroLength));
        let u = unit(&Vector3::new(0.0, 3.0, 4.0)).unwrap();
        assert_relative_eq!(u.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_angle_deg_basic_cases() {
        let x = Vector3::x();
        assert_relative_eq!(angle_deg(&x, &x).unwrap(), 0.0, epsilon = 1e-9);
        assert_relative_eq!(angle_deg(&x, &Vector3::y()).unwrap(), 90.0, epsilon = 1e-9);
        assert_relative_eq!(angle_deg(&x, &(-x)).unwrap(), 180.0, epsilon = 1e-9);
        assert!(angle_deg(&x, &Vector3::zeros()).is_err());
    }

    #[test]
    fn test_point_line_distance_and_radial_component() {
        let dir = unit(&Vector3::z()).unwrap();
        let d = point_line_distance(&Point3::new(3.0, 4.0, 17.0), &Point3::origin(), &dir);
        assert_relative_eq!(d, 5.0, epsilon = 1e-12);

        let radial = radial_component(&Vector3::new(1.0, 2.0, 9.0), &dir);
        assert_relative_eq!(radial, Vector3::new(1.0, 2.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(
            axial_position(&Point3::new(5.0, 5.0, -2.5), &Point3::origin(), &dir),
            -2.5
        );
    }

    #[test]
    fn test_centroid() {
        assert!(centroid(&[]).is_none());
        let c = centroid(&[Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 4.0, 6.0)]).unwrap();
        assert_relative_eq!(c, Point3::new(1.0, 2.0, 3.0));
    }
}
