use nalgebra::{Matrix4, Point3};

use crate::error::GeometryError;

/// Default tolerance used by [`is_identity`].
pub const IDENTITY_TOL: f64 = 1e-4;

/// Applies a homogeneous 4x4 affine to a point.
pub fn apply_affine(matrix: &Matrix4<f64>, point: &Point3<f64>) -> Point3<f64> {
    let h = matrix * point.to_homogeneous();
    Point3::new(h.x, h.y, h.z)
}

/// Inverts a 4x4 affine, failing on singular input instead of returning garbage.
pub fn invert_affine(matrix: &Matrix4<f64>) -> Result<Matrix4<f64>, GeometryError> {
    matrix.try_inverse().ok_or(GeometryError::SingularMatrix)
}

pub fn is_identity(matrix: &Matrix4<f64>, tol: f64) -> bool {
    let identity = Matrix4::<f64>::identity();
    matrix
        .iter()
        .zip(identity.iter())
        .all(|(a, b)| (a - b).abs() <= tol)
}

/// Builds a matrix from row-major nested arrays, the layout text parsers emit.
pub fn matrix_from_rows(rows: [[f64; 4]; 4]) -> Matrix4<f64> {
    Matrix4::from_fn(|r, c| rows[r][c])
}

pub fn matrix_to_rows(matrix: &Matrix4<f64>) -> [[f64; 4]; 4] {
    let mut rows = [[0.0; 4]; 4];
    for (r, row) in rows.iter_mut().enumerate() {
        for (c, value) in row.iter_mut().enumerate() {
            *value = matrix[(r, c)];
        }
    }
    rows
}

fn lps_ras_flip() -> Matrix4<f64> {
    Matrix4::from_diagonal(&nalgebra::Vector4::new(-1.0, -1.0, 1.0, 1.0))
}

/// LPS and RAS differ by negating the first two axes; the map is its own inverse.
pub fn lps_to_ras_point(point: &Point3<f64>) -> Point3<f64> {
    Point3::new(-point.x, -point.y, point.z)
}

pub fn ras_to_lps_point(point: &Point3<f64>) -> Point3<f64> {
    lps_to_ras_point(point)
}

/// Re-expresses an LPS→LPS affine as RAS→RAS.
pub fn lps_to_ras_matrix(matrix: &Matrix4<f64>) -> Matrix4<f64> {
    let flip = lps_ras_flip();
    flip * matrix * flip
}
