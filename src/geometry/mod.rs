pub mod affine;
pub mod vector;

pub use affine::{
    apply_affine, invert_affine, is_identity, lps_to_ras_matrix, lps_to_ras_point,
    matrix_from_rows, matrix_to_rows, ras_to_lps_point, IDENTITY_TOL,
};
pub use vector::{
    angle_deg, axial_position, centroid, point_line_distance, radial_component, unit,
    ZERO_LENGTH_EPS,
};
