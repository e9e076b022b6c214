use nalgebra::{Matrix4, Point3, Unit, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::GeometryError;
use crate::geometry::{apply_affine, matrix_from_rows, unit};
use crate::io::assignments::TipAt;

/// One image frame as emitted by the trajectory-file parser.
///
/// `matrix` maps this frame's local coordinates into its parent frame.
/// A missing `parent_ref` means the parent is whichever frame is chosen as root.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub name: String,
    pub matrix: Matrix4<f64>,
    pub parent_ref: Option<i64>,
}

impl Frame {
    pub fn new(name: impl Into<String>, matrix: Matrix4<f64>, parent_ref: Option<i64>) -> Self {
        Self {
            name: name.into(),
            matrix,
            parent_ref,
        }
    }

    pub fn from_rows(
        name: impl Into<String>,
        rows: [[f64; 4]; 4],
        parent_ref: Option<i64>,
    ) -> Self {
        Self::new(name, matrix_from_rows(rows), parent_ref)
    }
}

/// Planned straight-line electrode path in LPS coordinates.
/// `start` is the entry point on the skull, `end` the deep target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub name: String,
    pub start: Point3<f64>,
    pub end: Point3<f64>,
}

impl Trajectory {
    pub fn new(name: impl Into<String>, start: Point3<f64>, end: Point3<f64>) -> Self {
        Self {
            name: name.into(),
            start,
            end,
        }
    }

    pub fn entry(&self) -> &Point3<f64> {
        &self.start
    }

    pub fn target(&self) -> &Point3<f64> {
        &self.end
    }

    pub fn length(&self) -> f64 {
        (self.end - self.start).norm()
    }

    /// Unit vector from entry toward target.
    pub fn deep_axis(&self) -> Result<Unit<Vector3<f64>>, GeometryError> {
        unit(&(self.end - self.start))
    }

    /// Tip point and forward (tip toward the other end) axis for a tip anchor.
    ///
    /// With the tip on the target the axis points outward, target -> entry;
    /// with the tip on the entry it points inward, entry -> target.
    pub fn tip_and_axis(
        &self,
        tip_at: TipAt,
    ) -> Result<(Point3<f64>, Unit<Vector3<f64>>), GeometryError> {
        match tip_at {
            TipAt::Target => Ok((self.end, unit(&(self.start - self.end))?)),
            TipAt::Entry => Ok((self.start, unit(&(self.end - self.start))?)),
        }
    }

    /// Same trajectory with both endpoints mapped through `matrix`.
    pub fn transformed(&self, matrix: &Matrix4<f64>) -> Self {
        Self {
            name: self.name.clone(),
            start: apply_affine(matrix, &self.start),
            end: apply_affine(matrix, &self.end),
        }
    }
}

/// Indexes trajectories by name; later duplicates replace earlier ones.
pub fn trajectories_by_name(trajectories: &[Trajectory]) -> BTreeMap<String, Trajectory> {
    trajectories
        .iter()
        .map(|t| (t.name.clone(), t.clone()))
        .collect()
}
