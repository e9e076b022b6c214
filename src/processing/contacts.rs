use nalgebra::Point3;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{GeometryError, PlacementError};
use crate::geometry::lps_to_ras_point;
use crate::io::{
    Assignment, AssignmentDocument, ElectrodeCatalog, ElectrodeModel, TipAt, Trajectory,
};

/// One placed contact center, in the same (LPS) frame as its trajectory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contact {
    #[serde(rename = "trajectory")]
    pub trajectory_name: String,
    pub model_id: String,
    /// 1-based, following the model's offset order.
    pub index: usize,
    pub label: String,
    #[serde(rename = "position_lps")]
    pub position: Point3<f64>,
    pub tip_at: TipAt,
}

impl Contact {
    pub fn position_ras(&self) -> Point3<f64> {
        lps_to_ras_point(&self.position)
    }
}

/// Places the contacts of `model` along one trajectory.
///
/// The tip is moved by `tip_shift_mm` along the tip axis and then by the free
/// `xyz_offset_mm` nudge; each contact sits at `tip + axis * offset`.
pub fn generate_contacts_for_assignment(
    trajectory: &Trajectory,
    model: &ElectrodeModel,
    assignment: &Assignment,
) -> Result<Vec<Contact>, GeometryError> {
    let (tip, axis) = trajectory.tip_and_axis(assignment.tip_at)?;
    let tip = tip + axis.into_inner() * assignment.tip_shift_mm + assignment.xyz_offset();

    Ok(model
        .offsets()
        .iter()
        .enumerate()
        .map(|(i, offset)| {
            let index = i + 1;
            Contact {
                trajectory_name: trajectory.name.clone(),
                model_id: model.id.clone(),
                index,
                label: format!("{}{}", trajectory.name, index),
                position: tip + axis.into_inner() * *offset,
                tip_at: assignment.tip_at,
            }
        })
        .collect())
}

/// Places contacts for every assigned row of `assignments`.
///
/// Rows without a model id are skipped. Unknown trajectory names and model ids
/// are collected and reported together as [`PlacementError::MissingReferences`].
pub fn generate_contacts(
    trajectories: &[Trajectory],
    catalog: &ElectrodeCatalog,
    assignments: &AssignmentDocument,
) -> Result<Vec<Contact>, PlacementError> {
    let by_name: BTreeMap<&str, &Trajectory> =
        trajectories.iter().map(|t| (t.name.as_str(), t)).collect();

    let mut missing = Vec::new();
    let mut resolved = Vec::new();
    for row in assignments.assignments.iter().filter(|a| a.is_assigned()) {
        let Some(trajectory) = by_name.get(row.trajectory_name.as_str()) else {
            missing.push(format!("trajectory '{}'", row.trajectory_name));
            continue;
        };
        let Some(model) = catalog.get(&row.model_id) else {
            missing.push(format!("model '{}'", row.model_id));
            continue;
        };
        resolved.push((*trajectory, model, row));
    }
    if !missing.is_empty() {
        return Err(PlacementError::MissingReferences(missing));
    }

    let mut contacts = Vec::new();
    for (trajectory, model, row) in resolved {
        let placed = generate_contacts_for_assignment(trajectory, model, row).map_err(|source| {
            PlacementError::Geometry {
                trajectory: trajectory.name.clone(),
                source,
            }
        })?;
        contacts.extend(placed);
    }
    Ok(contacts)
}
