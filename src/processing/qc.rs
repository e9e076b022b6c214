use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::geometry::{angle_deg, radial_component};
use crate::io::Trajectory;
use crate::processing::contacts::Contact;

/// Planned-vs-final deviation of one trajectory. Only the component
/// perpendicular to the planned axis counts as error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QcRow {
    #[serde(rename = "trajectory")]
    pub trajectory_name: String,
    pub entry_radial_mm: f64,
    pub target_radial_mm: f64,
    pub mean_contact_radial_mm: f64,
    pub max_contact_radial_mm: f64,
    pub rms_contact_radial_mm: f64,
    pub angle_deg: f64,
    #[serde(rename = "matched_contacts")]
    pub matched_contact_count: usize,
}

/// Groups contacts by trajectory name, each group sorted by contact index.
/// Contacts with an empty trajectory name are dropped.
pub fn contacts_by_trajectory(contacts: &[Contact]) -> BTreeMap<&str, Vec<&Contact>> {
    let mut grouped: BTreeMap<&str, Vec<&Contact>> = BTreeMap::new();
    for contact in contacts.iter().filter(|c| !c.trajectory_name.is_empty()) {
        grouped
            .entry(contact.trajectory_name.as_str())
            .or_default()
            .push(contact);
    }
    for group in grouped.values_mut() {
        group.sort_by_key(|c| c.index);
    }
    grouped
}

fn index_map<'a>(contacts: Option<&Vec<&'a Contact>>) -> BTreeMap<usize, &'a Contact> {
    contacts
        .into_iter()
        .flatten()
        .filter(|c| c.index > 0)
        .map(|c| (c.index, *c))
        .collect()
}

/// One row per trajectory that has final contacts, both planned and final
/// trajectories, and at least one contact index present on both sides.
/// Anything else is skipped, not reported as an error.
pub fn compute_qc_metrics(
    planned_trajectories: &BTreeMap<String, Trajectory>,
    final_trajectories: &BTreeMap<String, Trajectory>,
    planned_contacts: &[Contact],
    final_contacts: &[Contact],
) -> Vec<QcRow> {
    let planned_by_traj = contacts_by_trajectory(planned_contacts);
    let final_by_traj = contacts_by_trajectory(final_contacts);

    let mut rows = Vec::new();
    for (&name, final_group) in &final_by_traj {
        let (Some(planned), Some(fin)) = (
            planned_trajectories.get(name),
            final_trajectories.get(name),
        ) else {
            debug!(trajectory = name, "QC skipped: trajectory missing on one side");
            continue;
        };
        let Ok(planned_axis) = planned.deep_axis() else {
            debug!(trajectory = name, "QC skipped: zero-length planned trajectory");
            continue;
        };
        let Ok(angle) = angle_deg(&planned_axis, &(fin.end - fin.start)) else {
            debug!(trajectory = name, "QC skipped: zero-length final trajectory");
            continue;
        };

        let planned_index = index_map(planned_by_traj.get(name));
        let final_index = index_map(Some(final_group));
        let radial: Vec<f64> = planned_index
            .iter()
            .filter_map(|(idx, p)| final_index.get(idx).map(|f| (p, f)))
            .map(|(p, f)| radial_component(&(f.position - p.position), &planned_axis).norm())
            .collect();
        if radial.is_empty() {
            debug!(trajectory = name, "QC skipped: no matched contact indices");
            continue;
        }

        let n = radial.len() as f64;
        rows.push(QcRow {
            trajectory_name: name.to_string(),
            entry_radial_mm: radial_component(&(fin.start - planned.start), &planned_axis).norm(),
            target_radial_mm: radial_component(&(fin.end - planned.end), &planned_axis).norm(),
            mean_contact_radial_mm: radial.iter().sum::<f64>() / n,
            max_contact_radial_mm: radial.iter().copied().fold(0.0, f64::max),
            rms_contact_radial_mm: (radial.iter().map(|r| r * r).sum::<f64>() / n).sqrt(),
            angle_deg: angle,
            matched_contact_count: radial.len(),
        });
    }
    rows
}
