use anyhow::{bail, Context};
use nalgebra::{Matrix4, Point3};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

pub mod axis_fit;
pub mod contacts;
pub mod frames;
pub mod model_match;
pub mod qc;

use crate::config::CaseConfig;
use crate::geometry::{is_identity, IDENTITY_TOL};
use crate::io::{trajectories_by_name, AssignmentDocument, ElectrodeCatalog, Frame, Trajectory};
use crate::processing::axis_fit::{fit_electrode_axis, FitOutcome};
use crate::processing::contacts::{generate_contacts, Contact};
use crate::processing::frames::{build_effective_matrices, resolve_reference_index};
use crate::processing::model_match::suggest_assignments;
use crate::processing::qc::{compute_qc_metrics, QcRow};

/// Everything one case needs, as handed over by the loaders.
#[derive(Debug, Clone, Copy)]
pub struct CaseInput<'a> {
    pub frames: &'a [Frame],
    /// Index of the frame the trajectories are expressed in.
    pub trajectory_frame: usize,
    pub trajectories: &'a [Trajectory],
    pub catalog: &'a ElectrodeCatalog,
    /// Suggested from trajectory lengths when absent.
    pub assignments: Option<&'a AssignmentDocument>,
    /// CT candidate points in the root frame.
    pub ct_points: Option<&'a [Point3<f64>]>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    pub case_name: String,
    pub root_index: usize,
    pub effective_matrices: Vec<Matrix4<f64>>,
    /// Planned trajectories mapped into the root frame.
    pub planned_trajectories: Vec<Trajectory>,
    pub assignments: AssignmentDocument,
    pub planned_contacts: Vec<Contact>,
    pub fits: BTreeMap<String, FitOutcome>,
    /// Fitted where the fit succeeded, planned otherwise.
    pub final_trajectories: Vec<Trajectory>,
    pub final_contacts: Vec<Contact>,
    pub qc: Vec<QcRow>,
}

impl CaseReport {
    pub fn fit_success_count(&self) -> usize {
        self.fits.values().filter(|f| f.is_success()).count()
    }
}

/// Runs one case end to end: frame composition, assignments, planned contacts,
/// per-trajectory axis fits (in parallel), final contacts and QC.
pub fn run_case(
    case_name: &str,
    input: &CaseInput,
    config: &CaseConfig,
) -> anyhow::Result<CaseReport> {
    config
        .validate()
        .context(format!("invalid config for case {}", case_name))?;

    let (root_index, effective_matrices) = if input.frames.is_empty() {
        (0, Vec::new())
    } else {
        let root_index = resolve_reference_index(input.frames, config.reference_volume.as_deref())
            .context(format!("resolve_reference_index({}) failed", case_name))?;
        let matrices = build_effective_matrices(input.frames, root_index)
            .context(format!("build_effective_matrices({}) failed", case_name))?;
        (root_index, matrices)
    };

    let planned_trajectories: Vec<Trajectory> = if effective_matrices.is_empty() {
        input.trajectories.to_vec()
    } else {
        let Some(to_root) = effective_matrices.get(input.trajectory_frame) else {
            bail!(
                "trajectory frame {} out of range for {} frames in case {}",
                input.trajectory_frame,
                effective_matrices.len(),
                case_name
            );
        };
        if is_identity(to_root, IDENTITY_TOL) {
            input.trajectories.to_vec()
        } else {
            input.trajectories.iter().map(|t| t.transformed(to_root)).collect()
        }
    };

    let assignments = match input.assignments {
        Some(doc) => doc.clone(),
        None => suggest_assignments(
            &planned_trajectories,
            input.catalog,
            config.match_tolerance_mm,
            config.default_tip_at,
        ),
    };

    let planned_contacts = generate_contacts(&planned_trajectories, input.catalog, &assignments)
        .context(format!("placing planned contacts for case {} failed", case_name))?;

    let fits = match input.ct_points {
        Some(cloud) => fit_assigned(
            cloud,
            &planned_trajectories,
            input.catalog,
            &assignments,
            config,
        )
        .context(format!("axis fitting for case {} failed", case_name))?,
        None => BTreeMap::new(),
    };

    let final_trajectories: Vec<Trajectory> = planned_trajectories
        .iter()
        .map(|t| match fits.get(&t.name).and_then(FitOutcome::success) {
            Some(fit) => fit.to_trajectory(t.name.clone()),
            None => t.clone(),
        })
        .collect();

    let final_contacts = generate_contacts(&final_trajectories, input.catalog, &assignments)
        .context(format!("placing final contacts for case {} failed", case_name))?;

    let qc = compute_qc_metrics(
        &trajectories_by_name(&planned_trajectories),
        &trajectories_by_name(&final_trajectories),
        &planned_contacts,
        &final_contacts,
    );

    let report = CaseReport {
        case_name: case_name.to_string(),
        root_index,
        effective_matrices,
        planned_trajectories,
        assignments,
        planned_contacts,
        fits,
        final_trajectories,
        final_contacts,
        qc,
    };
    info!(
        case = case_name,
        trajectories = report.planned_trajectories.len(),
        contacts = report.final_contacts.len(),
        fits = report.fits.len(),
        fitted = report.fit_success_count(),
        qc_rows = report.qc.len(),
        "case processed"
    );
    Ok(report)
}

/// Fits every assigned trajectory against the shared cloud. Each fit seeds its
/// own generator, so the parallel results match a sequential run.
fn fit_assigned(
    cloud: &[Point3<f64>],
    trajectories: &[Trajectory],
    catalog: &ElectrodeCatalog,
    assignments: &AssignmentDocument,
    config: &CaseConfig,
) -> anyhow::Result<BTreeMap<String, FitOutcome>> {
    let by_name = trajectories_by_name(trajectories);
    let jobs: Vec<_> = assignments
        .assignments
        .iter()
        .filter(|a| a.is_assigned())
        .filter_map(|a| {
            let trajectory = by_name.get(&a.trajectory_name)?;
            let model = catalog.get(&a.model_id)?;
            Some((trajectory, model, a.tip_at))
        })
        .collect();

    jobs.par_iter()
        .map(|(trajectory, model, tip_at)| {
            let outcome =
                fit_electrode_axis(cloud, trajectory, model.offsets(), *tip_at, &config.fit)
                    .with_context(|| format!("fit_electrode_axis({}) failed", trajectory.name))?;
            if let FitOutcome::Failure(failure) = &outcome {
                warn!(trajectory = %trajectory.name, reason = %failure.reason, "axis fit rejected");
            }
            Ok::<_, anyhow::Error>((trajectory.name.clone(), outcome))
        })
        .collect()
}
