pub mod line_fit;
pub mod preprocessing;

use nalgebra::{Point3, Unit, Vector3};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::FitParams;
use crate::error::FitError;
use crate::geometry::{angle_deg, axial_position, radial_component};
use crate::io::{TipAt, Trajectory};
use line_fit::{ransac_fit_line, RansacLineConfig};
use preprocessing::{build_slab_centroids, filter_points_in_segment_cylinder, SlabLayout};

/// Why a fit was rejected. These are expected outcomes on real data, not bugs.
#[derive(Debug, Error, Clone, PartialEq, Serialize)]
pub enum FitFailureReason {
    #[error("No candidate points")]
    NoCandidatePoints,

    #[error("Too few CT points in ROI ({found} < {required})")]
    TooFewRoiPoints { found: usize, required: usize },

    #[error("Too few slab centroids for robust line fit ({found} < {required})")]
    TooFewSlabCentroids { found: usize, required: usize },

    #[error("Angle deviation {angle_deg:.2} deg exceeds max {max_angle_deg:.2}")]
    AngleExceeded { angle_deg: f64, max_angle_deg: f64 },
}

/// Whatever counts were computed before the pipeline stopped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FitDiagnostics {
    pub points_in_roi: Option<usize>,
    pub slab_centroids: Option<usize>,
    pub angle_deg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitFailure {
    pub reason: FitFailureReason,
    pub diagnostics: FitDiagnostics,
}

impl FitFailure {
    pub fn message(&self) -> String {
        self.reason.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitSuccess {
    pub entry: Point3<f64>,
    pub target: Point3<f64>,
    /// Fitted axis pointing target -> entry.
    pub axis: Vector3<f64>,
    /// Fitted axis pointing entry -> target.
    pub deep_axis: Vector3<f64>,
    pub center: Point3<f64>,
    /// Signed target displacement along the fitted deep axis.
    pub tip_shift_mm: f64,
    pub lateral_shift_mm: f64,
    pub angle_deg: f64,
    /// Mean distance from predicted contact centers to their nearest ROI point.
    pub residual_mm: f64,
    /// Mean nearest-depth distance along the fitted axis.
    pub one_d_residual_mm: f64,
    pub points_in_roi: usize,
    pub slab_centroids: usize,
    pub slab_inliers: usize,
    pub ransac_rms_mm: f64,
    pub ransac_consensus: bool,
    pub confidence: f64,
    pub deep_t_raw_mm: f64,
    pub deep_t_clamped_mm: f64,
    pub planned_target_t_mm: f64,
    pub planned_tip: Point3<f64>,
    pub planned_tip_axis: Vector3<f64>,
    pub slab_t_min_mm: f64,
    pub slab_t_max_mm: f64,
    pub predicted_contacts: Vec<Point3<f64>>,
}

impl FitSuccess {
    /// Corrected trajectory carrying the fitted entry and target.
    pub fn to_trajectory(&self, name: impl Into<String>) -> Trajectory {
        Trajectory::new(name, self.entry, self.target)
    }
}

/// Tagged result of [`fit_electrode_axis`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FitOutcome {
    Success(FitSuccess),
    Failure(FitFailure),
}

impl FitOutcome {
    fn failure(reason: FitFailureReason, diagnostics: FitDiagnostics) -> Self {
        FitOutcome::Failure(FitFailure {
            reason,
            diagnostics,
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FitOutcome::Success(_))
    }

    pub fn success(&self) -> Option<&FitSuccess> {
        match self {
            FitOutcome::Success(s) => Some(s),
            FitOutcome::Failure(_) => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&FitFailureReason> {
        match self {
            FitOutcome::Success(_) => None,
            FitOutcome::Failure(f) => Some(&f.reason),
        }
    }
}

/// Linear-interpolated quantile of unsorted values, `q` in `[0, 1]`.
fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

fn flip(axis: &Unit<Vector3<f64>>) -> Unit<Vector3<f64>> {
    Unit::new_unchecked(-axis.into_inner())
}

/// Recovers an electrode's axis and depth from a CT candidate cloud near a planned trajectory.
///
/// Stages: ROI cylinder around the planned segment, depth-slab centroids along the planned
/// axis, RANSAC + PCA line fit over the centroids, angle gate against the plan, deep-anchor
/// selection, and contact reconstruction from `offsets` (measured from the tip).
///
/// Data-quality problems come back as [`FitOutcome::Failure`]; only degenerate inputs
/// (zero-length plan, empty offsets, invalid params) return `Err`.
pub fn fit_electrode_axis(
    cloud: &[Point3<f64>],
    planned: &Trajectory,
    offsets: &[f64],
    tip_at: TipAt,
    params: &FitParams,
) -> Result<FitOutcome, FitError> {
    params.validate()?;
    let planned_length = planned.length();
    if planned_length <= 1e-6 {
        return Err(FitError::ZeroLengthTrajectory);
    }
    if offsets.is_empty() {
        return Err(FitError::NoOffsets);
    }
    if cloud.is_empty() {
        return Ok(FitOutcome::failure(
            FitFailureReason::NoCandidatePoints,
            FitDiagnostics::default(),
        ));
    }

    let entry = planned.start;
    let target = planned.end;
    let (planned_tip, planned_tip_axis) = planned.tip_and_axis(tip_at)?;
    let planned_deep_axis = planned.deep_axis()?;

    // 1) finite cylinder around the planned segment
    let roi = filter_points_in_segment_cylinder(
        cloud,
        &entry,
        &target,
        params.roi_radius_mm,
        params.roi_margin_mm(),
    )?;
    debug!(trajectory = %planned.name, cloud = cloud.len(), roi = roi.len(), "ROI extracted");
    let mut diagnostics = FitDiagnostics {
        points_in_roi: Some(roi.len()),
        ..Default::default()
    };
    if roi.len() < params.min_roi_points {
        return Ok(FitOutcome::failure(
            FitFailureReason::TooFewRoiPoints {
                found: roi.len(),
                required: params.min_roi_points,
            },
            diagnostics,
        ));
    }

    // 2) slab centroids along the planned deep axis
    let slab_t_min = -params.max_depth_shift_mm;
    let slab_t_max = planned_length + params.max_depth_shift_mm;
    let slabs = build_slab_centroids(
        &roi,
        &entry,
        &planned_deep_axis,
        &SlabLayout {
            t_min: slab_t_min,
            t_max: slab_t_max,
            step_mm: params.slab_step_mm,
            half_thickness_mm: params.slab_half_thickness_mm,
            min_points: params.min_points_per_slab,
        },
    );
    diagnostics.slab_centroids = Some(slabs.len());
    debug!(trajectory = %planned.name, slabs = slabs.len(), "slab centroids sampled");
    if slabs.len() < params.min_slab_centroids {
        return Ok(FitOutcome::failure(
            FitFailureReason::TooFewSlabCentroids {
                found: slabs.len(),
                required: params.min_slab_centroids,
            },
            diagnostics,
        ));
    }

    // 3) robust line over the centroids
    let line = ransac_fit_line(
        &slabs.centroids,
        &RansacLineConfig {
            max_iterations: params.ransac_iterations,
            inlier_threshold_mm: params.inlier_threshold_mm(),
            min_inliers: params.min_inliers(slabs.len()),
            seed: params.seed,
        },
    )?;
    if !line.consensus {
        warn!(
            trajectory = %planned.name,
            "RANSAC found no consensus, using PCA over all centroids"
        );
    }

    // 4) orient with the plan and gate on angle
    let fit_deep_axis = if line.axis.dot(&planned_deep_axis.into_inner()) < 0.0 {
        flip(&line.axis)
    } else {
        line.axis
    };
    let fit_super_axis = flip(&fit_deep_axis);
    let angle = angle_deg(&planned_deep_axis, &fit_deep_axis)?;
    diagnostics.angle_deg = Some(angle);
    if angle > params.max_angle_deg {
        return Ok(FitOutcome::failure(
            FitFailureReason::AngleExceeded {
                angle_deg: angle,
                max_angle_deg: params.max_angle_deg,
            },
            diagnostics,
        ));
    }

    let mut inliers = line.inliers(&slabs.centroids);
    if inliers.len() < 3 {
        inliers = slabs.centroids.clone();
    }

    // 5) deep anchor near the planned target depth
    let center = line.center;
    let t_in: Vec<f64> = inliers
        .iter()
        .map(|c| axial_position(c, &center, &fit_deep_axis))
        .collect();
    let planned_target_t = axial_position(&target, &center, &fit_deep_axis);
    let deep_min = planned_target_t - params.max_depth_shift_mm;
    let deep_max = planned_target_t + params.max_depth_shift_mm;
    let deep_t_raw = t_in
        .iter()
        .copied()
        .filter(|t| *t >= deep_min && *t <= deep_max)
        .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |a| a.max(t))))
        .unwrap_or_else(|| quantile(&t_in, params.anchor_quantile));
    let deep_t = deep_t_raw.clamp(deep_min, deep_max);

    // 6) reconstruct the trajectory and contact centers
    let fitted_target = center + fit_deep_axis.into_inner() * deep_t;
    let fitted_entry = fitted_target - fit_deep_axis.into_inner() * planned_length;
    let (fitted_tip, offsets_axis) = match tip_at {
        TipAt::Entry => (fitted_entry, fit_deep_axis),
        TipAt::Target => (fitted_target, fit_super_axis),
    };
    let predicted: Vec<Point3<f64>> = offsets
        .iter()
        .map(|off| fitted_tip + offsets_axis.into_inner() * *off)
        .collect();

    // 7) diagnostic residuals
    let residual_3d = predicted
        .iter()
        .map(|c| {
            roi.iter()
                .map(|p| (p - c).norm())
                .fold(f64::INFINITY, f64::min)
        })
        .sum::<f64>()
        / predicted.len() as f64;
    let cand_t: Vec<f64> = roi
        .iter()
        .map(|p| axial_position(p, &fitted_target, &fit_deep_axis))
        .collect();
    let one_d_residual = predicted
        .iter()
        .map(|c| {
            let pt = axial_position(c, &fitted_target, &fit_deep_axis);
            cand_t
                .iter()
                .map(|t| (t - pt).abs())
                .fold(f64::INFINITY, f64::min)
        })
        .sum::<f64>()
        / predicted.len() as f64;

    let delta_target = fitted_target - target;
    let tip_shift = fit_deep_axis.dot(&delta_target);
    let lateral_shift = radial_component(&delta_target, &fit_deep_axis).norm();

    debug!(
        trajectory = %planned.name,
        angle_deg = angle,
        tip_shift_mm = tip_shift,
        lateral_shift_mm = lateral_shift,
        inliers = inliers.len(),
        "axis fit accepted"
    );

    Ok(FitOutcome::Success(FitSuccess {
        entry: fitted_entry,
        target: fitted_target,
        axis: fit_super_axis.into_inner(),
        deep_axis: fit_deep_axis.into_inner(),
        center,
        tip_shift_mm: tip_shift,
        lateral_shift_mm: lateral_shift,
        angle_deg: angle,
        residual_mm: residual_3d,
        one_d_residual_mm: one_d_residual,
        points_in_roi: roi.len(),
        slab_centroids: slabs.len(),
        slab_inliers: inliers.len(),
        ransac_rms_mm: line.rms_mm,
        ransac_consensus: line.consensus,
        confidence: line.confidence(),
        deep_t_raw_mm: deep_t_raw,
        deep_t_clamped_mm: deep_t,
        planned_target_t_mm: planned_target_t,
        planned_tip,
        planned_tip_axis: planned_tip_axis.into_inner(),
        slab_t_min_mm: slab_t_min,
        slab_t_max_mm: slab_t_max,
        predicted_contacts: predicted,
    }))
}
