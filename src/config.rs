use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::io::TipAt;
use crate::processing::model_match::DEFAULT_TOLERANCE_MM;

/// Tuning constants for the electrode axis fitter.
///
/// The inlier threshold (`roi_radius_mm * inlier_threshold_scale`, clamped to
/// `[inlier_threshold_min_mm, inlier_threshold_max_mm]`) and the minimum
/// inlier count (`max(min_inliers_floor, min_inlier_fraction * centroids)`)
/// are empirical defaults and meant to be tuned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitParams {
    /// Radius of the cylindrical ROI around the planned segment.
    pub roi_radius_mm: f64,
    /// Largest accepted angle between planned and fitted axes.
    pub max_angle_deg: f64,
    /// Depth window around the planned target (and slab range beyond both ends).
    pub max_depth_shift_mm: f64,
    /// Extra ROI margin beyond both endpoints on top of `max_depth_shift_mm`.
    pub roi_extra_margin_mm: f64,
    pub min_roi_points: usize,
    pub slab_step_mm: f64,
    pub slab_half_thickness_mm: f64,
    pub min_points_per_slab: usize,
    pub min_slab_centroids: usize,
    pub ransac_iterations: usize,
    /// Seed for the RANSAC sampler; identical seeds give identical fits.
    pub seed: u64,
    pub inlier_threshold_scale: f64,
    pub inlier_threshold_min_mm: f64,
    pub inlier_threshold_max_mm: f64,
    pub min_inliers_floor: usize,
    pub min_inlier_fraction: f64,
    /// Depth quantile used when no inlier falls in the target window.
    pub anchor_quantile: f64,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            roi_radius_mm: 3.0,
            max_angle_deg: 12.0,
            max_depth_shift_mm: 20.0,
            roi_extra_margin_mm: 5.0,
            min_roi_points: 24,
            slab_step_mm: 1.0,
            slab_half_thickness_mm: 0.9,
            min_points_per_slab: 8,
            min_slab_centroids: 8,
            ransac_iterations: 220,
            seed: 0,
            inlier_threshold_scale: 0.55,
            inlier_threshold_min_mm: 0.45,
            inlier_threshold_max_mm: 1.2,
            min_inliers_floor: 6,
            min_inlier_fraction: 0.45,
            anchor_quantile: 0.95,
        }
    }
}

fn require(
    ok: bool,
    field: &'static str,
    requirement: &'static str,
    value: f64,
) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            requirement,
            value,
        })
    }
}

impl FitParams {
    pub fn inlier_threshold_mm(&self) -> f64 {
        (self.roi_radius_mm * self.inlier_threshold_scale)
            .max(self.inlier_threshold_min_mm)
            .min(self.inlier_threshold_max_mm)
    }

    pub fn min_inliers(&self, centroid_count: usize) -> usize {
        let by_fraction = (self.min_inlier_fraction * centroid_count as f64) as usize;
        self.min_inliers_floor.max(by_fraction)
    }

    pub fn roi_margin_mm(&self) -> f64 {
        self.max_depth_shift_mm + self.roi_extra_margin_mm
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require(self.roi_radius_mm > 0.0, "roi_radius_mm", "> 0", self.roi_radius_mm)?;
        require(
            (0.0..=180.0).contains(&self.max_angle_deg),
            "max_angle_deg",
            "within [0, 180]",
            self.max_angle_deg,
        )?;
        require(
            self.max_depth_shift_mm >= 0.0,
            "max_depth_shift_mm",
            ">= 0",
            self.max_depth_shift_mm,
        )?;
        require(
            self.roi_extra_margin_mm >= 0.0,
            "roi_extra_margin_mm",
            ">= 0",
            self.roi_extra_margin_mm,
        )?;
        require(self.slab_step_mm > 0.0, "slab_step_mm", "> 0", self.slab_step_mm)?;
        require(
            self.slab_half_thickness_mm > 0.0,
            "slab_half_thickness_mm",
            "> 0",
            self.slab_half_thickness_mm,
        )?;
        require(
            self.min_slab_centroids >= 3,
            "min_slab_centroids",
            ">= 3",
            self.min_slab_centroids as f64,
        )?;
        require(
            self.min_inliers_floor >= 3,
            "min_inliers_floor",
            ">= 3",
            self.min_inliers_floor as f64,
        )?;
        require(
            self.ransac_iterations > 0,
            "ransac_iterations",
            "> 0",
            self.ransac_iterations as f64,
        )?;
        require(
            self.inlier_threshold_min_mm > 0.0
                && self.inlier_threshold_min_mm <= self.inlier_threshold_max_mm,
            "inlier_threshold_min_mm",
            "> 0 and <= inlier_threshold_max_mm",
            self.inlier_threshold_min_mm,
        )?;
        require(
            (0.0..=1.0).contains(&self.min_inlier_fraction),
            "min_inlier_fraction",
            "within [0, 1]",
            self.min_inlier_fraction,
        )?;
        require(
            (0.0..=1.0).contains(&self.anchor_quantile),
            "anchor_quantile",
            "within [0, 1]",
            self.anchor_quantile,
        )?;
        Ok(())
    }
}

/// Case-level settings, usually read from a TOML file next to the case data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseConfig {
    /// Name of the frame used as root; the first frame when unset.
    pub reference_volume: Option<String>,
    pub match_tolerance_mm: f64,
    pub default_tip_at: TipAt,
    pub fit: FitParams,
}

impl Default for CaseConfig {
    fn default() -> Self {
        Self {
            reference_volume: None,
            match_tolerance_mm: DEFAULT_TOLERANCE_MM,
            default_tip_at: TipAt::Target,
            fit: FitParams::default(),
        }
    }
}

impl CaseConfig {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let config: CaseConfig = toml::from_str(text).context("failed to parse case config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read case config {:?}", path))?;
        Self::from_toml_str(&text).with_context(|| format!("invalid case config {:?}", path))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require(
            self.match_tolerance_mm >= 0.0,
            "match_tolerance_mm",
            ">= 0",
            self.match_tolerance_mm,
        )?;
        self.fit.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fit_params_defaults() {
        let params = FitParams::default();
        assert_eq!(params.ransac_iterations, 220);
        assert_relative_eq!(params.inlier_threshold_mm(), 1.2);
        assert_relative_eq!(params.roi_margin_mm(), 25.0);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_inlier_threshold_clamps() {
        let small = FitParams {
            roi_radius_mm: 0.2,
            ..Default::default()
        };
        assert_relative_eq!(small.inlier_threshold_mm(), 0.45);
        let mid = FitParams {
            roi_radius_mm: 1.0,
            ..Default::default()
        };
        assert_relative_eq!(mid.inlier_threshold_mm(), 0.55);
    }

    #[test]
    fn test_min_inliers_formula() {
        let params = FitParams::default();
        assert_eq!(params.min_inliers(8), 6);
        assert_eq!(params.min_inliers(40), 18);
        assert_eq!(params.min_inliers(41), 18);
    }

    #[test]
    fn test_case_config_from_toml_partial() {
        let config = CaseConfig::from_toml_str(
            r#"
            reference_volume = "T1"
            match_tolerance_mm = 3.0
            default_tip_at = "entry"

            [fit]
            roi_radius_mm = 2.5
            seed = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.reference_volume.as_deref(), Some("T1"));
        assert_eq!(config.default_tip_at, TipAt::Entry);
        assert_relative_eq!(config.fit.roi_radius_mm, 2.5);
        assert_eq!(config.fit.seed, 7);
        assert_eq!(config.fit.ransac_iterations, 220);
    }

    #[test]
    fn test_case_config_rejects_out_of_range() {
        assert!(CaseConfig::from_toml_str("match_tolerance_mm = -1.0").is_err());
        let err = FitParams {
            slab_step_mm: 0.0,
            ..Default::default()
        }
        .validate()
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::OutOfRange {
                field: "slab_step_mm",
                ..
            }
        ));
    }

    #[test]
    fn test_two_slab_centroids_are_rejected() {
        // a line fit over fewer than three centroids has no fallback
        let err = FitParams {
            min_slab_centroids: 2,
            ..Default::default()
        }
        .validate()
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::OutOfRange {
                field: "min_slab_centroids",
                ..
            }
        ));
        let three = FitParams {
            min_slab_centroids: 3,
            ..Default::default()
        };
        assert!(three.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_gives_defaults() {
        assert_eq!(CaseConfig::from_toml_str("").unwrap(), CaseConfig::default());
    }
}
