//! Reconstruction and QC of stereotactic depth electrodes: frame-graph
//! composition, electrode model matching, CT-guided axis fitting, contact
//! placement and planned-vs-final deviation metrics.

pub mod config;
pub mod error;
pub mod geometry;
pub mod io;
pub mod processing;
mod utils;

pub use config::{CaseConfig, FitParams};
pub use error::{
    AssignmentError, CatalogError, ConfigError, FitError, FrameGraphError, GeometryError,
    PlacementError,
};
pub use io::{
    trajectories_by_name, Assignment, AssignmentDocument, ElectrodeCatalog, ElectrodeModel, Frame,
    TipAt, Trajectory,
};
pub use processing::axis_fit::{
    fit_electrode_axis, FitFailure, FitFailureReason, FitOutcome, FitSuccess,
};
pub use processing::contacts::{generate_contacts, generate_contacts_for_assignment, Contact};
pub use processing::frames::{build_effective_matrices, resolve_reference_index};
pub use processing::model_match::{suggest_assignments, suggest_model_id, suggest_model_id_among};
pub use processing::qc::{compute_qc_metrics, contacts_by_trajectory, QcRow};
pub use processing::{run_case, CaseInput, CaseReport};
