pub mod assignments;
pub mod catalog;
pub mod input;

pub use assignments::{Assignment, AssignmentDocument, TipAt};
pub use catalog::{ElectrodeCatalog, ElectrodeModel};
pub use input::{trajectories_by_name, Frame, Trajectory};
