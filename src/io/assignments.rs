use anyhow::Context;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::AssignmentError;
use crate::io::input::Trajectory;

pub const SCHEMA_VERSION: &str = "1.0";

/// Which planned endpoint the physical electrode tip sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum TipAt {
    Entry,
    #[default]
    Target,
}

impl TipAt {
    pub fn as_str(&self) -> &'static str {
        match self {
            TipAt::Entry => "entry",
            TipAt::Target => "target",
        }
    }
}

impl fmt::Display for TipAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TipAt {
    type Err = AssignmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entry" => Ok(TipAt::Entry),
            "target" => Ok(TipAt::Target),
            _ => Err(AssignmentError::InvalidTipAt(s.to_string())),
        }
    }
}

impl TryFrom<String> for TipAt {
    type Error = AssignmentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One trajectory → electrode model binding with optional manual adjustments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    #[serde(rename = "trajectory")]
    pub trajectory_name: String,
    #[serde(default)]
    pub model_id: String,
    #[serde(default)]
    pub tip_at: TipAt,
    #[serde(default)]
    pub tip_shift_mm: f64,
    #[serde(default)]
    pub xyz_offset_mm: [f64; 3],
}

impl Assignment {
    pub fn new(trajectory_name: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            trajectory_name: trajectory_name.into(),
            model_id: model_id.into(),
            tip_at: TipAt::Target,
            tip_shift_mm: 0.0,
            xyz_offset_mm: [0.0; 3],
        }
    }

    pub fn with_tip_at(mut self, tip_at: TipAt) -> Self {
        self.tip_at = tip_at;
        self
    }

    pub fn xyz_offset(&self) -> Vector3<f64> {
        Vector3::from(self.xyz_offset_mm)
    }

    /// Empty model ids mark trajectories that have not been assigned yet.
    pub fn is_assigned(&self) -> bool {
        !self.model_id.is_empty()
    }
}

/// Explicit assignment document; the shorthand `{name: model_id}` form normalizes into this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentDocument {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub assignments: Vec<Assignment>,
}

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

impl AssignmentDocument {
    pub fn new(assignments: Vec<Assignment>) -> Self {
        Self {
            schema_version: default_schema_version(),
            assignments,
        }
    }

    /// One editable row per trajectory, all sharing the same default model and tip anchor.
    pub fn template(
        trajectories: &[Trajectory],
        default_model_id: &str,
        default_tip_at: TipAt,
    ) -> Self {
        Self::new(
            trajectories
                .iter()
                .map(|t| {
                    Assignment::new(t.name.clone(), default_model_id).with_tip_at(default_tip_at)
                })
                .collect(),
        )
    }

    pub fn from_value(data: Value) -> Result<Self, AssignmentError> {
        let obj = match data {
            Value::Object(obj) => obj,
            _ => return Err(AssignmentError::UnsupportedFormat),
        };

        if obj.contains_key("assignments") {
            return serde_json::from_value(Value::Object(obj))
                .map_err(|e| AssignmentError::MalformedRow(e.to_string()));
        }

        let mut rows = Vec::with_capacity(obj.len());
        for (trajectory, model) in obj {
            let model_id = model
                .as_str()
                .ok_or(AssignmentError::UnsupportedFormat)?;
            rows.push(Assignment::new(trajectory, model_id));
        }
        Ok(Self::new(rows))
    }

    pub fn from_json_str(text: &str) -> anyhow::Result<Self> {
        let data: Value = serde_json::from_str(text).context("assignments are not valid JSON")?;
        Ok(Self::from_value(data)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read assignments {:?}", path))?;
        Self::from_json_str(&text).with_context(|| format!("invalid assignments file {:?}", path))
    }

    pub fn to_json_string(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize assignments")
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json_string()?)
            .with_context(|| format!("failed to write assignments {:?}", path))
    }

    pub fn get(&self, trajectory_name: &str) -> Option<&Assignment> {
        self.assignments
            .iter()
            .find(|a| a.trajectory_name == trajectory_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;
    use serde_json::json;

    #[test]
    fn test_shorthand_normalizes_to_explicit_rows() {
        let doc = AssignmentDocument::from_value(json!({"RHH": "DIXI-15AM", "LHH": "DIXI-15CM"}))
            .unwrap();
        assert_eq!(doc.schema_version, "1.0");
        assert_eq!(doc.assignments.len(), 2);
        let rhh = doc.get("RHH").unwrap();
        assert_eq!(rhh.model_id, "DIXI-15AM");
        assert_eq!(rhh.tip_at, TipAt::Target);
        assert_eq!(rhh.tip_shift_mm, 0.0);
        assert_eq!(rhh.xyz_offset_mm, [0.0; 3]);
    }

    #[test]
    fn test_explicit_rows_fill_defaults_and_parse_tip_at() {
        let doc = AssignmentDocument::from_value(json!({
            "assignments": [
                {"trajectory": "RHH", "model_id": "A", "tip_at": "ENTRY", "tip_shift_mm": 1.5},
                {"trajectory": "LHH", "model_id": "B", "xyz_offset_mm": [0.5, -1.0, 2.0]}
            ]
        }))
        .unwrap();
        assert_eq!(doc.assignments[0].tip_at, TipAt::Entry);
        assert_eq!(doc.assignments[0].tip_shift_mm, 1.5);
        assert_eq!(doc.assignments[1].tip_at, TipAt::Target);
        assert_eq!(doc.assignments[1].xyz_offset_mm, [0.5, -1.0, 2.0]);
    }

    #[test]
    fn test_invalid_tip_at_is_rejected() {
        let res = AssignmentDocument::from_value(json!({
            "assignments": [{"trajectory": "RHH", "model_id": "A", "tip_at": "middle"}]
        }));
        assert!(matches!(res, Err(AssignmentError::MalformedRow(_))));
        assert_eq!(
            "middle".parse::<TipAt>(),
            Err(AssignmentError::InvalidTipAt("middle".into()))
        );
    }

    #[test]
    fn test_unsupported_shapes() {
        assert_eq!(
            AssignmentDocument::from_value(json!([1, 2])),
            Err(AssignmentError::UnsupportedFormat)
        );
        assert_eq!(
            AssignmentDocument::from_value(json!({"RHH": 3})),
            Err(AssignmentError::UnsupportedFormat)
        );
    }

    #[test]
    fn test_round_trip_explicit_and_shorthand() {
        let explicit = AssignmentDocument::new(vec![
            Assignment::new("RHH", "A").with_tip_at(TipAt::Entry),
            Assignment {
                tip_shift_mm: -2.0,
                xyz_offset_mm: [1.0, 0.0, 0.0],
                ..Assignment::new("LHH", "B")
            },
        ]);
        let text = explicit.to_json_string().unwrap();
        assert_eq!(AssignmentDocument::from_json_str(&text).unwrap(), explicit);

        let shorthand = AssignmentDocument::from_json_str(r#"{"LHH": "B", "RHH": "A"}"#).unwrap();
        let reloaded =
            AssignmentDocument::from_json_str(&shorthand.to_json_string().unwrap()).unwrap();
        assert_eq!(reloaded, shorthand);
    }

    #[test]
    fn test_template_has_one_row_per_trajectory() {
        let trajectories = vec![
            Trajectory::new("A", Point3::origin(), Point3::new(0.0, 0.0, 10.0)),
            Trajectory::new("B", Point3::origin(), Point3::new(0.0, 10.0, 0.0)),
        ];
        let doc = AssignmentDocument::template(&trajectories, "", TipAt::Entry);
        assert_eq!(doc.assignments.len(), 2);
        assert!(doc.assignments.iter().all(|a| !a.is_assigned()));
        assert!(doc.assignments.iter().all(|a| a.tip_at == TipAt::Entry));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = std::env::temp_dir().join(format!("rosars_assign_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("assignments.json");
        let doc = AssignmentDocument::new(vec![Assignment::new("RHH", "A")]);
        doc.save(&path).unwrap();
        assert_eq!(AssignmentDocument::load(&path).unwrap(), doc);
        std::fs::remove_dir_all(&dir).ok();
    }
}
