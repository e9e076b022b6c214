use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::CatalogError;

const REQUIRED_MODEL_KEYS: [&str; 7] = [
    "id",
    "type",
    "contact_count",
    "contact_length_mm",
    "diameter_mm",
    "total_exploration_length_mm",
    "contact_center_offsets_from_tip_mm",
];

/// Catalog electrode geometry. Offsets are contact centers measured from the tip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectrodeModel {
    pub id: String,
    #[serde(rename = "type")]
    pub model_type: String,
    pub contact_count: usize,
    pub contact_length_mm: f64,
    pub diameter_mm: f64,
    pub total_exploration_length_mm: f64,
    pub contact_center_offsets_from_tip_mm: Vec<f64>,
}

impl ElectrodeModel {
    /// Checks the offset vector against `contact_count` and for strict monotonicity.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let offsets = &self.contact_center_offsets_from_tip_mm;
        if offsets.len() != self.contact_count {
            return Err(CatalogError::OffsetCountMismatch {
                id: self.id.clone(),
                contact_count: self.contact_count,
                offsets: offsets.len(),
            });
        }
        if offsets.windows(2).any(|w| w[0] >= w[1]) {
            return Err(CatalogError::OffsetsNotIncreasing(self.id.clone()));
        }
        Ok(())
    }

    pub fn exploration_length_mm(&self) -> f64 {
        self.total_exploration_length_mm
    }

    pub fn offsets(&self) -> &[f64] {
        &self.contact_center_offsets_from_tip_mm
    }
}

/// Validated, id-ordered set of electrode models.
#[derive(Debug, Clone, PartialEq)]
pub struct ElectrodeCatalog {
    models: BTreeMap<String, ElectrodeModel>,
}

impl ElectrodeCatalog {
    pub fn new(models: Vec<ElectrodeModel>) -> Result<Self, CatalogError> {
        if models.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut by_id = BTreeMap::new();
        for model in models {
            model.validate()?;
            if by_id.contains_key(&model.id) {
                return Err(CatalogError::DuplicateId(model.id));
            }
            by_id.insert(model.id.clone(), model);
        }
        Ok(Self { models: by_id })
    }

    /// Validates a `{"models": [...]}` document and builds the catalog.
    pub fn from_value(data: &Value) -> Result<Self, CatalogError> {
        let obj = data.as_object().ok_or(CatalogError::NotAnObject)?;
        let entries = obj
            .get("models")
            .and_then(Value::as_array)
            .ok_or(CatalogError::MissingModels)?;

        let mut models = Vec::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            let mut missing: Vec<String> = REQUIRED_MODEL_KEYS
                .iter()
                .filter(|key| entry.get(**key).is_none())
                .map(|key| key.to_string())
                .collect();
            missing.sort();
            if !missing.is_empty() {
                return Err(CatalogError::MissingFields {
                    position,
                    fields: missing,
                });
            }
            let model: ElectrodeModel =
                serde_json::from_value(entry.clone()).map_err(|e| CatalogError::Malformed {
                    position,
                    message: e.to_string(),
                })?;
            models.push(model);
        }
        Self::new(models)
    }

    pub fn from_json_str(text: &str) -> anyhow::Result<Self> {
        let data: Value =
            serde_json::from_str(text).context("electrode library is not valid JSON")?;
        Ok(Self::from_value(&data)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read electrode library {:?}", path))?;
        Self::from_json_str(&text)
            .with_context(|| format!("invalid electrode library {:?}", path))
    }

    pub fn get(&self, id: &str) -> Option<&ElectrodeModel> {
        self.models.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.models.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ElectrodeModel> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
