//! Serializable chain snapshots
//!
//! A preset is an ordered list of effect types with their parameter values.
//! The same snapshot types back `SignalChainManager::export_chain` and
//! `import_chain`.

use crate::domain::effects::{EffectDescriptor, ParamValue};
use serde::{Deserialize, Serialize};

/// One parameter value, keyed by parameter id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSnapshot {
    pub id: String,
    pub value: ParamValue,
}

impl ParamSnapshot {
    pub fn new(id: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
        }
    }
}

/// One effect of a chain: its type name and ordered parameter values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectSnapshot {
    pub effect_type: String,
    #[serde(default)]
    pub params: Vec<ParamSnapshot>,
}

impl EffectSnapshot {
    pub fn new(effect_type: impl Into<String>) -> Self {
        Self {
            effect_type: effect_type.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, id: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.push(ParamSnapshot::new(id, value));
        self
    }
}

impl From<&EffectDescriptor> for EffectSnapshot {
    fn from(descriptor: &EffectDescriptor) -> Self {
        Self {
            effect_type: descriptor.effect_type.as_str().to_string(),
            params: descriptor
                .parameters
                .iter()
                .map(|p| ParamSnapshot::new(p.id.clone(), p.value.clone()))
                .collect(),
        }
    }
}

/// A named, persisted chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub effects: Vec<EffectSnapshot>,
}

impl Preset {
    pub fn new(name: impl Into<String>, effects: Vec<EffectSnapshot>) -> Self {
        let name = name.into();
        Self {
            id: slug(&name),
            name,
            effects,
        }
    }

    /// Encode for key-value string storage
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Lowercase, filesystem-safe form of a preset name
pub(crate) fn slug(name: &str) -> String {
    let slug: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "preset".to_string()
    } else {
        slug
    }
}
