//! Equipment entity - machines and stations that production steps run on

use serde::{Deserialize, Serialize};

use super::EquipmentId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equipment {
    pub id: EquipmentId,

    /// Unique equipment code (asset tag)
    pub code: String,

    pub name: String,

    /// Where the equipment stands; copied into a unit's location mirror
    /// when the unit passes through it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewEquipment {
    pub code: String,
    pub name: String,
    pub location: Option<String>,
}

impl NewEquipment {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            location: None,
        }
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}
