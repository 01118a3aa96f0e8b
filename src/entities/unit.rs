//! Unit entity - an individually tracked manufactured item

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UnitId;

/// Lifecycle status of a unit
///
/// ```text
/// produced --ship--> shipped --sell--> sold
/// produced|shipped|sold --(failed final check)--> recalled
/// recalled is terminal
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    #[default]
    Produced,
    Shipped,
    Sold,
    Recalled,
}

impl UnitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitStatus::Produced => "produced",
            UnitStatus::Shipped => "shipped",
            UnitStatus::Sold => "sold",
            UnitStatus::Recalled => "recalled",
        }
    }

    /// No transition leaves a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, UnitStatus::Recalled)
    }

    /// Check if moving from `self` to `to` is an edge of the lifecycle
    pub fn can_transition_to(&self, to: UnitStatus) -> bool {
        matches!(
            (*self, to),
            (UnitStatus::Produced, UnitStatus::Shipped)
                | (UnitStatus::Shipped, UnitStatus::Sold)
                | (UnitStatus::Produced, UnitStatus::Recalled)
                | (UnitStatus::Shipped, UnitStatus::Recalled)
                | (UnitStatus::Sold, UnitStatus::Recalled)
        )
    }

    /// Get allowed transitions from this status
    pub fn allowed_transitions(&self) -> Vec<UnitStatus> {
        match self {
            UnitStatus::Produced => vec![UnitStatus::Shipped, UnitStatus::Recalled],
            UnitStatus::Shipped => vec![UnitStatus::Sold, UnitStatus::Recalled],
            UnitStatus::Sold => vec![UnitStatus::Recalled],
            UnitStatus::Recalled => vec![],
        }
    }
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for UnitStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "produced" => Ok(UnitStatus::Produced),
            "shipped" => Ok(UnitStatus::Shipped),
            "sold" => Ok(UnitStatus::Sold),
            "recalled" => Ok(UnitStatus::Recalled),
            _ => Err(format!("Unknown unit status: {}", s)),
        }
    }
}

/// A manufactured unit as held by the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,

    /// Unique unit code (serial number)
    pub code: String,

    pub name: String,

    /// Unit type (e.g., "battery", "motor", "controller")
    pub unit_type: String,

    pub manufacturer: String,

    pub status: UnitStatus,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Fields needed to register a unit with the catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewUnit {
    pub code: String,
    pub name: String,
    pub unit_type: String,
    pub manufacturer: String,
}

impl NewUnit {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        unit_type: impl Into<String>,
        manufacturer: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            unit_type: unit_type.into(),
            manufacturer: manufacturer.into(),
        }
    }
}
