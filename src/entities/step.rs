//! Production step entity - one recorded stage of manufacturing for a unit

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EquipmentId, StepId, UnitId, UserId};

/// Execution status of a production step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        }
    }

    /// Finalized steps accept no further changes
    pub fn is_final(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }

    /// Check if an open step may move to `to`
    pub fn can_advance_to(&self, to: StepStatus) -> bool {
        matches!(
            (*self, to),
            (StepStatus::Pending, StepStatus::InProgress)
                | (StepStatus::Pending, StepStatus::Completed)
                | (StepStatus::Pending, StepStatus::Failed)
                | (StepStatus::InProgress, StepStatus::Completed)
                | (StepStatus::InProgress, StepStatus::Failed)
        )
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StepStatus::Pending),
            "in_progress" => Ok(StepStatus::InProgress),
            "completed" => Ok(StepStatus::Completed),
            "failed" => Ok(StepStatus::Failed),
            _ => Err(format!("Unknown step status: {}", s)),
        }
    }
}

/// A production step as stored in the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionStep {
    /// Insertion sequence number, breaks ties between equal start times
    pub id: StepId,

    pub unit_id: UnitId,

    /// Process step name (e.g., "winding", "potting", "end-of-line test")
    pub process_step: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equipment_id: Option<EquipmentId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_id: Option<UserId>,

    pub start_time: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    /// Free-form process parameters
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub parameters: serde_json::Map<String, serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    pub status: StepStatus,
}

/// A step to append to a unit's ledger
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewStep {
    pub process_step: String,
    pub equipment_id: Option<EquipmentId>,
    pub operator_id: Option<UserId>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub notes: Option<String>,
    pub status: StepStatus,
}

impl NewStep {
    /// Create a pending step that started at `start_time`
    pub fn new(process_step: impl Into<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            process_step: process_step.into(),
            start_time,
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: StepStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_end_time(mut self, end_time: DateTime<Utc>) -> Self {
        self.end_time = Some(end_time);
        self
    }

    pub fn with_equipment(mut self, equipment_id: EquipmentId) -> Self {
        self.equipment_id = Some(equipment_id);
        self
    }

    pub fn with_operator(mut self, operator_id: UserId) -> Self {
        self.operator_id = Some(operator_id);
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Check the shape of the step before it touches the ledger
    pub fn validate(&self) -> Result<(), String> {
        if self.process_step.trim().is_empty() {
            return Err("process step name must not be empty".to_string());
        }
        if let Some(end) = self.end_time {
            if !self.status.is_final() {
                return Err(format!(
                    "end time only applies to completed or failed steps, not {}",
                    self.status
                ));
            }
            if end < self.start_time {
                return Err(format!(
                    "end time {} precedes start time {}",
                    end.to_rfc3339(),
                    self.start_time.to_rfc3339()
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_final_statuses() {
        assert!(StepStatus::Completed.is_final());
        assert!(StepStatus::Failed.is_final());
        assert!(!StepStatus::Pending.is_final());
        assert!(!StepStatus::InProgress.is_final());
    }

    #[test]
    fn test_advance_edges() {
        assert!(StepStatus::Pending.can_advance_to(StepStatus::InProgress));
        assert!(StepStatus::InProgress.can_advance_to(StepStatus::Completed));
        assert!(StepStatus::InProgress.can_advance_to(StepStatus::Failed));
        assert!(!StepStatus::InProgress.can_advance_to(StepStatus::Pending));
        assert!(!StepStatus::InProgress.can_advance_to(StepStatus::InProgress));
        assert!(!StepStatus::Completed.can_advance_to(StepStatus::Failed));
    }

    #[test]
    fn test_validate_time_range() {
        let ok = NewStep::new("winding", t0())
            .with_status(StepStatus::Completed)
            .with_end_time(t0() + Duration::minutes(5));
        assert!(ok.validate().is_ok());

        let same = NewStep::new("winding", t0())
            .with_status(StepStatus::Failed)
            .with_end_time(t0());
        assert!(same.validate().is_ok());

        let bad = NewStep::new("winding", t0())
            .with_status(StepStatus::Completed)
            .with_end_time(t0() - Duration::seconds(1));
        assert!(bad.validate().unwrap_err().contains("precedes"));
    }

    #[test]
    fn test_validate_end_time_needs_final_status() {
        let pending = NewStep::new("winding", t0()).with_end_time(t0() + Duration::minutes(10));
        assert!(pending.validate().unwrap_err().contains("completed or failed"));

        let running = pending.clone().with_status(StepStatus::InProgress);
        assert!(running.validate().is_err());
    }

    #[test]
    fn test_validate_blank_name() {
        assert!(NewStep::new("   ", t0()).validate().is_err());
    }
}
