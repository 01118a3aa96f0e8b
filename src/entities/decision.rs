//! Quality decision entity - pass/fail inspection outcomes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DecisionId, UnitId, UserId};

/// Inspection stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    Incoming,
    #[default]
    InProcess,
    Final,
}

impl CheckType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckType::Incoming => "incoming",
            CheckType::InProcess => "in_process",
            CheckType::Final => "final",
        }
    }
}

impl std::fmt::Display for CheckType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CheckType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incoming" => Ok(CheckType::Incoming),
            "in_process" => Ok(CheckType::InProcess),
            "final" => Ok(CheckType::Final),
            _ => Err(format!("Unknown check type: {}", s)),
        }
    }
}

/// A single inspected characteristic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckItem {
    /// What was checked (e.g., "insulation resistance")
    pub name: String,

    /// Normalized score in [0, 1], when the item is scored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    /// Raw result as recorded by the inspector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl CheckItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            score: None,
            result: None,
            notes: None,
        }
    }

    pub fn scored(name: impl Into<String>, score: f64) -> Self {
        Self {
            score: Some(score),
            ..Self::new(name)
        }
    }
}

/// Mean of all item scores, `None` when no item carries a score
///
/// "No data" and "score zero" are different answers.
pub fn mean_score<'a, I>(items: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a CheckItem>,
{
    let (sum, count) = items
        .into_iter()
        .filter_map(|item| item.score)
        .fold((0.0_f64, 0_usize), |(sum, count), score| (sum + score, count + 1));

    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// A recorded inspection outcome
///
/// Everything except `comments` and `evidence` is fixed at insert time.
/// Corrections are new decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityDecision {
    pub id: DecisionId,

    pub unit_id: UnitId,

    pub inspector_id: UserId,

    pub check_type: CheckType,

    pub check_items: Vec<CheckItem>,

    pub pass_status: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,

    /// References to supporting evidence (image paths, report ids)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<String>,

    pub checked_at: DateTime<Utc>,
}

/// A decision to record against a unit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewDecision {
    pub inspector_id: UserId,
    pub check_type: CheckType,
    pub check_items: Vec<CheckItem>,
    pub pass_status: bool,
    pub comments: Option<String>,
    pub evidence: Vec<String>,
}

impl NewDecision {
    pub fn new(inspector_id: UserId, check_type: CheckType, pass_status: bool) -> Self {
        Self {
            inspector_id,
            check_type,
            pass_status,
            ..Default::default()
        }
    }

    pub fn with_item(mut self, item: CheckItem) -> Self {
        self.check_items.push(item);
        self
    }

    pub fn with_comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = Some(comments.into());
        self
    }

    pub fn with_evidence(mut self, reference: impl Into<String>) -> Self {
        self.evidence.push(reference.into());
        self
    }

    /// Failing a final inspection recalls the unit
    pub fn triggers_recall(&self) -> bool {
        !self.pass_status && self.check_type == CheckType::Final
    }

    pub fn validate(&self) -> Result<(), String> {
        for item in &self.check_items {
            if item.name.trim().is_empty() {
                return Err("check item name must not be empty".to_string());
            }
            if let Some(score) = item.score {
                if !score.is_finite() || !(0.0..=1.0).contains(&score) {
                    return Err(format!(
                        "score {} for '{}' is outside [0, 1]",
                        score, item.name
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Permitted edits of a recorded decision
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Amendment {
    /// Replacement comments (`Some("")` clears them)
    pub comments: Option<String>,

    /// Evidence references appended to the existing list
    pub add_evidence: Vec<String>,
}

impl Amendment {
    pub fn is_empty(&self) -> bool {
        self.comments.is_none() && self.add_evidence.is_empty()
    }
}
