//! Entity type definitions
//!
//! unit-trace stores the following records:
//!
//! **Catalog:**
//! - [`Unit`] - A manufactured item with a lifecycle status
//! - [`Equipment`] - Production equipment referenced by production steps
//!
//! **Traceability:**
//! - [`TrackingIdentity`] - The one-time scannable identity of a unit
//! - [`ProductionStep`] - One recorded stage of manufacturing
//! - [`QualityDecision`] - A pass/fail inspection outcome
//!
//! **Access:**
//! - [`User`] - A caller known to the access policy, with a role
//!
//! Records reference each other by id only; there are no back-pointers.

pub mod decision;
pub mod equipment;
pub mod identity;
pub mod step;
pub mod unit;
pub mod user;

pub use decision::{mean_score, Amendment, CheckItem, CheckType, NewDecision, QualityDecision};
pub use equipment::{Equipment, NewEquipment};
pub use identity::{integrity_hash, issue_token, TrackingIdentity, DEFAULT_LOCATION};
pub use step::{NewStep, ProductionStep, StepStatus};
pub use unit::{NewUnit, Unit, UnitStatus};
pub use user::{Role, User};

/// Row id of a [`Unit`]
pub type UnitId = i64;

/// Row id of a [`ProductionStep`] (also its insertion sequence number)
pub type StepId = i64;

/// Row id of a [`QualityDecision`]
pub type DecisionId = i64;

/// Row id of a [`User`]
pub type UserId = i64;

/// Row id of an [`Equipment`] record
pub type EquipmentId = i64;
