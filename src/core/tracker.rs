//! Tracker - the operation surface over the traceability components
//!
//! Every operation takes the caller explicitly, checks it against the
//! [`AccessPolicy`] first, then runs one scoped transaction on the store.
//! Nothing is held open between calls.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::access::{AccessPolicy, Caller, Operation, UserDirectory};
use super::catalog::{StatusChange, StoreCatalog, UnitCatalog, UnitFilter};
use super::config::Config;
use super::error::{RecordKind, TraceError};
use super::ledger::ProductionLedger;
use super::quality::{QualityGate, QualitySummary, RecordedDecision};
use super::registrar::IdentityRegistrar;
use super::resolver::{Trace, TraceabilityResolver};
use super::store::Store;
use crate::entities::{
    Amendment, DecisionId, Equipment, NewDecision, NewEquipment, NewStep, NewUnit,
    ProductionStep, QualityDecision, Role, StepId, StepStatus, TrackingIdentity, Unit, UnitId,
    UnitStatus, User, DEFAULT_LOCATION,
};

/// Result of a ship/sell request
#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdate {
    pub unit: Unit,
    pub change: StatusChange,
}

pub struct Tracker<C: UnitCatalog = StoreCatalog> {
    store: Store,
    catalog: C,
    policy: AccessPolicy,
    default_location: String,
}

impl Tracker<StoreCatalog> {
    pub fn new(store: Store, policy: AccessPolicy) -> Self {
        Self::with_catalog(store, StoreCatalog, policy)
    }

    /// Open the database at `path` with the settings in `config`
    pub fn open(path: &Path, config: &Config) -> Result<Self, TraceError> {
        let store = Store::open(path, config.busy_timeout())?;
        tracing::debug!(path = %path.display(), "opened trace store");
        Ok(Self::new(store, AccessPolicy::new(config.access()))
            .with_default_location(config.default_location()))
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    pub fn register_unit(&mut self, caller: &Caller, unit: &NewUnit) -> Result<Unit, TraceError> {
        self.policy.require(caller, Operation::RegisterUnit)?;
        let catalog = &self.catalog;
        let created = self
            .store
            .write(|tx| catalog.register_unit(tx, unit, Utc::now()))?;
        tracing::info!(unit_id = created.id, code = %created.code, "registered unit");
        Ok(created)
    }

    pub fn register_equipment(
        &mut self,
        caller: &Caller,
        equipment: &NewEquipment,
    ) -> Result<Equipment, TraceError> {
        self.policy.require(caller, Operation::RegisterEquipment)?;
        let catalog = &self.catalog;
        let created = self
            .store
            .write(|tx| catalog.register_equipment(tx, equipment))?;
        tracing::info!(equipment_id = created.id, code = %created.code, "registered equipment");
        Ok(created)
    }

    pub fn ship_unit(&mut self, caller: &Caller, unit_id: UnitId) -> Result<StatusUpdate, TraceError> {
        self.change_status(caller, unit_id, UnitStatus::Shipped)
    }

    pub fn sell_unit(&mut self, caller: &Caller, unit_id: UnitId) -> Result<StatusUpdate, TraceError> {
        self.change_status(caller, unit_id, UnitStatus::Sold)
    }

    fn change_status(
        &mut self,
        caller: &Caller,
        unit_id: UnitId,
        to: UnitStatus,
    ) -> Result<StatusUpdate, TraceError> {
        self.policy.require(caller, Operation::ChangeUnitStatus)?;
        let catalog = &self.catalog;
        self.store.write(|tx| {
            let change = catalog.request_status_change(tx, unit_id, to, Utc::now())?;
            let unit = catalog
                .get_unit(tx, unit_id)?
                .ok_or_else(|| TraceError::not_found(RecordKind::Unit, unit_id))?;
            Ok(StatusUpdate { unit, change })
        })
    }

    pub fn get_unit(&mut self, caller: &Caller, unit_id: UnitId) -> Result<Unit, TraceError> {
        self.policy.require(caller, Operation::Read)?;
        let catalog = &self.catalog;
        self.store.read(|tx| {
            catalog
                .get_unit(tx, unit_id)?
                .ok_or_else(|| TraceError::not_found(RecordKind::Unit, unit_id))
        })
    }

    pub fn find_unit_by_code(&mut self, caller: &Caller, code: &str) -> Result<Unit, TraceError> {
        self.policy.require(caller, Operation::Read)?;
        let catalog = &self.catalog;
        self.store.read(|tx| {
            catalog
                .find_unit_by_code(tx, code)?
                .ok_or_else(|| TraceError::not_found(RecordKind::Unit, code))
        })
    }

    pub fn list_units(&mut self, caller: &Caller, filter: &UnitFilter) -> Result<Vec<Unit>, TraceError> {
        self.policy.require(caller, Operation::Read)?;
        let catalog = &self.catalog;
        self.store.read(|tx| catalog.list_units(tx, filter))
    }

    pub fn find_equipment_by_code(
        &mut self,
        caller: &Caller,
        code: &str,
    ) -> Result<Equipment, TraceError> {
        self.policy.require(caller, Operation::Read)?;
        let catalog = &self.catalog;
        self.store.read(|tx| {
            catalog
                .find_equipment_by_code(tx, code)?
                .ok_or_else(|| TraceError::not_found(RecordKind::Equipment, code))
        })
    }
}

impl<C: UnitCatalog> Tracker<C> {
    pub fn with_catalog(store: Store, catalog: C, policy: AccessPolicy) -> Self {
        Self {
            store,
            catalog,
            policy,
            default_location: DEFAULT_LOCATION.to_string(),
        }
    }

    pub fn with_default_location(mut self, location: impl Into<String>) -> Self {
        self.default_location = location.into();
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Resolve `username` to a caller; unknown users are unauthorized
    pub fn authenticate(&mut self, username: &str) -> Result<Caller, TraceError> {
        let caller = self
            .store
            .read(|tx| AccessPolicy::current_user(tx, username))?;
        caller.ok_or_else(|| {
            tracing::warn!(user = %username, "refused: unknown user");
            TraceError::unknown_caller(username)
        })
    }

    /// Create the first admin of an empty user directory
    pub fn bootstrap_admin(&mut self, username: &str) -> Result<User, TraceError> {
        let user = self.store.write(|tx| {
            let users = UserDirectory::new(tx);
            if users.count()? > 0 {
                return Err(TraceError::Conflict(
                    "users already exist; add users as an admin instead".to_string(),
                ));
            }
            users.add(username, Role::Admin, Utc::now())
        })?;
        tracing::info!(user = %user.username, "bootstrapped admin");
        Ok(user)
    }

    pub fn add_user(&mut self, caller: &Caller, username: &str, role: Role) -> Result<User, TraceError> {
        self.policy.require(caller, Operation::ManageUsers)?;
        let user = self
            .store
            .write(|tx| UserDirectory::new(tx).add(username, role, Utc::now()))?;
        tracing::info!(user = %user.username, role = %user.role, by = %caller.username, "added user");
        Ok(user)
    }

    pub fn find_user(&mut self, caller: &Caller, username: &str) -> Result<User, TraceError> {
        self.policy.require(caller, Operation::Read)?;
        self.store.read(|tx| {
            UserDirectory::new(tx)
                .find_by_name(username)?
                .ok_or_else(|| TraceError::not_found(RecordKind::User, username))
        })
    }

    pub fn list_users(&mut self, caller: &Caller) -> Result<Vec<User>, TraceError> {
        self.policy.require(caller, Operation::Read)?;
        self.store.read(|tx| UserDirectory::new(tx).list())
    }

    // =========================================================================
    // Identity
    // =========================================================================

    pub fn assign_identity(
        &mut self,
        caller: &Caller,
        unit_id: UnitId,
        location: Option<&str>,
    ) -> Result<TrackingIdentity, TraceError> {
        self.policy.require(caller, Operation::AssignIdentity)?;
        let location = location
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(self.default_location.as_str());
        let catalog = &self.catalog;
        let identity = self.store.write(|tx| {
            IdentityRegistrar::new(tx, catalog).assign(unit_id, location, Some(caller.id), Utc::now())
        })?;
        tracing::info!(unit_id, token = %identity.token, by = %caller.username, "assigned identity");
        Ok(identity)
    }

    /// Move an identified unit; a blank location means the default location
    pub fn relocate(
        &mut self,
        caller: &Caller,
        unit_id: UnitId,
        location: Option<&str>,
    ) -> Result<TrackingIdentity, TraceError> {
        self.policy.require(caller, Operation::Relocate)?;
        let location = location
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(self.default_location.as_str());
        let catalog = &self.catalog;
        let identity = self.store.write(|tx| {
            IdentityRegistrar::new(tx, catalog).relocate(unit_id, location, Utc::now())
        })?;
        tracing::info!(unit_id, location = %identity.location, "relocated unit");
        Ok(identity)
    }

    pub fn lookup_identity(&mut self, caller: &Caller, token: &str) -> Result<TrackingIdentity, TraceError> {
        self.policy.require(caller, Operation::Read)?;
        let catalog = &self.catalog;
        self.store
            .read(|tx| IdentityRegistrar::new(tx, catalog).lookup(token.trim()))
    }

    pub fn identity_for_unit(
        &mut self,
        caller: &Caller,
        unit_id: UnitId,
    ) -> Result<Option<TrackingIdentity>, TraceError> {
        self.policy.require(caller, Operation::Read)?;
        let catalog = &self.catalog;
        self.store
            .read(|tx| IdentityRegistrar::new(tx, catalog).for_unit(unit_id))
    }

    pub fn verify_identity(
        &mut self,
        caller: &Caller,
        token: &str,
        presented_hash: &str,
    ) -> Result<bool, TraceError> {
        self.policy.require(caller, Operation::Read)?;
        let catalog = &self.catalog;
        let valid = self.store.read(|tx| {
            IdentityRegistrar::new(tx, catalog).verify(token.trim(), presented_hash)
        })?;
        if !valid {
            tracing::warn!(token = %token, "identity verification failed");
        }
        Ok(valid)
    }

    // =========================================================================
    // Production
    // =========================================================================

    pub fn append_production_step(
        &mut self,
        caller: &Caller,
        unit_id: UnitId,
        step: &NewStep,
    ) -> Result<ProductionStep, TraceError> {
        self.policy.require(caller, Operation::AppendStep)?;
        let catalog = &self.catalog;
        let stored = self.store.write(|tx| {
            ProductionLedger::new(tx, catalog).append_step(unit_id, step, Utc::now())
        })?;
        tracing::info!(unit_id, step_id = stored.id, step = %stored.process_step, status = %stored.status, "appended production step");
        Ok(stored)
    }

    pub fn advance_production_step(
        &mut self,
        caller: &Caller,
        step_id: StepId,
        to: StepStatus,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<ProductionStep, TraceError> {
        self.policy.require(caller, Operation::AdvanceStep)?;
        let catalog = &self.catalog;
        let stored = self.store.write(|tx| {
            ProductionLedger::new(tx, catalog).advance_step(step_id, to, end_time, Utc::now())
        })?;
        tracing::info!(step_id, status = %stored.status, "advanced production step");
        Ok(stored)
    }

    pub fn get_production_history(
        &mut self,
        caller: &Caller,
        unit_id: UnitId,
    ) -> Result<Vec<ProductionStep>, TraceError> {
        self.policy.require(caller, Operation::Read)?;
        let catalog = &self.catalog;
        self.store
            .read(|tx| ProductionLedger::new(tx, catalog).history(unit_id))
    }

    pub fn get_production_step(
        &mut self,
        caller: &Caller,
        step_id: StepId,
    ) -> Result<ProductionStep, TraceError> {
        self.policy.require(caller, Operation::Read)?;
        let catalog = &self.catalog;
        self.store.read(|tx| {
            ProductionLedger::new(tx, catalog)
                .get_step(step_id)?
                .ok_or_else(|| TraceError::not_found(RecordKind::Step, step_id))
        })
    }

    // =========================================================================
    // Quality
    // =========================================================================

    pub fn record_quality_decision(
        &mut self,
        caller: &Caller,
        unit_id: UnitId,
        decision: &NewDecision,
    ) -> Result<RecordedDecision, TraceError> {
        self.policy.require(caller, Operation::RecordDecision)?;
        let catalog = &self.catalog;
        let recorded = self.store.write(|tx| {
            QualityGate::new(tx, catalog).record(unit_id, decision, Utc::now())
        })?;
        tracing::info!(
            unit_id,
            decision_id = recorded.decision.id,
            passed = recorded.decision.pass_status,
            check = %recorded.decision.check_type,
            "recorded quality decision"
        );
        if recorded.recall == Some(StatusChange::Accepted) {
            tracing::warn!(unit_id, "unit recalled after failed final inspection");
        }
        Ok(recorded)
    }

    pub fn amend_quality_decision(
        &mut self,
        caller: &Caller,
        decision_id: DecisionId,
        amendment: &Amendment,
    ) -> Result<QualityDecision, TraceError> {
        self.policy.require(caller, Operation::AmendDecision)?;
        let catalog = &self.catalog;
        let amended = self
            .store
            .write(|tx| QualityGate::new(tx, catalog).amend(decision_id, amendment))?;
        tracing::info!(decision_id, by = %caller.username, "amended quality decision");
        Ok(amended)
    }

    pub fn get_quality_history(
        &mut self,
        caller: &Caller,
        unit_id: UnitId,
    ) -> Result<Vec<QualityDecision>, TraceError> {
        self.policy.require(caller, Operation::Read)?;
        let catalog = &self.catalog;
        self.store
            .read(|tx| QualityGate::new(tx, catalog).history(unit_id))
    }

    pub fn get_quality_score(&mut self, caller: &Caller, unit_id: UnitId) -> Result<Option<f64>, TraceError> {
        self.policy.require(caller, Operation::Read)?;
        let catalog = &self.catalog;
        self.store.read(|tx| QualityGate::new(tx, catalog).score(unit_id))
    }

    pub fn get_quality_summary(
        &mut self,
        caller: &Caller,
        unit_id: UnitId,
    ) -> Result<QualitySummary, TraceError> {
        self.policy.require(caller, Operation::Read)?;
        let catalog = &self.catalog;
        self.store.read(|tx| QualityGate::new(tx, catalog).summary(unit_id))
    }

    // =========================================================================
    // Trace
    // =========================================================================

    pub fn resolve_by_token(&mut self, caller: &Caller, token: &str) -> Result<Trace, TraceError> {
        self.policy.require(caller, Operation::Read)?;
        let catalog = &self.catalog;
        let trace = self
            .store
            .read(|tx| TraceabilityResolver::new(tx, catalog).resolve_by_token(token))?;
        tracing::debug!(
            unit_id = trace.unit.id,
            steps = trace.production.len(),
            decisions = trace.quality.len(),
            "resolved token"
        );
        Ok(trace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{CheckType, DEFAULT_LOCATION};

    fn tracker() -> (Tracker, Caller) {
        let mut tracker = Tracker::new(Store::open_in_memory().unwrap(), AccessPolicy::default());
        let admin = tracker.bootstrap_admin("alice").unwrap();
        (tracker, Caller::from(&admin))
    }

    #[test]
    fn test_bootstrap_only_once() {
        let (mut tracker, _) = tracker();
        assert_eq!(tracker.bootstrap_admin("bob").unwrap_err().code(), "conflict");
    }

    #[test]
    fn test_authenticate_unknown_user() {
        let (mut tracker, _) = tracker();
        assert!(tracker.authenticate("alice").is_ok());
        let err = tracker.authenticate("mallory").unwrap_err();
        assert_eq!(err.code(), "unauthorized");
    }

    #[test]
    fn test_role_gates_apply_before_work() {
        let (mut tracker, admin) = tracker();
        let unit = tracker
            .register_unit(&admin, &NewUnit::new("M-001", "Motor", "motor", "ACME"))
            .unwrap();
        let inspector = tracker.add_user(&admin, "ines", Role::Inspector).unwrap();
        let inspector = Caller::from(&inspector);

        let err = tracker.assign_identity(&inspector, unit.id, None).unwrap_err();
        assert_eq!(err.code(), "unauthorized");
        assert!(tracker.identity_for_unit(&admin, unit.id).unwrap().is_none());

        let err = tracker
            .append_production_step(&inspector, unit.id, &NewStep::new("winding", Utc::now()))
            .unwrap_err();
        assert_eq!(err.code(), "unauthorized");

        // Reads only need a known caller
        assert!(tracker.get_production_history(&inspector, unit.id).unwrap().is_empty());
    }

    #[test]
    fn test_default_location_applies() {
        let (mut tracker, admin) = tracker();
        let unit = tracker
            .register_unit(&admin, &NewUnit::new("M-001", "Motor", "motor", "ACME"))
            .unwrap();
        let identity = tracker.assign_identity(&admin, unit.id, Some("  ")).unwrap();
        assert_eq!(identity.location, DEFAULT_LOCATION);
        assert_eq!(identity.created_by, Some(admin.id));

        tracker.relocate(&admin, unit.id, Some("dock 4")).unwrap();
        let moved = tracker.relocate(&admin, unit.id, Some("")).unwrap();
        assert_eq!(moved.location, DEFAULT_LOCATION);
        let moved = tracker.relocate(&admin, unit.id, None).unwrap();
        assert_eq!(moved.location, DEFAULT_LOCATION);
    }

    #[test]
    fn test_ship_sell_and_recall() {
        let (mut tracker, admin) = tracker();
        let unit = tracker
            .register_unit(&admin, &NewUnit::new("M-001", "Motor", "motor", "ACME"))
            .unwrap();
        tracker.assign_identity(&admin, unit.id, None).unwrap();

        let shipped = tracker.ship_unit(&admin, unit.id).unwrap();
        assert_eq!(shipped.change, StatusChange::Accepted);
        assert_eq!(shipped.unit.status, UnitStatus::Shipped);
        assert_eq!(tracker.ship_unit(&admin, unit.id).unwrap().change, StatusChange::NoOp);

        tracker
            .record_quality_decision(&admin, unit.id, &NewDecision::new(admin.id, CheckType::Final, false))
            .unwrap();
        let identity = tracker.identity_for_unit(&admin, unit.id).unwrap().unwrap();
        assert_eq!(identity.status, UnitStatus::Recalled);

        let sold = tracker.sell_unit(&admin, unit.id).unwrap();
        assert_eq!(sold.change, StatusChange::NoOp);
        assert_eq!(sold.unit.status, UnitStatus::Recalled);
    }
}
