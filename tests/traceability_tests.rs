//! Traceability tests - identities, histories and recall through the Tracker

use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{Duration, TimeZone, Utc};
use tempfile::TempDir;
use utrace::core::{
    AccessPolicy, Caller, Config, StatusChange, Store, TraceError, Tracker,
};
use utrace::entities::{
    integrity_hash, Amendment, CheckItem, CheckType, NewDecision, NewStep, NewUnit, Role,
    StepStatus, UnitId, UnitStatus,
};

fn tracker() -> (Tracker, Caller) {
    let store = Store::open_in_memory().unwrap();
    let mut tracker = Tracker::new(store, AccessPolicy::default());
    let admin = tracker.bootstrap_admin("alice").unwrap();
    let caller = tracker.authenticate(&admin.username).unwrap();
    (tracker, caller)
}

fn new_unit(tracker: &mut Tracker, caller: &Caller, code: &str) -> UnitId {
    tracker
        .register_unit(caller, &NewUnit::new(code, "Drive motor", "motor", "Acme"))
        .unwrap()
        .id
}

// ============================================================================
// End-to-end
// ============================================================================

#[test]
fn test_identify_produce_fail_final_and_resolve() {
    let (mut tracker, admin) = tracker();
    let u1 = new_unit(&mut tracker, &admin, "U1");

    let identity = tracker.assign_identity(&admin, u1, None).unwrap();
    assert!(identity.hash_matches());

    let err = tracker.assign_identity(&admin, u1, None).unwrap_err();
    assert!(matches!(err, TraceError::AlreadyIdentified { unit_id } if unit_id == u1));

    let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
    let s1 = tracker
        .append_production_step(&admin, u1, &NewStep::new("winding", t0))
        .unwrap();
    let s2 = tracker
        .append_production_step(&admin, u1, &NewStep::new("assembly", t0 + Duration::seconds(1)))
        .unwrap();

    let history = tracker.get_production_history(&admin, u1).unwrap();
    let ids: Vec<_> = history.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![s1.id, s2.id]);

    let recorded = tracker
        .record_quality_decision(&admin, u1, &NewDecision::new(admin.id, CheckType::Final, false))
        .unwrap();
    assert_eq!(recorded.recall, Some(StatusChange::Accepted));
    assert_eq!(tracker.get_unit(&admin, u1).unwrap().status, UnitStatus::Recalled);

    let trace = tracker.resolve_by_token(&admin, &identity.token).unwrap();
    assert_eq!(trace.identity.token, identity.token);
    assert_eq!(trace.unit.status, UnitStatus::Recalled);
    assert_eq!(trace.identity.status, UnitStatus::Recalled);
    assert_eq!(trace.production.len(), 2);
    assert_eq!(trace.quality.len(), 1);
    assert_eq!(trace.quality[0].id, recorded.decision.id);
}

#[test]
fn test_resolve_unknown_token_not_found() {
    let (mut tracker, admin) = tracker();
    let err = tracker.resolve_by_token(&admin, "UT-missing").unwrap_err();
    assert!(matches!(err, TraceError::NotFound { .. }));
}

// ============================================================================
// Identity
// ============================================================================

#[test]
fn test_concurrent_assign_single_winner() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("trace.db");
    let config = Config::default();

    let (unit_id, admin) = {
        let mut tracker = Tracker::open(&db, &config).unwrap();
        let admin = tracker.bootstrap_admin("alice").unwrap();
        let caller = tracker.authenticate(&admin.username).unwrap();
        (new_unit(&mut tracker, &caller, "RACE-1"), caller)
    };

    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            let db = db.clone();
            let config = config.clone();
            let admin = admin.clone();
            thread::spawn(move || {
                let mut tracker = Tracker::open(&db, &config).unwrap();
                barrier.wait();
                tracker.assign_identity(&admin, unit_id, Some("line 1"))
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one assign must win: {:?}", results);
    for result in results.iter().filter(|r| r.is_err()) {
        assert!(matches!(
            result,
            Err(TraceError::AlreadyIdentified { .. })
        ));
    }
}

#[test]
fn test_verify_token_and_hash() {
    let (mut tracker, admin) = tracker();
    let unit_id = new_unit(&mut tracker, &admin, "U1");
    let identity = tracker.assign_identity(&admin, unit_id, Some("cell 4")).unwrap();

    assert_eq!(identity.location, "cell 4");
    assert_eq!(identity.integrity_hash, integrity_hash(&identity.token));
    assert!(tracker
        .verify_identity(&admin, &identity.token, &identity.integrity_hash)
        .unwrap());
    assert!(!tracker
        .verify_identity(&admin, &identity.token, "deadbeef")
        .unwrap());
    assert!(!tracker
        .verify_identity(&admin, "UT-unknown", &identity.integrity_hash)
        .unwrap());
}

#[test]
fn test_relocate_keeps_token() {
    let (mut tracker, admin) = tracker();
    let unit_id = new_unit(&mut tracker, &admin, "U1");
    let identity = tracker.assign_identity(&admin, unit_id, None).unwrap();

    let moved = tracker.relocate(&admin, unit_id, Some("warehouse B")).unwrap();
    assert_eq!(moved.token, identity.token);
    assert_eq!(moved.integrity_hash, identity.integrity_hash);
    assert_eq!(moved.location, "warehouse B");
}

#[test]
fn test_blank_relocate_uses_configured_default() {
    let store = Store::open_in_memory().unwrap();
    let mut tracker =
        Tracker::new(store, AccessPolicy::default()).with_default_location("receiving");
    let admin = tracker.bootstrap_admin("alice").unwrap();
    let admin = tracker.authenticate(&admin.username).unwrap();
    let unit_id = new_unit(&mut tracker, &admin, "U1");
    tracker.assign_identity(&admin, unit_id, Some("line 2")).unwrap();

    let moved = tracker.relocate(&admin, unit_id, Some("   ")).unwrap();
    assert_eq!(moved.location, "receiving");
}

// ============================================================================
// Production
// ============================================================================

#[test]
fn test_history_ordered_by_start_time_not_insertion() {
    let (mut tracker, admin) = tracker();
    let unit_id = new_unit(&mut tracker, &admin, "U1");
    let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();

    for (name, offset) in [("test", 30), ("winding", 0), ("assembly", 10)] {
        tracker
            .append_production_step(&admin, unit_id, &NewStep::new(name, t0 + Duration::minutes(offset)))
            .unwrap();
    }

    let names: Vec<_> = tracker
        .get_production_history(&admin, unit_id)
        .unwrap()
        .into_iter()
        .map(|s| s.process_step)
        .collect();
    assert_eq!(names, vec!["winding", "assembly", "test"]);
}

#[test]
fn test_finalized_step_is_immutable() {
    let (mut tracker, admin) = tracker();
    let unit_id = new_unit(&mut tracker, &admin, "U1");
    let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();

    let step = tracker
        .append_production_step(&admin, unit_id, &NewStep::new("winding", t0))
        .unwrap();
    let step = tracker
        .advance_production_step(&admin, step.id, StepStatus::InProgress, None)
        .unwrap();
    let done = tracker
        .advance_production_step(&admin, step.id, StepStatus::Completed, Some(t0 + Duration::hours(1)))
        .unwrap();
    assert_eq!(done.end_time, Some(t0 + Duration::hours(1)));

    let err = tracker
        .advance_production_step(&admin, done.id, StepStatus::Failed, None)
        .unwrap_err();
    assert!(matches!(err, TraceError::ImmutableStep { .. }));
    assert_eq!(
        tracker.get_production_step(&admin, done.id).unwrap().status,
        StepStatus::Completed
    );
}

#[test]
fn test_step_end_before_start_rejected() {
    let (mut tracker, admin) = tracker();
    let unit_id = new_unit(&mut tracker, &admin, "U1");
    let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();

    let step = NewStep::new("winding", t0)
        .with_status(StepStatus::Completed)
        .with_end_time(t0 - Duration::minutes(5));
    let err = tracker.append_production_step(&admin, unit_id, &step).unwrap_err();
    assert!(matches!(err, TraceError::InvalidStep(_)));
    assert!(tracker.get_production_history(&admin, unit_id).unwrap().is_empty());
}

// ============================================================================
// Quality
// ============================================================================

#[test]
fn test_score_undefined_until_scored_items_exist() {
    let (mut tracker, admin) = tracker();
    let unit_id = new_unit(&mut tracker, &admin, "U1");

    assert_eq!(tracker.get_quality_score(&admin, unit_id).unwrap(), None);

    let unscored = NewDecision::new(admin.id, CheckType::InProcess, true)
        .with_item(CheckItem::new("visual"));
    tracker.record_quality_decision(&admin, unit_id, &unscored).unwrap();
    assert_eq!(tracker.get_quality_score(&admin, unit_id).unwrap(), None);

    let scored = NewDecision::new(admin.id, CheckType::InProcess, false)
        .with_item(CheckItem::scored("torque", 0.0))
        .with_item(CheckItem::scored("noise", 0.5));
    tracker.record_quality_decision(&admin, unit_id, &scored).unwrap();
    assert_eq!(tracker.get_quality_score(&admin, unit_id).unwrap(), Some(0.25));

    let summary = tracker.get_quality_summary(&admin, unit_id).unwrap();
    assert_eq!((summary.total, summary.passed, summary.failed), (2, 1, 1));
}

#[test]
fn test_second_failed_final_is_noop_recall() {
    let (mut tracker, admin) = tracker();
    let unit_id = new_unit(&mut tracker, &admin, "U1");
    let failed_final = NewDecision::new(admin.id, CheckType::Final, false);

    let first = tracker
        .record_quality_decision(&admin, unit_id, &failed_final)
        .unwrap();
    let second = tracker
        .record_quality_decision(&admin, unit_id, &failed_final)
        .unwrap();

    assert_eq!(first.recall, Some(StatusChange::Accepted));
    assert_eq!(second.recall, Some(StatusChange::NoOp));
    assert_eq!(tracker.get_quality_history(&admin, unit_id).unwrap().len(), 2);
}

#[test]
fn test_failed_in_process_check_does_not_recall() {
    let (mut tracker, admin) = tracker();
    let unit_id = new_unit(&mut tracker, &admin, "U1");

    let recorded = tracker
        .record_quality_decision(&admin, unit_id, &NewDecision::new(admin.id, CheckType::InProcess, false))
        .unwrap();
    assert_eq!(recorded.recall, None);
    assert_eq!(tracker.get_unit(&admin, unit_id).unwrap().status, UnitStatus::Produced);
}

#[test]
fn test_amend_keeps_outcome() {
    let (mut tracker, admin) = tracker();
    let unit_id = new_unit(&mut tracker, &admin, "U1");
    let recorded = tracker
        .record_quality_decision(
            &admin,
            unit_id,
            &NewDecision::new(admin.id, CheckType::Incoming, true).with_evidence("photo-1.jpg"),
        )
        .unwrap();

    let amended = tracker
        .amend_quality_decision(
            &admin,
            recorded.decision.id,
            &Amendment {
                comments: Some("label reprinted".to_string()),
                add_evidence: vec!["photo-2.jpg".to_string()],
            },
        )
        .unwrap();
    assert!(amended.pass_status);
    assert_eq!(amended.comments.as_deref(), Some("label reprinted"));
    assert_eq!(amended.evidence, vec!["photo-1.jpg", "photo-2.jpg"]);
}

// ============================================================================
// Lifecycle and access
// ============================================================================

#[test]
fn test_sold_unit_recalled_and_recall_is_terminal() {
    let (mut tracker, admin) = tracker();
    let unit_id = new_unit(&mut tracker, &admin, "U1");

    assert_eq!(tracker.ship_unit(&admin, unit_id).unwrap().change, StatusChange::Accepted);
    assert_eq!(tracker.ship_unit(&admin, unit_id).unwrap().change, StatusChange::NoOp);
    assert_eq!(tracker.sell_unit(&admin, unit_id).unwrap().change, StatusChange::Accepted);

    let recorded = tracker
        .record_quality_decision(&admin, unit_id, &NewDecision::new(admin.id, CheckType::Final, false))
        .unwrap();
    assert_eq!(recorded.recall, Some(StatusChange::Accepted));
    assert_eq!(tracker.get_unit(&admin, unit_id).unwrap().status, UnitStatus::Recalled);

    let update = tracker.ship_unit(&admin, unit_id).unwrap();
    assert_eq!(update.change, StatusChange::NoOp);
    assert_eq!(update.unit.status, UnitStatus::Recalled);
}

#[test]
fn test_sell_before_ship_rejected() {
    let (mut tracker, admin) = tracker();
    let unit_id = new_unit(&mut tracker, &admin, "U1");

    let err = tracker.sell_unit(&admin, unit_id).unwrap_err();
    assert!(matches!(
        err,
        TraceError::InvalidTransition {
            from: UnitStatus::Produced,
            to: UnitStatus::Sold
        }
    ));
}

#[test]
fn test_operator_cannot_assign_or_record() {
    let (mut tracker, admin) = tracker();
    let unit_id = new_unit(&mut tracker, &admin, "U1");
    tracker.add_user(&admin, "olga", Role::Operator).unwrap();
    let olga = tracker.authenticate("olga").unwrap();

    let err = tracker.assign_identity(&olga, unit_id, None).unwrap_err();
    assert!(matches!(err, TraceError::Unauthorized { .. }));
    let err = tracker
        .record_quality_decision(&olga, unit_id, &NewDecision::new(olga.id, CheckType::Final, false))
        .unwrap_err();
    assert!(matches!(err, TraceError::Unauthorized { .. }));
    assert_eq!(tracker.get_unit(&olga, unit_id).unwrap().status, UnitStatus::Produced);

    let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
    tracker
        .append_production_step(&olga, unit_id, &NewStep::new("winding", t0).with_operator(olga.id))
        .unwrap();
}

#[test]
fn test_unknown_user_cannot_authenticate() {
    let (mut tracker, _admin) = tracker();
    let err = tracker.authenticate("mallory").unwrap_err();
    assert!(matches!(err, TraceError::Unauthorized { .. }));
}
