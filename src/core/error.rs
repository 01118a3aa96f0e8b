//! Error taxonomy for traceability operations
//!
//! Every variant is a recoverable failure with its own diagnostic code and
//! process exit code. Storage errors caused by racing writers are remapped to
//! domain errors before they reach callers.

use miette::Diagnostic;
use rusqlite::ErrorCode;
use thiserror::Error;

use crate::entities::{Role, StepId, StepStatus, UnitId, UnitStatus};

/// Kind of record a lookup failed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Unit,
    Token,
    Step,
    Decision,
    Inspector,
    Operator,
    Equipment,
    User,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecordKind::Unit => "Unit",
            RecordKind::Token => "Identity token",
            RecordKind::Step => "Production step",
            RecordKind::Decision => "Quality decision",
            RecordKind::Inspector => "Inspector",
            RecordKind::Operator => "Operator",
            RecordKind::Equipment => "Equipment",
            RecordKind::User => "User",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum TraceError {
    #[error("{kind} not found: {key}")]
    #[diagnostic(code(utrace::not_found))]
    NotFound { kind: RecordKind, key: String },

    #[error("Unit {unit_id} already has a tracking identity")]
    #[diagnostic(
        code(utrace::already_identified),
        help("Identities are issued once; scan the existing token instead")
    )]
    AlreadyIdentified { unit_id: UnitId },

    #[error("Invalid production step: {0}")]
    #[diagnostic(code(utrace::invalid_step))]
    InvalidStep(String),

    #[error("Production step {step_id} is {status} and can no longer change")]
    #[diagnostic(code(utrace::immutable_step))]
    ImmutableStep { step_id: StepId, status: StepStatus },

    #[error("Not authorized: {operation} requires {required}")]
    #[diagnostic(code(utrace::unauthorized))]
    Unauthorized {
        operation: String,
        required: String,
    },

    #[error("Invalid status transition: {from} -> {to}")]
    #[diagnostic(code(utrace::invalid_transition))]
    InvalidTransition { from: UnitStatus, to: UnitStatus },

    #[error("Invalid quality decision: {0}")]
    #[diagnostic(code(utrace::invalid_decision))]
    InvalidDecision(String),

    #[error("Conflict: {0}")]
    #[diagnostic(code(utrace::conflict))]
    Conflict(String),

    #[error("Invalid location: {0}")]
    #[diagnostic(code(utrace::invalid_location))]
    InvalidLocation(String),

    #[error("Storage error: {0}")]
    #[diagnostic(code(utrace::storage))]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(utrace::serialization))]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    #[diagnostic(code(utrace::io))]
    Io(#[from] std::io::Error),
}

impl TraceError {
    pub fn not_found(kind: RecordKind, key: impl ToString) -> Self {
        TraceError::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    pub fn unauthorized(operation: impl ToString, allowed: &[Role]) -> Self {
        let required = if allowed.is_empty() {
            "a role (none configured)".to_string()
        } else {
            let roles = allowed
                .iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>()
                .join(" or ");
            format!("role {}", roles)
        };
        TraceError::Unauthorized {
            operation: operation.to_string(),
            required,
        }
    }

    /// The named user is not registered
    pub fn unknown_caller(username: &str) -> Self {
        TraceError::Unauthorized {
            operation: format!("acting as '{}'", username),
            required: "a registered user".to_string(),
        }
    }

    /// Stable, machine-readable failure code
    pub fn code(&self) -> &'static str {
        match self {
            TraceError::NotFound { .. } => "not_found",
            TraceError::AlreadyIdentified { .. } => "already_identified",
            TraceError::InvalidStep(_) => "invalid_step",
            TraceError::ImmutableStep { .. } => "immutable_step",
            TraceError::Unauthorized { .. } => "unauthorized",
            TraceError::InvalidTransition { .. } => "invalid_transition",
            TraceError::InvalidDecision(_) => "invalid_decision",
            TraceError::Conflict(_) => "conflict",
            TraceError::InvalidLocation(_) => "invalid_location",
            TraceError::Storage(_) => "storage",
            TraceError::Serialization(_) => "serialization",
            TraceError::Io(_) => "io",
        }
    }

    /// Process exit code used by the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            TraceError::NotFound { .. } => 3,
            TraceError::AlreadyIdentified { .. } => 4,
            TraceError::InvalidStep(_) => 5,
            TraceError::ImmutableStep { .. } => 6,
            TraceError::Unauthorized { .. } => 7,
            TraceError::InvalidTransition { .. } => 8,
            TraceError::InvalidDecision(_) => 9,
            TraceError::Conflict(_) => 10,
            TraceError::InvalidLocation(_) => 11,
            TraceError::Storage(_) | TraceError::Serialization(_) | TraceError::Io(_) => 1,
        }
    }
}

/// Check whether a storage error is a UNIQUE / PRIMARY KEY violation
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == ErrorCode::ConstraintViolation
                && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            TraceError::not_found(RecordKind::Unit, 1),
            TraceError::AlreadyIdentified { unit_id: 1 },
            TraceError::InvalidStep("x".into()),
            TraceError::ImmutableStep {
                step_id: 1,
                status: StepStatus::Completed,
            },
            TraceError::unauthorized("assign", &[Role::Admin]),
            TraceError::InvalidTransition {
                from: UnitStatus::Sold,
                to: UnitStatus::Shipped,
            },
            TraceError::InvalidDecision("x".into()),
            TraceError::Conflict("x".into()),
            TraceError::InvalidLocation("x".into()),
        ];
        let mut codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        let mut exits: Vec<_> = errors.iter().map(|e| e.exit_code()).collect();
        codes.sort();
        codes.dedup();
        exits.sort();
        exits.dedup();
        assert_eq!(codes.len(), errors.len());
        assert_eq!(exits.len(), errors.len());
    }

    #[test]
    fn test_unauthorized_message_lists_roles() {
        let err = TraceError::unauthorized("record decision", &[Role::Admin, Role::Inspector]);
        assert_eq!(
            err.to_string(),
            "Not authorized: record decision requires role admin or inspector"
        );
    }

    #[test]
    fn test_unique_violation_detection() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE t (k TEXT UNIQUE)", []).unwrap();
        conn.execute("INSERT INTO t VALUES ('a')", []).unwrap();
        let err = conn.execute("INSERT INTO t VALUES ('a')", []).unwrap_err();
        assert!(is_unique_violation(&err));

        let other = conn.execute("INSERT INTO missing VALUES (1)", []).unwrap_err();
        assert!(!is_unique_violation(&other));
    }
}
