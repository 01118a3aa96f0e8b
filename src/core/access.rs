//! Access policy - role-gated checks for traceability operations
//!
//! The caller is always an explicit parameter. Operations call
//! [`AccessPolicy::require`] first and never consult ambient state.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::error::{is_unique_violation, RecordKind, TraceError};
use super::serialize::{format_timestamp, timestamp_at};
use crate::entities::{Role, User, UserId};

/// An authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Caller {
    pub id: UserId,
    pub username: String,
    pub role: Role,
}

impl From<&User> for Caller {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            role: user.role,
        }
    }
}

/// Operations subject to a role check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    AssignIdentity,
    Relocate,
    AppendStep,
    AdvanceStep,
    RecordDecision,
    AmendDecision,
    RegisterUnit,
    RegisterEquipment,
    ChangeUnitStatus,
    ManageUsers,
    /// Any read; only requires an authenticated caller
    Read,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Operation::AssignIdentity => "assign identity",
            Operation::Relocate => "relocate unit",
            Operation::AppendStep => "append production step",
            Operation::AdvanceStep => "advance production step",
            Operation::RecordDecision => "record quality decision",
            Operation::AmendDecision => "amend quality decision",
            Operation::RegisterUnit => "register unit",
            Operation::RegisterEquipment => "register equipment",
            Operation::ChangeUnitStatus => "change unit status",
            Operation::ManageUsers => "manage users",
            Operation::Read => "read",
        };
        write!(f, "{}", s)
    }
}

/// Roles allowed per operation group (project config `access:` section)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Assign identities and relocate units
    pub identity: Vec<Role>,

    /// Append and advance production steps
    pub production: Vec<Role>,

    /// Record and amend quality decisions
    pub quality: Vec<Role>,

    /// Register units/equipment, ship and sell units
    pub catalog: Vec<Role>,

    /// Add users
    pub users: Vec<Role>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            identity: vec![Role::Admin, Role::Manager],
            production: vec![Role::Admin, Role::Manager, Role::Operator],
            quality: vec![Role::Admin, Role::Manager, Role::Inspector],
            catalog: vec![Role::Admin, Role::Manager],
            users: vec![Role::Admin],
        }
    }
}

/// Role checks for every operation
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    config: AccessConfig,
}

impl AccessPolicy {
    pub fn new(config: AccessConfig) -> Self {
        Self { config }
    }

    /// Roles allowed to perform `op`; `None` means any authenticated caller
    pub fn allowed_roles(&self, op: Operation) -> Option<&[Role]> {
        let roles = match op {
            Operation::AssignIdentity | Operation::Relocate => &self.config.identity,
            Operation::AppendStep | Operation::AdvanceStep => &self.config.production,
            Operation::RecordDecision | Operation::AmendDecision => &self.config.quality,
            Operation::RegisterUnit
            | Operation::RegisterEquipment
            | Operation::ChangeUnitStatus => &self.config.catalog,
            Operation::ManageUsers => &self.config.users,
            Operation::Read => return None,
        };
        Some(roles.as_slice())
    }

    pub fn has_role(caller: &Caller, allowed: &[Role]) -> bool {
        allowed.contains(&caller.role)
    }

    /// Fail with `Unauthorized` unless `caller` may perform `op`
    pub fn require(&self, caller: &Caller, op: Operation) -> Result<(), TraceError> {
        match self.allowed_roles(op) {
            None => Ok(()),
            Some(allowed) if Self::has_role(caller, allowed) => Ok(()),
            Some(allowed) => {
                tracing::warn!(
                    user = %caller.username,
                    role = %caller.role,
                    operation = %op,
                    "refused: role not permitted"
                );
                Err(TraceError::unauthorized(op, allowed))
            }
        }
    }

    /// Resolve a username to an authenticated caller
    pub fn current_user(conn: &Connection, username: &str) -> Result<Option<Caller>, TraceError> {
        Ok(UserDirectory::new(conn)
            .find_by_name(username)?
            .map(|u| Caller::from(&u)))
    }
}

/// Users known to the access policy
pub struct UserDirectory<'c> {
    conn: &'c Connection,
}

impl<'c> UserDirectory<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn add(&self, username: &str, role: Role, now: DateTime<Utc>) -> Result<User, TraceError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(TraceError::Conflict("username must not be empty".to_string()));
        }

        self.conn
            .execute(
                "INSERT INTO users (username, role, created_at) VALUES (?1, ?2, ?3)",
                params![username, role, format_timestamp(&now)],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    TraceError::Conflict(format!("user '{}' already exists", username))
                } else {
                    TraceError::Storage(e)
                }
            })?;

        let id = self.conn.last_insert_rowid();
        self.get(id)?
            .ok_or_else(|| TraceError::not_found(RecordKind::User, id))
    }

    pub fn get(&self, id: UserId) -> Result<Option<User>, TraceError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, username, role, created_at FROM users WHERE id = ?1",
                params![id],
                row_to_user,
            )
            .optional()?)
    }

    pub fn find_by_name(&self, username: &str) -> Result<Option<User>, TraceError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, username, role, created_at FROM users WHERE username = ?1",
                params![username],
                row_to_user,
            )
            .optional()?)
    }

    pub fn exists(&self, id: UserId) -> Result<bool, TraceError> {
        Ok(self
            .conn
            .query_row("SELECT 1 FROM users WHERE id = ?1", params![id], |_| Ok(()))
            .optional()?
            .is_some())
    }

    pub fn list(&self) -> Result<Vec<User>, TraceError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, username, role, created_at FROM users ORDER BY id")?;
        let users = stmt
            .query_map([], row_to_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    pub fn count(&self) -> Result<i64, TraceError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        role: row.get(2)?,
        created_at: timestamp_at(row, 3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::Store;

    fn caller(role: Role) -> Caller {
        Caller {
            id: 1,
            username: "tester".to_string(),
            role,
        }
    }

    #[test]
    fn test_default_role_gates() {
        let policy = AccessPolicy::default();

        assert!(policy.require(&caller(Role::Manager), Operation::AssignIdentity).is_ok());
        assert!(policy.require(&caller(Role::Inspector), Operation::AssignIdentity).is_err());

        assert!(policy.require(&caller(Role::Inspector), Operation::RecordDecision).is_ok());
        assert!(policy.require(&caller(Role::Operator), Operation::RecordDecision).is_err());

        assert!(policy.require(&caller(Role::Operator), Operation::AppendStep).is_ok());
        assert!(policy.require(&caller(Role::Inspector), Operation::AppendStep).is_err());

        assert!(policy.require(&caller(Role::Manager), Operation::ManageUsers).is_err());
        assert!(policy.require(&caller(Role::Admin), Operation::ManageUsers).is_ok());
    }

    #[test]
    fn test_reads_need_only_authentication() {
        let policy = AccessPolicy::default();
        for role in Role::all() {
            assert!(policy.require(&caller(*role), Operation::Read).is_ok());
        }
    }

    #[test]
    fn test_configured_roles_override_defaults() {
        let config = AccessConfig {
            identity: vec![Role::Operator],
            ..Default::default()
        };
        let policy = AccessPolicy::new(config);
        assert!(policy.require(&caller(Role::Operator), Operation::AssignIdentity).is_ok());
        assert!(policy.require(&caller(Role::Admin), Operation::AssignIdentity).is_err());
    }

    #[test]
    fn test_unauthorized_error_code() {
        let policy = AccessPolicy::default();
        let err = policy
            .require(&caller(Role::Operator), Operation::RecordDecision)
            .unwrap_err();
        assert_eq!(err.code(), "unauthorized");
    }

    #[test]
    fn test_user_directory() {
        let store = Store::open_in_memory().unwrap();
        let users = UserDirectory::new(store.connection());
        let now = Utc::now();

        let alice = users.add("alice", Role::Admin, now).unwrap();
        assert_eq!(alice.role, Role::Admin);
        assert!(users.exists(alice.id).unwrap());
        assert!(!users.exists(alice.id + 1).unwrap());

        let dup = users.add("alice", Role::Operator, now).unwrap_err();
        assert!(matches!(dup, TraceError::Conflict(_)));

        let current = AccessPolicy::current_user(store.connection(), "alice")
            .unwrap()
            .unwrap();
        assert_eq!(current.id, alice.id);
        assert!(AccessPolicy::current_user(store.connection(), "mallory")
            .unwrap()
            .is_none());
        assert_eq!(users.count().unwrap(), 1);
    }
}
