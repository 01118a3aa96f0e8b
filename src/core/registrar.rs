//! Identity registrar - issues one scannable identity per unit
//!
//! Assignment is check-then-insert. Callers run it inside a writer-locked
//! transaction ([`Store::write`](super::store::Store::write)), and the
//! `UNIQUE(unit_id)` constraint backs it up for writers on other
//! connections: a constraint hit is reported as `AlreadyIdentified`.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::catalog::UnitCatalog;
use super::error::{is_unique_violation, RecordKind, TraceError};
use super::serialize::{format_timestamp, timestamp_at};
use crate::entities::{integrity_hash, issue_token, TrackingIdentity, Unit, UnitId, UserId};

const IDENTITY_COLUMNS: &str =
    "id, unit_id, token, integrity_hash, location, status, created_by, created_at, last_updated";

/// Issues and looks up tracking identities
pub struct IdentityRegistrar<'c, C: UnitCatalog> {
    conn: &'c Connection,
    catalog: &'c C,
}

impl<'c, C: UnitCatalog> IdentityRegistrar<'c, C> {
    pub fn new(conn: &'c Connection, catalog: &'c C) -> Self {
        Self { conn, catalog }
    }

    /// Issue the identity for `unit_id`, stamped at `issued_at`
    pub fn assign(
        &self,
        unit_id: UnitId,
        location: &str,
        created_by: Option<UserId>,
        issued_at: DateTime<Utc>,
    ) -> Result<TrackingIdentity, TraceError> {
        let unit = self
            .catalog
            .get_unit(self.conn, unit_id)?
            .ok_or_else(|| TraceError::not_found(RecordKind::Unit, unit_id))?;

        if self.for_unit(unit_id)?.is_some() {
            tracing::warn!(unit_id, "refused: unit already identified");
            return Err(TraceError::AlreadyIdentified { unit_id });
        }

        self.insert_identity(&unit, location, created_by, issued_at)?;

        self.for_unit(unit_id)?
            .ok_or_else(|| TraceError::not_found(RecordKind::Unit, unit_id))
    }

    /// Insert the identity row; a writer on another connection that got
    /// there first surfaces as `AlreadyIdentified`
    fn insert_identity(
        &self,
        unit: &Unit,
        location: &str,
        created_by: Option<UserId>,
        issued_at: DateTime<Utc>,
    ) -> Result<(), TraceError> {
        let unit_id = unit.id;
        let token = issue_token(unit_id, issued_at);
        let hash = integrity_hash(&token);
        let ts = format_timestamp(&issued_at);

        self.conn
            .execute(
                "INSERT INTO identities
                    (unit_id, token, integrity_hash, location, status, created_by, created_at, last_updated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![unit_id, token, hash, location, unit.status, created_by, ts],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    tracing::warn!(unit_id, "identity insert lost a race");
                    TraceError::AlreadyIdentified { unit_id }
                } else {
                    TraceError::Storage(e)
                }
            })?;
        Ok(())
    }

    /// Find the identity registered under `token`
    pub fn lookup(&self, token: &str) -> Result<TrackingIdentity, TraceError> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM identities WHERE token = ?1", IDENTITY_COLUMNS),
                params![token],
                row_to_identity,
            )
            .optional()?
            .ok_or_else(|| TraceError::not_found(RecordKind::Token, token))
    }

    /// Identity of a unit, if one has been issued
    pub fn for_unit(&self, unit_id: UnitId) -> Result<Option<TrackingIdentity>, TraceError> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {} FROM identities WHERE unit_id = ?1", IDENTITY_COLUMNS),
                params![unit_id],
                row_to_identity,
            )
            .optional()?)
    }

    /// Check a scanned token and hash pair against the register
    ///
    /// Unknown tokens verify as `false` rather than failing.
    pub fn verify(&self, token: &str, presented_hash: &str) -> Result<bool, TraceError> {
        match self.lookup(token) {
            Ok(identity) => Ok(identity.verify(presented_hash)),
            Err(TraceError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Move the location mirror of an identified unit
    pub fn relocate(
        &self,
        unit_id: UnitId,
        location: &str,
        now: DateTime<Utc>,
    ) -> Result<TrackingIdentity, TraceError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(TraceError::InvalidLocation(
                "location must not be empty".to_string(),
            ));
        }
        self.touch_location(unit_id, location, now)?;
        self.for_unit(unit_id)?
            .ok_or_else(|| TraceError::not_found(RecordKind::Token, format!("unit {}", unit_id)))
    }

    /// Update the location mirror; returns false when the unit has no identity
    pub(crate) fn touch_location(
        &self,
        unit_id: UnitId,
        location: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, TraceError> {
        let changed = self.conn.execute(
            "UPDATE identities SET location = ?1, last_updated = ?2 WHERE unit_id = ?3",
            params![location, format_timestamp(&now), unit_id],
        )?;
        Ok(changed > 0)
    }
}

fn row_to_identity(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrackingIdentity> {
    Ok(TrackingIdentity {
        id: row.get(0)?,
        unit_id: row.get(1)?,
        token: row.get(2)?,
        integrity_hash: row.get(3)?,
        location: row.get(4)?,
        status: row.get(5)?,
        created_by: row.get(6)?,
        created_at: timestamp_at(row, 7)?,
        last_updated: timestamp_at(row, 8)?,
    })
}
