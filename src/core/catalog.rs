//! Unit catalog - the collaborator that owns units and their lifecycle status
//!
//! The traceability components only need a narrow view of the catalog:
//! existence checks and status-change requests. That view is the
//! [`UnitCatalog`] trait. [`StoreCatalog`] implements it on the same SQLite
//! store, so catalog reads and writes join the caller's transaction.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::error::{is_unique_violation, RecordKind, TraceError};
use super::serialize::{format_timestamp, timestamp_at};
use crate::entities::{Equipment, EquipmentId, NewEquipment, NewUnit, Unit, UnitId, UnitStatus};

/// Outcome of a status-change request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusChange {
    /// The unit moved to the requested status
    Accepted,
    /// The unit was already there, or is in a terminal status
    NoOp,
}

/// What the traceability core needs from the catalog
///
/// Every method receives the connection of the running transaction.
pub trait UnitCatalog {
    fn get_unit(&self, conn: &Connection, unit_id: UnitId) -> Result<Option<Unit>, TraceError>;

    fn unit_exists(&self, conn: &Connection, unit_id: UnitId) -> Result<bool, TraceError> {
        Ok(self.get_unit(conn, unit_id)?.is_some())
    }

    fn get_equipment(
        &self,
        conn: &Connection,
        equipment_id: EquipmentId,
    ) -> Result<Option<Equipment>, TraceError>;

    /// Ask the catalog to move a unit to `to`
    ///
    /// The catalog enforces the lifecycle. Requests against a terminal status
    /// or the current status are `NoOp`, not errors.
    fn request_status_change(
        &self,
        conn: &Connection,
        unit_id: UnitId,
        to: UnitStatus,
        now: DateTime<Utc>,
    ) -> Result<StatusChange, TraceError>;
}

/// Filter for listing units
#[derive(Debug, Clone, Default)]
pub struct UnitFilter {
    pub status: Option<UnitStatus>,
    pub unit_type: Option<String>,
    pub search: Option<String>,
    pub limit: Option<usize>,
}

/// Catalog kept in the traceability store
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreCatalog;

const UNIT_COLUMNS: &str =
    "id, code, name, unit_type, manufacturer, status, created_at, updated_at";

impl StoreCatalog {
    pub fn register_unit(
        &self,
        conn: &Connection,
        unit: &NewUnit,
        now: DateTime<Utc>,
    ) -> Result<Unit, TraceError> {
        for (field, value) in [
            ("code", &unit.code),
            ("name", &unit.name),
            ("type", &unit.unit_type),
            ("manufacturer", &unit.manufacturer),
        ] {
            if value.trim().is_empty() {
                return Err(TraceError::Conflict(format!("unit {} must not be empty", field)));
            }
        }

        let ts = format_timestamp(&now);
        conn.execute(
            "INSERT INTO units (code, name, unit_type, manufacturer, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                unit.code.trim(),
                unit.name,
                unit.unit_type,
                unit.manufacturer,
                UnitStatus::Produced,
                ts
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                TraceError::Conflict(format!("unit code '{}' already registered", unit.code))
            } else {
                TraceError::Storage(e)
            }
        })?;

        let id = conn.last_insert_rowid();
        self.get_unit(conn, id)?
            .ok_or_else(|| TraceError::not_found(RecordKind::Unit, id))
    }

    pub fn find_unit_by_code(
        &self,
        conn: &Connection,
        code: &str,
    ) -> Result<Option<Unit>, TraceError> {
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM units WHERE code = ?1", UNIT_COLUMNS),
                params![code],
                row_to_unit,
            )
            .optional()?)
    }

    pub fn list_units(&self, conn: &Connection, filter: &UnitFilter) -> Result<Vec<Unit>, TraceError> {
        let mut sql = format!("SELECT {} FROM units WHERE 1=1", UNIT_COLUMNS);
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            args.push(Box::new(status));
            sql.push_str(&format!(" AND status = ?{}", args.len()));
        }
        if let Some(ref unit_type) = filter.unit_type {
            args.push(Box::new(unit_type.clone()));
            sql.push_str(&format!(" AND unit_type = ?{}", args.len()));
        }
        if let Some(ref search) = filter.search {
            args.push(Box::new(format!("%{}%", search)));
            sql.push_str(&format!(
                " AND (code LIKE ?{n} OR name LIKE ?{n})",
                n = args.len()
            ));
        }
        sql.push_str(" ORDER BY id");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let params_refs: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let units = stmt
            .query_map(params_refs.as_slice(), row_to_unit)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(units)
    }

    pub fn register_equipment(
        &self,
        conn: &Connection,
        equipment: &NewEquipment,
    ) -> Result<Equipment, TraceError> {
        if equipment.code.trim().is_empty() || equipment.name.trim().is_empty() {
            return Err(TraceError::Conflict(
                "equipment code and name must not be empty".to_string(),
            ));
        }

        conn.execute(
            "INSERT INTO equipment (code, name, location) VALUES (?1, ?2, ?3)",
            params![equipment.code.trim(), equipment.name, equipment.location],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                TraceError::Conflict(format!(
                    "equipment code '{}' already registered",
                    equipment.code
                ))
            } else {
                TraceError::Storage(e)
            }
        })?;

        let id = conn.last_insert_rowid();
        self.get_equipment(conn, id)?
            .ok_or_else(|| TraceError::not_found(RecordKind::Equipment, id))
    }

    pub fn find_equipment_by_code(
        &self,
        conn: &Connection,
        code: &str,
    ) -> Result<Option<Equipment>, TraceError> {
        Ok(conn
            .query_row(
                "SELECT id, code, name, location FROM equipment WHERE code = ?1",
                params![code],
                row_to_equipment,
            )
            .optional()?)
    }
}

impl UnitCatalog for StoreCatalog {
    fn get_unit(&self, conn: &Connection, unit_id: UnitId) -> Result<Option<Unit>, TraceError> {
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM units WHERE id = ?1", UNIT_COLUMNS),
                params![unit_id],
                row_to_unit,
            )
            .optional()?)
    }

    fn get_equipment(
        &self,
        conn: &Connection,
        equipment_id: EquipmentId,
    ) -> Result<Option<Equipment>, TraceError> {
        Ok(conn
            .query_row(
                "SELECT id, code, name, location FROM equipment WHERE id = ?1",
                params![equipment_id],
                row_to_equipment,
            )
            .optional()?)
    }

    fn request_status_change(
        &self,
        conn: &Connection,
        unit_id: UnitId,
        to: UnitStatus,
        now: DateTime<Utc>,
    ) -> Result<StatusChange, TraceError> {
        let unit = self
            .get_unit(conn, unit_id)?
            .ok_or_else(|| TraceError::not_found(RecordKind::Unit, unit_id))?;

        if unit.status == to || unit.status.is_terminal() {
            tracing::debug!(unit_id, status = %unit.status, requested = %to, "status change is a no-op");
            return Ok(StatusChange::NoOp);
        }
        if !unit.status.can_transition_to(to) {
            return Err(TraceError::InvalidTransition {
                from: unit.status,
                to,
            });
        }

        let ts = format_timestamp(&now);
        conn.execute(
            "UPDATE units SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![to, ts, unit_id],
        )?;
        // Keep the identity mirror in step with the unit
        conn.execute(
            "UPDATE identities SET status = ?1, last_updated = ?2 WHERE unit_id = ?3",
            params![to, ts, unit_id],
        )?;

        tracing::info!(unit_id, from = %unit.status, to = %to, "unit status changed");
        Ok(StatusChange::Accepted)
    }
}

fn row_to_unit(row: &rusqlite::Row<'_>) -> rusqlite::Result<Unit> {
    Ok(Unit {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        unit_type: row.get(3)?,
        manufacturer: row.get(4)?,
        status: row.get(5)?,
        created_at: timestamp_at(row, 6)?,
        updated_at: timestamp_at(row, 7)?,
    })
}

fn row_to_equipment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Equipment> {
    Ok(Equipment {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        location: row.get(3)?,
    })
}
