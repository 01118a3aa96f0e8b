//! Production ledger - append-only, ordered log of production steps
//!
//! Recorded fields never change. An open step (`pending`/`in_progress`) may
//! be advanced, and a step that reaches `completed` or `failed` is final.
//! Storage triggers reject any write that gets past these checks.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::access::UserDirectory;
use super::catalog::UnitCatalog;
use super::error::{RecordKind, TraceError};
use super::registrar::IdentityRegistrar;
use super::serialize::{format_timestamp, json_at, optional_timestamp_at, timestamp_at};
use crate::entities::{NewStep, ProductionStep, StepId, StepStatus, UnitId};

const STEP_COLUMNS: &str = "id, unit_id, process_step, equipment_id, operator_id, start_time, \
                            end_time, parameters, notes, status";

/// Appends to and reads the production history of units
pub struct ProductionLedger<'c, C: UnitCatalog> {
    conn: &'c Connection,
    catalog: &'c C,
}

impl<'c, C: UnitCatalog> ProductionLedger<'c, C> {
    pub fn new(conn: &'c Connection, catalog: &'c C) -> Self {
        Self { conn, catalog }
    }

    /// Append a step to the unit's history
    pub fn append_step(
        &self,
        unit_id: UnitId,
        step: &NewStep,
        now: DateTime<Utc>,
    ) -> Result<ProductionStep, TraceError> {
        step.validate().map_err(TraceError::InvalidStep)?;

        if !self.catalog.unit_exists(self.conn, unit_id)? {
            return Err(TraceError::not_found(RecordKind::Unit, unit_id));
        }

        let equipment = match step.equipment_id {
            Some(id) => Some(
                self.catalog
                    .get_equipment(self.conn, id)?
                    .ok_or_else(|| TraceError::not_found(RecordKind::Equipment, id))?,
            ),
            None => None,
        };
        if let Some(operator_id) = step.operator_id {
            if !UserDirectory::new(self.conn).exists(operator_id)? {
                return Err(TraceError::not_found(RecordKind::Operator, operator_id));
            }
        }

        // A step recorded as finished gets an end time
        let end_time = match (step.status.is_final(), step.end_time) {
            (true, None) => Some(now.max(step.start_time)),
            (_, end) => end,
        };

        let parameters = serde_json::to_string(&step.parameters)?;
        self.conn.execute(
            "INSERT INTO production_steps
                (unit_id, process_step, equipment_id, operator_id, start_time, end_time, parameters, notes, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                unit_id,
                step.process_step.trim(),
                step.equipment_id,
                step.operator_id,
                format_timestamp(&step.start_time),
                end_time.as_ref().map(format_timestamp),
                parameters,
                step.notes,
                step.status,
            ],
        )?;
        let id = self.conn.last_insert_rowid();

        // The unit is now wherever the equipment is
        if let Some(location) = equipment.as_ref().and_then(|e| e.location.as_deref()) {
            IdentityRegistrar::new(self.conn, self.catalog).touch_location(unit_id, location, now)?;
        }

        self.get_step(id)?
            .ok_or_else(|| TraceError::not_found(RecordKind::Step, id))
    }

    /// Move an open step forward
    ///
    /// Moving to `completed` or `failed` sets the end time (default `now`) and
    /// finalizes the step.
    pub fn advance_step(
        &self,
        step_id: StepId,
        to: StepStatus,
        end_time: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<ProductionStep, TraceError> {
        let step = self
            .get_step(step_id)?
            .ok_or_else(|| TraceError::not_found(RecordKind::Step, step_id))?;

        if step.status.is_final() {
            tracing::warn!(step_id, status = %step.status, "refused: step is final");
            return Err(TraceError::ImmutableStep {
                step_id,
                status: step.status,
            });
        }
        if !step.status.can_advance_to(to) {
            return Err(TraceError::InvalidStep(format!(
                "cannot move step {} from {} to {}",
                step_id, step.status, to
            )));
        }

        // A recorded end time is filled once and never cleared or replaced
        let end_time = if to.is_final() {
            let end = match (step.end_time, end_time) {
                (Some(recorded), Some(given)) if given != recorded => {
                    return Err(TraceError::InvalidStep(format!(
                        "step {} already ended at {}",
                        step_id,
                        recorded.to_rfc3339()
                    )));
                }
                (Some(recorded), _) => recorded,
                (None, given) => given.unwrap_or_else(|| now.max(step.start_time)),
            };
            if end < step.start_time {
                return Err(TraceError::InvalidStep(format!(
                    "end time {} precedes start time {}",
                    end.to_rfc3339(),
                    step.start_time.to_rfc3339()
                )));
            }
            Some(end)
        } else {
            if end_time.is_some() {
                return Err(TraceError::InvalidStep(format!(
                    "end time only applies when a step is completed or failed, not {}",
                    to
                )));
            }
            step.end_time
        };

        self.conn.execute(
            "UPDATE production_steps SET status = ?1, end_time = ?2 WHERE id = ?3",
            params![to, end_time.as_ref().map(format_timestamp), step_id],
        )?;

        self.get_step(step_id)?
            .ok_or_else(|| TraceError::not_found(RecordKind::Step, step_id))
    }

    /// Steps of a unit, by start time then insertion order
    pub fn history(&self, unit_id: UnitId) -> Result<Vec<ProductionStep>, TraceError> {
        if !self.catalog.unit_exists(self.conn, unit_id)? {
            return Err(TraceError::not_found(RecordKind::Unit, unit_id));
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM production_steps WHERE unit_id = ?1 ORDER BY start_time, id",
            STEP_COLUMNS
        ))?;
        let steps = stmt
            .query_map(params![unit_id], row_to_step)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(steps)
    }

    pub fn get_step(&self, step_id: StepId) -> Result<Option<ProductionStep>, TraceError> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {} FROM production_steps WHERE id = ?1", STEP_COLUMNS),
                params![step_id],
                row_to_step,
            )
            .optional()?)
    }
}

fn row_to_step(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProductionStep> {
    Ok(ProductionStep {
        id: row.get(0)?,
        unit_id: row.get(1)?,
        process_step: row.get(2)?,
        equipment_id: row.get(3)?,
        operator_id: row.get(4)?,
        start_time: timestamp_at(row, 5)?,
        end_time: optional_timestamp_at(row, 6)?,
        parameters: json_at(row, 7)?,
        notes: row.get(8)?,
        status: row.get(9)?,
    })
}
