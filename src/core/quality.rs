//! Quality gate - records inspection decisions and gates recalls
//!
//! Decisions are append-only: `pass_status` and the check items are fixed at
//! insert time. A failed `final` check asks the catalog to recall the unit in
//! the same transaction as the insert.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::access::UserDirectory;
use super::catalog::{StatusChange, UnitCatalog};
use super::error::{RecordKind, TraceError};
use super::serialize::{format_timestamp, json_at, timestamp_at};
use crate::entities::{
    mean_score, Amendment, DecisionId, NewDecision, QualityDecision, UnitId, UnitStatus,
};

const DECISION_COLUMNS: &str = "id, unit_id, inspector_id, check_type, check_items, pass_status, \
                                comments, evidence, checked_at";

/// A stored decision and the recall it caused, if any
#[derive(Debug, Clone, Serialize)]
pub struct RecordedDecision {
    pub decision: QualityDecision,

    /// Outcome of the recall request; `None` when the decision requested none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recall: Option<StatusChange>,
}

/// Pass/fail counts and mean score for one unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualitySummary {
    pub unit_id: UnitId,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub score: Option<f64>,
}

/// Records and reads quality decisions
pub struct QualityGate<'c, C: UnitCatalog> {
    conn: &'c Connection,
    catalog: &'c C,
}

impl<'c, C: UnitCatalog> QualityGate<'c, C> {
    pub fn new(conn: &'c Connection, catalog: &'c C) -> Self {
        Self { conn, catalog }
    }

    pub fn record(
        &self,
        unit_id: UnitId,
        decision: &NewDecision,
        checked_at: DateTime<Utc>,
    ) -> Result<RecordedDecision, TraceError> {
        decision.validate().map_err(TraceError::InvalidDecision)?;

        if !self.catalog.unit_exists(self.conn, unit_id)? {
            return Err(TraceError::not_found(RecordKind::Unit, unit_id));
        }
        if !UserDirectory::new(self.conn).exists(decision.inspector_id)? {
            return Err(TraceError::not_found(
                RecordKind::Inspector,
                decision.inspector_id,
            ));
        }

        self.conn.execute(
            "INSERT INTO quality_decisions
                (unit_id, inspector_id, check_type, check_items, pass_status, comments, evidence, checked_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                unit_id,
                decision.inspector_id,
                decision.check_type,
                serde_json::to_string(&decision.check_items)?,
                decision.pass_status,
                decision.comments,
                serde_json::to_string(&decision.evidence)?,
                format_timestamp(&checked_at),
            ],
        )?;
        let id = self.conn.last_insert_rowid();

        let recall = if decision.triggers_recall() {
            Some(self.request_recall(unit_id, checked_at)?)
        } else {
            None
        };

        let decision = self
            .get_decision(id)?
            .ok_or_else(|| TraceError::not_found(RecordKind::Decision, id))?;
        Ok(RecordedDecision { decision, recall })
    }

    /// The catalog owns the lifecycle; a refused recall is reported as a no-op
    fn request_recall(
        &self,
        unit_id: UnitId,
        now: DateTime<Utc>,
    ) -> Result<StatusChange, TraceError> {
        match self
            .catalog
            .request_status_change(self.conn, unit_id, UnitStatus::Recalled, now)
        {
            Ok(change) => Ok(change),
            Err(TraceError::InvalidTransition { from, to }) => {
                tracing::warn!(unit_id, %from, %to, "catalog refused recall");
                Ok(StatusChange::NoOp)
            }
            Err(e) => Err(e),
        }
    }

    /// Edit comments or append evidence; every other field is fixed
    pub fn amend(
        &self,
        decision_id: DecisionId,
        amendment: &Amendment,
    ) -> Result<QualityDecision, TraceError> {
        let mut decision = self
            .get_decision(decision_id)?
            .ok_or_else(|| TraceError::not_found(RecordKind::Decision, decision_id))?;

        if amendment.is_empty() {
            return Ok(decision);
        }

        if let Some(ref comments) = amendment.comments {
            decision.comments = if comments.is_empty() {
                None
            } else {
                Some(comments.clone())
            };
        }
        decision
            .evidence
            .extend(amendment.add_evidence.iter().cloned());

        self.conn.execute(
            "UPDATE quality_decisions SET comments = ?1, evidence = ?2 WHERE id = ?3",
            params![
                decision.comments,
                serde_json::to_string(&decision.evidence)?,
                decision_id
            ],
        )?;

        self.get_decision(decision_id)?
            .ok_or_else(|| TraceError::not_found(RecordKind::Decision, decision_id))
    }

    /// Decisions of a unit, oldest first
    pub fn history(&self, unit_id: UnitId) -> Result<Vec<QualityDecision>, TraceError> {
        if !self.catalog.unit_exists(self.conn, unit_id)? {
            return Err(TraceError::not_found(RecordKind::Unit, unit_id));
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM quality_decisions WHERE unit_id = ?1 ORDER BY checked_at, id",
            DECISION_COLUMNS
        ))?;
        let decisions = stmt
            .query_map(params![unit_id], row_to_decision)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(decisions)
    }

    /// Mean of every scored check item across all decisions of the unit
    pub fn score(&self, unit_id: UnitId) -> Result<Option<f64>, TraceError> {
        let decisions = self.history(unit_id)?;
        Ok(mean_score(decisions.iter().flat_map(|d| d.check_items.iter())))
    }

    pub fn summary(&self, unit_id: UnitId) -> Result<QualitySummary, TraceError> {
        let decisions = self.history(unit_id)?;
        let passed = decisions.iter().filter(|d| d.pass_status).count();
        Ok(QualitySummary {
            unit_id,
            total: decisions.len(),
            passed,
            failed: decisions.len() - passed,
            score: mean_score(decisions.iter().flat_map(|d| d.check_items.iter())),
        })
    }

    pub fn get_decision(
        &self,
        decision_id: DecisionId,
    ) -> Result<Option<QualityDecision>, TraceError> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {} FROM quality_decisions WHERE id = ?1", DECISION_COLUMNS),
                params![decision_id],
                row_to_decision,
            )
            .optional()?)
    }
}

fn row_to_decision(row: &rusqlite::Row<'_>) -> rusqlite::Result<QualityDecision> {
    Ok(QualityDecision {
        id: row.get(0)?,
        unit_id: row.get(1)?,
        inspector_id: row.get(2)?,
        check_type: row.get(3)?,
        check_items: json_at(row, 4)?,
        pass_status: row.get(5)?,
        comments: row.get(6)?,
        evidence: json_at(row, 7)?,
        checked_at: timestamp_at(row, 8)?,
    })
}
