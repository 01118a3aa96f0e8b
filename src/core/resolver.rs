//! Traceability resolver - rebuilds a unit's full history from a scanned token

use rusqlite::Connection;
use serde::Serialize;

use super::catalog::UnitCatalog;
use super::error::{RecordKind, TraceError};
use super::ledger::ProductionLedger;
use super::quality::QualityGate;
use super::registrar::IdentityRegistrar;
use crate::entities::{ProductionStep, QualityDecision, TrackingIdentity, Unit};

/// Everything recorded about one unit
#[derive(Debug, Clone, Serialize)]
pub struct Trace {
    pub unit: Unit,
    pub identity: TrackingIdentity,
    pub production: Vec<ProductionStep>,
    pub quality: Vec<QualityDecision>,
}

/// Read-only view combining the registrar, ledger and quality gate
///
/// Run it on a read transaction so the three lookups share one snapshot.
pub struct TraceabilityResolver<'c, C: UnitCatalog> {
    conn: &'c Connection,
    catalog: &'c C,
}

impl<'c, C: UnitCatalog> TraceabilityResolver<'c, C> {
    pub fn new(conn: &'c Connection, catalog: &'c C) -> Self {
        Self { conn, catalog }
    }

    pub fn resolve_by_token(&self, token: &str) -> Result<Trace, TraceError> {
        let identity = IdentityRegistrar::new(self.conn, self.catalog).lookup(token.trim())?;
        let unit_id = identity.unit_id;

        let unit = self
            .catalog
            .get_unit(self.conn, unit_id)?
            .ok_or_else(|| TraceError::not_found(RecordKind::Unit, unit_id))?;
        let production = ProductionLedger::new(self.conn, self.catalog).history(unit_id)?;
        let quality = QualityGate::new(self.conn, self.catalog).history(unit_id)?;

        Ok(Trace {
            unit,
            identity,
            production,
            quality,
        })
    }
}
