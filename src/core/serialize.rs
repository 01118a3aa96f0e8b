//! SQLite serialization for typed enums and timestamps
//!
//! Implements ToSql and FromSql for UnitStatus, StepStatus, CheckType and Role
//! so rows map straight onto entity types.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

use crate::entities::{CheckType, Role, StepStatus, UnitStatus};

/// Storage layout for timestamps: fixed width, so text order is time order
const STORED_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Render a timestamp for storage
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(STORED_TIME_FORMAT).to_string()
}

/// Parse a stored timestamp column
pub fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

/// Read a timestamp column from a row
pub fn timestamp_at(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(idx, &raw)
}

/// Read a nullable timestamp column from a row
pub fn optional_timestamp_at(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| parse_timestamp(idx, &s)).transpose()
}

/// Read a JSON text column into a typed value
pub fn json_at<T: serde::de::DeserializeOwned>(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_text<T: FromStr<Err = String>>(value: ValueRef<'_>) -> FromSqlResult<T> {
    let s = value.as_str()?;
    s.parse().map_err(|e: String| {
        FromSqlError::Other(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            e,
        )))
    })
}

// =========================================================================
// UnitStatus - ToSql/FromSql
// =========================================================================

impl ToSql for UnitStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for UnitStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        parse_text(value)
    }
}

// =========================================================================
// StepStatus - ToSql/FromSql
// =========================================================================

impl ToSql for StepStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for StepStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        parse_text(value)
    }
}

// =========================================================================
// CheckType - ToSql/FromSql
// =========================================================================

impl ToSql for CheckType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for CheckType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        parse_text(value)
    }
}

// =========================================================================
// Role - ToSql/FromSql
// =========================================================================

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        parse_text(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rusqlite::Connection;

    #[test]
    fn test_unit_status_column() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE test (status TEXT)", []).unwrap();

        for status in [
            UnitStatus::Produced,
            UnitStatus::Shipped,
            UnitStatus::Sold,
            UnitStatus::Recalled,
        ] {
            conn.execute("DELETE FROM test", []).unwrap();
            conn.execute("INSERT INTO test VALUES (?1)", [&status])
                .unwrap();

            let retrieved: UnitStatus = conn
                .query_row("SELECT status FROM test", [], |row| row.get(0))
                .unwrap();

            assert_eq!(status, retrieved);
        }
    }

    #[test]
    fn test_unknown_text_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        let result: rusqlite::Result<StepStatus> =
            conn.query_row("SELECT 'paused'", [], |row| row.get(0));
        assert!(result.is_err());
    }

    #[test]
    fn test_timestamp_text_order_is_time_order() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let b = a + chrono::Duration::microseconds(500_000);
        let c = a + chrono::Duration::seconds(1);

        let (fa, fb, fc) = (format_timestamp(&a), format_timestamp(&b), format_timestamp(&c));
        assert!(fa < fb && fb < fc);
        assert_eq!(fa, "2024-01-01T09:00:00.000000Z");
        assert_eq!(parse_timestamp(0, &fb).unwrap(), b);
    }
}
