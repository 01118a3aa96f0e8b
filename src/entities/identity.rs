//! Tracking identity - the scannable token issued once per unit

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{UnitId, UnitStatus, UserId};

/// Prefix of every identity token
pub const TOKEN_PREFIX: &str = "UNIT";

/// Timestamp layout embedded in tokens (UTC, microsecond precision, no offset)
const TOKEN_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Location recorded for a freshly identified unit when none is given
pub const DEFAULT_LOCATION: &str = "factory";

/// Build the identity token for a unit issued at `issued_at`
///
/// Format: `UNIT:<unit_id>:<ISO-8601 timestamp>`
pub fn issue_token(unit_id: UnitId, issued_at: DateTime<Utc>) -> String {
    format!(
        "{}:{}:{}",
        TOKEN_PREFIX,
        unit_id,
        issued_at.format(TOKEN_TIME_FORMAT)
    )
}

/// Lowercase hex SHA-256 of the token bytes
pub fn integrity_hash(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// The scannable identity of a unit
///
/// `token` and `integrity_hash` never change once issued. `location` and
/// `status` are lookup mirrors refreshed whenever the unit or its ledger moves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingIdentity {
    pub id: i64,

    pub unit_id: UnitId,

    /// Scan input, e.g. `UNIT:42:2024-01-15T10:30:00.000000`
    pub token: String,

    /// Hex SHA-256 of `token`
    pub integrity_hash: String,

    pub location: String,

    /// Mirror of the unit's lifecycle status
    pub status: UnitStatus,

    /// User that requested the identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserId>,

    pub created_at: DateTime<Utc>,

    pub last_updated: DateTime<Utc>,
}

impl TrackingIdentity {
    /// Recompute the hash from the token and compare with the stored value
    pub fn hash_matches(&self) -> bool {
        integrity_hash(&self.token) == self.integrity_hash
    }

    /// Check a hash presented by a scanner against this identity
    pub fn verify(&self, presented_hash: &str) -> bool {
        self.hash_matches() && self.integrity_hash.eq_ignore_ascii_case(presented_hash.trim())
    }
}
