//! Shared helper functions for CLI commands
//!
//! Session setup, record lookups by user-facing reference, and parsers for
//! argument values used by several command modules.

use chrono::{DateTime, Utc};
use console::{style, StyledObject};
use miette::Result;

use crate::cli::GlobalOpts;
use crate::core::{Caller, Config, Project, RecordKind, TraceError, Tracker};
use crate::entities::{CheckItem, EquipmentId, StepStatus, Unit, UnitId, UnitStatus, User};

/// An opened store plus the configuration it was opened with
pub struct Session {
    pub config: Config,
    pub tracker: Tracker,
}

impl Session {
    /// Discover the project, layer the configuration and open the store
    ///
    /// `--db` works outside a project; otherwise a `.utrace/` is required.
    pub fn open(global: &GlobalOpts) -> Result<Self> {
        let project = match Project::discover() {
            Ok(project) => Some(project),
            Err(_) if global.db.is_some() => None,
            Err(e) => return Err(miette::miette!("{}", e)),
        };
        let mut config = Config::load_for(project.as_ref());
        if let Some(ref user) = global.user {
            config.user = Some(user.clone());
        }

        let db = match (&global.db, &project) {
            (Some(db), _) => db.clone(),
            (None, Some(project)) => config.database_path(project),
            (None, None) => return Err(miette::miette!("No utrace project found")),
        };

        let tracker = Tracker::open(&db, &config)?;
        Ok(Self { config, tracker })
    }

    /// The acting user, authenticated against the user directory
    pub fn caller(&mut self) -> Result<Caller> {
        let username = self
            .config
            .user()
            .map(str::to_string)
            .ok_or_else(|| {
                miette::miette!(
                    help = "Pass --user, set UTRACE_USER, or add `user:` to .utrace/config.yaml",
                    "No acting user configured"
                )
            })?;
        Ok(self.tracker.authenticate(&username)?)
    }
}

/// Find a unit by code, falling back to its numeric id
pub fn resolve_unit(tracker: &mut Tracker, caller: &Caller, reference: &str) -> Result<Unit, TraceError> {
    match tracker.find_unit_by_code(caller, reference) {
        Err(TraceError::NotFound { .. }) => match reference.parse::<UnitId>() {
            Ok(id) => tracker.get_unit(caller, id),
            Err(_) => Err(TraceError::not_found(RecordKind::Unit, reference)),
        },
        other => other,
    }
}

/// Find equipment by code, falling back to its numeric id
pub fn resolve_equipment_id(
    tracker: &mut Tracker,
    caller: &Caller,
    reference: &str,
) -> Result<EquipmentId, TraceError> {
    match tracker.find_equipment_by_code(caller, reference) {
        Ok(equipment) => Ok(equipment.id),
        Err(TraceError::NotFound { .. }) => reference
            .parse()
            .map_err(|_| TraceError::not_found(RecordKind::Equipment, reference)),
        Err(e) => Err(e),
    }
}

/// Find a user by name, reporting absence as `kind`
pub fn resolve_user(
    tracker: &mut Tracker,
    caller: &Caller,
    username: &str,
    kind: RecordKind,
) -> Result<User, TraceError> {
    tracker.find_user(caller, username).map_err(|e| match e {
        TraceError::NotFound { key, .. } => TraceError::NotFound { kind, key },
        other => other,
    })
}

/// Parse an RFC 3339 timestamp, or `now`
pub fn parse_time(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    if s.eq_ignore_ascii_case("now") {
        return Ok(Utc::now());
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp '{}': {} (expected RFC 3339, e.g. 2024-03-01T08:00:00Z)", s, e))
}

/// Parse `key=value`; the value is read as JSON when it parses, else as text
pub fn parse_param(s: &str) -> std::result::Result<(String, serde_json::Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in '{}'", s));
    }
    let value = serde_json::from_str(value.trim())
        .unwrap_or_else(|_| serde_json::Value::String(value.trim().to_string()));
    Ok((key.to_string(), value))
}

/// Parse a check item: `name` or `name=score`
pub fn parse_check_item(s: &str) -> std::result::Result<CheckItem, String> {
    match s.split_once('=') {
        None => Ok(CheckItem::new(s.trim())),
        Some((name, score)) => {
            let score: f64 = score
                .trim()
                .parse()
                .map_err(|_| format!("invalid score '{}' for '{}'", score.trim(), name.trim()))?;
            Ok(CheckItem::scored(name.trim(), score))
        }
    }
}

/// Truncate a string to max_len characters, adding "..." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

pub fn format_time(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn format_score(score: Option<f64>) -> String {
    match score {
        Some(s) => format!("{:.3}", s),
        None => "n/a".to_string(),
    }
}

pub fn styled_unit_status(status: UnitStatus) -> StyledObject<String> {
    let s = status.to_string();
    match status {
        UnitStatus::Produced => style(s).green(),
        UnitStatus::Shipped => style(s).cyan(),
        UnitStatus::Sold => style(s).blue(),
        UnitStatus::Recalled => style(s).red().bold(),
    }
}

pub fn styled_step_status(status: StepStatus) -> StyledObject<String> {
    let s = status.to_string();
    match status {
        StepStatus::Pending => style(s).dim(),
        StepStatus::InProgress => style(s).yellow(),
        StepStatus::Completed => style(s).green(),
        StepStatus::Failed => style(s).red(),
    }
}

pub fn styled_pass(pass: bool) -> StyledObject<&'static str> {
    if pass {
        style("PASS").green().bold()
    } else {
        style("FAIL").red().bold()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello world", 8), "hello...");
        assert_eq!(truncate_str("hi", 2), "hi");
        assert_eq!(truncate_str("ümlaut-heavy", 6), "üml...");
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("torque=12.5").unwrap(),
            ("torque".to_string(), serde_json::json!(12.5))
        );
        assert_eq!(
            parse_param("batch = B-7").unwrap(),
            ("batch".to_string(), serde_json::json!("B-7"))
        );
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=3").is_err());
    }

    #[test]
    fn test_parse_check_item() {
        let unscored = parse_check_item("visual").unwrap();
        assert_eq!(unscored.name, "visual");
        assert_eq!(unscored.score, None);

        let scored = parse_check_item("torque=0.9").unwrap();
        assert_eq!(scored.score, Some(0.9));

        assert!(parse_check_item("torque=high").is_err());
    }

    #[test]
    fn test_parse_time() {
        let t = parse_time("2024-03-01T08:00:00+01:00").unwrap();
        assert_eq!(format_time(&t), "2024-03-01 07:00:00");
        assert!(parse_time("yesterday").is_err());
    }

    #[test]
    fn test_format_score() {
        insta::assert_snapshot!(format_score(Some(0.5)), @"0.500");
        insta::assert_snapshot!(format_score(None), @"n/a");
    }
}
