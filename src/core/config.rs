//! Layered configuration
//!
//! Sources, later wins:
//! 1. built-in defaults
//! 2. user config (`<config dir>/utrace/config.yaml`)
//! 3. project config (`.utrace/config.yaml`)
//! 4. environment (`UTRACE_USER`, `UTRACE_DB`)
//!
//! CLI flags are applied on top by the command layer.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use super::access::AccessConfig;
use super::project::{Project, CONFIG_FILE};
use super::store::DEFAULT_BUSY_TIMEOUT;
use crate::entities::DEFAULT_LOCATION;

/// Environment variable naming the acting user
pub const ENV_USER: &str = "UTRACE_USER";

/// Environment variable overriding the database path
pub const ENV_DB: &str = "UTRACE_DB";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Acting username
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Database file; relative paths resolve against the project root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,

    /// Location recorded for freshly identified units
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_location: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub busy_timeout_ms: Option<u64>,

    /// Role gates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access: Option<AccessConfig>,
}

impl Config {
    /// Load every layer for the project containing the current directory
    ///
    /// Unreadable layers are skipped with a warning.
    pub fn load() -> Self {
        let project = Project::discover().ok();
        Self::load_for(project.as_ref())
    }

    pub fn load_for(project: Option<&Project>) -> Self {
        let mut config = Config::default();

        if let Some(dirs) = ProjectDirs::from("", "", "utrace") {
            config.merge(Self::read_layer(&dirs.config_dir().join(CONFIG_FILE)));
        }
        if let Some(project) = project {
            config.merge(Self::read_layer(&project.config_path()));
        }
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    fn read_layer(path: &Path) -> Option<Config> {
        let content = std::fs::read_to_string(path).ok()?;
        match Self::parse(&content) {
            Ok(layer) => Some(layer),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config");
                None
            }
        }
    }

    pub fn parse(content: &str) -> Result<Config, serde_yml::Error> {
        // A config file holding only comments parses as null
        if content.lines().all(|l| {
            let l = l.trim();
            l.is_empty() || l.starts_with('#')
        }) {
            return Ok(Config::default());
        }
        serde_yml::from_str(content)
    }

    /// Overlay the fields set in `layer`
    pub fn merge(&mut self, layer: Option<Config>) {
        let Some(layer) = layer else { return };
        if layer.user.is_some() {
            self.user = layer.user;
        }
        if layer.database.is_some() {
            self.database = layer.database;
        }
        if layer.default_location.is_some() {
            self.default_location = layer.default_location;
        }
        if layer.busy_timeout_ms.is_some() {
            self.busy_timeout_ms = layer.busy_timeout_ms;
        }
        if layer.access.is_some() {
            self.access = layer.access;
        }
    }

    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(user) = var(ENV_USER).filter(|s| !s.trim().is_empty()) {
            self.user = Some(user);
        }
        if let Some(db) = var(ENV_DB).filter(|s| !s.trim().is_empty()) {
            self.database = Some(PathBuf::from(db));
        }
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Database path for `project`, honoring the configured override
    pub fn database_path(&self, project: &Project) -> PathBuf {
        match self.database {
            Some(ref path) if path.is_absolute() => path.clone(),
            Some(ref path) => project.root().join(path),
            None => project.default_database(),
        }
    }

    pub fn default_location(&self) -> &str {
        self.default_location.as_deref().unwrap_or(DEFAULT_LOCATION)
    }

    pub fn busy_timeout(&self) -> Duration {
        self.busy_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_BUSY_TIMEOUT)
    }

    pub fn access(&self) -> AccessConfig {
        self.access.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Role;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.default_location(), "factory");
        assert_eq!(config.busy_timeout(), Duration::from_secs(5));
        assert_eq!(config.access(), AccessConfig::default());
        assert!(config.user().is_none());
    }

    #[test]
    fn test_comment_only_file_is_empty() {
        let config = Config::parse("# nothing here\n\n# user: bob\n").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_later_layers_win() {
        let mut config = Config::parse("user: alice\ndefault_location: plant-1\n").unwrap();
        config.merge(Some(Config::parse("user: bob\n").unwrap()));
        assert_eq!(config.user(), Some("bob"));
        assert_eq!(config.default_location(), "plant-1");

        config.merge(None);
        assert_eq!(config.user(), Some("bob"));
    }

    #[test]
    fn test_env_overrides_files() {
        let mut config = Config::parse("user: alice\n").unwrap();
        config.apply_env(|key| match key {
            ENV_USER => Some("carol".to_string()),
            ENV_DB => Some("/var/lib/utrace/trace.db".to_string()),
            _ => None,
        });
        assert_eq!(config.user(), Some("carol"));
        assert_eq!(
            config.database,
            Some(PathBuf::from("/var/lib/utrace/trace.db"))
        );
    }

    #[test]
    fn test_access_section_is_partial() {
        let config = Config::parse("access:\n  identity: [operator]\n").unwrap();
        let access = config.access();
        assert_eq!(access.identity, vec![Role::Operator]);
        assert_eq!(access.users, vec![Role::Admin]);
    }

    #[test]
    fn test_database_path_resolution() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();

        let config = Config::default();
        assert_eq!(config.database_path(&project), tmp.path().join(".utrace/trace.db"));

        let config = Config::parse("database: data/line.db\n").unwrap();
        assert_eq!(config.database_path(&project), tmp.path().join("data/line.db"));
    }

    #[test]
    fn test_project_layer_is_read() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();
        std::fs::write(project.config_path(), "default_location: dock-3\nbusy_timeout_ms: 250\n")
            .unwrap();

        let config = Config::load_for(Some(&project));
        assert_eq!(config.default_location(), "dock-3");
        assert_eq!(config.busy_timeout(), Duration::from_millis(250));
    }
}
