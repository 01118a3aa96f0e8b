//! Project discovery - locates the `.utrace/` directory of a workspace

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the per-project data directory
pub const PROJECT_DIR: &str = ".utrace";

/// Name of the project configuration file inside [`PROJECT_DIR`]
pub const CONFIG_FILE: &str = "config.yaml";

/// Default database file inside [`PROJECT_DIR`]
pub const DATABASE_FILE: &str = "trace.db";

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error(
        "Not a utrace project (no .utrace/ found in {} or any parent). Run `utrace init` first.",
        .0.display()
    )]
    NotFound(PathBuf),

    #[error("Project already initialized at {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Config(#[from] serde_yml::Error),
}

/// A utrace project rooted at the directory holding `.utrace/`
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
}

impl Project {
    /// Find the project containing the current directory
    pub fn discover() -> Result<Self, ProjectError> {
        let cwd = std::env::current_dir()?;
        Self::discover_from(&cwd)
    }

    /// Walk up from `start` until a directory with `.utrace/` is found
    pub fn discover_from(start: &Path) -> Result<Self, ProjectError> {
        let mut current = Some(start);
        while let Some(dir) = current {
            if dir.join(PROJECT_DIR).is_dir() {
                return Ok(Self {
                    root: dir.to_path_buf(),
                });
            }
            current = dir.parent();
        }
        Err(ProjectError::NotFound(start.to_path_buf()))
    }

    /// Create `.utrace/` with a starter config under `root`
    pub fn init(root: &Path) -> Result<Self, ProjectError> {
        let data_dir = root.join(PROJECT_DIR);
        if data_dir.exists() {
            return Err(ProjectError::AlreadyExists(root.to_path_buf()));
        }
        std::fs::create_dir_all(&data_dir)?;
        std::fs::write(data_dir.join(CONFIG_FILE), STARTER_CONFIG)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(PROJECT_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir().join(CONFIG_FILE)
    }

    /// Default database location for this project
    pub fn default_database(&self) -> PathBuf {
        self.data_dir().join(DATABASE_FILE)
    }
}

const STARTER_CONFIG: &str = r#"# utrace project configuration
#
# user: alice                  # acting user (overridden by UTRACE_USER / --user)
# database: .utrace/trace.db   # relative paths resolve against the project root
# default_location: factory    # location given to newly identified units
# busy_timeout_ms: 5000        # wait for a competing writer before failing
#
# access:                      # roles allowed per operation group
#   identity: [admin, manager]
#   production: [admin, manager, operator]
#   quality: [admin, manager, inspector]
#   catalog: [admin, manager]
#   users: [admin]
"#;
