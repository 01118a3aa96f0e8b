//! `utrace init` command - Create a project and its first admin

use std::path::PathBuf;

use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::GlobalOpts;
use crate::core::{Config, Project, Tracker};

#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Directory to initialize (defaults to the current directory)
    pub path: Option<PathBuf>,

    /// Create the first admin user and make it the acting user
    #[arg(long)]
    pub admin: Option<String>,
}

pub fn run(args: InitArgs, global: &GlobalOpts) -> Result<()> {
    let root = match args.path {
        Some(path) => path,
        None => std::env::current_dir().into_diagnostic()?,
    };

    let project = Project::init(&root).map_err(|e| miette::miette!("{}", e))?;
    let config = Config::load_for(Some(&project));
    let db = global
        .db
        .clone()
        .unwrap_or_else(|| config.database_path(&project));
    let mut tracker = Tracker::open(&db, &config)?;

    println!(
        "{} Initialized utrace project at {}",
        style("✓").green(),
        style(project.root().display()).cyan()
    );
    println!("  Database: {}", db.display());

    if let Some(ref admin) = args.admin {
        let user = tracker.bootstrap_admin(admin)?;

        // Record the admin as the project's acting user
        let layer = Config {
            user: Some(user.username.clone()),
            ..Default::default()
        };
        let mut content = std::fs::read_to_string(project.config_path()).into_diagnostic()?;
        content.push('\n');
        content.push_str(&serde_yml::to_string(&layer).into_diagnostic()?);
        std::fs::write(project.config_path(), content).into_diagnostic()?;

        println!(
            "{} Created admin {} (now the acting user)",
            style("✓").green(),
            style(&user.username).yellow()
        );
    } else {
        println!(
            "  Next: {} to create the first admin",
            style("utrace user add <name> --bootstrap").cyan()
        );
    }

    Ok(())
}
