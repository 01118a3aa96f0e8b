//! `utrace user` command - Users and roles

use clap::{Subcommand, ValueEnum};
use console::style;
use miette::Result;

use crate::cli::helpers::{format_time, Session};
use crate::cli::output::{effective_format, field, print_structured, Listing};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::entities::Role;

/// CLI-friendly role enum
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliRole {
    Admin,
    Manager,
    Inspector,
    Operator,
}

impl From<CliRole> for Role {
    fn from(cli: CliRole) -> Self {
        match cli {
            CliRole::Admin => Role::Admin,
            CliRole::Manager => Role::Manager,
            CliRole::Inspector => Role::Inspector,
            CliRole::Operator => Role::Operator,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum UserCommands {
    /// Add a user
    Add(AddArgs),

    /// List users
    List,

    /// Show the acting user
    Whoami,
}

#[derive(clap::Args, Debug)]
pub struct AddArgs {
    /// Username
    pub username: String,

    /// Role granted to the user
    #[arg(long, short = 'r', value_enum, default_value = "operator")]
    pub role: CliRole,

    /// Create the first admin of an empty project (no acting user needed)
    #[arg(long, conflicts_with = "role")]
    pub bootstrap: bool,
}

pub fn run(cmd: UserCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        UserCommands::Add(args) => run_add(args, global),
        UserCommands::List => run_list(global),
        UserCommands::Whoami => run_whoami(global),
    }
}

fn run_add(args: AddArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;

    let user = if args.bootstrap {
        session.tracker.bootstrap_admin(&args.username)?
    } else {
        let caller = session.caller()?;
        session
            .tracker
            .add_user(&caller, &args.username, args.role.into())?
    };

    if print_structured(&user, global.output)? {
        return Ok(());
    }
    match global.output {
        OutputFormat::Id => println!("{}", user.id),
        _ => println!(
            "{} Added user {} ({})",
            style("✓").green(),
            style(&user.username).yellow(),
            user.role
        ),
    }
    Ok(())
}

fn run_list(global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let caller = session.caller()?;
    let users = session.tracker.list_users(&caller)?;

    let format = effective_format(global.output, true);
    if print_structured(&users, format)? {
        return Ok(());
    }

    let mut listing = Listing::new("user", &["ID", "USERNAME", "ROLE", "CREATED"]);
    for user in &users {
        listing.row(vec![
            user.id.to_string(),
            user.username.clone(),
            user.role.to_string(),
            format_time(&user.created_at),
        ]);
    }
    listing.print(format)
}

fn run_whoami(global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let caller = session.caller()?;

    if print_structured(&caller, global.output)? {
        return Ok(());
    }
    match global.output {
        OutputFormat::Id => println!("{}", caller.id),
        _ => {
            field("User", style(&caller.username).yellow());
            field("Role", caller.role);
        }
    }
    Ok(())
}
