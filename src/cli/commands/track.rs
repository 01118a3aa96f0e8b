//! `utrace track` command - Tracking identities and scans

use clap::Subcommand;
use console::style;
use miette::Result;
use serde::Serialize;

use crate::cli::commands::{qc::decision_listing, step::step_listing};
use crate::cli::helpers::{format_time, resolve_unit, styled_unit_status, Session};
use crate::cli::output::{field, print_structured, rule};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::Trace;
use crate::entities::TrackingIdentity;

#[derive(Subcommand, Debug)]
pub enum TrackCommands {
    /// Issue the tracking identity of a unit
    Assign(AssignArgs),

    /// Resolve a scanned token to the unit's full history
    Scan(ScanArgs),

    /// Check a token and integrity hash pair
    Verify(VerifyArgs),

    /// Record where a unit is now
    Locate(LocateArgs),
}

#[derive(clap::Args, Debug)]
pub struct AssignArgs {
    /// Unit code or id
    pub unit: String,

    /// Initial location (defaults to the configured default location)
    #[arg(long, short = 'l')]
    pub location: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct ScanArgs {
    /// Identity token as scanned
    pub token: String,
}

#[derive(clap::Args, Debug)]
pub struct VerifyArgs {
    /// Identity token as scanned
    pub token: String,

    /// Integrity hash presented alongside the token
    pub hash: String,
}

#[derive(clap::Args, Debug)]
pub struct LocateArgs {
    /// Unit code or id
    pub unit: String,

    /// New location (defaults to the configured default location)
    pub location: Option<String>,
}

#[derive(Serialize)]
struct Verification<'a> {
    token: &'a str,
    valid: bool,
}

pub fn run(cmd: TrackCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        TrackCommands::Assign(args) => run_assign(args, global),
        TrackCommands::Scan(args) => run_scan(args, global),
        TrackCommands::Verify(args) => run_verify(args, global),
        TrackCommands::Locate(args) => run_locate(args, global),
    }
}

fn run_assign(args: AssignArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let caller = session.caller()?;

    let unit = resolve_unit(&mut session.tracker, &caller, &args.unit)?;
    let identity = session
        .tracker
        .assign_identity(&caller, unit.id, args.location.as_deref())?;

    print_identity(&identity, global.output)
}

fn run_locate(args: LocateArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let caller = session.caller()?;

    let unit = resolve_unit(&mut session.tracker, &caller, &args.unit)?;
    let identity = session
        .tracker
        .relocate(&caller, unit.id, args.location.as_deref())?;

    print_identity(&identity, global.output)
}

fn print_identity(identity: &TrackingIdentity, format: OutputFormat) -> Result<()> {
    if print_structured(identity, format)? {
        return Ok(());
    }
    match format {
        OutputFormat::Id => println!("{}", identity.token),
        _ => {
            field("Unit", identity.unit_id);
            field("Token", style(&identity.token).yellow());
            field("Hash", &identity.integrity_hash);
            field("Location", &identity.location);
            field("Status", styled_unit_status(identity.status));
            field("Updated", format_time(&identity.last_updated));
        }
    }
    Ok(())
}

fn run_scan(args: ScanArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let caller = session.caller()?;
    let trace = session.tracker.resolve_by_token(&caller, &args.token)?;

    if print_structured(&trace, global.output)? {
        return Ok(());
    }
    match global.output {
        OutputFormat::Id => println!("{}", trace.unit.id),
        _ => print_trace(&trace)?,
    }
    Ok(())
}

fn print_trace(trace: &Trace) -> Result<()> {
    let unit = &trace.unit;
    rule();
    field(
        "Unit",
        format!("{} ({})", style(&unit.code).cyan(), unit.name),
    );
    field("Type", format!("{} by {}", unit.unit_type, unit.manufacturer));
    field("Status", styled_unit_status(unit.status));
    field("Location", &trace.identity.location);
    field("Identified", format_time(&trace.identity.created_at));
    rule();

    println!(
        "{} ({})",
        style("Production").bold(),
        trace.production.len()
    );
    step_listing(&trace.production).print(OutputFormat::Tsv)?;
    println!();

    println!("{} ({})", style("Quality").bold(), trace.quality.len());
    decision_listing(&trace.quality).print(OutputFormat::Tsv)
}

fn run_verify(args: VerifyArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let caller = session.caller()?;
    let valid = session
        .tracker
        .verify_identity(&caller, &args.token, &args.hash)?;

    let verification = Verification {
        token: &args.token,
        valid,
    };
    if !print_structured(&verification, global.output)? {
        if valid {
            println!("{} Identity verified", style("✓").green());
        } else {
            println!("{} Identity does not verify", style("✗").red());
        }
    }

    if valid {
        Ok(())
    } else {
        Err(miette::miette!(
            help = "The token is unknown or the hash does not match the registered identity",
            "Verification failed for {}",
            args.token
        ))
    }
}
