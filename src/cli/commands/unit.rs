//! `utrace unit` command - Unit catalog

use clap::{Subcommand, ValueEnum};
use console::style;
use miette::Result;
use serde::Serialize;

use crate::cli::helpers::{
    format_score, format_time, resolve_unit, styled_unit_status, truncate_str, Session,
};
use crate::cli::output::{effective_format, field, print_structured, rule, Listing};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::{QualitySummary, StatusChange, StatusUpdate, UnitFilter};
use crate::entities::{NewUnit, TrackingIdentity, Unit, UnitStatus};

/// CLI-friendly unit status enum
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliUnitStatus {
    Produced,
    Shipped,
    Sold,
    Recalled,
}

impl From<CliUnitStatus> for UnitStatus {
    fn from(cli: CliUnitStatus) -> Self {
        match cli {
            CliUnitStatus::Produced => UnitStatus::Produced,
            CliUnitStatus::Shipped => UnitStatus::Shipped,
            CliUnitStatus::Sold => UnitStatus::Sold,
            CliUnitStatus::Recalled => UnitStatus::Recalled,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum UnitCommands {
    /// Register a new unit
    New(NewArgs),

    /// Show a unit with its identity and quality summary
    Show(RefArgs),

    /// List units with filtering
    List(ListArgs),

    /// Mark a unit as shipped
    Ship(RefArgs),

    /// Mark a shipped unit as sold
    Sell(RefArgs),
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Unique unit code (serial number)
    pub code: String,

    /// Display name
    #[arg(long, short = 'n')]
    pub name: String,

    /// Unit type (e.g. motor, battery)
    #[arg(long = "type", short = 't')]
    pub unit_type: String,

    #[arg(long, short = 'm')]
    pub manufacturer: String,

    /// Assign the tracking identity right away
    #[arg(long)]
    pub identify: bool,

    /// Location for the identity (with --identify)
    #[arg(long, requires = "identify")]
    pub location: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct RefArgs {
    /// Unit code or id
    pub unit: String,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Filter by lifecycle status
    #[arg(long, short = 's', value_enum)]
    pub status: Option<CliUnitStatus>,

    /// Filter by unit type
    #[arg(long = "type", short = 't')]
    pub unit_type: Option<String>,

    /// Search in code and name
    #[arg(long)]
    pub search: Option<String>,

    /// Limit number of results
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,

    /// Show count only
    #[arg(long)]
    pub count: bool,
}

/// Unit with its identity, for show output
#[derive(Serialize)]
struct UnitDetail {
    unit: Unit,
    #[serde(skip_serializing_if = "Option::is_none")]
    identity: Option<TrackingIdentity>,
    quality: QualitySummary,
}

pub fn run(cmd: UnitCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        UnitCommands::New(args) => run_new(args, global),
        UnitCommands::Show(args) => run_show(args, global),
        UnitCommands::List(args) => run_list(args, global),
        UnitCommands::Ship(args) => run_status(args, UnitStatus::Shipped, global),
        UnitCommands::Sell(args) => run_status(args, UnitStatus::Sold, global),
    }
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let caller = session.caller()?;

    let unit = session.tracker.register_unit(
        &caller,
        &NewUnit::new(&args.code, &args.name, &args.unit_type, &args.manufacturer),
    )?;
    let identity = if args.identify {
        Some(
            session
                .tracker
                .assign_identity(&caller, unit.id, args.location.as_deref())?,
        )
    } else {
        None
    };

    match global.output {
        OutputFormat::Json | OutputFormat::Yaml => {
            let quality = session.tracker.get_quality_summary(&caller, unit.id)?;
            print_structured(
                &UnitDetail {
                    unit,
                    identity,
                    quality,
                },
                global.output,
            )?;
        }
        OutputFormat::Id => println!("{}", unit.id),
        _ => {
            println!(
                "{} Registered unit {} (id {})",
                style("✓").green(),
                style(&unit.code).cyan(),
                unit.id
            );
            if let Some(identity) = identity {
                println!("  Token: {}", style(&identity.token).yellow());
                println!("  Hash:  {}", identity.integrity_hash);
            }
        }
    }
    Ok(())
}

fn run_show(args: RefArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let caller = session.caller()?;

    let unit = resolve_unit(&mut session.tracker, &caller, &args.unit)?;
    let identity = session.tracker.identity_for_unit(&caller, unit.id)?;
    let quality = session.tracker.get_quality_summary(&caller, unit.id)?;

    let detail = UnitDetail {
        unit,
        identity,
        quality,
    };
    if print_structured(&detail, global.output)? {
        return Ok(());
    }
    if global.output == OutputFormat::Id {
        println!("{}", detail.unit.id);
        return Ok(());
    }

    let unit = &detail.unit;
    rule();
    field("ID", unit.id);
    field("Code", style(&unit.code).cyan());
    field("Name", style(&unit.name).yellow());
    field("Type", &unit.unit_type);
    field("Manufacturer", &unit.manufacturer);
    field("Status", styled_unit_status(unit.status));
    field("Created", format_time(&unit.created_at));
    rule();
    match detail.identity {
        Some(ref identity) => {
            field("Token", style(&identity.token).yellow());
            field("Hash", &identity.integrity_hash);
            field("Location", &identity.location);
        }
        None => println!("{}", style("No tracking identity assigned").dim()),
    }
    rule();
    field(
        "Quality",
        format!(
            "{} decision(s), {} passed, {} failed, score {}",
            detail.quality.total,
            detail.quality.passed,
            detail.quality.failed,
            format_score(detail.quality.score)
        ),
    );
    Ok(())
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let caller = session.caller()?;

    let filter = UnitFilter {
        status: args.status.map(Into::into),
        unit_type: args.unit_type,
        search: args.search,
        limit: args.limit,
    };
    let units = session.tracker.list_units(&caller, &filter)?;

    if args.count {
        println!("{}", units.len());
        return Ok(());
    }

    let format = effective_format(global.output, true);
    if print_structured(&units, format)? {
        return Ok(());
    }

    let mut listing = Listing::new("unit", &["ID", "CODE", "NAME", "TYPE", "MANUFACTURER", "STATUS"]);
    for unit in &units {
        listing.row(vec![
            unit.id.to_string(),
            unit.code.clone(),
            truncate_str(&unit.name, 30),
            unit.unit_type.clone(),
            truncate_str(&unit.manufacturer, 20),
            unit.status.to_string(),
        ]);
    }
    listing.print(format)
}

fn run_status(args: RefArgs, to: UnitStatus, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let caller = session.caller()?;

    let unit = resolve_unit(&mut session.tracker, &caller, &args.unit)?;
    let update: StatusUpdate = match to {
        UnitStatus::Sold => session.tracker.sell_unit(&caller, unit.id)?,
        _ => session.tracker.ship_unit(&caller, unit.id)?,
    };

    if print_structured(&update, global.output)? {
        return Ok(());
    }
    match (global.output, update.change) {
        (OutputFormat::Id, _) => println!("{}", update.unit.id),
        (_, StatusChange::Accepted) => println!(
            "{} {} is now {}",
            style("✓").green(),
            style(&update.unit.code).cyan(),
            styled_unit_status(update.unit.status)
        ),
        (_, StatusChange::NoOp) => println!(
            "{} {} stays {}",
            style("-").dim(),
            style(&update.unit.code).cyan(),
            styled_unit_status(update.unit.status)
        ),
    }
    Ok(())
}
