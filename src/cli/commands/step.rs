//! `utrace step` command - Production steps

use chrono::{DateTime, Utc};
use clap::{Subcommand, ValueEnum};
use console::style;
use miette::Result;

use crate::cli::helpers::{
    format_time, parse_param, parse_time, resolve_equipment_id, resolve_unit, resolve_user,
    styled_step_status, truncate_str, Session,
};
use crate::cli::output::{effective_format, field, print_structured, Listing};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::RecordKind;
use crate::entities::{NewStep, ProductionStep, StepId, StepStatus};

/// CLI-friendly step status enum
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliStepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl From<CliStepStatus> for StepStatus {
    fn from(cli: CliStepStatus) -> Self {
        match cli {
            CliStepStatus::Pending => StepStatus::Pending,
            CliStepStatus::InProgress => StepStatus::InProgress,
            CliStepStatus::Completed => StepStatus::Completed,
            CliStepStatus::Failed => StepStatus::Failed,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum StepCommands {
    /// Append a production step to a unit
    Add(AddArgs),

    /// Move an open step to in-progress, completed or failed
    Advance(AdvanceArgs),

    /// Show the production history of a unit
    List(ListArgs),

    /// Show one step
    Show(ShowArgs),
}

#[derive(clap::Args, Debug)]
pub struct AddArgs {
    /// Unit code or id
    pub unit: String,

    /// Process step name (e.g. winding)
    pub name: String,

    /// Start time, RFC 3339 (default: now)
    #[arg(long, value_parser = parse_time)]
    pub start: Option<DateTime<Utc>>,

    /// End time, RFC 3339 (only with --status completed or failed)
    #[arg(long, value_parser = parse_time)]
    pub end: Option<DateTime<Utc>>,

    #[arg(long, short = 's', value_enum, default_value = "pending")]
    pub status: CliStepStatus,

    /// Equipment code or id
    #[arg(long, short = 'e')]
    pub equipment: Option<String>,

    /// Operator username (default: the acting user)
    #[arg(long)]
    pub operator: Option<String>,

    /// Process parameter as key=value (repeatable)
    #[arg(long = "param", short = 'p', value_parser = parse_param)]
    pub params: Vec<(String, serde_json::Value)>,

    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct AdvanceArgs {
    /// Step id
    pub step: StepId,

    /// Target status
    #[arg(value_enum)]
    pub status: CliStepStatus,

    /// End time, RFC 3339 (default: now, for completed/failed)
    #[arg(long, value_parser = parse_time)]
    pub end: Option<DateTime<Utc>>,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Unit code or id
    pub unit: String,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Step id
    pub step: StepId,
}

pub fn run(cmd: StepCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        StepCommands::Add(args) => run_add(args, global),
        StepCommands::Advance(args) => run_advance(args, global),
        StepCommands::List(args) => run_list(args, global),
        StepCommands::Show(args) => run_show(args, global),
    }
}

fn run_add(args: AddArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let caller = session.caller()?;
    let tracker = &mut session.tracker;

    let unit = resolve_unit(tracker, &caller, &args.unit)?;
    let operator_id = match args.operator {
        Some(ref name) => resolve_user(tracker, &caller, name, RecordKind::Operator)?.id,
        None => caller.id,
    };

    let mut step = NewStep::new(&args.name, args.start.unwrap_or_else(Utc::now))
        .with_status(args.status.into())
        .with_operator(operator_id);
    if let Some(end) = args.end {
        step = step.with_end_time(end);
    }
    if let Some(ref equipment) = args.equipment {
        step = step.with_equipment(resolve_equipment_id(tracker, &caller, equipment)?);
    }
    for (key, value) in args.params {
        step = step.with_parameter(key, value);
    }
    if let Some(notes) = args.notes {
        step = step.with_notes(notes);
    }

    let stored = tracker.append_production_step(&caller, unit.id, &step)?;
    print_step(&stored, global.output)
}

fn run_advance(args: AdvanceArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let caller = session.caller()?;
    let stored = session.tracker.advance_production_step(
        &caller,
        args.step,
        args.status.into(),
        args.end,
    )?;
    print_step(&stored, global.output)
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let caller = session.caller()?;

    let unit = resolve_unit(&mut session.tracker, &caller, &args.unit)?;
    let steps = session.tracker.get_production_history(&caller, unit.id)?;

    let format = effective_format(global.output, true);
    if print_structured(&steps, format)? {
        return Ok(());
    }
    step_listing(&steps).print(format)
}

fn run_show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let caller = session.caller()?;
    let step = session.tracker.get_production_step(&caller, args.step)?;
    print_step(&step, global.output)
}

/// Rows for a production history
pub fn step_listing(steps: &[ProductionStep]) -> Listing {
    let mut listing = Listing::new(
        "step",
        &["ID", "STEP", "STATUS", "START", "END", "EQUIPMENT", "OPERATOR"],
    );
    for step in steps {
        listing.row(vec![
            step.id.to_string(),
            truncate_str(&step.process_step, 30),
            step.status.to_string(),
            format_time(&step.start_time),
            step.end_time.as_ref().map(format_time).unwrap_or_default(),
            step.equipment_id.map(|id| id.to_string()).unwrap_or_default(),
            step.operator_id.map(|id| id.to_string()).unwrap_or_default(),
        ]);
    }
    listing
}

fn print_step(step: &ProductionStep, format: OutputFormat) -> Result<()> {
    if print_structured(step, format)? {
        return Ok(());
    }
    match format {
        OutputFormat::Id => println!("{}", step.id),
        _ => {
            field("Step", format!("{} ({})", style(&step.process_step).cyan(), step.id));
            field("Unit", step.unit_id);
            field("Status", styled_step_status(step.status));
            field("Start", format_time(&step.start_time));
            if let Some(ref end) = step.end_time {
                field("End", format_time(end));
            }
            if let Some(id) = step.equipment_id {
                field("Equipment", id);
            }
            if let Some(id) = step.operator_id {
                field("Operator", id);
            }
            for (key, value) in &step.parameters {
                field(&format!("  {}", key), value);
            }
            if let Some(ref notes) = step.notes {
                field("Notes", notes);
            }
        }
    }
    Ok(())
}
