//! `utrace equip` command - Production equipment

use clap::Subcommand;
use console::style;
use miette::Result;

use crate::cli::helpers::Session;
use crate::cli::output::{field, print_structured};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::entities::{Equipment, NewEquipment};

#[derive(Subcommand, Debug)]
pub enum EquipCommands {
    /// Register equipment
    New(NewArgs),

    /// Show equipment by code
    Show(ShowArgs),
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Unique equipment code
    pub code: String,

    #[arg(long, short = 'n')]
    pub name: String,

    /// Where the equipment stands; units worked on it move there
    #[arg(long, short = 'l')]
    pub location: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    pub code: String,
}

pub fn run(cmd: EquipCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        EquipCommands::New(args) => run_new(args, global),
        EquipCommands::Show(args) => run_show(args, global),
    }
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let caller = session.caller()?;

    let mut equipment = NewEquipment::new(&args.code, &args.name);
    if let Some(location) = args.location {
        equipment = equipment.at(location);
    }
    let created = session.tracker.register_equipment(&caller, &equipment)?;

    if print_structured(&created, global.output)? {
        return Ok(());
    }
    match global.output {
        OutputFormat::Id => println!("{}", created.id),
        _ => println!(
            "{} Registered equipment {} (id {})",
            style("✓").green(),
            style(&created.code).cyan(),
            created.id
        ),
    }
    Ok(())
}

fn run_show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let caller = session.caller()?;
    let equipment = session.tracker.find_equipment_by_code(&caller, &args.code)?;

    if print_structured(&equipment, global.output)? {
        return Ok(());
    }
    match global.output {
        OutputFormat::Id => println!("{}", equipment.id),
        _ => print_pretty(&equipment),
    }
    Ok(())
}

fn print_pretty(equipment: &Equipment) {
    field("ID", equipment.id);
    field("Code", style(&equipment.code).cyan());
    field("Name", &equipment.name);
    field("Location", equipment.location.as_deref().unwrap_or("-"));
}
