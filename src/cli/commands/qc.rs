//! `utrace qc` command - Quality decisions

use std::path::{Path, PathBuf};

use clap::{Subcommand, ValueEnum};
use console::style;
use miette::Result;

use crate::cli::helpers::{
    format_score, format_time, parse_check_item, resolve_unit, styled_pass, styled_unit_status,
    truncate_str, Session,
};
use crate::cli::output::{effective_format, field, print_structured, Listing};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::{RecordedDecision, StatusChange};
use crate::entities::{
    Amendment, CheckItem, CheckType, DecisionId, NewDecision, QualityDecision, UnitStatus,
};

/// CLI-friendly check type enum
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum CliCheckType {
    Incoming,
    #[default]
    InProcess,
    Final,
}

impl From<CliCheckType> for CheckType {
    fn from(cli: CliCheckType) -> Self {
        match cli {
            CliCheckType::Incoming => CheckType::Incoming,
            CliCheckType::InProcess => CheckType::InProcess,
            CliCheckType::Final => CheckType::Final,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum QcCommands {
    /// Record a pass/fail decision for a unit
    Record(RecordArgs),

    /// Replace the comments of a decision or attach more evidence
    Amend(AmendArgs),

    /// Show the quality history of a unit
    List(UnitArgs),

    /// Show pass/fail counts and the mean score of a unit
    Score(UnitArgs),
}

#[derive(clap::Args, Debug)]
#[command(group(
    clap::ArgGroup::new("outcome").required(true).args(["pass", "fail"])
))]
pub struct RecordArgs {
    /// Unit code or id
    pub unit: String,

    /// Inspection stage; a failed final check recalls the unit
    #[arg(long = "check", short = 'c', value_enum, default_value_t)]
    pub check_type: CliCheckType,

    /// The unit passed
    #[arg(long)]
    pub pass: bool,

    /// The unit failed
    #[arg(long)]
    pub fail: bool,

    /// Check item as name or name=score (repeatable)
    #[arg(long = "item", short = 'i', value_parser = parse_check_item)]
    pub items: Vec<CheckItem>,

    /// YAML file holding a list of check items
    #[arg(long = "items")]
    pub items_file: Option<PathBuf>,

    #[arg(long)]
    pub comment: Option<String>,

    /// Evidence reference such as a photo path or report id (repeatable)
    #[arg(long, short = 'e')]
    pub evidence: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct AmendArgs {
    /// Decision id
    pub decision: DecisionId,

    /// Replacement comments; an empty string clears them
    #[arg(long)]
    pub comment: Option<String>,

    /// Evidence reference to attach (repeatable)
    #[arg(long, short = 'e')]
    pub evidence: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct UnitArgs {
    /// Unit code or id
    pub unit: String,
}

pub fn run(cmd: QcCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        QcCommands::Record(args) => run_record(args, global),
        QcCommands::Amend(args) => run_amend(args, global),
        QcCommands::List(args) => run_list(args, global),
        QcCommands::Score(args) => run_score(args, global),
    }
}

fn read_items_file(path: &Path) -> Result<Vec<CheckItem>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| miette::miette!("Failed to read {}: {}", path.display(), e))?;
    serde_yml::from_str(&content)
        .map_err(|e| miette::miette!("Invalid check items in {}: {}", path.display(), e))
}

fn run_record(args: RecordArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let caller = session.caller()?;

    let unit = resolve_unit(&mut session.tracker, &caller, &args.unit)?;

    let mut items = match args.items_file {
        Some(ref path) => read_items_file(path)?,
        None => Vec::new(),
    };
    items.extend(args.items);

    let mut decision = NewDecision::new(caller.id, args.check_type.into(), args.pass);
    for item in items {
        decision = decision.with_item(item);
    }
    if let Some(comment) = args.comment {
        decision = decision.with_comments(comment);
    }
    for reference in args.evidence {
        decision = decision.with_evidence(reference);
    }

    let recorded = session
        .tracker
        .record_quality_decision(&caller, unit.id, &decision)?;

    if print_structured(&recorded, global.output)? {
        return Ok(());
    }
    match global.output {
        OutputFormat::Id => println!("{}", recorded.decision.id),
        _ => print_recorded(&recorded, &unit.code),
    }
    Ok(())
}

fn print_recorded(recorded: &RecordedDecision, code: &str) {
    let decision = &recorded.decision;
    println!(
        "{} Recorded {} {} check for {} (decision {})",
        style("✓").green(),
        styled_pass(decision.pass_status),
        decision.check_type,
        style(code).cyan(),
        decision.id
    );
    match recorded.recall {
        Some(StatusChange::Accepted) => println!(
            "  {} unit is now {}",
            style("!").red().bold(),
            styled_unit_status(UnitStatus::Recalled)
        ),
        Some(StatusChange::NoOp) => println!("  {}", style("unit was already recalled").dim()),
        None => {}
    }
}

fn run_amend(args: AmendArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let caller = session.caller()?;

    let amendment = Amendment {
        comments: args.comment,
        add_evidence: args.evidence,
    };
    let decision = session
        .tracker
        .amend_quality_decision(&caller, args.decision, &amendment)?;

    if print_structured(&decision, global.output)? {
        return Ok(());
    }
    match global.output {
        OutputFormat::Id => println!("{}", decision.id),
        _ => print_decision(&decision),
    }
    Ok(())
}

fn run_list(args: UnitArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let caller = session.caller()?;

    let unit = resolve_unit(&mut session.tracker, &caller, &args.unit)?;
    let decisions = session.tracker.get_quality_history(&caller, unit.id)?;

    let format = effective_format(global.output, true);
    if print_structured(&decisions, format)? {
        return Ok(());
    }
    decision_listing(&decisions).print(format)
}

fn run_score(args: UnitArgs, global: &GlobalOpts) -> Result<()> {
    let mut session = Session::open(global)?;
    let caller = session.caller()?;

    let unit = resolve_unit(&mut session.tracker, &caller, &args.unit)?;
    let summary = session.tracker.get_quality_summary(&caller, unit.id)?;

    if print_structured(&summary, global.output)? {
        return Ok(());
    }
    match global.output {
        OutputFormat::Id => println!("{}", format_score(summary.score)),
        _ => {
            field("Unit", style(&unit.code).cyan());
            field("Decisions", summary.total);
            field("Passed", style(summary.passed).green());
            field("Failed", style(summary.failed).red());
            field("Score", format_score(summary.score));
        }
    }
    Ok(())
}

/// Rows for a quality history
pub fn decision_listing(decisions: &[QualityDecision]) -> Listing {
    let mut listing = Listing::new(
        "decision",
        &["ID", "CHECK", "RESULT", "ITEMS", "INSPECTOR", "CHECKED", "COMMENTS"],
    );
    for decision in decisions {
        listing.row(vec![
            decision.id.to_string(),
            decision.check_type.to_string(),
            if decision.pass_status { "pass" } else { "fail" }.to_string(),
            decision.check_items.len().to_string(),
            decision.inspector_id.to_string(),
            format_time(&decision.checked_at),
            truncate_str(decision.comments.as_deref().unwrap_or(""), 40),
        ]);
    }
    listing
}

fn print_decision(decision: &QualityDecision) {
    field("Decision", decision.id);
    field("Unit", decision.unit_id);
    field("Check", decision.check_type);
    field("Result", styled_pass(decision.pass_status));
    field("Inspector", decision.inspector_id);
    field("Checked", format_time(&decision.checked_at));
    for item in &decision.check_items {
        let score = item.score.map(|s| format!(" ({:.3})", s)).unwrap_or_default();
        field(&format!("  {}", item.name), format!("{}{}", item.result.as_deref().unwrap_or("-"), score));
    }
    if let Some(ref comments) = decision.comments {
        field("Comments", comments);
    }
    for reference in &decision.evidence {
        field("Evidence", reference);
    }
}
