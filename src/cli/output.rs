//! Output formatting utilities

use console::style;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::cli::helpers::truncate_str;
use crate::cli::OutputFormat;

/// Widest a TSV column grows before values are truncated
const MAX_COLUMN_WIDTH: usize = 40;

/// Determine the effective output format based on context
pub fn effective_format(format: OutputFormat, is_list: bool) -> OutputFormat {
    match format {
        OutputFormat::Auto => {
            if is_list {
                OutputFormat::Tsv
            } else {
                OutputFormat::Auto
            }
        }
        other => other,
    }
}

/// Print `value` as JSON or YAML; returns false for the other formats
pub fn print_structured<T: Serialize + ?Sized>(value: &T, format: OutputFormat) -> Result<bool> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value).into_diagnostic()?;
            println!("{}", json);
            Ok(true)
        }
        OutputFormat::Yaml => {
            let yaml = serde_yml::to_string(value).into_diagnostic()?;
            print!("{}", yaml);
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// One `Label: value` line of a pretty record
pub fn field(label: &str, value: impl std::fmt::Display) {
    println!("{}: {}", style(label).bold(), value);
}

pub fn rule() {
    println!("{}", style("─".repeat(60)).dim());
}

/// Rows of a list output; the first column is the record id
pub struct Listing {
    noun: &'static str,
    headers: Vec<&'static str>,
    rows: Vec<Vec<String>>,
}

impl Listing {
    pub fn new(noun: &'static str, headers: &[&'static str]) -> Self {
        Self {
            noun,
            headers: headers.to_vec(),
            rows: Vec::new(),
        }
    }

    pub fn row(&mut self, cells: Vec<String>) {
        self.rows.push(cells);
    }

    pub fn print(&self, format: OutputFormat) -> Result<()> {
        if self.rows.is_empty() && matches!(format, OutputFormat::Tsv | OutputFormat::Table) {
            println!("No {}s found.", self.noun);
            return Ok(());
        }

        match format {
            OutputFormat::Csv => {
                let mut writer = csv::Writer::from_writer(std::io::stdout());
                writer.write_record(&self.headers).into_diagnostic()?;
                for row in &self.rows {
                    writer.write_record(row).into_diagnostic()?;
                }
                writer.flush().into_diagnostic()?;
            }
            OutputFormat::Table => {
                let mut data: Vec<Vec<String>> = vec![self.headers.iter().map(|h| h.to_string()).collect()];
                data.extend(self.rows.iter().cloned());
                let mut table = Builder::from(data).build();
                table.with(Style::rounded());
                println!("{}", table);
            }
            OutputFormat::Id => {
                for row in &self.rows {
                    if let Some(id) = row.first() {
                        println!("{}", id);
                    }
                }
            }
            _ => self.print_tsv(),
        }
        Ok(())
    }

    fn print_tsv(&self) {
        let widths: Vec<usize> = self
            .headers
            .iter()
            .enumerate()
            .map(|(i, h)| {
                self.rows
                    .iter()
                    .filter_map(|r| r.get(i))
                    .map(|c| c.chars().count())
                    .chain(std::iter::once(h.len()))
                    .max()
                    .unwrap_or(0)
                    .min(MAX_COLUMN_WIDTH)
            })
            .collect();

        let header: Vec<String> = self
            .headers
            .iter()
            .zip(&widths)
            .map(|(h, w)| format!("{:<width$}", style(h).bold(), width = *w))
            .collect();
        println!("{}", header.join("\t").trim_end());

        for row in &self.rows {
            let cells: Vec<String> = row
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!("{:<width$}", truncate_str(c, *w), width = *w))
                .collect();
            println!("{}", cells.join("\t").trim_end());
        }

        println!();
        println!("{} {}(s) found.", style(self.rows.len()).cyan(), self.noun);
    }
}
