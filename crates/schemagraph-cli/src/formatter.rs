//! Output formatters for project summaries.

use clap::ValueEnum;
use comfy_table::{Cell, Table};

use crate::commands::{ProjectSummary, TreeLine};
use crate::error::Result;

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter {
    /// Format per-database totals.
    fn format_summary(&self, summary: &ProjectSummary) -> Result<String>;

    /// Format the node tree.
    fn format_tree(&self, lines: &[TreeLine]) -> Result<String>;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_summary(&self, summary: &ProjectSummary) -> Result<String> {
        let mut table = Table::new();
        table.set_header(vec![
            "Database",
            "Role",
            "State",
            "Connection",
            "Tables",
            "Columns",
            "Relationships",
            "Unpopulated",
        ]);
        for db in &summary.databases {
            table.add_row(vec![
                Cell::new(&db.name),
                Cell::new(db.role),
                Cell::new(db.state),
                Cell::new(db.connection.as_deref().unwrap_or("-")),
                Cell::new(db.tables),
                Cell::new(db.columns),
                Cell::new(db.relationships),
                Cell::new(db.unpopulated),
            ]);
        }

        Ok(format!(
            "Project: {}\n{}\n{} connection(s), {} diagram item(s)",
            summary.name, table, summary.connections, summary.diagram_items
        ))
    }

    fn format_tree(&self, lines: &[TreeLine]) -> Result<String> {
        if lines.is_empty() {
            return Ok("No databases".to_string());
        }
        let mut output = String::new();
        for line in lines {
            if !output.is_empty() {
                output.push('\n');
            }
            output.push_str(&"  ".repeat(line.depth));
            if line.link {
                output.push_str("-> ");
            }
            output.push_str(&line.kind);
            if !line.name.is_empty() {
                output.push(' ');
                output.push_str(&line.name);
            }
            if line.state != "populated" {
                output.push_str(&format!(" ({})", line.state));
            }
        }
        Ok(output)
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_summary(&self, summary: &ProjectSummary) -> Result<String> {
        Ok(serde_json::to_string_pretty(summary)?)
    }

    fn format_tree(&self, lines: &[TreeLine]) -> Result<String> {
        Ok(serde_json::to_string_pretty(lines)?)
    }
}
