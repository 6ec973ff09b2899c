//! Line-oriented text report of a query result

use std::io::{self, Write};

use crate::model::{QueryResult, Row};

/// Only line of the report when the query returned no tables
pub const NO_RESULTS: &str = "No results returned";

/// Render the report as lines, without trailing newlines
///
/// Per table: `Table: <name>`, one `Column: <name> (<type>)` line per column,
/// then one `Row: [<cell> <cell> ...]` line per row. Output depends only on
/// the input, so identical results render identically.
pub fn render_lines(result: &QueryResult) -> Vec<String> {
    if result.is_empty() {
        return vec![NO_RESULTS.to_string()];
    }

    let mut lines = Vec::new();
    for table in &result.tables {
        lines.push(format!("Table: {}", table.name));
        for column in &table.columns {
            lines.push(format!("Column: {} ({})", column.name, column.column_type));
        }
        for row in &table.rows {
            lines.push(format!("Row: {}", render_row(row)));
        }
    }
    lines
}

fn render_row(row: &Row) -> String {
    let cells: Vec<String> = row.iter().map(|cell| cell.to_string()).collect();
    format!("[{}]", cells.join(" "))
}

/// Write the report, one line per entry
pub fn write_report<W: Write>(out: &mut W, result: &QueryResult) -> io::Result<()> {
    for line in render_lines(result) {
        writeln!(out, "{}", line)?;
    }
    out.flush()
}
