//! Signal extraction: count rows whose message cell contains a pattern

use std::fmt;
use std::str::FromStr;

use crate::model::{QueryResult, Table};

/// Which cell of a row holds the text to match
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSelector {
    Index(usize),
    /// Resolved per table; tables without the column never match
    Name(String),
}

impl ColumnSelector {
    fn resolve(&self, table: &Table) -> Option<usize> {
        match self {
            Self::Index(i) => Some(*i),
            Self::Name(name) => table.column_index(name),
        }
    }
}

impl FromStr for ColumnSelector {
    type Err = String;

    /// A number selects by position, anything else by column name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("signal column cannot be empty".to_string());
        }
        Ok(match s.parse::<usize>() {
            Ok(i) => Self::Index(i),
            Err(_) => Self::Name(s.to_string()),
        })
    }
}

impl fmt::Display for ColumnSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "#{}", i),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// Column plus substring that make a row count as a signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalRule {
    pub column: ColumnSelector,
    pub pattern: String,
}

impl Default for SignalRule {
    /// Second column, literal `404`
    fn default() -> Self {
        Self {
            column: ColumnSelector::Index(1),
            pattern: "404".to_string(),
        }
    }
}

impl SignalRule {
    pub fn new(column: ColumnSelector, pattern: impl Into<String>) -> Self {
        Self {
            column,
            pattern: pattern.into(),
        }
    }

    /// Number of rows, across all tables, whose selected cell is text
    /// containing the pattern
    ///
    /// Short rows and non-text cells are skipped, never errors.
    pub fn count_matches(&self, result: &QueryResult) -> u64 {
        result
            .tables
            .iter()
            .map(|table| self.count_in_table(table))
            .sum()
    }

    fn count_in_table(&self, table: &Table) -> u64 {
        let Some(index) = self.column.resolve(table) else {
            return 0;
        };
        table
            .rows
            .iter()
            .filter_map(|row| row.get(index))
            .filter_map(|cell| cell.as_text())
            .filter(|text| text.contains(self.pattern.as_str()))
            .count() as u64
    }
}
