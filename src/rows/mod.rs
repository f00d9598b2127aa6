//! Typed row/cell model for feed payloads.
//!
//! Feed bodies arrive as CSV (or a JSON array-of-arrays envelope) and are
//! parsed into a grid of tagged cells up front, so formatting downstream is
//! an explicit match on the cell kind instead of ad hoc string coercion.

use crate::error::FeedError;
use crate::feeds::FeedFormat;
use serde::{Deserialize, Serialize};

/// A single parsed cell. Numeric cells keep the raw text alongside the
/// parsed integer value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Cell {
    Text { raw: String },
    Numeric { raw: String, value: i64 },
}

impl Cell {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<i64>() {
            Ok(value) => Cell::Numeric {
                raw: trimmed.to_string(),
                value,
            },
            Err(_) => Cell::Text {
                raw: trimmed.to_string(),
            },
        }
    }

    pub fn raw(&self) -> &str {
        match self {
            Cell::Text { raw } | Cell::Numeric { raw, .. } => raw,
        }
    }
}

pub type Row = Vec<Cell>;

/// Parse a CSV body: newline-separated rows, comma-separated cells, first
/// row is the header. An empty body is a parse error, matching the loader's
/// "No data" rejection.
pub fn parse_csv(text: &str) -> Result<Vec<Row>, FeedError> {
    let rows: Vec<Row> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.split(',').map(Cell::parse).collect())
        .collect();

    if rows.is_empty() {
        return Err(FeedError::ParseError("Feed body contained no rows".to_string()));
    }
    Ok(rows)
}

/// Parse a JSON envelope: an array of arrays of strings.
pub fn parse_json(text: &str) -> Result<Vec<Row>, FeedError> {
    let raw_rows: Vec<Vec<String>> = serde_json::from_str(text)?;
    if raw_rows.is_empty() {
        return Err(FeedError::ParseError("Feed envelope contained no rows".to_string()));
    }
    Ok(raw_rows
        .into_iter()
        .map(|row| row.iter().map(|cell| Cell::parse(cell)).collect())
        .collect())
}

/// Parse a feed body in its configured wire format.
pub fn parse_body(format: FeedFormat, text: &str) -> Result<Vec<Row>, FeedError> {
    match format {
        FeedFormat::Csv => parse_csv(text),
        FeedFormat::Json => parse_json(text),
    }
}

/// Display formatting for table cells: amounts past the first column are
/// rendered with thousands separators and the kyat suffix, everything else
/// verbatim.
pub fn format_cell(cell: &Cell, column: usize) -> String {
    match cell {
        Cell::Numeric { value, .. } if column > 0 => format!("{} Ks", group_thousands(*value)),
        Cell::Numeric { raw, .. } | Cell::Text { raw } => raw.clone(),
    }
}

fn group_thousands(value: i64) -> String {
    let negative = value < 0;
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if negative {
        format!("-{}", grouped)
    } else {
        grouped
    }
}
