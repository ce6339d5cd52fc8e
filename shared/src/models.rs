//! Shared data models.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One spreadsheet cell as returned by the backing store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    #[default]
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Cell {
    /// True for null, empty and whitespace-only cells.
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Text shown when the cell is displayed verbatim.
    pub fn display(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Bool(b) => b.to_string(),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Cell::Number(n) => n.to_string(),
            Cell::Text(s) => s.trim().to_string(),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Cell::Number(n)
    }
}

/// A row of cells aligned to the header row of the same fetch.
pub type RawRow = Vec<Cell>;

/// The used range of one worksheet: header row plus data rows.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UsedRange {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl UsedRange {
    /// Split a 2-D `values` grid into headers and non-blank rows.
    pub fn from_values(values: Vec<Vec<Cell>>) -> Self {
        let mut iter = values.into_iter();
        let headers = iter
            .next()
            .map(|row| row.iter().map(|c| c.display()).collect())
            .unwrap_or_default();

        let rows = iter
            .filter(|row| !row.iter().all(Cell::is_blank))
            .collect();

        Self { headers, rows }
    }
}

/// Absolute timestamps (UTC epoch milliseconds) used for filtering and sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timestamps {
    pub date_ms: Option<i64>,
    pub start_ms: Option<i64>,
    pub end_ms: Option<i64>,
}

/// The fixed output columns, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Column {
    Email,
    Name,
    Date,
    StartTime,
    EndTime,
    BookedFlag,
    Site,
    Account,
    Ticket,
    Mid,
}

impl Column {
    pub const ALL: [Column; 10] = [
        Column::Email,
        Column::Name,
        Column::Date,
        Column::StartTime,
        Column::EndTime,
        Column::BookedFlag,
        Column::Site,
        Column::Account,
        Column::Ticket,
        Column::Mid,
    ];

    /// Display label for table headers.
    pub fn label(self) -> &'static str {
        match self {
            Column::Email => "Email",
            Column::Name => "Name",
            Column::Date => "Date",
            Column::StartTime => "Start Time",
            Column::EndTime => "End Time",
            Column::BookedFlag => "Booked",
            Column::Site => "Site",
            Column::Account => "Account",
            Column::Ticket => "Ticket",
            Column::Mid => "MID",
        }
    }

    /// Whether the column sorts by an absolute timestamp.
    pub fn is_temporal(self) -> bool {
        matches!(self, Column::Date | Column::StartTime | Column::EndTime)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Column {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();

        match key.as_str() {
            "email" => Ok(Column::Email),
            "name" => Ok(Column::Name),
            "date" => Ok(Column::Date),
            "start" | "starttime" => Ok(Column::StartTime),
            "end" | "endtime" => Ok(Column::EndTime),
            "booked" | "bookedflag" | "status" => Ok(Column::BookedFlag),
            "site" => Ok(Column::Site),
            "account" => Ok(Column::Account),
            "ticket" => Ok(Column::Ticket),
            "mid" => Ok(Column::Mid),
            _ => Err(format!("Unknown column: {}", s)),
        }
    }
}

/// A spreadsheet row mapped onto the fixed output columns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRow {
    pub email: String,
    pub name: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub booked: String,
    pub site: String,
    pub account: String,
    pub ticket: String,
    pub mid: String,
    #[serde(skip)]
    pub timestamps: Timestamps,
}

impl NormalizedRow {
    pub fn get(&self, column: Column) -> &str {
        match column {
            Column::Email => &self.email,
            Column::Name => &self.name,
            Column::Date => &self.date,
            Column::StartTime => &self.start_time,
            Column::EndTime => &self.end_time,
            Column::BookedFlag => &self.booked,
            Column::Site => &self.site,
            Column::Account => &self.account,
            Column::Ticket => &self.ticket,
            Column::Mid => &self.mid,
        }
    }

    pub(crate) fn set(&mut self, column: Column, value: String) {
        let slot = match column {
            Column::Email => &mut self.email,
            Column::Name => &mut self.name,
            Column::Date => &mut self.date,
            Column::StartTime => &mut self.start_time,
            Column::EndTime => &mut self.end_time,
            Column::BookedFlag => &mut self.booked,
            Column::Site => &mut self.site,
            Column::Account => &mut self.account,
            Column::Ticket => &mut self.ticket,
            Column::Mid => &mut self.mid,
        };
        *slot = value;
    }

    /// Timestamp backing a temporal column.
    pub fn timestamp(&self, column: Column) -> Option<i64> {
        match column {
            Column::Date => self.timestamps.date_ms,
            Column::StartTime => self.timestamps.start_ms,
            Column::EndTime => self.timestamps.end_ms,
            _ => None,
        }
    }

    /// Display values in column order.
    pub fn cells(&self) -> Vec<&str> {
        Column::ALL.iter().map(|c| self.get(*c)).collect()
    }
}

/// Booked count for one month worksheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthCount {
    pub name: String,
    pub count: usize,
}

/// Payload of `GET /sheetData`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SheetData {
    pub sheet: String,
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
    #[serde(default)]
    pub ms: Vec<Timestamps>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_json_shapes() {
        let cells: Vec<Cell> = serde_json::from_str(r#"[45658, "a@x.com", null, true]"#).unwrap();
        assert_eq!(
            cells,
            vec![
                Cell::Number(45658.0),
                Cell::Text("a@x.com".to_string()),
                Cell::Empty,
                Cell::Bool(true),
            ]
        );
        assert_eq!(serde_json::to_string(&Cell::Empty).unwrap(), "null");
    }

    #[test]
    fn test_cell_display() {
        assert_eq!(Cell::Number(42.0).display(), "42");
        assert_eq!(Cell::Number(0.5).display(), "0.5");
        assert_eq!(Cell::from("  BOOKED ").display(), "BOOKED");
        assert!(Cell::from("   ").is_blank());
    }

    #[test]
    fn test_used_range_drops_blank_rows() {
        let range = UsedRange::from_values(vec![
            vec![Cell::from(" Date "), Cell::from("Email")],
            vec![Cell::Empty, Cell::from("  ")],
            vec![Cell::Number(45658.0), Cell::from("a@x.com")],
        ]);
        assert_eq!(range.headers, vec!["Date", "Email"]);
        assert_eq!(range.rows.len(), 1);
    }

    #[test]
    fn test_column_from_str() {
        assert_eq!("Start Time".parse::<Column>().unwrap(), Column::StartTime);
        assert_eq!("mid".parse::<Column>().unwrap(), Column::Mid);
        assert!("colour".parse::<Column>().is_err());
    }
}
