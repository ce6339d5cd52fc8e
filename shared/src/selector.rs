//! Month worksheet discovery and chronological ordering.

use regex::Regex;
use std::sync::OnceLock;

/// A worksheet name recognised as a calendar month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthSheet {
    /// The worksheet name exactly as the backend reported it
    pub name: String,
    /// January = 0
    pub month_index: u32,
    pub year: Option<i32>,
}

impl MonthSheet {
    /// Sort key: undated sheets come after every dated one.
    fn sort_key(&self) -> (i32, u32) {
        (self.year.unwrap_or(i32::MAX), self.month_index)
    }

    /// True when this sheet covers `year`/`month_index` or a later month.
    /// Undated sheets only compare by month.
    pub fn is_at_or_after(&self, year: i32, month_index: u32) -> bool {
        match self.year {
            Some(y) => (y, self.month_index) >= (year, month_index),
            None => self.month_index >= month_index,
        }
    }
}

fn month_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)^(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)(?:\s+(\d{4}))?$",
        )
        .expect("month pattern is valid")
    })
}

fn month_index(token: &str) -> Option<u32> {
    let prefix: String = token.chars().take(3).collect::<String>().to_lowercase();
    let index = match prefix.as_str() {
        "jan" => 0,
        "feb" => 1,
        "mar" => 2,
        "apr" => 3,
        "may" => 4,
        "jun" => 5,
        "jul" => 6,
        "aug" => 7,
        "sep" => 8,
        "oct" => 9,
        "nov" => 10,
        "dec" => 11,
        _ => return None,
    };
    Some(index)
}

/// Parse a worksheet name such as `Jan`, `september 2025` or ` Dec 2026 `.
pub fn parse_month_sheet(name: &str) -> Option<MonthSheet> {
    let captures = month_pattern().captures(name.trim())?;
    let month_index = month_index(captures.get(1)?.as_str())?;
    let year = match captures.get(2) {
        Some(y) => Some(y.as_str().parse().ok()?),
        None => None,
    };

    Some(MonthSheet {
        name: name.to_string(),
        month_index,
        year,
    })
}

fn is_excluded(name: &str, excluded: &[String]) -> bool {
    let key = name.trim().to_lowercase();
    excluded.iter().any(|e| e.trim().to_lowercase() == key)
}

/// Parse and order the month worksheets among `names`.
pub fn month_sheets<S: AsRef<str>>(names: &[S], excluded: &[String]) -> Vec<MonthSheet> {
    let mut sheets: Vec<MonthSheet> = names
        .iter()
        .map(AsRef::as_ref)
        .filter(|name| !is_excluded(name, excluded))
        .filter_map(parse_month_sheet)
        .collect();

    // Stable, so equal keys keep their input order.
    sheets.sort_by_key(MonthSheet::sort_key);
    sheets
}

/// Keep the worksheet names that look like calendar months, oldest first.
pub fn select_month_sheets<S: AsRef<str>>(names: &[S], excluded: &[String]) -> Vec<String> {
    month_sheets(names, excluded)
        .into_iter()
        .map(|sheet| sheet.name)
        .collect()
}
