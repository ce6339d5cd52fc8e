//! Row normalization: maps raw worksheet cells onto the fixed output columns.
//!
//! Dates arrive either as spreadsheet day serials (days since 1899-12-30) or
//! as free-form strings; times arrive as fractions of a day or as `H:MM`,
//! `H:MM:SS` and `H:MM AM` strings. Everything is resolved into absolute
//! timestamps in the viewer's timezone, captured once when the normalizer is
//! built.

use chrono::{
    DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc,
};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

use crate::models::{Cell, Column, NormalizedRow, RawRow, Timestamps};

const MINUTES_PER_DAY: f64 = 1440.0;

static EMPTY_CELL: Cell = Cell::Empty;

/// How output columns are located in the source worksheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnLayout {
    /// Match header cells by name, ignoring case and extra whitespace
    #[default]
    ByHeader,
    /// Fixed positions of the legacy sheet layout
    Positional,
}

/// Resolved source index for every output column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap([Option<usize>; 10]);

impl ColumnMap {
    pub fn index(&self, column: Column) -> Option<usize> {
        self.0[position(column)]
    }
}

fn position(column: Column) -> usize {
    Column::ALL
        .iter()
        .position(|c| *c == column)
        .unwrap_or_default()
}

fn aliases(column: Column) -> &'static [&'static str] {
    match column {
        Column::Email => &["email", "email address", "e-mail"],
        Column::Name => &["name", "full name", "customer name"],
        Column::Date => &["date", "booking date"],
        Column::StartTime => &["start time", "start"],
        Column::EndTime => &["end time", "end"],
        Column::BookedFlag => &["booked", "status", "booking status"],
        Column::Site => &["site", "location"],
        Column::Account => &["account", "account name"],
        Column::Ticket => &["ticket", "ticket #", "ticket number", "ticket no"],
        Column::Mid => &["mid", "merchant id"],
    }
}

fn legacy_index(column: Column) -> usize {
    match column {
        Column::Date => 0,
        Column::Email => 1,
        Column::Name => 2,
        Column::Site => 3,
        Column::Account => 4,
        Column::StartTime => 5,
        Column::EndTime => 6,
        Column::BookedFlag => 7,
        Column::Ticket => 8,
        Column::Mid => 9,
    }
}

/// Lowercase and collapse internal whitespace: `"  Start   Time "` -> `"start time"`.
pub fn collapse_header(header: &str) -> String {
    header
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl ColumnLayout {
    pub fn resolve(self, headers: &[String]) -> ColumnMap {
        let mut map = [None; 10];

        match self {
            ColumnLayout::Positional => {
                for column in Column::ALL {
                    map[position(column)] = Some(legacy_index(column));
                }
            }
            ColumnLayout::ByHeader => {
                let collapsed: Vec<String> = headers.iter().map(|h| collapse_header(h)).collect();

                for column in Column::ALL {
                    map[position(column)] = collapsed
                        .iter()
                        .position(|h| aliases(column).contains(&h.as_str()));
                }

                // "Start (EST)" and friends: fall back to a word match.
                for (column, word) in [(Column::StartTime, "start"), (Column::EndTime, "end")] {
                    if map[position(column)].is_none() {
                        map[position(column)] = collapsed.iter().position(|h| {
                            h.split(|c: char| !c.is_alphanumeric()).any(|token| token == word)
                        });
                    }
                }
            }
        }

        ColumnMap(map)
    }
}

/// Convert a spreadsheet day serial into a calendar date.
///
/// The epoch is 1899-12-30 and no correction is applied for the phantom
/// 1900-02-29, matching how other consumers of the format decode it.
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(chrono::Duration::try_days(serial.floor() as i64)?)
}

/// Convert the fractional part of a serial into a time of day, rounded to the minute.
pub fn serial_to_time(serial: f64) -> Option<NaiveTime> {
    if !serial.is_finite() {
        return None;
    }
    let fraction = serial - serial.floor();
    let minutes = ((fraction * MINUTES_PER_DAY).round() as u32).min(1439);
    NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0)
}

fn time_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(\d{1,2}):(\d{2})(?::(\d{2}))?\s*(am|pm)?$").expect("time pattern is valid")
    })
}

/// Parse `H:MM`, `H:MM:SS` or `H:MM AM|PM`.
pub fn parse_time_text(text: &str) -> Option<NaiveTime> {
    let captures = time_pattern().captures(text.trim())?;
    let mut hour: u32 = captures[1].parse().ok()?;
    let minute: u32 = captures[2].parse().ok()?;
    let second: u32 = match captures.get(3) {
        Some(s) => s.as_str().parse().ok()?,
        None => 0,
    };

    if let Some(meridiem) = captures.get(4) {
        if !(1..=12).contains(&hour) {
            return None;
        }
        let pm = meridiem.as_str().eq_ignore_ascii_case("pm");
        hour = match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, true) => h + 12,
            (h, false) => h,
        };
    }

    NaiveTime::from_hms_opt(hour, minute, second)
}

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%d-%b-%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%b %d %Y",
    "%B %d %Y",
    "%a %b %d %Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M %p",
];

/// Normalizes worksheet rows for one viewer timezone.
#[derive(Debug, Clone)]
pub struct Normalizer<Tz: TimeZone> {
    tz: Tz,
    layout: ColumnLayout,
}

impl Normalizer<Local> {
    /// Normalizer for the timezone of the running process.
    pub fn local() -> Self {
        Self::new(Local, ColumnLayout::default())
    }
}

impl<Tz> Normalizer<Tz>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    pub fn new(tz: Tz, layout: ColumnLayout) -> Self {
        Self { tz, layout }
    }

    pub fn timezone(&self) -> &Tz {
        &self.tz
    }

    /// Normalize rows, using the current instant for "today".
    pub fn normalize(&self, headers: &[String], rows: &[RawRow]) -> Vec<NormalizedRow> {
        self.normalize_at(headers, rows, Utc::now())
    }

    /// Normalize rows with an explicit "now", used for rows that carry a time but no date.
    pub fn normalize_at(
        &self,
        headers: &[String],
        rows: &[RawRow],
        now: DateTime<Utc>,
    ) -> Vec<NormalizedRow> {
        let columns = self.layout.resolve(headers);
        let today = now.with_timezone(&self.tz).date_naive();

        rows.iter()
            .filter(|row| !row.iter().all(Cell::is_blank))
            .map(|row| self.normalize_row(row, &columns, today))
            .collect()
    }

    fn normalize_row(&self, row: &RawRow, columns: &ColumnMap, today: NaiveDate) -> NormalizedRow {
        let cell = |column: Column| pick(row, columns, column);

        let mut out = NormalizedRow::default();
        for column in Column::ALL {
            if !column.is_temporal() {
                out.set(column, cell(column).display());
            }
        }

        let date_cell = cell(Column::Date);
        let date = self.decode_date(date_cell);
        out.date = match date {
            Some(d) => d.format("%m/%d/%Y").to_string(),
            None => date_cell.display(),
        };

        let base = date.unwrap_or(today);
        let mut timestamps = Timestamps {
            date_ms: date.and_then(|d| self.local_ms(d, NaiveTime::MIN)),
            ..Timestamps::default()
        };

        for column in [Column::StartTime, Column::EndTime] {
            let time_cell = cell(column);
            let time = decode_time(time_cell);
            let display = match time {
                Some(t) => t.format("%-I:%M %p").to_string(),
                None => time_cell.display(),
            };
            let ms = time.and_then(|t| self.local_ms(base, t));

            out.set(column, display);
            match column {
                Column::StartTime => timestamps.start_ms = ms,
                _ => timestamps.end_ms = ms,
            }
        }

        out.timestamps = timestamps;
        out
    }

    /// Decode a date cell into a calendar date in the viewer's timezone.
    pub fn decode_date(&self, cell: &Cell) -> Option<NaiveDate> {
        match cell {
            Cell::Number(n) => serial_to_date(*n),
            Cell::Text(s) => self.parse_date_text(s.trim()),
            _ => None,
        }
    }

    fn parse_date_text(&self, text: &str) -> Option<NaiveDate> {
        if text.is_empty() {
            return None;
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Some(dt.with_timezone(&self.tz).date_naive());
        }
        DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
            .or_else(|| {
                DATETIME_FORMATS
                    .iter()
                    .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                    .map(|dt| dt.date())
            })
    }

    /// Epoch milliseconds of a wall-clock time in the viewer's timezone.
    pub fn local_ms(&self, date: NaiveDate, time: NaiveTime) -> Option<i64> {
        let naive = date.and_time(time);
        match self.tz.from_local_datetime(&naive).earliest() {
            Some(dt) => Some(dt.timestamp_millis()),
            // Inside a DST gap: read the wall clock as if it were UTC-offset
            None => Some(self.tz.from_utc_datetime(&naive).timestamp_millis()),
        }
    }

    /// Midnight at the start of `date` in the viewer's timezone.
    pub fn start_of_day_ms(&self, date: NaiveDate) -> Option<i64> {
        self.local_ms(date, NaiveTime::MIN)
    }

    /// Short label for the viewer's zone, e.g. `GMT+5:30` or `GMT-4`.
    pub fn zone_label(&self, at: DateTime<Utc>) -> String {
        let offset = at.with_timezone(&self.tz).offset().fix().local_minus_utc();
        let sign = if offset >= 0 { '+' } else { '-' };
        let minutes = offset.abs() / 60;
        let (hours, rest) = (minutes / 60, minutes % 60);
        if rest == 0 {
            format!("GMT{}{}", sign, hours)
        } else {
            format!("GMT{}{}:{:02}", sign, hours, rest)
        }
    }
}

fn pick<'a>(row: &'a RawRow, columns: &ColumnMap, column: Column) -> &'a Cell {
    columns
        .index(column)
        .and_then(|i| row.get(i))
        .unwrap_or(&EMPTY_CELL)
}

fn decode_time(cell: &Cell) -> Option<NaiveTime> {
    match cell {
        Cell::Number(n) => serial_to_time(*n),
        Cell::Text(s) => parse_time_text(s),
        _ => None,
    }
}
