//! Table view state: view modes, time windows, sorting and pagination.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::aggregate::is_booked;
use crate::models::{Column, MonthCount, NormalizedRow};
use crate::normalize::Normalizer;

pub const DEFAULT_PAGE_SIZE: usize = 15;

/// Number of page links shown around the current page.
pub const PAGE_WINDOW: usize = 5;

/// How far ahead the default view looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultViewPolicy {
    #[default]
    EndOfYear,
    EndOfMonth,
}

impl FromStr for DefaultViewPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "end_of_year" | "year" => Ok(Self::EndOfYear),
            "end_of_month" | "month" => Ok(Self::EndOfMonth),
            other => Err(format!("Unknown view policy: {}", other)),
        }
    }
}

impl fmt::Display for DefaultViewPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndOfYear => f.write_str("end_of_year"),
            Self::EndOfMonth => f.write_str("end_of_month"),
        }
    }
}

/// Inclusive bounds on a row's date timestamp; `None` is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeWindow {
    pub start_ms: Option<i64>,
    pub end_ms: Option<i64>,
}

impl TimeWindow {
    pub const UNBOUNDED: TimeWindow = TimeWindow {
        start_ms: None,
        end_ms: None,
    };

    /// Rows without a date only fall inside an unbounded window.
    pub fn contains(&self, date_ms: Option<i64>) -> bool {
        match date_ms {
            Some(ms) => {
                self.start_ms.map_or(true, |start| ms >= start)
                    && self.end_ms.map_or(true, |end| ms <= end)
            }
            None => self.start_ms.is_none() && self.end_ms.is_none(),
        }
    }

    /// Local midnight today through the last millisecond of the year or month.
    pub fn for_policy<Tz>(
        policy: DefaultViewPolicy,
        normalizer: &Normalizer<Tz>,
        now: DateTime<Utc>,
    ) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let today = now.with_timezone(normalizer.timezone()).date_naive();
        let next_period = match policy {
            DefaultViewPolicy::EndOfYear => NaiveDate::from_ymd_opt(today.year() + 1, 1, 1),
            DefaultViewPolicy::EndOfMonth => {
                if today.month() == 12 {
                    NaiveDate::from_ymd_opt(today.year() + 1, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(today.year(), today.month() + 1, 1)
                }
            }
        };

        Self {
            start_ms: normalizer.start_of_day_ms(today),
            end_ms: next_period
                .and_then(|d| normalizer.start_of_day_ms(d))
                .map(|ms| ms - 1),
        }
    }
}

/// Which rows the table draws from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "sheet", rename_all = "camelCase")]
pub enum ViewMode {
    /// Every month sheet from the current month on
    #[default]
    Default,
    SingleMonth(String),
}

/// User interactions that change the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    SelectMonth(String),
    MonthlyPanelClosed,
    YearlyPanelOpened,
    Reload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Asc),
            "desc" | "descending" => Ok(Self::Desc),
            other => Err(format!("Unknown sort direction: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortState {
    pub column: Column,
    pub direction: SortDirection,
}

impl Default for SortState {
    fn default() -> Self {
        Self {
            column: Column::Date,
            direction: SortDirection::Asc,
        }
    }
}

/// Page navigation controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageNav {
    First,
    Prev,
    Next,
    Last,
    To(usize),
}

/// Enabled state of the navigation buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageControls {
    pub first: bool,
    pub prev: bool,
    pub next: bool,
    pub last: bool,
}

/// One rendered page of the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TablePage {
    pub mode: ViewMode,
    pub sort: SortState,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub total_rows: usize,
    pub pages: Vec<usize>,
    pub controls: PageControls,
}

/// Sort rows in place. Stable, so equal keys keep their input order.
pub fn sort_rows(rows: &mut [NormalizedRow], sort: SortState) {
    rows.sort_by(|a, b| {
        let ordering = compare(a, b, sort.column);
        match sort.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

fn compare(a: &NormalizedRow, b: &NormalizedRow, column: Column) -> Ordering {
    if column.is_temporal() {
        return a.timestamp(column).cmp(&b.timestamp(column));
    }

    let (x, y) = (a.get(column).trim(), b.get(column).trim());
    match (x.parse::<f64>(), y.parse::<f64>()) {
        (Ok(m), Ok(n)) => m.partial_cmp(&n).unwrap_or(Ordering::Equal),
        _ => x.to_lowercase().cmp(&y.to_lowercase()),
    }
}

/// Up to `width` consecutive page numbers centred on `current`.
pub fn page_window(current: usize, total: usize, width: usize) -> Vec<usize> {
    if total == 0 || width == 0 {
        return Vec::new();
    }
    let current = current.clamp(1, total);
    let mut start = current.saturating_sub(width / 2).max(1);
    let end = (start + width - 1).min(total);
    start = (end + 1).saturating_sub(width).max(1);
    (start..=end).collect()
}

/// State machine behind the bookings table.
#[derive(Debug, Clone)]
pub struct ViewController {
    mode: ViewMode,
    months: Vec<String>,
    sort: SortState,
    page: usize,
    page_size: usize,
    total_pages: usize,
    policy: DefaultViewPolicy,
    single_month_booked_only: bool,
    /// Serialized month counts last shown on the scorecards
    last_cards: Option<String>,
}

impl ViewController {
    pub fn new(policy: DefaultViewPolicy, single_month_booked_only: bool) -> Self {
        Self {
            mode: ViewMode::Default,
            months: Vec::new(),
            sort: SortState::default(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            total_pages: 1,
            policy,
            single_month_booked_only,
            last_cards: None,
        }
    }

    pub fn mode(&self) -> &ViewMode {
        &self.mode
    }

    pub fn sort(&self) -> SortState {
        self.sort
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn policy(&self) -> DefaultViewPolicy {
        self.policy
    }

    /// Month worksheets that `SelectMonth` may switch to.
    pub fn set_months(&mut self, months: Vec<String>) {
        self.months = months;
    }

    /// Apply an event. Returns true when the rows must be reloaded.
    pub fn handle(&mut self, event: ViewEvent) -> bool {
        let next = match event {
            ViewEvent::SelectMonth(name) => {
                if !self.months.iter().any(|m| *m == name) {
                    return false;
                }
                ViewMode::SingleMonth(name)
            }
            ViewEvent::MonthlyPanelClosed | ViewEvent::YearlyPanelOpened => ViewMode::Default,
            ViewEvent::Reload => return true,
        };

        if next != self.mode {
            self.mode = next;
            self.sort = SortState::default();
            self.page = 1;
        }
        true
    }

    /// Header click: toggle on the same column, otherwise sort ascending by the new one.
    pub fn click_column(&mut self, column: Column) {
        if self.sort.column == column {
            self.sort.direction = self.sort.direction.toggled();
        } else {
            self.sort = SortState {
                column,
                direction: SortDirection::Asc,
            };
        }
        self.page = 1;
    }

    pub fn set_sort(&mut self, sort: SortState) {
        self.sort = sort;
    }

    pub fn set_page_size(&mut self, size: usize) {
        self.page_size = size.max(1);
        self.page = 1;
    }

    /// Jump to a page. The target is clamped on the next render.
    pub fn navigate(&mut self, nav: PageNav) {
        self.page = match nav {
            PageNav::First => 1,
            PageNav::Prev => self.page.saturating_sub(1).max(1),
            PageNav::Next => (self.page + 1).min(self.total_pages),
            PageNav::Last => self.total_pages,
            PageNav::To(n) => n.max(1),
        };
    }

    /// Record the scorecard data. Returns false when it matches what is already shown.
    pub fn apply_counts(&mut self, counts: &[MonthCount]) -> bool {
        self.months = counts.iter().map(|c| c.name.clone()).collect();

        let fingerprint = serde_json::to_string(counts).unwrap_or_default();
        if self.last_cards.as_deref() == Some(fingerprint.as_str()) {
            return false;
        }
        self.last_cards = Some(fingerprint);
        true
    }

    /// Force the next `apply_counts` to report a change.
    pub fn forget_counts(&mut self) {
        self.last_cards = None;
    }

    /// Date window for the current mode.
    pub fn window<Tz>(&self, normalizer: &Normalizer<Tz>, now: DateTime<Utc>) -> TimeWindow
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        match self.mode {
            ViewMode::Default => TimeWindow::for_policy(self.policy, normalizer, now),
            ViewMode::SingleMonth(_) => TimeWindow::UNBOUNDED,
        }
    }

    /// Keep the rows the current mode shows.
    pub fn select_rows(&self, rows: Vec<NormalizedRow>, window: &TimeWindow) -> Vec<NormalizedRow> {
        let booked_only = match self.mode {
            ViewMode::Default => true,
            ViewMode::SingleMonth(_) => self.single_month_booked_only,
        };

        rows.into_iter()
            .filter(|row| !booked_only || is_booked(&row.booked))
            .filter(|row| window.contains(row.timestamps.date_ms))
            .collect()
    }

    /// Sort and slice the rows into the current page.
    pub fn render(&mut self, rows: &[NormalizedRow]) -> TablePage {
        let mut sorted = rows.to_vec();
        sort_rows(&mut sorted, self.sort);

        let total_rows = sorted.len();
        self.total_pages = total_rows.div_ceil(self.page_size).max(1);
        self.page = self.page.clamp(1, self.total_pages);

        let start = (self.page - 1) * self.page_size;
        let page_rows = sorted
            .iter()
            .skip(start)
            .take(self.page_size)
            .map(|row| row.cells().into_iter().map(str::to_string).collect())
            .collect();

        let on_first = self.page == 1;
        let on_last = self.page == self.total_pages;

        TablePage {
            mode: self.mode.clone(),
            sort: self.sort,
            columns: Column::ALL.iter().map(|c| c.label().to_string()).collect(),
            rows: page_rows,
            page: self.page,
            page_size: self.page_size,
            total_pages: self.total_pages,
            total_rows,
            pages: page_window(self.page, self.total_pages, PAGE_WINDOW),
            controls: PageControls {
                first: !on_first,
                prev: !on_first,
                next: !on_last,
                last: !on_last,
            },
        }
    }
}
