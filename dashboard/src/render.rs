//! Plain-text rendering of scorecards and the bookings table.

use shared::error::truncate;
use shared::models::{Column, MonthCount};
use shared::view::{SortDirection, TablePage, ViewMode};
use std::fmt::Write;

const MAX_CELL_WIDTH: usize = 28;

pub const SCORECARD_ERROR: &str = "Failed to load scorecards";

pub fn cards(counts: &[MonthCount]) -> String {
    if counts.is_empty() {
        return "No month sheets found".to_string();
    }
    let width = counts.iter().map(|c| c.name.chars().count()).max().unwrap_or(0);
    counts
        .iter()
        .map(|c| format!("[BOOKED] {:<width$}  {:>4}", c.name, c.count, width = width))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn mode_label(mode: &ViewMode) -> &str {
    match mode {
        ViewMode::Default => "Upcoming",
        ViewMode::SingleMonth(name) => name,
    }
}

/// Summary line, e.g. `Feb: 12 “BOOKED”`.
pub fn status_line(mode: &ViewMode, count: usize) -> String {
    format!("{}: {} “BOOKED”", mode_label(mode), count)
}

fn fit(value: &str) -> String {
    if value.chars().count() > MAX_CELL_WIDTH {
        format!("{}…", truncate(value, MAX_CELL_WIDTH - 1))
    } else {
        value.to_string()
    }
}

fn header_labels(page: &TablePage, zone: &str) -> Vec<String> {
    Column::ALL
        .iter()
        .zip(&page.columns)
        .map(|(column, label)| {
            let mut label = label.clone();
            if matches!(column, Column::StartTime | Column::EndTime) && !zone.is_empty() {
                label = format!("{} ({})", label, zone);
            }
            if *column == page.sort.column {
                label.push_str(match page.sort.direction {
                    SortDirection::Asc => " ▲",
                    SortDirection::Desc => " ▼",
                });
            }
            label
        })
        .collect()
}

pub fn table(page: &TablePage, zone: &str) -> String {
    if page.rows.is_empty() {
        return "No bookings to show.".to_string();
    }

    let headers = header_labels(page, zone);
    let rows: Vec<Vec<String>> = page
        .rows
        .iter()
        .map(|row| row.iter().map(|cell| fit(cell)).collect())
        .collect();

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            rows.iter()
                .filter_map(|r| r.get(i))
                .map(|c| c.chars().count())
                .chain(std::iter::once(h.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |cells: &[String]| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<w$}", c, w = *w))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut out = String::new();
    let _ = writeln!(out, "{}", line(&headers));
    let _ = writeln!(
        out,
        "{}",
        widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-")
    );
    for row in &rows {
        let _ = writeln!(out, "{}", line(row));
    }
    out.trim_end().to_string()
}

/// `« ‹ 1 [2] 3 › »` with disabled controls blanked out.
pub fn pager(page: &TablePage) -> String {
    let control = |enabled: bool, label: &str| {
        if enabled {
            label.to_string()
        } else {
            " ".repeat(label.chars().count())
        }
    };

    let numbers = page
        .pages
        .iter()
        .map(|n| {
            if *n == page.page {
                format!("[{}]", n)
            } else {
                n.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        "{} {} {} {} {}   page {} of {}, {} per page",
        control(page.controls.first, "«"),
        control(page.controls.prev, "‹"),
        numbers,
        control(page.controls.next, "›"),
        control(page.controls.last, "»"),
        page.page,
        page.total_pages,
        page.page_size
    )
}

pub fn screen(cards: &str, page: &TablePage, zone: &str) -> String {
    format!(
        "Local time: {}\n\n{}\n\n{}\n\n{}\n{}",
        zone,
        cards,
        status_line(&page.mode, page.total_rows),
        table(page, zone),
        pager(page)
    )
}
