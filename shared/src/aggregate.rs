//! Booked counts and row collection across month worksheets.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use futures::future::try_join_all;
use std::fmt;
use tracing::info;

use crate::models::{MonthCount, NormalizedRow, UsedRange};
use crate::normalize::Normalizer;
use crate::selector::{month_sheets, MonthSheet};
use crate::sheets::SpreadsheetSource;
use crate::view::ViewMode;
use crate::Result;

/// Status value marking an active reservation.
pub const BOOKED: &str = "BOOKED";

/// True when the flag is `BOOKED` after trimming and uppercasing.
pub fn is_booked(flag: &str) -> bool {
    flag.trim().to_uppercase() == BOOKED
}

pub fn count_booked(rows: &[NormalizedRow]) -> usize {
    rows.iter().filter(|row| is_booked(&row.booked)).count()
}

/// Fetch several worksheets concurrently, returning them in the order given.
pub async fn fetch_ranges(
    source: &dyn SpreadsheetSource,
    sheets: Vec<MonthSheet>,
) -> Result<Vec<(MonthSheet, UsedRange)>> {
    let ranges = try_join_all(sheets.iter().map(|s| source.fetch_used_range(&s.name))).await?;
    Ok(sheets.into_iter().zip(ranges).collect())
}

/// List the workbook and fetch every month worksheet, oldest first.
pub async fn fetch_month_ranges(
    source: &dyn SpreadsheetSource,
    excluded: &[String],
) -> Result<Vec<(MonthSheet, UsedRange)>> {
    let names = source.list_worksheet_names().await?;
    let sheets = month_sheets(&names, excluded);
    info!("Selected {} month sheets out of {}", sheets.len(), names.len());
    fetch_ranges(source, sheets).await
}

/// Count booked rows in each month worksheet.
pub async fn booked_counts<Tz>(
    source: &dyn SpreadsheetSource,
    normalizer: &Normalizer<Tz>,
    excluded: &[String],
) -> Result<Vec<MonthCount>>
where
    Tz: TimeZone + Sync,
    Tz::Offset: fmt::Display,
{
    let ranges = fetch_month_ranges(source, excluded).await?;

    Ok(ranges
        .into_iter()
        .map(|(sheet, range)| MonthCount {
            count: count_booked(&normalizer.normalize(&range.headers, &range.rows)),
            name: sheet.name,
        })
        .collect())
}

/// Load the rows a view mode draws from, before any window or status filter.
///
/// The default view reads every month worksheet from the current month on;
/// a single-month view reads just that worksheet.
pub async fn collect_rows<Tz>(
    source: &dyn SpreadsheetSource,
    normalizer: &Normalizer<Tz>,
    excluded: &[String],
    mode: &ViewMode,
    now: DateTime<Utc>,
) -> Result<Vec<NormalizedRow>>
where
    Tz: TimeZone + Sync,
    Tz::Offset: fmt::Display,
{
    let ranges = match mode {
        ViewMode::SingleMonth(name) => vec![source.fetch_used_range(name).await?],
        ViewMode::Default => {
            let (year, month) = {
                let local = now.with_timezone(normalizer.timezone());
                (local.year(), local.month0())
            };
            let names = source.list_worksheet_names().await?;
            let sheets: Vec<MonthSheet> = month_sheets(&names, excluded)
                .into_iter()
                .filter(|s| s.is_at_or_after(year, month))
                .collect();
            fetch_ranges(source, sheets)
                .await?
                .into_iter()
                .map(|(_, range)| range)
                .collect()
        }
    };

    Ok(ranges
        .iter()
        .flat_map(|range| normalizer.normalize_at(&range.headers, &range.rows, now))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Cell;
    use crate::normalize::ColumnLayout;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;

    /// In-memory source whose fetch latency is inversely related to sheet order.
    struct FakeSource {
        names: Vec<String>,
        sheets: HashMap<String, UsedRange>,
    }

    #[async_trait]
    impl SpreadsheetSource for FakeSource {
        async fn list_worksheet_names(&self) -> Result<Vec<String>> {
            Ok(self.names.clone())
        }

        async fn fetch_used_range(&self, worksheet_name: &str) -> Result<UsedRange> {
            let position = self.names.iter().position(|n| n == worksheet_name).unwrap_or(0);
            let delay = 10 * (self.names.len() - position) as u64;
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.sheets
                .get(worksheet_name)
                .cloned()
                .ok_or_else(|| crate::Error::NotFound(worksheet_name.to_string()))
        }
    }

    fn range(flags: &[&str]) -> UsedRange {
        UsedRange {
            headers: vec!["Date".to_string(), "Booked".to_string()],
            rows: flags
                .iter()
                .map(|f| vec![Cell::Number(45658.0), Cell::from(*f)])
                .collect(),
        }
    }

    fn source() -> FakeSource {
        let mut sheets = HashMap::new();
        sheets.insert("Feb".to_string(), range(&["BOOKED", "Pending"]));
        sheets.insert("Jan 2026".to_string(), range(&[" booked ", "Booked", "x"]));
        sheets.insert("Dec".to_string(), range(&[]));
        sheets.insert("Logs".to_string(), range(&["BOOKED"]));
        FakeSource {
            names: vec!["Logs".into(), "Feb".into(), "Jan 2026".into(), "Dec".into()],
            sheets,
        }
    }

    fn excluded() -> Vec<String> {
        vec!["logs".to_string(), "tech".to_string()]
    }

    #[test]
    fn test_is_booked() {
        assert!(is_booked("BOOKED"));
        assert!(is_booked(" booked "));
        assert!(is_booked("Booked\t"));
        assert!(!is_booked("Pending"));
        assert!(!is_booked("BOOKED?"));
        assert!(!is_booked("not booked"));
        assert!(!is_booked(""));
    }

    #[tokio::test]
    async fn test_booked_counts_follow_selector_order() {
        let normalizer = Normalizer::new(Utc, ColumnLayout::ByHeader);
        let counts = booked_counts(&source(), &normalizer, &excluded()).await.unwrap();

        assert_eq!(
            counts,
            vec![
                MonthCount { name: "Jan 2026".into(), count: 2 },
                MonthCount { name: "Feb".into(), count: 1 },
                MonthCount { name: "Dec".into(), count: 0 },
            ]
        );
    }

    #[tokio::test]
    async fn test_collect_rows_single_month() {
        let normalizer = Normalizer::new(Utc, ColumnLayout::ByHeader);
        let rows = collect_rows(
            &source(),
            &normalizer,
            &excluded(),
            &ViewMode::SingleMonth("Feb".into()),
            Utc::now(),
        )
        .await
        .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_collect_rows_default_skips_past_months() {
        let normalizer = Normalizer::new(Utc, ColumnLayout::ByHeader);
        let now = Utc.with_ymd_and_hms(2026, 11, 20, 9, 0, 0).unwrap();
        let rows = collect_rows(&source(), &normalizer, &excluded(), &ViewMode::Default, now)
            .await
            .unwrap();
        // Only "Dec" (undated, month >= Dec) qualifies, and it is empty.
        assert!(rows.is_empty());

        let now = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();
        let rows = collect_rows(&source(), &normalizer, &excluded(), &ViewMode::Default, now)
            .await
            .unwrap();
        // Jan 2026, Feb and Dec
        assert_eq!(rows.len(), 5);
    }

    #[tokio::test]
    async fn test_missing_sheet_propagates_error() {
        let normalizer = Normalizer::new(Utc, ColumnLayout::ByHeader);
        let mut src = source();
        src.sheets.remove("Feb");
        let err = booked_counts(&src, &normalizer, &excluded()).await.unwrap_err();
        assert!(matches!(err, crate::Error::NotFound(_)));
    }
}
