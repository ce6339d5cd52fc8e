//! Shared library for the booking dashboard.
//!
//! This crate holds the spreadsheet clients, the month-sheet/normalization
//! pipeline and the table view state used by both the Lambda API and the
//! terminal dashboard.

pub mod aggregate;
pub mod api;
pub mod config;
pub mod error;
pub mod http;
pub mod models;
pub mod normalize;
pub mod refresh;
pub mod secrets;
pub mod selector;
pub mod sheets;
pub mod view;

pub use aggregate::{booked_counts, collect_rows, count_booked, is_booked};
pub use api::AppState;
pub use config::Config;
pub use error::{Error, Result};
pub use models::{Cell, Column, MonthCount, NormalizedRow, SheetData, UsedRange};
pub use normalize::{ColumnLayout, Normalizer};
pub use refresh::{Loader, RefreshQueue};
pub use selector::{parse_month_sheet, select_month_sheets, MonthSheet};
pub use sheets::SpreadsheetSource;
pub use view::{DefaultViewPolicy, TablePage, TimeWindow, ViewController, ViewEvent, ViewMode};
