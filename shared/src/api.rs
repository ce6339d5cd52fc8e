//! Request routing for the dashboard API.
//!
//! Endpoints:
//! - GET /sheetNames - Month worksheets in chronological order (`?all=true` for every tab)
//! - GET /sheetData?sheet= - Raw rows of one worksheet plus per-row timestamps
//! - GET /bookedCounts - Booked rows per month worksheet
//! - GET /bookings - One rendered page of the bookings table
//! - GET /version - Backend version, never cached

use chrono::{DateTime, TimeZone, Utc};
use lambda_http::{Body, Request, Response};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

use crate::aggregate::{booked_counts, collect_rows};
use crate::config::Config;
use crate::http::{error_response, from_error, json_response, no_store_response, query_param};
use crate::models::{Column, SheetData};
use crate::normalize::Normalizer;
use crate::selector::select_month_sheets;
use crate::sheets::SpreadsheetSource;
use crate::view::{DefaultViewPolicy, PageNav, SortDirection, SortState, ViewController, ViewEvent};
use crate::{Error, Result};

const ROUTES: &[&str] = &["/sheetNames", "/sheetData", "/bookedCounts", "/bookings", "/version"];

/// Everything a request handler needs; built once per Lambda container.
pub struct AppState<Tz: TimeZone> {
    pub source: Arc<dyn SpreadsheetSource>,
    pub normalizer: Normalizer<Tz>,
    pub excluded_sheets: Vec<String>,
    pub policy: DefaultViewPolicy,
    pub single_month_booked_only: bool,
    clock: fn() -> DateTime<Utc>,
}

impl<Tz> AppState<Tz>
where
    Tz: TimeZone + Send + Sync,
    Tz::Offset: fmt::Display,
{
    pub fn new(source: Arc<dyn SpreadsheetSource>, normalizer: Normalizer<Tz>, config: &Config) -> Self {
        Self {
            source,
            normalizer,
            excluded_sheets: config.excluded_sheets.clone(),
            policy: config.default_view_policy,
            single_month_booked_only: config.single_month_booked_only,
            clock: Utc::now,
        }
    }

    /// Replace the clock used for "today".
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

/// Route one API Gateway request.
pub async fn handle<Tz>(state: &AppState<Tz>, event: Request) -> std::result::Result<Response<Body>, lambda_http::Error>
where
    Tz: TimeZone + Send + Sync,
    Tz::Offset: fmt::Display,
{
    let raw_path = event.uri().path();
    // Strip /api stage prefix if present (API Gateway REST API includes stage in path)
    let path = raw_path.strip_prefix("/api").unwrap_or(raw_path).to_string();
    let method = event.method().as_str().to_string();

    info!("{} {}", method, path);

    if !ROUTES.contains(&path.as_str()) {
        return error_response(404, format!("Not found: {}", path));
    }
    if method != "GET" {
        return error_response(405, format!("Method {} not allowed", method));
    }

    match route(state, &path, &event).await {
        Ok(response) => Ok(response),
        Err(e) => {
            error!("{} {} failed: {}", method, path, e);
            from_error(&e)
        }
    }
}

async fn route<Tz>(state: &AppState<Tz>, path: &str, event: &Request) -> Result<Response<Body>>
where
    Tz: TimeZone + Send + Sync,
    Tz::Offset: fmt::Display,
{
    match path {
        "/sheetNames" => {
            let names = state.source.list_worksheet_names().await?;
            if query_param(event, "all").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
                return ok(&names);
            }
            ok(&select_month_sheets(&names, &state.excluded_sheets))
        }

        "/sheetData" => {
            let sheet = query_param(event, "sheet")
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| Error::Validation("Missing required parameter: sheet".to_string()))?;

            let range = state.source.fetch_used_range(&sheet).await?;
            let ms = state
                .normalizer
                .normalize_at(&range.headers, &range.rows, state.now())
                .into_iter()
                .map(|row| row.timestamps)
                .collect();

            ok(&SheetData {
                sheet,
                headers: range.headers,
                rows: range.rows,
                ms,
            })
        }

        "/bookedCounts" => {
            let counts =
                booked_counts(state.source.as_ref(), &state.normalizer, &state.excluded_sheets).await?;
            info!("Counted bookings in {} month sheets", counts.len());
            ok(&counts)
        }

        "/bookings" => bookings(state, event).await,

        "/version" => {
            let version = state.source.version().await?;
            no_store_response(200, &version).map_err(internal)
        }

        _ => Err(Error::NotFound(path.to_string())),
    }
}

async fn bookings<Tz>(state: &AppState<Tz>, event: &Request) -> Result<Response<Body>>
where
    Tz: TimeZone + Send + Sync,
    Tz::Offset: fmt::Display,
{
    let now = state.now();
    let mut view = ViewController::new(state.policy, state.single_month_booked_only);

    if let Some(sheet) = query_param(event, "sheet").filter(|s| !s.trim().is_empty()) {
        let names = state.source.list_worksheet_names().await?;
        view.set_months(select_month_sheets(&names, &state.excluded_sheets));
        if !view.handle(ViewEvent::SelectMonth(sheet.clone())) {
            return Err(Error::Validation(format!("Not a month sheet: {}", sheet)));
        }
    }

    if let Some(size) = query_param(event, "pageSize") {
        let size = size
            .parse::<usize>()
            .map_err(|_| Error::Validation(format!("Invalid pageSize: {}", size)))?;
        view.set_page_size(size);
    }

    if let Some(column) = query_param(event, "sort") {
        let column: Column = column.parse().map_err(Error::Validation)?;
        let direction = match query_param(event, "dir") {
            Some(dir) => dir.parse::<SortDirection>().map_err(Error::Validation)?,
            None => SortDirection::Asc,
        };
        view.set_sort(SortState { column, direction });
    }

    if let Some(page) = query_param(event, "page") {
        let page = page
            .parse::<usize>()
            .map_err(|_| Error::Validation(format!("Invalid page: {}", page)))?;
        view.navigate(PageNav::To(page));
    }

    let rows = collect_rows(
        state.source.as_ref(),
        &state.normalizer,
        &state.excluded_sheets,
        view.mode(),
        now,
    )
    .await?;
    let window = view.window(&state.normalizer, now);
    let rows = view.select_rows(rows, &window);

    ok(&view.render(&rows))
}

fn ok<T: Serialize>(data: &T) -> Result<Response<Body>> {
    json_response(200, data).map_err(internal)
}

fn internal(e: lambda_http::Error) -> Error {
    Error::Internal(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use crate::models::{Cell, UsedRange};
    use crate::normalize::ColumnLayout;
    use crate::sheets::{AppsScriptClient, RetryPolicy};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use wiremock::matchers::{method, query_param as wm_query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

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
            self.sheets
                .get(worksheet_name)
                .cloned()
                .ok_or_else(|| Error::upstream(404, "ItemNotFound"))
        }

        async fn version(&self) -> Result<String> {
            Ok("v42".to_string())
        }
    }

    fn range(rows: &[(f64, &str, &str)]) -> UsedRange {
        UsedRange {
            headers: vec!["Date".into(), "Name".into(), "Booked".into()],
            rows: rows
                .iter()
                .map(|(serial, name, flag)| {
                    vec![Cell::Number(*serial), Cell::from(*name), Cell::from(*flag)]
                })
                .collect(),
        }
    }

    fn config() -> Config {
        Config {
            backend: BackendConfig::AppsScript {
                url: "http://unused".to_string(),
            },
            excluded_sheets: vec!["logs".into(), "tech".into()],
            default_view_policy: DefaultViewPolicy::EndOfYear,
            single_month_booked_only: false,
        }
    }

    fn jan_5_2026() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap()
    }

    fn state() -> AppState<Utc> {
        let mut sheets = HashMap::new();
        // 46024 = 2026-01-02, 46032 = 2026-01-10, 46042 = 2026-01-20
        sheets.insert(
            "Jan 2026".to_string(),
            range(&[(46032.0, "Ann", "BOOKED"), (46024.0, "Bob", "BOOKED"), (46042.0, "Cy", "Pending")]),
        );
        // 46067 = 2026-02-14
        sheets.insert("Feb".to_string(), range(&[(46067.0, "Dee", " booked ")]));
        // 46357 = 2026-12-01
        sheets.insert("Dec".to_string(), range(&[(46357.0, "Eve", "BOOKED")]));
        sheets.insert("Logs".to_string(), range(&[(46032.0, "Log", "BOOKED")]));

        let source = FakeSource {
            names: vec!["Logs".into(), "Feb".into(), "Jan 2026".into(), "Tech".into(), "Dec".into()],
            sheets,
        };
        AppState::new(Arc::new(source), Normalizer::new(Utc, ColumnLayout::ByHeader), &config())
            .with_clock(jan_5_2026)
    }

    fn get(uri: &str) -> Request {
        lambda_http::http::Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::Empty)
            .unwrap()
    }

    async fn call(state: &AppState<Utc>, request: Request) -> (u16, Value) {
        let response = handle(state, request).await.unwrap();
        let body = serde_json::from_slice(response.body().as_ref()).unwrap();
        (response.status().as_u16(), body)
    }

    #[tokio::test]
    async fn test_sheet_names_are_month_sheets_in_order() {
        let (status, body) = call(&state(), get("https://x/api/sheetNames")).await;
        assert_eq!(status, 200);
        assert_eq!(body, json!(["Jan 2026", "Feb", "Dec"]));

        let (_, body) = call(&state(), get("https://x/sheetNames?all=true")).await;
        assert_eq!(body.as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_sheet_data_includes_timestamps() {
        let (status, body) = call(&state(), get("https://x/sheetData?sheet=Feb")).await;
        assert_eq!(status, 200);
        assert_eq!(body["sheet"], "Feb");
        assert_eq!(body["headers"], json!(["Date", "Name", "Booked"]));
        assert_eq!(body["rows"][0][1], "Dee");

        let feb_14 = Utc.with_ymd_and_hms(2026, 2, 14, 0, 0, 0).unwrap().timestamp_millis();
        assert_eq!(body["ms"][0]["dateMs"], feb_14);
    }

    #[tokio::test]
    async fn test_sheet_data_requires_sheet() {
        let (status, body) = call(&state(), get("https://x/sheetData?sheet=%20")).await;
        assert_eq!(status, 400);
        assert_eq!(body["ok"], false);
    }

    #[tokio::test]
    async fn test_booked_counts() {
        let (status, body) = call(&state(), get("https://x/api/bookedCounts")).await;
        assert_eq!(status, 200);
        assert_eq!(
            body,
            json!([
                {"name": "Jan 2026", "count": 2},
                {"name": "Feb", "count": 1},
                {"name": "Dec", "count": 1}
            ])
        );
    }

    #[tokio::test]
    async fn test_bookings_default_view() {
        let (status, body) = call(&state(), get("https://x/bookings")).await;
        assert_eq!(status, 200);
        assert_eq!(body["mode"], json!({"kind": "default"}));
        assert_eq!(body["totalRows"], 3);
        let names: Vec<&str> = body["rows"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r[1].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Ann", "Dee", "Eve"]);
        assert_eq!(body["rows"][0][2], "01/10/2026");
    }

    #[tokio::test]
    async fn test_bookings_single_month_sorted_and_paged() {
        let (status, body) = call(
            &state(),
            get("https://x/bookings?sheet=Jan%202026&sort=name&dir=desc&pageSize=2&page=2"),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["mode"], json!({"kind": "singleMonth", "sheet": "Jan 2026"}));
        assert_eq!(body["totalRows"], 3);
        assert_eq!(body["totalPages"], 2);
        assert_eq!(body["page"], 2);
        assert_eq!(body["rows"][0][1], "Ann");
        assert_eq!(body["controls"]["next"], false);
    }

    #[tokio::test]
    async fn test_bookings_rejects_bad_parameters() {
        let (status, _) = call(&state(), get("https://x/bookings?sheet=Logs")).await;
        assert_eq!(status, 400);
        let (status, _) = call(&state(), get("https://x/bookings?sort=colour")).await;
        assert_eq!(status, 400);
        let (status, _) = call(&state(), get("https://x/bookings?page=two")).await;
        assert_eq!(status, 400);
    }

    #[tokio::test]
    async fn test_version_is_not_cached() {
        let response = handle(&state(), get("https://x/api/version")).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()["cache-control"], "no-store");
        assert_eq!(response.body().as_ref(), b"\"v42\"");
    }

    #[tokio::test]
    async fn test_unknown_route_and_method() {
        let (status, body) = call(&state(), get("https://x/api/nope")).await;
        assert_eq!(status, 404);
        assert_eq!(body["ok"], false);

        let post = lambda_http::http::Request::builder()
            .method("POST")
            .uri("https://x/api/bookedCounts")
            .body(Body::Empty)
            .unwrap();
        let (status, _) = call(&state(), post).await;
        assert_eq!(status, 405);
    }

    #[tokio::test]
    async fn test_upstream_failure_maps_to_bad_gateway() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(wm_query_param("fn", "sheetNames"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>Sign in</html>"))
            .mount(&server)
            .await;

        let source = AppsScriptClient::new(reqwest::Client::new(), server.uri())
            .with_retry(RetryPolicy::none());
        let state = AppState::new(
            Arc::new(source),
            Normalizer::new(Utc, ColumnLayout::ByHeader),
            &config(),
        );

        let (status, body) = call(&state, get("https://x/api/sheetNames")).await;
        assert_eq!(status, 502);
        assert!(body["error"].as_str().unwrap().starts_with("Malformed response"));
    }
}
