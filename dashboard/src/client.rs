//! Client for the dashboard's own HTTP API.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use shared::models::{MonthCount, SheetData, UsedRange};
use shared::sheets::{read_json, RetryPolicy, SpreadsheetSource};
use shared::Result;

/// Reads worksheets through the deployed API instead of the spreadsheet itself,
/// so the shared pipeline runs unchanged on the client.
pub struct DashboardApi {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl DashboardApi {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let url = &url;

        self.retry
            .run(path, || async move {
                let response = self.http.get(url).query(query).send().await?;
                read_json(response).await
            })
            .await
    }

    pub async fn booked_counts(&self) -> Result<Vec<MonthCount>> {
        self.get("/bookedCounts", &[]).await
    }
}

#[async_trait]
impl SpreadsheetSource for DashboardApi {
    async fn list_worksheet_names(&self) -> Result<Vec<String>> {
        self.get("/sheetNames", &[]).await
    }

    async fn fetch_used_range(&self, worksheet_name: &str) -> Result<UsedRange> {
        let data: SheetData = self.get("/sheetData", &[("sheet", worksheet_name)]).await?;
        Ok(UsedRange {
            headers: data.headers,
            rows: data.rows,
        })
    }

    async fn version(&self) -> Result<String> {
        self.get("/version", &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::models::Cell;
    use shared::Error;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api(server: &MockServer) -> DashboardApi {
        DashboardApi::new(reqwest::Client::new(), &format!("{}/api/", server.uri()))
            .with_retry(RetryPolicy::none())
    }

    #[tokio::test]
    async fn test_sheet_data_becomes_used_range() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/sheetData"))
            .and(query_param("sheet", "Jan 2026"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sheet": "Jan 2026",
                "headers": ["Date", "Booked"],
                "rows": [[46032, "BOOKED"]],
                "ms": [{"dateMs": 1768003200000i64, "startMs": null, "endMs": null}]
            })))
            .mount(&server)
            .await;

        let range = api(&server).fetch_used_range("Jan 2026").await.unwrap();
        assert_eq!(range.headers, vec!["Date", "Booked"]);
        assert_eq!(range.rows, vec![vec![Cell::Number(46032.0), Cell::from("BOOKED")]]);
    }

    #[tokio::test]
    async fn test_booked_counts_and_version() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/bookedCounts"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"name": "Feb", "count": 4}])),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!("v3")))
            .mount(&server)
            .await;

        let api = api(&server);
        assert_eq!(
            api.booked_counts().await.unwrap(),
            vec![MonthCount { name: "Feb".into(), count: 4 }]
        );
        assert_eq!(api.version().await.unwrap(), "v3");
    }

    #[tokio::test]
    async fn test_error_envelope_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(502).set_body_json(json!({"ok": false, "error": "boom"})),
            )
            .mount(&server)
            .await;

        let err = api(&server).list_worksheet_names().await.unwrap_err();
        assert!(matches!(err, Error::Upstream { status: 502, .. }));
    }
}
