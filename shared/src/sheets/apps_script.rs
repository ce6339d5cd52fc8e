//! Google Apps Script web-app backend.
//!
//! The web app dispatches on a `fn` query parameter:
//! - `fn=sheetNames` -> `["Jan", "Feb", ...]`
//! - `fn=sheetData&sheet=NAME` -> `{"headers": [...], "rows": [[...]]}` or a bare 2-D array
//! - `fn=getVersion` -> `"v1"`

use async_trait::async_trait;
use serde::Deserialize;
use std::iter;

use super::{read_json, RetryPolicy, SpreadsheetSource};
use crate::models::{Cell, RawRow, UsedRange};
use crate::{Error, Result};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SheetPayload {
    Table {
        headers: Vec<Cell>,
        #[serde(default)]
        rows: Vec<RawRow>,
    },
    Values(Vec<Vec<Cell>>),
    /// `{"ok": false, "error": "..."}` from the web app's own error handler.
    Failed { error: String },
}

/// Reads a Google Sheet through a deployed Apps Script web app.
pub struct AppsScriptClient {
    http: reqwest::Client,
    url: String,
    retry: RetryPolicy,
}

impl AppsScriptClient {
    pub fn new(http: reqwest::Client, url: String) -> Self {
        Self {
            http,
            url,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn call<T: serde::de::DeserializeOwned>(&self, query: &[(&str, &str)]) -> Result<T> {
        let label = query.first().map(|(_, v)| *v).unwrap_or("call");
        self.retry
            .run(label, || async move {
                let response = self
                    .http
                    .get(&self.url)
                    .query(query)
                    .header("Accept", "application/json")
                    .send()
                    .await?;
                read_json(response).await
            })
            .await
    }
}

#[async_trait]
impl SpreadsheetSource for AppsScriptClient {
    async fn list_worksheet_names(&self) -> Result<Vec<String>> {
        let names: Vec<String> = self.call(&[("fn", "sheetNames")]).await?;
        Ok(names)
    }

    async fn fetch_used_range(&self, worksheet_name: &str) -> Result<UsedRange> {
        let payload: SheetPayload = self
            .call(&[("fn", "sheetData"), ("sheet", worksheet_name)])
            .await?;

        Ok(match payload {
            SheetPayload::Table { headers, rows } => {
                UsedRange::from_values(iter::once(headers).chain(rows).collect())
            }
            SheetPayload::Values(values) => UsedRange::from_values(values),
            SheetPayload::Failed { error } => {
                return Err(Error::MalformedResponse(format!(
                    "Apps Script failed to read {}: {}",
                    worksheet_name, error
                )));
            }
        })
    }

    async fn version(&self) -> Result<String> {
        let url = &self.url;
        let text = self
            .retry
            .run("getVersion", || async move {
                let response = self
                    .http
                    .get(url)
                    .query(&[("fn", "getVersion")])
                    .send()
                    .await?;
                let status = response.status();
                let text = response.text().await?;
                if !status.is_success() {
                    return Err(Error::upstream(status.as_u16(), &text));
                }
                Ok(text)
            })
            .await?;

        Ok(text.replace('"', "").trim().to_string())
    }
}
