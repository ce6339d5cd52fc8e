//! Spreadsheet backends.
//!
//! Every backend implements [`SpreadsheetSource`]; the rest of the pipeline
//! only ever talks to the trait, so Graph, Apps Script and the dashboard's
//! own HTTP API are interchangeable.

mod apps_script;
mod graph;

pub use apps_script::AppsScriptClient;
pub use graph::{GraphClient, GraphCredentials};

use async_trait::async_trait;
use reqwest::Response;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{BackendConfig, Config};
use crate::error::{truncate, UPSTREAM_BODY_LIMIT};
use crate::models::UsedRange;
use crate::secrets::fetch_client_secret;
use crate::{Error, Result};

/// Timeout applied to every outbound request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Read-only access to a workbook.
#[async_trait]
pub trait SpreadsheetSource: Send + Sync {
    /// Names of every worksheet in the workbook, in workbook order.
    async fn list_worksheet_names(&self) -> Result<Vec<String>>;

    /// Header row and data rows of one worksheet's used range.
    async fn fetch_used_range(&self, worksheet_name: &str) -> Result<UsedRange>;

    /// Version string reported by the backend.
    async fn version(&self) -> Result<String> {
        Ok(env!("CARGO_PKG_VERSION").to_string())
    }
}

/// Exponential backoff for transient upstream failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Run `op`, retrying while it fails with a transient error.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self.base_delay * 2u32.pow(attempt);
                    attempt += 1;
                    warn!(
                        "{} failed ({}), retry {}/{} in {:?}",
                        label, e, attempt, self.max_retries, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }
}

/// Build the HTTP client shared by the backends.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(Error::Http)
}

/// Check the status and decode a JSON body.
pub async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        return Err(Error::upstream(status.as_u16(), &text));
    }

    serde_json::from_str(&text).map_err(|e| {
        Error::MalformedResponse(format!(
            "{}; body starts with: {}",
            e,
            truncate(&text, UPSTREAM_BODY_LIMIT.min(200))
        ))
    })
}

/// Double single quotes, the way spreadsheet engines quote literal sheet names.
pub fn escape_sheet_name(name: &str) -> String {
    name.replace('\'', "''")
}

/// Build the configured backend.
///
/// When only a Secrets Manager ARN is configured for the Graph client secret,
/// the secret is fetched once here.
pub async fn from_config(config: &Config) -> Result<Arc<dyn SpreadsheetSource>> {
    let http = http_client()?;

    match &config.backend {
        BackendConfig::Graph(settings) => {
            let mut settings = settings.clone();
            if settings.client_secret.is_none() {
                if let Some(arn) = settings.client_secret_arn.clone() {
                    let aws = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
                    let secrets = aws_sdk_secretsmanager::Client::new(&aws);
                    settings.client_secret = Some(fetch_client_secret(&secrets, &arn).await?);
                }
            }
            info!("Using Microsoft Graph backend");
            Ok(Arc::new(GraphClient::new(http, &settings)))
        }
        BackendConfig::AppsScript { url } => {
            info!("Using Apps Script backend");
            Ok(Arc::new(AppsScriptClient::new(http, url.clone())))
        }
    }
}
