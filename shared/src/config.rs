//! Configuration management for the dashboard API.

use std::env;

use crate::view::DefaultViewPolicy;
use crate::{Error, Result};

pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
pub const DEFAULT_LOGIN_BASE_URL: &str = "https://login.microsoftonline.com";

/// Worksheets that are never treated as month sheets.
pub const DEFAULT_EXCLUDED_SHEETS: &[&str] = &["logs", "tech"];

/// Microsoft Graph connection settings.
///
/// Credentials are optional here so that a missing value surfaces as an
/// authentication error on first use instead of a startup crash.
#[derive(Debug, Clone, Default)]
pub struct GraphSettings {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// ARN of a Secrets Manager secret holding the client secret
    pub client_secret_arn: Option<String>,
    /// SharePoint/OneDrive host, e.g. `contoso-my.sharepoint.com`
    pub site_host: Option<String>,
    /// Server-relative site path, e.g. `personal/jane_contoso_com`
    pub site_path: Option<String>,
    pub drive_id: Option<String>,
    /// Drive item id of the workbook
    pub file_id: String,
    pub graph_base_url: String,
    pub login_base_url: String,
}

/// Which spreadsheet backend serves the data.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    Graph(GraphSettings),
    AppsScript { url: String },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub backend: BackendConfig,
    /// Lowercased worksheet names that are never month sheets
    pub excluded_sheets: Vec<String>,
    pub default_view_policy: DefaultViewPolicy,
    pub single_month_booked_only: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let backend = match get("SPREADSHEET_BACKEND").as_deref().unwrap_or("graph") {
            "graph" => BackendConfig::Graph(GraphSettings {
                tenant_id: get("MS_TENANT_ID"),
                client_id: get("MS_CLIENT_ID"),
                client_secret: get("MS_CLIENT_SECRET"),
                client_secret_arn: get("MS_CLIENT_SECRET_ARN"),
                site_host: get("MS_EXCEL_SITE_HOST"),
                site_path: get("MS_EXCEL_SITE_PATH"),
                drive_id: get("MS_DRIVE_ID"),
                file_id: get("MS_EXCEL_FILE_ID")
                    .ok_or_else(|| Error::Config("MS_EXCEL_FILE_ID not set".to_string()))?,
                graph_base_url: get("GRAPH_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_GRAPH_BASE_URL.to_string()),
                login_base_url: get("LOGIN_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_LOGIN_BASE_URL.to_string()),
            }),
            "apps_script" | "gas" => BackendConfig::AppsScript {
                url: get("GAS_WEB_APP_URL")
                    .ok_or_else(|| Error::Config("GAS_WEB_APP_URL not set".to_string()))?,
            },
            other => {
                return Err(Error::Config(format!(
                    "Unknown SPREADSHEET_BACKEND: {}",
                    other
                )))
            }
        };

        let excluded_sheets = match get("EXCLUDED_SHEETS") {
            Some(list) => list
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            None => DEFAULT_EXCLUDED_SHEETS.iter().map(|s| s.to_string()).collect(),
        };

        let default_view_policy = match get("DEFAULT_VIEW_POLICY") {
            Some(v) => v.parse().map_err(Error::Config)?,
            None => DefaultViewPolicy::default(),
        };

        let single_month_booked_only = get("SINGLE_MONTH_BOOKED_ONLY")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            backend,
            excluded_sheets,
            default_view_policy,
            single_month_booked_only,
        })
    }
}
