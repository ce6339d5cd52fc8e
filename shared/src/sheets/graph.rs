//! Microsoft Graph workbook backend (client-credentials flow).

use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};
use urlencoding::encode;

use super::{escape_sheet_name, read_json, RetryPolicy, SpreadsheetSource};
use crate::config::GraphSettings;
use crate::models::{Cell, UsedRange};
use crate::{Error, Result};

const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Tokens are refreshed this long before they expire.
const TOKEN_EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// Client-credentials for the Graph app registration.
#[derive(Debug, Clone, Default)]
pub struct GraphCredentials {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl GraphCredentials {
    fn require(&self) -> Result<(&str, &str, &str)> {
        match (&self.tenant_id, &self.client_id, &self.client_secret) {
            (Some(tenant), Some(client), Some(secret)) => {
                Ok((tenant.as_str(), client.as_str(), secret.as_str()))
            }
            _ => Err(Error::Auth(
                "Missing MS_TENANT_ID / MS_CLIENT_ID / MS_CLIENT_SECRET".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct SiteResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Worksheet {
    name: String,
}

#[derive(Debug, Deserialize)]
struct WorksheetList {
    #[serde(default)]
    value: Vec<Worksheet>,
}

#[derive(Debug, Deserialize)]
struct RangeResponse {
    #[serde(default)]
    values: Vec<Vec<Cell>>,
}

/// Reads a workbook stored in OneDrive/SharePoint through Microsoft Graph.
pub struct GraphClient {
    http: reqwest::Client,
    credentials: GraphCredentials,
    site_host: Option<String>,
    site_path: Option<String>,
    drive_id: Option<String>,
    file_id: String,
    graph_base_url: String,
    login_base_url: String,
    retry: RetryPolicy,
    token: RwLock<Option<CachedToken>>,
    /// Resolved `/…/items/{file}` prefix; identifiers never change for a deployment
    item_path: RwLock<Option<String>>,
}

impl GraphClient {
    pub fn new(http: reqwest::Client, settings: &GraphSettings) -> Self {
        Self {
            http,
            credentials: GraphCredentials {
                tenant_id: settings.tenant_id.clone(),
                client_id: settings.client_id.clone(),
                client_secret: settings.client_secret.clone(),
            },
            site_host: settings.site_host.clone(),
            site_path: settings.site_path.clone(),
            drive_id: settings.drive_id.clone(),
            file_id: settings.file_id.clone(),
            graph_base_url: settings.graph_base_url.trim_end_matches('/').to_string(),
            login_base_url: settings.login_base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
            token: RwLock::new(None),
            item_path: RwLock::new(None),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Get a bearer token, reusing the cached one until shortly before expiry.
    async fn access_token(&self) -> Result<String> {
        let (tenant, client_id, client_secret) = self.credentials.require()?;

        {
            let token = self.token.read().await;
            if let Some(cached) = token.as_ref() {
                if cached.expires_at > Instant::now() {
                    return Ok(cached.value.clone());
                }
            }
        }

        let url = format!("{}/{}/oauth2/v2.0/token", self.login_base_url, encode(tenant));
        let params = [
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("grant_type", "client_credentials"),
            ("scope", GRAPH_SCOPE),
        ];

        let (url, params) = (&url, &params);
        let response: TokenResponse = self
            .retry
            .run("token request", || async move {
                let response = self.http.post(url).form(params).send().await?;
                read_json(response).await
            })
            .await
            .map_err(|e| match e {
                Error::Upstream { status, body } if (400..500).contains(&status) => {
                    Error::Auth(format!("Token request rejected: HTTP {}: {}", status, body))
                }
                other => other,
            })?;

        let lifetime = Duration::from_secs(response.expires_in.unwrap_or(3600));
        let cached = CachedToken {
            value: response.access_token,
            expires_at: Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_SKEW),
        };
        let value = cached.value.clone();
        *self.token.write().await = Some(cached);

        debug!("Acquired Graph access token");
        Ok(value)
    }

    /// Authenticated GET against the Graph API.
    async fn graph_get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let token = self.access_token().await?;
        let url = format!("{}{}", self.graph_base_url, path);
        let (url, token) = (&url, &token);

        self.retry
            .run(path, || async move {
                let response = self
                    .http
                    .get(url)
                    .bearer_auth(token)
                    .header("Accept", "application/json")
                    .send()
                    .await?;
                read_json(response).await
            })
            .await
            .map_err(|e| match e {
                Error::Upstream { status, body } if status == 401 || status == 403 => {
                    Error::Auth(format!("Graph request rejected: HTTP {}: {}", status, body))
                }
                other => other,
            })
    }

    /// Resolve the drive-item path of the workbook once per client.
    async fn item_path(&self) -> Result<String> {
        if let Some(path) = self.item_path.read().await.clone() {
            return Ok(path);
        }

        let file = encode(&self.file_id);
        let path = match (&self.drive_id, &self.site_host) {
            (Some(drive), _) => format!("/drives/{}/items/{}", encode(drive), file),
            (None, Some(host)) => {
                let site_url = match &self.site_path {
                    Some(site_path) => format!("/sites/{}:/{}", host, site_path.trim_matches('/')),
                    None => format!("/sites/{}", host),
                };
                let site: SiteResponse = self.graph_get(&site_url).await?;
                info!("Resolved Graph site id {}", site.id);
                format!("/sites/{}/drive/items/{}", site.id, file)
            }
            (None, None) => format!("/me/drive/items/{}", file),
        };

        *self.item_path.write().await = Some(path.clone());
        Ok(path)
    }
}

#[async_trait]
impl SpreadsheetSource for GraphClient {
    async fn list_worksheet_names(&self) -> Result<Vec<String>> {
        let item = self.item_path().await?;
        let list: WorksheetList = self
            .graph_get(&format!("{}/workbook/worksheets?$select=name", item))
            .await?;
        Ok(list.value.into_iter().map(|w| w.name).collect())
    }

    async fn fetch_used_range(&self, worksheet_name: &str) -> Result<UsedRange> {
        let item = self.item_path().await?;
        let path = format!(
            "{}/workbook/worksheets('{}')/usedRange(valuesOnly=true)?$select=values",
            item,
            encode(&escape_sheet_name(worksheet_name))
        );
        let range: RangeResponse = self.graph_get(&path).await?;
        Ok(UsedRange::from_values(range.values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(server: &MockServer) -> GraphSettings {
        GraphSettings {
            tenant_id: Some("tenant-1".to_string()),
            client_id: Some("client-1".to_string()),
            client_secret: Some("secret-1".to_string()),
            drive_id: Some("drive-1".to_string()),
            file_id: "FILE-1".to_string(),
            graph_base_url: server.uri(),
            login_base_url: server.uri(),
            ..GraphSettings::default()
        }
    }

    fn client(settings: &GraphSettings) -> GraphClient {
        GraphClient::new(reqwest::Client::new(), settings).with_retry(RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
        })
    }

    async fn mount_token(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "token-abc",
                "token_type": "Bearer",
                "expires_in": 3599
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_before_any_request() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut s = settings(&server);
        s.client_secret = None;
        let err = client(&s).list_worksheet_names().await.unwrap_err();

        assert!(matches!(err, Error::Auth(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lists_worksheets_and_caches_token() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/drives/drive-1/items/FILE-1/workbook/worksheets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{"name": "Jan"}, {"name": "Logs"}]
            })))
            .expect(2)
            .mount(&server)
            .await;

        let graph = client(&settings(&server));
        assert_eq!(graph.list_worksheet_names().await.unwrap(), vec!["Jan", "Logs"]);
        assert_eq!(graph.list_worksheet_names().await.unwrap().len(), 2);

        let requests = server.received_requests().await.unwrap();
        let auth = requests[1].headers.get("authorization").unwrap();
        assert_eq!(auth.to_str().unwrap(), "Bearer token-abc");
    }

    #[tokio::test]
    async fn test_fetch_used_range_escapes_quotes() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path_regex(r"/workbook/worksheets\(.*\)/usedRange"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "values": [
                    ["Date", "Email", "Booked"],
                    [45658, "a@x.com", "BOOKED"],
                    ["", null, ""]
                ]
            })))
            .mount(&server)
            .await;

        let range = client(&settings(&server))
            .fetch_used_range("O'Brien")
            .await
            .unwrap();

        assert_eq!(range.headers, vec!["Date", "Email", "Booked"]);
        assert_eq!(range.rows.len(), 1);

        let requests = server.received_requests().await.unwrap();
        let url = requests.last().unwrap().url.to_string();
        assert!(url.contains("O%27%27Brien"), "unexpected url {url}");
    }

    #[tokio::test]
    async fn test_site_lookup_is_resolved_once() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/sites/contoso-my.sharepoint.com:/personal/jane"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "site-9"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sites/site-9/drive/items/FILE-1/workbook/worksheets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
            .expect(2)
            .mount(&server)
            .await;

        let mut s = settings(&server);
        s.drive_id = None;
        s.site_host = Some("contoso-my.sharepoint.com".to_string());
        s.site_path = Some("/personal/jane".to_string());

        let graph = client(&s);
        graph.list_worksheet_names().await.unwrap();
        graph.list_worksheet_names().await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_credentials_are_auth_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "invalid_client"})))
            .mount(&server)
            .await;

        let err = client(&settings(&server)).list_worksheet_names().await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_forbidden_workbook_is_an_auth_error() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/drives/drive-1/items/FILE-1/workbook/worksheets"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {"code": "accessDenied", "message": "Access denied"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&settings(&server)).list_worksheet_names().await.unwrap_err();
        match err {
            Error::Auth(msg) => assert!(msg.contains("HTTP 403"), "got {msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_then_surfaced() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/drives/drive-1/items/FILE-1/workbook/worksheets"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .expect(3)
            .mount(&server)
            .await;

        let err = client(&settings(&server)).list_worksheet_names().await.unwrap_err();
        match err {
            Error::Upstream { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "unavailable");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_json_body_is_malformed() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/drives/drive-1/items/FILE-1/workbook/worksheets"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let graph = client(&settings(&server)).with_retry(RetryPolicy::none());
        let err = graph.list_worksheet_names().await.unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }
}
