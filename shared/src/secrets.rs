//! AWS Secrets Manager integration.

use aws_sdk_secretsmanager::Client as SecretsClient;
use serde::Deserialize;

use crate::{Error, Result};

/// Shape of a JSON secret holding Graph client credentials.
#[derive(Debug, Deserialize)]
struct ClientSecretJson {
    client_secret: String,
}

/// Read the string value of a secret.
pub async fn get_secret(client: &SecretsClient, secret_arn: &str) -> Result<String> {
    let response = client
        .get_secret_value()
        .secret_id(secret_arn)
        .send()
        .await
        .map_err(|e| Error::Aws(format!("Failed to get secret: {}", e)))?;

    response
        .secret_string()
        .map(str::to_string)
        .ok_or_else(|| Error::Aws("Secret has no string value".to_string()))
}

/// Fetch and parse the Graph client secret stored at `secret_arn`.
pub async fn fetch_client_secret(client: &SecretsClient, secret_arn: &str) -> Result<String> {
    let raw = get_secret(client, secret_arn).await?;
    parse_client_secret(&raw)
}

/// Extract the Graph client secret from a secret string.
///
/// Accepts either the bare secret or a JSON object with a `client_secret` field.
pub fn parse_client_secret(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        let parsed: ClientSecretJson = serde_json::from_str(trimmed)
            .map_err(|e| Error::Auth(format!("Failed to parse client secret: {}", e)))?;
        return Ok(parsed.client_secret);
    }
    if trimmed.is_empty() {
        return Err(Error::Auth("Client secret is empty".to_string()));
    }
    Ok(trimmed.to_string())
}
