//! HTTP helpers for Lambda functions.

use lambda_http::http::HeaderValue;
use lambda_http::{Body, Request, RequestExt, Response};
use serde::Serialize;

use crate::Error;

/// Error envelope returned by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub ok: bool,
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: message.into(),
        }
    }
}

/// Create a JSON response with the given status code and data.
pub fn json_response<T: Serialize>(status: u16, data: &T) -> Result<Response<Body>, lambda_http::Error> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(data)?))
        .map_err(Into::into)
}

/// JSON response that must never be cached by browsers or CDNs.
pub fn no_store_response<T: Serialize>(status: u16, data: &T) -> Result<Response<Body>, lambda_http::Error> {
    let mut response = json_response(status, data)?;
    response
        .headers_mut()
        .insert("cache-control", HeaderValue::from_static("no-store"));
    Ok(response)
}

/// Create an error response with the given status code and message.
pub fn error_response(status: u16, message: impl Into<String>) -> Result<Response<Body>, lambda_http::Error> {
    json_response(status, &ErrorBody::new(message))
}

/// Map a library error onto its status code and the error envelope.
pub fn from_error(error: &Error) -> Result<Response<Body>, lambda_http::Error> {
    error_response(error.status_code(), error.to_string())
}

/// First value of a query-string parameter.
///
/// API Gateway fills the parsed query map; when it is absent (local runs,
/// tests) the raw URI query is decoded instead.
pub fn query_param(event: &Request, name: &str) -> Option<String> {
    if let Some(value) = event
        .query_string_parameters_ref()
        .and_then(|params| params.first(name))
    {
        return Some(value.to_string());
    }

    event.uri().query()?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = urlencoding::decode(&key.replace('+', " ")).ok()?.into_owned();
        if key != name {
            return None;
        }
        urlencoding::decode(&value.replace('+', " "))
            .ok()
            .map(|v| v.into_owned())
    })
}
