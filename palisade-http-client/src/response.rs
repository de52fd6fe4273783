//! HTTP response model.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

use crate::transport::TransportResponse;
use crate::{HttpError, Result};

/// Decode strategy chosen from the `Content-Type` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Json,
    Text,
    Binary,
}

impl ResponseKind {
    /// `application/json` and `+json` types are JSON, `text/*` and XML are
    /// text, everything else (including no header) is binary.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(content_type) = content_type else {
            return ResponseKind::Binary;
        };
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if essence == "application/json" || essence.ends_with("+json") {
            ResponseKind::Json
        } else if essence.starts_with("text/")
            || essence == "application/xml"
            || essence.ends_with("+xml")
        {
            ResponseKind::Text
        } else {
            ResponseKind::Binary
        }
    }
}

/// Decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseData {
    Json(Value),
    Text(String),
    Binary(Bytes),
    /// No body was sent.
    Empty,
}

impl ResponseData {
    /// Decode `body` with the strategy for `kind`.
    pub fn decode(kind: ResponseKind, body: Bytes) -> std::result::Result<Self, String> {
        if body.is_empty() {
            return Ok(ResponseData::Empty);
        }
        match kind {
            ResponseKind::Json => serde_json::from_slice(&body)
                .map(ResponseData::Json)
                .map_err(|e| format!("Invalid JSON response: {e}")),
            ResponseKind::Text => String::from_utf8(body.to_vec())
                .map(ResponseData::Text)
                .map_err(|e| format!("Invalid UTF-8 response: {e}")),
            ResponseKind::Binary => Ok(ResponseData::Binary(body)),
        }
    }
}

/// A completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    data: ResponseData,
    status: StatusCode,
    headers: HeaderMap,
    url: String,
    duration: Duration,
    from_cache: bool,
}

impl HttpResponse {
    /// Create a response.
    pub fn new(
        status: StatusCode,
        headers: HeaderMap,
        data: ResponseData,
        url: impl Into<String>,
    ) -> Self {
        Self {
            data,
            status,
            headers,
            url: url.into(),
            duration: Duration::ZERO,
            from_cache: false,
        }
    }

    /// Decode a transport response according to its content type.
    pub(crate) fn from_transport(response: TransportResponse, duration: Duration) -> Result<Self> {
        let url = response.url.to_string();
        let content_type = response
            .headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        let kind = ResponseKind::from_content_type(content_type);
        let data = ResponseData::decode(kind, response.body)
            .map_err(|message| HttpError::parse(url.as_str(), message).with_duration(duration))?;

        let mut decoded = Self::new(response.status, response.headers, data, url);
        decoded.duration = duration;
        Ok(decoded)
    }

    pub(crate) fn into_cached(mut self) -> Self {
        self.from_cache = true;
        self
    }

    /// Decoded body.
    pub fn data(&self) -> &ResponseData {
        &self.data
    }

    /// Mutable body, for response interceptors.
    pub fn data_mut(&mut self) -> &mut ResponseData {
        &mut self.data
    }

    /// Consume the response and return the body.
    pub fn into_data(self) -> ResponseData {
        self.data
    }

    /// Get the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Reason phrase of the status.
    pub fn status_text(&self) -> &str {
        self.status.canonical_reason().unwrap_or("")
    }

    /// Check if the response was successful (2xx).
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Get the response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable headers, for response interceptors.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Get a specific header value.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .and_then(|v| v.to_str().ok())
    }

    /// Final URL of the exchange.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Time from request start to completion.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Whether this response was served from the cache.
    pub fn from_cache(&self) -> bool {
        self.from_cache
    }

    /// JSON body, if the response was JSON.
    pub fn as_json(&self) -> Option<&Value> {
        match &self.data {
            ResponseData::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Text body, if the response was text.
    pub fn as_text(&self) -> Option<&str> {
        match &self.data {
            ResponseData::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Binary body, if the response was binary.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match &self.data {
            ResponseData::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Deserialize the body into `T`.
    ///
    /// JSON and text bodies are accepted; anything else is a `PARSE` error.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let parsed = match &self.data {
            ResponseData::Json(value) => T::deserialize(value).map_err(|e| e.to_string()),
            ResponseData::Text(text) => serde_json::from_str(text).map_err(|e| e.to_string()),
            ResponseData::Binary(bytes) => serde_json::from_slice(bytes).map_err(|e| e.to_string()),
            ResponseData::Empty => serde_json::from_value(Value::Null).map_err(|e| e.to_string()),
        };
        parsed.map_err(|message| HttpError::parse(self.url.as_str(), message))
    }
}
