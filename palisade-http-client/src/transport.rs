//! The network primitive the client is layered on.
//!
//! [`ReqwestTransport`] is the default. Tests and embedders substitute their
//! own [`Transport`] through [`HttpClientBuilder::transport`](crate::HttpClientBuilder::transport).

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use std::fmt;
use thiserror::Error;
use url::Url;

use crate::request::MultipartForm;
use crate::{ErrorKind, HttpClientConfig, HttpError, Result};

/// Encoded request body.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportBody {
    Empty,
    Bytes(Bytes),
    /// Encoded by the transport, which also sets the boundary header.
    Multipart(MultipartForm),
}

/// A single attempt, fully resolved.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: TransportBody,
}

/// Raw response of one attempt.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Final URL after redirects.
    pub url: Url,
    pub body: Bytes,
}

/// Failure below the HTTP layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not connect.
    #[error("Connection failed: {0}")]
    Connect(String),
    /// The transport gave up waiting.
    #[error("Transport timed out")]
    Timeout,
    /// The response body could not be read.
    #[error("Failed to read response body: {0}")]
    Body(String),
    /// Anything else.
    #[error("Request failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else if err.is_body() || err.is_decode() {
            TransportError::Body(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

/// Sends one request and returns the raw response.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn send(
        &self,
        request: TransportRequest,
    ) -> std::result::Result<TransportResponse, TransportError>;
}

/// [`Transport`] backed by a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    inner: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a client with the connection settings of `config`.
    ///
    /// Per-attempt timeouts are enforced by [`HttpClient`](crate::HttpClient),
    /// so only the connect timeout is set here.
    pub fn new(config: &HttpClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(&config.user_agent);

        if config.gzip {
            builder = builder.gzip(true);
        }
        if config.brotli {
            builder = builder.brotli(true);
        }
        if config.follow_redirects {
            builder = builder.redirect(reqwest::redirect::Policy::limited(config.max_redirects));
        } else {
            builder = builder.redirect(reqwest::redirect::Policy::none());
        }

        let inner = builder.build().map_err(|e| {
            HttpError::new(ErrorKind::Unknown, format!("Failed to build HTTP client: {e}"), "")
                .with_source(e)
        })?;
        Ok(Self { inner })
    }

    /// Wrap an existing `reqwest` client.
    pub fn from_client(inner: reqwest::Client) -> Self {
        Self { inner }
    }

    /// Get the underlying reqwest client.
    pub fn inner(&self) -> &reqwest::Client {
        &self.inner
    }
}

fn multipart(form: MultipartForm) -> std::result::Result<reqwest::multipart::Form, TransportError> {
    let mut encoded = reqwest::multipart::Form::new();
    for (name, value) in form.fields {
        encoded = encoded.text(name, value);
    }
    for file in form.files {
        let mut part =
            reqwest::multipart::Part::bytes(file.data.to_vec()).file_name(file.file_name);
        if let Some(mime) = &file.mime {
            part = part
                .mime_str(mime)
                .map_err(|e| TransportError::Other(format!("Invalid MIME type {mime}: {e}")))?;
        }
        encoded = encoded.part(file.field_name, part);
    }
    Ok(encoded)
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: TransportRequest,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let mut builder = self
            .inner
            .request(request.method, request.url)
            .headers(request.headers);

        builder = match request.body {
            TransportBody::Empty => builder,
            TransportBody::Bytes(bytes) => builder.body(bytes),
            TransportBody::Multipart(form) => builder.multipart(multipart(form)?),
        };

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await?;

        Ok(TransportResponse {
            status,
            headers,
            url,
            body,
        })
    }
}
