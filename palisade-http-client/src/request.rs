//! Request configuration, body encoding and the request builder.

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use serde_json::Value;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use crate::transport::TransportBody;
use crate::{HttpClient, HttpResponse, Result};

/// How a request body is encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// `application/json`
    Json,
    /// `multipart/form-data`, boundary chosen by the transport
    Multipart,
    /// `application/x-www-form-urlencoded`
    UrlEncoded,
    /// `text/plain`
    Text,
}

impl ContentType {
    /// Header value to send, `None` for multipart.
    pub fn header_value(&self) -> Option<&'static str> {
        match self {
            ContentType::Json => Some("application/json"),
            ContentType::Multipart => None,
            ContentType::UrlEncoded => Some("application/x-www-form-urlencoded"),
            ContentType::Text => Some("text/plain; charset=utf-8"),
        }
    }
}

/// A file attached to a multipart form.
///
/// Contents are owned so the form can be rebuilt for every retry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilePart {
    pub(crate) field_name: String,
    pub(crate) file_name: String,
    pub(crate) mime: Option<String>,
    pub(crate) data: Bytes,
}

impl FilePart {
    /// A file under the `file` field.
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            field_name: "file".to_string(),
            file_name: file_name.into(),
            mime: None,
            data: data.into(),
        }
    }

    /// Use a different form field name.
    pub fn field_name(mut self, name: impl Into<String>) -> Self {
        self.field_name = name.into();
        self
    }

    /// Set the part's MIME type.
    pub fn mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A `multipart/form-data` payload of text fields and files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MultipartForm {
    pub(crate) fields: Vec<(String, String)>,
    pub(crate) files: Vec<FilePart>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Add a file.
    pub fn file(mut self, part: FilePart) -> Self {
        self.files.push(part);
        self
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn files(&self) -> &[FilePart] {
        &self.files
    }
}

/// Request payload before encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// A JSON document.
    Json(Value),
    /// Key/value pairs.
    Form(Vec<(String, String)>),
    /// A string sent as-is.
    Text(String),
    /// Raw bytes sent as-is.
    Bytes(Bytes),
    /// A multipart form, passed through untransformed.
    Multipart(MultipartForm),
}

impl RequestBody {
    /// Content type used when the request does not name one.
    pub fn inferred_content_type(&self) -> Option<ContentType> {
        match self {
            RequestBody::Json(_) => Some(ContentType::Json),
            RequestBody::Form(_) => Some(ContentType::UrlEncoded),
            RequestBody::Text(_) => Some(ContentType::Text),
            RequestBody::Bytes(_) => None,
            RequestBody::Multipart(_) => Some(ContentType::Multipart),
        }
    }

    /// Encode for the wire according to `content_type`.
    ///
    /// Strings and bytes are always sent raw; a multipart form is always sent
    /// as multipart.
    pub(crate) fn encode(&self, content_type: Option<ContentType>) -> TransportBody {
        match (self, content_type) {
            (RequestBody::Multipart(form), _) => TransportBody::Multipart(form.clone()),
            (RequestBody::Bytes(bytes), _) => TransportBody::Bytes(bytes.clone()),
            (RequestBody::Text(text), _) => TransportBody::Bytes(Bytes::from(text.clone())),
            (RequestBody::Json(value), Some(ContentType::UrlEncoded)) => {
                TransportBody::Bytes(Bytes::from(url_encode(&json_pairs(value))))
            }
            (RequestBody::Json(Value::String(text)), Some(ContentType::Text)) => {
                TransportBody::Bytes(Bytes::from(text.clone()))
            }
            (RequestBody::Json(value), _) => TransportBody::Bytes(Bytes::from(value.to_string())),
            (RequestBody::Form(pairs), Some(ContentType::Json)) => {
                let object: serde_json::Map<String, Value> = pairs
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                TransportBody::Bytes(Bytes::from(Value::Object(object).to_string()))
            }
            (RequestBody::Form(pairs), _) => TransportBody::Bytes(Bytes::from(url_encode(pairs))),
        }
    }
}

impl Hash for RequestBody {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            RequestBody::Json(value) => value.to_string().hash(state),
            RequestBody::Form(pairs) => pairs.hash(state),
            RequestBody::Text(text) => text.hash(state),
            RequestBody::Bytes(bytes) => bytes.hash(state),
            RequestBody::Multipart(form) => form.hash(state),
        }
    }
}

fn json_pairs(value: &Value) -> Vec<(String, String)> {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| {
                let v = match v {
                    Value::String(s) => s.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                (k.clone(), v)
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn url_encode(pairs: &[(String, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

/// Per-call request settings, merged onto the client defaults.
///
/// `None` fields fall back to the client configuration.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub method: Method,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    pub content_type: Option<ContentType>,
    pub timeout: Option<Duration>,
    /// Attach the token from the client's token provider.
    pub include_auth: bool,
    pub retries: Option<u32>,
    pub retry_delay: Option<Duration>,
    /// Serve from and store into the response cache. GET only.
    pub cache: bool,
    pub cache_ttl: Option<Duration>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: None,
            content_type: None,
            timeout: None,
            include_auth: true,
            retries: None,
            retry_delay: None,
            cache: false,
            cache_ttl: None,
        }
    }
}

impl RequestConfig {
    /// Defaults for `method`.
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    /// Explicit content type, else the one implied by the body.
    pub fn effective_content_type(&self) -> Option<ContentType> {
        self.content_type
            .or_else(|| self.body.as_ref().and_then(RequestBody::inferred_content_type))
    }

    /// Add a header, silently skipping invalid names or values.
    pub fn insert_header(&mut self, name: &str, value: &str) {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name),
            HeaderValue::try_from(value),
        ) {
            self.headers.insert(name, value);
        }
    }
}

/// HTTP request builder.
pub struct RequestBuilder<'a> {
    client: &'a HttpClient,
    url: String,
    config: RequestConfig,
}

impl<'a> RequestBuilder<'a> {
    pub(crate) fn new(client: &'a HttpClient, method: Method, url: String) -> Self {
        Self {
            client,
            url,
            config: RequestConfig::new(method),
        }
    }

    /// Add a header to the request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert_header(&name.into(), &value.into());
        self
    }

    /// Add multiple headers to the request.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.config.headers.extend(headers);
        self
    }

    /// Add a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.query.push((key.into(), value.into()));
        self
    }

    /// Add multiple query parameters.
    pub fn queries<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in params {
            self.config.query.push((k.into(), v.into()));
        }
        self
    }

    /// Set the request body as raw bytes.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.config.body = Some(RequestBody::Bytes(body.into()));
        self
    }

    /// Set the request body as text.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.config.body = Some(RequestBody::Text(text.into()));
        self
    }

    /// Set the request body as JSON.
    pub fn json<T: Serialize>(mut self, json: &T) -> Self {
        match serde_json::to_value(json) {
            Ok(value) => self.config.body = Some(RequestBody::Json(value)),
            Err(e) => palisade_log::error!("Failed to serialize JSON body: {}", e),
        }
        self
    }

    /// Set the request body as form data.
    pub fn form<T: Serialize>(mut self, form: &T) -> Self {
        let pairs = serde_urlencoded::to_string(form).map(|encoded| {
            url::form_urlencoded::parse(encoded.as_bytes())
                .into_owned()
                .collect::<Vec<_>>()
        });
        match pairs {
            Ok(pairs) => self.config.body = Some(RequestBody::Form(pairs)),
            Err(e) => palisade_log::error!("Failed to encode form data: {}", e),
        }
        self
    }

    /// Set the request body as a multipart form.
    pub fn multipart(mut self, form: MultipartForm) -> Self {
        self.config.body = Some(RequestBody::Multipart(form));
        self
    }

    /// Force the body encoding.
    pub fn content_type(mut self, content_type: ContentType) -> Self {
        self.config.content_type = Some(content_type);
        self
    }

    /// Set a custom timeout for this request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Override the number of retries.
    pub fn retries(mut self, retries: u32) -> Self {
        self.config.retries = Some(retries);
        self
    }

    /// Override the base retry delay.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = Some(delay);
        self
    }

    /// Enable the response cache for this GET request.
    pub fn cache(mut self, enable: bool) -> Self {
        self.config.cache = enable;
        self
    }

    /// Cache with an explicit TTL.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache = true;
        self.config.cache_ttl = Some(ttl);
        self
    }

    /// Whether to attach the token from the client's token provider.
    pub fn include_auth(mut self, include: bool) -> Self {
        self.config.include_auth = include;
        self
    }

    /// Set bearer authentication.
    pub fn bearer_auth(self, token: impl Into<String>) -> Self {
        self.header("Authorization", format!("Bearer {}", token.into()))
    }

    /// Set basic authentication.
    pub fn basic_auth(
        self,
        username: impl Into<String>,
        password: Option<impl Into<String>>,
    ) -> Self {
        use base64::Engine;
        let credentials = match password {
            Some(p) => format!("{}:{}", username.into(), p.into()),
            None => format!("{}:", username.into()),
        };
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        self.header("Authorization", format!("Basic {}", encoded))
    }

    /// The configuration built so far.
    pub fn config(&self) -> &RequestConfig {
        &self.config
    }

    /// Send the request.
    pub async fn send(self) -> Result<HttpResponse> {
        self.client.execute(&self.url, self.config).await
    }

    /// Send the request and decode a JSON body.
    pub async fn send_json<T: serde::de::DeserializeOwned>(self) -> Result<T> {
        let response = self.send().await?;
        response.json()
    }
}

impl std::fmt::Debug for RequestBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("url", &self.url)
            .field("config", &self.config)
            .finish()
    }
}
