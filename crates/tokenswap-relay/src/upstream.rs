//! Client for the provider's token endpoint.
//!
//! Sends form-encoded grant requests with HTTP Basic client authentication
//! and decodes the response according to its declared content type.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::{Client, header};
use serde_json::map::Entry;
use serde_json::{Map, Value};

use crate::cipher::TokenCipher;
use crate::error::{RelayError, Result};
use crate::grant::GrantRequest;

/// Spotify accounts token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Default total request timeout for upstream calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connect timeout for upstream calls.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Configuration for the upstream client.
#[derive(Clone)]
pub struct UpstreamConfig {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl UpstreamConfig {
    /// Config for the default token endpoint with default timeouts.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            token_url: DEFAULT_TOKEN_URL.to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Point the client at a different token endpoint.
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Set the total request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Build the `Authorization` header value for client secret basic auth.
pub fn basic_auth_header(client_id: &str, client_secret: &str) -> String {
    let credentials = format!("{}:{}", client_id, client_secret);
    format!("Basic {}", STANDARD.encode(credentials.as_bytes()))
}

// ============================================================================
// Response decoding
// ============================================================================

/// How an upstream body is decoded, picked once from its `Content-Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEncoding {
    FormEncoded,
    Json,
    Raw,
}

impl BodyEncoding {
    /// Classify a `Content-Type` header value. Parameters after `;` are
    /// ignored and the media type is compared case-insensitively.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(value) = content_type else {
            return BodyEncoding::Raw;
        };

        let media_type = value.split(';').next().unwrap_or_default().trim();
        if media_type.eq_ignore_ascii_case(FORM_CONTENT_TYPE) {
            BodyEncoding::FormEncoded
        } else if media_type.eq_ignore_ascii_case("application/json") {
            BodyEncoding::Json
        } else {
            BodyEncoding::Raw
        }
    }
}

/// A decoded upstream body.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamBody {
    /// Key/value mapping (form bodies and JSON objects).
    Fields(Map<String, Value>),
    /// JSON that is not an object.
    Json(Value),
    /// Body passed through unmodified.
    Raw(String),
}

impl UpstreamBody {
    /// Decode `bytes` as `encoding` describes.
    ///
    /// Returns the decode failure reason on error; the caller keeps the raw
    /// bytes.
    pub fn decode(encoding: BodyEncoding, bytes: &[u8]) -> std::result::Result<Self, String> {
        match encoding {
            BodyEncoding::FormEncoded => Ok(UpstreamBody::Fields(parse_form_fields(bytes)?)),
            BodyEncoding::Json => match serde_json::from_slice::<Value>(bytes) {
                Ok(Value::Object(map)) => Ok(UpstreamBody::Fields(map)),
                Ok(other) => Ok(UpstreamBody::Json(other)),
                Err(e) => Err(format!("invalid JSON: {}", e)),
            },
            BodyEncoding::Raw => Ok(UpstreamBody::Raw(
                String::from_utf8_lossy(bytes).into_owned(),
            )),
        }
    }

    /// Look up a top-level field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        match self {
            UpstreamBody::Fields(map) => map.get(key),
            _ => None,
        }
    }

    /// The body as a JSON value. Raw bodies become a JSON string.
    pub fn into_json(self) -> Value {
        match self {
            UpstreamBody::Fields(map) => Value::Object(map),
            UpstreamBody::Json(value) => value,
            UpstreamBody::Raw(text) => Value::String(text),
        }
    }
}

/// Parse a flat form body. A repeated key collects its values into an array.
fn parse_form_fields(bytes: &[u8]) -> std::result::Result<Map<String, Value>, String> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(bytes)
        .map_err(|e| format!("invalid form body: {}", e))?;

    let mut fields = Map::new();
    for (key, value) in pairs {
        match fields.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(Value::String(value));
            }
            Entry::Occupied(mut slot) => match slot.get_mut() {
                Value::Array(values) => values.push(Value::String(value)),
                existing => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, Value::String(value)]);
                }
            },
        }
    }
    Ok(fields)
}

/// A token endpoint response, decoded and immutable.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: UpstreamBody,
}

impl UpstreamResponse {
    pub fn new(status: StatusCode, content_type: Option<String>, body: UpstreamBody) -> Self {
        Self {
            status,
            content_type,
            body,
        }
    }

    /// Return a response whose `refresh_token` field, when present as a
    /// non-empty string, is replaced by its encrypted form.
    pub fn with_encrypted_refresh_token(self, cipher: &TokenCipher) -> Self {
        let body = match self.body {
            UpstreamBody::Fields(mut fields) => {
                let sealed = match fields.get("refresh_token") {
                    Some(Value::String(token)) if !token.is_empty() => Some(cipher.encrypt(token)),
                    _ => None,
                };
                if let Some(sealed) = sealed {
                    fields.insert("refresh_token".to_string(), Value::String(sealed));
                }
                UpstreamBody::Fields(fields)
            }
            other => other,
        };

        Self { body, ..self }
    }
}

// ============================================================================
// TokenEndpoint trait
// ============================================================================

/// Something that can perform an OAuth grant against a token endpoint.
#[async_trait]
pub trait TokenEndpoint: Send + Sync + fmt::Debug {
    /// Perform a single grant request. No retries.
    async fn exchange(&self, grant: &GrantRequest) -> Result<UpstreamResponse>;
}

/// Shared token endpoint handle.
pub type SharedTokenEndpoint = Arc<dyn TokenEndpoint>;

// ============================================================================
// UpstreamClient
// ============================================================================

/// reqwest-backed [`TokenEndpoint`].
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
    token_url: String,
    auth_header: String,
}

impl UpstreamClient {
    /// Create a client from config. Fails only if the HTTP client cannot be
    /// built (e.g. TLS backend initialisation).
    pub fn new(config: UpstreamConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            client,
            auth_header: basic_auth_header(&config.client_id, &config.client_secret),
            token_url: config.token_url,
        })
    }
}

#[async_trait]
impl TokenEndpoint for UpstreamClient {
    async fn exchange(&self, grant: &GrantRequest) -> Result<UpstreamResponse> {
        let response = self
            .client
            .post(&self.token_url)
            .header(header::AUTHORIZATION, &self.auth_header)
            .header(header::CONTENT_TYPE, FORM_CONTENT_TYPE)
            .form(&grant.form_params())
            .send()
            .await?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response.bytes().await?;
        let encoding = BodyEncoding::from_content_type(content_type.as_deref());

        tracing::debug!(
            grant_type = grant.grant_type(),
            status = %status,
            ?encoding,
            "Token endpoint responded"
        );

        match UpstreamBody::decode(encoding, &bytes) {
            Ok(body) => Ok(UpstreamResponse::new(status, content_type, body)),
            Err(reason) => Err(RelayError::Undecodable {
                status,
                content_type,
                body: String::from_utf8_lossy(&bytes).into_owned(),
                reason,
            }),
        }
    }
}
