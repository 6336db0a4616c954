//! `/swap` and `/refresh` request handlers.

use std::sync::Arc;

use axum::{
    Json,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::cipher::TokenCipher;
use crate::error::{CipherError, RelayError};
use crate::grant::GrantRequest;
use crate::upstream::{BodyEncoding, SharedTokenEndpoint, UpstreamResponse};

/// Message returned when `/refresh` is called without a token.
pub const MISSING_REFRESH_TOKEN: &str = "Refresh token is missing from body";

/// Message returned when the supplied refresh token cannot be decrypted.
pub const INVALID_REFRESH_TOKEN: &str = "Refresh token is invalid";

/// State shared by the exchange handlers. Read-only after startup.
#[derive(Debug, Clone)]
pub struct ExchangeState {
    pub endpoint: SharedTokenEndpoint,
    pub cipher: Arc<TokenCipher>,
    pub redirect_uri: String,
}

impl ExchangeState {
    pub fn new(
        endpoint: SharedTokenEndpoint,
        cipher: TokenCipher,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            endpoint,
            cipher: Arc::new(cipher),
            redirect_uri: redirect_uri.into(),
        }
    }

    /// Call the token endpoint and seal any refresh token it returns.
    async fn exchange(&self, grant: GrantRequest) -> Result<UpstreamResponse, ExchangeError> {
        let response = self.endpoint.exchange(&grant).await?;
        Ok(response.with_encrypted_refresh_token(&self.cipher))
    }
}

/// First value of `field` in a form body.
///
/// Bodies sent with any other content type are treated as empty, and a
/// repeated key yields its first value.
fn form_field(headers: &HeaderMap, body: &Bytes, field: &str) -> Option<String> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    if BodyEncoding::from_content_type(content_type) != BodyEncoding::FormEncoded {
        return None;
    }

    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body).unwrap_or_default();
    pairs
        .into_iter()
        .find(|(key, _)| key == field)
        .map(|(_, value)| value)
}

/// Handle POST /swap
///
/// Exchanges an authorization code for tokens.
pub async fn swap(
    State(state): State<ExchangeState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ExchangeError> {
    // The provider rejects a missing code; only `/refresh` validates locally.
    let grant = GrantRequest::AuthorizationCode {
        code: form_field(&headers, &body, "code").unwrap_or_default(),
        redirect_uri: state.redirect_uri.clone(),
    };

    let response = state.exchange(grant).await?;
    Ok(relay_response(response))
}

/// Handle POST /refresh
///
/// Decrypts the supplied refresh token and exchanges it for a new access
/// token.
pub async fn refresh(
    State(state): State<ExchangeState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ExchangeError> {
    let sealed = form_field(&headers, &body, "refresh_token")
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ExchangeError::Validation(MISSING_REFRESH_TOKEN.to_string()))?;

    let refresh_token = state.cipher.decrypt(&sealed)?;

    let response = state
        .exchange(GrantRequest::RefreshToken { refresh_token })
        .await?;
    Ok(relay_response(response))
}

/// Write the upstream status and body as JSON.
fn relay_response(response: UpstreamResponse) -> Response {
    (response.status, Json(response.body.into_json())).into_response()
}

// ============================================================================
// Errors
// ============================================================================

/// Failure of a single exchange request.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// Required input missing.
    #[error("{0}")]
    Validation(String),

    /// The supplied refresh token could not be decrypted.
    #[error("Decrypt error: {0}")]
    Decrypt(#[from] CipherError),

    /// The upstream call failed.
    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl IntoResponse for ExchangeError {
    fn into_response(self) -> Response {
        match self {
            ExchangeError::Validation(message) => {
                tracing::warn!(error = %message, "Rejected exchange request");
                error_json(StatusCode::BAD_REQUEST, &message)
            }
            ExchangeError::Decrypt(e) => {
                tracing::warn!(error = %e, "Rejected undecryptable refresh token");
                error_json(StatusCode::BAD_REQUEST, INVALID_REFRESH_TOKEN)
            }
            ExchangeError::Relay(RelayError::Transport(e)) => {
                tracing::error!(error = %e, "Token endpoint unreachable");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
            ExchangeError::Relay(RelayError::Undecodable {
                status,
                content_type,
                body,
                reason,
            }) => {
                tracing::warn!(status = %status, %reason, "Relaying undecodable upstream body");
                let mut builder = Response::builder().status(status);
                if let Some(content_type) = content_type {
                    builder = builder.header(header::CONTENT_TYPE, content_type);
                }
                builder
                    .body(Body::from(body))
                    .unwrap_or_else(|_| status.into_response())
            }
        }
    }
}

fn error_json(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}
